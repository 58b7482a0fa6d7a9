//! Additive increase, multiplicative decrease.
//!
//! Once per report epoch (roughly one RTT) the datapath reports what it saw.
//! If anything was lost or arrived out of order the window halves; otherwise
//! it grows by one `mss` per window's worth of acknowledged bytes, and never
//! falls below the initial window on the way up.

use std::collections::HashMap;

use tracing::debug;

use crate::diag::Diagnostics;
use crate::ipc::Ipc;
use crate::lang::{Expr, Prim, Program, Scope, Value};
use crate::{CongAlg, Datapath, DatapathInfo, DatapathTrait, Error, Flow, Report, Result};

/// Initial window, in packets.
pub const INIT_CWND_PKTS: u32 = 10;

/// Name of the datapath program every flow installs.
pub const PROGRAM_NAME: &str = "default";

/// The report program. Counters are volatile, so each report carries only
/// its own epoch; `min_rtt` and `rate` are running extrema across the flow.
pub fn report_program() -> Program {
    Program::new(PROGRAM_NAME)
        .volatile("acked", Value::Num(0))
        .volatile("sacked", Value::Num(0))
        .volatile("loss", Value::Num(0))
        .volatile("timeout", Value::Bool(false))
        .field("rtt", Value::Num(0))
        .field("pkts_inflight", Value::Num(0))
        .field("min_rtt", Value::Num(u64::MAX))
        .field("rate", Value::Num(0))
        .rule("pkts_inflight", Prim::FlowBytesInFlight.into())
        .rule("rtt", Prim::FlowRttSampleUs.into())
        .rule(
            "acked",
            Expr::add(Expr::field("acked"), Prim::AckBytesAcked.into()),
        )
        .rule(
            "sacked",
            Expr::add(Expr::field("sacked"), Prim::AckPacketsMisordered.into()),
        )
        .rule("loss", Prim::AckLostPktsSample.into())
        .rule("timeout", Prim::FlowWasTimeout.into())
        .rule(
            "min_rtt",
            Expr::min(Expr::field("min_rtt"), Prim::FlowRttSampleUs.into()),
        )
        .rule(
            "rate",
            Expr::max(Expr::field("rate"), Prim::FlowRateOutgoing.into()),
        )
        .report_when(Expr::gt(Expr::Micros, Prim::FlowRttSampleUs.into()), true)
}

#[derive(Clone, Debug)]
pub struct AimdConfig {
    pub init_cwnd_pkts: u32,
    pub diagnostics: Diagnostics,
}

impl Default for AimdConfig {
    fn default() -> Self {
        AimdConfig {
            init_cwnd_pkts: INIT_CWND_PKTS,
            diagnostics: Diagnostics::default(),
        }
    }
}

pub struct Aimd {
    cfg: AimdConfig,
}

impl Aimd {
    pub fn new(cfg: AimdConfig) -> Self {
        Aimd { cfg }
    }
}

impl<I: Ipc> CongAlg<I> for Aimd {
    type Flow = AimdFlow<Datapath<I>>;

    fn name() -> &'static str {
        "aimd"
    }

    fn datapath_programs(&self) -> HashMap<&'static str, Program> {
        let mut h = HashMap::default();
        h.insert(PROGRAM_NAME, report_program());
        h
    }

    fn new_flow(&self, control: Datapath<I>, info: DatapathInfo) -> Result<Self::Flow> {
        AimdFlow::new(control, info, &self.cfg)
    }
}

/// The report fields the policy reads.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AimdReport {
    pub acked: u64,
    pub sacked: u64,
    pub loss: u64,
    pub rtt: u64,
    pub rate: u64,
    pub pkts_inflight: u64,
}

impl AimdReport {
    pub fn decode(m: &Report, sc: &Scope) -> Result<Self> {
        Ok(AimdReport {
            acked: m.get_field("Report.acked", sc)?,
            sacked: m.get_field("Report.sacked", sc)?,
            loss: m.get_field("Report.loss", sc)?,
            rtt: m.get_field("Report.rtt", sc)?,
            rate: m.get_field("Report.rate", sc)?,
            pkts_inflight: m.get_field("Report.pkts_inflight", sc)?,
        })
    }
}

// Truncate to the integer window the datapath enforces.
fn window(cwnd: f64) -> u32 {
    cwnd as u32
}

pub struct AimdFlow<D: DatapathTrait> {
    control: D,
    sc: Scope,
    mss: u32,
    init_cwnd: f64,
    cwnd: f64,
    diag: Diagnostics,
}

impl<D: DatapathTrait> AimdFlow<D> {
    /// Start controlling a flow: the window starts at `mss * init_cwnd_pkts`
    /// and the report program is installed together with that window.
    pub fn new(mut control: D, info: DatapathInfo, cfg: &AimdConfig) -> Result<Self> {
        if info.mss == 0 || cfg.init_cwnd_pkts == 0 {
            return Err(Error::Install(format!(
                "initial window must be positive (mss {}, {} packets)",
                info.mss, cfg.init_cwnd_pkts
            )));
        }

        let init_cwnd = f64::from(info.mss) * f64::from(cfg.init_cwnd_pkts);
        let sc = control
            .set_program(PROGRAM_NAME, Some(&[("Cwnd", window(init_cwnd))][..]))
            .map_err(|e| match e {
                Error::Install(_) => e,
                e => Error::Install(format!("{}", e)),
            })?;

        debug!(sid = info.sock_id, mss = info.mss, init_cwnd, "aimd flow started");
        Ok(AimdFlow {
            control,
            sc,
            mss: info.mss,
            init_cwnd,
            cwnd: init_cwnd,
            diag: cfg.diagnostics.clone(),
        })
    }

    pub fn cwnd(&self) -> f64 {
        self.cwnd
    }

    pub fn init_cwnd(&self) -> f64 {
        self.init_cwnd
    }

    /// The window after `r`, without applying it.
    pub fn next_cwnd(&self, r: &AimdReport) -> Result<f64> {
        let next = if r.loss > 0 || r.sacked > 0 {
            self.cwnd / 2.0
        } else {
            let grown = self.cwnd + f64::from(self.mss) * (r.acked as f64 / self.cwnd);
            grown.max(self.init_cwnd)
        };

        if !next.is_finite() || next <= 0.0 {
            return Err(Error::Policy(format!(
                "cwnd {} -> {} on {:?}",
                self.cwnd, next, r
            )));
        }

        Ok(next)
    }

    fn step(&mut self, m: &Report) -> Result<()> {
        let r = AimdReport::decode(m, &self.sc)?;
        self.diag.report(r.pkts_inflight, r.rtt, r.rate);

        let next = self.next_cwnd(&r)?;
        debug!(
            sid = self.control.get_sock_id(),
            acked = r.acked,
            sacked = r.sacked,
            loss = r.loss,
            rtt = r.rtt,
            old = self.cwnd,
            new = next,
            "cwnd update"
        );
        self.cwnd = next;
        self.control
            .update_field(&self.sc, &[("Cwnd", window(self.cwnd))])
    }
}

impl<D: DatapathTrait> Flow for AimdFlow<D> {
    fn on_report(&mut self, _sock_id: u32, m: Report) -> Result<()> {
        let res = self.step(&m);
        if let Err(ref e) = res {
            self.diag.error(e);
        }

        res
    }

    fn close(&mut self) {
        debug!(sid = self.control.get_sock_id(), cwnd = self.cwnd, "aimd flow closed");
    }
}
