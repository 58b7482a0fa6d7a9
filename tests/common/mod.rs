#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use ccp_aimd::aimd::{Aimd, AimdConfig};
use ccp_aimd::datapath::{Host, Primitives};
use ccp_aimd::diag::Diagnostics;
use ccp_aimd::ipc::chan::Socket;
use ccp_aimd::ipc::{BackendBuilder, Blocking, Nonblocking};
use ccp_aimd::serialize::create;
use ccp_aimd::{CCPHandle, RunBuilder};

pub const MSS: u32 = 1460;
pub const RTT: u64 = 10_000;
pub const WAIT: Duration = Duration::from_secs(5);

/// CCP running AIMD on its own thread, and a userspace datapath connected
/// to it over in-process channels.
pub struct Harness {
    pub host: Host<Socket<Nonblocking>>,
    pub diag: Arc<Mutex<Vec<String>>>,
    ccp: CCPHandle,
}

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
        .try_init();
}

pub fn start(workers: usize) -> Harness {
    init_logging();
    let (to_ccp, from_dp) = crossbeam::channel::unbounded();
    let (to_dp, from_ccp) = crossbeam::channel::unbounded();

    let (diagnostics, diag) = Diagnostics::capture();
    let ccp = RunBuilder::new(BackendBuilder {
        sock: Socket::<Blocking>::new(to_dp, from_dp),
    })
    .default_alg(Aimd::new(AimdConfig {
        diagnostics,
        ..Default::default()
    }))
    .workers(workers)
    .spawn_thread()
    .run()
    .expect("spawn ccp");

    Harness {
        host: Host::new(Socket::<Nonblocking>::new(to_ccp, from_ccp)),
        diag,
        ccp,
    }
}

impl Harness {
    pub fn open(&mut self, sid: u32, mss: u32) -> anyhow::Result<()> {
        self.host.create_flow(create::Msg {
            sid,
            init_cwnd: 0,
            mss,
            src_ip: 0x0100_007f,
            src_port: 4000 + sid,
            dst_ip: 0x0100_007f,
            dst_port: 5201,
        })?;
        self.host.wait_installed(sid, WAIT)?;
        Ok(())
    }

    pub fn cwnd(&self, sid: u32) -> u32 {
        self.host.connection(sid).map_or(0, |c| c.cwnd())
    }

    /// Acks `acked` bytes in `acks` equal pieces over one epoch, starting at
    /// `start`. The last ack crosses the RTT and carries `lost`, so it
    /// triggers the report. Returns the time the epoch ended.
    pub fn epoch(&mut self, sid: u32, start: u64, acks: u64, acked: u64, lost: u64) -> anyhow::Result<u64> {
        for i in 0..acks {
            let last = i + 1 == acks;
            let now = if last { start + RTT + 1 } else { start + i * (RTT / acks) };
            let sent = self.host.on_ack(
                sid,
                &Primitives {
                    bytes_acked: acked / acks,
                    lost_pkts_sample: if last { lost } else { 0 },
                    now,
                    bytes_in_flight: u64::from(self.cwnd(sid)),
                    rate_outgoing: 1_000_000,
                    rtt_sample_us: RTT,
                    ..Default::default()
                },
            )?;
            anyhow::ensure!(sent == last, "report at ack {} of {}", i + 1, acks);
        }

        Ok(start + RTT + 1)
    }

    /// Wait for CCP to push `cwnd` for `sid`.
    pub fn expect_cwnd(&mut self, sid: u32, cwnd: u32) -> anyhow::Result<()> {
        self.host
            .poll_until(WAIT, |h| h.connection(sid).map_or(false, |c| c.cwnd() == cwnd))
            .map_err(|e| anyhow::anyhow!("flow {}: cwnd {} never became {}: {}", sid, self.cwnd(sid), cwnd, e))
    }

    pub fn stop(self) -> anyhow::Result<()> {
        self.ccp.kill();
        self.ccp.wait()?;
        Ok(())
    }
}
