//! Drives synthetic flows through a single bottleneck against a running
//! `ccp_aimd`, for trying out the control loop without a kernel datapath.

use std::time::Duration;

use clap::Arg;
use tracing::{info, warn};

use ccp_aimd::datapath::{Host, Primitives};
use ccp_aimd::ipc::unix::Socket;
use ccp_aimd::ipc::Nonblocking;
use ccp_aimd::serialize::create;
use ccp_aimd::Result;

const MSS: u32 = 1460;
const ACKS_PER_RTT: u64 = 10;

/// A drop-tail bottleneck shared by every flow.
struct Link {
    /// bytes per microsecond
    capacity: f64,
    base_rtt: u64,
    buffer: u64,
}

impl Link {
    fn bdp(&self) -> u64 {
        (self.capacity * self.base_rtt as f64) as u64
    }

    /// RTT and lost packets for one round with `inflight` bytes outstanding in total.
    fn round(&self, inflight: u64) -> (u64, u64) {
        let queued = inflight.saturating_sub(self.bdp());
        let dropped = queued.saturating_sub(self.buffer);
        let delay = (queued.min(self.buffer) as f64 / self.capacity) as u64;
        (self.base_rtt + delay, dropped / u64::from(MSS))
    }
}

/// One flow's acks for a round starting at `now`. The last ack crosses the
/// rtt and carries the round's losses, so the round ends in exactly one
/// report.
fn round_acks(now: u64, rtt: u64, cwnd: u64, lost: u64) -> Vec<Primitives> {
    let step = rtt / ACKS_PER_RTT;
    let rate = cwnd * 1_000_000 / rtt.max(1);
    (0..ACKS_PER_RTT)
        .map(|k| (k, k + 1 == ACKS_PER_RTT))
        .map(|(k, last)| Primitives {
            bytes_acked: cwnd / ACKS_PER_RTT,
            packets_acked: cwnd / ACKS_PER_RTT / u64::from(MSS),
            lost_pkts_sample: if last { lost } else { 0 },
            now: if last { now + rtt + 1 } else { now + k * step },
            bytes_in_flight: cwnd,
            packets_in_flight: cwnd / u64::from(MSS),
            rate_outgoing: rate,
            rtt_sample_us: rtt,
            ..Default::default()
        })
        .collect()
}

fn run(flows: u32, rounds: u32, link: &Link, sock: Socket<Nonblocking>) -> Result<()> {
    let mut host = Host::new(sock);
    for sid in 1..=flows {
        host.create_flow(create::Msg {
            sid,
            init_cwnd: 10 * MSS,
            mss: MSS,
            src_ip: 0,
            src_port: 0,
            dst_ip: 0,
            dst_port: 0,
        })?;
        host.wait_installed(sid, Duration::from_secs(5))?;
    }

    let mut now = 0u64;
    for round in 0..rounds {
        let windows: Vec<u64> = (1..=flows)
            .map(|sid| host.connection(sid).map_or(0, |c| u64::from(c.cwnd())))
            .collect();
        let total: u64 = windows.iter().sum();
        let (rtt, lost) = link.round(total);

        for (i, &cwnd) in windows.iter().enumerate() {
            let sid = i as u32 + 1;
            // losses fall on flows in proportion to their share
            let flow_lost = if total == 0 { 0 } else { lost * cwnd / total };
            for prims in round_acks(now, rtt, cwnd, flow_lost) {
                host.on_ack(sid, &prims)?;
            }
        }

        now += rtt + 1;
        // give ccp a moment to answer this round's reports
        host.poll_until(Duration::from_millis(50), |_| false).unwrap_or(());
        info!(round, total_cwnd = total, rtt, lost, "round done");
    }

    for sid in 1..=flows {
        host.close_flow(sid)?;
    }

    Ok(())
}

fn main() {
    ccp_aimd::algs::init_tracing();
    let matches = clap::App::new("mock datapath")
        .version("0.1.0")
        .about("Synthetic flows through one bottleneck, controlled by CCP over a unix socket")
        .arg(Arg::with_name("flows").long("flows").default_value("1").validator(ccp_aimd::algs::positive_int))
        .arg(Arg::with_name("rounds").long("rounds").default_value("100").validator(ccp_aimd::algs::positive_int))
        .arg(Arg::with_name("bind").long("bind").default_value("datapath"))
        .arg(Arg::with_name("ccp").long("ccp").default_value("ccp"))
        .get_matches();

    let num = |name: &str| -> u32 {
        matches
            .value_of(name)
            .and_then(|v| v.parse().ok())
            .unwrap_or(1)
    };

    let link = Link {
        // 12 Mbit/s
        capacity: 1.5,
        base_rtt: 20_000,
        buffer: 30_000,
    };

    let sock = Socket::<Nonblocking>::new(
        matches.value_of("bind").unwrap_or("datapath"),
        matches.value_of("ccp").unwrap_or("ccp"),
    )
    .expect("ipc initialization");
    if let Err(e) = run(num("flows"), num("rounds"), &link, sock) {
        warn!(err = %e, "mock datapath failed");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::{round_acks, ACKS_PER_RTT};
    use ccp_aimd::aimd::report_program;
    use ccp_aimd::datapath::Aggregator;
    use ccp_aimd::lang;

    #[test]
    fn one_report_per_round() {
        let (bin, sc) = lang::compile(&report_program()).expect("compile");
        let acked = sc.get("acked").expect("acked field").0 as usize;
        let loss = sc.get("loss").expect("loss field").0 as usize;
        let mut agg = Aggregator::new(bin, sc.program_uid);

        let mut now = 0;
        for (rtt, cwnd, lost) in [(20_000, 14_600, 0), (25_000, 29_200, 3), (21_000, 14_600, 0)].iter() {
            let acks = round_acks(now, *rtt, *cwnd, *lost);
            for (k, prims) in acks.iter().enumerate() {
                let report = agg.on_ack(prims, *cwnd as u32).map(|r| r.to_vec());
                if k as u64 + 1 == ACKS_PER_RTT {
                    let r = report.expect("report at the end of the round");
                    assert_eq!(r[acked], cwnd / ACKS_PER_RTT * ACKS_PER_RTT);
                    assert_eq!(r[loss], *lost);
                } else {
                    assert!(report.is_none(), "early report at ack {}", k);
                }
            }

            now += rtt + 1;
        }
    }
}
