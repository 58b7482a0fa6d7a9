//! Datapath programs.
//!
//! A datapath program tells the datapath how to fold per-ack measurements into
//! a report, and when to send that report to CCP. It consists of three parts,
//! in order:
//!
//! 1. Field declarations. Every field is part of the report. A field declared
//!    `volatile` is reset to its initial value right after each report is
//!    sent: a field counting acknowledged bytes would be declared volatile so
//!    that each report carries only the bytes acknowledged in its own epoch.
//! 2. Rules, `field := expr`, evaluated in order on every ack.
//! 3. A single trigger: once the rules have run, if the trigger condition
//!    holds the datapath sends a report and, optionally, resets `Micros`.
//!
//! Programs are built in memory with [`Program`](struct.Program.html):
//!
//! ```
//! use ccp_aimd::lang::{self, Expr, Prim, Program, Value};
//!
//! // count ECN-marked packets over 1 millisecond intervals
//! let prog = Program::new("ecn")
//!     .volatile("ecnpackets", Value::Num(0))
//!     .rule(
//!         "ecnpackets",
//!         Expr::add(Expr::field("ecnpackets"), Prim::AckEcnPackets.into()),
//!     )
//!     .report_when(Expr::gt(Expr::Micros, Expr::Num(1000)), true);
//! let (bin, scope) = lang::compile(&prog).unwrap();
//! assert_eq!(scope.num_fields(), 1);
//! ```
//!
//! Available Primitives
//! --------------------
//!
//!  Name                   | Description
//! ------------------------|-----------------------------
//! "Ack.bytes_acked"       | In-order bytes acked
//! "Ack.bytes_misordered"  | Out-of-order bytes acked
//! "Ack.ecn_packets"       | ECN-marked packets
//! "Ack.lost_pkts_sample"  | Number of lost packets
//! "Ack.now"               | Current time
//! "Ack.packets_acked"     | In-order packets acked
//! "Ack.packets_misordered"| Out-of-order packets acked
//! "Flow.bytes_in_flight"  | Bytes in flight
//! "Flow.bytes_pending"    | Bytes in socket buffer
//! "Flow.packets_in_flight"| Packets in flight
//! "Flow.rate_incoming"    | Incoming rate
//! "Flow.rate_outgoing"    | Outgoing rate
//! "Flow.rtt_sample_us"    | Round-trip time
//! "Flow.was_timeout"      | Did a timeout occur?
//!
//! Besides these, `Micros` holds the microseconds since the current report
//! epoch began and `Cwnd` the window the datapath is enforcing.

use crate::Result;

mod datapath;
mod prog;
mod serialize;

pub use self::datapath::{Bin, Def, Instr, Reg, Scope};
pub use self::datapath::{MAX_FIELDS, MAX_INSTRS, MAX_TMPS};
pub use self::prog::{Expr, FieldDecl, Op, Prim, Program, Rule, Trigger, Type, Value};

/// Type-check a program and lower it into a `Bin` the datapath can run.
/// The returned `Scope` is needed to read fields out of the reports the
/// program produces.
pub fn compile(prog: &Program) -> Result<(Bin, Scope)> {
    Bin::compile_prog(prog)
}
