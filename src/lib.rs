//! An AIMD congestion controller for the Congestion Control Plane (CCP).
//!
//! Congestion control is split in two. The datapath (a TCP stack) runs a
//! small [program](./lang/index.html) against every ack, folding the ack's
//! measurements into a report, and sends the report to CCP when the program
//! says so. CCP runs the control policy on each report and pushes the new
//! congestion window back to the datapath, which enforces it.
//!
//! This crate contains:
//! 1. The control plane: [`RunBuilder`](./struct.RunBuilder.html) listens on an
//!    [IPC socket](./ipc/index.html), creates a [`Flow`](./trait.Flow.html) per
//!    connection through [`CongAlg::new_flow`](./trait.CongAlg.html), and hands
//!    it the connection's reports.
//! 2. The policy: [`aimd::Aimd`](./aimd/struct.Aimd.html), additive increase
//!    and multiplicative decrease on a per-flow window.
//! 3. A userspace [datapath](./datapath/index.html) that evaluates programs
//!    and enforces windows, used by the tests and the `mock_datapath` binary.
//!
//! # Example
//!
//! ```rust,no_run
//! use ccp_aimd::aimd::{Aimd, AimdConfig};
//! use ccp_aimd::ipc::{unix::Socket, BackendBuilder, Blocking};
//! use ccp_aimd::RunBuilder;
//!
//! let sock = Socket::<Blocking>::new("ccp", "datapath").expect("ipc initialization");
//! RunBuilder::new(BackendBuilder { sock })
//!     .default_alg(Aimd::new(AimdConfig::default()))
//!     .workers(4)
//!     .run()
//!     .expect("ccp run loop");
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

pub mod aimd;
pub mod algs;
pub mod datapath;
pub mod diag;
mod errors;
pub mod ipc;
pub mod lang;
mod run;
pub mod serialize;

pub use crate::errors::*;
pub use crate::run::{CCPHandle, NoSpawn, RunBuilder, Spawn};

use crate::ipc::Ipc;
use crate::ipc::BackendSender;
use crate::lang::{Bin, Program, Scope};
use crate::serialize::{install, update_field};

/// Static facts about a connection, sent by the datapath when it opens.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DatapathInfo {
    pub sock_id: u32,
    pub init_cwnd: u32,
    pub mss: u32,
    pub src_ip: u32,
    pub src_port: u32,
    pub dst_ip: u32,
    pub dst_port: u32,
}

/// What a flow may ask of its datapath.
pub trait DatapathTrait {
    fn get_sock_id(&self) -> u32;

    /// Install the named program on this flow, setting `fields` in the same
    /// step. Returns the program's `Scope`.
    fn set_program(
        &mut self,
        program_name: &str,
        fields: Option<&[(&str, u32)]>,
    ) -> Result<Scope>;

    /// Set fields of the running program. `"Cwnd"` sets the window.
    fn update_field(&self, sc: &Scope, update: &[(&str, u32)]) -> Result<()>;
}

/// A per-flow handle to the datapath, backed by the IPC socket.
pub struct Datapath<I: Ipc> {
    sock_id: u32,
    sender: BackendSender<I>,
    programs: Arc<HashMap<String, (Bin, Scope)>>,
}

impl<I: Ipc> Datapath<I> {
    pub(crate) fn new(
        sock_id: u32,
        sender: BackendSender<I>,
        programs: Arc<HashMap<String, (Bin, Scope)>>,
    ) -> Self {
        Datapath {
            sock_id,
            sender,
            programs,
        }
    }
}

fn check_fields(sc: &Scope, fields: &[(&str, u32)]) -> std::result::Result<Vec<(String, u64)>, String> {
    fields
        .iter()
        .map(|&(name, val)| {
            if name == datapath::CWND_FIELD || sc.has(name) {
                Ok((name.to_owned(), u64::from(val)))
            } else {
                Err(format!(
                    "program {} has no field {}",
                    sc.program_name, name
                ))
            }
        })
        .collect()
}

impl<I: Ipc> DatapathTrait for Datapath<I> {
    fn get_sock_id(&self) -> u32 {
        self.sock_id
    }

    fn set_program(
        &mut self,
        program_name: &str,
        fields: Option<&[(&str, u32)]>,
    ) -> Result<Scope> {
        let (bin, sc) = self
            .programs
            .get(program_name)
            .ok_or_else(|| Error::Install(format!("unknown datapath program {}", program_name)))?;
        let updates = check_fields(sc, fields.unwrap_or(&[])).map_err(Error::Install)?;

        let msg = install::Msg {
            sid: self.sock_id,
            program_uid: sc.program_uid,
            num_updates: updates.len() as u32,
            updates,
            instrs: bin.clone(),
        };
        let buf = serialize::serialize(&msg)?;
        self.sender
            .send_msg(&buf[..])
            .map_err(|e| Error::Install(format!("{}", e)))?;
        debug!(sid = self.sock_id, program = program_name, uid = sc.program_uid, "installed program");
        Ok(sc.clone())
    }

    fn update_field(&self, sc: &Scope, update: &[(&str, u32)]) -> Result<()> {
        let fields = check_fields(sc, update).map_err(Error::Channel)?;
        let msg = update_field::Msg {
            sid: self.sock_id,
            num_fields: fields.len() as u8,
            fields,
        };
        let buf = serialize::serialize(&msg)?;
        self.sender
            .send_msg(&buf[..])
            .map_err(|e| Error::Channel(format!("{}", e)))
    }
}

/// One report from the datapath: the fields of the program that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct Report {
    pub program_uid: u32,
    fields: Vec<u64>,
}

impl Report {
    pub fn new(program_uid: u32, fields: Vec<u64>) -> Self {
        Report { program_uid, fields }
    }

    /// Read `field` (`acked` or `Report.acked`) using the `Scope` of the
    /// program the flow installed. Reports from any other program, and
    /// reports too short to hold the field, are rejected.
    pub fn get_field(&self, field: &str, sc: &Scope) -> Result<u64> {
        if sc.program_uid != self.program_uid {
            return Err(Error::Decode(format!(
                "report from program {}, expected {} ({})",
                self.program_uid, sc.program_uid, sc.program_name
            )));
        }

        let &(idx, _) = sc.get(field).ok_or_else(|| {
            Error::Decode(format!("{} has no field {}", sc.program_name, field))
        })?;

        self.fields.get(idx as usize).copied().ok_or_else(|| {
            Error::Decode(format!(
                "field {} at {} but report has {} fields",
                field,
                idx,
                self.fields.len()
            ))
        })
    }
}

/// A congestion control algorithm: the datapath programs it needs and how
/// to start controlling a new flow.
pub trait CongAlg<I: Ipc> {
    type Flow: Flow;

    fn name() -> &'static str;
    fn datapath_programs(&self) -> HashMap<&'static str, Program>;
    /// Set up a new flow. On error the flow is left uncontrolled.
    fn new_flow(&self, control: Datapath<I>, info: DatapathInfo) -> Result<Self::Flow>;
}

/// Per-flow control state.
pub trait Flow {
    /// Handle one report. An error leaves the flow's state as it was before
    /// the report; the caller logs it and moves on.
    fn on_report(&mut self, sock_id: u32, m: Report) -> Result<()>;

    /// The datapath closed the connection.
    fn close(&mut self) {}
}
