use super::{Aggregator, Primitives};
use crate::lang::Bin;
use crate::{Error, Result};

/// The name under which the enforced window is addressed by updates.
pub const CWND_FIELD: &str = "Cwnd";

/// One flow as the datapath sees it: the window it enforces and the program
/// that summarizes its acks.
#[derive(Debug)]
pub struct Connection {
    pub sock_id: u32,
    pub mss: u32,
    cwnd: u32,
    program: Option<Aggregator>,
}

enum Target {
    Cwnd,
    Field(u8),
}

fn saturate(v: u64) -> u32 {
    if v > u64::from(u32::max_value()) {
        u32::max_value()
    } else {
        v as u32
    }
}

fn resolve(bin: Option<&Bin>, name: &str) -> Result<Target> {
    if name == CWND_FIELD {
        return Ok(Target::Cwnd);
    }

    bin.and_then(|b| b.field_index(name))
        .map(Target::Field)
        .ok_or_else(|| Error::Install(format!("no field named {}", name)))
}

impl Connection {
    pub fn new(sock_id: u32, mss: u32, init_cwnd: u32) -> Self {
        Connection {
            sock_id,
            mss,
            cwnd: init_cwnd,
            program: None,
        }
    }

    pub fn cwnd(&self) -> u32 {
        self.cwnd
    }

    pub fn program(&self) -> Option<&Aggregator> {
        self.program.as_ref()
    }

    /// Whether another segment may be sent with `bytes_in_flight` outstanding.
    pub fn can_send(&self, bytes_in_flight: u64) -> bool {
        bytes_in_flight + u64::from(self.mss) <= u64::from(self.cwnd)
    }

    /// Replace the running program and apply `updates`. Either all of it
    /// takes effect or none of it does.
    pub fn install(&mut self, program_uid: u32, bin: Bin, updates: &[(String, u64)]) -> Result<()> {
        let targets = updates
            .iter()
            .map(|(name, _)| resolve(Some(&bin), name))
            .collect::<Result<Vec<_>>>()?;

        let mut agg = Aggregator::new(bin, program_uid);
        let mut cwnd = self.cwnd;
        for (t, (_, v)) in targets.into_iter().zip(updates.iter()) {
            match t {
                Target::Cwnd => cwnd = saturate(*v),
                Target::Field(i) => agg.set_field(i, *v),
            }
        }

        self.program = Some(agg);
        self.cwnd = cwnd;
        Ok(())
    }

    /// Set named fields. Unknown names reject the whole update.
    pub fn update_field(&mut self, fields: &[(String, u64)]) -> Result<()> {
        let targets = fields
            .iter()
            .map(|(name, _)| resolve(self.program.as_ref().map(Aggregator::bin), name))
            .collect::<Result<Vec<_>>>()?;

        for (t, (_, v)) in targets.into_iter().zip(fields.iter()) {
            match t {
                Target::Cwnd => self.cwnd = saturate(*v),
                Target::Field(i) => {
                    if let Some(p) = self.program.as_mut() {
                        p.set_field(i, *v);
                    }
                }
            }
        }

        Ok(())
    }

    /// Run the installed program, if any, on one ack.
    /// Returns `(program_uid, fields)` when a report is due.
    pub fn on_ack(&mut self, prims: &Primitives) -> Option<(u32, &[u64])> {
        let cwnd = self.cwnd;
        let p = self.program.as_mut()?;
        let uid = p.program_uid();
        p.on_ack(prims, cwnd).map(|r| (uid, r))
    }
}
