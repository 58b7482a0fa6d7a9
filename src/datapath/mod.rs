//! The fast path: a datapath that runs installed programs against acks and
//! enforces the window CCP chooses.
//!
//! A kernel or userspace TCP stack links something like this; the crate's
//! own integration tests and the `mock_datapath` binary drive it directly.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::ipc::Ipc;
use crate::serialize::{self, Msg};
use crate::{Error, Result};

mod aggregator;
mod connection;
mod prims;

pub use self::aggregator::Aggregator;
pub use self::connection::{Connection, CWND_FIELD};
pub use self::prims::Primitives;

/// Datapath side of the control channel: a set of connections plus the
/// socket to CCP.
pub struct Host<I: Ipc> {
    sock: I,
    conns: HashMap<u32, Connection>,
    buf: Vec<u8>,
}

impl<I: Ipc> Host<I> {
    pub fn new(sock: I) -> Self {
        Host {
            sock,
            conns: HashMap::new(),
            buf: vec![0u8; 4096],
        }
    }

    pub fn connection(&self, sock_id: u32) -> Option<&Connection> {
        self.conns.get(&sock_id)
    }

    /// Open a flow and tell CCP about it.
    pub fn create_flow(&mut self, info: serialize::create::Msg) -> Result<()> {
        if self.conns.contains_key(&info.sid) {
            debug!(sid = info.sid, "re-creating connection");
        }

        self.conns.insert(
            info.sid,
            Connection::new(info.sid, info.mss, info.init_cwnd),
        );
        let buf = serialize::serialize(&info)?;
        self.sock.send(&buf)
    }

    /// Feed one ack to a flow. Returns whether a report was sent.
    pub fn on_ack(&mut self, sock_id: u32, prims: &Primitives) -> Result<bool> {
        let conn = self
            .conns
            .get_mut(&sock_id)
            .ok_or_else(|| Error::Other(format!("no connection {}", sock_id)))?;
        let (program_uid, fields) = match conn.on_ack(prims) {
            Some(r) => r,
            None => return Ok(false),
        };

        let msg = serialize::measure::Msg {
            sid: sock_id,
            program_uid,
            num_fields: fields.len() as u8,
            fields: fields.to_vec(),
        };
        let buf = serialize::serialize(&msg)?;
        self.sock.send(&buf)?;
        Ok(true)
    }

    /// Forget a flow and tell CCP it is gone.
    pub fn close_flow(&mut self, sock_id: u32) -> Result<()> {
        self.conns.remove(&sock_id);
        let buf = serialize::serialize(&serialize::measure::Msg::close(sock_id))?;
        self.sock.send(&buf)
    }

    /// Receive and apply at most one datagram from CCP.
    /// Returns the number of messages applied.
    pub fn poll(&mut self) -> Result<usize> {
        let len = match self.sock.recv(&mut self.buf) {
            Ok(l) => l,
            Err(Error::Disconnected) => return Err(Error::Disconnected),
            // nothing to read
            Err(_) => return Ok(0),
        };

        let mut read = 0;
        let mut applied = 0;
        while read < len {
            let (msg, consumed) = match Msg::from_buf(&self.buf[read..len]) {
                Ok(m) => m,
                Err(e) => {
                    warn!(err = %e, "dropping malformed message from ccp");
                    break;
                }
            };

            read += consumed;
            if self.apply(msg) {
                applied += 1;
            }
        }

        Ok(applied)
    }

    fn apply(&mut self, msg: Msg) -> bool {
        let sid = msg.sid();
        let conn = match self.conns.get_mut(&sid) {
            Some(c) => c,
            None => {
                debug!(sid, "message for unknown connection");
                return false;
            }
        };

        let res = match msg {
            Msg::Ins(ins) => conn.install(ins.program_uid, ins.instrs, &ins.updates),
            Msg::Upd(upd) => conn.update_field(&upd.fields),
            m => {
                debug!(sid, msg = ?m, "ignoring message");
                return false;
            }
        };

        match res {
            Ok(()) => true,
            Err(e) => {
                warn!(sid, err = %e, "could not apply message");
                false
            }
        }
    }

    /// Poll until `done` holds or `timeout` passes.
    pub fn poll_until<F>(&mut self, timeout: Duration, mut done: F) -> Result<()>
    where
        F: FnMut(&Self) -> bool,
    {
        let deadline = Instant::now() + timeout;
        while !done(self) {
            if Instant::now() > deadline {
                return Err(Error::Channel(String::from("timed out waiting for ccp")));
            }

            if self.poll()? == 0 {
                std::thread::sleep(Duration::from_millis(1));
            }
        }

        Ok(())
    }

    /// Wait for CCP to install a program on `sock_id`.
    pub fn wait_installed(&mut self, sock_id: u32, timeout: Duration) -> Result<()> {
        self.poll_until(timeout, |h| {
            h.connection(sock_id)
                .map_or(false, |c| c.program().is_some())
        })
    }
}
