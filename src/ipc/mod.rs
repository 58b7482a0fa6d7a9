//! A library wrapping various IPC mechanisms with a datagram-oriented
//! messaging layer. This is how CCP communicates with the datapath.

use std::sync::{atomic, Arc, Weak};

use tracing::{debug, warn};

use super::Error;
use super::Result;
use crate::serialize::Msg;

/// Thread-channel implementation
pub mod chan;
/// Unix domain socket implementation
pub mod unix;

/// IPC mechanisms must implement this trait.
pub trait Ipc: 'static + Send + Sync {
    /// Returns the name of this IPC mechanism (e.g. "unix" for Unix datagram sockets)
    fn name() -> String;
    /// Blocking send
    fn send(&self, msg: &[u8]) -> Result<()>;
    /// Blocking listen. Return value is how many bytes were read. Should not allocate.
    fn recv(&self, msg: &mut [u8]) -> Result<usize>;
    /// Close the underlying sockets
    fn close(&mut self) -> Result<()>;
}

/// Marker type specifying that the IPC socket should make blocking calls to the underlying socket
pub struct Blocking;
/// Marker type specifying that the IPC socket should make nonblocking calls to the underlying socket
pub struct Nonblocking;

/// Backend builder contains the objects
/// needed to build a new backend.
pub struct BackendBuilder<T: Ipc> {
    pub sock: T,
}

impl<T: Ipc> BackendBuilder<T> {
    pub fn build(self, atomic_bool: Arc<atomic::AtomicBool>) -> Backend<T> {
        Backend::new(self.sock, atomic_bool)
    }
}

/// A send-only handle to the underlying IPC socket.
pub struct BackendSender<T: Ipc>(Weak<T>);

impl<T: Ipc> BackendSender<T> {
    /// Blocking send.
    pub fn send_msg(&self, msg: &[u8]) -> Result<()> {
        let s = Weak::upgrade(&self.0)
            .ok_or_else(|| Error::Channel(String::from("send on closed IPC socket")))?;
        s.send(msg)
    }
}

impl<T: Ipc> Clone for BackendSender<T> {
    fn clone(&self) -> Self {
        BackendSender(self.0.clone())
    }
}

const RECV_BUF_LEN: usize = 4096;

/// Backend will yield incoming IPC messages forever via `next()`.
/// It owns the socket; `BackendSender` holds weak references.
/// The atomic bool is a way to stop iterating.
pub struct Backend<T: Ipc> {
    sock: Arc<T>,
    continue_listening: Arc<atomic::AtomicBool>,
    receive_buf: [u8; RECV_BUF_LEN],
    tot_read: usize,
    read_until: usize,
}

impl<T: Ipc> Backend<T> {
    pub fn new(sock: T, continue_listening: Arc<atomic::AtomicBool>) -> Self {
        Backend {
            sock: Arc::new(sock),
            continue_listening,
            receive_buf: [0u8; RECV_BUF_LEN],
            tot_read: 0,
            read_until: 0,
        }
    }

    pub fn sender(&self) -> BackendSender<T> {
        BackendSender(Arc::downgrade(&self.sock))
    }

    // calls IPC repeatedly to read one or more messages.
    // Returns the number of bytes now held in self.receive_buf.
    fn get_next_read(&mut self) -> Option<usize> {
        loop {
            // if continue_listening has been set to false, stop iterating
            if !self.continue_listening.load(atomic::Ordering::SeqCst) {
                return None;
            }

            match self.sock.recv(&mut self.receive_buf) {
                Ok(0) => continue,
                Ok(l) => return Some(l),
                Err(Error::Disconnected) => {
                    debug!(ipc = %T::name(), "peer hung up");
                    return None;
                }
                Err(Error::TimedOut) => continue,
                Err(e) => {
                    warn!(ipc = %T::name(), err = %e, "dropping unreadable datagram");
                    continue;
                }
            }
        }
    }
}

impl<T: Ipc> Iterator for Backend<T> {
    type Item = Msg;

    /// Get the next IPC message. A datagram may hold several messages; a
    /// malformed message discards the rest of its datagram.
    fn next(&mut self) -> Option<Msg> {
        loop {
            if self.read_until >= self.tot_read {
                self.tot_read = self.get_next_read()?;
                self.read_until = 0;
            }

            match Msg::from_buf(&self.receive_buf[self.read_until..self.tot_read]) {
                Ok((msg, consumed)) => {
                    self.read_until += consumed;
                    return Some(msg);
                }
                Err(e) => {
                    warn!(err = %e, bytes = self.tot_read - self.read_until, "dropping malformed message");
                    self.read_until = self.tot_read;
                }
            }
        }
    }
}

impl<T: Ipc> Drop for Backend<T> {
    fn drop(&mut self) {
        if let Err(e) = Arc::get_mut(&mut self.sock)
            .ok_or_else(|| Error::Channel(String::from("socket still shared")))
            .and_then(Ipc::close)
        {
            debug!(ipc = %T::name(), err = %e, "could not close socket");
        }
    }
}
