use std::marker::PhantomData;

use crossbeam::channel::{Receiver, Sender};

use super::Error;
use super::Result;

/// An in-process socket: one end of a pair of `crossbeam` channels.
pub struct Socket<T> {
    send: Option<Sender<Vec<u8>>>,
    recv: Option<Receiver<Vec<u8>>>,
    _phantom: PhantomData<T>,
}

impl<T> Socket<T> {
    pub fn new(send: Sender<Vec<u8>>, recv: Receiver<Vec<u8>>) -> Self {
        Socket {
            send: Some(send),
            recv: Some(recv),
            _phantom: PhantomData::<T>,
        }
    }

    fn __name() -> String {
        String::from("channel")
    }

    fn __send(&self, msg: &[u8]) -> Result<()> {
        let s = self
            .send
            .as_ref()
            .ok_or_else(|| Error::Channel(String::from("send channel side missing")))?;
        s.send(msg.to_vec())?;
        Ok(())
    }

    fn __recv(&self) -> Result<&Receiver<Vec<u8>>> {
        self.recv
            .as_ref()
            .ok_or_else(|| Error::Channel(String::from("receive channel side missing")))
    }

    fn __close(&mut self) -> Result<()> {
        self.send.take();
        self.recv.take();
        Ok(())
    }
}

fn copy_out(buf: Vec<u8>, msg: &mut [u8]) -> Result<usize> {
    if buf.len() > msg.len() {
        return Err(Error::Channel(format!(
            "datagram of {} bytes does not fit {} byte buffer",
            buf.len(),
            msg.len()
        )));
    }

    msg[..buf.len()].copy_from_slice(&buf);
    Ok(buf.len())
}

use super::Blocking;
impl super::Ipc for Socket<Blocking> {
    fn name() -> String {
        Self::__name()
    }

    fn send(&self, msg: &[u8]) -> Result<()> {
        self.__send(msg)
    }

    fn recv(&self, msg: &mut [u8]) -> Result<usize> {
        let buf = self
            .__recv()?
            .recv_timeout(std::time::Duration::from_secs(1))?;
        copy_out(buf, msg)
    }

    fn close(&mut self) -> Result<()> {
        self.__close()
    }
}

use super::Nonblocking;
impl super::Ipc for Socket<Nonblocking> {
    fn name() -> String {
        Self::__name()
    }

    fn send(&self, msg: &[u8]) -> Result<()> {
        self.__send(msg)
    }

    fn recv(&self, msg: &mut [u8]) -> Result<usize> {
        let buf = self.__recv()?.try_recv()?;
        copy_out(buf, msg)
    }

    fn close(&mut self) -> Result<()> {
        self.__close()
    }
}
