use std::marker::PhantomData;
use std::os::unix::net::UnixDatagram;
use std::path::PathBuf;

use super::Error;
use super::Result;

/// Directory holding the socket files of CCP and its datapaths.
pub const SOCK_DIR: &str = "/tmp/ccp";

/// A Unix datagram socket bound at `/tmp/ccp/<bind_to>` that sends to
/// `/tmp/ccp/<send_to>`.
pub struct Socket<T> {
    sk: UnixDatagram,
    bound: PathBuf,
    dest: PathBuf,
    _phantom: PhantomData<T>,
}

impl<T> Socket<T> {
    fn __new(bind_to: &str, send_to: &str) -> Result<Self> {
        std::fs::create_dir_all(SOCK_DIR)?;
        let bound = PathBuf::from(SOCK_DIR).join(bind_to);
        if let Err(e) = std::fs::remove_file(&bound) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(Error::from(e));
            }
        }

        let sock = UnixDatagram::bind(&bound)?;
        sock.set_read_timeout(Some(std::time::Duration::from_secs(1)))?;

        Ok(Socket {
            sk: sock,
            bound,
            dest: PathBuf::from(SOCK_DIR).join(send_to),
            _phantom: PhantomData,
        })
    }
}

impl<T: 'static + Sync + Send> super::Ipc for Socket<T> {
    fn name() -> String {
        String::from("unix")
    }

    fn send(&self, msg: &[u8]) -> Result<()> {
        self.sk
            .send_to(msg, &self.dest)
            .map(|_| ())
            .map_err(Error::from)
    }

    fn recv(&self, msg: &mut [u8]) -> Result<usize> {
        self.sk.recv(msg).map_err(Error::from)
    }

    fn close(&mut self) -> Result<()> {
        use std::net::Shutdown;
        self.sk.shutdown(Shutdown::Both).map_err(Error::from)
    }
}

impl<T> Drop for Socket<T> {
    fn drop(&mut self) {
        std::fs::remove_file(&self.bound).unwrap_or(());
    }
}

use super::Blocking;
impl Socket<Blocking> {
    pub fn new(bind_to: &str, send_to: &str) -> Result<Self> {
        Socket::__new(bind_to, send_to)
    }
}

use super::Nonblocking;
impl Socket<Nonblocking> {
    pub fn new(bind_to: &str, send_to: &str) -> Result<Self> {
        let sk = Socket::__new(bind_to, send_to)?;
        sk.sk.set_nonblocking(true).map_err(Error::from)?;
        Ok(sk)
    }
}
