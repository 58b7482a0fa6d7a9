use thiserror::Error;

/// CCP custom `Result` type, using `Error` as the `Err` type.
pub type Result<T> = std::result::Result<T, Error>;

/// CCP custom error type.
///
/// Every variant is scoped to the flow that produced it: the run loop logs it
/// and moves on to the next message.
#[derive(Debug, Error)]
pub enum Error {
    /// A report could not be interpreted against the flow's `Scope`.
    /// The report is discarded.
    #[error("malformed report: {0}")]
    Decode(String),

    /// Computing the new window failed. The previous window stays in effect.
    #[error("cwnd update failed: {0}")]
    Policy(String),

    /// The datapath program or the initial window could not be installed.
    /// The flow is abandoned.
    #[error("datapath program install failed: {0}")]
    Install(String),

    /// A window update could not be pushed to the datapath.
    #[error("could not reach datapath: {0}")]
    Channel(String),

    /// A datapath program failed to type-check or lower.
    #[error("datapath program failed to compile: {0}")]
    Compile(String),

    /// A message on the wire was truncated or otherwise malformed.
    #[error("malformed message: {0}")]
    Serialize(String),

    /// The other end of an in-process channel is gone.
    #[error("ipc peer disconnected")]
    Disconnected,

    /// Nothing arrived before the socket's read timeout.
    #[error("timed out waiting for a message")]
    TimedOut,

    #[error("io: {0}")]
    Io(#[source] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error should be treated as transient (the next report
    /// makes an independent attempt).
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Channel(_) | Error::TimedOut | Error::Io(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        match e.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => Error::TimedOut,
            _ => Error::Io(e),
        }
    }
}

impl From<String> for Error {
    fn from(e: String) -> Error {
        Error::Other(e)
    }
}

impl<'a> From<&'a str> for Error {
    fn from(e: &'a str) -> Error {
        Error::Other(String::from(e))
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(e: std::str::Utf8Error) -> Error {
        Error::Serialize(format!("{}", e))
    }
}

impl<T> From<crossbeam::channel::SendError<T>> for Error {
    fn from(e: crossbeam::channel::SendError<T>) -> Error {
        Error::Channel(format!("{}", e))
    }
}

impl From<crossbeam::channel::RecvTimeoutError> for Error {
    fn from(e: crossbeam::channel::RecvTimeoutError) -> Error {
        match e {
            crossbeam::channel::RecvTimeoutError::Disconnected => Error::Disconnected,
            crossbeam::channel::RecvTimeoutError::Timeout => Error::TimedOut,
        }
    }
}

impl From<crossbeam::channel::TryRecvError> for Error {
    fn from(e: crossbeam::channel::TryRecvError) -> Error {
        match e {
            crossbeam::channel::TryRecvError::Disconnected => Error::Disconnected,
            crossbeam::channel::TryRecvError::Empty => Error::TimedOut,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn transient_errors() {
        assert!(Error::Channel(String::from("closed")).is_transient());
        assert!(!Error::Install(String::from("no")).is_transient());
        assert!(!Error::Decode(String::from("short")).is_transient());
    }

    #[test]
    fn read_timeouts_are_not_io_errors() {
        let e = Error::from(std::io::Error::from(std::io::ErrorKind::WouldBlock));
        assert!(matches!(e, Error::TimedOut));
        let e = Error::from(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(matches!(e, Error::Io(_)));
    }

    #[test]
    fn display() {
        let e = Error::Decode(String::from("field acked not in report"));
        assert_eq!(format!("{}", e), "malformed report: field acked not in report");
    }
}
