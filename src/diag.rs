//! The per-report diagnostic stream.
//!
//! Lines look like
//!
//! ```text
//! now=1571234567890 bif= 28800 rtt=20000 
//! rate=1250000
//! ```
//!
//! and `err=<description>` when a report could not be applied. Writing is
//! best-effort: a failed write never affects the control decision.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

/// Where diagnostic lines go.
#[derive(Clone, Debug)]
pub enum Diagnostics {
    Stdout,
    Off,
    /// Keep lines in memory, for tests.
    Capture(Arc<Mutex<Vec<String>>>),
}

impl Default for Diagnostics {
    fn default() -> Self {
        Diagnostics::Stdout
    }
}

impl std::str::FromStr for Diagnostics {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "stdout" => Ok(Diagnostics::Stdout),
            "off" => Ok(Diagnostics::Off),
            _ => Err(format!("diagnostics must be one of (stdout|off): {:?}", s)),
        }
    }
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

impl Diagnostics {
    /// A sink that records lines, and the buffer it records them in.
    pub fn capture() -> (Self, Arc<Mutex<Vec<String>>>) {
        let buf = Arc::new(Mutex::new(vec![]));
        (Diagnostics::Capture(Arc::clone(&buf)), buf)
    }

    fn line(&self, l: String) {
        match self {
            Diagnostics::Stdout => {
                let out = std::io::stdout();
                let mut out = out.lock();
                writeln!(out, "{}", l).unwrap_or(());
            }
            Diagnostics::Off => (),
            Diagnostics::Capture(buf) => {
                if let Ok(mut b) = buf.lock() {
                    b.push(l);
                }
            }
        }
    }

    pub fn report(&self, pkts_inflight: u64, rtt: u64, rate: u64) {
        if let Diagnostics::Off = self {
            return;
        }

        self.line(format!("now={} bif= {} rtt={} ", now_ms(), pkts_inflight, rtt));
        self.line(format!("rate={}", rate));
    }

    pub fn error(&self, e: &dyn std::fmt::Display) {
        self.line(format!("err={}", e));
    }
}

#[cfg(test)]
mod tests {
    use super::Diagnostics;

    #[test]
    fn lines() {
        let (d, buf) = Diagnostics::capture();
        d.report(28800, 20000, 125);
        d.error(&"boom");
        let lines = buf.lock().unwrap();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("now="));
        assert!(lines[0].ends_with(" bif= 28800 rtt=20000 "));
        assert_eq!(lines[1], "rate=125");
        assert_eq!(lines[2], "err=boom");
    }

    #[test]
    fn parse() {
        assert!(matches!("off".parse::<Diagnostics>(), Ok(Diagnostics::Off)));
        assert!(matches!("stdout".parse::<Diagnostics>(), Ok(Diagnostics::Stdout)));
        assert!("file".parse::<Diagnostics>().is_err());
    }
}
