//! Helper methods for making algorithm binaries.

use tracing_subscriber::EnvFilter;

/// Install the standard `tracing` subscriber: formatted output to stderr,
/// filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// Must take a String so that clap::Arg::validator will be happy
#[allow(clippy::needless_pass_by_value)]
/// Validator for ipc mechanisms.
pub fn ipc_valid(v: String) -> std::result::Result<(), String> {
    match v.as_str() {
        "unix" => Ok(()),
        _ => Err(format!("ipc must be one of (unix): {:?}", v)),
    }
}

// Must take a String so that clap::Arg::validator will be happy
#[allow(clippy::needless_pass_by_value)]
/// Validator for positive integer arguments.
pub fn positive_int(v: String) -> std::result::Result<(), String> {
    match v.parse::<u32>() {
        Ok(n) if n > 0 => Ok(()),
        _ => Err(format!("expected a positive integer: {:?}", v)),
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn validators() {
        assert!(super::ipc_valid(String::from("unix")).is_ok());
        assert!(super::ipc_valid(String::from("netlink")).is_err());
        assert!(super::positive_int(String::from("10")).is_ok());
        assert!(super::positive_int(String::from("0")).is_err());
        assert!(super::positive_int(String::from("ten")).is_err());
    }
}
