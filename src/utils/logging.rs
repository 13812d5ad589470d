//! Subscriber setup for the `train` binary
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the application.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter directive for a run
///
/// Everything logs at `warn`; `log_messages` raises this crate to `info`.
pub fn log_filter(log_messages: bool) -> String {
    if log_messages {
        format!("warn,{}=info", env!("CARGO_CRATE_NAME"))
    } else {
        "warn".to_string()
    }
}

/// Install the global subscriber; `RUST_LOG` takes precedence over `directive`
///
/// Returns false when a subscriber was already installed.
pub fn setup_logging(directive: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .with(filter)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_setup_is_rejected() {
        setup_logging("warn");
        assert!(!setup_logging("info"));
    }

    #[test]
    fn test_log_filter() {
        assert_eq!(log_filter(true), "warn,tcn_segmenter=info");
        assert_eq!(log_filter(false), "warn");
        assert!(log_filter(true).parse::<EnvFilter>().is_ok());
    }
}
