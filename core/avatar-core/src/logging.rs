//! Log filtering shared by the daemon and the CLI.
//!
//! `SAGE_AVATAR_DEBUG_LOG` set to a truthy value forces `debug`; otherwise
//! `RUST_LOG` applies, defaulting to `info`. Each binary picks its own writer.

use std::env;
use tracing_subscriber::EnvFilter;

pub const DEBUG_LOG_ENV: &str = "SAGE_AVATAR_DEBUG_LOG";

pub fn env_filter() -> EnvFilter {
    if debug_requested(env::var(DEBUG_LOG_ENV).ok().as_deref()) {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn debug_requested(value: Option<&str>) -> bool {
    matches!(value, Some("1" | "true" | "TRUE" | "yes" | "YES"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_flag_accepts_truthy_values_only() {
        for value in ["1", "true", "TRUE", "yes", "YES"] {
            assert!(debug_requested(Some(value)), "{value} should enable debug");
        }
        for value in ["0", "false", "no", ""] {
            assert!(!debug_requested(Some(value)), "{value} should not enable debug");
        }
        assert!(!debug_requested(None));
    }
}
