//! Tracing/logging initialization.
//!
//! Logs are JSON lines with timestamps. Library crates only emit events
//! through `tracing` macros; installing the subscriber is left to whoever
//! owns the process.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Install the subscriber, filtering with `RUST_LOG` when it parses and
/// `info` otherwise.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init() -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    install(filter)
}

/// Install the subscriber with explicit directives, e.g.
/// `"eventrelay_infra=debug,info"`. Unparseable directives fall back to
/// `info`.
pub fn init_with_filter(directives: &str) -> bool {
    let filter =
        EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    install(filter)
}

fn install(filter: EnvFilter) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_a_no_op() {
        // Only test in this binary touching the global subscriber.
        assert!(init_with_filter("eventrelay_infra=debug,warn"));
        assert!(!init());
        assert!(!init_with_filter("not a [valid filter"));
        ::tracing::info!(component = "observability", "subscriber installed");
    }
}
