//! Tracing and logging setup shared by relay binaries and tests.

/// Initialize process-wide tracing with `RUST_LOG` (default `info`).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() -> bool {
    tracing::init()
}

pub use crate::tracing::init_with_filter;

/// Tracing configuration (filters, layers).
pub mod tracing;
