//! Tracing and logging setup shared by binaries, tests and benches.

pub mod tracing;

pub use tracing::{LogConfig, LogFormat, ObservabilityError};

/// Initialize process-wide logging from `RUST_LOG` with JSON output.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Initialize process-wide logging with an explicit configuration.
pub fn init_with(config: &LogConfig) -> Result<(), ObservabilityError> {
    tracing::init_with(config)
}
