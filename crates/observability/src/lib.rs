//! Tracing and logging setup shared by stockledger binaries.

/// Initialize process-wide tracing with the format chosen by
/// `STOCKLEDGER_LOG_FORMAT` (`json`, the default, or `text`).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(tracing::LogFormat::from_env());
}

/// Tracing configuration (filters, formats).
pub mod tracing;
