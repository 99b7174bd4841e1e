//! Test error types.

use std::time::Duration;

/// Result type alias for test operations.
pub type Result<T> = std::result::Result<T, TestError>;

/// Testing errors.
#[derive(Debug, thiserror::Error)]
pub enum TestError {
    /// Assertion failed.
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// Timeout.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// Instrumentation error.
    #[error("instrumentation error: {0}")]
    Instrument(#[from] callscope_core::InstrumentError),
}

impl TestError {
    /// Creates an assertion error.
    #[must_use]
    pub fn assertion(msg: impl Into<String>) -> Self {
        Self::Assertion(msg.into())
    }
}
