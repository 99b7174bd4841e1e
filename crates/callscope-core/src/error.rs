//! Error types for callscope-core.
//!
//! Only failures of the instrumentation layer itself live here. Failures of
//! the instrumented targets are never wrapped: they reach the caller as-is.

/// Result type alias for instrumentation operations.
pub type Result<T> = std::result::Result<T, InstrumentError>;

/// Errors raised by the instrumentation layer.
#[derive(Debug, thiserror::Error)]
pub enum InstrumentError {
    /// The target is neither callable nor an object.
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// An object was tracked without a namespace name.
    #[error("a name is required to track an object")]
    MissingName,

    /// No tokio runtime is available to host the event dispatcher.
    #[error("no tokio runtime available to host the event dispatcher")]
    NoRuntime,

    /// The requested property exists but is not callable.
    #[error("property is not callable: {0}")]
    NotCallable(String),

    /// The requested property does not exist.
    #[error("unknown property: {0}")]
    UnknownProperty(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl InstrumentError {
    /// Creates an invalid target error.
    #[must_use]
    pub fn invalid_target(msg: impl Into<String>) -> Self {
        Self::InvalidTarget(msg.into())
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Returns true if the error was caused by the target handed to `track`.
    #[must_use]
    pub const fn is_target_error(&self) -> bool {
        matches!(self, Self::InvalidTarget(_) | Self::MissingName)
    }
}
