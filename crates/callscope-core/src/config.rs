//! Instrumentation configuration.
//!
//! Validated at load time, with defaults for every field:
//!
//! ```toml
//! separator = "."
//! prefix = "app"
//! trace_events = false
//! remove_panicking_listeners = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{InstrumentError, Result};
use crate::events::DispatchOptions;

/// Instrumentation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentationConfig {
    /// Joins an object's name and a member key (and the prefix to a name).
    pub separator: String,

    /// Namespace prepended to every tracked name.
    pub prefix: Option<String>,

    /// Log every dispatched event at `trace` level.
    pub trace_events: bool,

    /// Unregister listeners that panic.
    pub remove_panicking_listeners: bool,
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            separator: ".".to_string(),
            prefix: None,
            trace_events: false,
            remove_panicking_listeners: false,
        }
    }
}

impl InstrumentationConfig {
    /// Sets the prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Sets the separator.
    #[must_use]
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error if the separator is empty or the prefix is empty or
    /// contains whitespace.
    pub fn validate(&self) -> Result<()> {
        if self.separator.is_empty() {
            return Err(InstrumentError::config("separator cannot be empty"));
        }

        if let Some(prefix) = &self.prefix {
            if prefix.is_empty() {
                return Err(InstrumentError::config("prefix cannot be empty"));
            }
            if prefix.chars().any(char::is_whitespace) {
                return Err(InstrumentError::config("prefix cannot contain whitespace"));
            }
        }

        Ok(())
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    /// Returns an error if the text cannot be parsed or fails validation.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Applies the prefix to a tracked name.
    #[must_use]
    pub fn qualify(&self, name: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}{}{name}", self.separator),
            None => name.to_string(),
        }
    }

    /// Returns the dispatcher switches.
    #[must_use]
    pub const fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            trace_events: self.trace_events,
            remove_panicking_listeners: self.remove_panicking_listeners,
        }
    }
}
