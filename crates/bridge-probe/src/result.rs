//! Result and error types for bridge-probe.

use thiserror::Error;

/// Result type for bridge-probe operations
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Errors that can occur while driving a bridge operation.
///
/// Monitor timeouts are deliberately absent: they are reported through
/// [`crate::MonitorOutcome::TimedOut`] so callers branch on a discriminant.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Browser launch or connection error
    #[error("Browser error: {message}")]
    Browser {
        /// Error message
        message: String,
    },

    /// Page error
    #[error("Page error: {message}")]
    Page {
        /// Error message
        message: String,
    },

    /// Navigation error
    #[error("Navigation to {url} failed: {message}")]
    Navigation {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// A page capability could not be exercised
    #[error("Capability '{capability}' failed: {message}")]
    Capability {
        /// Capability name
        capability: String,
        /// Error message
        message: String,
    },

    /// Operation timed out
    #[error("Operation timed out after {ms}ms")]
    Timeout {
        /// Timeout in milliseconds
        ms: u64,
    },

    /// No monitor registered under this id
    #[error("Monitor not found: {id}")]
    MonitorNotFound {
        /// Monitor id
        id: String,
    },

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Result or artifact could not be written
    #[error("Report error: {message}")]
    Report {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl ProbeError {
    /// Create a page error
    #[must_use]
    pub fn page(message: impl Into<String>) -> Self {
        Self::Page {
            message: message.into(),
        }
    }

    /// Create a capability error
    #[must_use]
    pub fn capability(capability: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Capability {
            capability: capability.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
