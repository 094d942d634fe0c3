//! Error types for the reconciler crate.

use thiserror::Error;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
#[derive(Error, Debug)]
pub enum Error {
    /// The platform supports neither brokers nor visibilities.
    #[error("platform supports neither broker nor visibility management")]
    MissingCapability,

    /// An authoritative listing could not be fetched.
    #[error("fetching {what} failed: {reason}")]
    FetchFailed { what: String, reason: String },

    /// A notification payload did not carry what its operation needs.
    #[error("invalid notification payload: {reason}")]
    InvalidPayload { reason: String },

    /// A platform or registry call failed.
    #[error("platform call failed: {0}")]
    Platform(#[from] brokersync_core::Error),

    /// A fan-out task panicked or was aborted.
    #[error("task failed: {reason}")]
    TaskFailed { reason: String },

    /// The reconciler was assembled incompletely.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Work was cut short by shutdown.
    #[error("reconciliation cancelled")]
    Cancelled,
}

impl Error {
    /// Create a fetch failed error.
    pub fn fetch_failed(what: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::FetchFailed {
            what: what.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an invalid payload error.
    pub fn invalid_payload(reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            reason: reason.into(),
        }
    }

    /// Create a task failed error.
    pub fn task_failed(reason: impl Into<String>) -> Self {
        Self::TaskFailed {
            reason: reason.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Whether the error stems from shutdown.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
