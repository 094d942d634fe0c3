//! Error types for the notification stream.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for stream operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Notification stream error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Could not establish the stream connection.
    #[error("connection failed: {reason}")]
    ConnectionFailed { reason: String },

    /// The requested revision has aged out on the server.
    #[error("notification revision {revision} is no longer available")]
    RevisionGone { revision: i64 },

    /// The upgrade response lacked or garbled a required header.
    #[error("invalid handshake: {reason}")]
    InvalidHandshake { reason: String },

    /// Nothing arrived within the read deadline.
    #[error("no activity on notification stream for {}ms", .deadline.as_millis())]
    PingTimeout { deadline: Duration },

    /// The server closed the stream.
    #[error("notification stream closed by server")]
    StreamClosed,

    /// An inbound frame was not a valid notification.
    #[error("failed to decode notification: {0}")]
    Decode(#[from] serde_json::Error),

    /// Transport failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The message consumer went away.
    #[error("message channel closed")]
    ChannelClosed,

    /// Shutdown was requested.
    #[error("cancelled")]
    Cancelled,

    /// Configuration problem.
    #[error("core error: {0}")]
    Core(#[from] brokersync_core::Error),
}

impl Error {
    /// Create a connection failed error.
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            reason: reason.into(),
        }
    }

    /// Create an invalid handshake error.
    pub fn invalid_handshake(reason: impl Into<String>) -> Self {
        Self::InvalidHandshake {
            reason: reason.into(),
        }
    }

    /// Whether the server rejected the requested revision as stale.
    pub const fn is_revision_gone(&self) -> bool {
        matches!(self, Self::RevisionGone { .. })
    }

    /// Whether the error stems from shutdown rather than a failure.
    pub const fn is_shutdown(&self) -> bool {
        matches!(self, Self::Cancelled | Self::ChannelClosed)
    }
}
