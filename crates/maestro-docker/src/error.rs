//! Error types for daemon communication.

use thiserror::Error;

/// Result type alias for daemon operations.
pub type Result<T> = std::result::Result<T, DaemonError>;

/// Errors raised while talking to a remote container daemon.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// The daemon could not be reached at all. Ship-fatal: every instance
    /// on the ship fails for the current operation.
    #[error("cannot connect to daemon at {endpoint}: {reason}")]
    Connection {
        /// The endpoint that was tried.
        endpoint: String,
        /// Why the connection failed.
        reason: String,
    },

    /// The daemon answered with a non-success status.
    #[error("daemon returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Body of the error response.
        message: String,
    },

    /// The SSH tunnel to the ship could not be established.
    #[error("ssh tunnel failed: {0}")]
    Tunnel(String),

    /// The daemon's response could not be interpreted.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An operation exceeded the ship's configured timeout.
    #[error("daemon operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Local I/O error (socket, certificate files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DaemonError {
    /// Returns true when the daemon reported a missing resource.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }
}
