//! Probe error types.

use thiserror::Error;

/// Result type alias for probe operations.
pub type Result<T> = std::result::Result<T, ProbeError>;

/// Why a lifecycle gate did not pass.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The probe did not succeed within its budget.
    #[error("probe-timeout({check})")]
    Timeout {
        /// Identifying tag of the check, e.g. `tcp(client)`.
        check: String,
    },

    /// The probe cannot run or failed unrecoverably.
    #[error("probe-failure({check}): {reason}")]
    Failed {
        /// Identifying tag of the check.
        check: String,
        /// What went wrong.
        reason: String,
    },
}

impl ProbeError {
    /// The tag of the check that failed.
    #[must_use]
    pub fn check(&self) -> &str {
        match self {
            Self::Timeout { check } | Self::Failed { check, .. } => check,
        }
    }
}
