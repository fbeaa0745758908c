//! Engine runtime error types.

use maestro_docker::DaemonError;
use maestro_probes::ProbeError;
use thiserror::Error;

use crate::controller::Phase;

/// Errors raised while orchestrating instances.
///
/// Connection errors are ship-fatal, controller and probe errors are
/// instance-fatal; none of them aborts the walk unless stop-on-failure
/// is requested.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The ship's daemon could not be reached.
    #[error("connection to ship {ship} failed: {reason}")]
    Connection {
        /// Name of the unreachable ship.
        ship: String,
        /// Underlying connection failure, rendered once so the error can
        /// be reported for every instance on the ship.
        reason: String,
    },

    /// A daemon call failed during a lifecycle operation.
    #[error("{phase} failed: {source}")]
    Controller {
        /// The operation phase that failed.
        phase: Phase,
        /// Underlying daemon error.
        #[source]
        source: DaemonError,
    },

    /// A lifecycle gate did not pass.
    #[error(transparent)]
    Probe(#[from] ProbeError),

    /// A target token matched neither a service nor an instance.
    #[error("{0:?} matches neither a service nor an instance")]
    UnknownTarget(String),

    /// The user interrupted the run before this instance was attempted.
    #[error("interrupted")]
    Interrupted,

    /// The walk was aborted before this instance was attempted.
    #[error("aborted: {0}")]
    Aborted(String),
}

impl EngineError {
    /// Wraps a daemon error with its operation phase.
    #[must_use]
    pub const fn controller(phase: Phase, source: DaemonError) -> Self {
        Self::Controller { phase, source }
    }
}
