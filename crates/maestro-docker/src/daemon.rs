//! The consumed daemon interface.

use async_trait::async_trait;
use maestro_model::{Registry, Ship};
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::spec::CreateSpec;
use crate::ImageName;

/// State of a container as reported by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    /// Created but never started.
    Created,
    /// Running.
    Running,
    /// Paused.
    Paused,
    /// Restarting.
    Restarting,
    /// Exited after running.
    Exited,
    /// Being removed.
    Removing,
    /// Dead (daemon-side error state).
    Dead,
}

impl ContainerStatus {
    /// Maps a Docker status string to a status value.
    #[must_use]
    pub fn from_docker(status: &str) -> Self {
        match status {
            "running" => Self::Running,
            "paused" => Self::Paused,
            "restarting" => Self::Restarting,
            "exited" => Self::Exited,
            "removing" => Self::Removing,
            "dead" => Self::Dead,
            _ => Self::Created,
        }
    }

    /// Whether the container is currently running.
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running | Self::Restarting)
    }
}

/// The subset of inspect data the orchestrator needs.
#[derive(Debug, Clone)]
pub struct ContainerDetails {
    /// Container ID.
    pub id: String,
    /// ID of the image the container was created from.
    pub image_id: String,
    /// Current status.
    pub status: ContainerStatus,
    /// Exit code, when the container has exited.
    pub exit_code: Option<i64>,
}

/// Operations Maestro requires from a remote container daemon.
///
/// This is the seam between the orchestration engine and the outside
/// world; tests substitute an in-memory implementation.
#[async_trait]
pub trait ContainerDaemon: Send + Sync {
    /// Verifies the daemon is reachable.
    async fn ping(&self) -> Result<()>;

    /// Pulls an image, authenticating with `auth` when provided.
    async fn pull_image(&self, image: &ImageName, auth: Option<&Registry>) -> Result<()>;

    /// Returns whether an image is present on the daemon.
    async fn has_image(&self, image: &ImageName) -> Result<bool>;

    /// Creates a container and returns its ID.
    async fn create_container(&self, spec: &CreateSpec) -> Result<String>;

    /// Starts a container by name.
    async fn start_container(&self, name: &str) -> Result<()>;

    /// Stops a container, giving it `timeout` before SIGKILL.
    async fn stop_container(&self, name: &str, timeout: Duration) -> Result<()>;

    /// Removes a container and its anonymous volumes.
    async fn remove_container(&self, name: &str) -> Result<()>;

    /// Inspects a container; `None` when no container has this name.
    async fn inspect_container(&self, name: &str) -> Result<Option<ContainerDetails>>;

    /// Fetches container logs, optionally limited to the last `tail` lines.
    /// The returned bytes use the daemon's multiplexed stream framing.
    async fn container_logs(&self, name: &str, tail: Option<usize>) -> Result<Vec<u8>>;
}

/// Creates daemon connections for ships.
///
/// Connectors are the second seam: the orchestrator asks for one
/// connection per ship and treats a failure here as ship-fatal.
#[async_trait]
pub trait DaemonConnector: Send + Sync {
    /// Connects to the daemon on the given ship.
    async fn connect(&self, ship: &Ship) -> Result<Arc<dyn ContainerDaemon>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docker_status_strings_map() {
        assert_eq!(ContainerStatus::from_docker("running"), ContainerStatus::Running);
        assert_eq!(ContainerStatus::from_docker("exited"), ContainerStatus::Exited);
        assert_eq!(ContainerStatus::from_docker("created"), ContainerStatus::Created);
        assert!(ContainerStatus::Running.is_running());
        assert!(!ContainerStatus::Exited.is_running());
    }
}
