//! Per-instance lifecycle state machine.
//!
//! The controller reduces the daemon's view of a container to four states
//! (`absent`, `created`, `running`, `stopped`) and drives the lifecycle
//! commands between them. Daemon failures surface immediately with their
//! phase; lifecycle probes are the only retry site.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use maestro_docker::{
    registry_for_image, ContainerDaemon, ContainerDetails, ContainerStatus, CreateSpec, ImageName,
};
use maestro_model::{CheckState, Instance, Service, Ship};
use maestro_probes::{Probe, ProbeTarget};
use tracing::{debug, info};

use crate::compose::compose;
use crate::error::EngineError;
use crate::graph::ResolvedEnv;

/// Operation phase, carried by controller errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Image presence check or pull.
    Pull,
    /// Container creation.
    Create,
    /// Container start.
    Start,
    /// Container stop.
    Stop,
    /// Container removal.
    Remove,
    /// Container inspection.
    Inspect,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pull => write!(f, "pull"),
            Self::Create => write!(f, "create"),
            Self::Start => write!(f, "start"),
            Self::Stop => write!(f, "stop"),
            Self::Remove => write!(f, "remove"),
            Self::Inspect => write!(f, "inspect"),
        }
    }
}

/// Condensed container state as the orchestrator sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// No container with this name exists on the ship.
    Absent,
    /// The container exists but never ran.
    Created,
    /// The container is running.
    Running,
    /// The container exists and previously ran.
    Stopped,
}

impl InstanceState {
    fn from_details(details: Option<&ContainerDetails>) -> Self {
        match details {
            None => Self::Absent,
            Some(d) if d.status.is_running() => Self::Running,
            Some(d) if d.status == ContainerStatus::Created => Self::Created,
            Some(_) => Self::Stopped,
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Result of one lifecycle operation on one instance.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Container started and its running checks passed.
    Started,
    /// Start was a no-op: already running.
    AlreadyRunning,
    /// Container stopped and its stopped checks passed.
    Stopped,
    /// Stop was a no-op: not running.
    AlreadyStopped,
    /// Container stopped (when needed) and removed.
    Removed,
    /// Clean was a no-op: no container.
    AlreadyAbsent,
    /// Image pulled.
    Pulled,
    /// Container restarted.
    Restarted,
    /// Read-only status report.
    Status {
        /// Condensed state.
        state: InstanceState,
        /// Short container ID, when the container exists.
        container_id: Option<String>,
        /// Short image ID, when the container exists.
        image_id: Option<String>,
    },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started => write!(f, "started"),
            Self::AlreadyRunning => write!(f, "up"),
            Self::Stopped => write!(f, "stopped"),
            Self::AlreadyStopped => write!(f, "down"),
            Self::Removed => write!(f, "removed"),
            Self::AlreadyAbsent => write!(f, "absent"),
            Self::Pulled => write!(f, "pulled"),
            Self::Restarted => write!(f, "restarted"),
            Self::Status { state, .. } => write!(f, "{state}"),
        }
    }
}

fn short_id(id: &str) -> String {
    let id = id.strip_prefix("sha256:").unwrap_or(id);
    id.chars().take(12).collect()
}

/// Drives lifecycle operations for one instance against its ship's daemon.
pub struct InstanceController<'a> {
    renv: &'a ResolvedEnv,
    service: &'a Service,
    instance: &'a Instance,
    daemon: Arc<dyn ContainerDaemon>,
}

impl<'a> InstanceController<'a> {
    /// Creates a controller for one instance.
    #[must_use]
    pub fn new(
        renv: &'a ResolvedEnv,
        service: &'a Service,
        instance: &'a Instance,
        daemon: Arc<dyn ContainerDaemon>,
    ) -> Self {
        Self { renv, service, instance, daemon }
    }

    fn ship(&self) -> &Ship {
        self.renv.environment().ship_of(self.instance)
    }

    fn image(&self) -> ImageName {
        ImageName::parse(self.service.image_for(self.instance))
    }

    async fn inspect(&self) -> Result<Option<ContainerDetails>, EngineError> {
        self.daemon
            .inspect_container(&self.instance.name)
            .await
            .map_err(|e| EngineError::controller(Phase::Inspect, e))
    }

    /// Re-reads the instance state, swallowing errors; used for post-op
    /// reporting only.
    pub async fn current_state(&self) -> Option<InstanceState> {
        self.inspect().await.ok().map(|d| InstanceState::from_details(d.as_ref()))
    }

    async fn run_checks(&self, state: CheckState) -> Result<(), EngineError> {
        let checks = self.service.checks_for(self.instance, state);
        if checks.is_empty() {
            return Ok(());
        }
        let env = compose(self.renv, self.service, self.instance);
        let target =
            ProbeTarget { host: &self.ship().ip, ports: &self.instance.ports, env: &env };
        let probes = checks
            .into_iter()
            .map(|check| Probe::build(check, &target))
            .collect::<Result<Vec<_>, _>>()?;
        maestro_probes::run_gate(&probes).await?;
        Ok(())
    }

    async fn ensure_image(&self, refresh: bool) -> Result<(), EngineError> {
        let image = self.image();
        let wrap = |e| EngineError::controller(Phase::Pull, e);

        if !refresh && self.daemon.has_image(&image).await.map_err(wrap)? {
            debug!(image = %image, "image already present");
            return Ok(());
        }

        let auth = registry_for_image(&image, &self.renv.environment().registries);
        info!(instance = %self.instance.name, image = %image, "pulling image");
        self.daemon.pull_image(&image, auth).await.map_err(wrap)
    }

    /// Starts the instance, creating it (and pulling its image) first when
    /// needed, then gates on the `running` lifecycle checks.
    ///
    /// # Errors
    ///
    /// Daemon failures surface as [`EngineError::Controller`]; failed
    /// checks as [`EngineError::Probe`]. A probe failure leaves the
    /// container running (no rollback).
    pub async fn start(&self, refresh_images: bool) -> Result<Outcome, EngineError> {
        let state = InstanceState::from_details(self.inspect().await?.as_ref());
        match state {
            InstanceState::Running => return Ok(Outcome::AlreadyRunning),
            InstanceState::Absent => {
                self.ensure_image(refresh_images).await?;
                let env = compose(self.renv, self.service, self.instance);
                let spec = CreateSpec::for_instance(self.service, self.instance, env);
                self.daemon
                    .create_container(&spec)
                    .await
                    .map_err(|e| EngineError::controller(Phase::Create, e))?;
                self.start_container().await?;
            }
            InstanceState::Created | InstanceState::Stopped => {
                self.start_container().await?;
            }
        }
        self.run_checks(CheckState::Running).await?;
        Ok(Outcome::Started)
    }

    async fn start_container(&self) -> Result<(), EngineError> {
        info!(instance = %self.instance.name, ship = %self.instance.ship, "starting container");
        self.daemon
            .start_container(&self.instance.name)
            .await
            .map_err(|e| EngineError::controller(Phase::Start, e))
    }

    /// Stops the instance when it is running, then gates on the `stopped`
    /// lifecycle checks.
    ///
    /// # Errors
    ///
    /// Daemon failures surface as [`EngineError::Controller`]; failed
    /// checks as [`EngineError::Probe`].
    pub async fn stop(&self) -> Result<Outcome, EngineError> {
        let state = InstanceState::from_details(self.inspect().await?.as_ref());
        match state {
            InstanceState::Absent => Ok(Outcome::AlreadyAbsent),
            InstanceState::Created | InstanceState::Stopped => Ok(Outcome::AlreadyStopped),
            InstanceState::Running => {
                info!(instance = %self.instance.name, "stopping container");
                self.daemon
                    .stop_container(
                        &self.instance.name,
                        Duration::from_secs(self.instance.stop_timeout),
                    )
                    .await
                    .map_err(|e| EngineError::controller(Phase::Stop, e))?;
                self.run_checks(CheckState::Stopped).await?;
                Ok(Outcome::Stopped)
            }
        }
    }

    /// Stop followed by start, with the same check gating as each half.
    ///
    /// # Errors
    ///
    /// Propagates the first failing half.
    pub async fn restart(&self, refresh_images: bool) -> Result<Outcome, EngineError> {
        self.stop().await?;
        self.start(refresh_images).await?;
        Ok(Outcome::Restarted)
    }

    /// Stops the instance when running, then removes its container.
    /// Idempotent when the container is absent.
    ///
    /// # Errors
    ///
    /// Daemon failures surface as [`EngineError::Controller`].
    pub async fn clean(&self) -> Result<Outcome, EngineError> {
        let state = InstanceState::from_details(self.inspect().await?.as_ref());
        if state == InstanceState::Absent {
            return Ok(Outcome::AlreadyAbsent);
        }
        if state == InstanceState::Running {
            self.daemon
                .stop_container(
                    &self.instance.name,
                    Duration::from_secs(self.instance.stop_timeout),
                )
                .await
                .map_err(|e| EngineError::controller(Phase::Stop, e))?;
        }
        info!(instance = %self.instance.name, "removing container");
        self.daemon
            .remove_container(&self.instance.name)
            .await
            .map_err(|e| EngineError::controller(Phase::Remove, e))?;
        Ok(Outcome::Removed)
    }

    /// Forces an image pull regardless of local presence.
    ///
    /// # Errors
    ///
    /// Daemon failures surface as [`EngineError::Controller`].
    pub async fn pull(&self) -> Result<Outcome, EngineError> {
        self.ensure_image(true).await?;
        Ok(Outcome::Pulled)
    }

    /// Read-only status report.
    ///
    /// # Errors
    ///
    /// Daemon failures surface as [`EngineError::Controller`].
    pub async fn status(&self) -> Result<Outcome, EngineError> {
        let details = self.inspect().await?;
        let state = InstanceState::from_details(details.as_ref());
        Ok(Outcome::Status {
            state,
            container_id: details.as_ref().map(|d| short_id(&d.id)),
            image_id: details.as_ref().map(|d| short_id(&d.image_id)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_ids_drop_digest_prefix() {
        assert_eq!(short_id("sha256:0123456789abcdef0123"), "0123456789ab");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn states_condense_daemon_details() {
        assert_eq!(InstanceState::from_details(None), InstanceState::Absent);
        let details = ContainerDetails {
            id: "x".into(),
            image_id: "y".into(),
            status: ContainerStatus::Exited,
            exit_code: Some(0),
        };
        assert_eq!(InstanceState::from_details(Some(&details)), InstanceState::Stopped);
    }
}
