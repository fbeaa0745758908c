//! Dependency-ordered command execution.
//!
//! The orchestrator expands the requested target set under dependency
//! closure, walks it level by level in the command's direction, and runs
//! instance operations with bounded per-ship parallelism. A level only
//! completes when every instance in it has settled; failures are recorded
//! and the walk continues unless stop-on-failure is requested.

use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use maestro_docker::{ContainerDaemon, DaemonConnector};

use crate::controller::{InstanceController, InstanceState, Outcome};
use crate::error::EngineError;
use crate::graph::ResolvedEnv;

/// Orchestration command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Read-only status report.
    Status,
    /// Start containers, dependencies first.
    Start,
    /// Stop containers, dependents first.
    Stop,
    /// Stop then start.
    Restart,
    /// Stop and remove containers, dependents first.
    Clean,
    /// Refresh images without touching containers.
    Pull,
}

/// Direction of target-set expansion.
enum Expansion {
    /// No expansion (status).
    None,
    /// Include all transitive dependencies.
    Down,
    /// Include all transitive dependents.
    Up,
}

impl Command {
    /// Stop-family commands walk the topological order backwards.
    const fn reverse(self) -> bool {
        matches!(self, Self::Stop | Self::Clean)
    }

    const fn expansion(self) -> Expansion {
        match self {
            Self::Status => Expansion::None,
            Self::Start | Self::Restart | Self::Pull => Expansion::Down,
            Self::Stop | Self::Clean => Expansion::Up,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status => write!(f, "status"),
            Self::Start => write!(f, "start"),
            Self::Stop => write!(f, "stop"),
            Self::Restart => write!(f, "restart"),
            Self::Clean => write!(f, "clean"),
            Self::Pull => write!(f, "pull"),
        }
    }
}

/// Knobs shared by all commands.
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorOptions {
    /// Skip closure expansion and ordering; operate in input order, one
    /// instance at a time.
    pub ignore_dependencies: bool,
    /// Force image pulls on start/restart.
    pub refresh_images: bool,
    /// Concurrent container operations allowed per ship.
    pub ship_concurrency: usize,
    /// Abort the walk after the first failing level.
    pub stop_on_failure: bool,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            ignore_dependencies: false,
            refresh_images: false,
            ship_concurrency: 1,
            stop_on_failure: false,
        }
    }
}

/// Outcome of one instance in a run.
#[derive(Debug)]
pub struct InstanceOutcome {
    /// Instance name.
    pub instance: String,
    /// Service the instance belongs to.
    pub service: String,
    /// Ship the instance runs on.
    pub ship: String,
    /// Operation result.
    pub result: Result<Outcome, EngineError>,
    /// Instance state re-read after the operation, when available.
    pub state: Option<InstanceState>,
}

/// Aggregated result of a run, in walk order.
#[derive(Debug)]
pub struct RunReport {
    /// Per-instance outcomes.
    pub outcomes: Vec<InstanceOutcome>,
    /// Whether the run was interrupted before completion.
    pub interrupted: bool,
}

impl RunReport {
    /// True when every targeted instance succeeded and nothing was
    /// interrupted. Drives the process exit code.
    #[must_use]
    pub fn success(&self) -> bool {
        !self.interrupted && self.outcomes.iter().all(|o| o.result.is_ok())
    }
}

type TaskResult = (String, Result<Outcome, EngineError>, Option<InstanceState>);

/// Runs commands against a resolved environment.
pub struct Orchestrator {
    renv: Arc<ResolvedEnv>,
    connector: Arc<dyn DaemonConnector>,
    options: OrchestratorOptions,
}

impl Orchestrator {
    /// Creates an orchestrator.
    #[must_use]
    pub fn new(
        renv: ResolvedEnv,
        connector: Arc<dyn DaemonConnector>,
        options: OrchestratorOptions,
    ) -> Self {
        Self { renv: Arc::new(renv), connector, options }
    }

    /// The resolved environment this orchestrator operates on.
    #[must_use]
    pub fn resolved(&self) -> &ResolvedEnv {
        &self.renv
    }

    /// Executes `command` against the target set.
    ///
    /// An empty target set means every non-omitted service. Tokens match
    /// services and instances by substring. The returned report lists
    /// every targeted instance in walk order; per-instance failures are
    /// recorded, not raised.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownTarget`] when a token matches
    /// nothing. No remote I/O has happened at that point.
    pub async fn run(
        &self,
        command: Command,
        targets: &[String],
        cancel: &CancellationToken,
    ) -> Result<RunReport, EngineError> {
        let selected = self.select_targets(targets)?;
        let plan = self.plan(command, selected);
        debug!(%command, levels = plan.len(), "orchestration plan ready");

        let flat: Vec<(String, String)> = plan.iter().flatten().cloned().collect();
        let (clients, failed_ships) = self.connect_ships(&flat).await;

        let semaphores: HashMap<String, Arc<Semaphore>> = clients
            .keys()
            .map(|ship| {
                (ship.clone(), Arc::new(Semaphore::new(self.options.ship_concurrency.max(1))))
            })
            .collect();

        let mut results: HashMap<String, (Result<Outcome, EngineError>, Option<InstanceState>)> =
            HashMap::new();
        let mut any_failed = false;
        let mut interrupted = false;

        for (index, level) in plan.iter().enumerate() {
            if cancel.is_cancelled() {
                interrupted = true;
            }
            if interrupted || (self.options.stop_on_failure && any_failed) {
                for (_, instance) in plan[index..].iter().flatten() {
                    let error = if interrupted {
                        EngineError::Interrupted
                    } else {
                        EngineError::Aborted("a previous level failed".to_string())
                    };
                    results.insert(instance.clone(), (Err(error), None));
                }
                break;
            }

            let mut join: JoinSet<TaskResult> = JoinSet::new();
            for (service, instance) in level {
                let ship = self.ship_of(instance);
                if let Some(reason) = failed_ships.get(&ship) {
                    any_failed = true;
                    results.insert(
                        instance.clone(),
                        (Err(EngineError::Connection { ship, reason: reason.clone() }), None),
                    );
                    continue;
                }
                let Some(daemon) = clients.get(&ship) else { continue };
                join.spawn(run_instance(
                    self.renv.clone(),
                    service.clone(),
                    instance.clone(),
                    daemon.clone(),
                    semaphores[&ship].clone(),
                    command,
                    self.options.refresh_images,
                    cancel.clone(),
                ));
            }

            while let Some(joined) = join.join_next().await {
                match joined {
                    Ok((instance, result, state)) => {
                        if result.is_err() {
                            any_failed = true;
                        }
                        results.insert(instance, (result, state));
                    }
                    Err(e) => {
                        warn!("orchestration worker panicked: {e}");
                        any_failed = true;
                    }
                }
            }
        }

        let interrupted = interrupted || cancel.is_cancelled();
        let outcomes = flat
            .into_iter()
            .map(|(service, instance)| {
                let ship = self.ship_of(&instance);
                let (result, state) = results
                    .remove(&instance)
                    .unwrap_or((Err(EngineError::Interrupted), None));
                InstanceOutcome { instance, service, ship, result, state }
            })
            .collect();
        Ok(RunReport { outcomes, interrupted })
    }

    fn ship_of(&self, instance: &str) -> String {
        self.renv
            .environment()
            .instance(instance)
            .map(|(_, i)| i.ship.clone())
            .unwrap_or_default()
    }

    /// Expands target tokens into `(service, instance)` pairs.
    fn select_targets(&self, things: &[String]) -> Result<Vec<(String, String)>, EngineError> {
        let env = self.renv.environment();
        // Keyed by instance name to deduplicate while preserving order.
        let mut selected: IndexMap<String, String> = IndexMap::new();

        if things.is_empty() {
            for (service, instance) in env.instances() {
                if !service.omit {
                    selected.insert(instance.name.clone(), service.name.clone());
                }
            }
        } else {
            for token in things {
                let mut matched = false;
                for service in env.services.values() {
                    if service.name.contains(token.as_str()) {
                        matched = true;
                        for instance in service.instances.keys() {
                            selected.insert(instance.clone(), service.name.clone());
                        }
                    }
                }
                for (service, instance) in env.instances() {
                    if instance.name.contains(token.as_str()) {
                        matched = true;
                        selected.insert(instance.name.clone(), service.name.clone());
                    }
                }
                if !matched {
                    return Err(EngineError::UnknownTarget(token.clone()));
                }
            }
        }

        Ok(selected.into_iter().map(|(instance, service)| (service, instance)).collect())
    }

    /// Applies closure expansion and groups the target set into walk
    /// levels.
    fn plan(
        &self,
        command: Command,
        selected: Vec<(String, String)>,
    ) -> Vec<Vec<(String, String)>> {
        let env = self.renv.environment();

        if self.options.ignore_dependencies {
            // Input order, strictly one at a time.
            return selected.into_iter().map(|pair| vec![pair]).collect();
        }

        let mut targets: IndexMap<String, String> =
            selected.iter().map(|(s, i)| (i.clone(), s.clone())).collect();

        let closure_services: BTreeSet<&String> = match command.expansion() {
            Expansion::None => BTreeSet::new(),
            Expansion::Down => selected
                .iter()
                .flat_map(|(service, _)| self.renv.requires_closure(service))
                .collect(),
            Expansion::Up => selected
                .iter()
                .flat_map(|(service, _)| self.renv.dependents_closure(service))
                .collect(),
        };
        for service in closure_services {
            if let Some(service) = env.service(service) {
                for instance in service.instances.keys() {
                    targets.entry(instance.clone()).or_insert_with(|| service.name.clone());
                }
            }
        }

        if matches!(command, Command::Status) {
            // Status has no ordering constraints; one parallel level.
            let level = self.in_walk_order(&targets);
            return if level.is_empty() { Vec::new() } else { vec![level] };
        }

        // Group by topological level, then order the levels.
        let mut levels: IndexMap<usize, Vec<(String, String)>> = IndexMap::new();
        for (service, instance) in self.in_walk_order(&targets) {
            levels.entry(self.renv.level(&service)).or_default().push((service, instance));
        }
        let mut keys: Vec<usize> = levels.keys().copied().collect();
        keys.sort_unstable();
        if command.reverse() {
            keys.reverse();
        }
        keys.into_iter().filter_map(|k| levels.shift_remove(&k)).collect()
    }

    /// Orders `(service, instance)` pairs by topological service order,
    /// then instance declaration order.
    fn in_walk_order(&self, targets: &IndexMap<String, String>) -> Vec<(String, String)> {
        let env = self.renv.environment();
        let mut ordered = Vec::with_capacity(targets.len());
        for service_name in self.renv.start_order() {
            let Some(service) = env.service(service_name) else { continue };
            for instance in service.instances.keys() {
                if targets.contains_key(instance) {
                    ordered.push((service_name.clone(), instance.clone()));
                }
            }
        }
        ordered
    }

    /// Connects to every ship the plan touches. Failures are ship-fatal
    /// and reported per instance later.
    async fn connect_ships(
        &self,
        flat: &[(String, String)],
    ) -> (HashMap<String, Arc<dyn ContainerDaemon>>, HashMap<String, String>) {
        let env = self.renv.environment();
        let ships: BTreeSet<String> =
            flat.iter().map(|(_, instance)| self.ship_of(instance)).collect();

        let mut join: JoinSet<(String, maestro_docker::Result<Arc<dyn ContainerDaemon>>)> =
            JoinSet::new();
        for name in ships {
            let Some(ship) = env.ship(&name).cloned() else { continue };
            let connector = self.connector.clone();
            join.spawn(async move {
                let result = connector.connect(&ship).await;
                (name, result)
            });
        }

        let mut clients = HashMap::new();
        let mut failed = HashMap::new();
        while let Some(joined) = join.join_next().await {
            match joined {
                Ok((name, Ok(client))) => {
                    clients.insert(name, client);
                }
                Ok((name, Err(e))) => {
                    warn!(ship = %name, "connection failed: {e}");
                    failed.insert(name, e.to_string());
                }
                Err(e) => warn!("connection worker panicked: {e}"),
            }
        }
        (clients, failed)
    }
}

/// One instance operation, gated by the ship's semaphore.
#[allow(clippy::too_many_arguments)]
async fn run_instance(
    renv: Arc<ResolvedEnv>,
    service: String,
    instance: String,
    daemon: Arc<dyn ContainerDaemon>,
    semaphore: Arc<Semaphore>,
    command: Command,
    refresh_images: bool,
    cancel: CancellationToken,
) -> TaskResult {
    let Ok(_permit) = semaphore.acquire_owned().await else {
        return (instance, Err(EngineError::Interrupted), None);
    };
    if cancel.is_cancelled() {
        return (instance, Err(EngineError::Interrupted), None);
    }

    let Some((service_ref, instance_ref)) = renv.environment().instance(&instance) else {
        return (instance.clone(), Err(EngineError::UnknownTarget(instance)), None);
    };
    debug_assert_eq!(service_ref.name, service);

    let controller = InstanceController::new(&renv, service_ref, instance_ref, daemon);
    let result = match command {
        Command::Status => controller.status().await,
        Command::Start => controller.start(refresh_images).await,
        Command::Stop => controller.stop().await,
        Command::Restart => controller.restart(refresh_images).await,
        Command::Clean => controller.clean().await,
        Command::Pull => controller.pull().await,
    };
    // The daemon view is re-read after every mutation so the report shows
    // actual state, not intent.
    let state = if command == Command::Status {
        None
    } else {
        controller.current_state().await
    };
    (instance, result, state)
}
