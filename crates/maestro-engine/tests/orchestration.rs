//! Orchestrator integration tests against an in-memory daemon.

use async_trait::async_trait;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use maestro_docker::{
    ContainerDaemon, ContainerDetails, ContainerStatus, CreateSpec, DaemonConnector, DaemonError,
    ImageName,
};
use maestro_engine::{
    resolve, Command, EngineError, Orchestrator, OrchestratorOptions, Outcome, ResolvedEnv,
};
use maestro_model::{load_str, Registry, Ship};

#[derive(Default)]
struct MockState {
    /// name -> (running, ever ran)
    containers: HashMap<String, (bool, bool)>,
    /// create specs captured for assertions
    created: Vec<CreateSpec>,
}

/// One in-memory daemon per ship, sharing a global event log.
struct MockDaemon {
    ship: String,
    state: Mutex<MockState>,
    events: Arc<Mutex<Vec<String>>>,
    has_images: bool,
    fail_start: HashSet<String>,
    start_delay: Duration,
}

impl MockDaemon {
    fn new(ship: &str, events: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            ship: ship.to_string(),
            state: Mutex::new(MockState::default()),
            events,
            has_images: true,
            fail_start: HashSet::new(),
            start_delay: Duration::ZERO,
        }
    }

    fn log(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    fn seed_running(&self, name: &str) {
        self.state.lock().unwrap().containers.insert(name.to_string(), (true, true));
    }

    fn seed_stopped(&self, name: &str) {
        self.state.lock().unwrap().containers.insert(name.to_string(), (false, true));
    }
}

#[async_trait]
impl ContainerDaemon for MockDaemon {
    async fn ping(&self) -> maestro_docker::Result<()> {
        Ok(())
    }

    async fn pull_image(
        &self,
        image: &ImageName,
        auth: Option<&Registry>,
    ) -> maestro_docker::Result<()> {
        let auth = auth.map_or_else(|| "anonymous".to_string(), |r| r.username.clone());
        self.log(format!("pull {image} on {} as {auth}", self.ship));
        Ok(())
    }

    async fn has_image(&self, _image: &ImageName) -> maestro_docker::Result<bool> {
        Ok(self.has_images)
    }

    async fn create_container(&self, spec: &CreateSpec) -> maestro_docker::Result<String> {
        let mut state = self.state.lock().unwrap();
        state.containers.insert(spec.name.clone(), (false, false));
        state.created.push(spec.clone());
        self.log(format!("create {}", spec.name));
        Ok(format!("id-{}", spec.name))
    }

    async fn start_container(&self, name: &str) -> maestro_docker::Result<()> {
        if !self.start_delay.is_zero() {
            tokio::time::sleep(self.start_delay).await;
        }
        if self.fail_start.contains(name) {
            return Err(DaemonError::Api { status: 500, message: "boom".to_string() });
        }
        self.state.lock().unwrap().containers.insert(name.to_string(), (true, true));
        self.log(format!("start {name}"));
        Ok(())
    }

    async fn stop_container(&self, name: &str, _timeout: Duration) -> maestro_docker::Result<()> {
        self.state.lock().unwrap().containers.insert(name.to_string(), (false, true));
        self.log(format!("stop {name}"));
        Ok(())
    }

    async fn remove_container(&self, name: &str) -> maestro_docker::Result<()> {
        self.state.lock().unwrap().containers.remove(name);
        self.log(format!("remove {name}"));
        Ok(())
    }

    async fn inspect_container(
        &self,
        name: &str,
    ) -> maestro_docker::Result<Option<ContainerDetails>> {
        let state = self.state.lock().unwrap();
        Ok(state.containers.get(name).map(|(running, ran)| ContainerDetails {
            id: format!("id-{name}"),
            image_id: "sha256:fedcba9876543210".to_string(),
            status: if *running {
                ContainerStatus::Running
            } else if *ran {
                ContainerStatus::Exited
            } else {
                ContainerStatus::Created
            },
            exit_code: if *running { None } else { Some(0) },
        }))
    }

    async fn container_logs(
        &self,
        _name: &str,
        _tail: Option<usize>,
    ) -> maestro_docker::Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

struct MockConnector {
    daemons: HashMap<String, Arc<MockDaemon>>,
    fail_ships: HashSet<String>,
}

#[async_trait]
impl DaemonConnector for MockConnector {
    async fn connect(&self, ship: &Ship) -> maestro_docker::Result<Arc<dyn ContainerDaemon>> {
        if self.fail_ships.contains(&ship.name) {
            return Err(DaemonError::Connection {
                endpoint: ship.endpoint.clone(),
                reason: "refused".to_string(),
            });
        }
        let daemon: Arc<dyn ContainerDaemon> = self.daemons[&ship.name].clone();
        Ok(daemon)
    }
}

struct Harness {
    renv: Option<ResolvedEnv>,
    daemons: HashMap<String, Arc<MockDaemon>>,
    events: Arc<Mutex<Vec<String>>>,
    fail_ships: HashSet<String>,
    options: OrchestratorOptions,
}

impl Harness {
    fn new(yaml: &str) -> Self {
        let renv = resolve(load_str(yaml).unwrap()).unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let daemons = renv
            .environment()
            .ships
            .keys()
            .map(|name| (name.clone(), Arc::new(MockDaemon::new(name, events.clone()))))
            .collect();
        Self {
            renv: Some(renv),
            daemons,
            events,
            fail_ships: HashSet::new(),
            options: OrchestratorOptions::default(),
        }
    }

    fn daemon(&self, ship: &str) -> &Arc<MockDaemon> {
        &self.daemons[ship]
    }

    fn daemon_mut(&mut self, ship: &str) -> &mut MockDaemon {
        Arc::get_mut(self.daemons.get_mut(ship).unwrap()).unwrap()
    }

    fn orchestrator(&mut self) -> Orchestrator {
        let connector = Arc::new(MockConnector {
            daemons: self.daemons.clone(),
            fail_ships: self.fail_ships.clone(),
        });
        Orchestrator::new(self.renv.take().unwrap(), connector, self.options)
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn position(&self, event: &str) -> usize {
        let events = self.events();
        events
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("event {event:?} not in {events:?}"))
    }
}

const WEB_REDIS: &str = r"
name: t
ships:
  vm1: { ip: 10.0.0.5 }
services:
  web:
    image: acme/web
    requires: [ redis ]
    instances:
      web-1: { ship: vm1 }
  redis:
    image: redis:7
    instances:
      redis-1:
        ship: vm1
        ports: { redis: 6379 }
";

async fn run(
    harness: &mut Harness,
    command: Command,
    targets: &[&str],
) -> maestro_engine::RunReport {
    let orchestrator = harness.orchestrator();
    let targets: Vec<String> = targets.iter().map(ToString::to_string).collect();
    orchestrator.run(command, &targets, &CancellationToken::new()).await.unwrap()
}

#[tokio::test]
async fn start_runs_dependencies_first() {
    let mut harness = Harness::new(WEB_REDIS);
    let report = run(&mut harness, Command::Start, &[]).await;

    assert!(report.success());
    assert!(harness.position("start redis-1") < harness.position("start web-1"));

    // The report is in walk order and reflects post-operation state.
    let names: Vec<&str> = report.outcomes.iter().map(|o| o.instance.as_str()).collect();
    assert_eq!(names, ["redis-1", "web-1"]);
    for outcome in &report.outcomes {
        assert!(matches!(outcome.result, Ok(Outcome::Started)));
        assert_eq!(outcome.state, Some(maestro_engine::InstanceState::Running));
    }
}

#[tokio::test]
async fn start_order_ignores_declaration_order() {
    // Same environment with the services declared in the opposite order.
    let reversed = r"
name: t
ships:
  vm1: { ip: 10.0.0.5 }
services:
  redis:
    image: redis:7
    instances:
      redis-1: { ship: vm1 }
  web:
    image: acme/web
    requires: [ redis ]
    instances:
      web-1: { ship: vm1 }
";
    let mut harness = Harness::new(reversed);
    run(&mut harness, Command::Start, &[]).await;
    assert!(harness.position("start redis-1") < harness.position("start web-1"));
}

#[tokio::test]
async fn stop_runs_dependents_first_and_expands_upward() {
    let mut harness = Harness::new(WEB_REDIS);
    harness.daemon("vm1").seed_running("redis-1");
    harness.daemon("vm1").seed_running("web-1");

    // Stopping only redis must stop web first so no dependent is left
    // without its dependency.
    let report = run(&mut harness, Command::Stop, &["redis"]).await;
    assert!(report.success());
    assert!(harness.position("stop web-1") < harness.position("stop redis-1"));
}

#[tokio::test]
async fn start_expands_downward_from_target() {
    let mut harness = Harness::new(WEB_REDIS);
    let report = run(&mut harness, Command::Start, &["web"]).await;
    assert!(report.success());
    assert_eq!(report.outcomes.len(), 2);
    assert!(harness.position("start redis-1") < harness.position("start web-1"));
}

#[tokio::test]
async fn ignore_dependencies_disables_expansion_and_ordering() {
    let mut harness = Harness::new(WEB_REDIS);
    harness.options.ignore_dependencies = true;
    let report = run(&mut harness, Command::Start, &["web"]).await;
    assert!(report.success());
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].instance, "web-1");
    assert!(!harness.events().contains(&"start redis-1".to_string()));
}

#[tokio::test]
async fn independent_services_on_different_ships_run_in_parallel() {
    let yaml = r"
name: t
ships:
  s1: { ip: 10.0.0.1 }
  s2: { ip: 10.0.0.2 }
services:
  a:
    image: a
    instances:
      a-1: { ship: s1 }
  b:
    image: b
    instances:
      b-1: { ship: s2 }
";
    let mut harness = Harness::new(yaml);
    harness.daemon_mut("s1").start_delay = Duration::from_millis(300);
    harness.daemon_mut("s2").start_delay = Duration::from_millis(300);

    let started = std::time::Instant::now();
    let report = run(&mut harness, Command::Start, &[]).await;
    assert!(report.success());

    // Wall time is max(t_a, t_b), not the sum.
    assert!(started.elapsed() < Duration::from_millis(550), "ships were serialized");
}

#[tokio::test]
async fn operations_on_one_ship_are_serialized() {
    let yaml = r"
name: t
ships:
  s1: { ip: 10.0.0.1 }
services:
  a:
    image: a
    instances:
      a-1: { ship: s1 }
  b:
    image: b
    instances:
      b-1: { ship: s1 }
";
    let mut harness = Harness::new(yaml);
    harness.daemon_mut("s1").start_delay = Duration::from_millis(150);

    let started = std::time::Instant::now();
    let report = run(&mut harness, Command::Start, &[]).await;
    assert!(report.success());
    assert!(started.elapsed() >= Duration::from_millis(300), "per-ship mutex not applied");
}

#[tokio::test]
async fn start_is_idempotent_when_running() {
    let mut harness = Harness::new(WEB_REDIS);
    harness.daemon("vm1").seed_running("redis-1");
    harness.daemon("vm1").seed_running("web-1");

    let report = run(&mut harness, Command::Start, &[]).await;
    assert!(report.success());
    for outcome in &report.outcomes {
        assert!(matches!(outcome.result, Ok(Outcome::AlreadyRunning)));
    }
    // No daemon mutation happened.
    assert!(harness.events().is_empty());
}

#[tokio::test]
async fn stop_and_clean_are_idempotent() {
    let mut harness = Harness::new(WEB_REDIS);
    harness.daemon("vm1").seed_stopped("redis-1");
    harness.daemon("vm1").seed_stopped("web-1");

    let report = run(&mut harness, Command::Stop, &[]).await;
    assert!(report.success());
    for outcome in &report.outcomes {
        assert!(matches!(outcome.result, Ok(Outcome::AlreadyStopped)));
    }
    assert!(harness.events().is_empty());

    // Clean on an absent container is a no-op too.
    let mut harness = Harness::new(WEB_REDIS);
    let report = run(&mut harness, Command::Clean, &[]).await;
    assert!(report.success());
    for outcome in &report.outcomes {
        assert!(matches!(outcome.result, Ok(Outcome::AlreadyAbsent)));
    }
    assert!(harness.events().is_empty());
}

#[tokio::test]
async fn clean_stops_running_containers_before_removing() {
    let mut harness = Harness::new(WEB_REDIS);
    harness.daemon("vm1").seed_running("redis-1");
    let report = run(&mut harness, Command::Clean, &["redis-1"]).await;
    assert!(report.success());
    assert!(harness.position("stop redis-1") < harness.position("remove redis-1"));
}

#[tokio::test]
async fn restart_stops_then_starts() {
    let mut harness = Harness::new(WEB_REDIS);
    harness.daemon("vm1").seed_running("redis-1");
    let report = run(&mut harness, Command::Restart, &["redis-1"]).await;
    assert!(report.success());
    assert!(harness.position("stop redis-1") < harness.position("start redis-1"));
}

#[tokio::test]
async fn probe_timeout_fails_instance_but_dependents_are_attempted() {
    // redis-1 exposes a port nothing listens on, with a 2 s budget.
    let yaml = r"
name: t
ships:
  vm1: { ip: 127.0.0.1 }
services:
  web:
    image: acme/web
    requires: [ redis ]
    instances:
      web-1: { ship: vm1 }
  redis:
    image: redis:7
    lifecycle:
      running: [ { type: tcp, port: client, max_wait: 2 } ]
    instances:
      redis-1:
        ship: vm1
        ports: { client: 59997 }
";
    let mut harness = Harness::new(yaml);
    let report = run(&mut harness, Command::Start, &[]).await;

    assert!(!report.success());
    let redis = &report.outcomes[0];
    assert_eq!(redis.instance, "redis-1");
    match &redis.result {
        Err(EngineError::Probe(e)) => assert_eq!(e.check(), "tcp(client)"),
        other => panic!("expected probe timeout, got {other:?}"),
    }
    // Not rolled back: the container is still running.
    assert_eq!(redis.state, Some(maestro_engine::InstanceState::Running));

    // The dependent was still attempted.
    let web = &report.outcomes[1];
    assert!(matches!(web.result, Ok(Outcome::Started)));
}

#[tokio::test]
async fn stop_on_failure_aborts_later_levels() {
    let mut harness = Harness::new(WEB_REDIS);
    harness.daemon_mut("vm1").fail_start.insert("redis-1".to_string());
    harness.options.stop_on_failure = true;

    let report = run(&mut harness, Command::Start, &[]).await;
    assert!(!report.success());
    assert!(matches!(report.outcomes[0].result, Err(EngineError::Controller { .. })));
    assert!(matches!(report.outcomes[1].result, Err(EngineError::Aborted(_))));
    assert!(!harness.events().contains(&"start web-1".to_string()));
}

#[tokio::test]
async fn unreachable_ship_fails_all_its_instances() {
    let yaml = r"
name: t
ships:
  s1: { ip: 10.0.0.1 }
  s2: { ip: 10.0.0.2 }
services:
  a:
    image: a
    instances:
      a-1: { ship: s1 }
  b:
    image: b
    instances:
      b-1: { ship: s2 }
";
    let mut harness = Harness::new(yaml);
    harness.fail_ships.insert("s1".to_string());

    let report = run(&mut harness, Command::Start, &[]).await;
    assert!(!report.success());
    let a = report.outcomes.iter().find(|o| o.instance == "a-1").unwrap();
    assert!(matches!(&a.result, Err(EngineError::Connection { ship, .. }) if ship == "s1"));
    let b = report.outcomes.iter().find(|o| o.instance == "b-1").unwrap();
    assert!(b.result.is_ok());
}

#[tokio::test]
async fn unknown_target_fails_before_any_daemon_contact() {
    let mut harness = Harness::new(WEB_REDIS);
    let orchestrator = harness.orchestrator();
    let err = orchestrator
        .run(Command::Start, &["ghost".to_string()], &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownTarget(_)));
    assert!(harness.events().is_empty());
}

#[tokio::test]
async fn substring_targets_match_services_and_instances() {
    let mut harness = Harness::new(WEB_REDIS);
    let report = run(&mut harness, Command::Status, &["red"]).await;
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].instance, "redis-1");
}

#[tokio::test]
async fn omitted_services_are_excluded_from_all_targets() {
    let yaml = r"
name: t
ships:
  vm1: { ip: 10.0.0.5 }
services:
  app:
    image: app
    instances:
      app-1: { ship: vm1 }
  debug:
    image: dbg
    omit: true
    instances:
      debug-1: { ship: vm1 }
";
    let mut harness = Harness::new(yaml);
    let report = run(&mut harness, Command::Start, &[]).await;
    let names: Vec<&str> = report.outcomes.iter().map(|o| o.instance.as_str()).collect();
    assert_eq!(names, ["app-1"]);

    // Explicit targeting still works.
    let mut harness = Harness::new(yaml);
    let report = run(&mut harness, Command::Start, &["debug"]).await;
    assert_eq!(report.outcomes.len(), 1);
}

#[tokio::test]
async fn created_containers_receive_discovery_environment() {
    let mut harness = Harness::new(WEB_REDIS);
    let report = run(&mut harness, Command::Start, &[]).await;
    assert!(report.success());

    let state = harness.daemon("vm1").state.lock().unwrap();
    let web = state.created.iter().find(|s| s.name == "web-1").unwrap();
    assert_eq!(web.env["REDIS_REDIS_1_HOST"], "10.0.0.5");
    assert_eq!(web.env["REDIS_REDIS_1_REDIS_PORT"], "6379");
    assert_eq!(web.env["REDIS_REDIS_1_REDIS_INTERNAL_PORT"], "6379");
    assert_eq!(web.env["SERVICE_NAME"], "web");
    assert_eq!(web.env["CONTAINER_NAME"], "web-1");
}

#[tokio::test]
async fn pull_uses_registry_credentials_when_matched() {
    let yaml = r"
name: t
ships:
  vm1: { ip: 10.0.0.5 }
registries:
  quay.io:
    registry: https://quay.io
    username: acme
    password: hunter2
services:
  private:
    image: quay.io/acme/app:1.0
    instances:
      private-1: { ship: vm1 }
  public:
    image: redis:7
    instances:
      public-1: { ship: vm1 }
";
    let mut harness = Harness::new(yaml);
    harness.daemon_mut("vm1").has_images = false;

    let report = run(&mut harness, Command::Start, &[]).await;
    assert!(report.success());
    let events = harness.events();
    assert!(events.contains(&"pull quay.io/acme/app:1.0 on vm1 as acme".to_string()));
    assert!(events.contains(&"pull redis:7 on vm1 as anonymous".to_string()));
}

#[tokio::test]
async fn cancellation_skips_unstarted_levels() {
    let mut harness = Harness::new(WEB_REDIS);
    let orchestrator = harness.orchestrator();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = orchestrator.run(Command::Start, &[], &cancel).await.unwrap();
    assert!(report.interrupted);
    assert!(!report.success());
    for outcome in &report.outcomes {
        assert!(matches!(outcome.result, Err(EngineError::Interrupted)));
    }
    assert!(harness.events().is_empty());
}
