//! Dependency resolution and cross-entity validation.

use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;
use tracing::warn;

use maestro_model::{CheckState, Environment, Instance, LifecycleCheck, PortRef, Protocol, Service};

/// Errors raised while resolving an environment. All are fatal and occur
/// before any remote I/O.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The `requires` graph contains a cycle. The path lists one minimal
    /// cycle, first service repeated at the end.
    #[error("dependency cycle detected: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    /// `volumes_from` names something that is not an instance.
    #[error("{instance}: volumes_from {volume_source:?} is not an instance of the environment")]
    UnknownVolumesFrom {
        /// The referencing instance.
        instance: String,
        /// The dangling name.
        volume_source: String,
    },

    /// `volumes_from` names an instance on a different ship.
    #[error("{instance}: volumes_from {volume_source:?} runs on a different ship")]
    VolumesFromShip {
        /// The referencing instance.
        instance: String,
        /// The cross-ship source.
        volume_source: String,
    },

    /// Two instances sharing volumes mount the same target.
    #[error("volume conflict between {instance} and {volume_source} on {target}")]
    VolumeConflict {
        /// The referencing instance.
        instance: String,
        /// The volume source instance.
        volume_source: String,
        /// The clashing mount target.
        target: String,
    },

    /// A link names something that is not an instance.
    #[error("{instance}: link target {target:?} is not an instance of the environment")]
    UnknownLink {
        /// The referencing instance.
        instance: String,
        /// The dangling name.
        target: String,
    },

    /// A link names an instance on a different ship.
    #[error("{instance}: link target {target:?} runs on a different ship")]
    LinkShip {
        /// The referencing instance.
        instance: String,
        /// The cross-ship target.
        target: String,
    },

    /// `net: container:<name>` names something that is not an instance.
    #[error("{instance}: net container {target:?} is not an instance of the environment")]
    UnknownNetContainer {
        /// The referencing instance.
        instance: String,
        /// The dangling name.
        target: String,
    },

    /// A lifecycle check references a port the instance does not define.
    #[error("{instance}: lifecycle check references unknown port {port:?}")]
    UnknownCheckPort {
        /// The instance the check applies to.
        instance: String,
        /// The dangling port name.
        port: String,
    },

    /// A lifecycle check references a UDP port.
    #[error("{instance}: lifecycle check port {port:?} is not TCP")]
    CheckPortNotTcp {
        /// The instance the check applies to.
        instance: String,
        /// The UDP port name.
        port: String,
    },
}

/// An environment with resolved ordering attached.
///
/// Read-only; shared across orchestrator workers.
#[derive(Debug)]
pub struct ResolvedEnv {
    env: Environment,
    /// Services in forward (start) topological order.
    order: Vec<String>,
    /// Topological level per service: 0 for roots, `1 + max(deps)` above.
    level: HashMap<String, usize>,
    /// Transitive closure of `requires ∪ wants_info`, excluding self.
    /// Drives environment composition.
    visible: HashMap<String, BTreeSet<String>>,
    /// Transitive closure of `requires`, excluding self. Drives downward
    /// target expansion.
    requires_closure: HashMap<String, BTreeSet<String>>,
    /// Transitive reverse closure of `requires`, excluding self. Drives
    /// upward target expansion.
    dependents_closure: HashMap<String, BTreeSet<String>>,
}

impl ResolvedEnv {
    /// The underlying environment.
    #[must_use]
    pub const fn environment(&self) -> &Environment {
        &self.env
    }

    /// Services in forward (start) topological order.
    #[must_use]
    pub fn start_order(&self) -> &[String] {
        &self.order
    }

    /// Topological level of a service.
    #[must_use]
    pub fn level(&self, service: &str) -> usize {
        self.level.get(service).copied().unwrap_or(0)
    }

    /// Services visible to `service` for environment composition
    /// (transitive `requires ∪ wants_info`, without `service` itself).
    #[must_use]
    pub fn visible_services(&self, service: &str) -> &BTreeSet<String> {
        &self.visible[service]
    }

    /// Transitive hard dependencies of a service.
    #[must_use]
    pub fn requires_closure(&self, service: &str) -> &BTreeSet<String> {
        &self.requires_closure[service]
    }

    /// Transitive dependents of a service.
    #[must_use]
    pub fn dependents_closure(&self, service: &str) -> &BTreeSet<String> {
        &self.dependents_closure[service]
    }
}

/// Resolves an environment: orders services, materializes closures, and
/// validates cross-entity references.
///
/// # Errors
///
/// Returns a [`ResolveError`] on a `requires` cycle or any dangling or
/// cross-ship reference. `wants_info` cycles are permitted (they carry no
/// ordering) and only logged.
pub fn resolve(env: Environment) -> Result<ResolvedEnv, ResolveError> {
    let (order, level) = topo_sort(&env)?;
    warn_on_wants_info_cycles(&env);

    let requires_closure = closures(&env, |s| s.requires.iter());
    let visible = closures(&env, |s| s.requires.iter().chain(&s.wants_info));

    let mut dependents_closure: HashMap<String, BTreeSet<String>> =
        env.services.keys().map(|name| (name.clone(), BTreeSet::new())).collect();
    for (name, deps) in &requires_closure {
        for dep in deps {
            if let Some(set) = dependents_closure.get_mut(dep) {
                set.insert(name.clone());
            }
        }
    }

    validate_instances(&env)?;

    Ok(ResolvedEnv { env, order, level, visible, requires_closure, dependents_closure })
}

/// Kahn's algorithm over `requires` edges, lexicographic tie-break.
fn topo_sort(env: &Environment) -> Result<(Vec<String>, HashMap<String, usize>), ResolveError> {
    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for service in env.services.values() {
        in_degree.entry(&service.name).or_insert(0);
        for dep in &service.requires {
            *in_degree.entry(&service.name).or_insert(0) += 1;
            dependents.entry(dep.as_str()).or_default().push(&service.name);
        }
    }

    // BTreeSet pops the lexicographically smallest ready service first,
    // keeping the order reproducible across runs.
    let mut ready: BTreeSet<&str> =
        in_degree.iter().filter(|(_, d)| **d == 0).map(|(name, _)| *name).collect();
    let mut order = Vec::with_capacity(env.services.len());
    let mut level: HashMap<String, usize> = HashMap::new();

    while let Some(name) = ready.iter().next().copied() {
        ready.remove(name);
        let service_level = env.services[name]
            .requires
            .iter()
            .map(|dep| level.get(dep.as_str()).copied().unwrap_or(0) + 1)
            .max()
            .unwrap_or(0);
        level.insert(name.to_string(), service_level);
        order.push(name.to_string());

        for dependent in dependents.get(name).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(dependent);
                }
            }
        }
    }

    if order.len() != env.services.len() {
        let remaining: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(name, _)| !level.contains_key(**name))
            .map(|(name, _)| *name)
            .collect();
        return Err(ResolveError::Cycle(find_cycle(env, &remaining)));
    }
    Ok((order, level))
}

/// Walks `requires` edges inside the stalled remainder until a service
/// repeats, producing one minimal cycle like `[a, b, a]`.
fn find_cycle(env: &Environment, remaining: &BTreeSet<&str>) -> Vec<String> {
    let Some(&start) = remaining.iter().next() else { return Vec::new() };
    let mut path: Vec<&str> = vec![start];
    loop {
        let current = path[path.len() - 1];
        let Some(next) = env.services[current]
            .requires
            .iter()
            .find(|dep| remaining.contains(dep.as_str()))
        else {
            return path.iter().map(ToString::to_string).collect();
        };
        if let Some(pos) = path.iter().position(|s| *s == next.as_str()) {
            let mut cycle: Vec<String> = path[pos..].iter().map(ToString::to_string).collect();
            cycle.push(next.clone());
            return cycle;
        }
        path.push(next);
    }
}

fn warn_on_wants_info_cycles(env: &Environment) {
    // wants_info edges carry no ordering, so cycles through them are
    // accepted. Surface them anyway since they often indicate a confused
    // dependency declaration.
    let mut visiting: Vec<&str> = Vec::new();
    let mut done: BTreeSet<&str> = BTreeSet::new();

    fn visit<'a>(
        env: &'a Environment,
        name: &'a str,
        visiting: &mut Vec<&'a str>,
        done: &mut BTreeSet<&'a str>,
    ) -> bool {
        if done.contains(name) {
            return false;
        }
        if visiting.contains(&name) {
            return true;
        }
        visiting.push(name);
        let service = &env.services[name];
        let mut cyclic = false;
        for dep in service.requires.iter().chain(&service.wants_info) {
            cyclic |= visit(env, dep, visiting, done);
        }
        visiting.pop();
        done.insert(name);
        cyclic
    }

    for name in env.services.keys() {
        if visit(env, name, &mut visiting, &mut done) {
            warn!(service = name, "wants_info dependencies form a cycle");
        }
    }
}

/// Transitive closure over the edges produced by `edges`, excluding the
/// service itself unless it is reachable through a cycle of info edges.
fn closures<'a, F, I>(env: &'a Environment, edges: F) -> HashMap<String, BTreeSet<String>>
where
    F: Fn(&'a Service) -> I,
    I: Iterator<Item = &'a String>,
{
    let mut result = HashMap::new();
    for name in env.services.keys() {
        let mut reached: BTreeSet<String> = BTreeSet::new();
        let mut stack: Vec<&str> = edges(&env.services[name]).map(String::as_str).collect();
        while let Some(current) = stack.pop() {
            if !reached.insert(current.to_string()) {
                continue;
            }
            stack.extend(edges(&env.services[current]).map(String::as_str));
        }
        reached.remove(name);
        result.insert(name.clone(), reached);
    }
    result
}

fn validate_instances(env: &Environment) -> Result<(), ResolveError> {
    // Instance name -> (ship, mount targets) for cross-instance checks.
    let mut index: IndexMap<&str, (&str, Vec<&str>)> = IndexMap::new();
    for (_, instance) in env.instances() {
        index.insert(&instance.name, (&instance.ship, instance.mount_targets()));
    }

    for (service, instance) in env.instances() {
        let name = instance.name.clone();

        for source in &instance.volumes_from {
            let Some((ship, targets)) = index.get(source.as_str()) else {
                return Err(ResolveError::UnknownVolumesFrom {
                    instance: name,
                    volume_source: source.clone(),
                });
            };
            if *ship != instance.ship {
                return Err(ResolveError::VolumesFromShip {
                    instance: name,
                    volume_source: source.clone(),
                });
            }
            if let Some(target) =
                instance.mount_targets().iter().find(|t| targets.contains(t))
            {
                return Err(ResolveError::VolumeConflict {
                    instance: name,
                    volume_source: source.clone(),
                    target: (*target).to_string(),
                });
            }
        }

        for target in instance.links.keys() {
            let Some((ship, _)) = index.get(target.as_str()) else {
                return Err(ResolveError::UnknownLink { instance: name, target: target.clone() });
            };
            if *ship != instance.ship {
                return Err(ResolveError::LinkShip { instance: name, target: target.clone() });
            }
        }

        if let maestro_model::NetworkMode::Container(target) = &instance.net {
            if !index.contains_key(target.as_str()) {
                return Err(ResolveError::UnknownNetContainer {
                    instance: name,
                    target: target.clone(),
                });
            }
        }

        validate_checks(service, instance)?;
    }
    Ok(())
}

/// Named port references in checks must resolve to TCP ports.
fn validate_checks(service: &Service, instance: &Instance) -> Result<(), ResolveError> {
    for state in [CheckState::Running, CheckState::Stopped] {
        for check in service.checks_for(instance, state) {
            let port_name = match check {
                LifecycleCheck::Tcp(c) => Some(&c.port),
                LifecycleCheck::Http(c) => match &c.port {
                    PortRef::Named(port) => Some(port),
                    PortRef::Number(_) => None,
                },
                LifecycleCheck::Exec(_) => None,
            };
            let Some(port_name) = port_name else { continue };
            let Some(spec) = instance.ports.get(port_name) else {
                return Err(ResolveError::UnknownCheckPort {
                    instance: instance.name.clone(),
                    port: port_name.clone(),
                });
            };
            if spec.external_proto == Protocol::Udp {
                return Err(ResolveError::CheckPortNotTcp {
                    instance: instance.name.clone(),
                    port: port_name.clone(),
                });
            }
        }
    }
    Ok(())
}
