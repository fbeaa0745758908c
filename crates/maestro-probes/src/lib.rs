//! # maestro-probes
//!
//! Lifecycle probes for Maestro.
//!
//! A probe polls a target until it succeeds or runs out of budget:
//!
//! - [`TcpProbe`] attempts a TCP connect once per second
//! - [`HttpProbe`] issues an HTTP request once per second
//! - [`ExecProbe`] runs a shell command with bounded retries
//!
//! Checks configured for a lifecycle state form a conjunctive gate: they
//! run in declared order and the first failure aborts the gate, surfacing
//! the failing check's tag. Deadlines are measured on a monotonic clock.

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod exec;
pub mod http;
pub mod tcp;

pub use error::{ProbeError, Result};
pub use exec::ExecProbe;
pub use http::HttpProbe;
pub use tcp::TcpProbe;

use indexmap::IndexMap;
use maestro_model::{LifecycleCheck, PortRef, PortSpec, Protocol};

/// What a probe runs against: the instance's ship address, its resolved
/// ports, and its composed environment.
#[derive(Debug, Clone, Copy)]
pub struct ProbeTarget<'a> {
    /// Address of the instance's ship.
    pub host: &'a str,
    /// Named ports of the instance.
    pub ports: &'a IndexMap<String, PortSpec>,
    /// Composed container environment, passed to exec probes.
    pub env: &'a IndexMap<String, String>,
}

/// A ready-to-run lifecycle probe.
#[derive(Debug)]
pub enum Probe {
    /// TCP connect probe.
    Tcp(TcpProbe),
    /// HTTP request probe.
    Http(HttpProbe),
    /// Shell command probe.
    Exec(ExecProbe),
}

impl Probe {
    /// Identifying tag of the underlying check.
    #[must_use]
    pub fn tag(&self) -> &str {
        match self {
            Self::Tcp(p) => p.tag(),
            Self::Http(p) => p.tag(),
            Self::Exec(p) => p.tag(),
        }
    }

    /// Polls until success, timeout, or failure.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Timeout`] when the budget is exhausted and
    /// [`ProbeError::Failed`] on unrecoverable errors.
    pub async fn run(&self) -> Result<()> {
        match self {
            Self::Tcp(p) => p.run().await,
            Self::Http(p) => p.run().await,
            Self::Exec(p) => p.run().await,
        }
    }

    /// Resolves a configured check against a target into a runnable probe.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Failed`] when the check references a port the
    /// instance does not define, or a UDP port.
    pub fn build(check: &LifecycleCheck, target: &ProbeTarget<'_>) -> Result<Self> {
        let tag = check.tag();
        match check {
            LifecycleCheck::Tcp(c) => {
                let port = resolve_tcp_port(&tag, &c.port, target)?;
                Ok(Self::Tcp(TcpProbe::new(tag, target.host, port, c.max_wait)))
            }
            LifecycleCheck::Http(c) => {
                let port = match &c.port {
                    PortRef::Number(n) => *n,
                    PortRef::Named(name) => resolve_tcp_port(&tag, name, target)?,
                };
                let host = c.host.as_deref().unwrap_or(target.host);
                let url = format!("{}://{}:{}{}", c.scheme, host, port, c.path);
                Ok(Self::Http(HttpProbe::new(
                    tag,
                    url,
                    &c.method,
                    c.match_regex.as_deref(),
                    c.max_wait,
                    c.verify,
                )?))
            }
            LifecycleCheck::Exec(c) => Ok(Self::Exec(ExecProbe::new(
                tag,
                &c.command,
                target.env,
                c.attempts,
                c.delay,
            ))),
        }
    }
}

fn resolve_tcp_port(tag: &str, name: &str, target: &ProbeTarget<'_>) -> Result<u16> {
    let spec = target.ports.get(name).ok_or_else(|| ProbeError::Failed {
        check: tag.to_string(),
        reason: format!("port {name:?} is not defined by the instance"),
    })?;
    if spec.external_proto == Protocol::Udp {
        return Err(ProbeError::Failed {
            check: tag.to_string(),
            reason: format!("port {name:?} is not TCP"),
        });
    }
    Ok(spec.external_port)
}

/// Runs a conjunctive gate of probes in declared order.
///
/// # Errors
///
/// Propagates the first probe failure; later probes are not run.
pub async fn run_gate(probes: &[Probe]) -> Result<()> {
    for probe in probes {
        tracing::debug!(check = probe.tag(), "running lifecycle check");
        probe.run().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_model::load_str;

    fn target_env() -> maestro_model::Environment {
        load_str(
            r"
name: t
ships: { vm1: { ip: 127.0.0.1 } }
services:
  db:
    image: db
    instances:
      db-1:
        ship: vm1
        ports: { client: 5432, metrics: 9400/udp }
",
        )
        .unwrap()
    }

    #[test]
    fn unknown_port_fails_to_build() {
        let env = target_env();
        let (_, instance) = env.instance("db-1").unwrap();
        let composed = IndexMap::new();
        let target = ProbeTarget { host: "127.0.0.1", ports: &instance.ports, env: &composed };
        let check = LifecycleCheck::Tcp(maestro_model::TcpCheck {
            port: "ghost".to_string(),
            max_wait: 1,
        });
        let err = Probe::build(&check, &target).unwrap_err();
        assert!(err.to_string().contains("not defined"));
    }

    #[test]
    fn udp_port_fails_to_build() {
        let env = target_env();
        let (_, instance) = env.instance("db-1").unwrap();
        let composed = IndexMap::new();
        let target = ProbeTarget { host: "127.0.0.1", ports: &instance.ports, env: &composed };
        let check = LifecycleCheck::Tcp(maestro_model::TcpCheck {
            port: "metrics".to_string(),
            max_wait: 1,
        });
        let err = Probe::build(&check, &target).unwrap_err();
        assert!(err.to_string().contains("not TCP"));
    }
}
