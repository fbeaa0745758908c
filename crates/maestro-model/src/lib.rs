//! # maestro-model
//!
//! Environment model and configuration loader for Maestro.
//!
//! This crate turns a declarative YAML environment description into a
//! validated, typed, in-memory model:
//!
//! - Ships (hosts running a container daemon) and their connection modes
//! - Services, their images and dependency declarations
//! - Instances with ports, volumes, limits and lifecycle checks
//! - Private registry credentials
//!
//! Loading is strict: structural problems, unknown schema versions, bad
//! enum values and dangling references are all surfaced as [`ConfigError`]
//! before any remote I/O happens. The model is immutable once built.

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod environment;
pub mod error;
pub mod instance;
pub mod lifecycle;
pub mod loader;
pub mod port;
pub mod registry;
pub mod restart;
pub mod service;
pub mod ship;
pub mod units;
pub mod volume;

pub use environment::Environment;
pub use error::{ConfigError, Result};
pub use instance::{Instance, NetworkMode, ResourceLimits};
pub use lifecycle::{CheckState, ExecCheck, HttpCheck, LifecycleCheck, PortRef, TcpCheck};
pub use loader::{load, load_str, MAX_SCHEMA};
pub use port::{PortSpec, Protocol};
pub use registry::Registry;
pub use restart::{RestartPolicy, RestartPolicyKind};
pub use service::Service;
pub use ship::{ConnectionMode, Ship, SshTunnelSettings, TlsSettings};
pub use volume::{VolumeBinding, VolumeMode};

/// Normalizes a name into an environment variable fragment.
///
/// Non-alphanumeric characters become underscores and the result is
/// upper-cased, so `redis-1` turns into `REDIS_1`. These fragments are part
/// of the public container environment contract.
#[must_use]
pub fn env_var_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_var_name_replaces_separators() {
        assert_eq!(env_var_name("redis-1"), "REDIS_1");
        assert_eq!(env_var_name("web.front"), "WEB_FRONT");
        assert_eq!(env_var_name("plain"), "PLAIN");
    }
}
