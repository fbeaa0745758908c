//! Service instances: one container on one ship.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_yaml::Value;
use std::fmt;

use crate::error::{ConfigError, Result};
use crate::lifecycle::{self, CheckState, LifecycleCheck, RawLifecycleCheck};
use crate::port::{self, PortSpec, RawPortSpec};
use crate::restart::{self, RawRestart, RestartPolicy};
use crate::units::{self, RawByteSize};
use crate::volume::{self, RawVolumeSpec, VolumeBinding, VolumeMode};

/// Default grace period, in seconds, between stop and SIGKILL.
pub const DEFAULT_STOP_TIMEOUT: u64 = 10;

/// Container network mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NetworkMode {
    /// Default bridge networking.
    #[default]
    Bridge,
    /// Share the host network namespace.
    Host,
    /// Share another container's network namespace.
    Container(String),
    /// No networking.
    None,
}

impl NetworkMode {
    fn parse(path: &str, s: &str) -> Result<Self> {
        match s {
            "bridge" => Ok(Self::Bridge),
            "host" => Ok(Self::Host),
            "none" => Ok(Self::None),
            other => match other.strip_prefix("container:") {
                Some(target) if !target.is_empty() => Ok(Self::Container(target.to_string())),
                _ => Err(ConfigError::invalid(
                    path,
                    format!("invalid net mode {other:?}, expected bridge, host, container:<name> or none"),
                )),
            },
        }
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bridge => write!(f, "bridge"),
            Self::Host => write!(f, "host"),
            Self::Container(name) => write!(f, "container:{name}"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Resource limits applied to a container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Memory limit in bytes.
    pub memory: Option<u64>,
    /// Swap limit in bytes.
    pub swap: Option<u64>,
    /// CPU shares.
    pub cpu: Option<u64>,
}

/// A single container: one service, one ship, a globally unique name.
///
/// The instance name doubles as the container name and hostname.
#[derive(Debug, Clone)]
pub struct Instance {
    /// Instance name.
    pub name: String,
    /// Name of the ship this instance runs on.
    pub ship: String,
    /// Image override; when unset the service image is used.
    pub image: Option<String>,
    /// Named port mappings.
    pub ports: IndexMap<String, PortSpec>,
    /// Host bind mounts.
    pub volumes: Vec<VolumeBinding>,
    /// In-container volumes without a host bind.
    pub container_volumes: Vec<String>,
    /// Sibling instances to import volumes from (same ship only).
    pub volumes_from: Vec<String>,
    /// Instance-level environment; overrides service values key by key.
    pub env: IndexMap<String, String>,
    /// Run with extended privileges.
    pub privileged: bool,
    /// Capabilities to add.
    pub cap_add: Vec<String>,
    /// Capabilities to drop.
    pub cap_drop: Vec<String>,
    /// Extra hostname to address entries for /etc/hosts.
    pub extra_hosts: IndexMap<String, String>,
    /// Grace period between stop and SIGKILL, in seconds.
    pub stop_timeout: u64,
    /// Resource limits.
    pub limits: ResourceLimits,
    /// Logging driver.
    pub log_driver: Option<String>,
    /// Logging driver options.
    pub log_opt: IndexMap<String, String>,
    /// Command override.
    pub command: Option<String>,
    /// Working directory inside the container.
    pub workdir: Option<String>,
    /// Network mode.
    pub net: NetworkMode,
    /// Restart policy.
    pub restart: RestartPolicy,
    /// DNS servers.
    pub dns: Vec<String>,
    /// Links to sibling instances on the same ship, by alias.
    pub links: IndexMap<String, String>,
    /// Instance-level lifecycle checks, additive to the service's.
    pub lifecycle: IndexMap<CheckState, Vec<LifecycleCheck>>,
}

impl Instance {
    /// Returns all in-container mount targets: bind targets plus
    /// container-only volumes.
    #[must_use]
    pub fn mount_targets(&self) -> Vec<&str> {
        self.volumes
            .iter()
            .map(|v| v.target.as_str())
            .chain(self.container_volumes.iter().map(String::as_str))
            .collect()
    }
}

/// A scalar or a list of scalars.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub(crate) fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(v) => vec![v],
            Self::Many(vs) => vs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawInstance {
    pub ship: String,
    pub image: Option<String>,
    #[serde(default)]
    pub ports: IndexMap<String, RawPortSpec>,
    #[serde(default)]
    pub volumes: IndexMap<String, RawVolumeSpec>,
    pub container_volumes: Option<OneOrMany<String>>,
    pub volumes_from: Option<OneOrMany<String>>,
    #[serde(default)]
    pub env: IndexMap<String, Value>,
    #[serde(default)]
    pub privileged: bool,
    #[serde(default)]
    pub cap_add: Vec<String>,
    #[serde(default)]
    pub cap_drop: Vec<String>,
    #[serde(default)]
    pub extra_hosts: IndexMap<String, String>,
    pub stop_timeout: Option<u64>,
    #[serde(default)]
    pub limits: RawLimits,
    pub log_driver: Option<String>,
    #[serde(default)]
    pub log_opt: IndexMap<String, String>,
    pub command: Option<String>,
    pub workdir: Option<String>,
    pub net: Option<String>,
    pub restart: Option<RawRestart>,
    pub dns: Option<OneOrMany<String>>,
    #[serde(default)]
    pub links: IndexMap<String, String>,
    #[serde(default)]
    pub lifecycle: IndexMap<String, Vec<RawLifecycleCheck>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawLimits {
    pub memory: Option<RawByteSize>,
    pub swap: Option<RawByteSize>,
    pub cpu: Option<u64>,
}

/// Flattens an environment value into a single string.
///
/// Lists are flattened recursively and space-joined, so option lists like
/// `[-Xms1g, [-Xmx2g, -server]]` become `-Xms1g -Xmx2g -server`.
pub(crate) fn env_value(path: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Sequence(items) => {
            let parts = items
                .iter()
                .map(|item| env_value(path, item))
                .collect::<Result<Vec<_>>>()?;
            Ok(parts.join(" "))
        }
        _ => Err(ConfigError::invalid(path, "environment values must be scalars or lists")),
    }
}

pub(crate) fn parse_env_map(
    path: &str,
    raw: &IndexMap<String, Value>,
) -> Result<IndexMap<String, String>> {
    raw.iter()
        .map(|(k, v)| Ok((k.clone(), env_value(&format!("{path}.{k}"), v)?)))
        .collect()
}

impl RawInstance {
    pub(crate) fn build(self, path: &str, name: &str, schema: u32) -> Result<Instance> {
        let ports = self
            .ports
            .iter()
            .map(|(port_name, raw)| {
                let spec = port::parse_port_spec(
                    &format!("{path}.ports.{port_name}"),
                    port_name,
                    raw,
                )?;
                Ok((port_name.clone(), spec))
            })
            .collect::<Result<IndexMap<_, _>>>()?;

        // Schema 1 oriented volume maps as container path to host path;
        // schema 2 inverted them and added the mode.
        let volumes = self
            .volumes
            .iter()
            .map(|(key, raw)| {
                let vol_path = format!("{path}.volumes.{key}");
                if schema < 2 {
                    match raw {
                        RawVolumeSpec::Target(host_path) => Ok(VolumeBinding {
                            host_path: host_path.clone(),
                            target: key.clone(),
                            mode: VolumeMode::ReadWrite,
                        }),
                        RawVolumeSpec::Full { .. } => Err(ConfigError::invalid(
                            &vol_path,
                            "schema 1 volumes map container path to host path",
                        )),
                    }
                } else {
                    volume::parse_volume(&vol_path, key, raw)
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let container_volumes =
            self.container_volumes.map(OneOrMany::into_vec).unwrap_or_default();
        for target in &container_volumes {
            if volumes.iter().any(|v| &v.target == target) {
                return Err(ConfigError::invalid(
                    format!("{path}.container_volumes"),
                    format!("conflict between bind-mounted volume and container-only volume on {target}"),
                ));
            }
        }

        let limits = ResourceLimits {
            memory: self
                .limits
                .memory
                .as_ref()
                .map(|raw| units::parse_raw_byte_size(&format!("{path}.limits.memory"), raw))
                .transpose()?,
            swap: self
                .limits
                .swap
                .as_ref()
                .map(|raw| units::parse_raw_byte_size(&format!("{path}.limits.swap"), raw))
                .transpose()?,
            cpu: self.limits.cpu,
        };

        Ok(Instance {
            name: name.to_string(),
            ship: self.ship,
            image: self.image,
            ports,
            volumes,
            container_volumes,
            volumes_from: self.volumes_from.map(OneOrMany::into_vec).unwrap_or_default(),
            env: parse_env_map(&format!("{path}.env"), &self.env)?,
            privileged: self.privileged,
            cap_add: self.cap_add,
            cap_drop: self.cap_drop,
            extra_hosts: self.extra_hosts,
            stop_timeout: self.stop_timeout.unwrap_or(DEFAULT_STOP_TIMEOUT),
            limits,
            log_driver: self.log_driver,
            log_opt: self.log_opt,
            command: self.command,
            workdir: self.workdir,
            net: self
                .net
                .as_deref()
                .map(|net| NetworkMode::parse(&format!("{path}.net"), net))
                .transpose()?
                .unwrap_or_default(),
            restart: self
                .restart
                .as_ref()
                .map(|raw| restart::parse_restart(&format!("{path}.restart"), raw))
                .transpose()?
                .unwrap_or_default(),
            dns: self.dns.map(OneOrMany::into_vec).unwrap_or_default(),
            links: self.links,
            lifecycle: lifecycle::parse_lifecycle(&format!("{path}.lifecycle"), &self.lifecycle)?,
        })
    }
}
