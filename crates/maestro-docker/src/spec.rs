//! Container creation parameters derived from an instance.

use indexmap::IndexMap;
use maestro_model::{Instance, NetworkMode, PortSpec, Service, VolumeBinding};

/// Everything the daemon needs to create one container.
///
/// Built once per create from the instance definition and its composed
/// environment; the wire encoding lives in [`crate::types`].
#[derive(Debug, Clone)]
pub struct CreateSpec {
    /// Container name (the instance name).
    pub name: String,
    /// Container hostname (also the instance name).
    pub hostname: String,
    /// Image reference.
    pub image: String,
    /// Composed environment.
    pub env: IndexMap<String, String>,
    /// Command override, shell-interpreted inside the container.
    pub command: Option<String>,
    /// Working directory.
    pub workdir: Option<String>,
    /// Named port mappings.
    pub ports: Vec<PortSpec>,
    /// Host bind mounts.
    pub volumes: Vec<VolumeBinding>,
    /// Container-only volumes.
    pub container_volumes: Vec<String>,
    /// Containers to import volumes from.
    pub volumes_from: Vec<String>,
    /// Extended privileges.
    pub privileged: bool,
    /// Capabilities to add.
    pub cap_add: Vec<String>,
    /// Capabilities to drop.
    pub cap_drop: Vec<String>,
    /// `host:ip` entries for /etc/hosts.
    pub extra_hosts: Vec<String>,
    /// Memory limit in bytes.
    pub memory: Option<u64>,
    /// Combined memory plus swap limit in bytes.
    pub memory_swap: Option<u64>,
    /// CPU shares.
    pub cpu_shares: Option<u64>,
    /// Logging driver.
    pub log_driver: Option<String>,
    /// Logging driver options.
    pub log_opt: IndexMap<String, String>,
    /// Network mode string (`bridge`, `host`, `container:<name>`, `none`).
    pub network_mode: String,
    /// Restart policy name.
    pub restart_name: String,
    /// Restart retry bound.
    pub restart_retries: u32,
    /// DNS servers.
    pub dns: Vec<String>,
    /// `name:alias` container links.
    pub links: Vec<String>,
}

impl CreateSpec {
    /// Builds the create parameters for an instance.
    ///
    /// `env` is the composed environment map for the container (discovery
    /// variables plus user configuration).
    #[must_use]
    pub fn for_instance(
        service: &Service,
        instance: &Instance,
        env: IndexMap<String, String>,
    ) -> Self {
        let network_mode = match &instance.net {
            NetworkMode::Bridge => "bridge".to_string(),
            NetworkMode::Host => "host".to_string(),
            NetworkMode::Container(name) => format!("container:{name}"),
            NetworkMode::None => "none".to_string(),
        };

        Self {
            name: instance.name.clone(),
            hostname: instance.name.clone(),
            image: service.image_for(instance).to_string(),
            env,
            command: instance.command.clone(),
            workdir: instance.workdir.clone(),
            ports: instance.ports.values().cloned().collect(),
            volumes: instance.volumes.clone(),
            container_volumes: instance.container_volumes.clone(),
            volumes_from: instance.volumes_from.clone(),
            privileged: instance.privileged,
            cap_add: instance.cap_add.clone(),
            cap_drop: instance.cap_drop.clone(),
            extra_hosts: instance
                .extra_hosts
                .iter()
                .map(|(host, ip)| format!("{host}:{ip}"))
                .collect(),
            memory: instance.limits.memory,
            memory_swap: instance
                .limits
                .memory
                .and_then(|m| instance.limits.swap.map(|s| m + s)),
            cpu_shares: instance.limits.cpu,
            log_driver: instance.log_driver.clone(),
            log_opt: instance.log_opt.clone(),
            network_mode,
            restart_name: instance.restart.name.to_string(),
            restart_retries: instance.restart.maximum_retry_count,
            dns: instance.dns.clone(),
            links: instance
                .links
                .iter()
                .map(|(name, alias)| format!("{name}:{alias}"))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_model::load_str;

    #[test]
    fn spec_carries_instance_configuration() {
        let env = load_str(
            r"
name: t
ships: { vm1: { ip: 10.0.0.1 } }
services:
  web:
    image: acme/web:1.0
    instances:
      web-1:
        ship: vm1
        ports: { http: '80:8080' }
        volumes: { /data: /var/lib/web }
        privileged: true
        extra_hosts: { db.local: 10.0.0.9 }
        limits: { memory: 1g, swap: 1g }
        restart: on-failure:3
        links: { redis-1: redis }
        net: host
",
        )
        .unwrap();
        let (service, instance) = env.instance("web-1").unwrap();
        let spec = CreateSpec::for_instance(service, instance, IndexMap::new());

        assert_eq!(spec.name, "web-1");
        assert_eq!(spec.hostname, "web-1");
        assert_eq!(spec.image, "acme/web:1.0");
        assert_eq!(spec.ports[0].external_port, 8080);
        assert_eq!(spec.volumes[0].target, "/var/lib/web");
        assert!(spec.privileged);
        assert_eq!(spec.extra_hosts, vec!["db.local:10.0.0.9"]);
        assert_eq!(spec.memory, Some(1_073_741_824));
        assert_eq!(spec.memory_swap, Some(2_147_483_648));
        assert_eq!(spec.restart_name, "on-failure");
        assert_eq!(spec.restart_retries, 3);
        assert_eq!(spec.links, vec!["redis-1:redis"]);
        assert_eq!(spec.network_mode, "host");
    }
}
