//! Docker Engine API wire types.
//!
//! Only the fields Maestro actually sends or reads are modeled; unknown
//! response fields are ignored.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::spec::CreateSpec;

/// Empty JSON object used by the API for set-valued keys.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Empty {}

/// `POST /containers/create` request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateContainerRequest {
    pub image: String,
    pub hostname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmd: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub exposed_ports: HashMap<String, Empty>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub volumes: HashMap<String, Empty>,
    pub host_config: HostConfig,
}

/// Host-side configuration of a container.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostConfig {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub binds: Vec<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub port_bindings: HashMap<String, Vec<PortBinding>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumes_from: Vec<String>,
    pub privileged: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cap_add: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cap_drop: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra_hosts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_swap: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_shares: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_config: Option<LogConfig>,
    pub network_mode: String,
    pub restart_policy: RestartPolicySpec,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dns: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<String>,
}

/// One host-side binding of a published port.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PortBinding {
    pub host_ip: String,
    pub host_port: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LogConfig {
    #[serde(rename = "Type")]
    pub driver: String,
    pub config: HashMap<String, String>,
}

/// Restart policy.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RestartPolicySpec {
    pub name: String,
    pub maximum_retry_count: u32,
}

/// `POST /containers/create` response body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateContainerResponse {
    pub id: String,
    #[serde(default)]
    pub warnings: Option<Vec<String>>,
}

/// `GET /containers/{name}/json` response body (the parts we read).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerInspect {
    pub id: String,
    pub image: String,
    pub state: InspectState,
}

/// Container state section of an inspect response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InspectState {
    pub status: String,
    pub running: bool,
    #[serde(default)]
    pub exit_code: Option<i64>,
}

/// API error response body.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub message: String,
}

impl From<&CreateSpec> for CreateContainerRequest {
    fn from(spec: &CreateSpec) -> Self {
        let env = spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect();

        let mut exposed_ports = HashMap::new();
        let mut port_bindings: HashMap<String, Vec<PortBinding>> = HashMap::new();
        for port in &spec.ports {
            let key = format!("{}/{}", port.exposed_port, port.exposed_proto);
            exposed_ports.insert(key.clone(), Empty {});
            port_bindings.entry(key).or_default().push(PortBinding {
                host_ip: port.bind_addr.clone(),
                host_port: port.external_port.to_string(),
            });
        }

        let volumes = spec
            .container_volumes
            .iter()
            .map(|target| (target.clone(), Empty {}))
            .collect();

        let binds = spec
            .volumes
            .iter()
            .map(|v| format!("{}:{}:{}", v.host_path, v.target, v.mode))
            .collect();

        Self {
            image: spec.image.clone(),
            hostname: spec.hostname.clone(),
            // Command overrides are shell-interpreted, matching exec checks.
            cmd: spec
                .command
                .as_ref()
                .map(|c| vec!["/bin/sh".to_string(), "-c".to_string(), c.clone()]),
            env,
            working_dir: spec.workdir.clone(),
            exposed_ports,
            volumes,
            host_config: HostConfig {
                binds,
                port_bindings,
                volumes_from: spec.volumes_from.clone(),
                privileged: spec.privileged,
                cap_add: spec.cap_add.clone(),
                cap_drop: spec.cap_drop.clone(),
                extra_hosts: spec.extra_hosts.clone(),
                memory: spec.memory,
                memory_swap: spec.memory_swap,
                cpu_shares: spec.cpu_shares,
                log_config: spec.log_driver.as_ref().map(|driver| LogConfig {
                    driver: driver.clone(),
                    config: spec.log_opt.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                }),
                network_mode: spec.network_mode.clone(),
                restart_policy: RestartPolicySpec {
                    name: spec.restart_name.clone(),
                    maximum_retry_count: spec.restart_retries,
                },
                dns: spec.dns.clone(),
                links: spec.links.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use maestro_model::load_str;

    #[test]
    fn create_request_encodes_ports_and_binds() {
        let env = load_str(
            r"
name: t
ships: { vm1: { ip: 10.0.0.1 } }
services:
  web:
    image: acme/web
    instances:
      web-1:
        ship: vm1
        ports: { http: '80:8080' }
        volumes: { /data: { target: /var/lib/web, mode: ro } }
        env: { A: '1' }
",
        )
        .unwrap();
        let (service, instance) = env.instance("web-1").unwrap();
        let mut composed = IndexMap::new();
        composed.insert("A".to_string(), "1".to_string());
        let spec = CreateSpec::for_instance(service, instance, composed);
        let request = CreateContainerRequest::from(&spec);

        assert_eq!(request.hostname, "web-1");
        assert_eq!(request.env, vec!["A=1"]);
        assert!(request.exposed_ports.contains_key("80/tcp"));
        let binding = &request.host_config.port_bindings["80/tcp"][0];
        assert_eq!(binding.host_ip, "0.0.0.0");
        assert_eq!(binding.host_port, "8080");
        assert_eq!(request.host_config.binds, vec!["/data:/var/lib/web:ro"]);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["HostConfig"]["NetworkMode"], "bridge");
        assert_eq!(json["HostConfig"]["RestartPolicy"]["Name"], "no");
    }
}
