//! Environment file loading.
//!
//! Loading is a two-step process: serde deserializes the YAML into raw
//! shape-detecting structures, then an explicit build pass normalizes
//! shorthand forms and validates semantic constraints with dotted-path
//! error context. Dependency resolution and ordering are not performed
//! here; see the engine crate.

use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use crate::environment::Environment;
use crate::error::{ConfigError, Result};
use crate::registry::Registry;
use crate::service::RawService;
use crate::ship::RawShip;

/// Highest `__maestro.schema` version this build understands.
pub const MAX_SCHEMA: u32 = 2;

#[derive(Debug, Deserialize)]
struct RawEnvFile {
    #[serde(rename = "__maestro", default)]
    meta: RawMeta,
    name: String,
    #[serde(default)]
    registries: IndexMap<String, Registry>,
    #[serde(default)]
    ship_defaults: RawShip,
    #[serde(default)]
    ships: IndexMap<String, RawShip>,
    #[serde(default)]
    services: IndexMap<String, RawService>,
}

#[derive(Debug, Deserialize)]
struct RawMeta {
    #[serde(default = "default_schema")]
    schema: u32,
}

impl Default for RawMeta {
    fn default() -> Self {
        Self { schema: default_schema() }
    }
}

const fn default_schema() -> u32 {
    1
}

/// Loads an environment description from a YAML file.
///
/// # Errors
///
/// Returns a [`ConfigError`] when the file cannot be read, the YAML is
/// malformed, the schema version is unsupported, or any structural or
/// referential constraint is violated.
pub fn load(path: impl AsRef<Path>) -> Result<Environment> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_str(&contents)
}

/// Loads an environment description from a YAML string.
///
/// # Errors
///
/// Same failure modes as [`load`], minus file I/O.
pub fn load_str(contents: &str) -> Result<Environment> {
    let raw: RawEnvFile = serde_yaml::from_str(contents)?;

    if raw.meta.schema > MAX_SCHEMA {
        return Err(ConfigError::SchemaVersion { found: raw.meta.schema, max: MAX_SCHEMA });
    }
    let schema = raw.meta.schema;

    let ships = raw
        .ships
        .into_iter()
        .map(|(name, mut ship)| {
            ship.apply_defaults(&raw.ship_defaults);
            Ok((name.clone(), ship.build(&name)?))
        })
        .collect::<Result<IndexMap<_, _>>>()?;

    let services = raw
        .services
        .into_iter()
        .map(|(name, service)| Ok((name.clone(), service.build(&name, schema)?)))
        .collect::<Result<IndexMap<_, _>>>()?;

    let env = Environment { name: raw.name, schema, ships, registries: raw.registries, services };
    validate_references(&env)?;
    Ok(env)
}

/// Checks that every cross-entity name reference resolves.
fn validate_references(env: &Environment) -> Result<()> {
    let mut seen_instances: HashSet<&str> = HashSet::new();

    for service in env.services.values() {
        let path = format!("services.{}", service.name);

        for dep in service.requires.iter().chain(&service.wants_info) {
            if !env.services.contains_key(dep) {
                return Err(ConfigError::missing(&path, "service", dep));
            }
        }

        for (name, instance) in &service.instances {
            let instance_path = format!("{path}.instances.{name}");
            if !env.ships.contains_key(&instance.ship) {
                return Err(ConfigError::missing(&instance_path, "ship", &instance.ship));
            }
            if !seen_instances.insert(name) {
                return Err(ConfigError::invalid(
                    &instance_path,
                    "instance names must be unique across the environment",
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r"
__maestro: { schema: 2 }
name: test

ship_defaults:
  docker_port: 4243

ships:
  vm1: { ip: 10.0.0.5 }
  vm2: { ip: 10.0.0.6, docker_port: 2375 }

registries:
  quay.io:
    registry: https://quay.io
    username: acme
    password: hunter2

services:
  redis:
    image: redis:7
    instances:
      redis-1:
        ship: vm1
        ports: { redis: 6379 }
  web:
    image: acme/web
    requires: [ redis ]
    env: { FOO: bar }
    instances:
      web-1:
        ship: vm2
        ports: { http: '80:8080' }
        env: { FOO: baz }
";

    #[test]
    fn sample_environment_loads() {
        let env = load_str(SAMPLE).unwrap();
        assert_eq!(env.name, "test");
        assert_eq!(env.schema, 2);
        assert_eq!(env.ships["vm1"].docker_port, 4243);
        assert_eq!(env.ships["vm2"].docker_port, 2375);
        assert_eq!(env.services["web"].requires, vec!["redis"]);

        let (service, instance) = env.instance("web-1").unwrap();
        assert_eq!(service.name, "web");
        assert_eq!(instance.ports["http"].external_port, 8080);
        assert_eq!(env.ship_of(instance).ip, "10.0.0.6");
    }

    #[test]
    fn schema_is_one_when_header_absent() {
        let env = load_str("name: test").unwrap();
        assert_eq!(env.schema, 1);
    }

    #[test]
    fn unsupported_schema_is_rejected() {
        let err = load_str("{__maestro: {schema: 9}, name: test}").unwrap_err();
        match err {
            ConfigError::SchemaVersion { found, max } => {
                assert_eq!(found, 9);
                assert_eq!(max, MAX_SCHEMA);
            }
            other => panic!("expected schema error, got {other}"),
        }
    }

    #[test]
    fn unknown_ship_reference_is_rejected() {
        let err = load_str(
            "{name: t, ships: {vm1: {ip: h}}, services: {a: {image: i, instances: {a-1: {ship: vm9}}}}}",
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown ship"));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let err =
            load_str("{name: t, services: {a: {image: i, requires: [ghost]}}}").unwrap_err();
        assert!(err.to_string().contains("unknown service"));
    }

    #[test]
    fn duplicate_instance_names_are_rejected() {
        let err = load_str(
            "{name: t, ships: {vm1: {ip: h}}, services: {\
             a: {image: i, instances: {dup: {ship: vm1}}},\
             b: {image: i, instances: {dup: {ship: vm1}}}}}",
        )
        .unwrap_err();
        assert!(err.to_string().contains("unique"));
    }

    #[test]
    fn yaml_anchors_are_supported() {
        let env = load_str(
            "name: t\n\
             ships:\n\
             \x20 vm1: &ship { ip: 10.0.0.1 }\n\
             \x20 vm2: *ship\n",
        )
        .unwrap();
        assert_eq!(env.ships["vm2"].ip, "10.0.0.1");
    }

    #[test]
    fn load_reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let env = load(file.path()).unwrap();
        assert_eq!(env.name, "test");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load("/nonexistent/maestro.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
