//! Environment composition.
//!
//! Builds the deterministic environment-variable map injected into each
//! container. The variable names are a public contract consumed by
//! in-container helpers; see the discovery variables below.

use indexmap::IndexMap;
use maestro_docker::ImageName;
use maestro_model::{env_var_name, Instance, Service};

use crate::graph::ResolvedEnv;

/// Computes the full environment for one container.
///
/// Insertion order, which the daemon preserves:
///
/// 1. Base variables: `MAESTRO_ENVIRONMENT_NAME`, `DOCKER_IMAGE`,
///    `DOCKER_TAG`, `SERVICE_NAME`, `CONTAINER_NAME`,
///    `CONTAINER_HOST_ADDRESS`.
/// 2. Discovery variables for every service `T` in
///    `requires ∪ wants_info ∪ {self}` and every instance `J` of `T`:
///    `<T>_<J>_HOST`, plus `<T>_<J>_<P>_PORT` and
///    `<T>_<J>_<P>_INTERNAL_PORT` for each named port `P`, and
///    `<T>_INSTANCES` listing `T`'s instances.
/// 3. User environment: service-level values overridden key by key by
///    instance-level values. User values win over computed ones.
#[must_use]
pub fn compose(
    renv: &ResolvedEnv,
    service: &Service,
    instance: &Instance,
) -> IndexMap<String, String> {
    let env = renv.environment();
    let mut vars = IndexMap::new();

    let image = ImageName::parse(service.image_for(instance));
    vars.insert("MAESTRO_ENVIRONMENT_NAME".to_string(), env.name.clone());
    vars.insert("DOCKER_IMAGE".to_string(), image.repository);
    vars.insert("DOCKER_TAG".to_string(), image.tag);
    vars.insert("SERVICE_NAME".to_string(), service.name.clone());
    vars.insert("CONTAINER_NAME".to_string(), instance.name.clone());
    vars.insert("CONTAINER_HOST_ADDRESS".to_string(), env.ship_of(instance).ip.clone());

    // Self-inclusion lets instances of one service find their peers.
    let mut targets: Vec<&str> =
        renv.visible_services(&service.name).iter().map(String::as_str).collect();
    targets.push(&service.name);
    targets.sort_unstable();

    for target in targets {
        let Some(target_service) = env.service(target) else { continue };
        let prefix = env_var_name(target);

        for name in target_service.sorted_instance_names() {
            let peer = &target_service.instances[name];
            let peer_prefix = format!("{prefix}_{}", env_var_name(name));
            vars.insert(
                format!("{peer_prefix}_HOST"),
                env.ship_of(peer).ip.clone(),
            );
            for (port_name, port) in &peer.ports {
                let port_var = env_var_name(port_name);
                vars.insert(
                    format!("{peer_prefix}_{port_var}_PORT"),
                    port.external_port.to_string(),
                );
                vars.insert(
                    format!("{peer_prefix}_{port_var}_INTERNAL_PORT"),
                    port.exposed_port.to_string(),
                );
            }
        }
        vars.insert(
            format!("{prefix}_INSTANCES"),
            target_service.sorted_instance_names().join(","),
        );
    }

    for (key, value) in service.env.iter().chain(&instance.env) {
        vars.insert(key.clone(), value.clone());
    }

    vars
}
