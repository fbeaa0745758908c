//! Services: named groups of container instances built from one image.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_yaml::Value;

use crate::error::Result;
use crate::instance::{self, Instance, RawInstance};
use crate::lifecycle::{self, CheckState, LifecycleCheck, RawLifecycleCheck};

/// A named service of the environment.
#[derive(Debug, Clone)]
pub struct Service {
    /// Service name.
    pub name: String,
    /// Image reference, `repo[:tag]` with an optional registry prefix.
    pub image: String,
    /// Base environment shared by all instances.
    pub env: IndexMap<String, String>,
    /// Excluded from "all" target expansions when set.
    pub omit: bool,
    /// Hard dependencies: these services must be running first.
    pub requires: Vec<String>,
    /// Informational dependencies: environment injection only, no ordering.
    pub wants_info: Vec<String>,
    /// Service-level lifecycle checks, applied to every instance.
    pub lifecycle: IndexMap<CheckState, Vec<LifecycleCheck>>,
    /// Instances keyed by name.
    pub instances: IndexMap<String, Instance>,
}

impl Service {
    /// Returns the image used by the given instance, honoring overrides.
    #[must_use]
    pub fn image_for<'a>(&'a self, instance: &'a Instance) -> &'a str {
        instance.image.as_deref().unwrap_or(&self.image)
    }

    /// Instance names sorted lexicographically.
    #[must_use]
    pub fn sorted_instance_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.instances.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Lifecycle checks for a state: service-level first, then the
    /// instance's own.
    #[must_use]
    pub fn checks_for<'a>(
        &'a self,
        instance: &'a Instance,
        state: CheckState,
    ) -> Vec<&'a LifecycleCheck> {
        self.lifecycle
            .get(&state)
            .into_iter()
            .flatten()
            .chain(instance.lifecycle.get(&state).into_iter().flatten())
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawService {
    pub image: String,
    #[serde(default)]
    pub env: IndexMap<String, Value>,
    #[serde(default)]
    pub omit: bool,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub wants_info: Vec<String>,
    #[serde(default)]
    pub lifecycle: IndexMap<String, Vec<RawLifecycleCheck>>,
    #[serde(default)]
    pub instances: IndexMap<String, RawInstance>,
}

impl RawService {
    pub(crate) fn build(self, name: &str, schema: u32) -> Result<Service> {
        let path = format!("services.{name}");
        let instances = self
            .instances
            .into_iter()
            .map(|(instance_name, raw)| {
                let instance_path = format!("{path}.instances.{instance_name}");
                Ok((instance_name.clone(), raw.build(&instance_path, &instance_name, schema)?))
            })
            .collect::<Result<IndexMap<_, _>>>()?;

        Ok(Service {
            name: name.to_string(),
            image: self.image,
            env: instance::parse_env_map(&format!("{path}.env"), &self.env)?,
            omit: self.omit,
            requires: self.requires,
            wants_info: self.wants_info,
            lifecycle: lifecycle::parse_lifecycle(&format!("{path}.lifecycle"), &self.lifecycle)?,
            instances,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(yaml: &str) -> Service {
        let raw: RawService = serde_yaml::from_str(yaml).unwrap();
        raw.build("foo", 2).unwrap()
    }

    #[test]
    fn instance_image_override_wins() {
        let service = build(
            "{image: 'redis:7', instances: {a: {ship: vm1}, b: {ship: vm1, image: 'redis:6'}}}",
        );
        assert_eq!(service.image_for(&service.instances["a"]), "redis:7");
        assert_eq!(service.image_for(&service.instances["b"]), "redis:6");
    }

    #[test]
    fn checks_concatenate_service_then_instance() {
        let service = build(
            "image: web\n\
             lifecycle: {running: [{type: tcp, port: http}]}\n\
             instances:\n\
             \x20 w1:\n\
             \x20   ship: vm1\n\
             \x20   lifecycle: {running: [{type: exec, command: ok.sh}]}\n",
        );
        let checks = service.checks_for(&service.instances["w1"], CheckState::Running);
        let tags: Vec<String> = checks.iter().map(|c| c.tag()).collect();
        assert_eq!(tags, vec!["tcp(http)", "exec"]);
    }

    #[test]
    fn sorted_instance_names_are_deterministic() {
        let service = build("{image: i, instances: {b: {ship: s}, a: {ship: s}}}");
        assert_eq!(service.sorted_instance_names(), vec!["a", "b"]);
    }
}
