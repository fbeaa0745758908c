//! Registry credential lookup and encoding.

use base64::Engine;
use indexmap::IndexMap;
use maestro_model::Registry;
use serde::Serialize;

use crate::ImageName;

/// Finds the registry credentials to use for an image, if any.
///
/// Lookup is two-phase: the image's registry prefix is first matched
/// against entry names, then against the FQDN of each entry's URL (with
/// and without its port). Images without a registry prefix never match.
#[must_use]
pub fn registry_for_image<'a>(
    image: &ImageName,
    registries: &'a IndexMap<String, Registry>,
) -> Option<&'a Registry> {
    let host = image.registry_host()?;

    if let Some(registry) = registries.get(host) {
        return Some(registry);
    }
    registries.values().find(|registry| host == registry.fqdn() || host == registry.host())
}

#[derive(Serialize)]
struct AuthConfig<'a> {
    username: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
    serveraddress: &'a str,
}

/// Encodes credentials into the `X-Registry-Auth` header value.
#[must_use]
pub fn encode_auth_header(registry: &Registry) -> String {
    let config = AuthConfig {
        username: &registry.username,
        password: &registry.password,
        email: registry.email.as_deref(),
        serveraddress: registry.fqdn(),
    };
    // The auth config always serializes.
    let json = serde_json::to_vec(&config).unwrap_or_default();
    base64::engine::general_purpose::URL_SAFE.encode(json)
}
