//! Private image registry credentials.

use serde::Deserialize;

/// Authentication data for a private image registry.
///
/// Registries are matched against an image's registry prefix in two
/// phases: first by exact entry name, then by the FQDN of the entry URL.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Registry {
    /// Registry URL, e.g. `https://quay.io`.
    #[serde(rename = "registry")]
    pub url: String,
    /// Username for the registry.
    pub username: String,
    /// Password or token.
    pub password: String,
    /// Account email, required by some older registries.
    #[serde(default)]
    pub email: Option<String>,
}

impl Registry {
    /// Returns the authority (host, with optional port) of the registry URL.
    #[must_use]
    pub fn fqdn(&self) -> &str {
        let rest = match self.url.split_once("://") {
            Some((_, rest)) => rest,
            None => &self.url,
        };
        rest.split('/').next().unwrap_or(rest)
    }

    /// Returns the registry host without any port suffix.
    #[must_use]
    pub fn host(&self) -> &str {
        self.fqdn().split(':').next().unwrap_or_else(|| self.fqdn())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(url: &str) -> Registry {
        Registry {
            url: url.to_string(),
            username: "user".to_string(),
            password: "pass".to_string(),
            email: None,
        }
    }

    #[test]
    fn fqdn_strips_scheme_and_path() {
        assert_eq!(registry("https://quay.io/v1/").fqdn(), "quay.io");
        assert_eq!(registry("quay.io").fqdn(), "quay.io");
    }

    #[test]
    fn host_strips_port() {
        assert_eq!(registry("https://registry.acme.dev:8081/v2").fqdn(), "registry.acme.dev:8081");
        assert_eq!(registry("https://registry.acme.dev:8081/v2").host(), "registry.acme.dev");
    }
}
