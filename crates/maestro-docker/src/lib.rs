//! # maestro-docker
//!
//! Remote container daemon interface for Maestro.
//!
//! This crate defines the narrow surface Maestro consumes from a remote
//! Docker-compatible daemon ([`ContainerDaemon`]) and provides a concrete
//! HTTP client for it, reachable over plain TCP, TLS, a Unix socket, or an
//! SSH-forwarded local port. It also owns registry credential matching and
//! the container-create parameter set derived from an instance.
//!
//! The orchestration engine only ever talks to the trait, which keeps the
//! daemon mockable in tests.

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod client;
pub mod daemon;
pub mod endpoint;
pub mod error;
pub mod spec;
pub mod tunnel;
pub mod types;

pub use auth::registry_for_image;
pub use client::{demux_log_stream, DockerClient, DockerConnector};
pub use daemon::{ContainerDaemon, ContainerDetails, ContainerStatus, DaemonConnector};
pub use endpoint::DaemonEndpoint;
pub use error::{DaemonError, Result};
pub use spec::CreateSpec;

/// An image reference split into repository and tag.
///
/// The repository may carry a registry prefix (`quay.io/acme/app`); the
/// tag defaults to `latest`. A colon inside the last path component is a
/// tag separator, a colon in the first component is a registry port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageName {
    /// Repository, including any registry prefix.
    pub repository: String,
    /// Tag, `latest` when unspecified.
    pub tag: String,
}

impl ImageName {
    /// Parses a `[registry-host/]repo[:tag]` image reference.
    #[must_use]
    pub fn parse(image: &str) -> Self {
        match image.rsplit_once(':') {
            Some((repository, tag)) if !tag.contains('/') => {
                Self { repository: repository.to_string(), tag: tag.to_string() }
            }
            _ => Self { repository: image.to_string(), tag: "latest".to_string() },
        }
    }

    /// The registry host prefix, when the repository carries one.
    #[must_use]
    pub fn registry_host(&self) -> Option<&str> {
        self.repository.split_once('/').map(|(host, _)| host)
    }

    /// The full `repo:tag` reference.
    #[must_use]
    pub fn reference(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }
}

impl std::fmt::Display for ImageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}
