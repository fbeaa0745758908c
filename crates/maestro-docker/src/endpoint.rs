//! Daemon endpoint resolution.

use maestro_model::{ConnectionMode, Ship, SshTunnelSettings, TlsSettings};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Where and how to reach a ship's daemon.
///
/// Derived from the ship's connection settings; exactly one variant is
/// active per ship.
#[derive(Debug, Clone)]
pub enum DaemonEndpoint {
    /// Plain HTTP over TCP.
    Http {
        /// Base URL, e.g. `http://10.0.0.5:2375`.
        base: String,
    },
    /// HTTPS over TCP with optional client certificates.
    Https {
        /// Base URL, e.g. `https://10.0.0.5:2376`.
        base: String,
        /// TLS material and verification policy.
        tls: TlsSettings,
    },
    /// HTTP over a local Unix socket.
    Unix {
        /// Socket path.
        path: PathBuf,
    },
    /// HTTP through an SSH-forwarded local port.
    SshTunnel {
        /// SSH settings (user, key, port).
        ssh: SshTunnelSettings,
        /// Host to establish the SSH connection to.
        host: String,
        /// Daemon port on the remote side of the tunnel.
        docker_port: u16,
        /// Time allowed for tunnel establishment.
        ssh_timeout: Duration,
    },
}

impl DaemonEndpoint {
    /// Resolves the endpoint for a ship.
    #[must_use]
    pub fn for_ship(ship: &Ship) -> Self {
        match &ship.connection {
            ConnectionMode::Tcp => Self::Http {
                base: format!("http://{}:{}", ship.endpoint, ship.docker_port),
            },
            ConnectionMode::Tls(tls) => Self::Https {
                base: format!("https://{}:{}", ship.endpoint, ship.docker_port),
                tls: tls.clone(),
            },
            ConnectionMode::UnixSocket(path) => Self::Unix { path: path.clone() },
            ConnectionMode::SshTunnel(ssh) => Self::SshTunnel {
                ssh: ssh.clone(),
                host: ship.endpoint.clone(),
                docker_port: ship.docker_port,
                ssh_timeout: ship.ssh_timeout,
            },
        }
    }
}

impl fmt::Display for DaemonEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http { base } | Self::Https { base, .. } => write!(f, "{base}"),
            Self::Unix { path } => write!(f, "unix://{}", path.display()),
            Self::SshTunnel { ssh, host, docker_port, .. } => {
                write!(f, "ssh://{}@{}:{} -> {}", ssh.user, host, ssh.port, docker_port)
            }
        }
    }
}
