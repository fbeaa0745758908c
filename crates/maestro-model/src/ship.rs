//! Ships: hosts that run a container daemon.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Default port the container daemon listens on.
pub const DEFAULT_DOCKER_PORT: u16 = 2375;

/// Default timeout for daemon operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for establishing SSH tunnels.
pub const DEFAULT_SSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Default SSH port.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// SSH tunnel settings for reaching a daemon through a jump connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTunnelSettings {
    /// SSH user.
    pub user: String,
    /// Path to the SSH identity file.
    pub key: PathBuf,
    /// SSH port on the ship.
    pub port: u16,
}

/// TLS settings for a TLS-secured daemon endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsSettings {
    /// Whether to verify the daemon's certificate.
    pub verify: bool,
    /// CA certificate path.
    pub ca_cert: Option<PathBuf>,
    /// Client certificate path.
    pub cert: Option<PathBuf>,
    /// Client key path.
    pub key: Option<PathBuf>,
}

/// How to reach the daemon on a ship. Modes are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Plain HTTP over TCP.
    Tcp,
    /// HTTPS over TCP.
    Tls(TlsSettings),
    /// Plain HTTP through an SSH-forwarded local port.
    SshTunnel(SshTunnelSettings),
    /// HTTP over a local Unix socket.
    UnixSocket(PathBuf),
}

/// A host machine running a container daemon.
///
/// Ships are created at configuration load and immutable afterwards.
#[derive(Debug, Clone)]
pub struct Ship {
    /// Ship name (local to the environment, not necessarily a DNS name).
    pub name: String,
    /// Address reachable from other containers' hosts; injected into
    /// container environments as the host address.
    pub ip: String,
    /// Address used for the daemon connection; defaults to `ip`.
    pub endpoint: String,
    /// Daemon TCP port.
    pub docker_port: u16,
    /// Daemon API version to pin, when set.
    pub api_version: Option<String>,
    /// Timeout applied to daemon operations.
    pub timeout: Duration,
    /// Timeout for establishing the SSH tunnel.
    pub ssh_timeout: Duration,
    /// Active connection mode.
    pub connection: ConnectionMode,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawShip {
    pub ip: Option<String>,
    pub endpoint: Option<String>,
    pub docker_port: Option<u16>,
    pub api_version: Option<String>,
    pub timeout: Option<u64>,
    pub ssh_timeout: Option<u64>,
    pub ssh_tunnel: Option<RawSshTunnel>,
    pub socket_path: Option<String>,
    pub tls: Option<bool>,
    pub tls_verify: Option<bool>,
    pub tls_ca_cert: Option<String>,
    pub tls_key: Option<String>,
    pub tls_cert: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawSshTunnel {
    pub user: Option<String>,
    pub key: Option<String>,
    pub port: Option<u16>,
}

impl RawShip {
    /// Fills unset keys from the environment-wide ship defaults. An explicit
    /// ship value always wins.
    pub(crate) fn apply_defaults(&mut self, defaults: &Self) {
        macro_rules! inherit {
            ($($field:ident),*) => {
                $(if self.$field.is_none() {
                    self.$field = defaults.$field.clone();
                })*
            };
        }
        inherit!(
            ip, endpoint, docker_port, api_version, timeout, ssh_timeout, ssh_tunnel,
            socket_path, tls, tls_verify, tls_ca_cert, tls_key, tls_cert
        );
    }

    fn wants_tls(&self) -> bool {
        self.tls.unwrap_or(false)
            || self.tls_verify.unwrap_or(false)
            || self.tls_ca_cert.is_some()
            || self.tls_cert.is_some()
            || self.tls_key.is_some()
    }

    pub(crate) fn build(self, name: &str) -> Result<Ship> {
        let path = format!("ships.{name}");
        let ip = self
            .ip
            .clone()
            .ok_or_else(|| ConfigError::invalid(&path, "missing required key ip"))?;

        let mut modes = Vec::new();
        if self.socket_path.is_some() {
            modes.push("socket_path");
        }
        if self.ssh_tunnel.is_some() {
            modes.push("ssh_tunnel");
        }
        if self.wants_tls() {
            modes.push("tls");
        }
        if modes.len() > 1 {
            return Err(ConfigError::invalid(
                &path,
                format!("conflicting connection modes: {}", modes.join(", ")),
            ));
        }

        let connection = if let Some(socket) = &self.socket_path {
            ConnectionMode::UnixSocket(PathBuf::from(socket))
        } else if let Some(tunnel) = &self.ssh_tunnel {
            let user = tunnel.user.clone().ok_or_else(|| {
                ConfigError::invalid(&path, "missing SSH user for tunnel configuration")
            })?;
            let key = tunnel.key.clone().ok_or_else(|| {
                ConfigError::invalid(&path, "missing SSH key for tunnel configuration")
            })?;
            ConnectionMode::SshTunnel(SshTunnelSettings {
                user,
                key: PathBuf::from(key),
                port: tunnel.port.unwrap_or(DEFAULT_SSH_PORT),
            })
        } else if self.wants_tls() {
            ConnectionMode::Tls(TlsSettings {
                verify: self.tls_verify.unwrap_or(false),
                ca_cert: self.tls_ca_cert.as_ref().map(PathBuf::from),
                cert: self.tls_cert.as_ref().map(PathBuf::from),
                key: self.tls_key.as_ref().map(PathBuf::from),
            })
        } else {
            ConnectionMode::Tcp
        };

        Ok(Ship {
            name: name.to_string(),
            endpoint: self.endpoint.unwrap_or_else(|| ip.clone()),
            ip,
            docker_port: self.docker_port.unwrap_or(DEFAULT_DOCKER_PORT),
            api_version: self.api_version,
            timeout: self.timeout.map_or(DEFAULT_TIMEOUT, Duration::from_secs),
            ssh_timeout: self.ssh_timeout.map_or(DEFAULT_SSH_TIMEOUT, Duration::from_secs),
            connection,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(yaml: &str) -> RawShip {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn minimal_ship_defaults() {
        let ship = raw("ip: 10.0.0.1").build("vm1").unwrap();
        assert_eq!(ship.ip, "10.0.0.1");
        assert_eq!(ship.endpoint, "10.0.0.1");
        assert_eq!(ship.docker_port, DEFAULT_DOCKER_PORT);
        assert_eq!(ship.connection, ConnectionMode::Tcp);
        assert_eq!(ship.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn endpoint_overrides_ip_for_connection() {
        let ship = raw("{ip: 10.0.0.1, endpoint: 192.168.10.1}").build("vm1").unwrap();
        assert_eq!(ship.ip, "10.0.0.1");
        assert_eq!(ship.endpoint, "192.168.10.1");
    }

    #[test]
    fn missing_ip_is_rejected() {
        let err = raw("docker_port: 1234").build("vm1").unwrap_err();
        assert!(err.to_string().contains("ip"));
    }

    #[test]
    fn defaults_fill_unset_keys_only() {
        let defaults = raw("{docker_port: 4243, timeout: 30}");
        let mut ship = raw("{ip: 10.0.0.1, timeout: 7}");
        ship.apply_defaults(&defaults);
        let ship = ship.build("vm1").unwrap();
        assert_eq!(ship.docker_port, 4243);
        assert_eq!(ship.timeout, Duration::from_secs(7));
    }

    #[test]
    fn ssh_tunnel_requires_user_and_key() {
        let err = raw("{ip: h, ssh_tunnel: {user: deploy}}").build("vm1").unwrap_err();
        assert!(err.to_string().contains("SSH key"));

        let ship = raw("{ip: h, ssh_tunnel: {user: deploy, key: /id_rsa}}").build("vm1").unwrap();
        match ship.connection {
            ConnectionMode::SshTunnel(tunnel) => {
                assert_eq!(tunnel.user, "deploy");
                assert_eq!(tunnel.port, DEFAULT_SSH_PORT);
            }
            other => panic!("expected ssh tunnel, got {other:?}"),
        }
    }

    #[test]
    fn connection_modes_are_mutually_exclusive() {
        let err = raw("{ip: h, socket_path: /var/run/docker.sock, tls: true}")
            .build("vm1")
            .unwrap_err();
        assert!(err.to_string().contains("conflicting connection modes"));
    }

    #[test]
    fn tls_settings_collected() {
        let ship = raw("{ip: h, tls_verify: true, tls_ca_cert: /ca.pem, tls_cert: /c.pem, tls_key: /k.pem}")
            .build("vm1")
            .unwrap();
        match ship.connection {
            ConnectionMode::Tls(tls) => {
                assert!(tls.verify);
                assert_eq!(tls.ca_cert, Some(PathBuf::from("/ca.pem")));
            }
            other => panic!("expected tls, got {other:?}"),
        }
    }
}
