//! Port mapping specifications.
//!
//! A named port maps an in-container (exposed) port to a host-side
//! (external) port, each carrying a protocol, plus the host address the
//! external side binds to. The YAML surface accepts several shorthand
//! forms which all normalize to the canonical [`PortSpec`] tuple.

use serde::Deserialize;
use std::fmt;

use crate::error::{ConfigError, Result};

/// Default bind address for external ports.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";

/// Transport protocol of a port mapping side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// TCP (the default).
    Tcp,
    /// UDP.
    Udp,
}

impl Protocol {
    fn parse(path: &str, s: &str) -> Result<Self> {
        match s {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            other => Err(ConfigError::invalid(
                path,
                format!("invalid protocol {other:?}, expected tcp or udp"),
            )),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
        }
    }
}

/// Canonical form of a named port mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    /// Symbolic name of the port.
    pub name: String,
    /// Port the application listens on inside the container.
    pub exposed_port: u16,
    /// Protocol of the exposed side.
    pub exposed_proto: Protocol,
    /// Port published on the host.
    pub external_port: u16,
    /// Protocol of the external side.
    pub external_proto: Protocol,
    /// Host address the external port binds to.
    pub bind_addr: String,
}

impl PortSpec {
    /// Renders the mapping in the `exposed/proto:external/proto` long form.
    ///
    /// Parsing this string back yields an equal spec (the bind address is
    /// only expressible in the dictionary form and defaults to all
    /// interfaces).
    #[must_use]
    pub fn canonical(&self) -> String {
        format!(
            "{}/{}:{}/{}",
            self.exposed_port, self.exposed_proto, self.external_port, self.external_proto
        )
    }
}

/// Raw YAML shape of a single port specification.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawPortSpec {
    /// `client: 6379`
    Number(u16),
    /// `client: "6379/udp"` or `client: "6379:16379"`
    Text(String),
    /// `client: { exposed: 6379, external: [ "192.168.1.1", "16379" ] }`
    Full { exposed: RawPortSide, external: RawExternalSide },
}

/// One side of a port mapping: a number or a `port/proto` string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawPortSide {
    Number(u16),
    Text(String),
}

/// External side of a fully specified mapping, optionally with an address.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawExternalSide {
    Side(RawPortSide),
    Bound((String, RawPortSide)),
}

/// Parses one mapping side into `(port, protocol)`.
fn parse_side(path: &str, side: &RawPortSide) -> Result<(u16, Protocol)> {
    match side {
        RawPortSide::Number(n) => Ok((*n, Protocol::Tcp)),
        RawPortSide::Text(s) => parse_side_str(path, s),
    }
}

fn parse_side_str(path: &str, s: &str) -> Result<(u16, Protocol)> {
    let (port, proto) = match s.split_once('/') {
        Some((port, proto)) => (port, Protocol::parse(path, proto)?),
        None => (s, Protocol::Tcp),
    };
    let port = port.parse::<u16>().map_err(|_| {
        ConfigError::invalid(path, format!("invalid port number {port:?}"))
    })?;
    Ok((port, proto))
}

/// Normalizes a raw port specification into its canonical tuple.
pub(crate) fn parse_port_spec(path: &str, name: &str, raw: &RawPortSpec) -> Result<PortSpec> {
    let (exposed, external, bind_addr) = match raw {
        RawPortSpec::Number(n) => ((*n, Protocol::Tcp), (*n, Protocol::Tcp), None),
        RawPortSpec::Text(s) => match s.split_once(':') {
            None => {
                let side = parse_side_str(path, s)?;
                (side, side, None)
            }
            Some((exposed, external)) => {
                if external.contains(':') {
                    return Err(ConfigError::invalid(
                        path,
                        format!("invalid port specification {s:?}, expected \"exposed:external\""),
                    ));
                }
                (parse_side_str(path, exposed)?, parse_side_str(path, external)?, None)
            }
        },
        RawPortSpec::Full { exposed, external } => {
            let exposed = parse_side(path, exposed)?;
            let (external, addr) = match external {
                RawExternalSide::Side(side) => (parse_side(path, side)?, None),
                RawExternalSide::Bound((addr, side)) => {
                    (parse_side(path, side)?, Some(addr.clone()))
                }
            };
            (exposed, external, addr)
        }
    };

    if exposed.1 != external.1 {
        return Err(ConfigError::invalid(
            path,
            format!(
                "mismatched protocols between {}/{} and {}/{}",
                exposed.0, exposed.1, external.0, external.1
            ),
        ));
    }

    Ok(PortSpec {
        name: name.to_string(),
        exposed_port: exposed.0,
        exposed_proto: exposed.1,
        external_port: external.0,
        external_proto: external.1,
        bind_addr: bind_addr.unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
    })
}
