//! Lifecycle check configuration.
//!
//! Lifecycle checks gate state transitions: all checks declared under a
//! target state must pass before the transition is considered complete.
//! The checks themselves are executed by the probe subsystem; this module
//! only models their configuration.

use indexmap::IndexMap;
use serde::Deserialize;
use std::fmt;

use crate::error::{ConfigError, Result};

/// Default deadline, in seconds, for TCP and HTTP checks.
pub const DEFAULT_MAX_WAIT: u64 = 300;

/// Default attempt count for exec checks.
pub const DEFAULT_EXEC_ATTEMPTS: u32 = 180;

/// Default delay, in seconds, between exec attempts.
pub const DEFAULT_EXEC_DELAY: u64 = 1;

/// Container state a group of checks is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckState {
    /// Checks that must pass after a start.
    Running,
    /// Checks that must pass after a stop.
    Stopped,
}

impl CheckState {
    fn parse(path: &str, s: &str) -> Result<Self> {
        match s {
            "running" => Ok(Self::Running),
            "stopped" => Ok(Self::Stopped),
            other => Err(ConfigError::invalid(
                path,
                format!("invalid lifecycle state {other:?}, expected running or stopped"),
            )),
        }
    }
}

impl fmt::Display for CheckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Reference to a port in an HTTP check: a named port or a raw number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortRef {
    /// Named port of the instance.
    Named(String),
    /// Literal port number.
    Number(u16),
}

/// TCP connect check against a named port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpCheck {
    /// Named port of the instance to connect to.
    pub port: String,
    /// Deadline in seconds.
    pub max_wait: u64,
}

/// HTTP request check.
#[derive(Debug, Clone)]
pub struct HttpCheck {
    /// Port to request against.
    pub port: PortRef,
    /// Host override; defaults to the instance's ship IP.
    pub host: Option<String>,
    /// URL scheme, `http` by default.
    pub scheme: String,
    /// Request method, `GET` by default.
    pub method: String,
    /// Request path, `/` by default.
    pub path: String,
    /// When set, success requires the response body to match; otherwise any
    /// 2xx status passes.
    pub match_regex: Option<String>,
    /// Deadline in seconds.
    pub max_wait: u64,
    /// Whether to verify TLS certificates on https checks.
    pub verify: bool,
}

/// External command check.
///
/// The command string is interpreted by `sh -c` with the instance's
/// composed environment layered over the orchestrator's own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecCheck {
    /// Shell command to run.
    pub command: String,
    /// Number of attempts before giving up.
    pub attempts: u32,
    /// Delay, in seconds, between attempts.
    pub delay: u64,
}

/// A single lifecycle check.
#[derive(Debug, Clone)]
pub enum LifecycleCheck {
    /// TCP connect check.
    Tcp(TcpCheck),
    /// HTTP request check.
    Http(HttpCheck),
    /// External command check.
    Exec(ExecCheck),
}

impl LifecycleCheck {
    /// Short identifying tag used in failure reports, e.g. `tcp(client)`.
    #[must_use]
    pub fn tag(&self) -> String {
        match self {
            Self::Tcp(c) => format!("tcp({})", c.port),
            Self::Http(c) => match &c.port {
                PortRef::Named(name) => format!("http({name})"),
                PortRef::Number(n) => format!("http({n})"),
            },
            Self::Exec(_) => "exec".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub(crate) enum RawLifecycleCheck {
    Tcp {
        port: String,
        max_wait: Option<u64>,
    },
    Http {
        port: RawPortRef,
        host: Option<String>,
        scheme: Option<String>,
        method: Option<String>,
        path: Option<String>,
        match_regex: Option<String>,
        max_wait: Option<u64>,
        #[serde(default)]
        extra_options: RawHttpOptions,
    },
    Exec {
        command: String,
        attempts: Option<u32>,
        delay: Option<u64>,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawPortRef {
    Number(u16),
    Named(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawHttpOptions {
    verify: Option<bool>,
}

fn parse_check(path: &str, raw: &RawLifecycleCheck) -> Result<LifecycleCheck> {
    match raw {
        RawLifecycleCheck::Tcp { port, max_wait } => Ok(LifecycleCheck::Tcp(TcpCheck {
            port: port.clone(),
            max_wait: max_wait.unwrap_or(DEFAULT_MAX_WAIT),
        })),
        RawLifecycleCheck::Http {
            port,
            host,
            scheme,
            method,
            path: url_path,
            match_regex,
            max_wait,
            extra_options,
        } => {
            if let Some(pattern) = match_regex {
                regex::Regex::new(pattern).map_err(|e| {
                    ConfigError::invalid(path, format!("bad match_regex {pattern:?}: {e}"))
                })?;
            }
            let url_path = url_path.clone().unwrap_or_else(|| "/".to_string());
            let url_path =
                if url_path.starts_with('/') { url_path } else { format!("/{url_path}") };
            Ok(LifecycleCheck::Http(HttpCheck {
                port: match port {
                    RawPortRef::Number(n) => PortRef::Number(*n),
                    RawPortRef::Named(name) => PortRef::Named(name.clone()),
                },
                host: host.clone(),
                scheme: scheme.clone().unwrap_or_else(|| "http".to_string()),
                method: method.clone().unwrap_or_else(|| "GET".to_string()),
                path: url_path,
                match_regex: match_regex.clone(),
                max_wait: max_wait.unwrap_or(DEFAULT_MAX_WAIT),
                verify: extra_options.verify.unwrap_or(true),
            }))
        }
        RawLifecycleCheck::Exec { command, attempts, delay } => {
            Ok(LifecycleCheck::Exec(ExecCheck {
                command: command.clone(),
                attempts: attempts.unwrap_or(DEFAULT_EXEC_ATTEMPTS),
                delay: delay.unwrap_or(DEFAULT_EXEC_DELAY),
            }))
        }
    }
}

/// Parses a `lifecycle:` mapping of state name to check list.
pub(crate) fn parse_lifecycle(
    path: &str,
    raw: &IndexMap<String, Vec<RawLifecycleCheck>>,
) -> Result<IndexMap<CheckState, Vec<LifecycleCheck>>> {
    let mut out: IndexMap<CheckState, Vec<LifecycleCheck>> = IndexMap::new();
    for (state, checks) in raw {
        let state_path = format!("{path}.{state}");
        let state = CheckState::parse(&state_path, state)?;
        let parsed = checks
            .iter()
            .map(|c| parse_check(&state_path, c))
            .collect::<Result<Vec<_>>>()?;
        out.entry(state).or_default().extend(parsed);
    }
    Ok(out)
}
