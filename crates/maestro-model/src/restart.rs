//! Container restart policies.

use serde::Deserialize;
use std::fmt;

use crate::error::{ConfigError, Result};

/// Restart policy name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RestartPolicyKind {
    /// Never restart (the default).
    #[default]
    No,
    /// Always restart.
    Always,
    /// Restart on non-zero exit.
    OnFailure,
    /// Restart unless explicitly stopped.
    UnlessStopped,
}

impl RestartPolicyKind {
    fn parse(path: &str, s: &str) -> Result<Self> {
        match s {
            "no" => Ok(Self::No),
            "always" => Ok(Self::Always),
            "on-failure" => Ok(Self::OnFailure),
            "unless-stopped" => Ok(Self::UnlessStopped),
            other => Err(ConfigError::invalid(
                path,
                format!("invalid restart policy {other:?}"),
            )),
        }
    }
}

impl fmt::Display for RestartPolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::No => write!(f, "no"),
            Self::Always => write!(f, "always"),
            Self::OnFailure => write!(f, "on-failure"),
            Self::UnlessStopped => write!(f, "unless-stopped"),
        }
    }
}

/// Restart policy of an instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Policy name.
    pub name: RestartPolicyKind,
    /// Retry bound for `on-failure`.
    pub maximum_retry_count: u32,
}

/// Raw YAML shape of a restart policy.
///
/// The short form `"name[:N]"` is equivalent to
/// `{ name: name, maximum_retry_count: N }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawRestart {
    Short(String),
    Full { name: String, maximum_retry_count: Option<u32> },
}

pub(crate) fn parse_restart(path: &str, raw: &RawRestart) -> Result<RestartPolicy> {
    match raw {
        RawRestart::Short(s) => {
            let (name, retries) = match s.split_once(':') {
                None => (s.as_str(), 0),
                Some((name, retries)) => {
                    let retries = retries.parse::<u32>().map_err(|_| {
                        ConfigError::invalid(path, format!("invalid retry count {retries:?}"))
                    })?;
                    (name, retries)
                }
            };
            Ok(RestartPolicy {
                name: RestartPolicyKind::parse(path, name)?,
                maximum_retry_count: retries,
            })
        }
        RawRestart::Full { name, maximum_retry_count } => Ok(RestartPolicy {
            name: RestartPolicyKind::parse(path, name)?,
            maximum_retry_count: maximum_retry_count.unwrap_or(0),
        }),
    }
}
