//! Volume binding specifications.

use serde::Deserialize;
use std::fmt;

use crate::error::{ConfigError, Result};

/// Mount mode of a volume binding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VolumeMode {
    /// Read-only bind.
    ReadOnly,
    /// Read-write bind (the default).
    #[default]
    ReadWrite,
}

impl fmt::Display for VolumeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "ro"),
            Self::ReadWrite => write!(f, "rw"),
        }
    }
}

/// A host path bind-mounted into the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeBinding {
    /// Path on the ship.
    pub host_path: String,
    /// Path inside the container.
    pub target: String,
    /// Mount mode.
    pub mode: VolumeMode,
}

/// Raw YAML shape of a volume value.
///
/// The short form `"/host: /container"` is equivalent to the long form
/// `{ target: /container, mode: rw }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawVolumeSpec {
    Target(String),
    Full { target: String, mode: Option<String> },
}

pub(crate) fn parse_volume(path: &str, host_path: &str, raw: &RawVolumeSpec) -> Result<VolumeBinding> {
    let (target, mode) = match raw {
        RawVolumeSpec::Target(target) => (target.clone(), VolumeMode::ReadWrite),
        RawVolumeSpec::Full { target, mode } => {
            let mode = match mode.as_deref() {
                None | Some("rw") => VolumeMode::ReadWrite,
                Some("ro") => VolumeMode::ReadOnly,
                Some(other) => {
                    return Err(ConfigError::invalid(
                        path,
                        format!("invalid volume mode {other:?}, expected ro or rw"),
                    ));
                }
            };
            (target.clone(), mode)
        }
    };
    Ok(VolumeBinding { host_path: host_path.to_string(), target, mode })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_form_is_read_write() {
        let v = parse_volume("volumes", "/out", &RawVolumeSpec::Target("/in".into())).unwrap();
        assert_eq!(v.target, "/in");
        assert_eq!(v.mode, VolumeMode::ReadWrite);
    }

    #[test]
    fn short_and_long_forms_are_equivalent() {
        let short = parse_volume("volumes", "/out", &RawVolumeSpec::Target("/in".into())).unwrap();
        let long = parse_volume(
            "volumes",
            "/out",
            &RawVolumeSpec::Full { target: "/in".into(), mode: Some("rw".into()) },
        )
        .unwrap();
        assert_eq!(short, long);
    }

    #[test]
    fn read_only_mode() {
        let v = parse_volume(
            "volumes",
            "/out",
            &RawVolumeSpec::Full { target: "/in".into(), mode: Some("ro".into()) },
        )
        .unwrap();
        assert_eq!(v.mode, VolumeMode::ReadOnly);
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let err = parse_volume(
            "volumes",
            "/out",
            &RawVolumeSpec::Full { target: "/in".into(), mode: Some("rx".into()) },
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid volume mode"));
    }
}
