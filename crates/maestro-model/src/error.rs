//! Error types for environment loading and validation.

use thiserror::Error;

/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while loading or validating an environment description.
///
/// All variants are fatal: no orchestration is attempted against a
/// configuration that failed to load.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The environment file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// Path of the file that failed to load.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The YAML document is malformed or does not match the expected shape.
    #[error("invalid environment file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The `__maestro.schema` version is newer than this build understands.
    #[error("unsupported schema version {found}, maximum supported is {max}")]
    SchemaVersion {
        /// Version declared in the file.
        found: u32,
        /// Maximum version this build supports.
        max: u32,
    },

    /// A value is structurally valid YAML but semantically wrong.
    #[error("{path}: {reason}")]
    Invalid {
        /// Dotted YAML path of the offending value.
        path: String,
        /// Human-readable description of the problem.
        reason: String,
    },

    /// A name refers to an entity that does not exist in the environment.
    #[error("{path}: unknown {kind} {name:?}")]
    MissingReference {
        /// Dotted YAML path of the offending reference.
        path: String,
        /// Kind of entity that was expected (ship, service, ...).
        kind: &'static str,
        /// The dangling name.
        name: String,
    },
}

impl ConfigError {
    /// Creates a new semantic validation error.
    pub fn invalid(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid { path: path.into(), reason: reason.into() }
    }

    /// Creates a new dangling-reference error.
    pub fn missing(path: impl Into<String>, kind: &'static str, name: impl Into<String>) -> Self {
        Self::MissingReference { path: path.into(), kind, name: name.into() }
    }
}
