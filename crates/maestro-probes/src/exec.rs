//! Shell command probe.

use indexmap::IndexMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::error::{ProbeError, Result};

/// Runs a shell command until it exits zero.
///
/// The command string is interpreted by `sh -c`, so the usual shell
/// quoting rules (and risks) apply. The child inherits the orchestrator's
/// working directory and environment, with the instance's composed
/// environment layered on top. Children are killed when a run is dropped.
#[derive(Debug)]
pub struct ExecProbe {
    tag: String,
    command: String,
    env: Vec<(String, String)>,
    attempts: u32,
    delay: Duration,
}

impl ExecProbe {
    /// Creates a probe for `command` with bounded retries.
    #[must_use]
    pub fn new(
        tag: String,
        command: &str,
        env: &IndexMap<String, String>,
        attempts: u32,
        delay: u64,
    ) -> Self {
        Self {
            tag,
            command: command.to_string(),
            env: env.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            attempts,
            delay: Duration::from_secs(delay),
        }
    }

    /// Identifying tag of the check.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Runs the command up to `attempts` times.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Failed`] when the command cannot be spawned
    /// and [`ProbeError::Timeout`] when every attempt exits non-zero.
    pub async fn run(&self) -> Result<()> {
        for attempt in 1..=self.attempts.max(1) {
            let status = Command::new("sh")
                .arg("-c")
                .arg(&self.command)
                .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .status()
                .await
                .map_err(|e| ProbeError::Failed {
                    check: self.tag.clone(),
                    reason: format!("cannot run command: {e}"),
                })?;

            if status.success() {
                return Ok(());
            }
            if attempt < self.attempts {
                tokio::time::sleep(self.delay).await;
            }
        }
        Err(ProbeError::Timeout { check: self.tag.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    #[tokio::test]
    async fn zero_exit_passes() {
        let probe = ExecProbe::new("exec".into(), "true", &env(&[]), 3, 0);
        probe.run().await.unwrap();
    }

    #[tokio::test]
    async fn nonzero_exit_exhausts_attempts() {
        let probe = ExecProbe::new("exec".into(), "false", &env(&[]), 2, 0);
        let err = probe.run().await.unwrap_err();
        assert!(matches!(err, ProbeError::Timeout { .. }));
    }

    #[tokio::test]
    async fn composed_environment_reaches_the_command() {
        let probe = ExecProbe::new(
            "exec".into(),
            "test \"$REDIS_REDIS_1_HOST\" = 10.0.0.5",
            &env(&[("REDIS_REDIS_1_HOST", "10.0.0.5")]),
            1,
            0,
        );
        probe.run().await.unwrap();
    }

    #[tokio::test]
    async fn shell_interpretation_applies() {
        let probe = ExecProbe::new("exec".into(), "test 1 -eq 1 && true", &env(&[]), 1, 0);
        probe.run().await.unwrap();
    }
}
