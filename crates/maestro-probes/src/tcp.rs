//! TCP connect probe.

use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::error::{ProbeError, Result};

/// Attempt cadence shared by all polling probes.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Per-attempt connect timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Polls a TCP port until it accepts a connection.
#[derive(Debug)]
pub struct TcpProbe {
    tag: String,
    host: String,
    port: u16,
    max_wait: Duration,
}

impl TcpProbe {
    /// Creates a probe for `host:port` with a deadline of `max_wait` seconds.
    #[must_use]
    pub fn new(tag: String, host: &str, port: u16, max_wait: u64) -> Self {
        Self { tag, host: host.to_string(), port, max_wait: Duration::from_secs(max_wait) }
    }

    /// Identifying tag of the check.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Attempts to connect once per second until the deadline.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Timeout`] when no attempt succeeds in time.
    pub async fn run(&self) -> Result<()> {
        let deadline = Instant::now() + self.max_wait;
        loop {
            let attempt = TcpStream::connect((self.host.as_str(), self.port));
            if let Ok(Ok(_stream)) = tokio::time::timeout(CONNECT_TIMEOUT, attempt).await {
                return Ok(());
            }
            if Instant::now() + POLL_INTERVAL > deadline {
                return Err(ProbeError::Timeout { check: self.tag.clone() });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}
