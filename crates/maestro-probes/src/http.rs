//! HTTP request probe.

use regex::Regex;
use reqwest::Method;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{ProbeError, Result};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Per-attempt request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Polls an HTTP endpoint until it answers successfully.
///
/// Success is a 2xx status, or a body matching `match_regex` when one is
/// configured.
#[derive(Debug)]
pub struct HttpProbe {
    tag: String,
    url: String,
    method: Method,
    match_regex: Option<Regex>,
    max_wait: Duration,
    client: reqwest::Client,
}

impl HttpProbe {
    /// Creates a probe for `url` with a deadline of `max_wait` seconds.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Failed`] when the method, regex, or client
    /// configuration is invalid.
    pub fn new(
        tag: String,
        url: String,
        method: &str,
        match_regex: Option<&str>,
        max_wait: u64,
        verify: bool,
    ) -> Result<Self> {
        let failed = |reason: String| ProbeError::Failed { check: tag.clone(), reason };

        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| failed(format!("invalid HTTP method {method:?}")))?;
        let match_regex = match_regex
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| failed(format!("bad match_regex: {e}")))
            })
            .transpose()?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(!verify)
            .build()
            .map_err(|e| failed(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            tag,
            url,
            method,
            match_regex,
            max_wait: Duration::from_secs(max_wait),
            client,
        })
    }

    /// Identifying tag of the check.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Issues the request once per second until the deadline.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Timeout`] when no attempt succeeds in time.
    pub async fn run(&self) -> Result<()> {
        let deadline = Instant::now() + self.max_wait;
        loop {
            if self.attempt().await {
                return Ok(());
            }
            if Instant::now() + POLL_INTERVAL > deadline {
                return Err(ProbeError::Timeout { check: self.tag.clone() });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn attempt(&self) -> bool {
        let response = match self.client.request(self.method.clone(), &self.url).send().await {
            Ok(response) => response,
            Err(_) => return false,
        };

        match &self.match_regex {
            Some(regex) => match response.text().await {
                Ok(body) => regex.is_match(&body),
                Err(_) => false,
            },
            None => response.status().is_success(),
        }
    }
}
