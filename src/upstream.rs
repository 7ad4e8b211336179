//! Shared HTTP plumbing for hosted model providers.
//!
//! Both the embedding and the completion providers talk JSON over HTTPS.
//! [`UpstreamClient`] wraps a `reqwest::Client` with the configured timeout
//! and an optional retry loop.
//!
//! # Retry Strategy
//!
//! With `max_retries = 0` (the default) every call is a single attempt and
//! its failure surfaces directly. Otherwise:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{anyhow, bail, Result};
use std::time::Duration;

/// A JSON-over-HTTP client for one upstream provider.
#[derive(Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    /// Provider label used in error messages (e.g. `"Gemini"`).
    label: &'static str,
    max_retries: u32,
}

impl UpstreamClient {
    pub fn new(label: &'static str, timeout_secs: u64, max_retries: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            label,
            max_retries,
        })
    }

    /// POST `body` to `url` and return the parsed JSON response.
    ///
    /// `headers` are added to every attempt (API keys, versions).
    pub async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(
                    provider = self.label,
                    attempt,
                    delay_secs = delay.as_secs(),
                    "retrying upstream call"
                );
                tokio::time::sleep(delay).await;
            }

            let mut req = self
                .client
                .post(url)
                .header("Content-Type", "application/json");
            for (name, value) in headers {
                req = req.header(*name, *value);
            }

            match req.json(body).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response.json().await?);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow!(
                            "{} API error {}: {}",
                            self.label,
                            status,
                            body_text
                        ));
                        continue;
                    }

                    bail!("{} API error {}: {}", self.label, status, body_text);
                }
                Err(e) => {
                    last_err = Some(anyhow!("{} request failed: {}", self.label, e));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("{} call failed after retries", self.label)))
    }
}

/// Read an API key from `override_env`, falling back to `default_env`.
pub fn resolve_api_key(override_env: Option<&str>, default_env: &str) -> Result<String> {
    let var = override_env.unwrap_or(default_env);
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => bail!("{} environment variable not set", var),
    }
}

/// Join a base URL and a path without doubling or dropping the slash.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
