// src/fetch/transport.rs

use reqwest::{header::ACCEPT, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

use crate::error::{Result, SodError};

/// Statuses treated as transient.
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];
pub const USER_AGENT: &str = "FDIC-SOD-Downloader/2.0";

/// Bounded exponential backoff applied to every request.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub factor: u32,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(2),
            factor: 2,
            timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay after the `failed`-th failed attempt (1-based).
    pub fn backoff(&self, failed: u32) -> Duration {
        self.initial_backoff * self.factor.saturating_pow(failed.saturating_sub(1))
    }
}

fn is_retryable(status: StatusCode) -> bool {
    RETRYABLE_STATUSES.contains(&status.as_u16())
}

/// Thin wrapper over `reqwest::Client` that issues idempotent GETs with retry.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    policy: RetryPolicy,
}

impl HttpTransport {
    pub fn new(policy: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(policy.timeout)
            .build()?;
        Ok(Self { client, policy })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// GET `url` with `query`, retrying transient statuses and connection failures.
    /// Returns the first successful response; anything else non-retryable surfaces at once.
    #[instrument(level = "debug", skip(self, query))]
    pub async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<Response> {
        self.get_with_accept(url, query, None).await
    }

    async fn get_with_accept(
        &self,
        url: &str,
        query: &[(&str, String)],
        accept: Option<&str>,
    ) -> Result<Response> {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let mut req = self
                .client
                .get(url)
                .query(query)
                .timeout(self.policy.timeout);
            if let Some(accept) = accept {
                req = req.header(ACCEPT, accept);
            }

            let reason = match req.send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!(attempt, status = %resp.status(), "ok");
                    return Ok(resp);
                }
                Ok(resp) if is_retryable(resp.status()) => format!("status {}", resp.status()),
                Ok(resp) => {
                    return Err(SodError::HttpStatus {
                        url: url.to_string(),
                        status: resp.status().as_u16(),
                    })
                }
                Err(e) if e.is_timeout() || e.is_connect() => e.to_string(),
                Err(e) => return Err(e.into()),
            };

            if attempt >= self.policy.max_attempts {
                error!(%url, attempts = attempt, %reason, "Exhausted retries");
                return Err(SodError::RetriesExhausted {
                    url: url.to_string(),
                    attempts: attempt,
                    reason,
                });
            }

            let backoff = self.policy.backoff(attempt);
            warn!(%url, attempt, delay_ms = backoff.as_millis() as u64, %reason, "Retrying");
            sleep(backoff).await;
        }
    }

    pub async fn get_text(&self, url: &str, query: &[(&str, String)]) -> Result<String> {
        Ok(self.get(url, query).await?.text().await?)
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let body = self
            .get_with_accept(url, query, Some("application/json"))
            .await?
            .bytes()
            .await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
