//! HTTP client for PageSpeed Insights and CrUX.

use std::time::Duration;

use pagepulse_core::{Method, PsiResponse, RequestSpec};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("gave up after {attempts} attempts (last status: {last})")]
    RetriesExhausted { attempts: u32, last: String },
}

/// Bounded retry for transient failures (5xx and transport errors).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Executes [`RequestSpec`]s and decodes JSON bodies.
pub struct HttpFetcher {
    client: reqwest::Client,
    policy: RetryPolicy,
}

enum Attempt {
    Done(Option<serde_json::Value>),
    Transient(String),
}

impl HttpFetcher {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            client: reqwest::Client::new(),
            policy,
        }
    }

    /// Execute a request.
    ///
    /// Returns `Ok(None)` for 204 No Content. 5xx responses and transport
    /// errors are retried up to the policy's attempt count with a fixed
    /// delay; other non-success statuses fail immediately.
    pub async fn execute(
        &self,
        spec: &RequestSpec,
    ) -> Result<Option<serde_json::Value>, FetchError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let url = spec.redacted_url();
        let mut last = String::new();

        for attempt in 1..=max_attempts {
            debug!(url = %url, method = spec.method.as_str(), attempt, "sending request");
            match self.attempt(spec).await? {
                Attempt::Done(body) => {
                    info!(url = %url, attempt, empty = body.is_none(), "request complete");
                    return Ok(body);
                }
                Attempt::Transient(reason) => {
                    last = reason;
                    if attempt < max_attempts {
                        warn!(
                            url = %url,
                            attempt,
                            reason = %last,
                            backoff_ms = self.policy.backoff.as_millis() as u64,
                            "transient failure, retrying"
                        );
                        tokio::time::sleep(self.policy.backoff).await;
                    }
                }
            }
        }

        Err(FetchError::RetriesExhausted {
            attempts: max_attempts,
            last,
        })
    }

    /// Execute a `runPagespeed` request and decode the envelope.
    pub async fn run_analysis(&self, spec: &RequestSpec) -> Result<Option<PsiResponse>, FetchError> {
        match self.execute(spec).await? {
            Some(body) => Ok(Some(serde_json::from_value(body)?)),
            None => Ok(None),
        }
    }

    async fn attempt(&self, spec: &RequestSpec) -> Result<Attempt, FetchError> {
        let mut req = match spec.method {
            Method::Get => self.client.get(&spec.base_endpoint),
            Method::Post => self.client.post(&spec.base_endpoint),
        };
        req = req.query(&spec.query_pairs());
        if let Some(body) = &spec.body {
            req = req.json(body);
        }

        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                return Ok(Attempt::Transient(e.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let status = resp.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(Attempt::Done(None));
        }
        if status.is_server_error() {
            return Ok(Attempt::Transient(status.to_string()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp.bytes().await?;
        Ok(Attempt::Done(Some(serde_json::from_slice(&bytes)?)))
    }
}
