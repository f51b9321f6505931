//! HTTP client with retry logic for the FSA registry.
//!
//! The transport performs exactly one request and classifies the result into
//! an [`Outcome`]. [`RetryClient`] owns the retry loop and decides, from that
//! outcome alone, whether to return, back off or give up.

use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::AUTHORIZATION;
use serde_json::Value;

use crate::config::HarvesterConfig;
use crate::error::{FailureCause, HarvesterError, Result};

/// User agent string identifying this harvester.
const USER_AGENT: &str = concat!("fsa-harvester/", env!("CARGO_PKG_VERSION"));

/// Maximum number of attempts for generic failures.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base delay for linear backoff (milliseconds).
pub const RETRY_BASE_DELAY_MS: u64 = 1000;

/// Waits applied while the registry answers 502, one per retry.
pub const UPSTREAM_BACKOFF_SECS: [u64; 3] = [10, 30, 60];

/// Status the registry's gateway returns while the backend is down.
const STATUS_BAD_GATEWAY: u16 = 502;

/// Request verb. The registry accepts a JSON body on both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Result of a single request, before any retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// 2xx response with its raw body.
    Success(String),
    /// Worth another attempt: 5xx, unexpected 4xx, network trouble.
    Retryable(FailureCause),
    /// Credentials rejected; carries the status.
    Terminal(u16),
}

/// Map a non-success status to an outcome.
#[must_use]
pub fn classify_status(status: u16) -> Outcome {
    match status {
        401 | 403 => Outcome::Terminal(status),
        _ => Outcome::Retryable(FailureCause::Status(status)),
    }
}

/// Performs one request. Implemented over reqwest, and by scripted fakes in tests.
pub trait Transport {
    fn send(&self, method: HttpMethod, url: &str, body: &Value) -> Outcome;
}

/// Backoff parameters for [`RetryClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed for generic failures.
    pub max_retries: u32,
    /// Linear backoff step: the n-th failure waits `base_delay * n`.
    pub base_delay: Duration,
    /// One wait per tolerated 502 response.
    pub upstream_backoff: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
            upstream_backoff: UPSTREAM_BACKOFF_SECS
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
        }
    }
}

impl RetryPolicy {
    /// Policy with the given budgets and no waiting at all.
    #[must_use]
    pub fn immediate(max_retries: u32, upstream_steps: usize) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            upstream_backoff: vec![Duration::ZERO; upstream_steps],
        }
    }
}

/// reqwest-backed transport carrying the bearer token.
///
/// NOTE: Do NOT derive `Debug` on this struct; the token would be exposed.
pub struct ReqwestTransport {
    client: Client,
    authorization: String,
}

impl ReqwestTransport {
    pub fn new(config: &HarvesterConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        Ok(Self {
            client,
            authorization: authorization_value(&config.bearer_token),
        })
    }
}

/// `Authorization` header value: the token as configured, with the `Bearer `
/// scheme added when it is missing.
fn authorization_value(token: &str) -> String {
    let token = token.trim();
    if token.starts_with("Bearer ") {
        token.to_string()
    } else {
        format!("Bearer {token}")
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, method: HttpMethod, url: &str, body: &Value) -> Outcome {
        let request = match method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
        };

        let response = match request
            .header(AUTHORIZATION, &self.authorization)
            .json(body)
            .send()
        {
            Ok(response) => response,
            Err(e) => return Outcome::Retryable(FailureCause::Transport(e.to_string())),
        };

        let status = response.status();
        if !status.is_success() {
            return classify_status(status.as_u16());
        }

        match response.text() {
            Ok(text) => Outcome::Success(text),
            Err(e) => Outcome::Retryable(FailureCause::Transport(e.to_string())),
        }
    }
}

/// Runs requests through a [`Transport`] under a [`RetryPolicy`].
pub struct RetryClient<T: Transport = ReqwestTransport> {
    transport: T,
    policy: RetryPolicy,
}

impl RetryClient<ReqwestTransport> {
    /// Create the production client from the run configuration.
    pub fn from_config(config: &HarvesterConfig) -> Result<Self> {
        Ok(Self::new(
            ReqwestTransport::new(config)?,
            config.retry.clone(),
        ))
    }
}

impl<T: Transport> RetryClient<T> {
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send a request and decode the JSON response.
    ///
    /// # Errors
    /// * `Credential` on 401/403, after a single call
    /// * `UpstreamUnavailable` when 502 outlasts the upstream backoff schedule
    /// * `RequestFailed` when any other failure outlasts `max_retries`
    /// * `InvalidResponse` when a 2xx body is not JSON
    pub fn request(&self, url: &str, method: HttpMethod, body: &Value) -> Result<Value> {
        let mut calls: u32 = 0;
        let mut failures: u32 = 0;
        let mut upstream_failures: usize = 0;

        loop {
            calls += 1;

            match self.transport.send(method, url, body) {
                Outcome::Success(text) => {
                    return serde_json::from_str(&text).map_err(|e| {
                        HarvesterError::InvalidResponse {
                            url: url.to_string(),
                            message: e.to_string(),
                        }
                    });
                }
                Outcome::Terminal(status) => {
                    tracing::error!(url, status, "Registry rejected credentials");
                    return Err(HarvesterError::Credential { status });
                }
                Outcome::Retryable(FailureCause::Status(STATUS_BAD_GATEWAY)) => {
                    let Some(delay) = self.policy.upstream_backoff.get(upstream_failures) else {
                        tracing::error!(url, attempts = calls, "Registry still unavailable");
                        return Err(HarvesterError::UpstreamUnavailable { attempts: calls });
                    };
                    upstream_failures += 1;
                    tracing::warn!(
                        url,
                        attempt = calls,
                        delay_secs = delay.as_secs(),
                        "Registry unavailable (502), backing off"
                    );
                    pause(*delay);
                }
                Outcome::Retryable(cause) => {
                    failures += 1;
                    if failures >= self.policy.max_retries {
                        tracing::error!(url, attempts = failures, cause = %cause, "Retries exhausted");
                        return Err(HarvesterError::RequestFailed {
                            attempts: failures,
                            cause,
                        });
                    }
                    let delay = self.policy.base_delay * failures;
                    tracing::warn!(
                        url,
                        attempt = failures,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        cause = %cause,
                        "Request failed, will retry"
                    );
                    pause(delay);
                }
            }
        }
    }
}

fn pause(delay: Duration) {
    if !delay.is_zero() {
        thread::sleep(delay);
    }
}
