//! Outbound HTTP transport and its retry policy.
//!
//! The dispatcher hands every request to a [`Transport`] together with a
//! [`RetryPolicy`]; the transport owns the retry loop. Each attempt gets a
//! fresh timeout, and every transport-level failure (including non-2xx
//! responses) is retried until the policy is exhausted.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout};

use crate::error::DeliveryError;
use crate::telemetry::{metric_inc, trace_debug};

/// Fully prepared request: URL resolved, body serialized, headers signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl OutboundRequest {
    pub fn post(url: impl Into<String>, headers: Vec<(String, String)>, body: impl Into<String>) -> Self {
        Self {
            method: "POST".to_string(),
            url: url.into(),
            headers,
            body: body.into(),
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Successful (2xx) response from a subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }
}

/// Retry behaviour the dispatcher asks the transport to apply.
///
/// Defaults: 15 retries, 100ms base delay doubling per retry up to 30s,
/// up to 50ms jitter, 10s per attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
    /// Per-attempt timeout; restarts on every retry.
    pub timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 15,
            base_delay_ms: 100,
            max_delay_ms: 30_000,
            jitter_ms: 50,
            timeout_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, base_delay_ms: u64, max_delay_ms: u64, jitter_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self.max_delay_ms = max_delay_ms;
        self.jitter_ms = jitter_ms;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }

    /// Exponential delay before retry number `retry` (1-based), without jitter.
    pub fn backoff(&self, retry: u32) -> Duration {
        let base = self.base_delay_ms;
        let max = self.max_delay_ms.max(base);
        let pow = 2u64.saturating_pow(retry.saturating_sub(1));
        Duration::from_millis(base.saturating_mul(pow).min(max))
    }

    fn delay_for_retry(&self, retry: u32) -> Duration {
        self.backoff(retry) + jitter_delay(self.jitter_ms)
    }
}

fn jitter_delay(jitter_ms: u64) -> Duration {
    if jitter_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(fastrand::u64(0..=jitter_ms))
}

/// Sends one request, retrying according to `policy`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: OutboundRequest,
        policy: &RetryPolicy,
    ) -> Result<TransportResponse, DeliveryError>;
}

/// Drive `attempt` until it succeeds, fails permanently, or `policy` runs out.
///
/// `attempt` receives the zero-based attempt number. Each call runs under
/// its own timeout. Exhausting retries yields
/// [`DeliveryError::MaxRetriesExceeded`] carrying the last failure.
pub async fn send_with_retry<F, Fut>(
    policy: &RetryPolicy,
    mut attempt: F,
) -> Result<TransportResponse, DeliveryError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<TransportResponse, DeliveryError>>,
{
    let mut retry = 0u32;
    loop {
        let result = match timeout(policy.attempt_timeout(), attempt(retry)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout),
        };

        let err = match result {
            Ok(response) => return Ok(response),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => err,
        };

        if retry >= policy.max_retries {
            return Err(DeliveryError::MaxRetriesExceeded {
                attempts: retry + 1,
                last: Box::new(err),
            });
        }

        retry += 1;
        metric_inc("webhook.delivery.retry");
        trace_debug!(retry, error = %err, "retrying webhook delivery");
        sleep(policy.delay_for_retry(retry)).await;
    }
}

/// reqwest-backed transport.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn attempt(&self, request: &OutboundRequest) -> Result<TransportResponse, DeliveryError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| DeliveryError::InvalidRequest(e.to_string()))?;

        let mut builder = self
            .client
            .request(method, &request.url)
            .body(request.body.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|err| {
            if err.is_timeout() {
                DeliveryError::Timeout
            } else if err.is_builder() {
                DeliveryError::InvalidRequest(err.to_string())
            } else {
                DeliveryError::Network(err.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Status(status.as_u16()));
        }

        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| DeliveryError::Network(e.to_string()))?;

        Ok(TransportResponse {
            status: status.as_u16(),
            headers,
            body,
        })
    }
}

#[cfg(feature = "http")]
impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: OutboundRequest,
        policy: &RetryPolicy,
    ) -> Result<TransportResponse, DeliveryError> {
        send_with_retry(policy, |_| self.attempt(&request)).await
    }
}
