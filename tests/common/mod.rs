//! Shared fixtures: an in-process transport that records requests and
//! can be told to fail or stall for particular URLs.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use webhook_registry::{
    DeliveryError, OutboundRequest, Registry, RegistryConfig, RetryPolicy, Transport,
    TransportResponse,
};

pub const ORG: &str = "acme";

#[derive(Default)]
pub struct RecordingTransport {
    requests: Mutex<Vec<OutboundRequest>>,
    failing: Mutex<HashSet<String>>,
    delays: Mutex<HashMap<String, Duration>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_url(&self, url: impl Into<String>) {
        self.failing.lock().unwrap().insert(url.into());
    }

    pub fn delay_url(&self, url: impl Into<String>, delay: Duration) {
        self.delays.lock().unwrap().insert(url.into(), delay);
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(
        &self,
        request: OutboundRequest,
        policy: &RetryPolicy,
    ) -> Result<TransportResponse, DeliveryError> {
        self.requests.lock().unwrap().push(request.clone());

        let delay = self.delays.lock().unwrap().get(&request.url).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().unwrap().contains(&request.url) {
            return Err(DeliveryError::MaxRetriesExceeded {
                attempts: policy.max_retries + 1,
                last: Box::new(DeliveryError::Network("connection refused".to_string())),
            });
        }

        Ok(TransportResponse::new(200, format!("ok {}", request.url)))
    }
}

pub fn test_registry(transport: Arc<RecordingTransport>) -> Registry {
    Registry::builder(RegistryConfig::new(ORG).with_retry_policy(RetryPolicy::no_retry()))
        .transport(transport)
        .build()
        .unwrap()
}

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}
