use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::error::DeliveryError;
use crate::events::{DeliveryEvent, EventBus};
use crate::signing::Signer;
use crate::telemetry::{metric_inc, metric_inc_labeled, trace_debug, trace_warn};
use crate::transport::{OutboundRequest, RetryPolicy, Transport, TransportResponse};
use crate::types::{DeliveryOutcome, Subscription, SubscriptionId};

/// JSON body posted to subscribers. Field order is part of the wire format.
#[derive(Serialize)]
struct DeliveryBody<'a> {
    event: &'a str,
    #[serde(rename = "webhookId")]
    webhook_id: &'a SubscriptionId,
    data: &'a serde_json::Value,
}

/// Fans one event out to a set of subscriptions.
///
/// Every delivery runs as its own task; a slow or failing recipient never
/// delays or affects the others. [`Dispatcher::dispatch`] waits until all of
/// them have settled and reports one outcome per subscription.
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    signer: Arc<dyn Signer>,
    org_name: Arc<str>,
    retry_policy: RetryPolicy,
    bus: EventBus,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        signer: Arc<dyn Signer>,
        org_name: impl Into<Arc<str>>,
        retry_policy: RetryPolicy,
        bus: EventBus,
    ) -> Self {
        Self {
            transport,
            signer,
            org_name: org_name.into(),
            retry_policy,
            bus,
        }
    }

    pub fn org_name(&self) -> &str {
        &self.org_name
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Build the signed POST for one subscription.
    pub fn build_request(
        &self,
        subscription: &Subscription,
        event_name: &str,
        payload: &serde_json::Value,
    ) -> Result<OutboundRequest, DeliveryError> {
        let url = subscription.target_url();
        let body = serde_json::to_string(&DeliveryBody {
            event: event_name,
            webhook_id: &subscription.id,
            data: payload,
        })
        .map_err(|e| DeliveryError::InvalidRequest(e.to_string()))?;

        let timestamp = Utc::now().timestamp_millis().to_string();
        let headers = self.signer.sign(
            &self.org_name,
            &url,
            &body,
            &timestamp,
            &subscription.signature_token,
        );

        Ok(OutboundRequest::post(url, headers.into_vec(), body))
    }

    /// Deliver `payload` to every subscription concurrently.
    ///
    /// Returns one outcome per input subscription, in input order. Exactly
    /// one [`DeliveryEvent`] is published per subscription as soon as its
    /// delivery settles.
    pub async fn dispatch(
        &self,
        subscriptions: &[Subscription],
        event_name: &str,
        payload: &serde_json::Value,
    ) -> Vec<DeliveryOutcome> {
        let mut handles = Vec::with_capacity(subscriptions.len());

        for subscription in subscriptions {
            let id = subscription.id.clone();
            let request = self.build_request(subscription, event_name, payload);
            let transport = self.transport.clone();
            let policy = self.retry_policy.clone();
            let bus = self.bus.clone();
            let task_id = id.clone();

            let handle = tokio::spawn(async move {
                let result = match request {
                    Ok(request) => transport.send(request, &policy).await,
                    Err(err) => Err(err),
                };
                settle(&bus, task_id, &result);
                result
            });
            handles.push((id, handle));
        }

        trace_debug!(
            event = event_name,
            deliveries = handles.len(),
            "dispatch started"
        );

        let mut outcomes = Vec::with_capacity(handles.len());
        for (subscription_id, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(join_err) => {
                    // The task never reached `settle`, so report it here.
                    let result = Err(DeliveryError::Aborted(join_err.to_string()));
                    settle(&self.bus, subscription_id.clone(), &result);
                    result
                }
            };
            outcomes.push(DeliveryOutcome {
                subscription_id,
                result,
            });
        }

        outcomes
    }
}

fn settle(
    bus: &EventBus,
    subscription_id: SubscriptionId,
    result: &Result<TransportResponse, DeliveryError>,
) {
    match result {
        Ok(_response) => {
            metric_inc("webhook.delivery.success");
            trace_debug!(
                webhook_id = %subscription_id,
                status = _response.status,
                "webhook delivered"
            );
        }
        Err(err) => {
            metric_inc("webhook.delivery.failure");
            metric_inc_labeled("webhook.delivery.failure.reason", "reason", err.as_label());
            trace_warn!(
                webhook_id = %subscription_id,
                reason = err.as_label(),
                error = %err,
                "webhook delivery failed"
            );
        }
    }
    bus.publish(DeliveryEvent::from_result(subscription_id, result));
}
