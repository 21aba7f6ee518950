//! Delivery observability.
//!
//! Every settled delivery publishes exactly one [`DeliveryEvent`] on the
//! [`EventBus`]. Publishing never waits on subscribers: slow receivers lag
//! and miss events instead of stalling dispatch.

use std::fmt;

use tokio::sync::broadcast;

use crate::error::DeliveryError;
use crate::transport::TransportResponse;
use crate::types::SubscriptionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryEventKind {
    Response,
    Error,
}

impl DeliveryEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryEventKind::Response => "response",
            DeliveryEventKind::Error => "error",
        }
    }
}

impl fmt::Display for DeliveryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum DeliveryEvent {
    Response {
        webhook_id: SubscriptionId,
        msg: String,
        response: TransportResponse,
    },
    Error {
        webhook_id: SubscriptionId,
        msg: String,
        error: DeliveryError,
    },
}

impl DeliveryEvent {
    pub(crate) fn from_result(
        webhook_id: SubscriptionId,
        result: &Result<TransportResponse, DeliveryError>,
    ) -> Self {
        match result {
            Ok(response) => DeliveryEvent::Response {
                msg: format!("Received response from server for webhook with ID: {webhook_id}"),
                webhook_id,
                response: response.clone(),
            },
            Err(error) => DeliveryEvent::Error {
                msg: format!("Error triggering webhook with ID: {webhook_id}"),
                webhook_id,
                error: error.clone(),
            },
        }
    }

    pub fn kind(&self) -> DeliveryEventKind {
        match self {
            DeliveryEvent::Response { .. } => DeliveryEventKind::Response,
            DeliveryEvent::Error { .. } => DeliveryEventKind::Error,
        }
    }

    /// Wire-level type tag: `HTTP_SEND_RESPONSE` or `HTTP_SEND_ERROR`.
    pub fn event_type(&self) -> &'static str {
        match self {
            DeliveryEvent::Response { .. } => "HTTP_SEND_RESPONSE",
            DeliveryEvent::Error { .. } => "HTTP_SEND_ERROR",
        }
    }

    pub fn webhook_id(&self) -> &SubscriptionId {
        match self {
            DeliveryEvent::Response { webhook_id, .. } | DeliveryEvent::Error { webhook_id, .. } => {
                webhook_id
            }
        }
    }

    pub fn msg(&self) -> &str {
        match self {
            DeliveryEvent::Response { msg, .. } | DeliveryEvent::Error { msg, .. } => msg,
        }
    }
}

/// Broadcast channel for delivery events.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DeliveryEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Errors are ignored when nobody is listening.
    pub fn publish(&self, event: DeliveryEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeliveryEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_event_shape() {
        let id = SubscriptionId::from("abc");
        let ev = DeliveryEvent::from_result(id.clone(), &Ok(TransportResponse::new(200, "ok")));
        assert_eq!(ev.kind(), DeliveryEventKind::Response);
        assert_eq!(ev.event_type(), "HTTP_SEND_RESPONSE");
        assert_eq!(ev.webhook_id(), &id);
        assert!(ev.msg().ends_with("abc"));
    }

    #[test]
    fn error_event_shape() {
        let ev = DeliveryEvent::from_result("x".into(), &Err(DeliveryError::Timeout));
        assert_eq!(ev.kind().as_str(), "error");
        assert_eq!(ev.event_type(), "HTTP_SEND_ERROR");
        assert_eq!(ev.msg(), "Error triggering webhook with ID: x");
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        bus.publish(DeliveryEvent::from_result("x".into(), &Err(DeliveryError::Timeout)));
        let mut rx = bus.subscribe();
        bus.publish(DeliveryEvent::from_result("y".into(), &Err(DeliveryError::Timeout)));
        assert_eq!(rx.recv().await.unwrap().webhook_id().as_str(), "y");
    }
}
