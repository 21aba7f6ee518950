//! Webhook subscription registry and event fan-out.
//!
//! Subscribers register interest in named events, optionally narrowed by
//! tags and scopes. Producers [`Registry::tell`] the registry that an event
//! happened; every matching subscription receives a signed HTTP POST.
//!
//! ## Guarantees
//! - Deliveries run concurrently and are isolated from each other
//! - `tell` waits for every delivery to settle and reports each outcome
//! - One `response`/`error` event per delivery on the event stream
//! - Bounded retries with exponential backoff per delivery
//!
//! ## Non-Guarantees
//! - Redelivery after retries are exhausted (no dead-letter store)
//! - Ordering across subscriptions
//! - Authorization of who may register subscriptions
//! - Outbound rate limiting

mod dispatcher;
mod error;
mod events;
mod query;
mod registry;
mod signing;
mod storage;
mod telemetry;
mod transport;
mod types;

#[cfg(feature = "postgres")]
mod storage_postgres;

pub use dispatcher::Dispatcher;
pub use error::{DeliveryError, RegistryError, Result};
pub use events::{DeliveryEvent, DeliveryEventKind, EventBus};
pub use query::{event_match, match_subscriptions, scope_match, tag_match, SubscriptionQuery};
pub use registry::{Registry, RegistryBuilder, RegistryConfig};
pub use signing::{
    build_signature_headers,
    build_string_to_sign,
    compute_signature,
    is_timestamp_fresh,
    parse_signature_headers,
    request_id_header,
    signature_header,
    timestamp_header,
    verify_signature,
    verify_webhook_request,
    HmacSigner,
    ParsedSignature,
    SignedHeaders,
    Signer,
    VerificationError,
};
pub use storage::{InMemoryStore, SubscriptionStore};
pub use transport::{send_with_retry, OutboundRequest, RetryPolicy, Transport, TransportResponse};
pub use types::{
    DeliveryOutcome,
    DeliveryStatus,
    NewSubscription,
    Subscription,
    SubscriptionId,
    SubscriptionUrl,
    TellOptions,
    TellResult,
};

#[cfg(feature = "http")]
pub use transport::HttpTransport;

#[cfg(feature = "postgres")]
pub use storage_postgres::PostgresStore;
