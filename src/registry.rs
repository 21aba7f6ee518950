use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::dispatcher::Dispatcher;
use crate::error::{RegistryError, Result};
use crate::events::{DeliveryEvent, DeliveryEventKind, EventBus};
use crate::query::SubscriptionQuery;
use crate::signing::{HmacSigner, Signer};
use crate::storage::{InMemoryStore, SubscriptionStore};
use crate::telemetry::{metric_inc, trace_debug, trace_info, trace_warn};
use crate::transport::{RetryPolicy, Transport};
use crate::types::{NewSubscription, Subscription, SubscriptionId, TellOptions, TellResult};

/// Registry settings.
///
/// `org_name` namespaces the signature headers (`x-<org>-signature`, ...)
/// and must be a valid HTTP header token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub org_name: String,
    pub retry_policy: RetryPolicy,
    /// Buffered delivery events per subscriber before it starts lagging.
    pub event_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            org_name: "teller".to_string(),
            retry_policy: RetryPolicy::default(),
            event_capacity: 1_024,
        }
    }
}

impl RegistryConfig {
    pub fn new(org_name: impl Into<String>) -> Self {
        Self {
            org_name: org_name.into(),
            ..Default::default()
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_event_capacity(mut self, event_capacity: usize) -> Self {
        self.event_capacity = event_capacity;
        self
    }

    /// # Errors
    ///
    /// [`RegistryError::Configuration`] for an empty or non-token org name,
    /// or a zero event capacity.
    pub fn validate(&self) -> Result<()> {
        if self.org_name.is_empty() {
            return Err(RegistryError::Configuration(
                "org_name must not be empty".to_string(),
            ));
        }
        if let Some(c) = self
            .org_name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(RegistryError::Configuration(format!(
                "org_name {:?} contains {c:?}, which is not allowed in a header name",
                self.org_name
            )));
        }
        if self.event_capacity == 0 {
            return Err(RegistryError::Configuration(
                "event_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Assembles a [`Registry`] from a config and optional collaborators.
///
/// Anything left unset falls back to the in-memory store, the HMAC signer
/// and (with the `http` feature) the reqwest transport.
pub struct RegistryBuilder {
    config: RegistryConfig,
    store: Option<Arc<dyn SubscriptionStore>>,
    signer: Option<Arc<dyn Signer>>,
    transport: Option<Arc<dyn Transport>>,
}

impl RegistryBuilder {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            store: None,
            signer: None,
            transport: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn SubscriptionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// # Errors
    ///
    /// [`RegistryError::Configuration`] when the config is invalid or no
    /// transport is available.
    pub fn build(self) -> Result<Registry> {
        self.config.validate()?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => default_transport()?,
        };
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryStore::new()));
        let signer = self.signer.unwrap_or_else(|| Arc::new(HmacSigner));

        let bus = EventBus::new(self.config.event_capacity);
        let dispatcher = Dispatcher::new(
            transport,
            signer,
            self.config.org_name.as_str(),
            self.config.retry_policy.clone(),
            bus.clone(),
        );

        trace_info!(org = %self.config.org_name, "webhook registry ready");

        Ok(Registry {
            store,
            dispatcher,
            bus,
            config: self.config,
        })
    }
}

#[cfg(feature = "http")]
fn default_transport() -> Result<Arc<dyn Transport>> {
    Ok(Arc::new(crate::transport::HttpTransport::new()))
}

#[cfg(not(feature = "http"))]
fn default_transport() -> Result<Arc<dyn Transport>> {
    Err(RegistryError::Configuration(
        "no transport configured and the `http` feature is disabled".to_string(),
    ))
}

/// Public entry point: subscription CRUD plus [`Registry::tell`].
#[derive(Clone)]
pub struct Registry {
    store: Arc<dyn SubscriptionStore>,
    dispatcher: Dispatcher,
    bus: EventBus,
    config: RegistryConfig,
}

impl Registry {
    pub fn builder(config: RegistryConfig) -> RegistryBuilder {
        RegistryBuilder::new(config)
    }

    /// Registry with default collaborators.
    pub fn new(config: RegistryConfig) -> Result<Self> {
        RegistryBuilder::new(config).build()
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Validate, stamp and persist a new subscription.
    ///
    /// Returns the record as re-read from the store.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Validation`] for malformed input; store failures
    /// propagate unchanged.
    pub async fn add(&self, new: NewSubscription) -> Result<Subscription> {
        new.validate()?;

        let subscription = Subscription::from_new(new);
        let id = subscription.id.clone();
        self.store.add(subscription).await?;

        let stored = self.store.get_by_id(&id).await?.ok_or_else(|| {
            RegistryError::Store(format!("subscription {id} missing right after add"))
        })?;

        metric_inc("webhook.subscription.added");
        trace_info!(webhook_id = %id, events = ?stored.events, "subscription added");
        Ok(stored)
    }

    /// # Errors
    ///
    /// [`RegistryError::NotFound`] when `id` is unknown.
    pub async fn remove(&self, id: &SubscriptionId) -> Result<()> {
        self.store.remove(id).await?;
        metric_inc("webhook.subscription.removed");
        trace_info!(webhook_id = %id, "subscription removed");
        Ok(())
    }

    pub async fn get_all(&self) -> Result<Vec<Subscription>> {
        self.store.get_all().await
    }

    pub async fn get_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>> {
        self.store.get_by_id(id).await
    }

    pub async fn get_by_tag(&self, tag: &str) -> Result<Vec<Subscription>> {
        self.store.get_by_tag(tag).await
    }

    pub async fn get_by_events(&self, events: &[String]) -> Result<Vec<Subscription>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }
        self.store.get_by_events(events).await
    }

    /// Report that `event` happened and deliver `data` to every matching
    /// subscription.
    ///
    /// Waits for all deliveries to settle. Delivery failures are reported in
    /// the result and on the event stream, never as an `Err`. With no
    /// matches the result is empty and nothing is sent.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Validation`] for a blank event name or a payload
    /// that cannot be serialized; store failures during the lookup.
    pub async fn tell<T>(&self, event: &str, data: &T, options: TellOptions) -> Result<TellResult>
    where
        T: Serialize + ?Sized,
    {
        if event.trim().is_empty() {
            return Err(RegistryError::Validation {
                field: "event",
                message: "event name must not be blank".to_string(),
            });
        }
        let payload = serde_json::to_value(data).map_err(|e| RegistryError::Validation {
            field: "data",
            message: e.to_string(),
        })?;

        let query = SubscriptionQuery::new([event])?
            .with_tags(options.tags)
            .with_scopes(options.scopes);
        let matched = self.store.get_by_query(&query).await?;

        metric_inc("webhook.tell.total");
        if matched.is_empty() {
            trace_debug!(event, "no subscriptions matched");
            return Ok(TellResult::empty());
        }

        let outcomes = self.dispatcher.dispatch(&matched, event, &payload).await;
        let result = TellResult::from_outcomes(outcomes);

        let _failed = result.failures().count();
        trace_info!(
            event,
            matched = result.matched_count,
            failed = _failed,
            "event told"
        );
        Ok(result)
    }

    /// Stream of every delivery event.
    pub fn subscribe(&self) -> broadcast::Receiver<DeliveryEvent> {
        self.bus.subscribe()
    }

    /// Run `handler` for each delivery event of `kind`.
    ///
    /// The handler runs on its own task, so it never holds up dispatch; only
    /// events published after this call are seen. Must be called from
    /// within a tokio runtime. Abort the returned handle to unsubscribe.
    ///
    /// A handler that panics ends its task and receives nothing further;
    /// the returned handle then resolves with the panic. A handler that
    /// falls more than `event_capacity` events behind skips the oldest
    /// ones and carries on with a warning logged.
    pub fn on<F>(&self, kind: DeliveryEventKind, handler: F) -> JoinHandle<()>
    where
        F: Fn(DeliveryEvent) + Send + 'static,
    {
        let mut rx = self.bus.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) if event.kind() == kind => handler(event),
                    Ok(_) => {}
                    Err(RecvError::Lagged(_skipped)) => {
                        trace_warn!(kind = %kind, skipped = _skipped, "event handler lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
