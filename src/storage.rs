use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{RegistryError, Result};
use crate::query::{match_subscriptions, SubscriptionQuery};
use crate::types::{Subscription, SubscriptionId};

/// Persistence contract for subscription records.
///
/// Writes must be visible to every read that starts after they return.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn add(&self, subscription: Subscription) -> Result<Subscription>;
    async fn get_all(&self) -> Result<Vec<Subscription>>;
    async fn get_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>>;
    async fn get_by_tag(&self, tag: &str) -> Result<Vec<Subscription>>;
    /// Subscriptions listening to *any* of `events`.
    async fn get_by_events(&self, events: &[String]) -> Result<Vec<Subscription>>;
    /// Subscriptions matching `query`, in store order.
    async fn get_by_query(&self, query: &SubscriptionQuery) -> Result<Vec<Subscription>>;
    /// Fails with [`RegistryError::NotFound`] when `id` is unknown.
    async fn remove(&self, id: &SubscriptionId) -> Result<()>;
}

/// In-memory store for embedded and test deployments.
///
/// Keeps insertion order behind a single lock.
#[derive(Default)]
pub struct InMemoryStore {
    subscriptions: RwLock<Vec<Subscription>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.subscriptions.read().await.is_empty()
    }
}

#[async_trait]
impl SubscriptionStore for InMemoryStore {
    async fn add(&self, subscription: Subscription) -> Result<Subscription> {
        let mut guard = self.subscriptions.write().await;
        if guard.iter().any(|s| s.id == subscription.id) {
            return Err(RegistryError::Store(format!(
                "subscription {} already exists",
                subscription.id
            )));
        }
        guard.push(subscription.clone());
        Ok(subscription)
    }

    async fn get_all(&self) -> Result<Vec<Subscription>> {
        Ok(self.subscriptions.read().await.clone())
    }

    async fn get_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>> {
        let guard = self.subscriptions.read().await;
        Ok(guard.iter().find(|s| &s.id == id).cloned())
    }

    async fn get_by_tag(&self, tag: &str) -> Result<Vec<Subscription>> {
        let guard = self.subscriptions.read().await;
        Ok(guard
            .iter()
            .filter(|s| s.tags.iter().any(|t| t == tag))
            .cloned()
            .collect())
    }

    async fn get_by_events(&self, events: &[String]) -> Result<Vec<Subscription>> {
        let guard = self.subscriptions.read().await;
        Ok(guard
            .iter()
            .filter(|s| s.events.iter().any(|e| events.contains(e)))
            .cloned()
            .collect())
    }

    async fn get_by_query(&self, query: &SubscriptionQuery) -> Result<Vec<Subscription>> {
        let guard = self.subscriptions.read().await;
        Ok(match_subscriptions(guard.iter(), query))
    }

    async fn remove(&self, id: &SubscriptionId) -> Result<()> {
        let mut guard = self.subscriptions.write().await;
        let Some(index) = guard.iter().position(|s| &s.id == id) else {
            return Err(RegistryError::NotFound(id.clone()));
        };
        guard.remove(index);
        Ok(())
    }
}
