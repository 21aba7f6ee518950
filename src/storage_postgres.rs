#[cfg(feature = "postgres")]
use async_trait::async_trait;
#[cfg(feature = "postgres")]
use tokio_postgres::{Client, Row};

#[cfg(feature = "postgres")]
use crate::error::{RegistryError, Result};
#[cfg(feature = "postgres")]
use crate::query::{match_subscriptions, SubscriptionQuery};
#[cfg(feature = "postgres")]
use crate::storage::SubscriptionStore;
#[cfg(feature = "postgres")]
use crate::types::{Subscription, SubscriptionId};

/// Subscriptions stored as JSONB documents.
///
/// Reads come back in insertion order (`seq`). Event and tag lookups use
/// JSONB containment operators; the full match predicate for
/// `get_by_query` is applied in process so it is identical to the
/// in-memory store.
#[cfg(feature = "postgres")]
pub struct PostgresStore {
    client: Client,
}

#[cfg(feature = "postgres")]
impl PostgresStore {
    pub async fn new(client: Client) -> Result<Self> {
        client
            .execute(
                "CREATE TABLE IF NOT EXISTS webhook_subscriptions (
                    seq BIGSERIAL,
                    id TEXT PRIMARY KEY,
                    payload JSONB NOT NULL
                )",
                &[],
            )
            .await
            .map_err(store_err)?;

        Ok(Self { client })
    }

    fn decode(rows: Vec<Row>) -> Result<Vec<Subscription>> {
        rows.iter().map(Self::decode_row).collect()
    }

    fn decode_row(row: &Row) -> Result<Subscription> {
        let payload: serde_json::Value = row.try_get(0).map_err(store_err)?;
        serde_json::from_value(payload)
            .map_err(|e| RegistryError::Store(format!("corrupt subscription record: {e}")))
    }
}

#[cfg(feature = "postgres")]
fn store_err(err: tokio_postgres::Error) -> RegistryError {
    RegistryError::Store(err.to_string())
}

#[cfg(feature = "postgres")]
#[async_trait]
impl SubscriptionStore for PostgresStore {
    async fn add(&self, subscription: Subscription) -> Result<Subscription> {
        let payload = serde_json::to_value(&subscription)
            .map_err(|e| RegistryError::Store(e.to_string()))?;
        self.client
            .execute(
                "INSERT INTO webhook_subscriptions (id, payload) VALUES ($1, $2)",
                &[&subscription.id.as_str(), &payload],
            )
            .await
            .map_err(store_err)?;
        Ok(subscription)
    }

    async fn get_all(&self) -> Result<Vec<Subscription>> {
        let rows = self
            .client
            .query("SELECT payload FROM webhook_subscriptions ORDER BY seq", &[])
            .await
            .map_err(store_err)?;
        Self::decode(rows)
    }

    async fn get_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>> {
        let row = self
            .client
            .query_opt(
                "SELECT payload FROM webhook_subscriptions WHERE id = $1",
                &[&id.as_str()],
            )
            .await
            .map_err(store_err)?;
        row.as_ref().map(Self::decode_row).transpose()
    }

    async fn get_by_tag(&self, tag: &str) -> Result<Vec<Subscription>> {
        let rows = self
            .client
            .query(
                "SELECT payload FROM webhook_subscriptions
                 WHERE payload->'tags' ? $1
                 ORDER BY seq",
                &[&tag],
            )
            .await
            .map_err(store_err)?;
        Self::decode(rows)
    }

    async fn get_by_events(&self, events: &[String]) -> Result<Vec<Subscription>> {
        let rows = self
            .client
            .query(
                "SELECT payload FROM webhook_subscriptions
                 WHERE payload->'events' ?| $1
                 ORDER BY seq",
                &[&events],
            )
            .await
            .map_err(store_err)?;
        Self::decode(rows)
    }

    async fn get_by_query(&self, query: &SubscriptionQuery) -> Result<Vec<Subscription>> {
        let candidates = self.get_by_events(&query.events).await?;
        Ok(match_subscriptions(&candidates, query))
    }

    async fn remove(&self, id: &SubscriptionId) -> Result<()> {
        let removed = self
            .client
            .execute(
                "DELETE FROM webhook_subscriptions WHERE id = $1",
                &[&id.as_str()],
            )
            .await
            .map_err(store_err)?;
        if removed == 0 {
            return Err(RegistryError::NotFound(id.clone()));
        }
        Ok(())
    }
}
