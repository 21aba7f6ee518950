//! Runs the JSONB lookups against a live database.
//!
//! `DATABASE_URL=postgres://... cargo test --features postgres -- --ignored`

#![cfg(feature = "postgres")]

mod common;

use std::sync::Arc;

use common::*;
use serde_json::json;
use tokio_postgres::NoTls;
use webhook_registry::{
    NewSubscription, PostgresStore, Registry, RegistryConfig, RetryPolicy, TellOptions,
};

async fn pg_registry(transport: Arc<RecordingTransport>) -> Registry {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let (client, connection) = tokio_postgres::connect(&url, NoTls).await.unwrap();
    tokio::spawn(connection);

    let store = PostgresStore::new(client).await.unwrap();
    Registry::builder(RegistryConfig::new(ORG).with_retry_policy(RetryPolicy::no_retry()))
        .store(Arc::new(store))
        .transport(transport)
        .build()
        .unwrap()
}

/// Names unique to this run so leftover rows from earlier runs never match.
fn unique(name: &str) -> String {
    format!("{name}-{}", uuid::Uuid::new_v4())
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn tag_and_event_lookups_use_jsonb_operators() {
    let registry = pg_registry(RecordingTransport::new()).await;
    let created = unique("order.created");
    let shipped = unique("order.shipped");
    let eu = unique("eu");

    let a = registry
        .add(
            NewSubscription::new("http://hooks.test", "/a", [created.clone()])
                .with_tags([eu.clone()]),
        )
        .await
        .unwrap();
    let b = registry
        .add(NewSubscription::new("http://hooks.test", "/b", [shipped.clone()]))
        .await
        .unwrap();

    let tagged = registry.get_by_tag(&eu).await.unwrap();
    assert_eq!(tagged, vec![a.clone()]);

    let by_events = registry
        .get_by_events(&[shipped.clone(), created.clone()])
        .await
        .unwrap();
    let ids: Vec<_> = by_events.iter().map(|s| s.id.clone()).collect();
    assert_eq!(ids, vec![a.id.clone(), b.id.clone()]);

    assert!(registry.get_by_events(&[unique("nope")]).await.unwrap().is_empty());

    registry.remove(&a.id).await.unwrap();
    registry.remove(&b.id).await.unwrap();
    assert_eq!(registry.get_by_id(&a.id).await.unwrap(), None);
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn tell_matches_stored_subscriptions() {
    let transport = RecordingTransport::new();
    let registry = pg_registry(transport.clone()).await;
    let event = unique("user.created");

    let plain = registry
        .add(NewSubscription::new("http://hooks.test", "/plain", [event.clone()]))
        .await
        .unwrap();
    let scoped = registry
        .add(
            NewSubscription::new("http://hooks.test", "/scoped", [event.clone()])
                .with_scopes(["brand"]),
        )
        .await
        .unwrap();

    let all = registry
        .tell(&event, &json!({}), TellOptions::default())
        .await
        .unwrap();
    assert_eq!(all.subscription_ids, vec![plain.id.clone(), scoped.id.clone()]);

    let only_brand = registry
        .tell(&event, &json!({}), TellOptions::new().with_scopes(["brand"]))
        .await
        .unwrap();
    assert_eq!(only_brand.subscription_ids, vec![scoped.id.clone()]);
    assert_eq!(transport.request_count(), 3);

    registry.remove(&plain.id).await.unwrap();
    registry.remove(&scoped.id).await.unwrap();
}
