use serde_json::json;
use webhook_registry::{
    DeliveryEventKind, NewSubscription, Registry, RegistryConfig, RetryPolicy, TellOptions,
};

#[tokio::main]
async fn main() -> webhook_registry::Result<()> {
    tracing_subscriber::fmt::init();

    let config = RegistryConfig::new("acme").with_retry_policy(RetryPolicy::default().with_max_retries(3));
    let registry = Registry::new(config)?;

    registry.on(DeliveryEventKind::Error, |event| {
        eprintln!("{}", event.msg());
    });

    let subscription = registry
        .add(
            NewSubscription::new("http://localhost:8080", "/webhooks/orders", ["order.created"])
                .with_tags(["eu"])
                .with_scopes(["brand"]),
        )
        .await?;
    println!("registered {} (secret {})", subscription.id, subscription.signature_token);

    let result = registry
        .tell(
            "order.created",
            &json!({ "orderId": 123 }),
            TellOptions::new().with_tags(["eu"]).with_scopes(["brand"]),
        )
        .await?;
    println!("{}: {} failed", result.msg, result.failures().count());

    Ok(())
}
