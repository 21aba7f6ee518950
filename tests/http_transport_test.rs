//! End-to-end deliveries over real HTTP against a wiremock server.

#![cfg(feature = "http")]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use webhook_registry::{
    verify_webhook_request, DeliveryError, HttpTransport, NewSubscription, Registry,
    RegistryConfig, RetryPolicy, TellOptions,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn registry(max_retries: u32) -> Registry {
    let policy = RetryPolicy::default()
        .with_max_retries(max_retries)
        .with_backoff(1, 10, 0)
        .with_timeout(Duration::from_secs(2));
    Registry::builder(RegistryConfig::new("acme").with_retry_policy(policy))
        .transport(Arc::new(HttpTransport::new()))
        .build()
        .unwrap()
}

#[tokio::test]
async fn delivers_signed_post() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hooks/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_string("thanks"))
        .expect(1)
        .mount(&server)
        .await;

    let registry = registry(0);
    let sub = registry
        .add(NewSubscription::new(server.uri(), "/hooks/orders", ["order.created"]))
        .await
        .unwrap();

    let result = registry
        .tell("order.created", &json!({"id": 42}), TellOptions::default())
        .await
        .unwrap();

    assert_eq!(result.matched_count, 1);
    let response = result.outcomes[0].response().unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body, "thanks");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    let body = String::from_utf8(request.body.clone()).unwrap();
    let sent: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(sent["event"], "order.created");
    assert_eq!(sent["webhookId"], sub.id.as_str());
    assert_eq!(sent["data"], json!({"id": 42}));

    let headers: Vec<(String, String)> = request
        .headers
        .iter()
        .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap().to_string()))
        .collect();
    let now_ms = chrono::Utc::now().timestamp_millis();
    let verified = verify_webhook_request(
        headers.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        "acme",
        &sub.target_url(),
        &body,
        sub.signature_token.as_bytes(),
        60_000,
        now_ms,
    );
    assert_eq!(verified, Ok(()));
}

#[tokio::test]
async fn retries_server_errors_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let registry = registry(3);
    registry
        .add(NewSubscription::new(server.uri(), "/flaky", ["ping"]))
        .await
        .unwrap();

    let result = registry
        .tell("ping", &json!({}), TellOptions::default())
        .await
        .unwrap();
    assert!(result.outcomes[0].is_success());
}

#[tokio::test]
async fn gives_up_after_max_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let registry = registry(2);
    registry
        .add(NewSubscription::new(server.uri(), "/broken", ["ping"]))
        .await
        .unwrap();

    let result = registry
        .tell("ping", &json!({}), TellOptions::default())
        .await
        .unwrap();
    assert_eq!(
        result.outcomes[0].error(),
        Some(&DeliveryError::MaxRetriesExceeded {
            attempts: 3,
            last: Box::new(DeliveryError::Status(500)),
        })
    );
}

#[tokio::test]
async fn unreachable_target_does_not_affect_others() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    // Bind then drop a listener so the port is known to be closed.
    let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let closed_base = format!("http://{}", closed.local_addr().unwrap());
    drop(closed);

    let registry = registry(1);
    registry
        .add(NewSubscription::new(server.uri(), "/one", ["ping"]))
        .await
        .unwrap();
    let dead = registry
        .add(NewSubscription::new(closed_base, "/gone", ["ping"]))
        .await
        .unwrap();
    registry
        .add(NewSubscription::new(server.uri(), "/two", ["ping"]))
        .await
        .unwrap();

    let result = registry
        .tell("ping", &json!({}), TellOptions::default())
        .await
        .unwrap();

    assert_eq!(result.outcomes.len(), 3);
    let failures: Vec<_> = result.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].subscription_id, dead.id);
    assert!(result.outcomes[0].is_success());
    assert!(result.outcomes[2].is_success());
}
