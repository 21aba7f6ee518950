use webhook_registry::{build_signature_headers, verify_webhook_request};

fn main() {
    let url = "http://localhost:8080/webhooks/orders";
    let body = r#"{"event":"order.created","webhookId":"abc","data":{"orderId":123}}"#;
    let secret = "9b1f0c3e5d7a2b4c6e8f0a1b3c5d7e9f1a2b3c4d";

    // What the sender would attach.
    let sent = build_signature_headers("acme", url, body, "1700000000000", secret);

    let result = verify_webhook_request(
        sent.iter(),
        "acme",
        url,
        body,
        secret.as_bytes(),
        5 * 60 * 1000,
        1_700_000_200_000,
    );
    println!("verification: {result:?}");
}
