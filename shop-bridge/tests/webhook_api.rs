//! Black-box tests driving the webhook intake path over real HTTP.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::StatusCode;
use reqwest_eventsource::{Event as SseEvent, EventSource};
use shop_bridge::{
    api::handlers::AppState,
    config::AppConfig,
    domain::Session,
    server::{build_router, build_state},
    storage::{memory::MemoryKv, KvStore},
};

async fn spawn_app() -> (String, Arc<MemoryKv>, AppState) {
    let kv = Arc::new(MemoryKv::new());
    let mut config = AppConfig::default();
    config.platform.api_key = "key_test".to_string();

    let state = build_state(config, kv.clone());
    let app = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), kv, state)
}

async fn post_webhook(
    client: &reqwest::Client,
    base: &str,
    topic: &str,
    shop: &str,
    delivery_id: &str,
    body: &str,
) -> reqwest::Response {
    client
        .post(format!("{base}/api/webhooks"))
        .header("X-Shopify-Topic", topic)
        .header("X-Shopify-Shop-Domain", shop)
        .header("X-Shopify-Webhook-Id", delivery_id)
        .body(body.to_string())
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn health_endpoint_reports_healthy() {
    let (base, _kv, _state) = spawn_app().await;
    let response = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn handled_duplicate_and_unknown_deliveries_are_all_acknowledged() {
    let (base, kv, _state) = spawn_app().await;
    let client = reqwest::Client::new();

    let first = post_webhook(
        &client,
        &base,
        "orders/create",
        "a.myshop.example",
        "d1",
        r#"{"id": 1001}"#,
    )
    .await;
    assert_eq!(first.status(), StatusCode::OK);
    assert!(kv.get("webhook_delivery:d1").await.unwrap().is_some());

    // Same delivery id again: acknowledged without reprocessing.
    let replay = post_webhook(
        &client,
        &base,
        "orders/create",
        "a.myshop.example",
        "d1",
        r#"{"id": 1001}"#,
    )
    .await;
    assert_eq!(replay.status(), StatusCode::OK);

    // A topic nobody registered must not trigger redelivery either.
    let unknown = post_webhook(
        &client,
        &base,
        "carts/update",
        "a.myshop.example",
        "d2",
        "{}",
    )
    .await;
    assert_eq!(unknown.status(), StatusCode::OK);
}

#[tokio::test]
async fn shop_redact_purges_every_session_for_the_shop() {
    let (base, kv, state) = spawn_app().await;
    let session = Session::offline("a.myshop.example", "tok", None);
    state.sessions.store(&session).await.unwrap();

    let client = reqwest::Client::new();
    let response = post_webhook(
        &client,
        &base,
        "shop/redact",
        "a.myshop.example",
        "redact-1",
        r#"{"shop_domain": "a.myshop.example"}"#,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(state.sessions.load(&session.id).await.unwrap(), None);
    assert!(state
        .sessions
        .find_by_shop("a.myshop.example")
        .await
        .unwrap()
        .is_empty());
    assert_eq!(kv.get("shop_sessions:a.myshop.example").await.unwrap(), None);
}

#[tokio::test]
async fn deliveries_without_envelope_headers_are_rejected() {
    let (base, _kv, _state) = spawn_app().await;
    let response = reqwest::Client::new()
        .post(format!("{base}/api/webhooks"))
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn kpi_endpoint_requires_a_stored_session() {
    let (base, _kv, _state) = spawn_app().await;
    let response = reqwest::get(format!("{base}/api/shop-kpis?shop=unknown.myshop.example"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let no_shop = reqwest::get(format!("{base}/api/shop-kpis")).await.unwrap();
    assert_eq!(no_shop.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn api_key_endpoint_serves_the_configured_key() {
    let (base, _kv, _state) = spawn_app().await;
    let body: serde_json::Value = reqwest::get(format!("{base}/api/platform/api-key"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["apiKey"], "key_test");
}

#[tokio::test]
async fn entry_route_forwards_install_context_verbatim() {
    let (base, _kv, _state) = spawn_app().await;
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    let response = client
        .get(format!(
            "{base}/?shop=a.myshop.example&host=aG9zdA&embedded=1&hmac=sig"
        ))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_redirection());

    let location = response.headers()["location"].to_str().unwrap();
    assert!(location.starts_with("/embedded?"));
    assert!(location.contains("shop=a.myshop.example"));
    assert!(location.contains("host=aG9zdA"));
    assert!(location.contains("embedded=1"));
    assert!(location.contains("hmac=sig"));
}

#[tokio::test]
async fn operator_stream_reports_handled_webhooks() {
    let (base, _kv, _state) = spawn_app().await;
    let mut stream = EventSource::get(format!("{base}/api/events"));

    // Wait for the stream to open before triggering anything.
    loop {
        match tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap()
        {
            Some(Ok(SseEvent::Open)) => break,
            Some(Ok(_)) => continue,
            other => panic!("unexpected stream item: {other:?}"),
        }
    }

    let client = reqwest::Client::new();
    post_webhook(
        &client,
        &base,
        "orders/create",
        "a.myshop.example",
        "sse-d1",
        "{}",
    )
    .await;

    loop {
        match tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap()
        {
            Some(Ok(SseEvent::Message(message))) => {
                if message.event == "webhook_handled" {
                    assert!(message.data.contains("sse-d1"));
                    break;
                }
            }
            Some(Ok(_)) => continue,
            other => panic!("unexpected stream item: {other:?}"),
        }
    }
}
