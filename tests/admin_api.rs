//! Admin API against a running gateway.

use serde_json::{json, Value};

use schema_gateway::config::GatewayConfig;

mod common;
use common::{http_client, start_gateway, start_programmable_backend, Canned};

const KEY: &str = "test-key";

fn config(backend: std::net::SocketAddr) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.backend.address = backend.to_string();
    config.admin.enabled = true;
    config.admin.api_key = KEY.to_string();
    config
}

#[tokio::test]
async fn status_requires_key() {
    let backend = start_programmable_backend(|_| Canned::json(200, "{}")).await;
    let gw = start_gateway(config(backend.addr)).await;
    let client = http_client();

    let res = client.get(gw.url("/admin/status")).send().await.unwrap();
    assert_eq!(res.status(), 401);

    let res = client
        .get(gw.url("/admin/status"))
        .bearer_auth(KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let status: Value = res.json().await.unwrap();
    assert_eq!(status["status"], "operational");
    assert_eq!(status["backend"], backend.addr.to_string());

    assert!(backend.seen().is_empty());
}

#[tokio::test]
async fn copy_moves_resource_through_backend() {
    let backend = start_programmable_backend(|seen| match seen.method.as_str() {
        "GET" => Canned::json(200, r#"{"name":"Ada"}"#),
        _ => Canned::json(201, ""),
    })
    .await;
    let gw = start_gateway(config(backend.addr)).await;

    let res = http_client()
        .post(gw.url("/admin/copy"))
        .bearer_auth(KEY)
        .json(&json!({
            "source": "/people/1",
            "destination": "/archive/people/1",
            "headers": { "x-copied-by": "admin" }
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    let result: Value = res.json().await.unwrap();
    assert_eq!(result["status"], 201);

    let seen = backend.seen();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].uri.path(), "/people/1");
    assert_eq!(seen[1].method, "PUT");
    assert_eq!(seen[1].uri.path(), "/archive/people/1");
    assert_eq!(&seen[1].body[..], br#"{"name":"Ada"}"#);
    assert_eq!(seen[1].headers["x-copied-by"], "admin");

    let res = http_client()
        .get(gw.url("/admin/client"))
        .bearer_auth(KEY)
        .send()
        .await
        .unwrap();
    let client_status: Value = res.json().await.unwrap();
    assert_eq!(client_status["state"], "open");
    assert_eq!(client_status["pending_cycles"], 0);
}

#[tokio::test]
async fn copy_reports_missing_source() {
    let backend = start_programmable_backend(|_| Canned::json(404, "")).await;
    let gw = start_gateway(config(backend.addr)).await;

    let res = http_client()
        .post(gw.url("/admin/copy"))
        .bearer_auth(KEY)
        .json(&json!({ "source": "/nope", "destination": "/dst" }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 502);
    assert_eq!(backend.seen().len(), 1);
}
