//! Integration test: start the gateway on a free port, probe health and the subscribe handshake.
//! Does not reach Gemini or WhatsApp. The server task is left running when the test ends.

use lib::config::{Config, Settings};
use lib::gateway;
use std::time::Duration;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

fn settings(port: u16) -> Settings {
    let mut config = Config::default();
    config.server.port = Some(port);
    config.server.bind = Some("127.0.0.1".to_string());
    config.service_name = Some("relay-test".to_string());
    Settings::resolve_with(&config, |k| match k {
        "WHATSAPP_TOKEN" => Some("wa-token".to_string()),
        "PHONE_NUMBER_ID" => Some("109876543210".to_string()),
        "APP_SECRET" => Some("app-secret".to_string()),
        "WEBHOOK_VERIFY_TOKEN" => Some("verify-me".to_string()),
        "GEMINI_API_KEY" => Some("gem-key".to_string()),
        _ => None,
    })
    .expect("resolve settings")
}

async fn start_gateway() -> String {
    let port = free_port();
    let settings = settings(port);
    tokio::spawn(async move {
        let _ = gateway::run_gateway(settings).await;
    });

    let base = format!("http://127.0.0.1:{}", port);
    let client = reqwest::Client::new();
    for _ in 0..100 {
        if let Ok(resp) = client.get(format!("{}/health", base)).send().await {
            if resp.status().is_success() {
                return base;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("gateway on {} did not come up within 5s", base);
}

#[tokio::test]
async fn health_reports_status_and_config_sanity() {
    let base = start_gateway().await;
    let json: serde_json::Value = reqwest::get(format!("{}/health", base))
        .await
        .expect("GET /health")
        .json()
        .await
        .expect("parse JSON");
    assert_eq!(json.get("status").and_then(|v| v.as_str()), Some("ok"));
    assert_eq!(json.get("service").and_then(|v| v.as_str()), Some("relay-test"));
    assert!(json.get("uptime").and_then(|v| v.as_f64()).is_some());
    assert!(json.get("timestamp").and_then(|v| v.as_str()).is_some());
    assert_eq!(json["config"]["phoneNumberId"].as_str(), Some("configured"));
    assert_eq!(json["config"]["model"].as_str(), Some("gemini-1.5-flash"));

    let root = reqwest::get(format!("{}/", base)).await.expect("GET /");
    assert!(root.status().is_success());
}

#[tokio::test]
async fn subscribe_handshake_echoes_challenge() {
    let base = start_gateway().await;
    let resp = reqwest::get(format!(
        "{}/webhook?hub.mode=subscribe&hub.verify_token=verify-me&hub.challenge=1158201444",
        base
    ))
    .await
    .expect("GET /webhook");
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(resp.text().await.expect("body"), "1158201444");
}

#[tokio::test]
async fn handshake_mismatch_is_forbidden() {
    let base = start_gateway().await;
    let cases = [
        "hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=1",
        "hub.mode=unsubscribe&hub.verify_token=verify-me&hub.challenge=1",
        "hub.verify_token=verify-me&hub.challenge=1",
        "hub.mode=subscribe&hub.challenge=1",
        "hub.mode=subscribe&hub.mode=x&hub.verify_token=verify-me&hub.challenge=1",
        "hub.mode=subscribe&hub.verify_token=verify-me&hub.verify_token=verify-me&hub.challenge=1",
        "",
    ];
    for query in cases {
        let resp = reqwest::get(format!("{}/webhook?{}", base, query))
            .await
            .expect("GET /webhook");
        assert_eq!(resp.status(), reqwest::StatusCode::FORBIDDEN, "query {:?}", query);
    }
}

#[tokio::test]
async fn static_pages_are_served() {
    let base = start_gateway().await;
    for path in ["/privacy", "/terms"] {
        let resp = reqwest::get(format!("{}{}", base, path)).await.expect("GET page");
        assert!(resp.status().is_success());
        let ct = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        assert!(ct.starts_with("text/html"), "{} content-type {}", path, ct);
    }
}
