//! Gateway HTTP server: webhook handshake and receipt, health, static pages.

use crate::channels::{Delivery, WhatsAppChannel};
use crate::config::{Settings, PLACEHOLDER_PHONE_NUMBER_ID};
use crate::gateway::relay::spawn_processing;
use crate::llm::{Completion, GeminiClient, PersonaResponder};
use crate::signature::{verify_signature, SIGNATURE_HEADER};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

pub const WEBHOOK_PATH: &str = "/webhook";
pub const HEALTH_PATH: &str = "/health";

const PRIVACY_HTML: &str = include_str!("../../static/privacy.html");
const TERMS_HTML: &str = include_str!("../../static/terms.html");

/// Shared state for request handlers. Everything inside is read-only after startup.
#[derive(Clone)]
pub struct GatewayState {
    pub settings: Arc<Settings>,
    pub completion: Arc<dyn Completion>,
    pub delivery: Arc<dyn Delivery>,
    pub started_at: Instant,
}

impl GatewayState {
    pub fn new(
        settings: Arc<Settings>,
        completion: Arc<dyn Completion>,
        delivery: Arc<dyn Delivery>,
    ) -> Self {
        Self {
            settings,
            completion,
            delivery,
            started_at: Instant::now(),
        }
    }

    /// State wired to the real Gemini and WhatsApp clients.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let gemini = GeminiClient::new(&settings.gemini, settings.timeout)
            .context("building gemini client")?;
        let whatsapp = WhatsAppChannel::new(&settings.whatsapp, settings.timeout)
            .context("building whatsapp client")?;
        let responder = PersonaResponder::new(gemini, settings.persona.clone());
        Ok(Self::new(
            Arc::new(settings),
            Arc::new(responder),
            Arc::new(whatsapp),
        ))
    }
}

/// All routes served by the gateway.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route(HEALTH_PATH, get(health_http))
        .route(WEBHOOK_PATH, get(verify_webhook).post(receive_webhook))
        .route("/privacy", get(|| async { Html(PRIVACY_HTML) }))
        .route("/terms", get(|| async { Html(TERMS_HTML) }))
        .with_state(state)
}

/// Run the gateway on settings.bind:settings.port until SIGINT/SIGTERM.
pub async fn run_gateway(settings: Settings) -> Result<()> {
    let bind_addr = format!("{}:{}", settings.bind, settings.port);
    let state = GatewayState::from_settings(settings)?;
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!(
        "gateway listening on {} (webhook {}, health {})",
        bind_addr,
        WEBHOOK_PATH,
        HEALTH_PATH
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

#[derive(Debug, Deserialize)]
struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

/// GET /webhook — subscription handshake. Echoes hub.challenge when mode is "subscribe" and the
/// token matches; 403 otherwise, including for a query string that does not parse.
async fn verify_webhook(
    State(state): State<GatewayState>,
    query: Option<Query<VerifyQuery>>,
) -> Response {
    let Some(Query(query)) = query else {
        log::warn!("webhook verification failed: malformed query string");
        return StatusCode::FORBIDDEN.into_response();
    };
    let token_preview: String = query
        .verify_token
        .as_deref()
        .unwrap_or("")
        .chars()
        .take(10)
        .collect();
    log::info!(
        "webhook verification: mode={:?} token={}...",
        query.mode,
        token_preview
    );

    let subscribed = query.mode.as_deref() == Some("subscribe");
    let token_ok =
        query.verify_token.as_deref() == Some(state.settings.whatsapp.verify_token.as_str());
    if subscribed && token_ok {
        log::info!("webhook verified");
        (StatusCode::OK, query.challenge.unwrap_or_default()).into_response()
    } else {
        log::warn!("webhook verification failed");
        StatusCode::FORBIDDEN.into_response()
    }
}

/// POST /webhook — verify the signature over the raw body, acknowledge, then process detached.
async fn receive_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    if !verify_signature(
        Some(state.settings.whatsapp.app_secret.as_str()),
        &body,
        signature,
    ) {
        log::warn!("webhook rejected: invalid or missing {}", SIGNATURE_HEADER);
        return StatusCode::FORBIDDEN;
    }
    spawn_processing(state, body);
    StatusCode::OK
}

/// GET /health — status, uptime and a config sanity summary (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    let phone = if state.settings.whatsapp.phone_number_id == PLACEHOLDER_PHONE_NUMBER_ID {
        "placeholder"
    } else {
        "configured"
    };
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime": state.started_at.elapsed().as_secs_f64(),
        "version": env!("CARGO_PKG_VERSION"),
        "service": state.settings.service_name,
        "config": {
            "phoneNumberId": phone,
            "model": state.settings.gemini.model,
        },
    }))
}
