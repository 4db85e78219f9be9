//! Post-acknowledgment processing of one verified webhook body:
//! extract → type-gate → complete → deliver.

use crate::channels::{parse_event, OutboundReply};
use crate::gateway::server::GatewayState;
use axum::body::Bytes;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tokio::task::JoinHandle;

/// What happened to one inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Not a message (status callback, empty or unrecognized payload).
    Ignored,
    /// Non-text message; the unsupported-type notice was sent (or not).
    Unsupported { delivered: bool },
    /// Text message answered with the completion (or its fallback).
    Replied { delivered: bool },
}

/// Run every step after acknowledgment for one verified body.
pub async fn handle_event(state: &GatewayState, body: &[u8]) -> EventOutcome {
    let Some(event) = parse_event(body) else {
        log::debug!("webhook: no message in payload, ignoring");
        return EventOutcome::Ignored;
    };
    log::info!("message received from {}: {}", event.sender, event.kind.as_str());

    let Some(text) = event.text_body() else {
        log::info!("unsupported message type from {}: {}", event.sender, event.kind.as_str());
        let notice = OutboundReply {
            to: event.sender.clone(),
            body: state.settings.persona.unsupported_reply.clone(),
        };
        let delivered = state.delivery.deliver(&notice).await;
        return EventOutcome::Unsupported { delivered };
    };
    log::debug!("content: {}", preview(text, 50));

    let reply = OutboundReply {
        to: event.sender.clone(),
        body: state.completion.complete(text, &event.sender).await,
    };
    let delivered = state.delivery.deliver(&reply).await;
    if delivered {
        log::info!("conversation with {} completed", event.sender);
    } else {
        log::error!("failed to deliver reply to {}", event.sender);
    }
    EventOutcome::Replied { delivered }
}

/// Detach processing from the HTTP response. Panics inside are caught and logged here, so they
/// cannot reach the already-sent acknowledgment or the server.
pub fn spawn_processing(state: GatewayState, body: Bytes) -> JoinHandle<()> {
    tokio::spawn(async move {
        match AssertUnwindSafe(handle_event(&state, &body)).catch_unwind().await {
            Ok(outcome) => log::debug!("webhook processed: {:?}", outcome),
            Err(panic) => log::error!("webhook processing panicked: {}", panic_message(&*panic)),
        }
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// First `max` characters of `text`, with "..." when truncated.
fn preview(text: &str, max: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
