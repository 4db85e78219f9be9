//! Outbound delivery seam.

use async_trait::async_trait;

/// A reply addressed to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundReply {
    pub to: String,
    pub body: String,
}

/// Sends one text message. Exactly one attempt; returns whether the provider accepted it.
/// Failures are logged by the implementation and never raised.
#[async_trait]
pub trait Delivery: Send + Sync {
    async fn send_text(&self, to: &str, body: &str) -> bool;

    async fn deliver(&self, reply: &OutboundReply) -> bool {
        self.send_text(&reply.to, &reply.body).await
    }
}
