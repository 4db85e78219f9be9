//! Inbound webhook payload: `entry[0].changes[0].value.messages[0]`.
//!
//! Everything on the path is optional in the wire types; [`parse_event`] is the single place that
//! walks it, so any missing level yields `None`.

use serde::Deserialize;

/// Message type as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    /// Anything else (image, audio, sticker, location, ...), with the raw type name.
    Other(String),
}

impl MessageKind {
    fn from_wire(kind: &str) -> Self {
        if kind == "text" {
            MessageKind::Text
        } else {
            MessageKind::Other(kind.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Other(k) => k,
        }
    }
}

/// One inbound message. Lives only for the request that carried it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub sender: String,
    pub kind: MessageKind,
    pub text: Option<String>,
}

impl InboundEvent {
    /// Text body when the message is plain text with a non-empty body.
    pub fn text_body(&self) -> Option<&str> {
        match self.kind {
            MessageKind::Text => self.text.as_deref().filter(|t| !t.is_empty()),
            MessageKind::Other(_) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    entry: Option<Vec<Entry>>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    changes: Option<Vec<Change>>,
}

#[derive(Debug, Deserialize)]
struct Change {
    #[serde(default)]
    value: Option<ChangeValue>,
}

#[derive(Debug, Deserialize)]
struct ChangeValue {
    /// Absent on status callbacks (sent/delivered/read).
    #[serde(default)]
    messages: Option<Vec<WireMessage>>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    from: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    text: Option<WireText>,
}

#[derive(Debug, Deserialize)]
struct WireText {
    #[serde(default)]
    body: Option<String>,
}

/// Parse a verified webhook body into the first message of the first change of the first entry.
/// Returns `None` for non-message events (no `messages` array, or an empty one), for bodies that
/// are not JSON, and when the sender is missing.
pub fn parse_event(body: &[u8]) -> Option<InboundEvent> {
    let payload: WebhookPayload = serde_json::from_slice(body).ok()?;
    let message = payload
        .entry?
        .into_iter()
        .next()?
        .changes?
        .into_iter()
        .next()?
        .value?
        .messages?
        .into_iter()
        .next()?;
    let sender = message.from.filter(|f| !f.is_empty())?;
    Some(InboundEvent {
        sender,
        kind: MessageKind::from_wire(message.kind.as_deref().unwrap_or("")),
        text: message.text.and_then(|t| t.body),
    })
}
