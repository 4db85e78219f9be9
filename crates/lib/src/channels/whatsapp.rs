//! WhatsApp Cloud API channel: send text messages via the Graph API `/{phone_number_id}/messages`.

use crate::channels::delivery::{Delivery, OutboundReply};
use crate::config::WhatsAppSettings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum WhatsAppError {
    #[error("whatsapp request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("whatsapp api error: {status} (code {code:?}) {message}")]
    Api {
        status: u16,
        code: Option<i64>,
        message: String,
    },
}

impl WhatsAppError {
    /// HTTP status, when the failure carried one.
    pub fn status(&self) -> Option<u16> {
        match self {
            WhatsAppError::Request(e) => e.status().map(|s| s.as_u16()),
            WhatsAppError::Api { status, .. } => Some(*status),
        }
    }
}

/// Sends replies on behalf of one business phone number.
#[derive(Clone)]
pub struct WhatsAppChannel {
    messages_url: String,
    phone_number_id: String,
    access_token: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct SendTextRequest<'a> {
    messaging_product: &'static str,
    recipient_type: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    typ: &'static str,
    text: SendTextBody<'a>,
}

#[derive(Debug, Serialize)]
struct SendTextBody<'a> {
    body: &'a str,
}

impl<'a> SendTextRequest<'a> {
    fn new(reply: &'a OutboundReply) -> Self {
        Self {
            messaging_product: "whatsapp",
            recipient_type: "individual",
            to: &reply.to,
            typ: "text",
            text: SendTextBody { body: &reply.body },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    error: Option<GraphError>,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

impl WhatsAppChannel {
    /// Build a channel whose every request is bounded by `timeout`.
    pub fn new(settings: &WhatsAppSettings, timeout: Duration) -> Result<Self, WhatsAppError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            messages_url: format!(
                "{}/{}/{}/messages",
                settings.api_base_url.trim_end_matches('/'),
                settings.api_version,
                settings.phone_number_id
            ),
            phone_number_id: settings.phone_number_id.clone(),
            access_token: settings.access_token.clone(),
            client,
        })
    }

    /// POST one text message. Returns the provider message id when the response carries one.
    pub async fn send(&self, reply: &OutboundReply) -> Result<Option<String>, WhatsAppError> {
        let res = self
            .client
            .post(&self.messages_url)
            .bearer_auth(&self.access_token)
            .json(&SendTextRequest::new(reply))
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<GraphErrorBody>(&body)
                .ok()
                .and_then(|b| b.error);
            let code = detail.as_ref().and_then(|d| d.code);
            let message = detail.and_then(|d| d.message).unwrap_or(body);
            return Err(WhatsAppError::Api {
                status: status.as_u16(),
                code,
                message,
            });
        }
        let data: SendResponse = res.json().await.unwrap_or_default();
        Ok(data.messages.into_iter().next().map(|m| m.id))
    }
}

#[async_trait]
impl Delivery for WhatsAppChannel {
    async fn send_text(&self, to: &str, body: &str) -> bool {
        let reply = OutboundReply {
            to: to.to_string(),
            body: body.to_string(),
        };
        match self.send(&reply).await {
            Ok(id) => {
                log::info!(
                    "whatsapp message sent to {}: {}",
                    to,
                    id.as_deref().unwrap_or("(no id)")
                );
                true
            }
            Err(WhatsAppError::Api {
                status,
                code,
                message,
            }) => {
                log::error!(
                    "whatsapp api error: status={} code={:?} message={} phone_number_id={}",
                    status,
                    code,
                    message,
                    self.phone_number_id
                );
                false
            }
            Err(e) => {
                log::error!(
                    "whatsapp send failed: status={:?} message={} phone_number_id={}",
                    e.status(),
                    e,
                    self.phone_number_id
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, Json, Router};
    use serde_json::{json, Value};

    fn settings() -> WhatsAppSettings {
        settings_at("https://graph.example.test/")
    }

    fn settings_at(base: &str) -> WhatsAppSettings {
        WhatsAppSettings {
            access_token: "token".into(),
            phone_number_id: "109876543210".into(),
            app_secret: "secret".into(),
            verify_token: "verify".into(),
            api_base_url: base.into(),
            api_version: "v18.0".into(),
        }
    }

    /// Local Graph stand-in that answers every request with `status` and `body`.
    async fn graph_answering(status: StatusCode, body: Value) -> String {
        let app = Router::new().fallback(move || {
            let body = body.clone();
            async move { (status, Json(body)) }
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{}", addr)
    }

    fn reply() -> OutboundReply {
        OutboundReply {
            to: "34600111222".into(),
            body: "hola".into(),
        }
    }

    #[test]
    fn messages_url_is_built_from_settings() {
        let ch = WhatsAppChannel::new(&settings(), Duration::from_secs(1)).unwrap();
        assert_eq!(
            ch.messages_url,
            "https://graph.example.test/v18.0/109876543210/messages"
        );
    }

    #[test]
    fn send_body_matches_cloud_api_shape() {
        let reply = OutboundReply {
            to: "34600111222".into(),
            body: "hola".into(),
        };
        let value = serde_json::to_value(SendTextRequest::new(&reply)).unwrap();
        assert_eq!(
            value,
            json!({
                "messaging_product": "whatsapp",
                "recipient_type": "individual",
                "to": "34600111222",
                "type": "text",
                "text": { "body": "hola" }
            })
        );
    }

    #[test]
    fn graph_error_body_is_parsed() {
        let b: GraphErrorBody = serde_json::from_str(
            r#"{"error":{"message":"Invalid OAuth access token","type":"OAuthException","code":190}}"#,
        )
        .unwrap();
        let e = b.error.unwrap();
        assert_eq!(e.code, Some(190));
        assert_eq!(e.message.as_deref(), Some("Invalid OAuth access token"));
    }

    #[tokio::test]
    async fn accepted_send_returns_message_id() {
        let base = graph_answering(
            StatusCode::OK,
            json!({ "messaging_product": "whatsapp", "messages": [{ "id": "wamid.OK" }] }),
        )
        .await;
        let ch = WhatsAppChannel::new(&settings_at(&base), Duration::from_secs(5)).unwrap();
        assert_eq!(ch.send(&reply()).await.unwrap().as_deref(), Some("wamid.OK"));
        assert!(ch.send_text("34600111222", "hola").await);
    }

    #[tokio::test]
    async fn api_rejection_is_reported_and_send_text_is_false() {
        let base = graph_answering(
            StatusCode::UNAUTHORIZED,
            json!({ "error": {
                "message": "Invalid OAuth access token",
                "type": "OAuthException",
                "code": 190
            } }),
        )
        .await;
        let ch = WhatsAppChannel::new(&settings_at(&base), Duration::from_secs(5)).unwrap();

        match ch.send(&reply()).await {
            Err(WhatsAppError::Api {
                status,
                code,
                message,
            }) => {
                assert_eq!(status, 401);
                assert_eq!(code, Some(190));
                assert_eq!(message, "Invalid OAuth access token");
            }
            other => panic!("expected Api error, got {:?}", other),
        }
        assert!(!ch.send_text("34600111222", "hola").await);
    }

    #[tokio::test]
    async fn unreachable_graph_makes_send_text_false() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let base = format!("http://127.0.0.1:{}", port);
        let ch = WhatsAppChannel::new(&settings_at(&base), Duration::from_secs(2)).unwrap();
        assert!(matches!(
            ch.send(&reply()).await,
            Err(WhatsAppError::Request(_))
        ));
        assert!(!ch.send_text("34600111222", "hola").await);
    }
}
