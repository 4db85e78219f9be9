//! Gemini API client (`models/{model}:generateContent`).
//! The API key travels as the `key` query parameter; the reply is `candidates[0].content.parts[0].text`.

use crate::config::{GeminiSettings, GenerationParams, Persona};
use crate::llm::Completion;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Client for the Gemini generateContent endpoint.
#[derive(Clone)]
pub struct GeminiClient {
    base_url: String,
    api_key: String,
    model: String,
    generation: GenerationParams,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    #[error("gemini request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("gemini api error: {status} {message}")]
    Api { status: u16, message: String },
    #[error("gemini response had no candidate text")]
    EmptyResponse,
}

impl GeminiError {
    /// HTTP status, when the failure carried one.
    pub fn status(&self) -> Option<u16> {
        match self {
            GeminiError::Request(e) => e.status().map(|s| s.as_u16()),
            GeminiError::Api { status, .. } => Some(*status),
            GeminiError::EmptyResponse => None,
        }
    }
}

impl GeminiClient {
    /// Build a client whose every request is bounded by `timeout`.
    pub fn new(settings: &GeminiSettings, timeout: Duration) -> Result<Self, GeminiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            generation: settings.generation,
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// POST models/{model}:generateContent — one attempt, no retry.
    pub async fn generate(&self, system_prompt: &str, user_text: &str) -> Result<String, GeminiError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = build_request(system_prompt, user_text, self.generation);
        let res = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .ok()
                .and_then(|b| b.error)
                .and_then(|e| e.message)
                .unwrap_or(body);
            return Err(GeminiError::Api {
                status: status.as_u16(),
                message,
            });
        }
        let data: GenerateResponse = res.json().await?;
        data.first_text().ok_or(GeminiError::EmptyResponse)
    }
}

fn build_request<'a>(
    system_prompt: &'a str,
    user_text: &'a str,
    generation: GenerationParams,
) -> GenerateRequest<'a> {
    GenerateRequest {
        contents: vec![RequestContent {
            role: "user",
            parts: vec![RequestPart { text: system_prompt }, RequestPart { text: user_text }],
        }],
        generation_config: generation,
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationParams,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'a str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Option<Vec<CandidatePart>>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResponse {
    /// Text of the first part of the first candidate, if present and not blank.
    fn first_text(self) -> Option<String> {
        self.candidates?
            .into_iter()
            .next()?
            .content?
            .parts?
            .into_iter()
            .next()?
            .text
            .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

/// Gemini client plus persona text. Implements [`Completion`]: an empty answer becomes the
/// persona's `empty_reply`, any other failure is logged and becomes `error_reply`.
pub struct PersonaResponder {
    client: GeminiClient,
    persona: Persona,
}

impl PersonaResponder {
    pub fn new(client: GeminiClient, persona: Persona) -> Self {
        Self { client, persona }
    }

    fn user_line(&self, text: &str, sender: &str) -> String {
        format!("{} ({}): {}", self.persona.user_prefix, sender, text)
    }
}

#[async_trait]
impl Completion for PersonaResponder {
    async fn complete(&self, text: &str, sender: &str) -> String {
        let user_line = self.user_line(text, sender);
        match self
            .client
            .generate(&self.persona.system_prompt, &user_line)
            .await
        {
            Ok(reply) => reply,
            Err(GeminiError::EmptyResponse) => {
                log::warn!("gemini returned no candidate text (model {})", self.client.model());
                self.persona.empty_reply.clone()
            }
            Err(e) => {
                log::error!(
                    "gemini error: status={:?} message={} model={}",
                    e.status(),
                    e,
                    self.client.model()
                );
                self.persona.error_reply.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_body_carries_persona_then_user_text() {
        let body = build_request("be brief", "Consulta (+34600): hola", GenerationParams::default());
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(
            value,
            json!({
                "contents": [{
                    "role": "user",
                    "parts": [{ "text": "be brief" }, { "text": "Consulta (+34600): hola" }]
                }],
                "generationConfig": {
                    "temperature": 0.3f32,
                    "maxOutputTokens": 500,
                    "topP": 0.8f32,
                    "topK": 40
                }
            })
        );
    }

    #[test]
    fn first_candidate_text_is_extracted() {
        let data: GenerateResponse = serde_json::from_value(json!({
            "candidates": [
                { "content": { "parts": [{ "text": "first" }, { "text": "second" }], "role": "model" } },
                { "content": { "parts": [{ "text": "other" }] } }
            ]
        }))
        .unwrap();
        assert_eq!(data.first_text().as_deref(), Some("first"));
    }

    #[test]
    fn missing_or_blank_shapes_yield_none() {
        let shapes = [
            json!({}),
            json!({ "candidates": [] }),
            json!({ "candidates": [{}] }),
            json!({ "candidates": [{ "content": {} }] }),
            json!({ "candidates": [{ "content": { "parts": [] } }] }),
            json!({ "candidates": [{ "content": { "parts": [{}] } }] }),
            json!({ "candidates": [{ "content": { "parts": [{ "text": "  " }] } }] }),
            json!({ "candidates": null, "promptFeedback": { "blockReason": "SAFETY" } }),
            json!({ "candidates": [{ "content": null }] }),
            json!({ "candidates": [{ "content": { "parts": null } }] }),
            json!({ "candidates": [{ "content": { "parts": [{ "text": null }] } }] }),
        ];
        for shape in shapes {
            let data: GenerateResponse = serde_json::from_value(shape.clone()).unwrap();
            assert!(data.first_text().is_none(), "expected none for {}", shape);
        }
    }

    #[test]
    fn user_line_includes_sender() {
        let settings = GeminiSettings {
            api_key: "k".into(),
            model: "m".into(),
            api_base_url: "http://127.0.0.1:1".into(),
            generation: GenerationParams::default(),
        };
        let client = GeminiClient::new(&settings, Duration::from_secs(1)).unwrap();
        let mut persona = Persona::default();
        persona.user_prefix = "User query".into();
        let responder = PersonaResponder::new(client, persona);
        assert_eq!(responder.user_line("hi", "+34600"), "User query (+34600): hi");
    }
}
