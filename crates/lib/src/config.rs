//! Configuration types and loading.
//!
//! Config is loaded from an optional JSON file (e.g. `~/.relay/config.json`) and the environment.
//! Environment variables override the file. The result is resolved once into [`Settings`], which
//! is immutable for the life of the process and passed explicitly to every component.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Phone number id Meta shows in its quick-start samples; never a real sender.
pub const PLACEHOLDER_PHONE_NUMBER_ID: &str = "123456789012345";

const DEFAULT_PORT: u16 = 10000;
const DEFAULT_BIND: &str = "0.0.0.0";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.facebook.com";
const DEFAULT_GRAPH_VERSION: &str = "v18.0";
const DEFAULT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_SERVICE_NAME: &str = "whatsapp-relay";

const DEFAULT_PERSONA_NAME: &str = "Harry";
const DEFAULT_SYSTEM_PROMPT: &str = "Eres Harry, el asistente financiero oficial de IBRICOM/MBV. \
Tu función es procesar alertas financieras, consultas de tesorería y notificaciones bancarias. \
Responde de manera profesional, concisa y directa. \
Si la consulta es sobre finanzas, banca o tesorería, proporciona información útil. \
Si no entiendes la consulta, pide aclaración de forma cortés.";
const DEFAULT_USER_PREFIX: &str = "Consulta del usuario";
const DEFAULT_EMPTY_REPLY: &str =
    "He recibido tu mensaje. ¿En qué puedo ayudarte con tus finanzas hoy?";
const DEFAULT_ERROR_REPLY: &str = "Gracias por tu mensaje. Soy Harry, asistente financiero de IBRICOM. \
En este momento estoy procesando tu consulta. Por favor, indícame si necesitas información sobre \
alertas bancarias, tesorería o reportes financieros.";
const DEFAULT_UNSUPPORTED_REPLY: &str =
    "Por ahora solo proceso mensajes de texto. Pronto tendré más funcionalidades.";

/// Top-level on-disk config. Every field is optional; the environment fills the gaps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub whatsapp: WhatsAppConfig,

    #[serde(default)]
    pub gemini: GeminiConfig,

    #[serde(default)]
    pub persona: PersonaConfig,

    /// Timeout for each upstream HTTP call, in seconds (default 15). Overridden by RELAY_TIMEOUT_SECS.
    pub timeout_secs: Option<u64>,

    /// Name reported by the health endpoint.
    pub service_name: Option<String>,
}

/// Listen settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Listen port (default 10000). Overridden by PORT env.
    pub port: Option<u16>,
    /// Bind address (default "0.0.0.0"; the platform must be able to reach the webhook).
    pub bind: Option<String>,
}

/// Meta WhatsApp Cloud API credentials and endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatsAppConfig {
    /// Bearer token for the Graph API. Overridden by WHATSAPP_TOKEN.
    pub access_token: Option<String>,
    /// Business phone number id that sends replies. Overridden by PHONE_NUMBER_ID.
    pub phone_number_id: Option<String>,
    /// App secret used to sign webhook bodies. Overridden by APP_SECRET.
    pub app_secret: Option<String>,
    /// Token echoed back during the subscribe handshake. Overridden by WEBHOOK_VERIFY_TOKEN.
    pub verify_token: Option<String>,
    /// Graph API root (default https://graph.facebook.com).
    pub api_base_url: Option<String>,
    /// Graph API version segment (default v18.0).
    pub api_version: Option<String>,
}

/// Gemini generateContent settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiConfig {
    /// API key sent as the `key` query parameter. Overridden by GEMINI_API_KEY.
    pub api_key: Option<String>,
    /// Model id (default gemini-1.5-flash). Overridden by GEMINI_MODEL.
    pub model: Option<String>,
    /// API root including version (default https://generativelanguage.googleapis.com/v1beta).
    pub api_base_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
}

/// Persona text. Every string falls back to the built-in persona when unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonaConfig {
    pub name: Option<String>,
    /// Instruction sent ahead of every user message.
    pub system_prompt: Option<String>,
    /// Label placed before the sender id and text, e.g. "User query" → "User query (+34...): hi".
    pub user_prefix: Option<String>,
    /// Sent when the model answers with no candidate text.
    pub empty_reply: Option<String>,
    /// Sent when the completion call fails.
    pub error_reply: Option<String>,
    /// Sent when the inbound message is not plain text.
    pub unsupported_reply: Option<String>,
}

/// Startup configuration failure. Always fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required configuration: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
    #[error("{0} is still the sample placeholder; use the real value from the Meta dashboard")]
    Placeholder(&'static str),
    #[error("{key} must be a number, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },
}

/// Resolved, validated settings. Built once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub bind: String,
    pub whatsapp: WhatsAppSettings,
    pub gemini: GeminiSettings,
    pub persona: Persona,
    pub timeout: Duration,
    pub service_name: String,
}

#[derive(Debug, Clone)]
pub struct WhatsAppSettings {
    pub access_token: String,
    pub phone_number_id: String,
    pub app_secret: String,
    pub verify_token: String,
    pub api_base_url: String,
    pub api_version: String,
}

#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_key: String,
    pub model: String,
    pub api_base_url: String,
    pub generation: GenerationParams,
}

/// Sampling parameters, serialized as Gemini's `generationConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub top_p: f32,
    pub top_k: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_output_tokens: 500,
            top_p: 0.8,
            top_k: 40,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    pub name: String,
    pub system_prompt: String,
    pub user_prefix: String,
    pub empty_reply: String,
    pub error_reply: String,
    pub unsupported_reply: String,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            name: DEFAULT_PERSONA_NAME.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            user_prefix: DEFAULT_USER_PREFIX.to_string(),
            empty_reply: DEFAULT_EMPTY_REPLY.to_string(),
            error_reply: DEFAULT_ERROR_REPLY.to_string(),
            unsupported_reply: DEFAULT_UNSUPPORTED_REPLY.to_string(),
        }
    }
}

impl Persona {
    fn resolve(config: &PersonaConfig) -> Self {
        let d = Self::default();
        Self {
            name: non_empty(config.name.as_ref()).unwrap_or(d.name),
            system_prompt: non_empty(config.system_prompt.as_ref()).unwrap_or(d.system_prompt),
            user_prefix: non_empty(config.user_prefix.as_ref()).unwrap_or(d.user_prefix),
            empty_reply: non_empty(config.empty_reply.as_ref()).unwrap_or(d.empty_reply),
            error_reply: non_empty(config.error_reply.as_ref()).unwrap_or(d.error_reply),
            unsupported_reply: non_empty(config.unsupported_reply.as_ref())
                .unwrap_or(d.unsupported_reply),
        }
    }
}

fn non_empty(s: Option<&String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Env value when set and non-blank, otherwise the config file value when non-blank.
fn pick<F>(env: &F, key: &str, file: Option<&String>) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    env(key)
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| non_empty(file))
}

fn pick_number<F, T>(env: &F, key: &'static str, file: Option<T>) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match env(key).map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) {
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { key, value: v }),
        None => Ok(file),
    }
}

impl Settings {
    /// Resolve from the config file and the process environment.
    pub fn from_env(config: &Config) -> Result<Self, ConfigError> {
        Self::resolve_with(config, |k| std::env::var(k).ok())
    }

    /// Resolve from the config file and an arbitrary env lookup. All missing required keys are
    /// reported at once.
    pub fn resolve_with<F>(config: &Config, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let wa = &config.whatsapp;
        let access_token = pick(&env, "WHATSAPP_TOKEN", wa.access_token.as_ref());
        let phone_number_id = pick(&env, "PHONE_NUMBER_ID", wa.phone_number_id.as_ref());
        let app_secret = pick(&env, "APP_SECRET", wa.app_secret.as_ref());
        let verify_token = pick(&env, "WEBHOOK_VERIFY_TOKEN", wa.verify_token.as_ref());
        let api_key = pick(&env, "GEMINI_API_KEY", config.gemini.api_key.as_ref());

        let mut missing = Vec::new();
        if access_token.is_none() {
            missing.push("WHATSAPP_TOKEN");
        }
        if phone_number_id.is_none() {
            missing.push("PHONE_NUMBER_ID");
        }
        if app_secret.is_none() {
            missing.push("APP_SECRET");
        }
        if verify_token.is_none() {
            missing.push("WEBHOOK_VERIFY_TOKEN");
        }
        if api_key.is_none() {
            missing.push("GEMINI_API_KEY");
        }
        let (
            Some(access_token),
            Some(phone_number_id),
            Some(app_secret),
            Some(verify_token),
            Some(api_key),
        ) = (access_token, phone_number_id, app_secret, verify_token, api_key)
        else {
            return Err(ConfigError::Missing(missing));
        };
        if phone_number_id == PLACEHOLDER_PHONE_NUMBER_ID {
            return Err(ConfigError::Placeholder("PHONE_NUMBER_ID"));
        }

        let port = pick_number(&env, "PORT", config.server.port)?.unwrap_or(DEFAULT_PORT);
        let timeout_secs = pick_number(&env, "RELAY_TIMEOUT_SECS", config.timeout_secs)?
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidNumber {
                key: "RELAY_TIMEOUT_SECS",
                value: "0".to_string(),
            });
        }

        let defaults = GenerationParams::default();
        let g = &config.gemini;
        let generation = GenerationParams {
            temperature: g.temperature.unwrap_or(defaults.temperature),
            max_output_tokens: g.max_output_tokens.unwrap_or(defaults.max_output_tokens),
            top_p: g.top_p.unwrap_or(defaults.top_p),
            top_k: g.top_k.unwrap_or(defaults.top_k),
        };

        Ok(Self {
            port,
            bind: non_empty(config.server.bind.as_ref()).unwrap_or_else(|| DEFAULT_BIND.to_string()),
            whatsapp: WhatsAppSettings {
                access_token,
                phone_number_id,
                app_secret,
                verify_token,
                api_base_url: non_empty(wa.api_base_url.as_ref())
                    .map(|u| u.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| DEFAULT_GRAPH_BASE_URL.to_string()),
                api_version: non_empty(wa.api_version.as_ref())
                    .unwrap_or_else(|| DEFAULT_GRAPH_VERSION.to_string()),
            },
            gemini: GeminiSettings {
                api_key,
                model: pick(&env, "GEMINI_MODEL", g.model.as_ref())
                    .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                api_base_url: non_empty(g.api_base_url.as_ref())
                    .map(|u| u.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
                generation,
            },
            persona: Persona::resolve(&config.persona),
            timeout: Duration::from_secs(timeout_secs),
            service_name: non_empty(config.service_name.as_ref())
                .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
        })
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("RELAY_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".relay").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path, or the default path (RELAY_CONFIG_PATH or ~/.relay/config.json).
/// Missing file => default config. Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using environment only: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
