//! Completion seam and the Gemini client.
//!
//! The gateway only sees [`Completion`]: text in, reply text out, never an error.

mod gemini;

pub use gemini::{GeminiClient, GeminiError, PersonaResponder};

use async_trait::async_trait;

/// Turns a user's message into reply text. Implementations absorb every failure into a fallback
/// string; the caller never sees an error and is never blocked past the configured timeout.
#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(&self, text: &str, sender: &str) -> String;
}
