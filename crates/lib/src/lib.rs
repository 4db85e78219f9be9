//! WhatsApp webhook relay library: signature verification, inbound parsing, Gemini completion,
//! WhatsApp delivery and the HTTP gateway that ties them together. Used by the `relay` CLI.

pub mod channels;
pub mod config;
pub mod gateway;
pub mod llm;
pub mod signature;
