//! Gateway: the HTTP surface of the relay.
//!
//! One port serves the webhook handshake (GET) and event receipt (POST), plus health and the
//! static privacy/terms pages. Verified events are acknowledged at once and processed on a
//! detached task.

mod relay;
mod server;

pub use relay::{handle_event, spawn_processing, EventOutcome};
pub use server::{router, run_gateway, GatewayState, HEALTH_PATH, WEBHOOK_PATH};
