//! Messaging channel: inbound webhook payload parsing and outbound WhatsApp delivery.
//!
//! The gateway parses each verified body into an [`InboundEvent`] and answers through a
//! [`Delivery`] implementation.

mod delivery;
mod inbound;
mod whatsapp;

pub use delivery::{Delivery, OutboundReply};
pub use inbound::{parse_event, InboundEvent, MessageKind};
pub use whatsapp::{WhatsAppChannel, WhatsAppError};
