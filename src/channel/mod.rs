//! Event channel
//!
//! The full-duplex push channel: an [`EventChannel`] sends outbound signals,
//! an [`EventRouter`] fans inbound frames out per conversation, and a
//! [`ConversationSubscription`] scopes one open conversation's listening.

mod router;
mod subscription;
mod websocket;

pub use router::EventRouter;
pub use subscription::ConversationSubscription;
pub use websocket::WsEventChannel;

use crate::error::Result;
use crate::events::OutboundEvent;

/// Fire-and-forget outbound signalling.
///
/// `emit` only queues the event; delivery is not confirmed.
pub trait EventChannel: Send + Sync {
    fn emit(&self, event: OutboundEvent) -> Result<()>;
}
