//! Per-conversation fan-out for inbound push events.
//!
//! Senders are created lazily on subscribe and removed once every receiver
//! for a conversation has been dropped.

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::events::InboundEvent;

pub const DEFAULT_BUFFER_SIZE: usize = 100;

#[derive(Debug)]
pub struct EventRouter {
    streams: DashMap<String, broadcast::Sender<InboundEvent>>,
    buffer_size: usize,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer(buffer_size: usize) -> Self {
        Self {
            streams: DashMap::new(),
            buffer_size: buffer_size.max(1),
        }
    }

    pub fn subscribe(&self, conversation_id: &str) -> broadcast::Receiver<InboundEvent> {
        self.streams
            .entry(conversation_id.to_string())
            .or_insert_with(|| broadcast::channel(self.buffer_size).0)
            .subscribe()
    }

    /// Delivers `event` to the subscribers of its conversation.
    ///
    /// Returns false when nobody is subscribed to that conversation; the
    /// event is dropped.
    pub fn route(&self, event: InboundEvent) -> bool {
        let conversation_id = event.conversation_id().to_string();
        let Some(sender) = self.streams.get(&conversation_id) else {
            tracing::debug!(
                target: "chatsync::channel::router::route",
                "Dropping {} for conversation {} with no subscriber",
                event.name(),
                conversation_id
            );
            return false;
        };

        if sender.send(event).is_err() && sender.receiver_count() == 0 {
            drop(sender);
            self.streams.remove(&conversation_id);
            return false;
        }
        true
    }

    pub fn is_subscribed(&self, conversation_id: &str) -> bool {
        self.streams
            .get(conversation_id)
            .is_some_and(|sender| sender.receiver_count() > 0)
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}
