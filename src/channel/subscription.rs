use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use super::{EventChannel, EventRouter};
use crate::events::{InboundEvent, OutboundEvent};

/// A live subscription to one conversation's push events.
///
/// Created when a conversation opens and torn down when it closes. Teardown
/// emits `leave`, pairing the `join` sent once history has loaded.
pub struct ConversationSubscription {
    conversation_id: String,
    receiver: broadcast::Receiver<InboundEvent>,
    channel: Arc<dyn EventChannel>,
    closed: bool,
}

impl std::fmt::Debug for ConversationSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationSubscription")
            .field("conversation_id", &self.conversation_id)
            .field("closed", &self.closed)
            .finish()
    }
}

impl ConversationSubscription {
    pub fn open(router: &EventRouter, channel: Arc<dyn EventChannel>, conversation_id: &str) -> Self {
        tracing::debug!(
            target: "chatsync::channel::subscription::open",
            "Subscribing to conversation {}",
            conversation_id
        );
        Self {
            conversation_id: conversation_id.to_string(),
            receiver: router.subscribe(conversation_id),
            channel,
            closed: false,
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Next event for this conversation, or `None` once the router side is gone.
    ///
    /// A lagging receiver skips the events it missed.
    pub async fn recv(&mut self) -> Option<InboundEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        target: "chatsync::channel::subscription::recv",
                        "Subscription for {} lagged, skipped {} events",
                        self.conversation_id,
                        skipped
                    );
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Emits `leave` and stops listening. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.channel.emit(OutboundEvent::leave(&self.conversation_id)) {
            tracing::warn!(
                target: "chatsync::channel::subscription::close",
                "Failed to emit leave for {}: {}",
                self.conversation_id,
                e
            );
        }
    }

    /// Stops listening without telling the server.
    pub fn detach(&mut self) {
        self.closed = true;
    }
}

impl Drop for ConversationSubscription {
    fn drop(&mut self) {
        self.close();
    }
}
