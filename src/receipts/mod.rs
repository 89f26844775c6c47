//! Read Receipt Aggregator
//!
//! Merges inbound seen-state into the conversation store and decides when the
//! viewer's own seen signal goes out.

use crate::events::{OutboundEvent, SeenEvent};
use crate::store::{ConversationStore, ObserverContext, StoreChange, StoreObserver};

#[derive(Debug, Clone)]
pub struct ReadReceiptAggregator {
    conversation_id: String,
    viewer_id: String,
    /// Latest message the viewer's seen signal was emitted for.
    last_signalled: Option<String>,
}

impl ReadReceiptAggregator {
    pub fn new(conversation_id: &str, viewer_id: &str) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            viewer_id: viewer_id.to_string(),
            last_signalled: None,
        }
    }

    /// Applies an inbound seen event to the store.
    ///
    /// Events from the viewer or for another conversation are dropped.
    pub fn on_seen_event(
        &self,
        event: SeenEvent,
        store: &mut ConversationStore,
    ) -> Option<StoreChange> {
        if event.user_id == self.viewer_id {
            return None;
        }
        if event.conversation_id != self.conversation_id {
            tracing::debug!(
                target: "chatsync::receipts::on_seen_event",
                "Dropping seen event for conversation {} (open: {})",
                event.conversation_id,
                self.conversation_id
            );
            return None;
        }
        store.patch_seen(&event.user_id, event.display)
    }

    pub fn last_signalled(&self) -> Option<&str> {
        self.last_signalled.as_deref()
    }

    pub fn reset(&mut self) {
        self.last_signalled = None;
    }

    fn should_signal(&self, store: &ConversationStore, at_bottom: bool) -> Option<String> {
        let latest = store.latest()?;
        if latest.sender_id() == self.viewer_id || latest.is_seen_by(&self.viewer_id) {
            return None;
        }
        if !at_bottom {
            return None;
        }
        if self.last_signalled.as_deref() == Some(latest.id.as_str()) {
            return None;
        }
        Some(latest.id.clone())
    }
}

impl ReadReceiptAggregator {
    /// Emits the viewer's seen signal if the latest message calls for one.
    ///
    /// Also used when the viewport reaches the bottom without a store change.
    pub fn evaluate(&mut self, store: &ConversationStore, at_bottom: bool) -> Option<OutboundEvent> {
        let message_id = self.should_signal(store, at_bottom)?;
        tracing::debug!(
            target: "chatsync::receipts::evaluate",
            "Signalling seen for message {} in {}",
            message_id,
            self.conversation_id
        );
        self.last_signalled = Some(message_id);
        Some(OutboundEvent::seen(&self.conversation_id, &self.viewer_id))
    }
}

impl StoreObserver for ReadReceiptAggregator {
    type Output = OutboundEvent;

    fn on_store_change(
        &mut self,
        _change: &StoreChange,
        ctx: &ObserverContext<'_>,
    ) -> Option<OutboundEvent> {
        self.evaluate(ctx.store, ctx.at_bottom)
    }
}
