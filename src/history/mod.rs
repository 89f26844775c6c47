//! History Loader
//!
//! Fetches the initial message window and peer profile for a conversation,
//! then joins the conversation's room on the event channel.

use std::sync::Arc;

use crate::channel::EventChannel;
use crate::error::Result;
use crate::events::OutboundEvent;
use crate::transport::ChatTransport;
use crate::types::HistoryPage;

#[derive(Clone)]
pub struct HistoryLoader {
    transport: Arc<dyn ChatTransport>,
    channel: Arc<dyn EventChannel>,
}

impl HistoryLoader {
    pub fn new(transport: Arc<dyn ChatTransport>, channel: Arc<dyn EventChannel>) -> Self {
        Self { transport, channel }
    }

    /// Loads the conversation's history.
    ///
    /// Failures are returned untouched and never retried here; a
    /// [`SessionExpired`](crate::ChatSyncError::SessionExpired) must reach the
    /// caller as-is. On success a `join` is emitted; if that emit fails the
    /// load still succeeds.
    pub async fn load(&self, conversation_id: &str) -> Result<HistoryPage> {
        tracing::debug!(
            target: "chatsync::history::load",
            "Loading history for conversation {}",
            conversation_id
        );

        let page = match self.transport.history(conversation_id).await {
            Ok(page) => page,
            Err(e) => {
                if e.is_session_expired() {
                    tracing::warn!(
                        target: "chatsync::history::load",
                        "Session expired while loading {}",
                        conversation_id
                    );
                } else {
                    tracing::warn!(
                        target: "chatsync::history::load",
                        "Failed to load history for {}: {}",
                        conversation_id,
                        e
                    );
                }
                return Err(e);
            }
        };

        tracing::info!(
            target: "chatsync::history::load",
            "Loaded {} messages for conversation {}",
            page.messages.len(),
            conversation_id
        );

        if let Err(e) = self.channel.emit(OutboundEvent::join(conversation_id)) {
            tracing::warn!(
                target: "chatsync::history::load",
                "Failed to join conversation {}: {}",
                conversation_id,
                e
            );
        }

        Ok(page)
    }
}
