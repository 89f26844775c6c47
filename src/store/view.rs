use serde::{Deserialize, Serialize};

use crate::types::{Message, PeerProfile, SeenReceipt};

/// A rendering snapshot of the open conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationView {
    pub chat_id: String,
    pub viewer_id: String,
    pub messages: Vec<Message>,
    pub peer: Option<PeerProfile>,
}

/// Per-message layout hints.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRow<'a> {
    pub message: &'a Message,

    /// The viewer sent this message (right-aligned bubble).
    pub from_viewer: bool,

    /// First message of a run from the same sender.
    pub show_avatar: bool,

    /// Receipts are only shown against the latest message.
    pub is_latest: bool,
}

/// The "Seen by" strip under the latest message.
#[derive(Debug, Clone, PartialEq)]
pub struct SeenSummary<'a> {
    pub shown: &'a [SeenReceipt],
    pub overflow: usize,
}

impl ConversationView {
    pub fn message_ids(&self) -> Vec<&str> {
        self.messages.iter().map(|m| m.id.as_str()).collect()
    }

    pub fn rows(&self) -> Vec<MessageRow<'_>> {
        let last = self.messages.len().saturating_sub(1);
        self.messages
            .iter()
            .enumerate()
            .map(|(index, message)| {
                let show_avatar = index == 0
                    || self.messages[index - 1].sender_id() != message.sender_id();
                MessageRow {
                    message,
                    from_viewer: message.sender_id() == self.viewer_id,
                    show_avatar,
                    is_latest: index == last,
                }
            })
            .collect()
    }

    /// Up to `limit` receipts of the latest message and how many were left out.
    pub fn seen_summary(&self, limit: usize) -> Option<SeenSummary<'_>> {
        let latest = self.messages.last()?;
        if latest.seen_by.is_empty() {
            return None;
        }
        let shown = &latest.seen_by[..latest.seen_by.len().min(limit)];
        Some(SeenSummary {
            shown,
            overflow: latest.seen_by.len() - shown.len(),
        })
    }
}
