//! Conversation Store
//!
//! The single in-memory log of messages for the open conversation. History
//! batches and push events are merged into one append-only, id-deduplicated
//! sequence; rendering order is insertion order and is never re-sorted.
//!
//! Every successful mutation returns a [`StoreChange`] which the owning
//! session publishes to its [`StoreObserver`]s.

mod view;

pub use view::{ConversationView, MessageRow, SeenSummary};

use std::collections::HashSet;

use crate::types::{DisplayFields, Message, PeerProfile, SeenReceipt};

/// What a store mutation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    /// The log was replaced by a history batch.
    Loaded { count: usize },

    /// A pushed message from another participant was appended.
    AppendedIncoming { message_id: String },

    /// A message sent by the viewer was confirmed. `inserted` is false only
    /// when a message with the same id was already present.
    AppendedLocal { message_id: String, inserted: bool },

    /// A seen receipt was added to the latest message.
    SeenPatched { message_id: String, user_id: String },
}

/// Read-only context handed to observers along with each change.
#[derive(Debug, Clone, Copy)]
pub struct ObserverContext<'a> {
    pub store: &'a ConversationStore,

    /// Whether the viewport was at the bottom before the change was rendered.
    pub at_bottom: bool,
}

/// A component that reacts to store mutations instead of polling the store.
pub trait StoreObserver {
    type Output;

    fn on_store_change(
        &mut self,
        change: &StoreChange,
        ctx: &ObserverContext<'_>,
    ) -> Option<Self::Output>;
}

#[derive(Debug, Clone)]
pub struct ConversationStore {
    conversation_id: String,
    viewer_id: String,
    messages: Vec<Message>,
    ids: HashSet<String>,
    peer: Option<PeerProfile>,
}

impl ConversationStore {
    pub fn new(conversation_id: &str, viewer_id: &str) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            viewer_id: viewer_id.to_string(),
            messages: Vec::new(),
            ids: HashSet::new(),
            peer: None,
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn viewer_id(&self) -> &str {
        &self.viewer_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn latest(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.ids.contains(message_id)
    }

    pub fn peer(&self) -> Option<&PeerProfile> {
        self.peer.as_ref()
    }

    pub fn set_peer(&mut self, peer: Option<PeerProfile>) {
        self.peer = peer;
    }

    /// Replaces the entire log with a history batch.
    ///
    /// Duplicate ids inside the batch keep their first occurrence.
    pub fn load(&mut self, messages: Vec<Message>) -> StoreChange {
        self.messages.clear();
        self.ids.clear();

        for message in messages {
            if self.ids.insert(message.id.clone()) {
                self.messages.push(message);
            } else {
                tracing::debug!(
                    target: "chatsync::store::load",
                    "Dropping duplicate message {} from history batch",
                    message.id
                );
            }
        }

        tracing::debug!(
            target: "chatsync::store::load",
            "Loaded {} messages for conversation {}",
            self.messages.len(),
            self.conversation_id
        );

        StoreChange::Loaded {
            count: self.messages.len(),
        }
    }

    /// Loads a history batch without losing messages the log already holds.
    ///
    /// Held messages missing from the batch (confirmed sends or pushes the
    /// server snapshot predates) are re-appended after it in their previous
    /// order. Messages present in both take the batch's copy.
    pub fn merge_history(&mut self, messages: Vec<Message>) -> StoreChange {
        let previous = std::mem::take(&mut self.messages);
        self.load(messages);

        let mut carried = 0;
        for message in previous {
            if self.ids.insert(message.id.clone()) {
                self.messages.push(message);
                carried += 1;
            }
        }
        if carried > 0 {
            tracing::debug!(
                target: "chatsync::store::merge_history",
                "Kept {} messages missing from the history batch for {}",
                carried,
                self.conversation_id
            );
        }

        StoreChange::Loaded {
            count: self.messages.len(),
        }
    }

    /// Appends a pushed message.
    ///
    /// Returns `None` (no insertion) when the message belongs to another
    /// conversation, was sent by the viewer, or is already present.
    pub fn append_incoming(&mut self, message: Message) -> Option<StoreChange> {
        if message.conversation_id != self.conversation_id {
            tracing::debug!(
                target: "chatsync::store::append_incoming",
                "Ignoring message {} for conversation {} (open: {})",
                message.id,
                message.conversation_id,
                self.conversation_id
            );
            return None;
        }
        if message.sender_id() == self.viewer_id {
            return None;
        }
        if self.ids.contains(&message.id) {
            tracing::debug!(
                target: "chatsync::store::append_incoming",
                "Message {} already present, skipping",
                message.id
            );
            return None;
        }

        let message_id = message.id.clone();
        self.ids.insert(message_id.clone());
        self.messages.push(message);
        Some(StoreChange::AppendedIncoming { message_id })
    }

    /// Appends a message the viewer just sent.
    ///
    /// Locally confirmed messages are novel, so this always reports a change;
    /// an id that is somehow already present is not inserted twice.
    pub fn append_local(&mut self, message: Message) -> StoreChange {
        let message_id = message.id.clone();
        let inserted = self.ids.insert(message_id.clone());
        if inserted {
            self.messages.push(message);
        } else {
            tracing::warn!(
                target: "chatsync::store::append_local",
                "Confirmed message {} is already in the log",
                message_id
            );
        }
        StoreChange::AppendedLocal {
            message_id,
            inserted,
        }
    }

    /// Records that `user_id` has seen the latest message.
    ///
    /// Only the most recently inserted message is patched. No-op when the
    /// log is empty, the user is the viewer, or the user is already listed.
    pub fn patch_seen(&mut self, user_id: &str, display: DisplayFields) -> Option<StoreChange> {
        if user_id == self.viewer_id {
            return None;
        }
        let latest = self.messages.last_mut()?;
        if latest.is_seen_by(user_id) {
            return None;
        }

        latest.seen_by.push(SeenReceipt {
            user_id: user_id.to_string(),
            display,
        });
        Some(StoreChange::SeenPatched {
            message_id: latest.id.clone(),
            user_id: user_id.to_string(),
        })
    }

    /// Drops every message and the peer snapshot.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.ids.clear();
        self.peer = None;
    }

    /// A snapshot of the log for rendering.
    pub fn view(&self) -> ConversationView {
        ConversationView {
            chat_id: self.conversation_id.clone(),
            viewer_id: self.viewer_id.clone(),
            messages: self.messages.clone(),
            peer: self.peer.clone(),
        }
    }
}
