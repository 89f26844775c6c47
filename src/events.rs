//! Push-event payloads exchanged over the event channel.
//!
//! Frames are JSON objects of the form `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};

use crate::types::{DisplayFields, Message};

/// Payload carrying only a conversation id (typing and room signals).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRef {
    #[serde(rename = "chatId", alias = "conversationId")]
    pub conversation_id: String,
}

impl ConversationRef {
    pub fn new(conversation_id: &str) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
        }
    }
}

/// Inbound notice that a participant has seen the conversation.
///
/// Consumed once into the conversation store and then discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenEvent {
    #[serde(rename = "chatId", alias = "conversationId")]
    pub conversation_id: String,

    #[serde(rename = "userId")]
    pub user_id: String,

    #[serde(flatten)]
    pub display: DisplayFields,
}

/// Outbound seen signal for the viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenSignal {
    #[serde(rename = "chatId", alias = "conversationId")]
    pub conversation_id: String,

    #[serde(rename = "userId")]
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum InboundEvent {
    NewMessage(Message),
    TypingStart(ConversationRef),
    TypingStop(ConversationRef),
    SeenUpdate(SeenEvent),
}

impl InboundEvent {
    pub fn conversation_id(&self) -> &str {
        match self {
            InboundEvent::NewMessage(message) => &message.conversation_id,
            InboundEvent::TypingStart(r) | InboundEvent::TypingStop(r) => &r.conversation_id,
            InboundEvent::SeenUpdate(seen) => &seen.conversation_id,
        }
    }

    /// Events that mutate the conversation store and therefore must wait for
    /// history to be loaded before they are applied.
    pub fn touches_store(&self) -> bool {
        matches!(
            self,
            InboundEvent::NewMessage(_) | InboundEvent::SeenUpdate(_)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            InboundEvent::NewMessage(_) => "new-message",
            InboundEvent::TypingStart(_) => "typing-start",
            InboundEvent::TypingStop(_) => "typing-stop",
            InboundEvent::SeenUpdate(_) => "seen-update",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum OutboundEvent {
    Join(ConversationRef),
    Leave(ConversationRef),
    TypingStart(ConversationRef),
    TypingStop(ConversationRef),
    Seen(SeenSignal),
}

impl OutboundEvent {
    pub fn join(conversation_id: &str) -> Self {
        OutboundEvent::Join(ConversationRef::new(conversation_id))
    }

    pub fn leave(conversation_id: &str) -> Self {
        OutboundEvent::Leave(ConversationRef::new(conversation_id))
    }

    pub fn typing_start(conversation_id: &str) -> Self {
        OutboundEvent::TypingStart(ConversationRef::new(conversation_id))
    }

    pub fn typing_stop(conversation_id: &str) -> Self {
        OutboundEvent::TypingStop(ConversationRef::new(conversation_id))
    }

    pub fn seen(conversation_id: &str, user_id: &str) -> Self {
        OutboundEvent::Seen(SeenSignal {
            conversation_id: conversation_id.to_string(),
            user_id: user_id.to_string(),
        })
    }

    pub fn conversation_id(&self) -> &str {
        match self {
            OutboundEvent::Join(r)
            | OutboundEvent::Leave(r)
            | OutboundEvent::TypingStart(r)
            | OutboundEvent::TypingStop(r) => &r.conversation_id,
            OutboundEvent::Seen(s) => &s.conversation_id,
        }
    }
}
