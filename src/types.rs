use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display fields attached to a participant wherever the UI shows them
/// (seen receipts, typing indicators, message headers).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayFields {
    #[serde(
        rename = "firstName",
        alias = "displayName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub display_name: Option<String>,

    #[serde(
        rename = "profilePic",
        alias = "avatarRef",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub avatar_ref: Option<String>,
}

/// A participant profile as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_pic: Option<String>,
}

impl Participant {
    /// "First Last", falling back to the username, then the id.
    pub fn display_name(&self) -> String {
        let full = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        if !full.trim().is_empty() {
            return full.trim().to_string();
        }
        self.username.clone().unwrap_or_else(|| self.id.clone())
    }
}

/// The peer shown in the conversation header.
pub type PeerProfile = Participant;

/// The sender of a message: either a bare id or a populated profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SenderRef {
    Profile(Participant),
    Id(String),
}

impl SenderRef {
    pub fn id(&self) -> &str {
        match self {
            SenderRef::Profile(p) => &p.id,
            SenderRef::Id(id) => id,
        }
    }

    pub fn profile(&self) -> Option<&Participant> {
        match self {
            SenderRef::Profile(p) => Some(p),
            SenderRef::Id(_) => None,
        }
    }
}

impl From<&str> for SenderRef {
    fn from(id: &str) -> Self {
        SenderRef::Id(id.to_string())
    }
}

/// A participant that has observed a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenReceipt {
    #[serde(rename = "_id", alias = "userId")]
    pub user_id: String,

    #[serde(flatten)]
    pub display: DisplayFields,
}

/// A single chat message.
///
/// Within a conversation `id` is unique; ordering is whatever order the
/// conversation store received messages in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,

    #[serde(rename = "chatId", alias = "conversationId")]
    pub conversation_id: String,

    #[serde(rename = "senderId")]
    pub sender: SenderRef,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(
        rename = "mediaUrl",
        alias = "mediaRef",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub media_ref: Option<String>,

    #[serde(rename = "createdAt", alias = "sentAt")]
    pub sent_at: DateTime<Utc>,

    #[serde(rename = "seenBy", default)]
    pub seen_by: Vec<SeenReceipt>,
}

impl Message {
    pub fn sender_id(&self) -> &str {
        self.sender.id()
    }

    pub fn is_seen_by(&self, user_id: &str) -> bool {
        self.seen_by.iter().any(|r| r.user_id == user_id)
    }
}

/// Result of a history fetch: the ordered message window and the peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPage {
    #[serde(default)]
    pub messages: Vec<Message>,

    #[serde(rename = "chatUser", alias = "peerProfile", default)]
    pub peer: Option<PeerProfile>,
}

/// A media attachment supplied by the composer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaUpload {
    /// The original filename
    pub filename: String,
    /// The declared MIME type (e.g. "image/jpeg", "video/mp4")
    pub mime_type: String,
    /// The raw binary data of the file
    pub data: Vec<u8>,
}

/// An outbound message as typed by the viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    pub conversation_id: String,
    pub content: String,
    pub media: Option<MediaUpload>,
}

impl SendRequest {
    pub fn text(conversation_id: &str, content: &str) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            content: content.to_string(),
            media: None,
        }
    }

    pub fn with_media(mut self, media: MediaUpload) -> Self {
        self.media = Some(media);
        self
    }
}
