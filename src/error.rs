use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = core::result::Result<T, ChatSyncError>;

/// A single field-level validation error reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum ChatSyncError {
    #[error("Session expired, please log in again")]
    SessionExpired,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Request rejected: {message}")]
    Rejected {
        message: String,
        field_errors: Vec<FieldError>,
    },

    #[error("Event for conversation {received} does not match open conversation {expected}")]
    ProtocolMismatch { expected: String, received: String },

    #[error("Event channel closed")]
    ChannelClosed,

    #[error("Event channel error: {0}")]
    Channel(String),

    #[error("Conversation session closed")]
    SessionClosed,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl ChatSyncError {
    /// True when the credential is dead and the caller has to re-authenticate.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ChatSyncError::SessionExpired)
    }

    /// True for failures that may succeed if the caller tries again later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ChatSyncError::Network(_) | ChatSyncError::ChannelClosed | ChatSyncError::Channel(_)
        )
    }

    /// Produces an owned copy suitable for fanning out to several listeners.
    ///
    /// Wrapped library errors are flattened into [`ChatSyncError::Other`].
    pub fn duplicate(&self) -> Self {
        match self {
            ChatSyncError::SessionExpired => ChatSyncError::SessionExpired,
            ChatSyncError::NotFound(s) => ChatSyncError::NotFound(s.clone()),
            ChatSyncError::Network(s) => ChatSyncError::Network(s.clone()),
            ChatSyncError::Validation(s) => ChatSyncError::Validation(s.clone()),
            ChatSyncError::Rejected {
                message,
                field_errors,
            } => ChatSyncError::Rejected {
                message: message.clone(),
                field_errors: field_errors.clone(),
            },
            ChatSyncError::ProtocolMismatch { expected, received } => {
                ChatSyncError::ProtocolMismatch {
                    expected: expected.clone(),
                    received: received.clone(),
                }
            }
            ChatSyncError::ChannelClosed => ChatSyncError::ChannelClosed,
            ChatSyncError::Channel(s) => ChatSyncError::Channel(s.clone()),
            ChatSyncError::SessionClosed => ChatSyncError::SessionClosed,
            ChatSyncError::Configuration(s) => ChatSyncError::Configuration(s.clone()),
            other => ChatSyncError::Other(anyhow::anyhow!(other.to_string())),
        }
    }
}

impl From<reqwest::Error> for ChatSyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.status() == Some(reqwest::StatusCode::UNAUTHORIZED) {
            return ChatSyncError::SessionExpired;
        }
        ChatSyncError::Network(err.to_string())
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for ChatSyncError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        ChatSyncError::Other(anyhow::anyhow!(err.to_string()))
    }
}
