//! Request/response transport for history and send.

mod http;

pub use http::HttpTransport;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{FieldError, Result};
use crate::types::{HistoryPage, Message, SendRequest};

/// The envelope every API response is wrapped in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default = "Option::default")]
    pub data: Option<T>,

    #[serde(default)]
    pub errors: Option<Vec<FieldError>>,
}

/// Authenticated calls consumed by a conversation session.
///
/// An authorization failure must surface as
/// [`ChatSyncError::SessionExpired`](crate::ChatSyncError::SessionExpired);
/// implementations never retry.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn history(&self, conversation_id: &str) -> Result<HistoryPage>;

    async fn send(&self, request: &SendRequest) -> Result<Message>;
}
