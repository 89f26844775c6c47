use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;

use super::{ApiResponse, ChatTransport};
use crate::error::{ChatSyncError, Result};
use crate::types::{HistoryPage, Message, SendRequest};

/// [`ChatTransport`] over the REST API with a bearer token.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .field("token", &"<REDACTED>")
            .finish()
    }
}

impl HttpTransport {
    /// Creates a transport for `base_url` authenticating with `token`.
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// `{base}/messages/get-messages/{id}` with the id percent-encoded as one segment.
    fn history_url(&self, conversation_id: &str) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.url("messages/get-messages")).map_err(|e| {
            ChatSyncError::Configuration(format!("Invalid API base URL {}: {e}", self.base_url))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                ChatSyncError::Configuration(format!(
                    "API base URL {} cannot carry a path",
                    self.base_url
                ))
            })?
            .push(conversation_id);
        Ok(url)
    }

    async fn read_envelope<T: DeserializeOwned>(
        response: reqwest::Response,
        resource: &str,
    ) -> Result<T> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(
                target: "chatsync::transport::http",
                "Unauthorized response for {}",
                resource
            );
            return Err(ChatSyncError::SessionExpired);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ChatSyncError::NotFound(resource.to_string()));
        }

        let body = response.text().await?;
        let envelope: ApiResponse<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => return Err(ChatSyncError::Serialization(e)),
            Err(_) => return Err(ChatSyncError::Network(format!("{status} for {resource}"))),
        };

        if status.is_server_error() {
            return Err(ChatSyncError::Network(
                envelope
                    .message
                    .unwrap_or_else(|| format!("{status} for {resource}")),
            ));
        }
        if !envelope.success || !status.is_success() {
            return Err(ChatSyncError::Rejected {
                message: envelope
                    .message
                    .unwrap_or_else(|| format!("Request for {resource} failed")),
                field_errors: envelope.errors.unwrap_or_default(),
            });
        }

        envelope.data.ok_or_else(|| ChatSyncError::Rejected {
            message: format!("Response for {resource} carried no data"),
            field_errors: vec![],
        })
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn history(&self, conversation_id: &str) -> Result<HistoryPage> {
        let url = self.history_url(conversation_id)?;
        tracing::debug!(
            target: "chatsync::transport::history",
            "Fetching history from {}",
            url
        );

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await?;

        Self::read_envelope(response, &format!("conversation {conversation_id}")).await
    }

    async fn send(&self, request: &SendRequest) -> Result<Message> {
        let mut form = Form::new()
            .text("content", request.content.clone())
            .text("chatId", request.conversation_id.clone());

        if let Some(media) = &request.media {
            let part = Part::bytes(media.data.clone())
                .file_name(media.filename.clone())
                .mime_str(&media.mime_type)
                .map_err(|e| ChatSyncError::Validation(format!("Invalid media type: {e}")))?;
            form = form.part("media", part);
        }

        tracing::debug!(
            target: "chatsync::transport::send",
            "Sending message to conversation {}",
            request.conversation_id
        );

        let response = self
            .client
            .post(self.url("messages/send-message"))
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await?;

        Self::read_envelope(response, "send-message").await
    }
}
