//! The sync engine: at most one open conversation per viewer.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::channel::{EventChannel, EventRouter, WsEventChannel};
use crate::config::ChatSyncConfig;
use crate::error::{ChatSyncError, Result};
use crate::notify::{Notifier, SessionInvalidator, TracingNotifier};
use crate::session::{self, ConversationHandle};
use crate::transport::{ChatTransport, HttpTransport};

/// The external collaborators a conversation session talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub transport: Arc<dyn ChatTransport>,
    pub channel: Arc<dyn EventChannel>,
    /// Must be the router the channel delivers inbound frames to.
    pub router: Arc<EventRouter>,
    pub notifier: Arc<dyn Notifier>,
    pub invalidator: Arc<dyn SessionInvalidator>,
}

pub struct ChatSync {
    config: ChatSyncConfig,
    viewer_id: String,
    deps: Collaborators,
    active: Mutex<Option<ConversationHandle>>,
}

impl std::fmt::Debug for ChatSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSync")
            .field("config", &self.config)
            .field("viewer_id", &self.viewer_id)
            .finish()
    }
}

impl ChatSync {
    pub fn new(config: ChatSyncConfig, viewer_id: &str, deps: Collaborators) -> Self {
        Self {
            config,
            viewer_id: viewer_id.to_string(),
            deps,
            active: Mutex::new(None),
        }
    }

    /// Connects the HTTP transport and the WebSocket event channel with
    /// `token`, logging notices through tracing.
    pub async fn connect(
        config: ChatSyncConfig,
        viewer_id: &str,
        token: &str,
        invalidator: Arc<dyn SessionInvalidator>,
    ) -> Result<Self> {
        let router = Arc::new(EventRouter::with_buffer(config.channel_buffer));
        let channel = WsEventChannel::connect(
            &config.socket_url,
            token,
            router.clone(),
            config.channel_buffer,
        )
        .await?;
        let transport = HttpTransport::new(&config.api_base_url, token);

        let deps = Collaborators {
            transport: Arc::new(transport),
            channel: Arc::new(channel),
            router,
            notifier: Arc::new(TracingNotifier),
            invalidator,
        };
        Ok(Self::new(config, viewer_id, deps))
    }

    pub fn config(&self) -> &ChatSyncConfig {
        &self.config
    }

    pub fn viewer_id(&self) -> &str {
        &self.viewer_id
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.deps.router
    }

    /// Opens `conversation_id`, closing the previously open conversation
    /// first so no message or presence state leaks across.
    pub async fn open_conversation(&self, conversation_id: &str) -> Result<ConversationHandle> {
        if conversation_id.trim().is_empty() {
            return Err(ChatSyncError::Validation(
                "Conversation id must not be empty".to_string(),
            ));
        }

        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            tracing::debug!(
                target: "chatsync::engine::open_conversation",
                "Closing {} before opening {}",
                previous.conversation_id(),
                conversation_id
            );
            previous.close().await?;
        }

        let handle = session::spawn(conversation_id, &self.viewer_id, &self.config, &self.deps);
        *active = Some(handle.clone());
        Ok(handle)
    }

    pub async fn active_conversation(&self) -> Option<String> {
        self.active
            .lock()
            .await
            .as_ref()
            .filter(|handle| !handle.is_closed())
            .map(|handle| handle.conversation_id().to_string())
    }

    pub async fn close_active(&self) -> Result<()> {
        match self.active.lock().await.take() {
            Some(handle) => handle.close().await,
            None => Ok(()),
        }
    }
}
