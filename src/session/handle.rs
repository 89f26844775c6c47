use tokio::sync::{broadcast, mpsc, oneshot};

use super::runner::Command;
use super::{SessionSnapshot, SessionUpdate};
use crate::error::{ChatSyncError, Result};
use crate::scroll::ViewportMetrics;
use crate::types::{MediaUpload, Message, SendRequest};

/// Cheap, cloneable handle to an open conversation.
///
/// Every call is processed in order by the conversation's runner task. Once
/// the conversation is closed, calls fail with
/// [`ChatSyncError::SessionClosed`].
#[derive(Clone)]
pub struct ConversationHandle {
    conversation_id: String,
    commands: mpsc::Sender<Command>,
    updates: broadcast::Sender<SessionUpdate>,
}

impl std::fmt::Debug for ConversationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationHandle")
            .field("conversation_id", &self.conversation_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ConversationHandle {
    pub(crate) fn new(
        conversation_id: &str,
        commands: mpsc::Sender<Command>,
        updates: broadcast::Sender<SessionUpdate>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            commands,
            updates,
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Reports one keystroke in the composer.
    pub async fn keystroke(&self) -> Result<()> {
        self.dispatch(Command::Keystroke).await
    }

    pub async fn set_viewport(&self, metrics: ViewportMetrics) -> Result<()> {
        self.dispatch(Command::Viewport(metrics)).await
    }

    pub async fn set_input_focus(&self, focused: bool) -> Result<()> {
        self.dispatch(Command::InputFocus(focused)).await
    }

    /// Sends a message and returns the server-confirmed copy.
    ///
    /// Validation happens before any network call.
    pub async fn send(&self, content: &str, media: Option<MediaUpload>) -> Result<Message> {
        let mut request = SendRequest::text(&self.conversation_id, content);
        request.media = media;

        let (reply, response) = oneshot::channel();
        self.dispatch(Command::Send(request, reply)).await?;
        response.await.map_err(|_| ChatSyncError::SessionClosed)?
    }

    pub async fn reload(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.dispatch(Command::Reload(reply)).await?;
        response.await.map_err(|_| ChatSyncError::SessionClosed)?
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        let (reply, response) = oneshot::channel();
        self.dispatch(Command::Snapshot(reply)).await?;
        response.await.map_err(|_| ChatSyncError::SessionClosed)
    }

    pub fn subscribe_updates(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }

    /// Closes the conversation and waits for teardown. Closing twice is fine.
    pub async fn close(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        if self.commands.send(Command::Close(reply)).await.is_err() {
            return Ok(());
        }
        let _ = response.await;
        Ok(())
    }

    async fn dispatch(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ChatSyncError::SessionClosed)
    }
}
