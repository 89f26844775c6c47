//! User-facing notices and session invalidation.

use crate::error::ChatSyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A message the host application should surface to the viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    /// Maps a failure to what the viewer sees. Server rejections show the
    /// server's own message.
    pub fn from_error(err: &ChatSyncError) -> Self {
        match err {
            ChatSyncError::Rejected { message, .. } => Self::error(message.clone()),
            ChatSyncError::Validation(message) => Self::error(message.clone()),
            e if e.is_transient() => Self::warning(e.to_string()),
            e => Self::error(e.to_string()),
        }
    }
}

/// Surfaces notices to the viewer (toasts, status bars, stderr).
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &Notice);
}

/// Notifier that only writes to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: &Notice) {
        match notice.level {
            NoticeLevel::Info => {
                tracing::info!(target: "chatsync::notify", "{}", notice.message)
            }
            NoticeLevel::Warning => {
                tracing::warn!(target: "chatsync::notify", "{}", notice.message)
            }
            NoticeLevel::Error => {
                tracing::error!(target: "chatsync::notify", "{}", notice.message)
            }
        }
    }
}

/// Called once when the credential is rejected; the host logs the viewer out.
pub trait SessionInvalidator: Send + Sync {
    fn invalidate(&self);
}

impl<F> SessionInvalidator for F
where
    F: Fn() + Send + Sync,
{
    fn invalidate(&self) {
        self()
    }
}
