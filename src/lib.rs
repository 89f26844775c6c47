//! Real-time chat synchronization.
//!
//! `chatsync` reconciles a conversation's one-shot history fetch with its
//! live push-event stream into a single deduplicated, insertion-ordered log,
//! debounces local typing into start/stop signals, merges incremental seen
//! receipts and decides when the viewport should follow new content.
//!
//! A [`ChatSync`] engine owns at most one open conversation; each conversation
//! is driven by its own runner task and exposed through a
//! [`ConversationHandle`].

use std::path::Path;
use std::sync::Mutex;

use once_cell::sync::OnceCell;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt::Layer, prelude::*, registry::Registry};

pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod history;
pub mod media;
pub mod notify;
pub mod presence;
pub mod receipts;
pub mod scroll;
pub mod session;
pub mod store;
pub mod transport;
pub mod types;

#[cfg(test)]
mod test_support;

pub use crate::channel::{ConversationSubscription, EventChannel, EventRouter, WsEventChannel};
pub use crate::config::ChatSyncConfig;
pub use crate::engine::{ChatSync, Collaborators};
pub use crate::error::{ChatSyncError, FieldError, Result};
pub use crate::events::{InboundEvent, OutboundEvent};
pub use crate::notify::{Notice, NoticeLevel, Notifier, SessionInvalidator, TracingNotifier};
pub use crate::scroll::ViewportMetrics;
pub use crate::session::{
    ConversationHandle, ConversationSession, SessionPhase, SessionSnapshot, SessionUpdate,
};
pub use crate::store::{ConversationStore, ConversationView};
pub use crate::transport::{ChatTransport, HttpTransport};
pub use crate::types::{HistoryPage, MediaUpload, Message, Participant, SendRequest};

static TRACING_GUARDS: OnceCell<Mutex<Vec<WorkerGuard>>> = OnceCell::new();
static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Installs the global tracing subscriber once per process.
///
/// Logs go to stdout and, when `logs_dir` is given, to a daily rolling
/// `chatsync.*.log` file. `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing(logs_dir: Option<&Path>) -> Result<()> {
    TRACING_INIT
        .get_or_try_init(|| {
            let mut guards = Vec::new();

            let (non_blocking_stdout, stdout_guard) =
                tracing_appender::non_blocking(std::io::stdout());
            guards.push(stdout_guard);
            let stdout_layer = Layer::new()
                .with_writer(non_blocking_stdout)
                .with_ansi(true)
                .with_target(true);

            let file_layer = match logs_dir {
                Some(dir) => {
                    std::fs::create_dir_all(dir)?;
                    let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
                        .rotation(tracing_appender::rolling::Rotation::DAILY)
                        .filename_prefix("chatsync")
                        .filename_suffix("log")
                        .build(dir)
                        .map_err(|e| {
                            ChatSyncError::Configuration(format!(
                                "Failed to create log file in {}: {e}",
                                dir.display()
                            ))
                        })?;
                    let (non_blocking_file, file_guard) =
                        tracing_appender::non_blocking(file_appender);
                    guards.push(file_guard);
                    Some(
                        Layer::new()
                            .with_writer(non_blocking_file)
                            .with_ansi(false)
                            .with_target(true),
                    )
                }
                None => None,
            };

            Registry::default()
                .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
                .with(stdout_layer)
                .with(file_layer)
                .try_init()
                .map_err(|e| ChatSyncError::Configuration(format!("Tracing already set: {e}")))?;

            TRACING_GUARDS.set(Mutex::new(guards)).ok();
            tracing::debug!(
                target: "chatsync::init_tracing",
                "Logging initialized (file logs: {:?})",
                logs_dir
            );
            Ok::<(), ChatSyncError>(())
        })
        .map(|_| ())
}
