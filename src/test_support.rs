//! In-memory collaborators for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::channel::EventChannel;
use crate::error::{ChatSyncError, Result};
use crate::events::OutboundEvent;
use crate::notify::{Notice, Notifier, SessionInvalidator};
use crate::transport::ChatTransport;
use crate::types::{HistoryPage, Message, SendRequest, SenderRef};

/// Scripted transport. Unscripted history calls return an empty page and
/// unscripted sends echo the request back as a message from `me`.
#[derive(Default)]
pub(crate) struct FakeTransport {
    history: Mutex<VecDeque<Result<HistoryPage>>>,
    sends: Mutex<VecDeque<Result<Message>>>,
    sent: Mutex<Vec<SendRequest>>,
    history_delay: Mutex<Duration>,
    history_calls: AtomicUsize,
    send_calls: AtomicUsize,
}

impl FakeTransport {
    pub(crate) fn push_history(&self, result: Result<HistoryPage>) {
        self.history.lock().unwrap().push_back(result);
    }

    pub(crate) fn push_send(&self, result: Result<Message>) {
        self.sends.lock().unwrap().push_back(result);
    }

    pub(crate) fn set_history_delay(&self, delay: Duration) {
        *self.history_delay.lock().unwrap() = delay;
    }

    pub(crate) fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn sent(&self) -> Vec<SendRequest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for FakeTransport {
    async fn history(&self, _conversation_id: &str) -> Result<HistoryPage> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.history_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.history
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(HistoryPage {
                    messages: vec![],
                    peer: None,
                })
            })
    }

    async fn send(&self, request: &SendRequest) -> Result<Message> {
        let n = self.send_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.sent.lock().unwrap().push(request.clone());
        let scripted = self.sends.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(Message {
                id: format!("sent-{n}"),
                conversation_id: request.conversation_id.clone(),
                sender: SenderRef::from("me"),
                content: Some(request.content.clone()),
                media_ref: None,
                sent_at: Utc::now(),
                seen_by: vec![],
            })
        })
    }
}

#[derive(Default)]
pub(crate) struct RecordingChannel {
    events: Mutex<Vec<OutboundEvent>>,
    failing: AtomicBool,
}

impl RecordingChannel {
    pub(crate) fn events(&self) -> Vec<OutboundEvent> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, event: &OutboundEvent) -> usize {
        self.events.lock().unwrap().iter().filter(|e| *e == event).count()
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl EventChannel for RecordingChannel {
    fn emit(&self, event: OutboundEvent) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ChatSyncError::ChannelClosed);
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub(crate) fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: &Notice) {
        self.notices.lock().unwrap().push(notice.clone());
    }
}

#[derive(Default)]
pub(crate) struct CountingInvalidator {
    calls: AtomicUsize,
}

impl CountingInvalidator {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SessionInvalidator for CountingInvalidator {
    fn invalidate(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}
