//! Conversation Session
//!
//! One open conversation. [`ConversationSession`] is the synchronous core: it
//! owns the store and the presence, receipt and scroll components, consumes
//! [`SessionInput`]s one at a time and answers with [`SessionEffect`]s. It
//! never performs I/O itself; the runner task in `runner.rs` executes the
//! effects, arms the timers and feeds results back in as new inputs.
//!
//! Push events that touch the store and arrive while history is in flight
//! are queued and replayed after the history batch has been loaded, so a
//! message delivered between subscribing and loading is not lost. Typing
//! events are applied immediately.

mod handle;
mod runner;

#[cfg(test)]
mod tests;

pub use handle::ConversationHandle;
pub(crate) use runner::spawn;

use std::collections::VecDeque;

use serde::Serialize;

use crate::config::ChatSyncConfig;
use crate::error::{ChatSyncError, Result};
use crate::events::{InboundEvent, OutboundEvent};
use crate::media;
use crate::notify::Notice;
use crate::presence::{PresenceOutcome, PresenceTracker, TimerCommand, TypingState};
use crate::receipts::ReadReceiptAggregator;
use crate::scroll::{ScrollAnchor, ScrollCommand, ViewportMetrics};
use crate::store::{ConversationStore, ConversationView, ObserverContext, StoreChange, StoreObserver};
use crate::types::{HistoryPage, Message, SendRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// A history fetch is in flight or has not succeeded yet.
    Loading,
    Ready,
    /// The credential was rejected; nothing more happens until re-login.
    Halted,
    Closed,
}

/// Render-facing notifications published by a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Loaded { count: usize },
    MessageAdded { message: Message, from_viewer: bool },
    SeenUpdated { message_id: String, user_id: String },
    RemoteTyping(bool),
    ScrollToBottom,
    SessionExpired,
    Closed,
}

#[derive(Debug)]
pub enum SessionInput {
    HistoryLoaded(Result<HistoryPage>),
    Push(InboundEvent),
    Keystroke,
    TypingIdle { generation: u64 },
    RemoteTypingExpired { generation: u64 },
    Viewport(ViewportMetrics),
    InputFocus(bool),
    SendCompleted(Result<Message>),
    Close,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEffect {
    Emit(OutboundEvent),
    Update(SessionUpdate),
    Timer(TimerCommand),
    Notify(Notice),
    InvalidateSession,
    FetchHistory,
}

/// Point-in-time copy of a session for rendering.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub view: ConversationView,
    pub phase: SessionPhase,
    pub typing: TypingState,
    pub at_bottom: bool,
    pub pending_events: usize,
}

#[derive(Debug)]
pub struct ConversationSession {
    conversation_id: String,
    phase: SessionPhase,
    fetch_in_flight: bool,
    has_loaded: bool,
    store: ConversationStore,
    presence: PresenceTracker,
    receipts: ReadReceiptAggregator,
    scroll: ScrollAnchor,
    pending: VecDeque<InboundEvent>,
    pending_limit: usize,
    max_media_bytes: usize,
}

impl ConversationSession {
    pub fn new(conversation_id: &str, viewer_id: &str, config: &ChatSyncConfig) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            phase: SessionPhase::Loading,
            fetch_in_flight: false,
            has_loaded: false,
            store: ConversationStore::new(conversation_id, viewer_id),
            presence: PresenceTracker::new(
                conversation_id,
                config.typing_idle_timeout,
                config.remote_typing_timeout,
            ),
            receipts: ReadReceiptAggregator::new(conversation_id, viewer_id),
            scroll: ScrollAnchor::new(config.scroll_threshold),
            pending: VecDeque::new(),
            pending_limit: config.pending_event_limit,
            max_media_bytes: config.max_media_bytes,
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn typing_state(&self) -> TypingState {
        self.presence.state()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            view: self.store.view(),
            phase: self.phase,
            typing: self.presence.state(),
            at_bottom: self.scroll.is_at_bottom(),
            pending_events: self.pending.len(),
        }
    }

    /// Kicks off the initial history fetch.
    pub fn start(&mut self) -> Vec<SessionEffect> {
        tracing::info!(
            target: "chatsync::session::start",
            "Opening conversation {}",
            self.conversation_id
        );
        self.phase = SessionPhase::Loading;
        self.fetch_in_flight = true;
        vec![SessionEffect::FetchHistory]
    }

    /// Checks a send before it reaches the network and normalizes its
    /// attachment type.
    pub fn begin_send(&self, request: &mut SendRequest) -> Result<()> {
        self.ensure_active()?;
        if request.conversation_id != self.conversation_id {
            return Err(ChatSyncError::ProtocolMismatch {
                expected: self.conversation_id.clone(),
                received: request.conversation_id.clone(),
            });
        }
        media::validate_send(request, self.max_media_bytes)
    }

    /// Re-fetches history. A fetch already in flight is not duplicated.
    pub fn reload(&mut self) -> Result<Vec<SessionEffect>> {
        self.ensure_active()?;
        if self.fetch_in_flight {
            tracing::debug!(
                target: "chatsync::session::reload",
                "History fetch for {} already in flight",
                self.conversation_id
            );
            return Ok(vec![]);
        }
        self.phase = SessionPhase::Loading;
        self.fetch_in_flight = true;
        Ok(vec![SessionEffect::FetchHistory])
    }

    pub fn handle(&mut self, input: SessionInput) -> Vec<SessionEffect> {
        let mut effects = Vec::new();

        match (self.phase, &input) {
            (SessionPhase::Closed, _) => {
                tracing::debug!(
                    target: "chatsync::session::handle",
                    "Ignoring {:?} for closed conversation {}",
                    input,
                    self.conversation_id
                );
                return effects;
            }
            (SessionPhase::Halted, input) if !matches!(input, SessionInput::Close) => {
                return effects;
            }
            _ => {}
        }

        match input {
            SessionInput::HistoryLoaded(result) => self.on_history_loaded(result, &mut effects),
            SessionInput::Push(event) => self.on_push(event, &mut effects),
            SessionInput::Keystroke => {
                let outcome = self.presence.on_keystroke();
                self.apply_presence(outcome, &mut effects);
            }
            SessionInput::TypingIdle { generation } => {
                let outcome = self.presence.on_local_idle(generation);
                self.apply_presence(outcome, &mut effects);
            }
            SessionInput::RemoteTypingExpired { generation } => {
                let outcome = self.presence.on_remote_expired(generation);
                self.apply_presence(outcome, &mut effects);
            }
            SessionInput::Viewport(metrics) => self.on_viewport(metrics, &mut effects),
            SessionInput::InputFocus(focused) => {
                if let Some(ScrollCommand::ToBottom) = self.scroll.set_input_focus(focused) {
                    effects.push(SessionEffect::Update(SessionUpdate::ScrollToBottom));
                }
            }
            SessionInput::SendCompleted(result) => self.on_send_completed(result, &mut effects),
            SessionInput::Close => self.close(&mut effects),
        }

        effects
    }

    fn ensure_active(&self) -> Result<()> {
        match self.phase {
            SessionPhase::Halted => Err(ChatSyncError::SessionExpired),
            SessionPhase::Closed => Err(ChatSyncError::SessionClosed),
            SessionPhase::Loading | SessionPhase::Ready => Ok(()),
        }
    }

    fn on_history_loaded(&mut self, result: Result<HistoryPage>, effects: &mut Vec<SessionEffect>) {
        if !self.fetch_in_flight {
            tracing::debug!(
                target: "chatsync::session::on_history_loaded",
                "Dropping unexpected history result for {}",
                self.conversation_id
            );
            return;
        }
        self.fetch_in_flight = false;

        match result {
            Ok(page) => {
                let at_bottom = self.scroll.is_at_bottom();
                self.store.set_peer(page.peer);
                // Sends confirmed while the fetch was in flight stay in the log
                let change = self.store.merge_history(page.messages);
                self.phase = SessionPhase::Ready;
                self.has_loaded = true;

                if let StoreChange::Loaded { count } = change {
                    effects.push(SessionEffect::Update(SessionUpdate::Loaded { count }));
                }
                self.observe(&change, at_bottom, effects);
                self.replay_pending(effects);
            }
            Err(e) if e.is_session_expired() => self.halt(effects),
            Err(e) => {
                tracing::warn!(
                    target: "chatsync::session::on_history_loaded",
                    "History for {} failed: {}",
                    self.conversation_id,
                    e
                );
                effects.push(SessionEffect::Notify(Notice::from_error(&e)));
                // The previous log stays authoritative
                if self.has_loaded {
                    self.phase = SessionPhase::Ready;
                    self.replay_pending(effects);
                }
            }
        }
    }

    fn on_push(&mut self, event: InboundEvent, effects: &mut Vec<SessionEffect>) {
        if event.conversation_id() != self.conversation_id {
            let mismatch = ChatSyncError::ProtocolMismatch {
                expected: self.conversation_id.clone(),
                received: event.conversation_id().to_string(),
            };
            tracing::debug!(
                target: "chatsync::session::on_push",
                "Dropping {}: {}",
                event.name(),
                mismatch
            );
            return;
        }

        match event {
            event if event.touches_store() && self.phase == SessionPhase::Loading => {
                self.buffer(event)
            }
            event if event.touches_store() => self.apply_store_event(event, effects),
            InboundEvent::TypingStart(_) => {
                let outcome = self.presence.on_remote_typing_start();
                self.apply_presence(outcome, effects);
            }
            InboundEvent::TypingStop(_) => {
                let outcome = self.presence.on_remote_typing_stop();
                self.apply_presence(outcome, effects);
            }
            InboundEvent::NewMessage(_) | InboundEvent::SeenUpdate(_) => {}
        }
    }

    fn buffer(&mut self, event: InboundEvent) {
        if self.pending_limit == 0 {
            tracing::warn!(
                target: "chatsync::session::buffer",
                "Dropping {} for {}: buffering disabled",
                event.name(),
                self.conversation_id
            );
            return;
        }
        if self.pending.len() >= self.pending_limit {
            if let Some(dropped) = self.pending.pop_front() {
                tracing::warn!(
                    target: "chatsync::session::buffer",
                    "Pending queue for {} full, dropping oldest {}",
                    self.conversation_id,
                    dropped.name()
                );
            }
        }
        self.pending.push_back(event);
    }

    fn replay_pending(&mut self, effects: &mut Vec<SessionEffect>) {
        if self.pending.is_empty() {
            return;
        }
        tracing::debug!(
            target: "chatsync::session::replay_pending",
            "Replaying {} buffered events for {}",
            self.pending.len(),
            self.conversation_id
        );
        while let Some(event) = self.pending.pop_front() {
            self.apply_store_event(event, effects);
        }
    }

    fn apply_store_event(&mut self, event: InboundEvent, effects: &mut Vec<SessionEffect>) {
        match event {
            InboundEvent::NewMessage(message) => {
                let at_bottom = self.scroll.is_at_bottom();
                if let Some(change) = self.store.append_incoming(message.clone()) {
                    effects.push(SessionEffect::Update(SessionUpdate::MessageAdded {
                        message,
                        from_viewer: false,
                    }));
                    self.observe(&change, at_bottom, effects);
                }
            }
            InboundEvent::SeenUpdate(seen) => {
                let Some(change) = self.receipts.on_seen_event(seen, &mut self.store) else {
                    return;
                };
                if let StoreChange::SeenPatched {
                    message_id,
                    user_id,
                } = &change
                {
                    effects.push(SessionEffect::Update(SessionUpdate::SeenUpdated {
                        message_id: message_id.clone(),
                        user_id: user_id.clone(),
                    }));
                }
                let at_bottom = self.scroll.is_at_bottom();
                self.observe(&change, at_bottom, effects);
            }
            InboundEvent::TypingStart(_) | InboundEvent::TypingStop(_) => {
                self.on_push(event, effects);
            }
        }
    }

    /// Publishes a store change to the scroll anchor and the receipt aggregator.
    fn observe(&mut self, change: &StoreChange, at_bottom: bool, effects: &mut Vec<SessionEffect>) {
        let ctx = ObserverContext {
            store: &self.store,
            at_bottom,
        };
        if let Some(ScrollCommand::ToBottom) = self.scroll.on_store_change(change, &ctx) {
            effects.push(SessionEffect::Update(SessionUpdate::ScrollToBottom));
        }
        if let Some(event) = self.receipts.on_store_change(change, &ctx) {
            effects.push(SessionEffect::Emit(event));
        }
    }

    fn on_viewport(&mut self, metrics: ViewportMetrics, effects: &mut Vec<SessionEffect>) {
        let was_at_bottom = self.scroll.is_at_bottom();
        self.scroll.update_viewport(metrics);

        // Reaching the bottom reads whatever is there
        if !was_at_bottom && self.scroll.is_at_bottom() && self.phase == SessionPhase::Ready {
            if let Some(event) = self.receipts.evaluate(&self.store, true) {
                effects.push(SessionEffect::Emit(event));
            }
        }
    }

    fn apply_presence(&mut self, outcome: PresenceOutcome, effects: &mut Vec<SessionEffect>) {
        let local_changed = outcome.emit.is_some();
        if let Some(event) = outcome.emit {
            effects.push(SessionEffect::Emit(event));
        }
        effects.extend(outcome.timers.into_iter().map(SessionEffect::Timer));

        if outcome.remote_changed {
            effects.push(SessionEffect::Update(SessionUpdate::RemoteTyping(
                self.presence.state().remote_is_typing,
            )));
        }
        if local_changed || outcome.remote_changed {
            if let Some(ScrollCommand::ToBottom) = self.scroll.on_presence_change() {
                effects.push(SessionEffect::Update(SessionUpdate::ScrollToBottom));
            }
        }
    }

    fn on_send_completed(&mut self, result: Result<Message>, effects: &mut Vec<SessionEffect>) {
        match result {
            Ok(message) => {
                let at_bottom = self.scroll.is_at_bottom();
                let change = self.store.append_local(message.clone());
                if let StoreChange::AppendedLocal { inserted: true, .. } = change {
                    effects.push(SessionEffect::Update(SessionUpdate::MessageAdded {
                        message,
                        from_viewer: true,
                    }));
                }
                self.observe(&change, at_bottom, effects);
            }
            Err(e) if e.is_session_expired() => self.halt(effects),
            Err(e) => {
                tracing::warn!(
                    target: "chatsync::session::on_send_completed",
                    "Send to {} failed: {}",
                    self.conversation_id,
                    e
                );
                effects.push(SessionEffect::Notify(Notice::from_error(&e)));
            }
        }
    }

    /// Stops all synchronization after the credential was rejected.
    ///
    /// Emits nothing on the channel; the only outward effects are the
    /// notice and a single invalidation.
    fn halt(&mut self, effects: &mut Vec<SessionEffect>) {
        if self.phase == SessionPhase::Halted {
            return;
        }
        tracing::warn!(
            target: "chatsync::session::halt",
            "Session expired, halting conversation {}",
            self.conversation_id
        );
        self.phase = SessionPhase::Halted;
        self.fetch_in_flight = false;

        let outcome = self.presence.stop();
        effects.extend(outcome.timers.into_iter().map(SessionEffect::Timer));
        if outcome.remote_changed {
            effects.push(SessionEffect::Update(SessionUpdate::RemoteTyping(false)));
        }
        self.pending.clear();

        effects.push(SessionEffect::Notify(Notice::from_error(
            &ChatSyncError::SessionExpired,
        )));
        effects.push(SessionEffect::InvalidateSession);
        effects.push(SessionEffect::Update(SessionUpdate::SessionExpired));
    }

    fn close(&mut self, effects: &mut Vec<SessionEffect>) {
        let halted = self.phase == SessionPhase::Halted;
        let outcome = self.presence.stop();
        if !halted {
            if let Some(event) = outcome.emit {
                effects.push(SessionEffect::Emit(event));
            }
        }
        effects.extend(outcome.timers.into_iter().map(SessionEffect::Timer));

        self.phase = SessionPhase::Closed;
        self.fetch_in_flight = false;
        self.store.clear();
        self.pending.clear();
        self.scroll.reset();
        self.receipts.reset();

        tracing::info!(
            target: "chatsync::session::close",
            "Closed conversation {}",
            self.conversation_id
        );
        effects.push(SessionEffect::Update(SessionUpdate::Closed));
    }
}
