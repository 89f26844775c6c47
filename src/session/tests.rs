use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::channel::EventRouter;
use crate::engine::{ChatSync, Collaborators};
use crate::events::{ConversationRef, SeenEvent};
use crate::notify::NoticeLevel;
use crate::presence::TimerKind;
use crate::test_support::{CountingInvalidator, FakeTransport, RecordingChannel, RecordingNotifier};
use crate::types::test_support::message;
use crate::types::{DisplayFields, MediaUpload};

fn config() -> ChatSyncConfig {
    ChatSyncConfig::new("http://localhost:3000")
}

fn page(messages: Vec<Message>) -> HistoryPage {
    HistoryPage {
        messages,
        peer: None,
    }
}

fn new_message(id: &str, conversation_id: &str, sender: &str) -> InboundEvent {
    InboundEvent::NewMessage(message(id, conversation_id, sender))
}

fn seen_update(conversation_id: &str, user_id: &str) -> InboundEvent {
    InboundEvent::SeenUpdate(SeenEvent {
        conversation_id: conversation_id.to_string(),
        user_id: user_id.to_string(),
        display: DisplayFields {
            display_name: Some("Ada".into()),
            avatar_ref: None,
        },
    })
}

fn at_bottom() -> ViewportMetrics {
    ViewportMetrics::bottom(1000.0, 500.0)
}

fn scrolled_up() -> ViewportMetrics {
    ViewportMetrics::new(2000.0, 0.0, 500.0)
}

fn loaded_session(messages: Vec<Message>) -> ConversationSession {
    let mut session = ConversationSession::new("c1", "me", &config());
    session.start();
    session.handle(SessionInput::HistoryLoaded(Ok(page(messages))));
    session
}

fn emits(effects: &[SessionEffect]) -> Vec<&OutboundEvent> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            SessionEffect::Emit(event) => Some(event),
            _ => None,
        })
        .collect()
}

fn ids(session: &ConversationSession) -> Vec<&str> {
    session
        .store()
        .messages()
        .iter()
        .map(|m| m.id.as_str())
        .collect()
}

fn scrolls(effects: &[SessionEffect]) -> bool {
    effects.contains(&SessionEffect::Update(SessionUpdate::ScrollToBottom))
}

mod state_machine {
    use super::*;

    #[test]
    fn incoming_message_at_bottom_is_seen_once() {
        let mut session = ConversationSession::new("c1", "me", &config());
        assert_eq!(session.start(), vec![SessionEffect::FetchHistory]);

        let effects = session.handle(SessionInput::HistoryLoaded(Ok(page(vec![message(
            "1", "c1", "other",
        )]))));
        assert!(effects.contains(&SessionEffect::Update(SessionUpdate::Loaded { count: 1 })));
        assert!(scrolls(&effects));
        // Unmeasured viewport: nothing is read yet
        assert!(emits(&effects).is_empty());

        session.handle(SessionInput::Viewport(at_bottom()));

        let effects = session.handle(SessionInput::Push(new_message("2", "c1", "other")));
        assert_eq!(ids(&session), vec!["1", "2"]);
        assert_eq!(emits(&effects), vec![&OutboundEvent::seen("c1", "me")]);
        assert!(scrolls(&effects));

        let effects = session.handle(SessionInput::Push(new_message("2", "c1", "other")));
        assert!(effects.is_empty());
        assert_eq!(ids(&session), vec!["1", "2"]);
    }

    #[test]
    fn reaching_bottom_reads_latest_message() {
        let mut session = loaded_session(vec![message("1", "c1", "other")]);

        let effects = session.handle(SessionInput::Viewport(scrolled_up()));
        assert!(emits(&effects).is_empty());

        let effects = session.handle(SessionInput::Viewport(at_bottom()));
        assert_eq!(emits(&effects), vec![&OutboundEvent::seen("c1", "me")]);

        // Staying at the bottom does not repeat it
        let effects = session.handle(SessionInput::Viewport(at_bottom()));
        assert!(emits(&effects).is_empty());
    }

    #[test]
    fn scrolled_up_viewer_is_not_moved() {
        let mut session = loaded_session(vec![message("1", "c1", "other")]);
        session.handle(SessionInput::Viewport(scrolled_up()));

        let effects = session.handle(SessionInput::Push(new_message("2", "c1", "other")));
        assert!(!scrolls(&effects));
        assert!(emits(&effects).is_empty());
        assert_eq!(ids(&session), vec!["1", "2"]);
    }

    #[test]
    fn push_during_load_is_replayed_after_history() {
        let mut session = ConversationSession::new("c1", "me", &config());
        session.start();

        assert!(session
            .handle(SessionInput::Push(new_message("2", "c1", "other")))
            .is_empty());
        assert!(session
            .handle(SessionInput::Push(new_message("1", "c1", "other")))
            .is_empty());
        assert_eq!(session.snapshot().pending_events, 2);
        assert!(session.store().is_empty());

        let effects = session.handle(SessionInput::HistoryLoaded(Ok(page(vec![message(
            "1", "c1", "other",
        )]))));
        assert_eq!(ids(&session), vec!["1", "2"]);
        assert_eq!(session.snapshot().pending_events, 0);

        let added: Vec<_> = effects
            .iter()
            .filter(|e| matches!(e, SessionEffect::Update(SessionUpdate::MessageAdded { .. })))
            .collect();
        assert_eq!(added.len(), 1);
    }

    #[test]
    fn pending_queue_drops_oldest() {
        let mut config = config();
        config.pending_event_limit = 2;
        let mut session = ConversationSession::new("c1", "me", &config);
        session.start();

        for id in ["a", "b", "c"] {
            session.handle(SessionInput::Push(new_message(id, "c1", "other")));
        }
        assert_eq!(session.snapshot().pending_events, 2);

        session.handle(SessionInput::HistoryLoaded(Ok(page(vec![]))));
        assert_eq!(ids(&session), vec!["b", "c"]);
    }

    #[test]
    fn typing_applies_while_loading() {
        let mut session = ConversationSession::new("c1", "me", &config());
        session.start();

        let effects = session.handle(SessionInput::Push(InboundEvent::TypingStart(
            ConversationRef::new("c1"),
        )));
        assert!(effects.contains(&SessionEffect::Update(SessionUpdate::RemoteTyping(true))));
        assert!(effects.iter().any(|e| matches!(
            e,
            SessionEffect::Timer(TimerCommand::Reset {
                timer: TimerKind::RemoteTyping,
                ..
            })
        )));
        assert!(session.typing_state().remote_is_typing);
        assert_eq!(session.snapshot().pending_events, 0);
    }

    #[test]
    fn foreign_conversation_events_are_dropped() {
        let mut session = loaded_session(vec![]);
        assert!(session
            .handle(SessionInput::Push(new_message("x", "c2", "other")))
            .is_empty());
        assert!(session
            .handle(SessionInput::Push(InboundEvent::TypingStart(
                ConversationRef::new("c2")
            )))
            .is_empty());
        assert!(session.store().is_empty());
        assert!(!session.typing_state().remote_is_typing);
    }

    #[test]
    fn seen_updates_patch_latest_message() {
        let mut session = loaded_session(vec![message("1", "c1", "me")]);

        let effects = session.handle(SessionInput::Push(seen_update("c1", "other")));
        assert!(effects.contains(&SessionEffect::Update(SessionUpdate::SeenUpdated {
            message_id: "1".into(),
            user_id: "other".into(),
        })));
        assert!(!scrolls(&effects));

        assert!(session
            .handle(SessionInput::Push(seen_update("c1", "other")))
            .is_empty());
        assert!(session
            .handle(SessionInput::Push(seen_update("c1", "me")))
            .is_empty());
        assert_eq!(session.store().latest().unwrap().seen_by.len(), 1);
    }

    #[test]
    fn confirmed_send_scrolls_without_seen() {
        let mut session = loaded_session(vec![message("1", "c1", "other")]);
        session.handle(SessionInput::Viewport(scrolled_up()));

        let effects = session.handle(SessionInput::SendCompleted(Ok(message("9", "c1", "me"))));
        assert!(scrolls(&effects));
        assert!(emits(&effects).is_empty());
        assert!(effects.iter().any(|e| matches!(
            e,
            SessionEffect::Update(SessionUpdate::MessageAdded {
                from_viewer: true,
                ..
            })
        )));

        // Already present: no second row, still scrolls
        let effects = session.handle(SessionInput::SendCompleted(Ok(message("9", "c1", "me"))));
        assert!(scrolls(&effects));
        assert_eq!(ids(&session), vec!["1", "9"]);
    }

    #[test]
    fn begin_send_validates_before_network() {
        let session = loaded_session(vec![]);
        assert!(session.begin_send(&mut SendRequest::text("c1", "hi")).is_ok());
        assert!(matches!(
            session.begin_send(&mut SendRequest::text("c1", " ")),
            Err(ChatSyncError::Validation(_))
        ));
        assert!(matches!(
            session.begin_send(&mut SendRequest::text("c2", "hi")),
            Err(ChatSyncError::ProtocolMismatch { .. })
        ));
    }

    #[test]
    fn session_expiry_halts_once() {
        let mut session = ConversationSession::new("c1", "me", &config());
        session.start();
        session.handle(SessionInput::Keystroke);

        let effects = session.handle(SessionInput::HistoryLoaded(Err(ChatSyncError::SessionExpired)));
        let invalidations = effects
            .iter()
            .filter(|e| **e == SessionEffect::InvalidateSession)
            .count();
        assert_eq!(invalidations, 1);
        assert!(emits(&effects).is_empty());
        assert_eq!(session.phase(), SessionPhase::Halted);

        assert!(session
            .handle(SessionInput::SendCompleted(Err(ChatSyncError::SessionExpired)))
            .is_empty());
        assert!(session
            .handle(SessionInput::Push(new_message("2", "c1", "other")))
            .is_empty());
        assert!(session.handle(SessionInput::Keystroke).is_empty());
        assert!(matches!(
            session.begin_send(&mut SendRequest::text("c1", "hi")),
            Err(ChatSyncError::SessionExpired)
        ));
        assert!(matches!(session.reload(), Err(ChatSyncError::SessionExpired)));
    }

    #[test]
    fn failed_first_load_waits_for_reload() {
        let mut session = ConversationSession::new("c1", "me", &config());
        session.start();

        let effects = session.handle(SessionInput::HistoryLoaded(Err(ChatSyncError::Network(
            "connection reset".into(),
        ))));
        assert!(effects.iter().any(|e| matches!(
            e,
            SessionEffect::Notify(Notice {
                level: NoticeLevel::Warning,
                ..
            })
        )));
        assert_eq!(session.phase(), SessionPhase::Loading);

        assert_eq!(session.reload().unwrap(), vec![SessionEffect::FetchHistory]);
        assert!(session.reload().unwrap().is_empty());

        session.handle(SessionInput::HistoryLoaded(Ok(page(vec![message("1", "c1", "other")]))));
        assert_eq!(session.phase(), SessionPhase::Ready);
    }

    #[test]
    fn failed_reload_keeps_last_known_good() {
        let mut session = loaded_session(vec![message("1", "c1", "other")]);
        session.reload().unwrap();
        session.handle(SessionInput::Push(new_message("2", "c1", "other")));

        session.handle(SessionInput::HistoryLoaded(Err(ChatSyncError::Rejected {
            message: "Server busy".into(),
            field_errors: vec![],
        })));
        assert_eq!(session.phase(), SessionPhase::Ready);
        assert_eq!(ids(&session), vec!["1", "2"]);
    }

    #[test]
    fn send_confirmed_during_reload_survives_stale_history() {
        let mut session = loaded_session(vec![message("1", "c1", "other")]);
        session.handle(SessionInput::Push(new_message("2", "c1", "other")));
        session.reload().unwrap();

        session.handle(SessionInput::SendCompleted(Ok(message("9", "c1", "me"))));
        assert_eq!(ids(&session), vec!["1", "2", "9"]);

        // The snapshot predates both "2" and "9"
        let effects = session.handle(SessionInput::HistoryLoaded(Ok(page(vec![message(
            "1", "c1", "other",
        )]))));
        assert_eq!(ids(&session), vec!["1", "2", "9"]);
        assert!(effects.contains(&SessionEffect::Update(SessionUpdate::Loaded { count: 3 })));

        // A later snapshot that includes them does not duplicate anything
        session.reload().unwrap();
        session.handle(SessionInput::HistoryLoaded(Ok(page(vec![
            message("1", "c1", "other"),
            message("2", "c1", "other"),
            message("9", "c1", "me"),
        ]))));
        assert_eq!(ids(&session), vec!["1", "2", "9"]);
    }

    #[test]
    fn send_confirmed_before_first_load_is_kept() {
        let mut session = ConversationSession::new("c1", "me", &config());
        session.start();

        session.handle(SessionInput::SendCompleted(Ok(message("9", "c1", "me"))));
        session.handle(SessionInput::HistoryLoaded(Ok(page(vec![message("1", "c1", "other")]))));
        assert_eq!(ids(&session), vec!["1", "9"]);
    }

    #[test]
    fn reload_keeps_scrolled_up_reader_in_place() {
        let mut session = loaded_session(vec![message("1", "c1", "other")]);
        session.handle(SessionInput::Viewport(scrolled_up()));

        session.reload().unwrap();
        let effects = session.handle(SessionInput::HistoryLoaded(Ok(page(vec![
            message("1", "c1", "other"),
            message("2", "c1", "other"),
        ]))));
        assert!(!scrolls(&effects));

        session.handle(SessionInput::Viewport(at_bottom()));
        session.reload().unwrap();
        let effects = session.handle(SessionInput::HistoryLoaded(Ok(page(vec![message(
            "1", "c1", "other",
        )]))));
        assert!(scrolls(&effects));
    }

    #[test]
    fn focus_keeps_typing_indicator_in_view() {
        let mut session = loaded_session(vec![]);

        let effects = session.handle(SessionInput::Push(InboundEvent::TypingStart(
            ConversationRef::new("c1"),
        )));
        assert!(!scrolls(&effects));

        assert!(scrolls(&session.handle(SessionInput::InputFocus(true))));

        let effects = session.handle(SessionInput::Push(InboundEvent::TypingStop(
            ConversationRef::new("c1"),
        )));
        assert!(effects.contains(&SessionEffect::Update(SessionUpdate::RemoteTyping(false))));
        assert!(scrolls(&effects));
    }

    #[test]
    fn close_stops_typing_and_clears() {
        let mut session = loaded_session(vec![message("1", "c1", "other")]);
        session.handle(SessionInput::Keystroke);

        let effects = session.handle(SessionInput::Close);
        assert_eq!(emits(&effects), vec![&OutboundEvent::typing_stop("c1")]);
        assert!(effects.contains(&SessionEffect::Timer(TimerCommand::Cancel {
            timer: TimerKind::LocalIdle
        })));
        assert_eq!(effects.last(), Some(&SessionEffect::Update(SessionUpdate::Closed)));
        assert!(session.store().is_empty());
        assert_eq!(session.phase(), SessionPhase::Closed);

        assert!(session.handle(SessionInput::Close).is_empty());
        assert!(session
            .handle(SessionInput::Push(new_message("2", "c1", "other")))
            .is_empty());
        assert!(matches!(
            session.begin_send(&mut SendRequest::text("c1", "hi")),
            Err(ChatSyncError::SessionClosed)
        ));
    }
}

mod actor {
    use super::*;

    struct Harness {
        engine: ChatSync,
        transport: Arc<FakeTransport>,
        channel: Arc<RecordingChannel>,
        notifier: Arc<RecordingNotifier>,
        invalidator: Arc<CountingInvalidator>,
    }

    impl Harness {
        fn new() -> Self {
            let transport = Arc::new(FakeTransport::default());
            let channel = Arc::new(RecordingChannel::default());
            let notifier = Arc::new(RecordingNotifier::default());
            let invalidator = Arc::new(CountingInvalidator::default());
            let deps = Collaborators {
                transport: transport.clone(),
                channel: channel.clone(),
                router: Arc::new(EventRouter::new()),
                notifier: notifier.clone(),
                invalidator: invalidator.clone(),
            };
            Self {
                engine: ChatSync::new(config(), "me", deps),
                transport,
                channel,
                notifier,
                invalidator,
            }
        }

        fn route(&self, event: InboundEvent) {
            self.engine.router().route(event);
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn keystrokes_debounce_into_one_start_and_stop() {
        let h = Harness::new();
        let handle = h.engine.open_conversation("c1").await.unwrap();
        settle().await;

        for _ in 0..5 {
            handle.keystroke().await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        assert_eq!(h.channel.count(&OutboundEvent::typing_start("c1")), 1);

        // 200ms already elapsed since the last keystroke
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert_eq!(h.channel.count(&OutboundEvent::typing_stop("c1")), 0);
        assert!(handle.snapshot().await.unwrap().typing.local_is_typing);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(h.channel.count(&OutboundEvent::typing_start("c1")), 1);
        assert_eq!(h.channel.count(&OutboundEvent::typing_stop("c1")), 1);
        assert!(!handle.snapshot().await.unwrap().typing.local_is_typing);
    }

    #[tokio::test(start_paused = true)]
    async fn end_to_end_push_merge_and_seen() {
        let h = Harness::new();
        h.transport
            .push_history(Ok(page(vec![message("1", "c1", "other")])));

        let handle = h.engine.open_conversation("c1").await.unwrap();
        settle().await;
        handle.set_viewport(at_bottom()).await.unwrap();
        settle().await;
        let seen = OutboundEvent::seen("c1", "me");
        let seen_before = h.channel.count(&seen);

        h.route(new_message("2", "c1", "other"));
        settle().await;
        assert_eq!(h.channel.count(&seen), seen_before + 1);

        h.route(new_message("2", "c1", "other"));
        settle().await;
        assert_eq!(h.channel.count(&seen), seen_before + 1);

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.view.message_ids(), vec!["1", "2"]);
        assert_eq!(snapshot.phase, SessionPhase::Ready);
        assert_eq!(h.channel.count(&OutboundEvent::join("c1")), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn message_pushed_before_history_resolves_is_kept() {
        let h = Harness::new();
        h.transport.set_history_delay(Duration::from_millis(100));
        h.transport
            .push_history(Ok(page(vec![message("1", "c1", "other")])));

        let handle = h.engine.open_conversation("c1").await.unwrap();
        h.route(new_message("2", "c1", "other"));
        settle().await;

        let loading = handle.snapshot().await.unwrap();
        assert_eq!(loading.phase, SessionPhase::Loading);
        assert_eq!(loading.pending_events, 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.view.message_ids(), vec!["1", "2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_history_invalidates_once_and_stops_network() {
        let h = Harness::new();
        h.transport.push_history(Err(ChatSyncError::SessionExpired));
        let handle = h.engine.open_conversation("c1").await.unwrap();
        let mut updates = handle.subscribe_updates();
        settle().await;

        assert_eq!(h.invalidator.calls(), 1);
        assert_eq!(updates.try_recv().unwrap(), SessionUpdate::SessionExpired);

        assert!(handle.send("hi", None).await.unwrap_err().is_session_expired());
        assert!(handle.reload().await.unwrap_err().is_session_expired());
        h.route(new_message("2", "c1", "other"));
        handle.keystroke().await.unwrap();
        settle().await;

        assert_eq!(h.transport.history_calls(), 1);
        assert_eq!(h.transport.send_calls(), 0);
        assert_eq!(h.invalidator.calls(), 1);
        assert!(handle.snapshot().await.unwrap().view.messages.is_empty());

        handle.close().await.unwrap();
        assert!(h.channel.events().is_empty());
        assert_eq!(h.notifier.notices().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_send_invalidates_once() {
        let h = Harness::new();
        h.transport.push_send(Err(ChatSyncError::SessionExpired));
        let handle = h.engine.open_conversation("c1").await.unwrap();
        settle().await;

        assert!(handle.send("hi", None).await.unwrap_err().is_session_expired());
        assert!(handle.send("again", None).await.unwrap_err().is_session_expired());

        assert_eq!(h.transport.send_calls(), 1);
        assert_eq!(h.invalidator.calls(), 1);
        assert_eq!(
            handle.snapshot().await.unwrap().phase,
            SessionPhase::Halted
        );
    }

    #[tokio::test(start_paused = true)]
    async fn send_appends_confirmed_message() {
        let h = Harness::new();
        let handle = h.engine.open_conversation("c1").await.unwrap();
        settle().await;
        let mut updates = handle.subscribe_updates();

        let message = handle.send("hello", None).await.unwrap();
        assert_eq!(message.id, "sent-1");
        settle().await;

        assert_eq!(
            updates.try_recv().unwrap(),
            SessionUpdate::MessageAdded {
                message: message.clone(),
                from_viewer: true
            }
        );
        assert_eq!(updates.try_recv().unwrap(), SessionUpdate::ScrollToBottom);
        assert_eq!(
            handle.snapshot().await.unwrap().view.message_ids(),
            vec!["sent-1"]
        );
        assert_eq!(h.transport.sent()[0].content, "hello");
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_media_never_reaches_transport() {
        let h = Harness::new();
        let handle = h.engine.open_conversation("c1").await.unwrap();
        settle().await;

        let err = handle.send("", None).await.unwrap_err();
        assert!(matches!(err, ChatSyncError::Validation(_)));

        let pdf = MediaUpload {
            filename: "doc.pdf".into(),
            mime_type: "application/pdf".into(),
            data: b"%PDF-1.7\n".to_vec(),
        };
        assert!(matches!(
            handle.send("see attached", Some(pdf)).await,
            Err(ChatSyncError::Validation(_))
        ));

        assert_eq!(h.transport.send_calls(), 0);
        assert_eq!(h.notifier.notices().len(), 2);
        assert!(handle.snapshot().await.unwrap().view.messages.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn uploaded_media_carries_sniffed_type() {
        let h = Harness::new();
        let handle = h.engine.open_conversation("c1").await.unwrap();
        settle().await;

        let mislabelled = MediaUpload {
            filename: "cat.pdf".into(),
            mime_type: "application/pdf".into(),
            data: vec![
                0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, b'I', b'H', b'D',
                b'R',
            ],
        };
        handle.send("", Some(mislabelled)).await.unwrap();

        let sent = h.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].media.as_ref().map(|m| m.mime_type.as_str()),
            Some("image/png")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_send_reports_and_keeps_store() {
        let h = Harness::new();
        h.transport
            .push_history(Ok(page(vec![message("1", "c1", "other")])));
        h.transport.push_send(Err(ChatSyncError::Network("reset".into())));
        let handle = h.engine.open_conversation("c1").await.unwrap();
        settle().await;

        assert!(handle.send("hi", None).await.unwrap_err().is_transient());
        settle().await;

        assert_eq!(h.notifier.notices()[0].level, NoticeLevel::Warning);
        assert_eq!(handle.snapshot().await.unwrap().view.message_ids(), vec!["1"]);
        assert_eq!(h.invalidator.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn remote_typing_clears_after_fallback_timeout() {
        let h = Harness::new();
        let handle = h.engine.open_conversation("c1").await.unwrap();
        settle().await;

        h.route(InboundEvent::TypingStart(ConversationRef::new("c1")));
        settle().await;
        assert!(handle.snapshot().await.unwrap().typing.remote_is_typing);

        tokio::time::sleep(Duration::from_secs(4)).await;
        h.route(InboundEvent::TypingStart(ConversationRef::new("c1")));
        settle().await;

        // Refreshed at 4s, so still typing at 6s
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(handle.snapshot().await.unwrap().typing.remote_is_typing);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(!handle.snapshot().await.unwrap().typing.remote_is_typing);
    }

    #[tokio::test(start_paused = true)]
    async fn close_emits_typing_stop_then_leave() {
        let h = Harness::new();
        let handle = h.engine.open_conversation("c1").await.unwrap();
        settle().await;
        handle.keystroke().await.unwrap();
        settle().await;

        handle.close().await.unwrap();
        assert_eq!(
            h.channel.events(),
            vec![
                OutboundEvent::join("c1"),
                OutboundEvent::typing_start("c1"),
                OutboundEvent::typing_stop("c1"),
                OutboundEvent::leave("c1"),
            ]
        );

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(h.channel.count(&OutboundEvent::typing_stop("c1")), 1);
        assert!(matches!(
            handle.snapshot().await,
            Err(ChatSyncError::SessionClosed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn reload_after_network_failure() {
        let h = Harness::new();
        h.transport
            .push_history(Err(ChatSyncError::Network("timed out".into())));
        h.transport
            .push_history(Ok(page(vec![message("1", "c1", "other")])));
        let handle = h.engine.open_conversation("c1").await.unwrap();
        settle().await;

        assert_eq!(handle.snapshot().await.unwrap().phase, SessionPhase::Loading);
        assert_eq!(h.channel.count(&OutboundEvent::join("c1")), 0);

        handle.reload().await.unwrap();
        settle().await;

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.phase, SessionPhase::Ready);
        assert_eq!(snapshot.view.message_ids(), vec!["1"]);
        assert_eq!(h.transport.history_calls(), 2);
        assert_eq!(h.channel.count(&OutboundEvent::join("c1")), 1);
    }
}
