use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use super::{
    ConversationHandle, ConversationSession, SessionEffect, SessionInput, SessionPhase,
    SessionSnapshot, SessionUpdate,
};
use crate::channel::{ConversationSubscription, EventChannel};
use crate::config::ChatSyncConfig;
use crate::engine::Collaborators;
use crate::error::{ChatSyncError, Result};
use crate::history::HistoryLoader;
use crate::notify::{Notice, Notifier, SessionInvalidator};
use crate::presence::{TimerCommand, TimerKind, TimerSlot};
use crate::scroll::ViewportMetrics;
use crate::transport::ChatTransport;
use crate::types::{HistoryPage, Message, SendRequest};

/// Requests from a [`ConversationHandle`].
pub(crate) enum Command {
    Keystroke,
    Viewport(ViewportMetrics),
    InputFocus(bool),
    Send(SendRequest, oneshot::Sender<Result<Message>>),
    Reload(oneshot::Sender<Result<()>>),
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Close(oneshot::Sender<()>),
}

/// Completions posted back by timers and background requests.
enum Internal {
    HistoryLoaded(Result<HistoryPage>),
    SendFinished(Result<Message>, oneshot::Sender<Result<Message>>),
    TypingIdle(u64),
    RemoteTypingExpired(u64),
}

struct SessionRunner {
    session: ConversationSession,
    subscription: ConversationSubscription,
    subscription_live: bool,
    history: HistoryLoader,
    transport: Arc<dyn ChatTransport>,
    channel: Arc<dyn EventChannel>,
    notifier: Arc<dyn Notifier>,
    invalidator: Arc<dyn SessionInvalidator>,
    updates: broadcast::Sender<SessionUpdate>,
    commands: mpsc::Receiver<Command>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    idle_timer: TimerSlot,
    remote_timer: TimerSlot,
    tasks: Vec<JoinHandle<()>>,
}

/// Starts a runner task for `conversation_id` and returns its handle.
///
/// The router subscription is taken before this returns, so push events for
/// the conversation are captured from this point on.
pub(crate) fn spawn(
    conversation_id: &str,
    viewer_id: &str,
    config: &ChatSyncConfig,
    deps: &Collaborators,
) -> ConversationHandle {
    let buffer = config.channel_buffer.max(1);
    let (commands_tx, commands) = mpsc::channel(buffer);
    let (updates, _) = broadcast::channel(buffer);
    let (internal_tx, internal_rx) = mpsc::unbounded_channel();

    let runner = SessionRunner {
        session: ConversationSession::new(conversation_id, viewer_id, config),
        subscription: ConversationSubscription::open(
            &deps.router,
            deps.channel.clone(),
            conversation_id,
        ),
        subscription_live: true,
        history: HistoryLoader::new(deps.transport.clone(), deps.channel.clone()),
        transport: deps.transport.clone(),
        channel: deps.channel.clone(),
        notifier: deps.notifier.clone(),
        invalidator: deps.invalidator.clone(),
        updates: updates.clone(),
        commands,
        internal_tx,
        internal_rx,
        idle_timer: TimerSlot::new(),
        remote_timer: TimerSlot::new(),
        tasks: Vec::new(),
    };
    tokio::spawn(runner.run());

    ConversationHandle::new(conversation_id, commands_tx, updates)
}

impl SessionRunner {
    async fn run(mut self) {
        let effects = self.session.start();
        self.apply(effects);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if !self.on_command(command) {
                            break;
                        }
                    }
                    None => {
                        self.shutdown();
                        break;
                    }
                },
                Some(internal) = self.internal_rx.recv() => self.on_internal(internal),
                event = self.subscription.recv(), if self.subscription_live => match event {
                    Some(event) => self.handle(SessionInput::Push(event)),
                    None => {
                        tracing::warn!(
                            target: "chatsync::session::runner",
                            "Event stream for {} ended",
                            self.session.conversation_id()
                        );
                        self.subscription_live = false;
                    }
                },
            }
        }
    }

    /// Returns false once the session has been closed.
    fn on_command(&mut self, command: Command) -> bool {
        match command {
            Command::Keystroke => self.handle(SessionInput::Keystroke),
            Command::Viewport(metrics) => self.handle(SessionInput::Viewport(metrics)),
            Command::InputFocus(focused) => self.handle(SessionInput::InputFocus(focused)),
            Command::Send(request, reply) => self.start_send(request, reply),
            Command::Reload(reply) => match self.session.reload() {
                Ok(effects) => {
                    self.apply(effects);
                    let _ = reply.send(Ok(()));
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },
            Command::Snapshot(reply) => {
                let _ = reply.send(self.session.snapshot());
            }
            Command::Close(reply) => {
                self.shutdown();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn on_internal(&mut self, internal: Internal) {
        match internal {
            Internal::HistoryLoaded(result) => self.handle(SessionInput::HistoryLoaded(result)),
            Internal::SendFinished(result, reply) => {
                let copy = match &result {
                    Ok(message) => Ok(message.clone()),
                    Err(e) => Err(e.duplicate()),
                };
                self.handle(SessionInput::SendCompleted(copy));
                let _ = reply.send(result);
            }
            Internal::TypingIdle(generation) => {
                self.handle(SessionInput::TypingIdle { generation })
            }
            Internal::RemoteTypingExpired(generation) => {
                self.handle(SessionInput::RemoteTypingExpired { generation })
            }
        }
    }

    fn handle(&mut self, input: SessionInput) {
        let effects = self.session.handle(input);
        self.apply(effects);
    }

    fn start_send(&mut self, mut request: SendRequest, reply: oneshot::Sender<Result<Message>>) {
        if let Err(e) = self.session.begin_send(&mut request) {
            if matches!(e, ChatSyncError::Validation(_)) {
                self.notifier.notify(&Notice::from_error(&e));
            }
            let _ = reply.send(Err(e));
            return;
        }

        let transport = self.transport.clone();
        let internal = self.internal_tx.clone();
        self.track(tokio::spawn(async move {
            let result = transport.send(&request).await;
            let _ = internal.send(Internal::SendFinished(result, reply));
        }));
    }

    fn apply(&mut self, effects: Vec<SessionEffect>) {
        for effect in effects {
            match effect {
                SessionEffect::Emit(event) => {
                    if let Err(e) = self.channel.emit(event) {
                        tracing::warn!(
                            target: "chatsync::session::runner",
                            "Failed to emit event for {}: {}",
                            self.session.conversation_id(),
                            e
                        );
                    }
                }
                SessionEffect::Update(update) => {
                    // No receivers is fine
                    let _ = self.updates.send(update);
                }
                SessionEffect::Timer(command) => self.apply_timer(command),
                SessionEffect::Notify(notice) => self.notifier.notify(&notice),
                SessionEffect::InvalidateSession => self.invalidator.invalidate(),
                SessionEffect::FetchHistory => {
                    let loader = self.history.clone();
                    let conversation_id = self.session.conversation_id().to_string();
                    let internal = self.internal_tx.clone();
                    self.track(tokio::spawn(async move {
                        let result = loader.load(&conversation_id).await;
                        let _ = internal.send(Internal::HistoryLoaded(result));
                    }));
                }
            }
        }
    }

    fn apply_timer(&mut self, command: TimerCommand) {
        match command {
            TimerCommand::Reset {
                timer,
                generation,
                after,
            } => {
                let internal = self.internal_tx.clone();
                let message = match timer {
                    TimerKind::LocalIdle => Internal::TypingIdle(generation),
                    TimerKind::RemoteTyping => Internal::RemoteTypingExpired(generation),
                };
                self.slot(timer).arm(after, async move {
                    let _ = internal.send(message);
                });
            }
            TimerCommand::Cancel { timer } => self.slot(timer).cancel(),
        }
    }

    fn slot(&mut self, timer: TimerKind) -> &mut TimerSlot {
        match timer {
            TimerKind::LocalIdle => &mut self.idle_timer,
            TimerKind::RemoteTyping => &mut self.remote_timer,
        }
    }

    fn track(&mut self, task: JoinHandle<()>) {
        self.tasks.retain(|task| !task.is_finished());
        self.tasks.push(task);
    }

    /// Typing-stop, timer cancellation, leave, then the store is dropped.
    fn shutdown(&mut self) {
        let halted = self.session.phase() == SessionPhase::Halted;
        self.handle(SessionInput::Close);

        self.idle_timer.cancel();
        self.remote_timer.cancel();
        for task in self.tasks.drain(..) {
            task.abort();
        }

        if halted {
            self.subscription.detach();
        } else {
            self.subscription.close();
        }
        self.subscription_live = false;
    }
}
