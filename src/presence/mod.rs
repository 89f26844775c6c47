//! Presence Tracker
//!
//! Typing presence has two independent axes. The local axis debounces
//! keystrokes into a single typing-start / typing-stop pair; the remote axis
//! mirrors the peer's typing signals for display only.
//!
//! The tracker itself never sleeps. It hands out generation-tagged
//! [`TimerCommand`]s which the session runner arms in a [`TimerSlot`]; an
//! expiry whose generation is no longer current is ignored.

mod timer;

pub use timer::TimerSlot;

use std::time::Duration;

use crate::events::OutboundEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    LocalIdle,
    RemoteTyping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCommand {
    Reset {
        timer: TimerKind,
        generation: u64,
        after: Duration,
    },
    Cancel {
        timer: TimerKind,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypingState {
    pub local_is_typing: bool,
    pub remote_is_typing: bool,
}

/// What a presence input produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceOutcome {
    pub emit: Option<OutboundEvent>,
    pub timers: Vec<TimerCommand>,
    /// The remote typing indicator flipped.
    pub remote_changed: bool,
}

#[derive(Debug, Clone)]
pub struct PresenceTracker {
    conversation_id: String,
    idle_timeout: Duration,
    remote_timeout: Option<Duration>,
    state: TypingState,
    local_generation: u64,
    remote_generation: u64,
}

impl PresenceTracker {
    pub fn new(
        conversation_id: &str,
        idle_timeout: Duration,
        remote_timeout: Option<Duration>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            idle_timeout,
            remote_timeout,
            state: TypingState::default(),
            local_generation: 0,
            remote_generation: 0,
        }
    }

    pub fn state(&self) -> TypingState {
        self.state
    }

    /// Every keystroke re-arms the idle timer; only the first one after idle
    /// emits typing-start.
    pub fn on_keystroke(&mut self) -> PresenceOutcome {
        let emit = if self.state.local_is_typing {
            None
        } else {
            self.state.local_is_typing = true;
            Some(OutboundEvent::typing_start(&self.conversation_id))
        };

        self.local_generation += 1;
        PresenceOutcome {
            emit,
            timers: vec![TimerCommand::Reset {
                timer: TimerKind::LocalIdle,
                generation: self.local_generation,
                after: self.idle_timeout,
            }],
            remote_changed: false,
        }
    }

    pub fn on_local_idle(&mut self, generation: u64) -> PresenceOutcome {
        if generation != self.local_generation || !self.state.local_is_typing {
            tracing::debug!(
                target: "chatsync::presence::on_local_idle",
                "Ignoring stale idle timer {} (current {})",
                generation,
                self.local_generation
            );
            return PresenceOutcome::default();
        }

        self.state.local_is_typing = false;
        PresenceOutcome {
            emit: Some(OutboundEvent::typing_stop(&self.conversation_id)),
            ..Default::default()
        }
    }

    pub fn on_remote_typing_start(&mut self) -> PresenceOutcome {
        let remote_changed = !self.state.remote_is_typing;
        self.state.remote_is_typing = true;

        let timers = match self.remote_timeout {
            Some(after) => {
                self.remote_generation += 1;
                vec![TimerCommand::Reset {
                    timer: TimerKind::RemoteTyping,
                    generation: self.remote_generation,
                    after,
                }]
            }
            None => vec![],
        };

        PresenceOutcome {
            emit: None,
            timers,
            remote_changed,
        }
    }

    pub fn on_remote_typing_stop(&mut self) -> PresenceOutcome {
        let remote_changed = self.state.remote_is_typing;
        self.state.remote_is_typing = false;
        self.remote_generation += 1;
        PresenceOutcome {
            emit: None,
            timers: vec![TimerCommand::Cancel {
                timer: TimerKind::RemoteTyping,
            }],
            remote_changed,
        }
    }

    /// Fallback for a typing-stop that never arrived.
    pub fn on_remote_expired(&mut self, generation: u64) -> PresenceOutcome {
        if generation != self.remote_generation || !self.state.remote_is_typing {
            return PresenceOutcome::default();
        }
        tracing::debug!(
            target: "chatsync::presence::on_remote_expired",
            "Clearing remote typing indicator for {} after timeout",
            self.conversation_id
        );
        self.state.remote_is_typing = false;
        PresenceOutcome {
            remote_changed: true,
            ..Default::default()
        }
    }

    /// Tears down both axes, emitting typing-stop if the viewer was typing.
    pub fn stop(&mut self) -> PresenceOutcome {
        let emit = self
            .state
            .local_is_typing
            .then(|| OutboundEvent::typing_stop(&self.conversation_id));
        let remote_changed = self.state.remote_is_typing;

        self.state = TypingState::default();
        self.local_generation += 1;
        self.remote_generation += 1;

        PresenceOutcome {
            emit,
            timers: vec![
                TimerCommand::Cancel {
                    timer: TimerKind::LocalIdle,
                },
                TimerCommand::Cancel {
                    timer: TimerKind::RemoteTyping,
                },
            ],
            remote_changed,
        }
    }
}
