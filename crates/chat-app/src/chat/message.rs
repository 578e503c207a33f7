pub use tutor_llm::{ConversationId, Role, StreamSessionId, StreamTarget};

use tutor_llm::ProviderMessage;

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    pub fn to_provider_message(&self) -> ProviderMessage {
        ProviderMessage::new(self.role, self.content.clone())
    }
}

/// Stream lifecycle of the conversation's current chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StreamState {
    #[default]
    Idle,
    Streaming(StreamTarget),
    Done(StreamTarget),
    Error {
        target: StreamTarget,
        message: String,
    },
}

/// State transition input for stream lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamTransition {
    Start(StreamTarget),
    Complete(StreamTarget),
    Fail {
        target: StreamTarget,
        message: String,
    },
}

/// Rejection reason for illegal stream transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamTransitionRejection {
    AlreadyStreaming {
        active: StreamTarget,
        attempted: StreamTarget,
    },
    NoActiveStream,
    SessionMismatch {
        active: StreamTarget,
        attempted: StreamTarget,
    },
}

impl std::fmt::Display for StreamTransitionRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyStreaming { active, attempted } => write!(
                f,
                "stream {attempted:?} cannot start while {active:?} is active"
            ),
            Self::NoActiveStream => write!(f, "no stream is active"),
            Self::SessionMismatch { active, attempted } => write!(
                f,
                "stream {attempted:?} does not match active stream {active:?}"
            ),
        }
    }
}

/// Result type for stream transition application.
pub type StreamTransitionResult = Result<StreamState, StreamTransitionRejection>;

impl StreamState {
    /// Returns active streaming target if and only if state is `Streaming`.
    pub fn active_target(&self) -> Option<StreamTarget> {
        match self {
            Self::Streaming(target) => Some(*target),
            Self::Idle | Self::Done(_) | Self::Error { .. } => None,
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming(_))
    }

    /// Returns true when incoming stream data matches the active session.
    pub fn accepts_stream_event(&self, target: StreamTarget) -> bool {
        matches!(self, Self::Streaming(active) if *active == target)
    }

    /// Applies one transition deterministically.
    ///
    /// Non-streaming states may start a new turn directly. `Complete` and `Fail`
    /// must match the currently active turn exactly.
    pub fn apply(&self, transition: StreamTransition) -> StreamTransitionResult {
        match transition {
            StreamTransition::Start(target) => self.apply_start(target),
            StreamTransition::Complete(target) => self.apply_complete(target),
            StreamTransition::Fail { target, message } => self.apply_fail(target, message),
        }
    }

    fn apply_start(&self, target: StreamTarget) -> StreamTransitionResult {
        match self {
            Self::Streaming(active) if *active != target => {
                Err(StreamTransitionRejection::AlreadyStreaming {
                    active: *active,
                    attempted: target,
                })
            }
            Self::Streaming(_) => Ok(self.clone()),
            Self::Idle | Self::Done(_) | Self::Error { .. } => Ok(Self::Streaming(target)),
        }
    }

    fn apply_complete(&self, target: StreamTarget) -> StreamTransitionResult {
        match self {
            Self::Streaming(active) if *active == target => Ok(Self::Done(target)),
            Self::Streaming(active) => Err(StreamTransitionRejection::SessionMismatch {
                active: *active,
                attempted: target,
            }),
            Self::Idle | Self::Done(_) | Self::Error { .. } => {
                Err(StreamTransitionRejection::NoActiveStream)
            }
        }
    }

    fn apply_fail(&self, target: StreamTarget, message: String) -> StreamTransitionResult {
        match self {
            Self::Streaming(active) if *active == target => Ok(Self::Error { target, message }),
            Self::Streaming(active) => Err(StreamTransitionRejection::SessionMismatch {
                active: *active,
                attempted: target,
            }),
            Self::Idle | Self::Done(_) | Self::Error { .. } => {
                Err(StreamTransitionRejection::NoActiveStream)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(session: u64) -> StreamTarget {
        StreamTarget::new(ConversationId::new(1), StreamSessionId::new(session))
    }

    #[test]
    fn start_rejected_while_another_turn_streams() {
        let state = StreamState::Idle.apply(StreamTransition::Start(target(1))).unwrap();

        let rejection = state.apply(StreamTransition::Start(target(2))).unwrap_err();

        assert_eq!(
            rejection,
            StreamTransitionRejection::AlreadyStreaming {
                active: target(1),
                attempted: target(2)
            }
        );
    }

    #[test]
    fn terminal_transitions_must_match_active_turn() {
        let state = StreamState::Streaming(target(4));

        assert!(matches!(
            state.apply(StreamTransition::Complete(target(3))),
            Err(StreamTransitionRejection::SessionMismatch { .. })
        ));
        assert_eq!(
            state.apply(StreamTransition::Complete(target(4))),
            Ok(StreamState::Done(target(4)))
        );
        assert_eq!(
            StreamState::Idle.apply(StreamTransition::Fail {
                target: target(4),
                message: "boom".to_string()
            }),
            Err(StreamTransitionRejection::NoActiveStream)
        );
    }

    #[test]
    fn finished_turns_accept_a_new_start() {
        let failed = StreamState::Error {
            target: target(1),
            message: "network".to_string(),
        };

        let next = failed.apply(StreamTransition::Start(target(2))).unwrap();

        assert!(next.accepts_stream_event(target(2)));
        assert!(!next.accepts_stream_event(target(1)));
        assert_eq!(next.active_target(), Some(target(2)));
    }
}
