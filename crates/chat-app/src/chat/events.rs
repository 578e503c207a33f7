use tutor_llm::{StreamEventMapped, StreamEventPayload};

use crate::chat::message::{StreamTarget, StreamTransition};

/// A user question accepted for one chat turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submit {
    pub target: StreamTarget,
    pub content: String,
}

impl Submit {
    pub fn new(target: StreamTarget, content: impl Into<String>) -> Self {
        Self {
            target,
            content: content.into(),
        }
    }

    pub fn start_transition(&self) -> StreamTransition {
        StreamTransition::Start(self.target)
    }
}

/// Maps terminal payloads to stream lifecycle transitions.
///
/// Deltas return `None`; they change the transcript, not the lifecycle.
pub fn terminal_transition(event: &StreamEventMapped) -> Option<StreamTransition> {
    match &event.payload {
        StreamEventPayload::Delta(_) => None,
        StreamEventPayload::Done => Some(StreamTransition::Complete(event.target)),
        StreamEventPayload::Error(message) => Some(StreamTransition::Fail {
            target: event.target,
            message: message.clone(),
        }),
    }
}
