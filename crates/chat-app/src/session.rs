use std::sync::Arc;

use snafu::{ResultExt, Snafu};
use tokio::task::JoinHandle;
use tutor_llm::{
    BackendError, ChatEventStream, ChatRequest, Source, StreamEventMapped, StreamEventPayload,
    TutorBackend,
};

use crate::chat::events::{Submit, terminal_transition};
use crate::chat::message::{
    ConversationId, StreamSessionId, StreamState, StreamTarget, StreamTransition,
    StreamTransitionRejection,
};
use crate::chat::transcript::{TranscriptError, TranscriptStore};
use crate::notification::{
    CHAT_FAILED_MESSAGE, EMPTY_QUESTION_MESSAGE, EMPTY_TOPIC_MESSAGE, Notification,
    NotificationList, SOURCES_UNAVAILABLE_MESSAGE, ERROR_TITLE,
};
use crate::prompt::{AgeGroup, build_system_prompt};

const STREAM_CLOSED_MESSAGE: &str = "chat stream ended before a terminal event";

/// Which screen the session is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewStage {
    #[default]
    Landing,
    Result,
}

/// What one stream event did to the active turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnProgress {
    Continuing,
    Completed(StreamTarget),
    Failed { target: StreamTarget, message: String },
    /// The event belongs to a turn that is no longer active.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnSummary {
    pub target: StreamTarget,
    pub fragments: usize,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SessionError {
    #[snafu(display("{message}"))]
    Validation {
        stage: &'static str,
        message: &'static str,
    },
    #[snafu(display("no topic has been started yet"))]
    NoTopic { stage: &'static str },
    #[snafu(display("a response is still streaming for {active:?}"))]
    Busy {
        stage: &'static str,
        active: StreamTarget,
    },
    #[snafu(display("age group cannot change once a topic has started"))]
    AgeGroupLocked { stage: &'static str },
    #[snafu(display("stream transition rejected on `{stage}`: {rejection}"))]
    StreamRejected {
        stage: &'static str,
        rejection: StreamTransitionRejection,
    },
    #[snafu(display("failed to open chat stream on `{stage}`: {source}"))]
    OpenChat {
        stage: &'static str,
        source: BackendError,
    },
    #[snafu(display("chat turn failed: {message}"))]
    ChatFailed {
        stage: &'static str,
        message: String,
    },
    #[snafu(display("failed to record message on `{stage}`: {source}"))]
    Transcript {
        stage: &'static str,
        source: TranscriptError,
    },
}

pub type SessionResult<T> = Result<T, SessionError>;

/// One learner's tutoring conversation on one topic.
///
/// The session owns the transcript and the stream lifecycle. A chat turn is
/// started by `start_topic` or `send_follow_up`, which return the turn's event
/// stream; the caller feeds each event back through `handle_stream_event` (or
/// lets `drive_turn` do it).
pub struct TutorSession {
    backend: Arc<dyn TutorBackend>,
    conversation_id: ConversationId,
    transcript: TranscriptStore,
    notifications: NotificationList,
    age_group: AgeGroup,
    topic: Option<String>,
    sources: Vec<Source>,
    view_stage: ViewStage,
    stream_state: StreamState,
    next_stream_session_id: u64,
    stream_worker: Option<JoinHandle<()>>,
}

impl TutorSession {
    pub fn new(backend: Arc<dyn TutorBackend>, age_group: AgeGroup) -> Self {
        Self {
            backend,
            conversation_id: ConversationId::new(1),
            transcript: TranscriptStore::new(),
            notifications: NotificationList::new(),
            age_group,
            topic: None,
            sources: Vec::new(),
            view_stage: ViewStage::Landing,
            stream_state: StreamState::Idle,
            next_stream_session_id: 1,
            stream_worker: None,
        }
    }

    pub fn transcript(&self) -> &TranscriptStore {
        &self.transcript
    }

    pub fn transcript_mut(&mut self) -> &mut TranscriptStore {
        &mut self.transcript
    }

    pub fn notifications(&self) -> &NotificationList {
        &self.notifications
    }

    pub fn notifications_mut(&mut self) -> &mut NotificationList {
        &mut self.notifications
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    pub fn age_group(&self) -> AgeGroup {
        self.age_group
    }

    pub fn set_age_group(&mut self, age_group: AgeGroup) -> SessionResult<()> {
        snafu::ensure!(
            self.topic.is_none(),
            AgeGroupLockedSnafu {
                stage: "set-age-group",
            }
        );
        self.age_group = age_group;
        Ok(())
    }

    pub fn view_stage(&self) -> ViewStage {
        self.view_stage
    }

    pub fn stream_state(&self) -> &StreamState {
        &self.stream_state
    }

    /// True from the moment a turn starts until its terminal event.
    pub fn is_loading(&self) -> bool {
        self.stream_state.is_streaming()
    }

    /// Begins tutoring on `input`: looks up sources, seeds the transcript with
    /// the tutor persona and the question, and opens the first chat turn.
    ///
    /// A blank topic only raises a validation notification.
    pub async fn start_topic(&mut self, input: &str) -> SessionResult<ChatEventStream> {
        let question = input.trim();
        if question.is_empty() {
            return self.reject_input("start-topic", EMPTY_TOPIC_MESSAGE);
        }
        self.ensure_idle("start-topic")?;

        self.view_stage = ViewStage::Result;
        self.topic = Some(question.to_string());

        self.sources = match self.backend.fetch_sources(question).await {
            Ok(sources) => sources,
            Err(error) => {
                tracing::warn!(backend = self.backend.name(), error = %error, "source lookup failed");
                self.notifications
                    .push(Notification::warning("Sources", SOURCES_UNAVAILABLE_MESSAGE));
                Vec::new()
            }
        };
        tracing::info!(topic = question, sources = self.sources.len(), "starting topic");

        let parsed_sources = match self.backend.fetch_parsed_sources(&self.sources).await {
            Ok(parsed) => parsed,
            Err(error) => {
                tracing::warn!(backend = self.backend.name(), error = %error, "parsed source lookup failed");
                None
            }
        };

        let system_prompt = build_system_prompt(parsed_sources.as_ref(), self.age_group);
        self.transcript.seed(system_prompt, question);

        let target = self.allocate_target();
        self.begin_turn(Submit::new(target, question))
    }

    /// Appends a follow-up question and opens a chat turn for it.
    ///
    /// Rejected with `Busy` while a previous answer is still streaming.
    pub fn send_follow_up(&mut self, input: &str) -> SessionResult<ChatEventStream> {
        snafu::ensure!(
            self.topic.is_some(),
            NoTopicSnafu {
                stage: "send-follow-up",
            }
        );
        self.ensure_idle("send-follow-up")?;
        if input.trim().is_empty() {
            return self.reject_input("send-follow-up", EMPTY_QUESTION_MESSAGE);
        }

        self.transcript
            .append_user_message(input)
            .context(TranscriptSnafu {
                stage: "append-follow-up",
            })?;

        let target = self.allocate_target();
        self.begin_turn(Submit::new(target, input))
    }

    /// Applies one event of the active turn.
    pub fn handle_stream_event(&mut self, event: StreamEventMapped) -> TurnProgress {
        if !self.stream_state.accepts_stream_event(event.target) {
            tracing::debug!(target = ?event.target, "ignoring event for inactive turn");
            return TurnProgress::Ignored;
        }

        let transition = terminal_transition(&event);
        match (event.payload, transition) {
            (StreamEventPayload::Delta(fragment), _) => {
                self.transcript.append_or_merge_assistant_fragment(&fragment);
                TurnProgress::Continuing
            }
            (StreamEventPayload::Done, Some(transition)) => {
                self.finish_turn(transition);
                tracing::debug!(target = ?event.target, "chat turn completed");
                TurnProgress::Completed(event.target)
            }
            (StreamEventPayload::Error(message), Some(transition)) => {
                self.finish_turn(transition);
                self.report_chat_failure(event.target, &message);
                TurnProgress::Failed {
                    target: event.target,
                    message,
                }
            }
            (_, None) => TurnProgress::Ignored,
        }
    }

    /// Handles the end of a turn's channel; a turn still active here failed.
    pub fn handle_stream_closed(&mut self, target: StreamTarget) -> TurnProgress {
        self.stream_worker = None;
        if !self.stream_state.accepts_stream_event(target) {
            return TurnProgress::Ignored;
        }

        let message = STREAM_CLOSED_MESSAGE.to_string();
        self.finish_turn(StreamTransition::Fail {
            target,
            message: message.clone(),
        });
        self.report_chat_failure(target, &message);
        TurnProgress::Failed { target, message }
    }

    /// Consumes a turn's events until it completes or fails.
    pub async fn drive_turn(&mut self, mut stream: ChatEventStream) -> SessionResult<TurnSummary> {
        let target = stream.target();
        let mut fragments = 0;

        loop {
            let progress = match stream.recv().await {
                Some(event) => self.handle_stream_event(event),
                None => match self.handle_stream_closed(target) {
                    TurnProgress::Ignored => TurnProgress::Completed(target),
                    progress => progress,
                },
            };

            match progress {
                TurnProgress::Continuing => fragments += 1,
                TurnProgress::Ignored => {}
                TurnProgress::Completed(target) => return Ok(TurnSummary { target, fragments }),
                TurnProgress::Failed { message, .. } => {
                    return ChatFailedSnafu {
                        stage: "drive-turn",
                        message,
                    }
                    .fail();
                }
            }
        }
    }

    fn begin_turn(&mut self, submit: Submit) -> SessionResult<ChatEventStream> {
        let target = submit.target;
        self.stream_state = self
            .stream_state
            .apply(submit.start_transition())
            .map_err(|rejection| SessionError::StreamRejected {
                stage: "begin-turn",
                rejection,
            })?;

        let messages = self
            .transcript
            .snapshot()
            .iter()
            .map(|message| message.to_provider_message())
            .collect();
        tracing::debug!(target = ?target, chars = submit.content.len(), "opening chat turn");

        match self.backend.stream_chat(ChatRequest::new(target, messages)) {
            Ok(handle) => {
                self.stream_worker = Some(tokio::spawn(handle.worker));
                Ok(handle.stream)
            }
            Err(error) => {
                let message = error.to_string();
                self.finish_turn(StreamTransition::Fail {
                    target,
                    message: message.clone(),
                });
                self.report_chat_failure(target, &message);
                Err(error).context(OpenChatSnafu {
                    stage: "begin-turn",
                })
            }
        }
    }

    fn finish_turn(&mut self, transition: StreamTransition) {
        match self.stream_state.apply(transition) {
            Ok(next) => self.stream_state = next,
            Err(rejection) => {
                tracing::warn!(rejection = %rejection, "ignoring stream transition");
            }
        }
        self.stream_worker = None;
    }

    fn report_chat_failure(&mut self, target: StreamTarget, message: &str) {
        tracing::warn!(target = ?target, error = message, "chat turn failed");
        self.notifications
            .push(Notification::error(ERROR_TITLE, CHAT_FAILED_MESSAGE));
    }

    fn reject_input<T>(&mut self, stage: &'static str, message: &'static str) -> SessionResult<T> {
        self.notifications
            .push(Notification::error(ERROR_TITLE, message));
        ValidationSnafu { stage, message }.fail()
    }

    fn ensure_idle(&self, stage: &'static str) -> SessionResult<()> {
        match self.stream_state.active_target() {
            Some(active) => BusySnafu { stage, active }.fail(),
            None => Ok(()),
        }
    }

    fn allocate_target(&mut self) -> StreamTarget {
        let session_id = StreamSessionId::new(self.next_stream_session_id);
        // Reserve the id immediately so a later turn never reuses a target.
        self.next_stream_session_id = self.next_stream_session_id.saturating_add(1);
        StreamTarget::new(self.conversation_id, session_id)
    }
}

impl Drop for TutorSession {
    fn drop(&mut self) {
        if let Some(worker) = self.stream_worker.take() {
            worker.abort();
        }
    }
}
