use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::Value;
use snafu::Snafu;
use tokio::sync::mpsc;

use crate::event::{StreamEventMapped, StreamTarget};
use crate::message::ProviderMessage;
use crate::source::Source;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000/api";
pub const DEFAULT_SOURCES_PATH: &str = "getSources";
pub const DEFAULT_PARSED_SOURCES_PATH: &str = "getParsedSources";
pub const DEFAULT_CHAT_PATH: &str = "getChat";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Where the three tutoring endpoints live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub base_url: String,
    pub sources_path: String,
    pub parsed_sources_path: String,
    pub chat_path: String,
    pub request_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl BackendConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim().trim_end_matches('/').to_string(),
            sources_path: DEFAULT_SOURCES_PATH.to_string(),
            parsed_sources_path: DEFAULT_PARSED_SOURCES_PATH.to_string(),
            chat_path: DEFAULT_CHAT_PATH.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_paths(
        mut self,
        sources_path: impl Into<String>,
        parsed_sources_path: impl Into<String>,
        chat_path: impl Into<String>,
    ) -> Self {
        self.sources_path = sources_path.into();
        self.parsed_sources_path = parsed_sources_path.into();
        self.chat_path = chat_path.into();
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Joins the base URL and an endpoint path with exactly one slash.
    pub fn endpoint_url(&self, path: &str) -> String {
        let path = path.trim().trim_start_matches('/');
        if path.is_empty() {
            return self.base_url.clone();
        }
        format!("{}/{}", self.base_url, path)
    }

    pub fn sources_url(&self) -> String {
        self.endpoint_url(&self.sources_path)
    }

    pub fn parsed_sources_url(&self) -> String {
        self.endpoint_url(&self.parsed_sources_path)
    }

    pub fn chat_url(&self) -> String {
        self.endpoint_url(&self.chat_path)
    }
}

/// One chat turn: the full transcript so far, routed by its stream target.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub target: StreamTarget,
    pub messages: Vec<ProviderMessage>,
}

impl ChatRequest {
    pub fn new(target: StreamTarget, messages: Vec<ProviderMessage>) -> Self {
        Self { target, messages }
    }
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type ChatWorker = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum BackendError {
    #[snafu(display("base URL '{base_url}' must start with http:// or https://"))]
    InvalidBaseUrl {
        stage: &'static str,
        base_url: String,
    },
    #[snafu(display("failed to build HTTP client on `{stage}`, {source}"))]
    BuildHttpClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("request to {endpoint} failed on `{stage}`, {source}"))]
    SendRequest {
        stage: &'static str,
        endpoint: String,
        source: reqwest::Error,
    },
    #[snafu(display("failed to decode response from {endpoint} on `{stage}`, {source}"))]
    DecodeResponse {
        stage: &'static str,
        endpoint: String,
        source: reqwest::Error,
    },
    #[snafu(display("chat endpoint returned status {status}: {body}"))]
    ChatStatus {
        stage: &'static str,
        status: u16,
        body: String,
    },
    #[snafu(display("chat request for {target:?} has no messages"))]
    EmptyMessageSet {
        stage: &'static str,
        target: StreamTarget,
    },
    #[snafu(display("chat response body failed on `{stage}`: {message}"))]
    BodyStream {
        stage: &'static str,
        message: String,
    },
}

/// Receiving half of one chat turn's ordered event channel.
pub struct ChatEventStream {
    target: StreamTarget,
    events: mpsc::UnboundedReceiver<StreamEventMapped>,
}

/// A started chat turn: the caller spawns `worker` and drains `stream`.
pub struct ChatStreamHandle {
    pub stream: ChatEventStream,
    pub worker: ChatWorker,
}

impl ChatEventStream {
    pub(crate) fn new(
        target: StreamTarget,
        events: mpsc::UnboundedReceiver<StreamEventMapped>,
    ) -> Self {
        Self { target, events }
    }

    pub fn target(&self) -> StreamTarget {
        self.target
    }

    pub async fn recv(&mut self) -> Option<StreamEventMapped> {
        self.events.recv().await
    }
}

/// The three HTTP collaborators of a tutoring session.
pub trait TutorBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Sources for a question; a non-success status yields an empty list.
    fn fetch_sources<'a>(&'a self, question: &'a str) -> BoxFuture<'a, BackendResult<Vec<Source>>>;

    /// Parsed source content; a non-success status yields `None`.
    fn fetch_parsed_sources<'a>(
        &'a self,
        sources: &'a [Source],
    ) -> BoxFuture<'a, BackendResult<Option<Value>>>;

    fn stream_chat(&self, request: ChatRequest) -> BackendResult<ChatStreamHandle>;
}

pub fn make_event_stream(
    target: StreamTarget,
) -> (mpsc::UnboundedSender<StreamEventMapped>, ChatEventStream) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    (event_tx, ChatEventStream::new(target, event_rx))
}
