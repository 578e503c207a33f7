use reqwest::header::{ACCEPT, HeaderValue};
use serde::Serialize;
use serde_json::Value;
use snafu::{ResultExt, ensure};
use tokio::sync::mpsc;

use crate::backend::{
    BackendConfig, BackendError, BackendResult, BoxFuture, BuildHttpClientSnafu, ChatRequest,
    ChatStreamHandle, ChatWorker, DecodeResponseSnafu, EmptyMessageSetSnafu, InvalidBaseUrlSnafu,
    SendRequestSnafu, TutorBackend, make_event_stream,
};
use crate::event::{StreamEventMapped, StreamTarget};
use crate::ingest::ingest_byte_stream;
use crate::message::ProviderMessage;
use crate::source::Source;

pub const HTTP_BACKEND_NAME: &str = "http";
const USER_AGENT: &str = concat!("tutor/", env!("CARGO_PKG_VERSION"));
const EVENT_STREAM: &str = "text/event-stream";

#[derive(Serialize)]
struct SourcesBody<'a> {
    question: &'a str,
}

#[derive(Serialize)]
struct ParsedSourcesBody<'a> {
    sources: &'a [Source],
}

#[derive(Serialize)]
struct ChatBody<'a> {
    messages: &'a [ProviderMessage],
}

/// Calls the tutoring endpoints over HTTP with one shared `reqwest::Client`.
///
/// The request timeout bounds connecting and the two source calls; a chat body
/// may stream for as long as the model keeps talking.
pub struct HttpBackend {
    config: BackendConfig,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> BackendResult<Self> {
        ensure!(
            config.base_url.starts_with("http://") || config.base_url.starts_with("https://"),
            InvalidBaseUrlSnafu {
                stage: "http-backend-new",
                base_url: config.base_url.clone(),
            }
        );

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(config.request_timeout)
            .build()
            .context(BuildHttpClientSnafu {
                stage: "build-client",
            })?;

        Ok(Self { config, client })
    }

    async fn post_sources(&self, question: &str) -> BackendResult<Vec<Source>> {
        let endpoint = self.config.sources_url();
        let response = self
            .client
            .post(&endpoint)
            .timeout(self.config.request_timeout)
            .json(&SourcesBody { question })
            .send()
            .await
            .context(SendRequestSnafu {
                stage: "send-sources-request",
                endpoint: endpoint.clone(),
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                endpoint = %endpoint,
                status = status.as_u16(),
                "sources endpoint returned non-success status; using no sources"
            );
            return Ok(Vec::new());
        }

        let sources = response
            .json::<Vec<Source>>()
            .await
            .context(DecodeResponseSnafu {
                stage: "decode-sources-response",
                endpoint,
            })?;
        tracing::debug!(source_count = sources.len(), "fetched sources");
        Ok(sources)
    }

    async fn post_parsed_sources(&self, sources: &[Source]) -> BackendResult<Option<Value>> {
        let endpoint = self.config.parsed_sources_url();
        let response = self
            .client
            .post(&endpoint)
            .timeout(self.config.request_timeout)
            .json(&ParsedSourcesBody { sources })
            .send()
            .await
            .context(SendRequestSnafu {
                stage: "send-parsed-sources-request",
                endpoint: endpoint.clone(),
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                endpoint = %endpoint,
                status = status.as_u16(),
                "parsed-sources endpoint returned non-success status"
            );
            return Ok(None);
        }

        let payload = response.json::<Value>().await.context(DecodeResponseSnafu {
            stage: "decode-parsed-sources-response",
            endpoint,
        })?;
        Ok(Some(payload))
    }

    async fn open_chat_body(
        client: &reqwest::Client,
        endpoint: &str,
        messages: &[ProviderMessage],
    ) -> BackendResult<reqwest::Response> {
        let response = client
            .post(endpoint)
            .header(ACCEPT, HeaderValue::from_static(EVENT_STREAM))
            .json(&ChatBody { messages })
            .send()
            .await
            .context(SendRequestSnafu {
                stage: "send-chat-request",
                endpoint: endpoint.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::ChatStatus {
                stage: "chat-http-status",
                status: status.as_u16(),
                body: truncate_body(body),
            });
        }

        Ok(response)
    }

    async fn run_stream_worker(
        client: reqwest::Client,
        endpoint: String,
        request: ChatRequest,
        event_tx: mpsc::UnboundedSender<StreamEventMapped>,
    ) {
        let target = request.target;
        let response = match Self::open_chat_body(&client, &endpoint, &request.messages).await {
            Ok(response) => response,
            Err(error) => {
                tracing::error!(
                    target = ?target,
                    endpoint = %endpoint,
                    error = %error,
                    "failed to open chat stream"
                );
                Self::emit_error_event(&event_tx, target, error);
                return;
            }
        };

        let outcome = ingest_byte_stream(target, response.bytes_stream(), &event_tx).await;
        tracing::info!(
            target = ?target,
            fragments = outcome.fragments,
            skipped = outcome.skipped,
            completed = outcome.completed,
            "chat stream finished"
        );
    }

    fn emit_error_event(
        event_tx: &mpsc::UnboundedSender<StreamEventMapped>,
        target: StreamTarget,
        error: BackendError,
    ) {
        let _ = event_tx.send(StreamEventMapped::error(target, error.to_string()));
    }
}

impl TutorBackend for HttpBackend {
    fn name(&self) -> &str {
        HTTP_BACKEND_NAME
    }

    fn fetch_sources<'a>(&'a self, question: &'a str) -> BoxFuture<'a, BackendResult<Vec<Source>>> {
        Box::pin(self.post_sources(question))
    }

    fn fetch_parsed_sources<'a>(
        &'a self,
        sources: &'a [Source],
    ) -> BoxFuture<'a, BackendResult<Option<Value>>> {
        Box::pin(self.post_parsed_sources(sources))
    }

    fn stream_chat(&self, request: ChatRequest) -> BackendResult<ChatStreamHandle> {
        ensure!(
            !request.messages.is_empty(),
            EmptyMessageSetSnafu {
                stage: "stream-chat",
                target: request.target,
            }
        );

        let (event_tx, stream) = make_event_stream(request.target);
        let worker: ChatWorker = Box::pin(Self::run_stream_worker(
            self.client.clone(),
            self.config.chat_url(),
            request,
            event_tx,
        ));

        Ok(ChatStreamHandle { stream, worker })
    }
}

const MAX_ERROR_BODY_CHARS: usize = 512;

fn truncate_body(body: String) -> String {
    let body = body.trim();
    match body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}
