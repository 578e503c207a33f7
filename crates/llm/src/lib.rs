//! Wire layer of the tutor: endpoint contract, event-stream framing, and the
//! ingest worker that turns a chat response body into ordered fragment events.

mod backend;
mod decode;
mod event;
mod fragment;
mod http_adapter;
mod ingest;
mod message;
mod source;
pub mod sse;

pub use backend::{
    BackendConfig, BackendError, BackendResult, BoxFuture, ChatEventStream, ChatRequest,
    ChatStreamHandle, ChatWorker, DEFAULT_BASE_URL, DEFAULT_CHAT_PATH,
    DEFAULT_PARSED_SOURCES_PATH, DEFAULT_REQUEST_TIMEOUT, DEFAULT_SOURCES_PATH, TutorBackend,
    make_event_stream,
};
pub use decode::Utf8ChunkDecoder;
pub use event::{
    ConversationId, StreamEventMapped, StreamEventPayload, StreamSessionId, StreamTarget,
};
pub use fragment::{FragmentError, parse_fragment};
pub use http_adapter::{HTTP_BACKEND_NAME, HttpBackend};
pub use ingest::{IngestOutcome, ingest_byte_stream};
pub use message::{ProviderMessage, Role};
pub use source::{ParsedSource, Source};
