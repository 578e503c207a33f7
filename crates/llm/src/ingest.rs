use std::fmt::Display;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

use crate::backend::BackendError;
use crate::decode::Utf8ChunkDecoder;
use crate::event::{StreamEventMapped, StreamTarget};
use crate::fragment::parse_fragment;
use crate::sse::{SseItem, SseParser};

/// Counters reported once a body has been consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    pub fragments: usize,
    pub skipped: usize,
    /// True when the body reached its end without a transport error.
    pub completed: bool,
}

/// Turns an event-stream response body into ordered fragment events.
///
/// Chunks are processed one at a time: every fragment of a chunk is sent before
/// the next chunk is polled. The turn ends with `Done` when the body ends and
/// with `Error` on a transport failure. Malformed fragments are skipped.
pub async fn ingest_byte_stream<S, B, E>(
    target: StreamTarget,
    body: S,
    event_tx: &mpsc::UnboundedSender<StreamEventMapped>,
) -> IngestOutcome
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut body = std::pin::pin!(body);
    let mut decoder = Utf8ChunkDecoder::new();
    let mut parser = SseParser::new();
    let mut outcome = IngestOutcome::default();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(source) => {
                let error = BackendError::BodyStream {
                    stage: "read-chat-body",
                    message: source.to_string(),
                };
                tracing::warn!(
                    target = ?target,
                    fragments = outcome.fragments,
                    error = %error,
                    "chat body failed mid-stream"
                );
                let _ = event_tx.send(StreamEventMapped::error(target, error.to_string()));
                return outcome;
            }
        };

        let text = decoder.decode(chunk.as_ref());
        if !forward_items(target, parser.feed(&text), event_tx, &mut outcome) {
            return outcome;
        }
    }

    let tail = decoder.finish();
    if !forward_items(target, parser.feed(&tail), event_tx, &mut outcome) {
        return outcome;
    }

    outcome.completed = true;
    tracing::debug!(
        target = ?target,
        fragments = outcome.fragments,
        skipped = outcome.skipped,
        "chat body ended"
    );
    let _ = event_tx.send(StreamEventMapped::done(target));
    outcome
}

/// Returns false once the receiving side is gone.
fn forward_items(
    target: StreamTarget,
    items: Vec<SseItem>,
    event_tx: &mpsc::UnboundedSender<StreamEventMapped>,
    outcome: &mut IngestOutcome,
) -> bool {
    for item in items {
        let event = match item {
            SseItem::Event(event) => event,
            SseItem::Reconnect(interval) => {
                tracing::debug!(target = ?target, ?interval, "ignoring reconnect interval");
                continue;
            }
        };

        if !event.is_message() {
            tracing::debug!(
                target = ?target,
                event = ?event.event,
                "skipping non-message event"
            );
            outcome.skipped += 1;
            continue;
        }

        let text = match parse_fragment(&event.data) {
            Ok(text) => text,
            Err(error) => {
                tracing::warn!(target = ?target, error = %error, "skipping malformed fragment");
                outcome.skipped += 1;
                continue;
            }
        };

        outcome.fragments += 1;
        if event_tx.send(StreamEventMapped::delta(target, text)).is_err() {
            tracing::debug!(target = ?target, "event receiver dropped; stopping ingest");
            return false;
        }
    }

    true
}
