use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use tutor::chat::{Message, MessageList, Role};
use tutor::notification::EMPTY_TOPIC_MESSAGE;
use tutor::{AgeGroup, SessionError, TutorSession, ViewStage};
use tutor_llm::{
    BackendResult, BoxFuture, ChatRequest, ChatStreamHandle, Source, TutorBackend,
    ingest_byte_stream, make_event_stream,
};

/// Serves canned sources and replays each chat body as raw byte chunks.
struct CannedBackend {
    bodies: Mutex<VecDeque<Vec<Vec<u8>>>>,
    chat_requests: Mutex<Vec<ChatRequest>>,
    calls: AtomicUsize,
}

impl CannedBackend {
    fn new(bodies: Vec<Vec<Vec<u8>>>) -> Arc<Self> {
        Arc::new(Self {
            bodies: Mutex::new(bodies.into()),
            chat_requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }
}

impl TutorBackend for CannedBackend {
    fn name(&self) -> &str {
        "canned"
    }

    fn fetch_sources<'a>(&'a self, question: &'a str) -> BoxFuture<'a, BackendResult<Vec<Source>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let sources = vec![Source::new(
            format!("{question} - Wikipedia"),
            "https://en.wikipedia.org/wiki/Photosynthesis",
        )];
        Box::pin(async move { Ok(sources) })
    }

    fn fetch_parsed_sources<'a>(
        &'a self,
        sources: &'a [Source],
    ) -> BoxFuture<'a, BackendResult<Option<Value>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let parsed = sources
            .iter()
            .map(|source| {
                json!({
                    "name": source.name,
                    "url": source.url,
                    "fullContent": "Photosynthesis converts light energy into chemical energy."
                })
            })
            .collect::<Vec<_>>();
        Box::pin(async move { Ok(Some(Value::Array(parsed))) })
    }

    fn stream_chat(&self, request: ChatRequest) -> BackendResult<ChatStreamHandle> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let target = request.target;
        self.chat_requests.lock().unwrap().push(request);
        let body = self.bodies.lock().unwrap().pop_front().unwrap_or_default();

        let (event_tx, stream) = make_event_stream(target);
        let worker = Box::pin(async move {
            let chunks = body.into_iter().map(Ok::<_, std::io::Error>);
            ingest_byte_stream(target, futures::stream::iter(chunks), &event_tx).await;
        });
        Ok(ChatStreamHandle { stream, worker })
    }
}

/// Splits `text` into byte chunks at the given offsets.
fn split_at(text: &str, offsets: &[usize]) -> Vec<Vec<u8>> {
    let bytes = text.as_bytes();
    let mut chunks = Vec::new();
    let mut start = 0;
    for &offset in offsets {
        chunks.push(bytes[start..offset].to_vec());
        start = offset;
    }
    chunks.push(bytes[start..].to_vec());
    chunks
}

#[tokio::test]
async fn photosynthesis_topic_streams_into_one_answer() {
    let body = "data: {\"text\":\"Photo\"}\r\n\r\ndata: {\"text\":\"synthesis \"}\r\n\r\n\
                : keep-alive\r\n\r\ndata: {\"text\":\"uses light — énergie.\"}\r\n\r\n";
    // split inside a CRLF pair and inside the multi-byte dash and accent
    let dash = body.find('—').unwrap();
    let accent = body.find('é').unwrap();
    let crlf = body.find("\r\n").unwrap() + 1;
    let backend = CannedBackend::new(vec![split_at(body, &[crlf, dash + 1, accent + 1])]);
    let mut session = TutorSession::new(backend.clone(), AgeGroup::HighSchool);

    let list = Arc::new(Mutex::new(MessageList::new(4, 60)));
    let sink = list.clone();
    session
        .transcript_mut()
        .subscribe(move |snapshot| {
            sink.lock().unwrap().set_messages(snapshot.clone());
        });

    let stream = session.start_topic("Photosynthesis").await.unwrap();
    assert_eq!(session.view_stage(), ViewStage::Result);
    let summary = session.drive_turn(stream).await.unwrap();

    assert_eq!(summary.fragments, 3);
    let snapshot = session.transcript().snapshot();
    assert_eq!(snapshot.len(), 3);
    assert_eq!(snapshot[0].role, Role::System);
    assert!(snapshot[0].content.contains("High School"));
    assert!(snapshot[0].content.contains("chemical energy"));
    assert_eq!(snapshot[1], Message::user("Photosynthesis"));
    assert_eq!(
        snapshot[2],
        Message::assistant("Photosynthesis uses light — énergie.")
    );
    assert_eq!(session.sources()[0].name, "Photosynthesis - Wikipedia");

    let list = list.lock().unwrap();
    assert!(list.is_following_bottom());
    assert_eq!(
        list.visible_lines().last().map(String::as_str),
        Some("tutor> Photosynthesis uses light — énergie.")
    );
}

#[tokio::test]
async fn blank_topic_makes_no_requests() {
    let backend = CannedBackend::new(vec![]);
    let mut session = TutorSession::new(backend.clone(), AgeGroup::default());

    let result = session.start_topic(" \n ").await;

    assert!(matches!(result, Err(SessionError::Validation { .. })));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        session.notifications().peek().map(|notice| notice.description.as_str()),
        Some(EMPTY_TOPIC_MESSAGE)
    );
}

#[tokio::test]
async fn follow_up_carries_full_history_and_second_send_is_busy() {
    let backend = CannedBackend::new(vec![
        split_at("data: {\"text\":\"Plants make sugar.\"}\n\n", &[]),
        split_at("data: {\"text\":\"In the chloroplasts.\"}\n\n", &[10]),
    ]);
    let mut session = TutorSession::new(backend.clone(), AgeGroup::MiddleSchool);

    let stream = session.start_topic("Photosynthesis").await.unwrap();
    session.drive_turn(stream).await.unwrap();

    let stream = session.send_follow_up("Where does it happen?").unwrap();
    assert!(matches!(
        session.send_follow_up("And when?"),
        Err(SessionError::Busy { .. })
    ));
    session.drive_turn(stream).await.unwrap();

    let requests = backend.chat_requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    let roles = requests[1]
        .messages
        .iter()
        .map(|message| message.role)
        .collect::<Vec<_>>();
    assert_eq!(
        roles,
        vec![Role::System, Role::User, Role::Assistant, Role::User]
    );
    assert_ne!(requests[0].target, requests[1].target);
    assert_eq!(
        session.transcript().last(),
        Some(Message::assistant("In the chloroplasts."))
    );
}
