use std::sync::Arc;

use arc_swap::ArcSwap;
use snafu::{Snafu, ensure};

use crate::chat::message::{Message, Role};

/// Immutable view of the transcript at one point in time.
///
/// Every mutation publishes a new snapshot, so `Arc::ptr_eq` tells observers
/// whether anything changed.
pub type TranscriptSnapshot = Arc<Vec<Message>>;

type Observer = Box<dyn FnMut(&TranscriptSnapshot) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TranscriptError {
    #[snafu(display("refusing to append a blank {role:?} message"))]
    BlankMessage { stage: &'static str, role: Role },
}

/// Ordered conversation history with synchronous change notification.
pub struct TranscriptStore {
    current: Arc<ArcSwap<Vec<Message>>>,
    observers: Vec<(SubscriptionId, Observer)>,
    next_subscription_id: u64,
}

/// Cloneable read handle; loads the latest snapshot without locking.
#[derive(Clone)]
pub struct TranscriptReader {
    current: Arc<ArcSwap<Vec<Message>>>,
}

impl TranscriptReader {
    pub fn load(&self) -> TranscriptSnapshot {
        self.current.load_full()
    }
}

impl TranscriptStore {
    pub fn new() -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(Vec::new())),
            observers: Vec::new(),
            next_subscription_id: 1,
        }
    }

    pub fn snapshot(&self) -> TranscriptSnapshot {
        self.current.load_full()
    }

    pub fn reader(&self) -> TranscriptReader {
        TranscriptReader {
            current: self.current.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }

    pub fn last(&self) -> Option<Message> {
        self.current.load().last().cloned()
    }

    /// Registers an observer called after every mutation.
    pub fn subscribe<F>(&mut self, observer: F) -> SubscriptionId
    where
        F: FnMut(&TranscriptSnapshot) + Send + 'static,
    {
        let id = SubscriptionId(self.next_subscription_id);
        self.next_subscription_id = self.next_subscription_id.saturating_add(1);
        self.observers.push((id, Box::new(observer)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(observer_id, _)| *observer_id != id);
        self.observers.len() != before
    }

    /// Replaces the transcript with exactly `[system, user]`.
    pub fn seed(&mut self, system_prompt: impl Into<String>, user_question: impl Into<String>) {
        self.publish(vec![
            Message::system(system_prompt),
            Message::user(user_question),
        ]);
    }

    pub fn append_user_message(&mut self, text: impl Into<String>) -> Result<(), TranscriptError> {
        let text = text.into();
        ensure!(
            !text.trim().is_empty(),
            BlankMessageSnafu {
                stage: "append-user-message",
                role: Role::User,
            }
        );

        let mut next = (**self.current.load()).clone();
        next.push(Message::user(text));
        self.publish(next);
        Ok(())
    }

    /// Concatenates onto the trailing assistant message or starts a new one.
    ///
    /// An empty fragment leaves the transcript untouched and notifies nobody.
    /// Returns whether a new snapshot was published.
    pub fn append_or_merge_assistant_fragment(&mut self, fragment: &str) -> bool {
        if fragment.is_empty() {
            return false;
        }

        let mut next = (**self.current.load()).clone();
        match next.last_mut() {
            Some(last) if last.is_assistant() => last.content.push_str(fragment),
            _ => next.push(Message::assistant(fragment)),
        }
        self.publish(next);
        true
    }

    fn publish(&mut self, messages: Vec<Message>) {
        let snapshot = Arc::new(messages);
        self.current.store(snapshot.clone());
        for (_, observer) in self.observers.iter_mut() {
            observer(&snapshot);
        }
    }
}

impl Default for TranscriptStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn seed_replaces_any_prior_state() {
        let mut store = TranscriptStore::new();
        store.seed("old", "old question");
        store.append_or_merge_assistant_fragment("answer");

        store.seed("SYS", "Q");

        assert_eq!(
            store.snapshot().as_ref(),
            &vec![Message::system("SYS"), Message::user("Q")]
        );
    }

    #[test]
    fn fragments_concatenate_into_one_assistant_message() {
        let mut store = TranscriptStore::new();
        store.seed("SYS", "Q");

        for fragment in ["Pho", "tosyn", "thesis is..."] {
            store.append_or_merge_assistant_fragment(fragment);
        }

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[2], Message::assistant("Photosynthesis is..."));
    }

    #[test]
    fn fragment_after_user_message_starts_new_assistant_message() {
        let mut store = TranscriptStore::new();
        store.seed("SYS", "Q");
        store.append_or_merge_assistant_fragment("first answer");
        store.append_user_message("follow up").unwrap();

        store.append_or_merge_assistant_fragment("second");

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 5);
        assert_eq!(snapshot[2], Message::assistant("first answer"));
        assert_eq!(snapshot[4], Message::assistant("second"));
    }

    #[test]
    fn empty_fragment_is_a_no_op() {
        let mut store = TranscriptStore::new();
        store.seed("SYS", "Q");
        let before = store.snapshot();

        assert!(!store.append_or_merge_assistant_fragment(""));
        store.append_or_merge_assistant_fragment("a");
        let with_assistant = store.snapshot();
        assert!(!store.append_or_merge_assistant_fragment(""));

        assert_eq!(before.len(), 2);
        assert!(Arc::ptr_eq(&with_assistant, &store.snapshot()));
        assert_eq!(store.snapshot()[2].content, "a");
    }

    #[test]
    fn blank_user_message_is_rejected() {
        let mut store = TranscriptStore::new();
        store.seed("SYS", "Q");

        let result = store.append_user_message(" \n\t ");

        assert!(matches!(result, Err(TranscriptError::BlankMessage { .. })));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn every_mutation_publishes_a_new_snapshot() {
        let mut store = TranscriptStore::new();
        let reader = store.reader();
        let seen = Arc::new(Mutex::new(Vec::<TranscriptSnapshot>::new()));
        let sink = seen.clone();
        store.subscribe(move |snapshot| sink.lock().unwrap().push(snapshot.clone()));

        store.seed("SYS", "Q");
        let seeded = store.snapshot();
        store.append_or_merge_assistant_fragment("a");
        store.append_or_merge_assistant_fragment("b");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(Arc::ptr_eq(&seen[0], &seeded));
        assert!(!Arc::ptr_eq(&seen[1], &seen[2]));
        // previous snapshots are never mutated in place
        assert_eq!(seen[1][2].content, "a");
        assert_eq!(seen[2][2].content, "ab");
        assert!(Arc::ptr_eq(&reader.load(), &seen[2]));
    }

    #[test]
    fn unsubscribed_observers_stop_receiving() {
        let mut store = TranscriptStore::new();
        let calls = Arc::new(Mutex::new(0usize));
        let counter = calls.clone();
        let id = store.subscribe(move |_| *counter.lock().unwrap() += 1);

        store.seed("SYS", "Q");
        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.append_or_merge_assistant_fragment("a");

        assert_eq!(*calls.lock().unwrap(), 1);
    }
}
