/// Turn submission and stream event mapping.
pub mod events;
/// Transcript entries and the deterministic stream lifecycle.
pub mod message;
pub mod message_input;
pub mod message_list;
pub mod scroll_manager;
pub mod transcript;

pub use events::{Submit, terminal_transition};
pub use message::{
    ConversationId, Message, Role, StreamSessionId, StreamState, StreamTarget, StreamTransition,
    StreamTransitionRejection, StreamTransitionResult,
};
pub use message_input::{InputRejection, MessageInput};
pub use message_list::MessageList;
pub use scroll_manager::{ScrollManager, ScrollMode, ScrollViewport};
pub use transcript::{SubscriptionId, TranscriptReader, TranscriptSnapshot, TranscriptStore};
