//! Personal tutor: a topic-driven chat session over a streaming tutoring backend.

pub mod chat;
pub mod notification;
pub mod prompt;
pub mod session;
pub mod settings;
pub mod terminal;

pub use notification::{Notification, NotificationLevel, NotificationList};
pub use prompt::{AgeGroup, AgeGroupError, build_system_prompt};
pub use session::{SessionError, SessionResult, TurnProgress, TurnSummary, TutorSession, ViewStage};
