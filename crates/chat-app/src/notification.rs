use std::collections::VecDeque;
use std::fmt;

pub const ERROR_TITLE: &str = "Error";
pub const EMPTY_TOPIC_MESSAGE: &str = "Please enter a topic to learn about";
pub const EMPTY_QUESTION_MESSAGE: &str = "Please enter a question";
pub const CHAT_FAILED_MESSAGE: &str = "Failed to get response from AI";
pub const SOURCES_UNAVAILABLE_MESSAGE: &str = "Could not fetch sources, continuing without them";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

impl NotificationLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// A transient, user-visible message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub description: String,
}

impl Notification {
    pub fn new(
        level: NotificationLevel,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            level,
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, title, description)
    }

    pub fn warning(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Warning, title, description)
    }

    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, title, description)
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.level.as_str(),
            self.title,
            self.description
        )
    }
}

/// Pending notifications in arrival order.
#[derive(Debug, Default)]
pub struct NotificationList {
    pending: VecDeque<Notification>,
}

impl NotificationList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, notification: Notification) {
        match notification.level {
            NotificationLevel::Info => {
                tracing::info!(title = %notification.title, "{}", notification.description)
            }
            NotificationLevel::Warning => {
                tracing::warn!(title = %notification.title, "{}", notification.description)
            }
            NotificationLevel::Error => {
                tracing::error!(title = %notification.title, "{}", notification.description)
            }
        }
        self.pending.push_back(notification);
    }

    pub fn peek(&self) -> Option<&Notification> {
        self.pending.front()
    }

    /// Takes every pending notification, oldest first.
    pub fn drain(&mut self) -> Vec<Notification> {
        self.pending.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_returns_in_order_and_empties() {
        let mut list = NotificationList::new();
        list.push(Notification::warning("Sources", SOURCES_UNAVAILABLE_MESSAGE));
        list.push(Notification::error(ERROR_TITLE, CHAT_FAILED_MESSAGE));

        assert_eq!(list.peek().map(|n| n.level), Some(NotificationLevel::Warning));
        let drained = list.drain();

        assert_eq!(drained.len(), 2);
        assert_eq!(drained[1].description, CHAT_FAILED_MESSAGE);
        assert!(list.is_empty());
    }

    #[test]
    fn display_is_single_line() {
        let notification = Notification::error(ERROR_TITLE, EMPTY_TOPIC_MESSAGE);

        assert_eq!(
            notification.to_string(),
            "[error] Error: Please enter a topic to learn about"
        );
    }
}
