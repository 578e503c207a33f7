use std::sync::Arc;

use crate::chat::message::Role;
use crate::chat::scroll_manager::{ScrollManager, ScrollViewport};
use crate::chat::transcript::TranscriptSnapshot;

pub const ASSISTANT_PREFIX: &str = "tutor> ";
pub const USER_PREFIX: &str = "you> ";
pub const LOADING_PLACEHOLDER: &str = "tutor> ...";
const MIN_CONTENT_WIDTH: usize = 8;

/// Scroll geometry of the list measured in rendered lines.
#[derive(Debug, Clone, Copy, PartialEq)]
struct LineViewport {
    scroll_top: f32,
    client_height: f32,
    scroll_height: f32,
}

impl ScrollViewport for LineViewport {
    fn scroll_top(&self) -> f32 {
        self.scroll_top
    }

    fn client_height(&self) -> f32 {
        self.client_height
    }

    fn scroll_height(&self) -> f32 {
        self.scroll_height
    }

    fn set_scroll_top(&mut self, scroll_top: f32) {
        self.scroll_top = scroll_top.clamp(0.0, self.max_scroll_top());
    }

    // whole lines: one line short of the tail is already scrolled away
    fn bottom_tolerance(&self) -> f32 {
        0.0
    }
}

/// Line-oriented view model of the transcript for a fixed-size window.
pub struct MessageList {
    messages: TranscriptSnapshot,
    lines: Vec<String>,
    width: usize,
    viewport: LineViewport,
    scroll_manager: ScrollManager,
    loading: bool,
}

impl MessageList {
    pub fn new(rows: usize, columns: usize) -> Self {
        Self {
            messages: Arc::new(Vec::new()),
            lines: Vec::new(),
            width: columns.max(MIN_CONTENT_WIDTH),
            viewport: LineViewport {
                scroll_top: 0.0,
                client_height: rows.max(1) as f32,
                scroll_height: 0.0,
            },
            scroll_manager: ScrollManager::new(),
            loading: false,
        }
    }

    /// Replaces the rendered snapshot. Returns false when it is the one already shown.
    pub fn set_messages(&mut self, messages: TranscriptSnapshot) -> bool {
        if Arc::ptr_eq(&self.messages, &messages) {
            return false;
        }

        self.messages = messages;
        self.content_changed();
        true
    }

    pub fn set_loading(&mut self, loading: bool) {
        if self.loading != loading {
            self.loading = loading;
            self.content_changed();
        }
    }

    /// User scroll gesture toward the head of the transcript.
    pub fn scroll_up(&mut self, lines: usize) {
        self.scroll_to(self.viewport.scroll_top - lines as f32);
    }

    /// User scroll gesture toward the tail of the transcript.
    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll_to(self.viewport.scroll_top + lines as f32);
    }

    pub fn reset_scroll_tracking(&mut self) {
        self.scroll_manager.reset();
        self.content_changed();
    }

    pub fn is_following_bottom(&self) -> bool {
        self.scroll_manager.is_pinned_to_bottom()
    }

    pub fn total_lines(&self) -> usize {
        self.lines.len()
    }

    pub fn scroll_offset(&self) -> usize {
        self.viewport.scroll_top as usize
    }

    pub fn visible_lines(&self) -> &[String] {
        let start = self.scroll_offset().min(self.lines.len());
        let end = (start + self.viewport.client_height as usize).min(self.lines.len());
        &self.lines[start..end]
    }

    fn scroll_to(&mut self, scroll_top: f32) {
        self.viewport.set_scroll_top(scroll_top);
        self.scroll_manager.on_scroll(&self.viewport);
    }

    fn content_changed(&mut self) {
        self.rebuild_lines();
        self.viewport.scroll_height = self.lines.len() as f32;
        // keep a free viewport inside the new bounds
        let scroll_top = self.viewport.scroll_top;
        self.viewport.set_scroll_top(scroll_top);
        self.scroll_manager.on_content_changed(&mut self.viewport);
    }

    fn rebuild_lines(&mut self) {
        let mut lines = Vec::new();
        let mut has_assistant = false;

        for message in self.messages.iter() {
            let prefix = match message.role {
                Role::System => continue,
                Role::User => USER_PREFIX,
                Role::Assistant => {
                    has_assistant = true;
                    ASSISTANT_PREFIX
                }
            };

            if !lines.is_empty() {
                lines.push(String::new());
            }
            push_prefixed(&mut lines, prefix, &message.content, self.width);
        }

        if self.loading && !has_assistant {
            if !lines.is_empty() {
                lines.push(String::new());
            }
            lines.push(LOADING_PLACEHOLDER.to_string());
        }

        self.lines = lines;
    }
}

fn push_prefixed(lines: &mut Vec<String>, prefix: &str, content: &str, width: usize) {
    let indent = " ".repeat(prefix.chars().count());
    let body_width = width.saturating_sub(indent.len()).max(1);

    for (index, line) in wrap_text(content, body_width).into_iter().enumerate() {
        let lead = if index == 0 { prefix } else { indent.as_str() };
        lines.push(format!("{lead}{line}"));
    }
}

/// Greedy word wrap; words longer than `width` are split by characters.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut wrapped = Vec::new();

    for paragraph in text.split('\n') {
        let mut current = String::new();
        let mut current_len = 0usize;

        for word in paragraph.split_whitespace() {
            let mut chars: Vec<char> = word.chars().collect();

            while chars.len() > width {
                if current_len > 0 {
                    wrapped.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                let rest = chars.split_off(width);
                wrapped.push(chars.into_iter().collect());
                chars = rest;
            }

            let word_len = chars.len();
            if current_len > 0 && current_len + 1 + word_len > width {
                wrapped.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current.extend(chars);
            current_len += word_len;
        }

        wrapped.push(current);
    }

    wrapped
}
