use std::time::Duration;

const BYTE_ORDER_MARK: char = '\u{feff}';
const DEFAULT_EVENT_NAME: &str = "message";

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field, `None` when absent or empty.
    pub event: Option<String>,
    /// All `data:` lines of the record joined with `\n`.
    pub data: String,
    /// Last event id seen on the stream at dispatch time.
    pub id: Option<String>,
}

impl SseEvent {
    /// Returns true when the record is a plain `message` event.
    pub fn is_message(&self) -> bool {
        self.event
            .as_deref()
            .is_none_or(|name| name == DEFAULT_EVENT_NAME)
    }
}

/// Output of the framing parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseItem {
    Event(SseEvent),
    Reconnect(Duration),
}

/// Incremental parser for the `text/event-stream` wire format.
///
/// Text can be fed in arbitrary slices; records and lines are reassembled across
/// feeds. A record is dispatched on the blank line that terminates it, so a
/// trailing record without its blank line is never emitted.
#[derive(Debug, Default)]
pub struct SseParser {
    line_buffer: String,
    pending_cr: bool,
    started: bool,
    data: String,
    has_data: bool,
    event_name: Option<String>,
    last_event_id: Option<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Feeds decoded text and returns every item completed by it, in order.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseItem> {
        let mut items = Vec::new();
        if chunk.is_empty() {
            return items;
        }

        let mut rest = chunk;
        if !self.started {
            self.started = true;
            rest = rest.strip_prefix(BYTE_ORDER_MARK).unwrap_or(rest);
        }

        // A `\r` closing the previous feed already ended its line; swallow the `\n` of a split CRLF.
        if self.pending_cr {
            self.pending_cr = false;
            rest = rest.strip_prefix('\n').unwrap_or(rest);
        }

        while let Some(position) = rest.find(['\r', '\n']) {
            let (head, tail) = rest.split_at(position);
            self.line_buffer.push_str(head);
            let line = std::mem::take(&mut self.line_buffer);
            self.process_line(&line, &mut items);

            let terminator = tail.as_bytes()[0];
            rest = &tail[1..];
            if terminator == b'\r' {
                if rest.is_empty() {
                    self.pending_cr = true;
                } else {
                    rest = rest.strip_prefix('\n').unwrap_or(rest);
                }
            }
        }

        self.line_buffer.push_str(rest);
        items
    }

    fn process_line(&mut self, line: &str, items: &mut Vec<SseItem>) {
        if line.is_empty() {
            self.dispatch(items);
            return;
        }

        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event_name = Some(value.to_string()),
            "data" => {
                if self.has_data {
                    self.data.push('\n');
                }
                self.data.push_str(value);
                self.has_data = true;
            }
            "id" => {
                if !value.contains('\0') {
                    self.last_event_id = Some(value.to_string());
                }
            }
            "retry" => {
                if !value.is_empty()
                    && value.bytes().all(|byte| byte.is_ascii_digit())
                    && let Ok(millis) = value.parse::<u64>()
                {
                    items.push(SseItem::Reconnect(Duration::from_millis(millis)));
                }
            }
            other => {
                tracing::trace!(field = other, "ignoring unknown event-stream field");
            }
        }
    }

    fn dispatch(&mut self, items: &mut Vec<SseItem>) {
        let event_name = self.event_name.take();
        if !self.has_data {
            self.data.clear();
            return;
        }

        self.has_data = false;
        items.push(SseItem::Event(SseEvent {
            event: event_name.filter(|name| !name.is_empty()),
            data: std::mem::take(&mut self.data),
            id: self.last_event_id.clone(),
        }));
    }
}
