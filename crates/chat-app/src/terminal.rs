use std::fmt::{self, Write};

use tutor_llm::Source;

use crate::chat::message_list::MessageList;
use crate::prompt::AgeGroup;

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";
const DEFAULT_SCROLL_STEP: usize = 5;

/// One line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ScrollUp(usize),
    ScrollDown(usize),
    Sources,
    Quit,
    Message(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        let mut parts = trimmed.split_whitespace();

        match parts.next() {
            Some("/quit") | Some("/exit") => Self::Quit,
            Some("/sources") => Self::Sources,
            Some("/up") => Self::ScrollUp(scroll_step(parts.next())),
            Some("/down") => Self::ScrollDown(scroll_step(parts.next())),
            _ => Self::Message(line.to_string()),
        }
    }
}

fn scroll_step(value: Option<&str>) -> usize {
    value
        .and_then(|value| value.parse().ok())
        .unwrap_or(DEFAULT_SCROLL_STEP)
}

/// Status line shown under the transcript window.
pub fn status_line(loading: bool, following: bool) -> String {
    let activity = if loading {
        "tutor is answering..."
    } else {
        "ask a follow-up, /up N, /down N, /sources, /quit"
    };
    if following {
        activity.to_string()
    } else {
        format!("{activity}  [scrolled, /down to follow]")
    }
}

/// Draws the whole screen: header, transcript window, and status.
pub fn render_frame(
    out: &mut impl Write,
    topic: Option<&str>,
    age_group: AgeGroup,
    list: &MessageList,
    status: &str,
) -> fmt::Result {
    out.write_str(CLEAR_SCREEN)?;
    match topic {
        Some(topic) => writeln!(out, "Topic: {topic} ({age_group})")?,
        None => writeln!(out, "Personal tutor ({age_group})")?,
    }
    writeln!(out, "{}", "-".repeat(40))?;
    for line in list.visible_lines() {
        writeln!(out, "{line}")?;
    }
    writeln!(out, "{}", "-".repeat(40))?;
    writeln!(out, "{status}")
}

pub fn format_sources(sources: &[Source]) -> String {
    if sources.is_empty() {
        return "No sources were found for this topic.".to_string();
    }

    sources
        .iter()
        .enumerate()
        .map(|(index, source)| format!("{:>2}. {} <{}>", index + 1, source.display_name(), source.url))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_age_group_menu() -> String {
    AgeGroup::ALL
        .iter()
        .enumerate()
        .map(|(index, group)| format!("{}. {group}", index + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Accepts a menu number or an age group name; blank keeps `current`.
pub fn parse_age_group_choice(input: &str, current: AgeGroup) -> Option<AgeGroup> {
    let input = input.trim();
    if input.is_empty() {
        return Some(current);
    }
    if let Ok(index) = input.parse::<usize>() {
        return index.checked_sub(1).and_then(|index| AgeGroup::ALL.get(index).copied());
    }
    input.parse().ok()
}
