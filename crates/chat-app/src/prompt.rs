use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use snafu::{OptionExt, Snafu};
use tutor_llm::ParsedSource;

pub const MAX_TEACHING_SOURCES: usize = 7;
pub const MAX_SOURCE_CHARS: usize = 10_000;

const NO_SOURCES_TEXT: &str =
    "No reference material could be retrieved for this topic. Teach from general knowledge \
     and say so when a detail would normally need a citation.";

/// Learner level the tutor pitches its explanations at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AgeGroup {
    ElementarySchool,
    #[default]
    MiddleSchool,
    HighSchool,
    College,
}

impl AgeGroup {
    pub const ALL: [AgeGroup; 4] = [
        AgeGroup::ElementarySchool,
        AgeGroup::MiddleSchool,
        AgeGroup::HighSchool,
        AgeGroup::College,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::ElementarySchool => "Elementary School",
            Self::MiddleSchool => "Middle School",
            Self::HighSchool => "High School",
            Self::College => "College",
        }
    }

    fn guidance(self) -> &'static str {
        match self {
            Self::ElementarySchool => {
                "Use short sentences and everyday words. Lean on concrete examples from \
                 daily life and check understanding often with simple questions."
            }
            Self::MiddleSchool => {
                "Introduce key vocabulary with plain definitions, connect ideas to things \
                 the learner already knows, and build up one step at a time."
            }
            Self::HighSchool => {
                "Use correct terminology, show how concepts relate, and include worked \
                 examples where they help. Encourage the learner to reason before you explain."
            }
            Self::College => {
                "Be precise and rigorous. Discuss mechanisms, assumptions, and limits of \
                 the ideas, and point out where the sources disagree."
            }
        }
    }
}

impl fmt::Display for AgeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AgeGroupError {
    #[snafu(display("unknown age group '{value}' on `{stage}`"))]
    UnknownAgeGroup { stage: &'static str, value: String },
}

impl FromStr for AgeGroup {
    type Err = AgeGroupError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value
            .trim()
            .chars()
            .map(|ch| match ch {
                '-' | '_' => ' ',
                other => other.to_ascii_lowercase(),
            })
            .collect::<String>();
        let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");

        Self::ALL
            .into_iter()
            .find(|group| group.label().eq_ignore_ascii_case(&normalized))
            .context(UnknownAgeGroupSnafu {
                stage: "parse-age-group",
                value,
            })
    }
}

/// Builds the tutor persona for one topic.
///
/// `parsed_sources` is the raw parsed-sources payload; anything that is not a
/// list of `{name, url, fullContent}` objects falls back to the no-sources text.
pub fn build_system_prompt(parsed_sources: Option<&Value>, age_group: AgeGroup) -> String {
    let sources = parsed_sources
        .map(ParsedSource::list_from_payload)
        .unwrap_or_default();
    let teaching_info = teaching_info(&sources);

    format!(
        "You are a patient personal tutor. The learner is at the {level} level.\n\
         \n\
         {guidance}\n\
         \n\
         Start by giving a short overview of the topic, then ask the learner what they \
         would like to explore first. Keep each reply focused, invite questions, and \
         correct misunderstandings gently.\n\
         \n\
         Base your teaching on the material below when it is relevant.\n\
         \n\
         <teaching_info>\n\
         {teaching_info}\n\
         </teaching_info>",
        level = age_group.label(),
        guidance = age_group.guidance(),
    )
}

fn teaching_info(sources: &[ParsedSource]) -> String {
    let blocks = sources
        .iter()
        .filter(|source| !source.full_content.trim().is_empty())
        .take(MAX_TEACHING_SOURCES)
        .enumerate()
        .map(|(index, source)| {
            let content = truncate_chars(source.full_content.trim(), MAX_SOURCE_CHARS);
            let title = if source.name.trim().is_empty() {
                source.url.trim()
            } else {
                source.name.trim()
            };
            format!("## Source {} ({title})\n{content}", index + 1)
        })
        .collect::<Vec<_>>();

    if blocks.is_empty() {
        NO_SOURCES_TEXT.to_string()
    } else {
        blocks.join("\n\n")
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}
