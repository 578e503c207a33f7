use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A reference returned by the source search endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub url: String,
}

impl Source {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }

    /// Host part of the URL, used as a compact label when the name is blank.
    pub fn host(&self) -> Option<&str> {
        let rest = self
            .url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.url);
        let host = rest.split(['/', '?', '#']).next()?;
        if host.is_empty() { None } else { Some(host) }
    }

    pub fn display_name(&self) -> &str {
        let name = self.name.trim();
        if !name.is_empty() {
            return name;
        }
        self.host().unwrap_or(&self.url)
    }
}

/// One entry of the parsed-sources payload.
///
/// The payload itself is opaque to the client; only the prompt builder reads it,
/// and it does so leniently through this shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedSource {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub full_content: String,
}

impl ParsedSource {
    /// Reads every well-formed entry of a parsed-sources payload.
    ///
    /// Entries that are not objects are dropped, non-array payloads yield nothing.
    pub fn list_from_payload(payload: &Value) -> Vec<ParsedSource> {
        let Some(entries) = payload.as_array() else {
            return Vec::new();
        };

        entries
            .iter()
            .filter(|entry| entry.is_object())
            .filter_map(|entry| serde_json::from_value::<ParsedSource>(entry.clone()).ok())
            .collect()
    }
}
