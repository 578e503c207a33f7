use serde::Deserialize;
use snafu::{ResultExt, Snafu};

/// Schema of one chat stream event body: `{ "text"?: string }`.
#[derive(Debug, Deserialize)]
struct FragmentPayload {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum FragmentError {
    #[snafu(display("stream event data is not a valid fragment on `{stage}`: {source}"))]
    InvalidPayload {
        stage: &'static str,
        source: serde_json::Error,
    },
}

/// Extracts the incremental text carried by one event's `data` field.
///
/// A payload without `text` (or with `text: null`) is an empty fragment.
pub fn parse_fragment(data: &str) -> Result<String, FragmentError> {
    let payload = serde_json::from_str::<FragmentPayload>(data).context(InvalidPayloadSnafu {
        stage: "parse-fragment",
    })?;
    Ok(payload.text.unwrap_or_default())
}
