//! Field deserializers that read a mistyped value as absent.

use serde::{Deserialize, Deserializer, de::IgnoredAny};

#[derive(Deserialize)]
#[serde(untagged)]
enum MaybeString {
    Text(String),
    Other(IgnoredAny),
}

/// `Some` for a JSON string, `None` for any other value.
pub fn optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match MaybeString::deserialize(deserializer)? {
        MaybeString::Text(text) => Some(text),
        MaybeString::Other(_) => None,
    })
}

/// The string, or empty for any value that is not a JSON string.
pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(optional_string(deserializer)?.unwrap_or_default())
}
