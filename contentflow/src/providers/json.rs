//! Lenient JSON extraction from model replies.

use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::LazyLock;

use crate::errors::ProviderError;

#[allow(clippy::expect_used)]
static OBJECT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("valid object regex"));

/// Returns the JSON text inside a reply, removing markdown fences and
/// surrounding prose.
#[must_use]
pub fn extract_json(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    let text = text.trim();
    if text.starts_with('{') || text.starts_with('[') {
        return text;
    }
    OBJECT_PATTERN.find(text).map_or(text, |m| m.as_str())
}

/// Decodes a model reply into `T`.
pub fn parse_json_response<T: DeserializeOwned>(raw: &str) -> Result<T, ProviderError> {
    let text = extract_json(raw);
    serde_json::from_str(text).or_else(|first| {
        // The fence-stripped text may still carry prose; retry on the
        // outermost object alone.
        OBJECT_PATTERN
            .find(text)
            .filter(|m| m.as_str() != text)
            .ok_or(first)
            .and_then(|m| serde_json::from_str(m.as_str()))
            .map_err(|e| {
                let preview: String = raw.chars().take(200).collect();
                ProviderError::invalid_response(format!("{e}; reply began: {preview}"))
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Reply {
        a: u32,
    }

    #[test]
    fn test_plain_json() {
        assert_eq!(parse_json_response::<Reply>(r#"{"a": 1}"#).unwrap(), Reply { a: 1 });
    }

    #[test]
    fn test_fenced_json() {
        let raw = "```json\n{\"a\": 2}\n```";
        assert_eq!(parse_json_response::<Reply>(raw).unwrap(), Reply { a: 2 });
    }

    #[test]
    fn test_json_inside_prose() {
        let raw = "Here is the outline you asked for:\n{\"a\": 3}\nLet me know!";
        assert_eq!(parse_json_response::<Reply>(raw).unwrap(), Reply { a: 3 });
    }

    #[test]
    fn test_garbage_is_invalid_response() {
        let err = parse_json_response::<Reply>("no json here").unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse { .. }));
        assert!(err.is_retryable());
    }
}
