//! Pulls the JSON payload out of free-form model output.
//!
//! Models often wrap structured answers in a markdown fence, sometimes with
//! prose before or after it. The first ```` ```json ```` fence wins; failing
//! that the first generic fence pair; failing that the whole trimmed text.

use crate::error::ParseError;
use serde::de::DeserializeOwned;

const JSON_FENCE: &str = "```json";
const FENCE: &str = "```";

/// Returns the slice of `text` that should hold the JSON value.
pub fn extract_payload(text: &str) -> &str {
    let text = text.trim();

    if let Some(start) = text.find(JSON_FENCE) {
        let rest = &text[start + JSON_FENCE.len()..];
        let body = match rest.find(FENCE) {
            Some(end) => &rest[..end],
            None => rest,
        };
        return body.trim();
    }

    if let Some(start) = text.find(FENCE) {
        let rest = &text[start + FENCE.len()..];
        let body = match rest.find(FENCE) {
            Some(end) => &rest[..end],
            None => rest,
        };
        return body.trim();
    }

    text
}

/// Extracts and deserializes the payload. Never retries.
pub fn parse_response<T: DeserializeOwned>(text: &str) -> Result<T, ParseError> {
    let payload = extract_payload(text);
    serde_json::from_str(payload).map_err(|e| ParseError::new(e, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn json_fence_ignores_surrounding_prose() {
        let raw = "Sure! Here you go:\n```json\n[{\"title\": \"A\"}]\n```\nLet me know if you need more.";
        assert_eq!(extract_payload(raw), "[{\"title\": \"A\"}]");
    }

    #[test]
    fn json_fence_wins_over_earlier_generic_fence() {
        let raw = "```\nnot this\n```\nthen\n```json\n{\"a\": 1}\n```";
        assert_eq!(extract_payload(raw), "{\"a\": 1}");
    }

    #[test]
    fn generic_fence_is_used_when_no_json_fence() {
        let raw = "```\n{\"a\": 2}\n```";
        assert_eq!(extract_payload(raw), "{\"a\": 2}");
    }

    #[test]
    fn unfenced_text_is_trimmed_verbatim() {
        let raw = "   {\"a\": 3}  \n";
        assert_eq!(extract_payload(raw), "{\"a\": 3}");
    }

    #[test]
    fn unterminated_fence_takes_the_rest() {
        let raw = "```json\n{\"a\": 4}";
        assert_eq!(extract_payload(raw), "{\"a\": 4}");
    }

    #[test]
    fn parse_error_carries_snippet() {
        let err = parse_response::<Value>("```json\nnot json at all\n```").unwrap_err();
        assert!(err.snippet.starts_with("not json"));
    }

    #[test]
    fn parses_fenced_array() {
        let value: Vec<Value> = parse_response("```json\n[1, 2, 3]\n```").unwrap();
        assert_eq!(value.len(), 3);
    }
}
