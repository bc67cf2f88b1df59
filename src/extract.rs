//! Pull a JSON value out of free-form model output.
//!
//! Stages, first success wins:
//! 1. the whole text,
//! 2. the body of a fenced code block (```json or bare ```),
//! 3. the first balanced `{...}` span that parses, then the widest `{...}` span.
//!
//! Failure is a value ([`Extracted::Unparseable`]) carrying the raw text.

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::{debug, warn};

static FENCED_BLOCK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\r?\n(.*?)\r?\n?```").ok());

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Extracted {
    Parsed(Value),
    Unparseable { unparseable: bool, raw_text: String },
}

pub fn extract_json(text: &str) -> Extracted {
    let trimmed = text.trim();

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Extracted::Parsed(value);
    }

    if let Some(value) = from_fenced_block(trimmed) {
        debug!("Extracted JSON from fenced code block");
        return Extracted::Parsed(value);
    }

    if let Some(value) = from_braces(trimmed) {
        debug!("Extracted JSON from embedded object");
        return Extracted::Parsed(value);
    }

    warn!(
        "Model output is not parseable JSON ({} chars)",
        text.chars().count()
    );
    Extracted::Unparseable {
        unparseable: true,
        raw_text: text.to_string(),
    }
}

fn from_fenced_block(text: &str) -> Option<Value> {
    let regex = FENCED_BLOCK.as_ref()?;
    regex
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .find_map(|body| serde_json::from_str(body.as_str().trim()).ok())
}

fn from_braces(text: &str) -> Option<Value> {
    let balanced = text.match_indices('{').find_map(|(start, _)| {
        let end = balanced_end(&text[start..])?;
        serde_json::from_str(&text[start..start + end]).ok()
    });
    if balanced.is_some() {
        return balanced;
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// Byte length of the object starting at `text[0] == '{'`, honouring
/// string literals and escapes.
fn balanced_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_whole_text() {
        assert_eq!(extract_json(" {\"a\": 1} "), Extracted::Parsed(json!({"a": 1})));
        assert_eq!(extract_json("[1, 2]"), Extracted::Parsed(json!([1, 2])));
    }

    #[test]
    fn test_labelled_fence() {
        let text = "Here is the result:\n```json\n{\"a\":1}\n```";
        assert_eq!(extract_json(text), Extracted::Parsed(json!({"a": 1})));
    }

    #[test]
    fn test_unlabelled_fence() {
        let text = "결과입니다.\n```\n{\"templates\": []}\n```\n감사합니다.";
        assert_eq!(extract_json(text), Extracted::Parsed(json!({"templates": []})));
    }

    #[test]
    fn test_skips_non_json_fence() {
        let text = "```\nnot json\n```\nthen\n```json\n{\"b\": true}\n```";
        assert_eq!(extract_json(text), Extracted::Parsed(json!({"b": true})));
    }

    #[test]
    fn test_embedded_object() {
        let text = "분석 결과는 다음과 같습니다: {\"summary\": \"요약 {중괄호}\", \"n\": 2} 이상입니다. {끝}";
        assert_eq!(
            extract_json(text),
            Extracted::Parsed(json!({"summary": "요약 {중괄호}", "n": 2}))
        );
    }

    #[test]
    fn test_skips_balanced_span_that_is_not_json() {
        let text = "참고 {비고} 결과: {\"a\":1}";
        assert_eq!(extract_json(text), Extracted::Parsed(json!({"a": 1})));
    }

    #[test]
    fn test_unparseable_keeps_raw_text() {
        let text = "I could not produce JSON { sorry";
        let extracted = extract_json(text);
        assert_eq!(
            extracted,
            Extracted::Unparseable { unparseable: true, raw_text: text.to_string() }
        );
        let value = serde_json::to_value(&extracted).unwrap();
        assert_eq!(value["unparseable"], true);
        assert_eq!(value["raw_text"], text);
    }

    #[test]
    fn test_balanced_end() {
        assert_eq!(balanced_end("{}"), Some(2));
        assert_eq!(balanced_end("{\"a\": \"}\"} tail"), Some(10));
        assert_eq!(balanced_end("{\"a\": {\"b\": 1}"), None);
    }
}
