//! HTML-to-text cleaning and paragraph-aware previews.
//!
//! Korean government documents mark outline levels with `□` and `○`. Both
//! glyphs survive cleaning and are always followed by a space.

use regex::Regex;
use std::sync::LazyLock;
use tracing::error;

/// Outline bullet glyphs that delimit paragraphs.
pub const BULLETS: [char; 2] = ['□', '○'];

const ELLIPSIS: &str = "...";

/// Ordered rewrite rules. Order matters: block content is dropped before
/// generic tag stripping, and whitespace is normalized last.
struct CleaningRules {
    rules: Vec<(Regex, &'static str)>,
}

impl CleaningRules {
    fn compile() -> Result<Self, regex::Error> {
        let table: [(&str, &'static str); 14] = [
            (r"(?i)<img\b[^>]*>", ""),
            (r"(?is)<script\b[^>]*>.*?</script\s*>", ""),
            (r"(?is)<style\b[^>]*>.*?</style\s*>", ""),
            (r"(?s)<!--.*?-->", ""),
            (r"(?i)<br\s*/?\s*>", "\n"),
            (r"(?i)</p\s*>", "\n\n"),
            (r"(?i)</tr\s*>", "\n"),
            (r"(?i)</t[dh]\s*>", " "),
            (r"<[^>]+>", ""),
            (r"(?i)&nbsp;", " "),
            (r"([□○])([^\s□○])", "$1 $2"),
            (r"[^\S\n]+", " "),
            (r" ?\n ?", "\n"),
            (r"\n{3,}", "\n\n"),
        ];

        let rules = table
            .into_iter()
            .map(|(pattern, replacement)| Ok((Regex::new(pattern)?, replacement)))
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(Self { rules })
    }

    fn apply(&self, input: &str) -> String {
        let mut text = input.to_string();
        for (regex, replacement) in &self.rules {
            text = regex.replace_all(&text, *replacement).into_owned();
        }
        text.trim().to_string()
    }
}

static RULES: LazyLock<Option<CleaningRules>> = LazyLock::new(|| match CleaningRules::compile() {
    Ok(rules) => Some(rules),
    Err(e) => {
        error!("Failed to compile HTML cleaning rules: {}", e);
        None
    }
});

static ANY_TAG: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?s)<.*?>").ok());
static WHITESPACE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\s+").ok());

/// Convert document HTML into readable plain text.
///
/// Never fails: if the rules are unavailable the input comes back unchanged.
/// Cleaning already-clean text is a no-op.
pub fn clean_html_content(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }
    match RULES.as_ref() {
        Some(rules) => rules.apply(html),
        None => html.to_string(),
    }
}

/// Flatten HTML to a single line of text.
pub fn remove_html_tags(text: &str) -> String {
    let (Some(tags), Some(ws)) = (ANY_TAG.as_ref(), WHITESPACE.as_ref()) else {
        return text.to_string();
    };
    let spaced = tags.replace_all(text, " ");
    ws.replace_all(&spaced, " ").trim().to_string()
}

/// Preview of `text` no longer than `max_length` characters (plus the
/// ellipsis), cut only at newlines that start a bullet paragraph.
pub fn preview_content(text: &str, max_length: usize) -> String {
    if text.chars().count() <= max_length {
        return text.to_string();
    }

    let mut result = String::new();
    let mut result_len = 0;
    for segment in split_before_bullets(text) {
        let segment_len = segment.chars().count();
        if result_len + segment_len > max_length {
            break;
        }
        result.push_str(segment);
        result_len += segment_len;
    }

    format!("{}{}", result.trim(), ELLIPSIS)
}

/// Split into paragraph bodies and the newline separators that precede a
/// bullet. Separators are kept as their own segments.
fn split_before_bullets(text: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        let next_is_bullet = chars
            .peek()
            .map(|(_, next)| BULLETS.contains(next))
            .unwrap_or(false);
        if c == '\n' && next_is_bullet {
            segments.push(&text[start..idx]);
            segments.push(&text[idx..idx + 1]);
            start = idx + 1;
        }
    }
    segments.push(&text[start..]);
    segments
}
