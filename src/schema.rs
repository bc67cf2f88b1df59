//! Wire types for document search and draft generation.
//!
//! Field names follow the JSON the front-end already consumes: search results
//! are camelCase, token accounting is snake_case.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SearchError;

/// Current UTC time as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn now_iso8601() -> String {
    format_iso8601(Utc::now())
}

fn format_iso8601(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ============================================================================
// Document types
// ============================================================================

/// Government document category. Selects the upstream endpoint and which
/// metadata fields are copied into each item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    Press,
    Speech,
    Publication,
    Report,
    Plan,
    All,
}

impl DocType {
    pub const ALL: [DocType; 6] = [
        DocType::Press,
        DocType::Speech,
        DocType::Publication,
        DocType::Report,
        DocType::Plan,
        DocType::All,
    ];

    /// Parse a query-parameter string into a document type.
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|doc_type| doc_type.as_str() == s)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Press => "press",
            Self::Speech => "speech",
            Self::Publication => "publication",
            Self::Report => "report",
            Self::Plan => "plan",
            Self::All => "all",
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A search request as received from the caller.
///
/// `doc_type` stays a raw string so that unsupported values can be rejected
/// by the client before any network call, and so the cache fingerprint keeps
/// exactly what the caller sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentQuery {
    pub keyword: String,
    pub page: u32,
    pub per_page: u32,
    pub doc_type: String,
    pub manager: String,
}

impl DocumentQuery {
    pub fn new(keyword: impl Into<String>, doc_type: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            page: 1,
            per_page: 10,
            doc_type: doc_type.into(),
            manager: String::new(),
        }
    }

    pub fn page(mut self, page: u32, per_page: u32) -> Self {
        self.page = page;
        self.per_page = per_page;
        self
    }

    pub fn manager(mut self, manager: impl Into<String>) -> Self {
        self.manager = manager.into();
        self
    }

    /// Cache key: all five fields, always in the same order.
    pub fn fingerprint(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.keyword, self.page, self.per_page, self.doc_type, self.manager
        )
    }
}

/// Canonical item produced from a `resultList` record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentItem {
    pub id: String,
    pub title: String,
    #[serde(rename = "docType")]
    pub doc_type: String,
    pub date: String,
    /// Tag-stripped plain text.
    pub content: String,
    /// Paragraph-aligned preview of `content`.
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ministry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevantdepartments: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub person: Option<String>,
}

/// One entry in a search page.
///
/// `resultList` responses become [`DocumentItem`]s; `items` responses are
/// passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SearchItem {
    Document(DocumentItem),
    Raw(serde_json::Value),
}

impl SearchItem {
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Document(item) => Some(item.id.as_str()),
            Self::Raw(value) => value.get("id").and_then(|v| v.as_str()),
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::Document(item) => &item.title,
            Self::Raw(value) => value.get("title").and_then(|v| v.as_str()).unwrap_or(""),
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::Document(item) => &item.content,
            Self::Raw(value) => value
                .get("content")
                .and_then(|v| v.as_str())
                .unwrap_or(""),
        }
    }
}

/// A successful, normalized search page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub items: Vec<SearchItem>,
    pub total_count: u64,
    pub page_no: u64,
    pub num_of_rows: u64,
    pub doc_type: DocType,
}

/// What the search entry point hands back: a page or `{"error": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SearchResult {
    Page(SearchPage),
    Error { error: String },
}

impl SearchResult {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    pub fn page(&self) -> Option<&SearchPage> {
        match self {
            Self::Page(page) => Some(page),
            Self::Error { .. } => None,
        }
    }
}

impl From<Result<SearchPage, SearchError>> for SearchResult {
    fn from(result: Result<SearchPage, SearchError>) -> Self {
        match result {
            Ok(page) => Self::Page(page),
            Err(e) => Self::Error {
                error: e.to_string(),
            },
        }
    }
}

// ============================================================================
// Token accounting
// ============================================================================

/// Token usage and derived cost for one completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenCostInfo {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
    pub cost_krw: f64,
    pub model: String,
}
