//! Error types for the upstream integrations and token accounting.
//!
//! The document search path and the completion path report failure
//! differently. Search errors are rendered into the `{"error": ...}` shape
//! and handed back as data; completion errors are propagated to the caller
//! once retries are used up.

use thiserror::Error;

/// Failure of a document search.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SearchError {
    #[error("document API key is not configured")]
    MissingApiKey,

    #[error("unsupported document type: {0}")]
    UnsupportedDocType(String),

    #[error("API error: {message} (code: {code})")]
    Upstream { code: String, message: String },

    #[error("API HTTP error ({status}): {message}")]
    Http { status: u16, message: String },

    #[error("could not parse API response as JSON: {0}")]
    MalformedBody(String),

    #[error("API request failed: {0}")]
    Request(String),

    #[error("failed to process API response: {0}")]
    Parse(String),

    #[error("API call failed after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

/// Failure of a chat completion call.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion API key is not configured")]
    MissingApiKey,

    #[error("rate limited by completion API: {message}")]
    RateLimited { message: String },

    #[error("completion API server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("completion API rejected request ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("completion request timed out")]
    Timeout,

    #[error("could not connect to completion API: {0}")]
    Connect(String),

    #[error("completion request failed: {0}")]
    Transport(String),

    #[error("failed to decode completion response: {0}")]
    Decode(String),

    #[error("completion response contained no choices")]
    EmptyResponse,
}

impl CompletionError {
    /// Rate limits, server-side failures and transient network errors are
    /// worth another attempt; everything else is final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Server { .. } | Self::Timeout | Self::Connect(_)
        )
    }
}

/// Failure of a token cost computation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CostError {
    #[error("token counts too large: {input} + {output}")]
    Overflow { input: u64, output: u64 },

    #[error("tokenizer is unavailable")]
    TokenizerUnavailable,
}
