//! Application configuration.
//!
//! Values come from the process environment (a `.env` file is loaded by
//! `main` first). Per-document-type behaviour lives in a static table.

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::schema::DocType;

pub const DEFAULT_API_BASE_URL: &str = "http://apis.data.go.kr/1741000/publicDoc";
pub const DEFAULT_OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Settings for the whole process.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub public_data_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub api_base_url: String,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub request_timeout: Duration,
    pub exchange_rate: f64,
    pub openai_model: String,
    pub openai_api_url: String,
    pub openai_max_retries: u32,
    pub openai_retry_delay: Duration,
    pub openai_timeout: Duration,
    pub preview_max_length: usize,
    pub log_level: String,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            public_data_api_key: None,
            openai_api_key: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            request_timeout: Duration::from_secs(10),
            exchange_rate: 1450.0,
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            openai_api_url: DEFAULT_OPENAI_API_URL.to_string(),
            openai_max_retries: 3,
            openai_retry_delay: Duration::from_millis(1000),
            openai_timeout: Duration::from_secs(60),
            preview_max_length: 500,
            log_level: "info".to_string(),
            port: 5000,
        }
    }
}

impl AppConfig {
    /// Read every recognised variable, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            public_data_api_key: secret("PUBLIC_DATA_API_KEY"),
            openai_api_key: secret("OPENAI_API_KEY"),
            api_base_url: env::var("API_BASE_URL").unwrap_or(defaults.api_base_url),
            max_retries: parse_or("MAX_RETRIES", defaults.max_retries)?,
            retry_delay: Duration::from_secs(parse_or("RETRY_DELAY", 2u64)?),
            request_timeout: Duration::from_secs(parse_or("REQUEST_TIMEOUT", 10u64)?),
            exchange_rate: parse_or("EXCHANGE_RATE", defaults.exchange_rate)?,
            openai_model: env::var("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            openai_api_url: env::var("OPENAI_API_URL").unwrap_or(defaults.openai_api_url),
            openai_max_retries: parse_or("OPENAI_MAX_RETRIES", defaults.openai_max_retries)?,
            openai_retry_delay: Duration::from_millis(parse_or("OPENAI_RETRY_DELAY_MS", 1000u64)?),
            openai_timeout: Duration::from_secs(parse_or("OPENAI_TIMEOUT", 60u64)?),
            preview_max_length: parse_or("PREVIEW_MAX_LENGTH", defaults.preview_max_length)?,
            log_level: env::var("LOG_LEVEL")
                .map(|level| level.to_lowercase())
                .unwrap_or(defaults.log_level),
            port: parse_or("PORT", defaults.port)?,
        })
    }
}

/// Credentials are treated as missing when unset or blank.
fn secret(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}

// ============================================================================
// Per-document-type table
// ============================================================================

/// A metadata field copied from a `resultList` record into the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaField {
    Time,
    Ministry,
    Department,
    Manager,
    RelevantDepartments,
    Place,
    Person,
}

impl MetaField {
    /// Key of this field in the upstream `meta` object.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::Ministry => "ministry",
            Self::Department => "department",
            Self::Manager => "manager",
            Self::RelevantDepartments => "relevantdepartments",
            Self::Place => "place",
            Self::Person => "person",
        }
    }
}

/// Endpoint and field set for one document type.
#[derive(Debug)]
pub struct DocTypeConfig {
    pub endpoint: &'static str,
    /// Whether the request carries a `manager` parameter.
    pub requires_manager: bool,
    pub meta_fields: &'static [MetaField],
}

static PRESS: DocTypeConfig = DocTypeConfig {
    endpoint: "getDocPress",
    requires_manager: true,
    meta_fields: &[
        MetaField::Time,
        MetaField::Ministry,
        MetaField::Department,
        MetaField::Manager,
        MetaField::RelevantDepartments,
    ],
};

static SPEECH: DocTypeConfig = DocTypeConfig {
    endpoint: "getDocSpeech",
    requires_manager: false,
    meta_fields: &[MetaField::Place, MetaField::Person],
};

static PUBLICATION: DocTypeConfig = DocTypeConfig {
    endpoint: "getDocPublication",
    requires_manager: false,
    meta_fields: &[MetaField::Person],
};

static REPORT: DocTypeConfig = DocTypeConfig {
    endpoint: "getDocReport",
    requires_manager: false,
    meta_fields: &[MetaField::Ministry, MetaField::Department, MetaField::Manager],
};

static PLAN: DocTypeConfig = DocTypeConfig {
    endpoint: "getDocPlan",
    requires_manager: false,
    meta_fields: &[MetaField::Place, MetaField::Person],
};

static ALL: DocTypeConfig = DocTypeConfig {
    endpoint: "getDocAll",
    requires_manager: false,
    meta_fields: &[],
};

/// Look up the table entry for a document type.
pub fn doc_type_config(doc_type: DocType) -> &'static DocTypeConfig {
    match doc_type {
        DocType::Press => &PRESS,
        DocType::Speech => &SPEECH,
        DocType::Publication => &PUBLICATION,
        DocType::Report => &REPORT,
        DocType::Plan => &PLAN,
        DocType::All => &ALL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_press_requires_manager() {
        for doc_type in DocType::ALL {
            assert_eq!(
                doc_type_config(doc_type).requires_manager,
                doc_type == DocType::Press
            );
        }
    }

    #[test]
    fn test_endpoints_are_distinct() {
        let mut endpoints: Vec<_> = DocType::ALL
            .iter()
            .map(|d| doc_type_config(*d).endpoint)
            .collect();
        endpoints.sort();
        endpoints.dedup();
        assert_eq!(endpoints.len(), DocType::ALL.len());
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(2));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.exchange_rate, 1450.0);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert!(config.public_data_api_key.is_none());
    }

    #[test]
    fn test_parse_or_falls_back_when_unset() {
        let value: u32 = parse_or("GOVDRAFT_TEST_SURELY_UNSET_VAR", 7).unwrap();
        assert_eq!(value, 7);
    }
}
