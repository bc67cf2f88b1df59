//! Client for the public-data document search API.
//!
//! Requests are retried on timeouts and connection failures with a fixed
//! delay. HTTP error statuses, undecodable bodies and other request failures
//! end the call immediately. Results are returned as data, never raised.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::{doc_type_config, AppConfig};
use crate::error::SearchError;
use crate::normalizer::{parse_api_response, PageRequest};
use crate::redact::{params_for_log, redact_url};
use crate::schema::{DocType, DocumentQuery, SearchPage};

/// Raw HTTP outcome handed back by a transport.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    /// Final request URL, credential included.
    pub url: String,
    pub body: String,
}

/// Transport-level failure, classified for the retry loop.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    Timeout,
    Connect(String),
    Other(String),
}

/// GET with query parameters. Implemented over reqwest in production and
/// scripted in tests.
#[async_trait]
pub trait DocumentTransport: Send + Sync {
    async fn get(
        &self,
        url: &str,
        params: &[(&'static str, String)],
    ) -> Result<TransportResponse, TransportError>;
}

/// reqwest transport with a fixed timeout. Certificate verification is left
/// at reqwest's default (enabled) on every attempt.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DocumentTransport for HttpTransport {
    async fn get(
        &self,
        url: &str,
        params: &[(&'static str, String)],
    ) -> Result<TransportResponse, TransportError> {
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .query(params)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response.text().await.map_err(classify)?;

        Ok(TransportResponse {
            status,
            url: final_url,
            body,
        })
    }
}

fn classify(e: reqwest::Error) -> TransportError {
    // reqwest errors can embed the request URL, so they are redacted too
    let message = redact_url(&e.to_string());
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::Connect(message)
    } else {
        TransportError::Other(message)
    }
}

/// Retry settings for the document client.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

/// Document search client.
#[derive(Clone)]
pub struct GovernmentClient {
    transport: Arc<dyn DocumentTransport>,
    api_key: Option<String>,
    base_url: String,
    retry: RetryPolicy,
    preview_max_length: usize,
}

impl GovernmentClient {
    pub fn new(
        transport: Arc<dyn DocumentTransport>,
        api_key: Option<String>,
        base_url: impl Into<String>,
        retry: RetryPolicy,
        preview_max_length: usize,
    ) -> Self {
        Self {
            transport,
            api_key,
            base_url: base_url.into(),
            retry,
            preview_max_length,
        }
    }

    /// Build a client over reqwest from the application config.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let transport = HttpTransport::new(config.request_timeout)?;
        Ok(Self::new(
            Arc::new(transport),
            config.public_data_api_key.clone(),
            config.api_base_url.clone(),
            RetryPolicy {
                max_retries: config.max_retries,
                delay: config.retry_delay,
            },
            config.preview_max_length,
        ))
    }

    /// Search one page of documents.
    pub async fn fetch(&self, query: &DocumentQuery) -> Result<SearchPage, SearchError> {
        let Some(api_key) = self.api_key.as_deref() else {
            error!("Document API key is not configured");
            return Err(SearchError::MissingApiKey);
        };
        let Some(doc_type) = DocType::from_str(&query.doc_type) else {
            error!("Unsupported document type: {}", query.doc_type);
            return Err(SearchError::UnsupportedDocType(query.doc_type.clone()));
        };

        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            doc_type_config(doc_type).endpoint
        );
        let params = build_params(api_key, query, doc_type);

        info!(
            "Document search: keyword={:?}, doc_type={}, manager={:?}",
            query.keyword, doc_type, query.manager
        );
        info!("API request: {}?{}", url, params_for_log(&params));

        let attempts = self.retry.max_retries.max(1);
        for attempt in 1..=attempts {
            match self.transport.get(&url, &params).await {
                Ok(response) => {
                    return self.handle_response(response, doc_type, query);
                }
                Err(TransportError::Timeout) => {
                    warn!("API request timed out (attempt {}/{})", attempt, attempts);
                }
                Err(TransportError::Connect(message)) => {
                    warn!(
                        "API connection failed (attempt {}/{}): {}",
                        attempt, attempts, message
                    );
                }
                Err(TransportError::Other(message)) => {
                    error!("API request failed: {}", message);
                    return Err(SearchError::Request(message));
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.retry.delay).await;
            }
        }

        error!("API call failed after {} attempts", attempts);
        Err(SearchError::RetriesExhausted { attempts })
    }

    fn handle_response(
        &self,
        response: TransportResponse,
        doc_type: DocType,
        query: &DocumentQuery,
    ) -> Result<SearchPage, SearchError> {
        info!("API request sent: {}", redact_url(&response.url));

        if !(200..300).contains(&response.status) {
            let message = snippet(&response.body, 200);
            error!("API HTTP error: {} {}", response.status, message);
            return Err(SearchError::Http {
                status: response.status,
                message,
            });
        }

        debug!("API response preview: {}...", snippet(&response.body, 200));

        let data: Value = serde_json::from_str(&response.body).map_err(|e| {
            error!(
                "Failed to decode API response: {}. Body: {}...",
                e,
                snippet(&response.body, 500)
            );
            SearchError::MalformedBody(e.to_string())
        })?;

        parse_api_response(
            &data,
            doc_type,
            PageRequest {
                page: query.page,
                per_page: query.per_page,
            },
            self.preview_max_length,
        )
    }
}

/// Query parameters in their fixed order. `manager` is sent only for
/// document types that take it, and is sent even when empty.
pub fn build_params(
    api_key: &str,
    query: &DocumentQuery,
    doc_type: DocType,
) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("serviceKey", api_key.to_string()),
        ("pageNo", query.page.to_string()),
        ("numOfRows", query.per_page.to_string()),
        ("type", "json".to_string()),
        ("title", query.keyword.clone()),
    ];
    if doc_type_config(doc_type).requires_manager {
        params.push(("manager", query.manager.clone()));
    }
    params
}

fn snippet(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
