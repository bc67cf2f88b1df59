//! Chat completion client.
//!
//! Rate limits, server errors and transient network failures are retried
//! with exponential backoff (the delay doubles after every retry). When the
//! budget is spent, or on any other failure, the error is returned to the
//! caller rather than folded into a result value.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::cost::calculate_token_cost;
use crate::error::CompletionError;
use crate::schema::TokenCostInfo;

/// Sends one chat completion request. Implemented over reqwest in
/// production and scripted in tests.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, CompletionError>;
}

/// reqwest transport for an OpenAI-compatible endpoint.
pub struct OpenAiTransport {
    client: Client,
    api_url: String,
    api_key: Option<String>,
}

impl OpenAiTransport {
    pub fn new(api_url: String, api_key: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url,
            api_key,
        })
    }
}

#[async_trait]
impl ChatTransport for OpenAiTransport {
    async fn send(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, CompletionError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(CompletionError::MissingApiKey)?;

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            let code = status.as_u16();
            return Err(match code {
                429 => CompletionError::RateLimited { message },
                500..=599 => CompletionError::Server { status: code, message },
                _ => CompletionError::Api { status: code, message },
            });
        }

        response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| CompletionError::Decode(e.to_string()))
    }
}

fn classify(e: reqwest::Error) -> CompletionError {
    if e.is_timeout() {
        CompletionError::Timeout
    } else if e.is_connect() {
        CompletionError::Connect(e.to_string())
    } else {
        CompletionError::Transport(e.to_string())
    }
}

/// Attempts and initial delay for the completion client.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
}

/// Generated text plus its usage accounting.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub token_info: TokenCostInfo,
}

#[derive(Clone)]
pub struct CompletionClient {
    transport: Arc<dyn ChatTransport>,
    backoff: BackoffPolicy,
    exchange_rate: f64,
    default_model: String,
}

impl CompletionClient {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        backoff: BackoffPolicy,
        exchange_rate: f64,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            backoff,
            exchange_rate,
            default_model: default_model.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let transport = OpenAiTransport::new(
            config.openai_api_url.clone(),
            config.openai_api_key.clone(),
            config.openai_timeout,
        )?;
        Ok(Self::new(
            Arc::new(transport),
            BackoffPolicy {
                max_retries: config.openai_max_retries,
                initial_delay: config.openai_retry_delay,
            },
            config.exchange_rate,
            config.openai_model.clone(),
        ))
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Run a chat completion with retry and backoff.
    pub async fn complete(
        &self,
        messages: Vec<Message>,
        model: &str,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<Completion, CompletionError> {
        let request = ChatCompletionRequest {
            model: model.to_string(),
            messages,
            temperature,
            max_tokens,
        };

        let attempts = self.backoff.max_retries.max(1);
        let mut delay = self.backoff.initial_delay;
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;
            info!(
                "Completion request: model={}, attempt={}/{}",
                model, attempt, attempts
            );

            match self.transport.send(&request).await {
                Ok(response) => return self.finish(response, model, started),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(
                        "{}; retrying in {:?} ({}/{})",
                        e, delay, attempt, attempts
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => {
                    error!("Completion failed after {} attempt(s): {}", attempt, e);
                    return Err(e);
                }
            }
        }
    }

    fn finish(
        &self,
        response: ChatCompletionResponse,
        model: &str,
        started: Instant,
    ) -> Result<Completion, CompletionError> {
        let content = response
            .choices
            .into_iter()
            .next()
            .ok_or(CompletionError::EmptyResponse)?
            .message
            .content
            .unwrap_or_default()
            .trim()
            .to_string();

        let token_info = calculate_token_cost(
            response.usage.prompt_tokens,
            response.usage.completion_tokens,
            model,
            self.exchange_rate,
        )
        .map_err(|e| CompletionError::Decode(format!("invalid usage counters: {}", e)))?;

        info!(
            "Completion received in {:.2}s: input={} output={} cost={:.2} KRW",
            started.elapsed().as_secs_f64(),
            token_info.input_tokens,
            token_info.output_tokens,
            token_info.cost_krw
        );
        debug!("Completion content length: {} chars", content.len());

        Ok(Completion {
            content,
            token_info,
        })
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Usage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

// ============================================================================
// Message types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted outcomes and keeps every request it saw.
    #[derive(Default)]
    pub struct ScriptedChat {
        script: Mutex<VecDeque<Result<ChatCompletionResponse, CompletionError>>>,
        pub requests: Mutex<Vec<ChatCompletionRequest>>,
    }

    impl ScriptedChat {
        pub fn new(script: Vec<Result<ChatCompletionResponse, CompletionError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedChat {
        async fn send(
            &self,
            request: &ChatCompletionRequest,
        ) -> Result<ChatCompletionResponse, CompletionError> {
            self.requests.lock().unwrap().push(request.clone());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(CompletionError::Transport("script exhausted".into())))
        }
    }

    pub fn reply(content: &str, prompt_tokens: u64, completion_tokens: u64) -> ChatCompletionResponse {
        ChatCompletionResponse {
            choices: vec![Choice {
                message: ResponseMessage {
                    content: Some(content.to_string()),
                },
            }],
            usage: Usage {
                prompt_tokens,
                completion_tokens,
            },
        }
    }

    pub fn client(transport: Arc<dyn ChatTransport>, max_retries: u32) -> CompletionClient {
        CompletionClient::new(
            transport,
            BackoffPolicy {
                max_retries,
                initial_delay: Duration::ZERO,
            },
            1450.0,
            "gpt-4o-mini",
        )
    }
}
