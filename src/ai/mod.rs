//! Interface to the hosted language model.
//!
//! Services only see the [`AiClient`] trait, so tests can swap in a fake
//! without a network.

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;
use utoipa::ToSchema;

pub use self::openai::OpenAiClient;

mod openai;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI provider is not configured")]
    NotConfigured,

    /// Network failures, rate limits and provider-side errors.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The provider refused the request; retrying will not help.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The provider answered, but the answer is unusable.
    #[error("invalid output: {0}")]
    InvalidOutput(String),
}

impl AiError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AiError::Transient(_) | AiError::InvalidOutput(_))
    }
}

pub type AiResult<T> = Result<T, AiError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// A JSON schema the model's answer must conform to.
#[derive(Debug, Clone)]
pub struct ResponseSchema<'a> {
    pub name: &'a str,
    pub schema: &'a serde_json::Value,
}

#[async_trait]
pub trait AiClient: Send + Sync {
    /// Run a chat completion and return the assistant's text.
    async fn chat(&self, messages: &[ChatMessage]) -> AiResult<String>;

    /// Run a chat completion constrained to `schema` and return the raw JSON
    /// text of the answer.
    async fn chat_structured(
        &self,
        messages: &[ChatMessage],
        schema: ResponseSchema<'_>,
    ) -> AiResult<String>;

    /// Embed each input, preserving order.
    async fn embed(&self, inputs: &[String]) -> AiResult<Vec<Vec<f32>>>;
}

/// Retry policy for provider calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay: Duration::from_secs(2),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Call `f` until it succeeds, fails with a non-retryable error, or the
/// policy runs out of attempts. `f` receives the errors of earlier attempts.
pub async fn with_retries<T, F, Fut>(policy: RetryPolicy, f: F) -> AiResult<T>
where
    F: Fn(Vec<String>) -> Fut,
    Fut: Future<Output = AiResult<T>>,
{
    let mut history: Vec<String> = Vec::new();
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f(history.clone()).await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() || attempt >= policy.max_attempts => return Err(err),
            Err(err) => {
                tracing::warn!(attempt, error = %err, "AI request failed, retrying");
                history.push(err.to_string());
                if !policy.delay.is_zero() {
                    sleep(policy.delay).await;
                }
            }
        }
    }
}
