//! Client for OpenAI-compatible chat completion and embedding endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{AiClient, AiError, AiResult, ChatMessage, ResponseSchema};
use crate::config::AiConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    chat_model: String,
    embedding_model: String,
}

impl OpenAiClient {
    pub fn new(config: &AiConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            chat_model: config.chat_model.clone(),
            embedding_model: config.embedding_model.clone(),
        })
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> AiResult<R>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%url, "AI request");
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AiError::Transient(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, text));
        }

        resp.json::<R>()
            .await
            .map_err(|e| AiError::InvalidOutput(format!("unexpected response body: {e}")))
    }

    async fn complete(&self, body: serde_json::Value) -> AiResult<String> {
        let resp: ChatCompletionResponse = self.post("/chat/completions", &body).await?;
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AiError::InvalidOutput("no choices returned".into()))?;
        if choice.finish_reason.as_deref() == Some("length") {
            return Err(AiError::InvalidOutput("answer was truncated".into()));
        }
        if let Some(refusal) = choice.message.refusal {
            return Err(AiError::Rejected(format!("model refused: {refusal}")));
        }
        choice
            .message
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AiError::InvalidOutput("empty answer".into()))
    }
}

fn classify_status(status: StatusCode, body: String) -> AiError {
    let msg = format!("{status}: {}", body.chars().take(500).collect::<String>());
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        AiError::Transient(msg)
    } else {
        AiError::Rejected(msg)
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl AiClient for OpenAiClient {
    async fn chat(&self, messages: &[ChatMessage]) -> AiResult<String> {
        self.complete(json!({
            "model": self.chat_model,
            "messages": messages,
            "temperature": 0.3,
        }))
        .await
    }

    async fn chat_structured(
        &self,
        messages: &[ChatMessage],
        schema: ResponseSchema<'_>,
    ) -> AiResult<String> {
        self.complete(json!({
            "model": self.chat_model,
            "messages": messages,
            "temperature": 0.2,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "strict": true,
                    "schema": schema.schema,
                }
            }
        }))
        .await
    }

    async fn embed(&self, inputs: &[String]) -> AiResult<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let resp: EmbeddingResponse = self
            .post(
                "/embeddings",
                &json!({
                    "model": self.embedding_model,
                    "input": inputs,
                }),
            )
            .await?;

        if resp.data.len() != inputs.len() {
            return Err(AiError::InvalidOutput(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                resp.data.len()
            )));
        }
        let mut data = resp.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}
