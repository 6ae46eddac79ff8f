//! Language-model and embedding capability seams.
//!
//! The pipeline consumes two opaque remote capabilities: a chat-completion
//! endpoint and a text-embedding endpoint. Both are modeled as traits so the
//! state machine and retrieval logic can be exercised with deterministic
//! fakes (see [`crate::testing`]). The HTTP implementations speak the
//! OpenAI-compatible wire shape served by OpenAI, Groq, and Ollama alike, and
//! wrap every call in a request-level timeout.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use coverly_core::config::{EmbeddingConfig, LlmConfig};

/// Timeout or transport/protocol failure from a remote model service.
/// Aborts the current request; never produces a partial verdict.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExternalServiceError {
    #[error("{service} call timed out after {timeout_secs}s")]
    Timeout { service: &'static str, timeout_secs: u64 },
    #[error("{service} transport failure: {message}")]
    Transport { service: &'static str, message: String },
    #[error("{service} returned a malformed response: {message}")]
    MalformedResponse { service: &'static str, message: String },
}

/// Text-completion capability: prompt in, free or structured text out.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ExternalServiceError>;
}

/// Embedding capability: text in, fixed-length vector out.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ExternalServiceError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ExternalServiceError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// OpenAI-compatible `/chat/completions` client.
pub struct HttpCompletionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    timeout: Duration,
}

impl HttpCompletionClient {
    pub fn new(config: &LlmConfig) -> Self {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ExternalServiceError> {
        const SERVICE: &str = "completion";

        let payload = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: system_prompt },
                ChatMessage { role: "user", content: user_prompt },
            ],
            temperature: 0.1,
        };

        let mut request = self.http.post(format!("{}/chat/completions", self.base_url));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = with_timeout(SERVICE, self.timeout, request.json(&payload).send()).await?;
        let body: ChatResponse =
            with_timeout(SERVICE, self.timeout, response.json()).await.map_err(|error| {
                match error {
                    ExternalServiceError::Transport { message, .. } => {
                        ExternalServiceError::MalformedResponse { service: SERVICE, message }
                    }
                    other => other,
                }
            })?;

        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(ExternalServiceError::MalformedResponse {
                service: SERVICE,
                message: "response contained no choices".to_string(),
            })
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

/// OpenAI-compatible `/embeddings` client.
pub struct HttpEmbeddingClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    timeout: Duration,
}

impl HttpEmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ExternalServiceError> {
        const SERVICE: &str = "embedding";

        let payload = EmbeddingRequest { model: &self.model, input: text };
        let mut request = self.http.post(format!("{}/embeddings", self.base_url));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = with_timeout(SERVICE, self.timeout, request.json(&payload).send()).await?;
        let body: EmbeddingResponse =
            with_timeout(SERVICE, self.timeout, response.json()).await.map_err(|error| {
                match error {
                    ExternalServiceError::Transport { message, .. } => {
                        ExternalServiceError::MalformedResponse { service: SERVICE, message }
                    }
                    other => other,
                }
            })?;

        body.data.into_iter().next().map(|datum| datum.embedding).ok_or(
            ExternalServiceError::MalformedResponse {
                service: SERVICE,
                message: "response contained no embedding data".to_string(),
            },
        )
    }
}

async fn with_timeout<T, E>(
    service: &'static str,
    timeout: Duration,
    future: impl std::future::Future<Output = Result<T, E>>,
) -> Result<T, ExternalServiceError>
where
    E: std::fmt::Display,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => {
            Err(ExternalServiceError::Transport { service, message: error.to_string() })
        }
        Err(_) => Err(ExternalServiceError::Timeout { service, timeout_secs: timeout.as_secs() }),
    }
}

/// Strip a surrounding markdown code fence from a model reply, if present.
/// Models regularly wrap requested JSON in ```json fences.
pub(crate) fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the fence line.
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{strip_code_fences, with_timeout, ExternalServiceError};

    #[test]
    fn strips_fences_with_and_without_language_tag() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[tokio::test]
    async fn slow_calls_become_timeout_errors() {
        let result: Result<(), ExternalServiceError> =
            with_timeout("completion", Duration::from_millis(5), async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<(), std::io::Error>(())
            })
            .await;

        assert_eq!(
            result,
            Err(ExternalServiceError::Timeout { service: "completion", timeout_secs: 0 })
        );
    }
}
