//! Deterministic fakes for the model-backed capability seams.
//!
//! The pipeline's state machine and retrieval logic are tested without any
//! live service: completions come from a scripted reply queue and embeddings
//! from a fixed-vocabulary bag-of-words encoder whose cosine geometry is easy
//! to reason about in assertions.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{CompletionClient, EmbeddingClient, ExternalServiceError};

/// Scripted completion client. Replies are consumed in order; every call is
/// recorded so tests can assert on call counts and prompt contents.
#[derive(Default)]
pub struct FakeCompletionClient {
    replies: Mutex<VecDeque<Result<String, ExternalServiceError>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub system_prompt: String,
    pub user_prompt: String,
}

impl FakeCompletionClient {
    pub fn with_replies(replies: Vec<Result<String, ExternalServiceError>>) -> Self {
        Self { replies: Mutex::new(replies.into()), calls: Mutex::new(Vec::new()) }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }

    /// User prompts, in call order.
    pub fn recorded_prompts(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| calls.iter().map(|call| call.user_prompt.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CompletionClient for FakeCompletionClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ExternalServiceError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                system_prompt: system_prompt.to_string(),
                user_prompt: user_prompt.to_string(),
            });
        }

        self.replies
            .lock()
            .ok()
            .and_then(|mut replies| replies.pop_front())
            .unwrap_or(Err(ExternalServiceError::MalformedResponse {
                service: "completion",
                message: "fake client has no scripted reply remaining".to_string(),
            }))
    }
}

/// Bag-of-words embedding over a fixed vocabulary, plus a constant bias
/// dimension so no text embeds to the zero vector. Identical text always
/// embeds identically.
#[derive(Clone, Debug)]
pub struct VocabEmbeddingClient {
    vocab: Vec<&'static str>,
}

impl VocabEmbeddingClient {
    /// Vocabulary sized for insurance-domain tests.
    pub fn standard() -> Self {
        Self {
            vocab: vec![
                "theft", "stolen", "vehicle", "car", "auto", "collision", "comprehensive",
                "liability", "house", "dwelling", "roof", "fire", "flood", "hail", "wind",
                "water", "property", "personal", "belongings", "covered", "coverage",
                "exclusion", "deductible", "damage",
            ],
        }
    }

    pub fn dimension(&self) -> usize {
        self.vocab.len() + 1
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.vocab.len() + 1];
        for token in text.to_ascii_lowercase().split(|c: char| !c.is_ascii_alphanumeric()) {
            if token.is_empty() {
                continue;
            }
            if let Some(position) = self.vocab.iter().position(|term| *term == token) {
                vector[position] += 1.0;
            }
        }
        // Bias keeps zero-overlap texts representable.
        vector[self.vocab.len()] = 1.0;
        vector
    }
}

#[async_trait]
impl EmbeddingClient for VocabEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ExternalServiceError> {
        Ok(self.embed_text(text))
    }
}

/// Embedding client that always fails, for exercising the abort path.
pub struct FailingEmbeddingClient {
    pub error: ExternalServiceError,
}

#[async_trait]
impl EmbeddingClient for FailingEmbeddingClient {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ExternalServiceError> {
        Err(self.error.clone())
    }
}
