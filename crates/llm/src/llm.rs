use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::prompt::{Prompt, PromptArgs};
use ingest::estimate_tokens;

/// Bookkeeping returned next to every completion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionMetadata {
    pub model: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

impl PredictionMetadata {
    pub fn total_tokens(&self) -> usize {
        self.prompt_tokens + self.completion_tokens
    }
}

#[async_trait]
pub trait LlmPredictor: Send + Sync {
    /// Complete an already rendered prompt
    async fn complete(&self, prompt: &str) -> Result<(String, PredictionMetadata)>;

    /// Render `prompt` with `args` and complete it
    async fn predict(
        &self,
        prompt: &Prompt,
        args: &PromptArgs<'_>,
    ) -> Result<(String, PredictionMetadata)> {
        let formatted = prompt.format(args)?;
        self.complete(&formatted).await
    }
}

#[derive(Clone)]
pub struct OllamaPredictor {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<usize>,
    #[serde(default)]
    eval_count: Option<usize>,
}

impl OllamaPredictor {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            base_url,
            model,
            client: reqwest::Client::new(),
        }
    }
}

impl Default for OllamaPredictor {
    fn default() -> Self {
        Self::new(
            "http://localhost:11434".to_string(),
            "llama3".to_string(),
        )
    }
}

#[async_trait]
impl LlmPredictor for OllamaPredictor {
    async fn complete(&self, prompt: &str) -> Result<(String, PredictionMetadata)> {
        let url = format!("{}/api/generate", self.base_url);

        let request = OllamaRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
        };

        let response = self.client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Ollama")?;

        if !response.status().is_success() {
            anyhow::bail!("Ollama request failed: {}", response.status());
        }

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        // Older Ollama builds omit eval counts; fall back to an estimate
        let metadata = PredictionMetadata {
            model: self.model.clone(),
            prompt_tokens: ollama_response
                .prompt_eval_count
                .unwrap_or_else(|| estimate_tokens(prompt)),
            completion_tokens: ollama_response
                .eval_count
                .unwrap_or_else(|| estimate_tokens(&ollama_response.response)),
        };

        tracing::debug!(
            model = %self.model,
            prompt_tokens = metadata.prompt_tokens,
            completion_tokens = metadata.completion_tokens,
            "LLM completion"
        );

        Ok((ollama_response.response, metadata))
    }
}
