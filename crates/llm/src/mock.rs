//! Scripted predictor and embedding doubles for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use crate::embeddings::EmbeddingModel;
use crate::llm::{LlmPredictor, PredictionMetadata};
use ingest::estimate_tokens;

type Handler = Box<dyn Fn(&str) -> Result<String> + Send + Sync>;

/// Predictor that answers from a handler and records every prompt it sees.
///
/// The default handler answers tree selection prompts with `ANSWER: 1` and
/// anything else with the last non-empty line of the prompt.
pub struct MockLlm {
    handler: Handler,
    calls: Mutex<Vec<String>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self::with_handler(|prompt| {
            if prompt.contains("'ANSWER: <number>'") {
                return Ok("ANSWER: 1".to_string());
            }
            Ok(prompt
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("empty prompt")
                .trim()
                .to_string())
        })
    }

    pub fn fixed(response: impl Into<String>) -> Self {
        let response = response.into();
        Self::with_handler(move |_| Ok(response.clone()))
    }

    pub fn failing(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::with_handler(move |_| Err(anyhow::anyhow!(message.clone())))
    }

    pub fn with_handler(handler: impl Fn(&str) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Rendered prompts, oldest first
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockLlm {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmPredictor for MockLlm {
    async fn complete(&self, prompt: &str) -> Result<(String, PredictionMetadata)> {
        self.calls.lock().unwrap().push(prompt.to_string());
        let text = (self.handler)(prompt)?;

        let metadata = PredictionMetadata {
            model: "mock".to_string(),
            prompt_tokens: estimate_tokens(prompt),
            completion_tokens: estimate_tokens(&text),
        };
        Ok((text, metadata))
    }
}

/// Embedding double: fixed vectors for known texts, a letter histogram otherwise
pub struct MockEmbedding {
    dimension: usize,
    vectors: HashMap<String, Vec<f32>>,
    query_vector: Option<Vec<f32>>,
    fail: bool,
}

impl MockEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: HashMap::new(),
            query_vector: None,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(5)
        }
    }

    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.into(), vector);
        self
    }

    /// Every query embeds to `vector`
    pub fn with_query_vector(mut self, vector: Vec<f32>) -> Self {
        self.query_vector = Some(vector);
        self
    }

    fn histogram(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension.max(1)];
        let len = vector.len();
        for byte in text.bytes().filter(u8::is_ascii_alphabetic) {
            vector[(byte.to_ascii_lowercase() - b'a') as usize % len] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingModel for MockEmbedding {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        if self.fail {
            anyhow::bail!("mock embedding failure");
        }
        Ok(self
            .vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.histogram(text)))
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        match &self.query_vector {
            Some(vector) if !self.fail => Ok(vector.clone()),
            _ => self.embed_text(query).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::tree_select_prompt;

    #[tokio::test]
    async fn test_mock_llm_answers_selection_prompts() {
        let llm = MockLlm::new();
        let (text, _) = llm
            .predict(
                &tree_select_prompt(),
                &[("num_chunks", "2"), ("context_list", "(1) a\n(2) b"), ("query_str", "q")],
            )
            .await
            .unwrap();

        assert_eq!(text, "ANSWER: 1");
        assert_eq!(llm.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_embedding_overrides() {
        let embed = MockEmbedding::new(5)
            .with_vector("hobbits", vec![1.0, 0.0, 0.0, 0.0, 0.0])
            .with_query_vector(vec![0.0, 0.0, 1.0, 0.0, 0.0]);

        assert_eq!(embed.embed_text("hobbits").await.unwrap()[0], 1.0);
        assert_eq!(embed.embed_query("anything").await.unwrap()[2], 1.0);
        assert_eq!(embed.embed_text("abc").await.unwrap().len(), 5);
    }
}
