use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use index::{IndexKind, QueryMode};
use ingest::ChunkerConfig;
use llm::{OllamaEmbedding, OllamaPredictor, ServiceContext};

use crate::playground::{PlaygroundError, modes_from_value, parse_index_kinds};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaygroundConfig {
    pub ollama_url: String,
    pub llm_model: String,
    pub embed_model: String,
    pub chunk_size_tokens: usize,
    pub chunk_overlap_tokens: usize,
    pub index_kinds: Vec<String>,
    /// Kept untyped so a malformed value is reported as such, not as a parse failure
    pub modes: serde_json::Value,
    pub feedback_rounds: usize,
    pub output_dir: String,
    pub json_logs: bool,
}

impl Default for PlaygroundConfig {
    fn default() -> Self {
        let chunker = ChunkerConfig::default();

        Self {
            ollama_url: "http://localhost:11434".to_string(),
            llm_model: "llama3".to_string(),
            embed_model: "nomic-embed-text".to_string(),
            chunk_size_tokens: chunker.chunk_size_tokens,
            chunk_overlap_tokens: chunker.overlap_tokens,
            index_kinds: IndexKind::ALL.iter().map(|k| k.name().to_string()).collect(),
            modes: serde_json::Value::Array(
                QueryMode::ALL
                    .iter()
                    .map(|m| serde_json::Value::String(m.as_str().to_string()))
                    .collect(),
            ),
            feedback_rounds: 0,
            output_dir: "playground_output".to_string(),
            json_logs: false,
        }
    }
}

impl PlaygroundConfig {
    /// Read a JSON config file; missing fields take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {:?}", path))
    }

    pub fn index_kinds(&self) -> Result<Vec<IndexKind>, PlaygroundError> {
        parse_index_kinds(self.index_kinds.as_slice())
    }

    pub fn modes(&self) -> Result<Vec<QueryMode>, PlaygroundError> {
        modes_from_value(&self.modes)
    }

    pub fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig {
            chunk_size_tokens: self.chunk_size_tokens,
            overlap_tokens: self.chunk_overlap_tokens,
        }
    }

    pub fn service_context(&self) -> Result<ServiceContext> {
        let chunker_config = self.chunker_config();
        chunker_config.validate().context("Invalid chunking config")?;

        Ok(ServiceContext::new(
            Arc::new(OllamaPredictor::new(self.ollama_url.clone(), self.llm_model.clone())),
            Arc::new(OllamaEmbedding::new(self.ollama_url.clone(), self.embed_model.clone())),
            chunker_config,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_registry() {
        let config = PlaygroundConfig::default();

        assert_eq!(config.index_kinds().unwrap(), IndexKind::ALL.to_vec());
        assert_eq!(config.modes().unwrap(), QueryMode::ALL.to_vec());
    }

    #[test]
    fn test_partial_config() {
        let config: PlaygroundConfig =
            serde_json::from_str(r#"{"index_kinds": ["tree"], "modes": ["summarize"]}"#).unwrap();

        assert_eq!(config.index_kinds().unwrap(), vec![IndexKind::Tree]);
        assert_eq!(config.modes().unwrap(), vec![QueryMode::Summarize]);
        assert_eq!(config.llm_model, "llama3");
    }

    #[test]
    fn test_overlap_must_fit_in_chunk() {
        let config: PlaygroundConfig =
            serde_json::from_str(r#"{"chunk_size_tokens": 8, "chunk_overlap_tokens": 20}"#).unwrap();

        let err = config.service_context().err().unwrap();
        assert!(format!("{:#}", err).contains("overlap_tokens (20)"));
        assert!(PlaygroundConfig::default().service_context().is_ok());
    }

    #[test]
    fn test_modes_must_be_a_list() {
        let config: PlaygroundConfig = serde_json::from_str(r#"{"modes": "default"}"#).unwrap();
        assert!(matches!(config.modes(), Err(PlaygroundError::ModesNotSequence(_))));
    }
}
