use std::sync::Arc;

use ingest::{Chunker, ChunkerConfig};

use crate::embeddings::{EmbeddingModel, OllamaEmbedding};
use crate::llm::{LlmPredictor, OllamaPredictor};

/// Collaborators shared by index construction and querying
#[derive(Clone)]
pub struct ServiceContext {
    pub llm_predictor: Arc<dyn LlmPredictor>,
    pub embed_model: Arc<dyn EmbeddingModel>,
    pub chunker: Chunker,
}

impl ServiceContext {
    pub fn new(
        llm_predictor: Arc<dyn LlmPredictor>,
        embed_model: Arc<dyn EmbeddingModel>,
        chunker_config: ChunkerConfig,
    ) -> Self {
        Self {
            llm_predictor,
            embed_model,
            chunker: Chunker::new(chunker_config),
        }
    }
}

impl Default for ServiceContext {
    fn default() -> Self {
        Self::new(
            Arc::new(OllamaPredictor::default()),
            Arc::new(OllamaEmbedding::default()),
            ChunkerConfig::default(),
        )
    }
}
