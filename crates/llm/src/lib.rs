pub mod embeddings;
pub mod llm;
pub mod prompt;
pub mod service_context;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use embeddings::{EmbeddingModel, OllamaEmbedding, cosine_similarity};
pub use llm::{LlmPredictor, OllamaPredictor, PredictionMetadata};
pub use prompt::{Prompt, PromptArgs, PromptError};
pub use service_context::ServiceContext;
