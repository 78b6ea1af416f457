use anyhow::Result;
use std::sync::Arc;

use index::{Index, IndexError, QueryBundle, QueryMode};

use crate::schema::Response;
use crate::synthesizer::{ResponseMode, ResponseSynthesizer};
use crate::transform::QueryTransform;

/// Runs one index in one mode: transform, retrieve, synthesize
pub struct QueryEngine<'a> {
    index: &'a Index,
    mode: QueryMode,
    synthesizer: ResponseSynthesizer,
    query_transform: Option<Arc<dyn QueryTransform>>,
}

impl<'a> QueryEngine<'a> {
    pub fn new(index: &'a Index, mode: QueryMode) -> Result<Self, IndexError> {
        if !index.kind().supports(mode) {
            return Err(IndexError::UnsupportedMode {
                kind: index.kind(),
                mode,
            });
        }

        let response_mode = match mode {
            QueryMode::Summarize => ResponseMode::TreeSummarize,
            _ => ResponseMode::CompactRefine,
        };
        let synthesizer = ResponseSynthesizer::new(
            index.service_context().llm_predictor.clone(),
            response_mode,
        );

        Ok(Self {
            index,
            mode,
            synthesizer,
            query_transform: None,
        })
    }

    pub fn with_query_transform(mut self, query_transform: Arc<dyn QueryTransform>) -> Self {
        self.query_transform = Some(query_transform);
        self
    }

    pub fn mode(&self) -> QueryMode {
        self.mode
    }

    pub async fn query(&self, query: &str) -> Result<Response> {
        self.query_bundle(QueryBundle::new(query)).await
    }

    pub async fn query_bundle(&self, query_bundle: QueryBundle) -> Result<Response> {
        let query_bundle = match &self.query_transform {
            Some(transform) => transform.transform(query_bundle).await?,
            None => query_bundle,
        };

        let retrieval = self.index.retrieve(&query_bundle, self.mode).await?;
        self.synthesizer
            .synthesize(&query_bundle, retrieval.nodes, retrieval.usage)
            .await
    }
}

pub trait AsQueryEngine {
    fn as_query_engine(&self, mode: QueryMode) -> Result<QueryEngine<'_>, IndexError>;
}

impl AsQueryEngine for Index {
    fn as_query_engine(&self, mode: QueryMode) -> Result<QueryEngine<'_>, IndexError> {
        QueryEngine::new(self, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::FeedbackQueryTransformation;
    use crate::schema::Evaluation;
    use index::IndexKind;
    use ingest::{ChunkerConfig, Document};
    use llm::ServiceContext;
    use llm::mock::{MockEmbedding, MockLlm};

    async fn build(kind: IndexKind, llm: Arc<MockLlm>) -> Index {
        let ctx = ServiceContext::new(llm, Arc::new(MockEmbedding::new(5)), ChunkerConfig::default());
        let documents = vec![Document::new("They're taking the Hobbits to Isengard!")];
        Index::from_documents(kind, &documents, &ctx).await.unwrap()
    }

    #[tokio::test]
    async fn test_query_answers_from_retrieved_context() {
        let llm = Arc::new(MockLlm::fixed("Orcs"));
        let index = build(IndexKind::List, llm.clone()).await;

        let response = index.as_query_engine(QueryMode::Default).unwrap().query("Who is?").await.unwrap();

        assert_eq!(response.response.as_deref(), Some("Orcs"));
        assert_eq!(response.source_nodes.len(), 1);
        assert!(llm.calls()[0].contains("They're taking the Hobbits to Isengard!"));
        assert!(llm.calls()[0].contains("answer the question: Who is?"));
    }

    #[tokio::test]
    async fn test_unsupported_mode_has_no_engine() {
        let index = build(IndexKind::VectorStore, Arc::new(MockLlm::new())).await;

        assert!(index.as_query_engine(QueryMode::Default).is_ok());
        assert!(matches!(
            index.as_query_engine(QueryMode::Retrieve),
            Err(IndexError::UnsupportedMode { kind: IndexKind::VectorStore, mode: QueryMode::Retrieve })
        ));
    }

    #[tokio::test]
    async fn test_every_supported_mode_answers() {
        for kind in IndexKind::ALL {
            let index = build(kind, Arc::new(MockLlm::new())).await;
            for &mode in kind.supported_modes() {
                let response = index.as_query_engine(mode).unwrap().query("Who is?").await.unwrap();
                assert!(response.response.is_some(), "{kind} {mode}");
            }
        }
    }

    #[tokio::test]
    async fn test_query_transform_runs_before_retrieval() {
        let llm = Arc::new(MockLlm::fixed("answer"));
        let index = build(IndexKind::List, llm.clone()).await;
        let evaluation = Evaluation::new(crate::Response::new("Gandalf"), Some("wrong character".to_string()));
        let transform = FeedbackQueryTransformation::new(evaluation).with_llm_predictor(llm.clone());

        index
            .as_query_engine(QueryMode::Default)
            .unwrap()
            .with_query_transform(Arc::new(transform))
            .query("Who is taken?")
            .await
            .unwrap();

        let prompt = &llm.calls()[0];
        assert!(prompt.contains("Here is the previous answer.\nGandalf"));
        assert!(prompt.contains("wrong character"));
        assert!(prompt.contains("Now answer the question.\nWho is taken?"));
    }
}
