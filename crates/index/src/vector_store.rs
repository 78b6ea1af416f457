use anyhow::{Context, Result};

use ingest::{Node, estimate_tokens};
use llm::{ServiceContext, cosine_similarity};

use crate::schema::{NodeWithScore, QueryBundle, Retrieval, TokenUsage};

pub const DEFAULT_SIMILARITY_TOP_K: usize = 1;

/// Every node embedded up front; queries take the top-k most similar
pub struct VectorStoreIndex {
    nodes: Vec<Node>,
    embeddings: Vec<Vec<f32>>,
    similarity_top_k: usize,
    service_context: ServiceContext,
}

impl VectorStoreIndex {
    pub async fn build(nodes: Vec<Node>, service_context: ServiceContext) -> Result<Self> {
        let mut embeddings = Vec::with_capacity(nodes.len());
        let mut embedding_tokens = 0;

        for node in &nodes {
            let embedding = service_context
                .embed_model
                .embed_text(&node.text)
                .await
                .with_context(|| format!("Failed to embed node {}", node.node_id))?;
            embedding_tokens += estimate_tokens(&node.text);
            embeddings.push(embedding);
        }

        tracing::info!(nodes = nodes.len(), embedding_tokens, "Built vector store index");

        Ok(Self {
            nodes,
            embeddings,
            similarity_top_k: DEFAULT_SIMILARITY_TOP_K,
            service_context,
        })
    }

    pub fn with_similarity_top_k(mut self, similarity_top_k: usize) -> Self {
        self.similarity_top_k = similarity_top_k.max(1);
        self
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn service_context(&self) -> &ServiceContext {
        &self.service_context
    }

    pub async fn retrieve(&self, query: &QueryBundle) -> Result<Retrieval> {
        let (query_embedding, usage) = embed_query_bundle(&self.service_context, query).await?;

        let nodes = top_k_by_similarity(
            &query_embedding,
            self.nodes.iter().zip(&self.embeddings),
            self.similarity_top_k,
        );

        Ok(Retrieval { nodes, usage })
    }
}

/// Mean embedding of the bundle's embedding strings
pub(crate) async fn embed_query_bundle(
    service_context: &ServiceContext,
    query: &QueryBundle,
) -> Result<(Vec<f32>, TokenUsage)> {
    let mut usage = TokenUsage::default();
    let mut mean: Vec<f32> = Vec::new();
    let strs = query.embedding_strs();

    for text in &strs {
        let embedding = service_context
            .embed_model
            .embed_query(text)
            .await
            .context("Failed to embed query")?;
        usage.embedding_tokens += estimate_tokens(text);

        if mean.is_empty() {
            mean = vec![0.0; embedding.len()];
        }
        for (acc, value) in mean.iter_mut().zip(&embedding) {
            *acc += value;
        }
    }

    let count = strs.len() as f32;
    for value in &mut mean {
        *value /= count;
    }

    Ok((mean, usage))
}

/// Highest-similarity nodes first; ties keep insertion order
pub(crate) fn top_k_by_similarity<'a>(
    query_embedding: &[f32],
    candidates: impl Iterator<Item = (&'a Node, &'a Vec<f32>)>,
    top_k: usize,
) -> Vec<NodeWithScore> {
    let mut scored: Vec<NodeWithScore> = candidates
        .map(|(node, embedding)| NodeWithScore {
            node: node.clone(),
            score: Some(cosine_similarity(query_embedding, embedding)),
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .unwrap_or(0.0)
            .partial_cmp(&a.score.unwrap_or(0.0))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(top_k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest::ChunkerConfig;
    use llm::mock::{MockEmbedding, MockLlm};
    use std::sync::Arc;

    fn context(embed: MockEmbedding) -> ServiceContext {
        ServiceContext::new(Arc::new(MockLlm::new()), Arc::new(embed), ChunkerConfig::default())
    }

    fn node(text: &str) -> Node {
        Node::new("doc".to_string(), text.to_string(), (0, text.len()))
    }

    #[tokio::test]
    async fn test_retrieves_most_similar_node() {
        let embed = MockEmbedding::new(5)
            .with_vector("I can't carry it for you.", vec![0.0, 1.0, 0.0, 0.0, 0.0])
            .with_vector("But I can carry you!", vec![0.0, 0.0, 1.0, 0.0, 0.0])
            .with_query_vector(vec![0.0, 0.0, 1.0, 0.0, 0.0]);

        let index = VectorStoreIndex::build(
            vec![node("I can't carry it for you."), node("But I can carry you!")],
            context(embed),
        )
        .await
        .unwrap();

        let retrieval = index.retrieve(&QueryBundle::new("Who carries?")).await.unwrap();

        assert_eq!(retrieval.nodes.len(), 1);
        assert_eq!(retrieval.nodes[0].node.text, "But I can carry you!");
        assert!(retrieval.usage.embedding_tokens > 0);
        assert_eq!(retrieval.usage.llm_tokens, 0);
    }

    #[tokio::test]
    async fn test_top_k_is_bounded_by_node_count() {
        let index = VectorStoreIndex::build(vec![node("alpha"), node("beta")], context(MockEmbedding::new(5)))
            .await
            .unwrap()
            .with_similarity_top_k(10);

        let retrieval = index.retrieve(&QueryBundle::new("alpha")).await.unwrap();
        assert_eq!(retrieval.nodes.len(), 2);
        assert_eq!(retrieval.nodes[0].node.text, "alpha");
    }

    #[tokio::test]
    async fn test_embedding_failure_fails_build() {
        let result = VectorStoreIndex::build(vec![node("alpha")], context(MockEmbedding::failing())).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_custom_embedding_strs_are_averaged() {
        let embed = MockEmbedding::new(2)
            .with_vector("x", vec![1.0, 0.0])
            .with_vector("y", vec![0.0, 1.0]);
        let ctx = context(embed);

        let bundle = QueryBundle::with_embedding_strs("ignored", vec!["x".into(), "y".into()]);
        let (mean, usage) = embed_query_bundle(&ctx, &bundle).await.unwrap();

        assert_eq!(mean, vec![0.5, 0.5]);
        assert_eq!(usage.embedding_tokens, 4);
    }
}
