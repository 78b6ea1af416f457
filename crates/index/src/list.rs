use anyhow::{Context, Result};

use ingest::{Node, estimate_tokens};
use llm::ServiceContext;

use crate::schema::{NodeWithScore, QueryBundle, Retrieval};
use crate::vector_store::{embed_query_bundle, top_k_by_similarity};

/// Nodes kept in document order; no work at build time
pub struct ListIndex {
    nodes: Vec<Node>,
    similarity_top_k: usize,
    service_context: ServiceContext,
}

impl ListIndex {
    pub fn build(nodes: Vec<Node>, service_context: ServiceContext) -> Self {
        tracing::info!(nodes = nodes.len(), "Built list index");

        Self {
            nodes,
            similarity_top_k: 1,
            service_context,
        }
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

    pub fn retrieve_all(&self) -> Retrieval {
        Retrieval {
            nodes: self.nodes.iter().cloned().map(NodeWithScore::unscored).collect(),
            usage: Default::default(),
        }
    }

    /// Nodes are embedded on every call since the list keeps no vectors
    pub async fn retrieve_by_embedding(&self, query: &QueryBundle) -> Result<Retrieval> {
        let (query_embedding, mut usage) = embed_query_bundle(&self.service_context, query).await?;

        let mut embeddings = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let embedding = self
                .service_context
                .embed_model
                .embed_text(&node.text)
                .await
                .with_context(|| format!("Failed to embed node {}", node.node_id))?;
            usage.embedding_tokens += estimate_tokens(&node.text);
            embeddings.push(embedding);
        }

        let nodes = top_k_by_similarity(
            &query_embedding,
            self.nodes.iter().zip(&embeddings),
            self.similarity_top_k,
        );

        Ok(Retrieval { nodes, usage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest::ChunkerConfig;
    use llm::mock::{MockEmbedding, MockLlm};
    use std::sync::Arc;

    fn index(embed: MockEmbedding) -> ListIndex {
        let ctx = ServiceContext::new(Arc::new(MockLlm::new()), Arc::new(embed), ChunkerConfig::default());
        let nodes = ["first", "second", "third"]
            .iter()
            .map(|t| Node::new("doc".to_string(), t.to_string(), (0, t.len())))
            .collect();
        ListIndex::build(nodes, ctx)
    }

    #[test]
    fn test_retrieve_all_keeps_order() {
        let retrieval = index(MockEmbedding::new(5)).retrieve_all();
        let texts: Vec<&str> = retrieval.nodes.iter().map(|n| n.node.text.as_str()).collect();

        assert_eq!(texts, vec!["first", "second", "third"]);
        assert!(retrieval.nodes.iter().all(|n| n.score.is_none()));
    }

    #[tokio::test]
    async fn test_retrieve_by_embedding() {
        let embed = MockEmbedding::new(3)
            .with_vector("first", vec![1.0, 0.0, 0.0])
            .with_vector("second", vec![0.0, 1.0, 0.0])
            .with_vector("third", vec![0.0, 0.0, 1.0])
            .with_query_vector(vec![0.0, 1.0, 0.1]);

        let retrieval = index(embed)
            .with_similarity_top_k(2)
            .retrieve_by_embedding(&QueryBundle::new("q"))
            .await
            .unwrap();

        let texts: Vec<&str> = retrieval.nodes.iter().map(|n| n.node.text.as_str()).collect();
        assert_eq!(texts, vec!["second", "third"]);
    }
}
