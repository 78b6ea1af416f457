use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;

use ingest::{Node, estimate_tokens};
use llm::{ServiceContext, cosine_similarity, prompt};

use crate::schema::{NodeWithScore, QueryBundle, Retrieval, TokenUsage};
use crate::vector_store::embed_query_bundle;

pub const DEFAULT_NUM_CHILDREN: usize = 10;

static ANSWER_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

#[derive(Debug, Clone)]
struct TreeNode {
    node: Node,
    children: Vec<usize>,
}

/// Leaves are the document nodes; every parent is an LLM summary of up to
/// `num_children` children. Nodes live in one arena, addressed by position.
pub struct TreeIndex {
    arena: Vec<TreeNode>,
    leaves: Vec<usize>,
    roots: Vec<usize>,
    service_context: ServiceContext,
}

impl TreeIndex {
    pub async fn build(
        nodes: Vec<Node>,
        num_children: usize,
        service_context: ServiceContext,
    ) -> Result<Self> {
        let num_children = num_children.max(2);
        let summary_prompt = prompt::summary_prompt();

        let mut arena: Vec<TreeNode> = nodes
            .into_iter()
            .map(|node| TreeNode { node, children: Vec::new() })
            .collect();
        let leaves: Vec<usize> = (0..arena.len()).collect();

        let mut level = leaves.clone();
        let mut llm_tokens = 0;
        let mut depth = 0;

        while level.len() > num_children {
            let mut next_level = Vec::new();

            for group in level.chunks(num_children) {
                let context_str = group
                    .iter()
                    .map(|&id| arena[id].node.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n");

                let (summary, metadata) = service_context
                    .llm_predictor
                    .predict(&summary_prompt, &[("context_str", context_str.as_str())])
                    .await
                    .context("Failed to summarize tree level")?;
                llm_tokens += metadata.total_tokens();

                arena.push(TreeNode {
                    node: Node::synthetic(summary.trim().to_string()),
                    children: group.to_vec(),
                });
                next_level.push(arena.len() - 1);
            }

            level = next_level;
            depth += 1;
        }

        tracing::info!(
            leaves = leaves.len(),
            roots = level.len(),
            depth,
            llm_tokens,
            "Built tree index"
        );

        Ok(Self {
            arena,
            leaves,
            roots: level,
            service_context,
        })
    }

    pub fn service_context(&self) -> &ServiceContext {
        &self.service_context
    }

    pub fn root_nodes(&self) -> Vec<&Node> {
        self.roots.iter().map(|&id| &self.arena[id].node).collect()
    }

    pub fn leaf_nodes(&self) -> Vec<&Node> {
        self.leaves.iter().map(|&id| &self.arena[id].node).collect()
    }

    pub fn retrieve_roots(&self) -> Retrieval {
        self.collect(&self.roots)
    }

    pub fn retrieve_leaves(&self) -> Retrieval {
        self.collect(&self.leaves)
    }

    fn collect(&self, ids: &[usize]) -> Retrieval {
        Retrieval {
            nodes: ids
                .iter()
                .map(|&id| NodeWithScore::unscored(self.arena[id].node.clone()))
                .collect(),
            usage: TokenUsage::default(),
        }
    }

    /// Walk from the roots, letting the LLM pick one child per level
    pub async fn retrieve_by_selection(&self, query: &QueryBundle) -> Result<Retrieval> {
        let select_prompt = prompt::tree_select_prompt();
        let mut usage = TokenUsage::default();
        let mut candidates = self.roots.clone();

        loop {
            if candidates.is_empty() {
                return Ok(Retrieval { nodes: Vec::new(), usage });
            }

            let chosen = if candidates.len() == 1 {
                candidates[0]
            } else {
                let context_list = candidates
                    .iter()
                    .enumerate()
                    .map(|(i, &id)| format!("({}) {}", i + 1, self.arena[id].node.text))
                    .collect::<Vec<_>>()
                    .join("\n\n");
                let num_chunks = candidates.len().to_string();

                let (answer, metadata) = self
                    .service_context
                    .llm_predictor
                    .predict(
                        &select_prompt,
                        &[
                            ("num_chunks", num_chunks.as_str()),
                            ("context_list", context_list.as_str()),
                            ("query_str", query.query_str.as_str()),
                        ],
                    )
                    .await
                    .context("Failed to select tree child")?;
                usage.llm_tokens += metadata.total_tokens();

                candidates[parse_choice(&answer, candidates.len())]
            };

            let children = &self.arena[chosen].children;
            if children.is_empty() {
                return Ok(Retrieval {
                    nodes: vec![NodeWithScore::unscored(self.arena[chosen].node.clone())],
                    usage,
                });
            }
            candidates = children.clone();
        }
    }

    /// Walk from the roots, picking the child most similar to the query
    pub async fn retrieve_by_embedding(&self, query: &QueryBundle) -> Result<Retrieval> {
        let (query_embedding, mut usage) = embed_query_bundle(&self.service_context, query).await?;
        let mut candidates = self.roots.clone();

        loop {
            let mut best: Option<(usize, f32)> = None;

            for &id in &candidates {
                let text = &self.arena[id].node.text;
                let embedding = self
                    .service_context
                    .embed_model
                    .embed_text(text)
                    .await
                    .context("Failed to embed tree node")?;
                usage.embedding_tokens += estimate_tokens(text);

                let score = cosine_similarity(&query_embedding, &embedding);
                if best.is_none_or(|(_, top)| score > top) {
                    best = Some((id, score));
                }
            }

            let Some((chosen, score)) = best else {
                return Ok(Retrieval { nodes: Vec::new(), usage });
            };

            let children = &self.arena[chosen].children;
            if children.is_empty() {
                return Ok(Retrieval {
                    nodes: vec![NodeWithScore {
                        node: self.arena[chosen].node.clone(),
                        score: Some(score),
                    }],
                    usage,
                });
            }
            candidates = children.clone();
        }
    }
}

/// Zero-based index of the first number in `answer`; falls back to the first choice
fn parse_choice(answer: &str, num_choices: usize) -> usize {
    let choice = ANSWER_NUMBER
        .find(answer)
        .and_then(|m| m.as_str().parse::<usize>().ok())
        .filter(|n| (1..=num_choices).contains(n));

    match choice {
        Some(n) => n - 1,
        None => {
            tracing::warn!(answer, num_choices, "Could not parse tree selection, using first child");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest::ChunkerConfig;
    use llm::mock::{MockEmbedding, MockLlm};
    use std::sync::Arc;

    fn nodes(texts: &[&str]) -> Vec<Node> {
        texts
            .iter()
            .map(|t| Node::new("doc".to_string(), t.to_string(), (0, t.len())))
            .collect()
    }

    fn summarizing_llm() -> MockLlm {
        MockLlm::with_handler(|prompt| {
            if prompt.contains("'ANSWER: <number>'") {
                return Ok("ANSWER: 2".to_string());
            }
            // Summary of a group: its members joined by '+'
            let body = prompt
                .split("\n\n\n")
                .nth(1)
                .unwrap_or_default()
                .replace("\n\n", "+");
            Ok(body)
        })
    }

    fn context(llm: MockLlm, embed: MockEmbedding) -> ServiceContext {
        ServiceContext::new(Arc::new(llm), Arc::new(embed), ChunkerConfig::default())
    }

    #[tokio::test]
    async fn test_small_corpus_roots_are_leaves() {
        let llm = Arc::new(MockLlm::new());
        let ctx = ServiceContext::new(llm.clone(), Arc::new(MockEmbedding::new(5)), ChunkerConfig::default());
        let tree = TreeIndex::build(nodes(&["a", "b"]), DEFAULT_NUM_CHILDREN, ctx).await.unwrap();

        assert_eq!(tree.root_nodes().len(), 2);
        assert_eq!(tree.leaf_nodes().len(), 2);
        assert!(llm.calls().is_empty());
    }

    #[tokio::test]
    async fn test_builds_summary_levels() {
        let ctx = context(summarizing_llm(), MockEmbedding::new(5));
        let tree = TreeIndex::build(nodes(&["a", "b", "c", "d", "e"]), 2, ctx).await.unwrap();

        let roots: Vec<&str> = tree.root_nodes().iter().map(|n| n.text.as_str()).collect();
        assert_eq!(roots, vec!["a+b+c+d", "e"]);
        assert_eq!(tree.retrieve_leaves().nodes.len(), 5);
        assert_eq!(tree.retrieve_roots().nodes.len(), 2);
    }

    #[tokio::test]
    async fn test_selection_walks_to_a_leaf() {
        let ctx = context(summarizing_llm(), MockEmbedding::new(5));
        let tree = TreeIndex::build(nodes(&["a", "b", "c", "d", "e"]), 2, ctx).await.unwrap();

        // Roots: ["a+b+c+d", "e"]; the mock always answers choice 2
        let retrieval = tree.retrieve_by_selection(&QueryBundle::new("q")).await.unwrap();
        assert_eq!(retrieval.nodes.len(), 1);
        assert_eq!(retrieval.nodes[0].node.text, "e");
        assert!(retrieval.usage.llm_tokens > 0);
    }

    #[tokio::test]
    async fn test_embedding_walk_follows_similarity() {
        let embed = MockEmbedding::new(2)
            .with_vector("x", vec![1.0, 0.0])
            .with_vector("y", vec![0.0, 1.0])
            .with_query_vector(vec![0.0, 1.0]);
        let ctx = context(MockLlm::new(), embed);
        let tree = TreeIndex::build(nodes(&["x", "y"]), DEFAULT_NUM_CHILDREN, ctx).await.unwrap();

        let retrieval = tree.retrieve_by_embedding(&QueryBundle::new("q")).await.unwrap();
        assert_eq!(retrieval.nodes[0].node.text, "y");
        assert_eq!(retrieval.nodes[0].score, Some(1.0));
    }

    #[test]
    fn test_parse_choice() {
        assert_eq!(parse_choice("ANSWER: 3 because...", 4), 2);
        assert_eq!(parse_choice("ANSWER: 9", 4), 0);
        assert_eq!(parse_choice("no idea", 4), 0);
    }
}
