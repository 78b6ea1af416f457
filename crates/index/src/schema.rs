use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

use ingest::Node;

/// Query state passed between transforms and into retrieval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryBundle {
    pub query_str: String,
    /// Strings to embed in place of `query_str`
    pub custom_embedding_strs: Option<Vec<String>>,
}

impl QueryBundle {
    pub fn new(query_str: impl Into<String>) -> Self {
        Self {
            query_str: query_str.into(),
            custom_embedding_strs: None,
        }
    }

    pub fn with_embedding_strs(query_str: impl Into<String>, embedding_strs: Vec<String>) -> Self {
        Self {
            query_str: query_str.into(),
            custom_embedding_strs: Some(embedding_strs),
        }
    }

    pub fn embedding_strs(&self) -> Vec<&str> {
        match &self.custom_embedding_strs {
            Some(strs) if !strs.is_empty() => strs.iter().map(String::as_str).collect(),
            _ => vec![self.query_str.as_str()],
        }
    }
}

impl From<&str> for QueryBundle {
    fn from(query_str: &str) -> Self {
        Self::new(query_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeWithScore {
    pub node: Node,
    pub score: Option<f32>,
}

impl NodeWithScore {
    pub fn unscored(node: Node) -> Self {
        Self { node, score: None }
    }
}

/// Tokens spent on LLM and embedding calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub llm_tokens: usize,
    pub embedding_tokens: usize,
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        self.llm_tokens += other.llm_tokens;
        self.embedding_tokens += other.embedding_tokens;
    }
}

#[derive(Debug, Clone, Default)]
pub struct Retrieval {
    pub nodes: Vec<NodeWithScore>,
    pub usage: TokenUsage,
}
