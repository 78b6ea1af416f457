pub mod list;
pub mod mode;
pub mod schema;
pub mod tree;
pub mod vector_store;

pub use list::ListIndex;
pub use mode::QueryMode;
pub use schema::{NodeWithScore, QueryBundle, Retrieval, TokenUsage};
pub use tree::TreeIndex;
pub use vector_store::VectorStoreIndex;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use ingest::Document;
use llm::ServiceContext;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum IndexError {
    #[error("Unknown query mode: {0}")]
    UnknownMode(String),

    #[error("Unknown index kind: {0}")]
    UnknownKind(String),

    #[error("{kind} does not support the {mode} mode")]
    UnsupportedMode { kind: IndexKind, mode: QueryMode },
}

/// The closed set of index variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    VectorStore,
    List,
    Tree,
}

impl IndexKind {
    pub const ALL: [IndexKind; 3] = [IndexKind::VectorStore, IndexKind::List, IndexKind::Tree];

    pub fn name(&self) -> &'static str {
        match self {
            IndexKind::VectorStore => "VectorStoreIndex",
            IndexKind::List => "ListIndex",
            IndexKind::Tree => "TreeIndex",
        }
    }

    pub fn supported_modes(&self) -> &'static [QueryMode] {
        match self {
            IndexKind::VectorStore => &[QueryMode::Default],
            IndexKind::List => &[QueryMode::Default, QueryMode::Embedding],
            IndexKind::Tree => &[
                QueryMode::Default,
                QueryMode::Summarize,
                QueryMode::Embedding,
                QueryMode::Retrieve,
            ],
        }
    }

    pub fn supports(&self, mode: QueryMode) -> bool {
        self.supported_modes().contains(&mode)
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IndexKind {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vector" | "vector_store" | "VectorStoreIndex" => Ok(IndexKind::VectorStore),
            "list" | "ListIndex" => Ok(IndexKind::List),
            "tree" | "TreeIndex" => Ok(IndexKind::Tree),
            other => Err(IndexError::UnknownKind(other.to_string())),
        }
    }
}

/// A built index of one of the supported kinds
pub enum Index {
    VectorStore(VectorStoreIndex),
    List(ListIndex),
    Tree(TreeIndex),
}

impl Index {
    /// Chunk `documents` with the context's chunker and build a `kind` index over them
    pub async fn from_documents(
        kind: IndexKind,
        documents: &[Document],
        service_context: &ServiceContext,
    ) -> Result<Self> {
        let nodes = service_context.chunker.chunk_documents(documents);
        let service_context = service_context.clone();

        let index = match kind {
            IndexKind::VectorStore => {
                Index::VectorStore(VectorStoreIndex::build(nodes, service_context).await?)
            }
            IndexKind::List => Index::List(ListIndex::build(nodes, service_context)),
            IndexKind::Tree => Index::Tree(
                TreeIndex::build(nodes, tree::DEFAULT_NUM_CHILDREN, service_context).await?,
            ),
        };

        Ok(index)
    }

    pub fn kind(&self) -> IndexKind {
        match self {
            Index::VectorStore(_) => IndexKind::VectorStore,
            Index::List(_) => IndexKind::List,
            Index::Tree(_) => IndexKind::Tree,
        }
    }

    pub fn service_context(&self) -> &ServiceContext {
        match self {
            Index::VectorStore(index) => index.service_context(),
            Index::List(index) => index.service_context(),
            Index::Tree(index) => index.service_context(),
        }
    }

    pub async fn retrieve(&self, query: &QueryBundle, mode: QueryMode) -> Result<Retrieval> {
        let retrieval = match (self, mode) {
            (Index::VectorStore(index), QueryMode::Default) => index.retrieve(query).await?,
            (Index::List(index), QueryMode::Default) => index.retrieve_all(),
            (Index::List(index), QueryMode::Embedding) => index.retrieve_by_embedding(query).await?,
            (Index::Tree(index), QueryMode::Default) => index.retrieve_by_selection(query).await?,
            (Index::Tree(index), QueryMode::Embedding) => index.retrieve_by_embedding(query).await?,
            (Index::Tree(index), QueryMode::Retrieve) => index.retrieve_roots(),
            (Index::Tree(index), QueryMode::Summarize) => index.retrieve_leaves(),
            _ => {
                return Err(IndexError::UnsupportedMode {
                    kind: self.kind(),
                    mode,
                }
                .into());
            }
        };

        tracing::debug!(
            index = %self.kind(),
            %mode,
            nodes = retrieval.nodes.len(),
            "Retrieved nodes"
        );
        Ok(retrieval)
    }
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Index").field(&self.kind()).finish()
    }
}
