use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::IndexError;

/// Registry of query modes an index may be asked to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    Default,   // Index's own retrieval (all nodes, top-k, LLM tree walk)
    Summarize, // Every leaf, combined bottom-up
    Embedding, // Similarity driven retrieval
    Retrieve,  // Tree roots used directly as context
    Recursive, // Composed graphs only
}

impl QueryMode {
    pub const ALL: [QueryMode; 5] = [
        QueryMode::Default,
        QueryMode::Summarize,
        QueryMode::Embedding,
        QueryMode::Retrieve,
        QueryMode::Recursive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryMode::Default => "default",
            QueryMode::Summarize => "summarize",
            QueryMode::Embedding => "embedding",
            QueryMode::Retrieve => "retrieve",
            QueryMode::Recursive => "recursive",
        }
    }
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryMode {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QueryMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| IndexError::UnknownMode(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips_registry() {
        for mode in QueryMode::ALL {
            assert_eq!(mode.as_str().parse::<QueryMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_unknown_mode() {
        let err = "fastest".parse::<QueryMode>().unwrap_err();
        assert!(matches!(err, IndexError::UnknownMode(name) if name == "fastest"));
        assert!("Default".parse::<QueryMode>().is_err());
    }
}
