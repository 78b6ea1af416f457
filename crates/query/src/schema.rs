use serde::{Deserialize, Serialize};
use std::fmt;

use index::{NodeWithScore, TokenUsage};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Generated answer; `None` when nothing was synthesized
    pub response: Option<String>,
    pub source_nodes: Vec<NodeWithScore>,
    pub usage: TokenUsage,
}

impl Response {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: Some(response.into()),
            ..Default::default()
        }
    }

    /// Source texts joined for display or evaluation
    pub fn source_text(&self) -> String {
        self.source_nodes
            .iter()
            .map(|n| n.node.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.response.as_deref().unwrap_or("None"))
    }
}

/// A prior response and the evaluator's feedback on it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub response: Response,
    pub feedback: Option<String>,
}

impl Evaluation {
    pub fn new(response: Response, feedback: Option<String>) -> Self {
        Self { response, feedback }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Response::new("Paris").to_string(), "Paris");
        assert_eq!(Response::default().to_string(), "None");
    }
}
