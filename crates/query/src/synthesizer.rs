use anyhow::{Context, Result};
use std::sync::Arc;

use index::{NodeWithScore, QueryBundle, TokenUsage};
use ingest::estimate_tokens;
use llm::{LlmPredictor, Prompt, prompt};

/// Budget for packing several chunks into one prompt
pub const DEFAULT_MAX_CHUNK_TOKENS: usize = 2048;
const SUMMARIZE_FAN_IN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Answer from the first packed chunk, refine with each following one
    CompactRefine,
    /// Answer every group of chunks, then answer over the answers until one remains
    TreeSummarize,
}

pub struct ResponseSynthesizer {
    llm_predictor: Arc<dyn LlmPredictor>,
    text_qa_prompt: Prompt,
    refine_prompt: Prompt,
    mode: ResponseMode,
    max_chunk_tokens: usize,
}

impl ResponseSynthesizer {
    pub fn new(llm_predictor: Arc<dyn LlmPredictor>, mode: ResponseMode) -> Self {
        Self {
            llm_predictor,
            text_qa_prompt: prompt::text_qa_prompt(),
            refine_prompt: prompt::refine_prompt(),
            mode,
            max_chunk_tokens: DEFAULT_MAX_CHUNK_TOKENS,
        }
    }

    pub fn mode(&self) -> ResponseMode {
        self.mode
    }

    /// Answer `query` from `nodes`, carrying the nodes as sources.
    /// With no nodes nothing is generated and the answer is `None`.
    pub async fn synthesize(
        &self,
        query: &QueryBundle,
        nodes: Vec<NodeWithScore>,
        mut usage: TokenUsage,
    ) -> Result<crate::Response> {
        let texts: Vec<String> = nodes.iter().map(|n| n.node.text.clone()).collect();

        let answer = if texts.is_empty() {
            None
        } else {
            let (answer, llm_tokens) = match self.mode {
                ResponseMode::CompactRefine => self.compact_refine(&query.query_str, &texts).await?,
                ResponseMode::TreeSummarize => self.tree_summarize(&query.query_str, texts).await?,
            };
            usage.llm_tokens += llm_tokens;
            Some(answer.trim().to_string())
        };

        Ok(crate::Response {
            response: answer,
            source_nodes: nodes,
            usage,
        })
    }

    async fn answer(&self, query_str: &str, context_str: &str) -> Result<(String, usize)> {
        let (text, metadata) = self
            .llm_predictor
            .predict(
                &self.text_qa_prompt,
                &[("context_str", context_str), ("query_str", query_str)],
            )
            .await
            .context("Failed to answer from context")?;
        Ok((text, metadata.total_tokens()))
    }

    async fn compact_refine(&self, query_str: &str, texts: &[String]) -> Result<(String, usize)> {
        let packed = pack_chunks(texts, self.max_chunk_tokens);
        let mut chunks = packed.iter();

        // pack_chunks never returns an empty list for non-empty input
        let first = chunks.next().map(String::as_str).unwrap_or_default();
        let (mut answer, mut tokens) = self.answer(query_str, first).await?;

        for chunk in chunks {
            let (refined, metadata) = self
                .llm_predictor
                .predict(
                    &self.refine_prompt,
                    &[
                        ("query_str", query_str),
                        ("existing_answer", answer.as_str()),
                        ("context_msg", chunk.as_str()),
                    ],
                )
                .await
                .context("Failed to refine answer")?;
            tokens += metadata.total_tokens();
            answer = refined;
        }

        Ok((answer, tokens))
    }

    async fn tree_summarize(&self, query_str: &str, mut texts: Vec<String>) -> Result<(String, usize)> {
        let mut tokens = 0;

        loop {
            let mut answers = Vec::new();
            for group in texts.chunks(SUMMARIZE_FAN_IN) {
                let (answer, used) = self.answer(query_str, &group.join("\n\n")).await?;
                tokens += used;
                answers.push(answer);
            }

            if answers.len() == 1 {
                return Ok((answers.remove(0), tokens));
            }
            texts = answers;
        }
    }
}

/// Greedily join consecutive chunks while they fit in `max_tokens`
fn pack_chunks(texts: &[String], max_tokens: usize) -> Vec<String> {
    let mut packed: Vec<String> = Vec::new();
    let mut current = String::new();

    for text in texts {
        if !current.is_empty() && estimate_tokens(&current) + estimate_tokens(text) > max_tokens {
            packed.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(text);
    }

    if !current.is_empty() || packed.is_empty() {
        packed.push(current);
    }
    packed
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest::Node;
    use llm::mock::MockLlm;

    fn scored(texts: &[&str]) -> Vec<NodeWithScore> {
        texts
            .iter()
            .map(|t| NodeWithScore::unscored(Node::synthetic(t.to_string())))
            .collect()
    }

    #[test]
    fn test_pack_chunks() {
        let texts: Vec<String> = ["one two", "three four", "five"].iter().map(|s| s.to_string()).collect();

        assert_eq!(pack_chunks(&texts, 100), vec!["one two\n\nthree four\n\nfive"]);
        assert_eq!(pack_chunks(&texts, 3), vec!["one two", "three four", "five"]);
    }

    #[tokio::test]
    async fn test_no_nodes_gives_empty_response() {
        let llm = Arc::new(MockLlm::new());
        let synthesizer = ResponseSynthesizer::new(llm.clone(), ResponseMode::CompactRefine);

        let response = synthesizer
            .synthesize(&QueryBundle::new("q"), Vec::new(), TokenUsage::default())
            .await
            .unwrap();

        assert!(response.response.is_none());
        assert!(llm.calls().is_empty());
    }

    #[tokio::test]
    async fn test_refine_calls_once_per_packed_chunk() {
        let llm = Arc::new(MockLlm::fixed("answer"));
        let mut synthesizer = ResponseSynthesizer::new(llm.clone(), ResponseMode::CompactRefine);
        synthesizer.max_chunk_tokens = 3;

        let response = synthesizer
            .synthesize(&QueryBundle::new("q"), scored(&["one two", "three four"]), TokenUsage::default())
            .await
            .unwrap();

        let calls = llm.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("Context information is below."));
        assert!(calls[1].contains("We have provided an existing answer: answer"));
        assert_eq!(response.response.as_deref(), Some("answer"));
        assert_eq!(response.source_nodes.len(), 2);
        assert!(response.usage.llm_tokens > 0);
    }

    #[tokio::test]
    async fn test_tree_summarize_reduces_to_one_answer() {
        let llm = Arc::new(MockLlm::fixed("combined"));
        let synthesizer = ResponseSynthesizer::new(llm.clone(), ResponseMode::TreeSummarize);
        let texts: Vec<String> = (0..11).map(|i| format!("chunk {i}")).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();

        let response = synthesizer
            .synthesize(&QueryBundle::new("q"), scored(&refs), TokenUsage::default())
            .await
            .unwrap();

        // 11 chunks -> 2 group answers -> 1 final answer
        assert_eq!(llm.calls().len(), 3);
        assert_eq!(response.response.as_deref(), Some("combined"));
    }
}
