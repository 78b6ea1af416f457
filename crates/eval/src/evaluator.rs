use anyhow::{Context, Result};
use std::sync::Arc;

use index::{Index, QueryMode};
use llm::{LlmPredictor, Prompt};
use query::{AsQueryEngine, Evaluation, FeedbackQueryTransformation, Response};

pub const DEFAULT_EVAL_PROMPT_TMPL: &str = "Your task is to evaluate if the response for the query \
is in line with the context information provided.\n\
Answer YES if the response for the query is in line with the context information. \
Otherwise answer NO, followed by a short explanation of what is wrong or missing.\n\
Query: {query_str}\n\
Response: {response}\n\
Context:\n\
{context_str}\n\
Answer: ";

const NO_RESPONSE_FEEDBACK: &str = "No response was generated.";

/// Judges a response against its own sources with the LLM
pub struct ResponseEvaluator {
    llm_predictor: Arc<dyn LlmPredictor>,
    eval_prompt: Prompt,
}

impl ResponseEvaluator {
    pub fn new(llm_predictor: Arc<dyn LlmPredictor>) -> Self {
        Self {
            llm_predictor,
            eval_prompt: Prompt::new(DEFAULT_EVAL_PROMPT_TMPL),
        }
    }

    pub fn with_eval_prompt(mut self, eval_prompt: Prompt) -> Self {
        self.eval_prompt = eval_prompt;
        self
    }

    /// A passing verdict carries no feedback; anything else carries the LLM's reply
    pub async fn evaluate(&self, query: &str, response: &Response) -> Result<Evaluation> {
        let Some(answer) = response.response.as_deref() else {
            return Ok(Evaluation::new(response.clone(), Some(NO_RESPONSE_FEEDBACK.to_string())));
        };

        let context_str = response.source_text();
        let (verdict, _) = self
            .llm_predictor
            .predict(
                &self.eval_prompt,
                &[
                    ("query_str", query),
                    ("response", answer),
                    ("context_str", context_str.as_str()),
                ],
            )
            .await
            .context("Failed to evaluate response")?;

        let verdict = verdict.trim();
        let feedback = if verdict.to_ascii_lowercase().starts_with("yes") {
            None
        } else {
            Some(verdict.to_string())
        };

        tracing::debug!(query, passing = feedback.is_none(), "Evaluated response");
        Ok(Evaluation::new(response.clone(), feedback))
    }

    pub fn passing(evaluation: &Evaluation) -> bool {
        evaluation.feedback.is_none()
    }
}

/// Query, evaluate, and re-ask with the feedback folded into the query until the
/// evaluator passes the answer or `max_rounds` re-asks are spent.
pub async fn answer_with_feedback(
    index: &Index,
    mode: QueryMode,
    evaluator: &ResponseEvaluator,
    query: &str,
    max_rounds: usize,
) -> Result<(Response, Vec<Evaluation>)> {
    let mut response = index.as_query_engine(mode)?.query(query).await?;
    let mut evaluations = Vec::new();

    for round in 0..=max_rounds {
        let evaluation = evaluator.evaluate(query, &response).await?;
        let passing = ResponseEvaluator::passing(&evaluation);
        evaluations.push(evaluation.clone());

        if passing || round == max_rounds {
            break;
        }

        tracing::info!(round = round + 1, "Re-asking with evaluator feedback");
        let transform = FeedbackQueryTransformation::new(evaluation)
            .with_llm_predictor(index.service_context().llm_predictor.clone());
        response = index
            .as_query_engine(mode)?
            .with_query_transform(Arc::new(transform))
            .query(query)
            .await?;
    }

    Ok((response, evaluations))
}

#[cfg(test)]
mod tests {
    use super::*;
    use index::IndexKind;
    use ingest::{ChunkerConfig, Document};
    use llm::ServiceContext;
    use llm::mock::{MockEmbedding, MockLlm};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_yes_means_no_feedback() {
        let evaluator = ResponseEvaluator::new(Arc::new(MockLlm::fixed("  YES, it is supported.")));
        let evaluation = evaluator.evaluate("Capital?", &Response::new("Paris")).await.unwrap();

        assert!(evaluation.feedback.is_none());
        assert!(ResponseEvaluator::passing(&evaluation));
        assert_eq!(evaluation.response.response.as_deref(), Some("Paris"));
    }

    #[tokio::test]
    async fn test_no_carries_reply_as_feedback() {
        let llm = Arc::new(MockLlm::fixed("NO, too short"));
        let evaluator = ResponseEvaluator::new(llm.clone());
        let evaluation = evaluator.evaluate("Capital?", &Response::new("Paris")).await.unwrap();

        assert_eq!(evaluation.feedback.as_deref(), Some("NO, too short"));
        assert!(llm.calls()[0].contains("Query: Capital?\nResponse: Paris\n"));
    }

    #[tokio::test]
    async fn test_missing_response_fails_without_llm_call() {
        let llm = Arc::new(MockLlm::fixed("YES"));
        let evaluator = ResponseEvaluator::new(llm.clone());
        let evaluation = evaluator.evaluate("Capital?", &Response::default()).await.unwrap();

        assert_eq!(evaluation.feedback.as_deref(), Some(NO_RESPONSE_FEEDBACK));
        assert!(llm.calls().is_empty());
    }

    #[tokio::test]
    async fn test_answer_with_feedback_stops_when_passing() {
        // First verdict fails, second passes
        let verdicts = Arc::new(AtomicUsize::new(0));
        let counter = verdicts.clone();
        let llm = Arc::new(MockLlm::with_handler(move |prompt| {
            if prompt.starts_with("Your task is to evaluate") {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                return Ok(if n == 0 { "NO, name the city" } else { "YES" }.to_string());
            }
            Ok("Isengard".to_string())
        }));

        let ctx = ServiceContext::new(llm.clone(), Arc::new(MockEmbedding::new(5)), ChunkerConfig::default());
        let documents = vec![Document::new("They're taking the Hobbits to Isengard!")];
        let index = Index::from_documents(IndexKind::List, &documents, &ctx).await.unwrap();
        let evaluator = ResponseEvaluator::new(llm.clone());

        let (response, evaluations) =
            answer_with_feedback(&index, QueryMode::Default, &evaluator, "Where to?", 3).await.unwrap();

        assert_eq!(response.response.as_deref(), Some("Isengard"));
        assert_eq!(evaluations.len(), 2);
        assert_eq!(evaluations[0].feedback.as_deref(), Some("NO, name the city"));
        assert!(evaluations[1].feedback.is_none());
        assert!(llm.calls().iter().any(|p| p.contains("Now answer the question.\nWhere to?")));
    }
}
