use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use index::QueryBundle;
use llm::{LlmPredictor, OllamaPredictor, Prompt};

use crate::schema::Evaluation;
use crate::transform::QueryTransform;

pub const DEFAULT_RESYNTHESIS_PROMPT_TMPL: &str = "Here is the original query:\n\
{query_str}\n\
Here is the response given:\n\
{response}\n\
Here is some feedback from evaluator about the response given.\n\
{feedback}\n\
If you want to resynthesize the query, please return the modified query below.\n\
Otherwise, please return the original query.\n";

const PREVIOUS_ANSWER_HEADER: &str = "Here is the previous answer.\n";
const FEEDBACK_HEADER: &str = "Here is some feedback from the evaluator about the response given.\n";
const ANSWER_INSTRUCTION: &str = "Now answer the question.\n";

/// Folds an evaluation of a previous answer into the next query.
///
/// The new query carries the previous answer, the evaluator's feedback and
/// then the query itself, optionally rewritten by the LLM in light of the
/// feedback first.
pub struct FeedbackQueryTransformation {
    evaluation: Evaluation,
    llm_predictor: Arc<dyn LlmPredictor>,
    resynthesize_query: bool,
    resynthesis_prompt: Prompt,
}

impl FeedbackQueryTransformation {
    pub fn new(evaluation: Evaluation) -> Self {
        Self {
            evaluation,
            llm_predictor: Arc::new(OllamaPredictor::default()),
            resynthesize_query: false,
            resynthesis_prompt: Prompt::new(DEFAULT_RESYNTHESIS_PROMPT_TMPL),
        }
    }

    pub fn with_llm_predictor(mut self, llm_predictor: Arc<dyn LlmPredictor>) -> Self {
        self.llm_predictor = llm_predictor;
        self
    }

    pub fn with_resynthesize_query(mut self, resynthesize_query: bool) -> Self {
        self.resynthesize_query = resynthesize_query;
        self
    }

    pub fn with_resynthesis_prompt(mut self, resynthesis_prompt: Prompt) -> Self {
        self.resynthesis_prompt = resynthesis_prompt;
        self
    }

    pub fn evaluation(&self) -> &Evaluation {
        &self.evaluation
    }

    /// Previous answer framed for the new query, empty when there was none
    pub fn construct_feedback(response: Option<&str>) -> String {
        match response {
            Some(response) => format!("{PREVIOUS_ANSWER_HEADER}{response}"),
            None => String::new(),
        }
    }

    /// Ask the LLM to rewrite the query given the feedback; no feedback, no rewrite
    pub async fn resynthesize_query(&self, query_str: &str) -> Result<String> {
        let Some(feedback) = self.evaluation.feedback.as_deref() else {
            return Ok(query_str.to_string());
        };
        // A missing answer renders as "None", the same as `Response`'s Display
        let response = self.evaluation.response.to_string();

        let (new_query, _) = self
            .llm_predictor
            .predict(
                &self.resynthesis_prompt,
                &[
                    ("query_str", query_str),
                    ("response", response.as_str()),
                    ("feedback", feedback),
                ],
            )
            .await?;

        tracing::debug!(original = query_str, resynthesized = %new_query, "Resynthesized query");
        Ok(new_query)
    }
}

#[async_trait]
impl QueryTransform for FeedbackQueryTransformation {
    async fn transform(&self, query_bundle: QueryBundle) -> Result<QueryBundle> {
        let query_str = if self.resynthesize_query {
            self.resynthesize_query(&query_bundle.query_str).await?
        } else {
            query_bundle.query_str
        };

        let mut new_query = Self::construct_feedback(self.evaluation.response.response.as_deref());
        if !new_query.is_empty() {
            new_query.push('\n');
        }
        if let Some(feedback) = &self.evaluation.feedback {
            new_query.push_str(FEEDBACK_HEADER);
            new_query.push_str(feedback);
            new_query.push('\n');
        }
        new_query.push_str(ANSWER_INSTRUCTION);
        new_query.push_str(&query_str);

        Ok(QueryBundle::new(new_query))
    }
}
