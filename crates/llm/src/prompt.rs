use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// `{name}` placeholders, with `{{` and `}}` as literal braces
static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap()
});

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PromptError {
    #[error("Missing value for prompt variable: {0}")]
    MissingVariable(String),
}

/// Values for a prompt's placeholders, by name
pub type PromptArgs<'a> = [(&'a str, &'a str)];

#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    template: String,
    variables: Vec<String>,
}

impl Prompt {
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        let mut variables: Vec<String> = Vec::new();

        for cap in PLACEHOLDER.captures_iter(&template) {
            if let Some(name) = cap.get(1) {
                if !variables.iter().any(|v| v == name.as_str()) {
                    variables.push(name.as_str().to_string());
                }
            }
        }

        Self { template, variables }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Placeholder names in order of first appearance
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn format(&self, args: &PromptArgs<'_>) -> Result<String, PromptError> {
        let mut rendered = String::with_capacity(self.template.len());
        let mut last = 0;

        for cap in PLACEHOLDER.captures_iter(&self.template) {
            let whole = cap.get(0).unwrap();
            rendered.push_str(&self.template[last..whole.start()]);

            match cap.get(1) {
                Some(name) => {
                    let value = args
                        .iter()
                        .find(|(key, _)| *key == name.as_str())
                        .map(|(_, value)| *value)
                        .ok_or_else(|| PromptError::MissingVariable(name.as_str().to_string()))?;
                    rendered.push_str(value);
                }
                None => rendered.push_str(&whole.as_str()[..1]),
            }

            last = whole.end();
        }

        rendered.push_str(&self.template[last..]);
        Ok(rendered)
    }
}

pub const DEFAULT_TEXT_QA_PROMPT_TMPL: &str = "Context information is below. \n\
---------------------\n\
{context_str}\n\
---------------------\n\
Given the context information and not prior knowledge, answer the question: {query_str}\n";

pub const DEFAULT_REFINE_PROMPT_TMPL: &str = "The original question is as follows: {query_str}\n\
We have provided an existing answer: {existing_answer}\n\
We have the opportunity to refine the existing answer (only if needed) with some more context below.\n\
------------\n\
{context_msg}\n\
------------\n\
Given the new context, refine the original answer to better answer the question. \
If the context isn't useful, return the original answer.";

pub const DEFAULT_SUMMARY_PROMPT_TMPL: &str = "Write a summary of the following. \
Try to use only the information provided. \
Try to include as many key details as possible.\n\
\n\
\n\
{context_str}\n\
\n\
\n\
SUMMARY:\"\"\"\n";

pub const DEFAULT_TREE_SELECT_PROMPT_TMPL: &str = "Some choices are given below. \
It is provided in a numbered list (1 to {num_chunks}), \
where each item in the list corresponds to a summary.\n\
---------------------\n\
{context_list}\n\
---------------------\n\
Using only the choices above and not prior knowledge, return the choice that is most relevant to the question: '{query_str}'\n\
Provide choice in the following format: 'ANSWER: <number>' and explain why this summary was selected in relation to the question.\n";

pub fn text_qa_prompt() -> Prompt {
    Prompt::new(DEFAULT_TEXT_QA_PROMPT_TMPL)
}

pub fn refine_prompt() -> Prompt {
    Prompt::new(DEFAULT_REFINE_PROMPT_TMPL)
}

pub fn summary_prompt() -> Prompt {
    Prompt::new(DEFAULT_SUMMARY_PROMPT_TMPL)
}

pub fn tree_select_prompt() -> Prompt {
    Prompt::new(DEFAULT_TREE_SELECT_PROMPT_TMPL)
}
