use anyhow::Result;

use crate::document::Document;
use crate::node::{Node, estimate_tokens};

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    pub chunk_size_tokens: usize,
    pub overlap_tokens: usize,
}

impl ChunkerConfig {
    /// Overlap must leave room for new text in every node
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size_tokens == 0 {
            anyhow::bail!("chunk_size_tokens must be greater than zero");
        }
        if self.overlap_tokens >= self.chunk_size_tokens {
            anyhow::bail!(
                "overlap_tokens ({}) must be smaller than chunk_size_tokens ({})",
                self.overlap_tokens,
                self.chunk_size_tokens
            );
        }
        Ok(())
    }

    /// Overlap actually carried between nodes, at most half a node
    fn effective_overlap(&self) -> usize {
        self.overlap_tokens.min(self.chunk_size_tokens / 2)
    }
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size_tokens: 512,
            overlap_tokens: 20,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        if let Err(e) = config.validate() {
            tracing::warn!(error = %e, "Chunker overlap will be capped at half a node");
        }
        Self { config }
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split every document into nodes, preserving document order
    pub fn chunk_documents(&self, documents: &[Document]) -> Vec<Node> {
        documents
            .iter()
            .flat_map(|doc| self.chunk_document(doc))
            .collect()
    }

    pub fn chunk_document(&self, document: &Document) -> Vec<Node> {
        let mut nodes = Vec::new();
        let doc_id = &document.doc_id;

        // Split by headings first (markdown and plain text)
        for (section_start, section) in split_by_headings(&document.text) {
            if section.trim().is_empty() {
                continue;
            }

            // If section is small enough, make it one node
            if estimate_tokens(section) <= self.config.chunk_size_tokens {
                nodes.push(Node::new(
                    doc_id.clone(),
                    section.trim().to_string(),
                    (section_start, section_start + section.len()),
                ));
                continue;
            }

            // Otherwise, pack paragraphs up to the size limit
            let mut buffer = String::new();
            let mut buffer_start = section_start;
            let mut buffer_end = section_start;

            for (para_start, para) in split_by_paragraphs(section) {
                let para_start = section_start + para_start;

                if !buffer.is_empty()
                    && estimate_tokens(&buffer) + estimate_tokens(para) > self.config.chunk_size_tokens
                {
                    nodes.push(Node::new(
                        doc_id.clone(),
                        buffer.clone(),
                        (buffer_start, buffer_end),
                    ));

                    // Start new buffer with overlap; its start offset is approximate
                    buffer = get_overlap(&buffer, self.config.effective_overlap());
                    buffer_start = buffer_end.saturating_sub(buffer.len());
                }

                if buffer.is_empty() {
                    buffer_start = para_start;
                } else {
                    buffer.push_str("\n\n");
                }
                buffer.push_str(para);
                buffer_end = para_start + para.len();
            }

            // Flush remaining buffer
            if !buffer.trim().is_empty() {
                nodes.push(Node::new(doc_id.clone(), buffer, (buffer_start, buffer_end)));
            }
        }

        nodes
    }
}

/// Sections with their byte offset, a new one starting at every markdown heading
fn split_by_headings(text: &str) -> Vec<(usize, &str)> {
    let mut sections = Vec::new();
    let mut section_start = 0;
    let mut position = 0;

    for line in text.split_inclusive('\n') {
        if line.trim_start().starts_with('#') && position > section_start {
            sections.push((section_start, &text[section_start..position]));
            section_start = position;
        }
        position += line.len();
    }

    if position > section_start {
        sections.push((section_start, &text[section_start..position]));
    }

    sections
}

/// Trimmed, non-empty paragraphs with their byte offset inside `text`
fn split_by_paragraphs(text: &str) -> Vec<(usize, &str)> {
    let mut paragraphs = Vec::new();
    let mut position = 0;

    for part in text.split("\n\n") {
        let leading = part.len() - part.trim_start().len();
        let trimmed = part.trim();
        if !trimmed.is_empty() {
            paragraphs.push((position + leading, trimmed));
        }
        position += part.len() + 2;
    }

    paragraphs
}

fn get_overlap(text: &str, target_tokens: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let target_words = (target_tokens as f64 / 1.3) as usize;

    if target_words == 0 {
        return String::new();
    }

    // Never carry the whole flushed node into the next one
    let target_words = target_words.min(words.len().saturating_sub(1));
    words[words.len() - target_words..].join(" ")
}
