use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use unicode_segmentation::UnicodeSegmentation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub doc_id: String,
    pub node_id: String,
    pub text: String,
    pub offset: (usize, usize), // [start, end] byte positions in the document
}

impl Node {
    pub fn new(doc_id: String, text: String, offset: (usize, usize)) -> Self {
        // Generate stable node_id from content
        let node_id = Self::generate_node_id(&doc_id, &text, offset);

        Self {
            doc_id,
            node_id,
            text,
            offset,
        }
    }

    /// Node built from generated text (e.g. a summary) rather than a document span
    pub fn synthetic(text: String) -> Self {
        Self::new(String::new(), text, (0, 0))
    }

    fn generate_node_id(doc_id: &str, text: &str, offset: (usize, usize)) -> String {
        let mut hasher = Sha256::new();
        hasher.update(doc_id.as_bytes());
        hasher.update(text.as_bytes());
        hasher.update(offset.0.to_string().as_bytes());
        hasher.update(offset.1.to_string().as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..16]) // Use first 16 bytes (32 hex chars)
    }

    /// Estimate token count (rough: 1.3 tokens per word)
    pub fn estimated_tokens(&self) -> usize {
        estimate_tokens(&self.text)
    }
}

pub fn estimate_tokens(text: &str) -> usize {
    let word_count = text.unicode_words().count();
    (word_count as f64 * 1.3).ceil() as usize
}
