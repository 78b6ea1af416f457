use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub text: String,
    pub source: Option<String>,
}

impl Document {
    /// Create a document with a random id
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            doc_id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            source: None,
        }
    }

    /// Create a document whose id is derived from its source path
    pub fn from_source(text: impl Into<String>, source: impl Into<String>) -> Self {
        let source = source.into();
        Self {
            doc_id: crate::generate_doc_id(&source),
            text: text.into(),
            source: Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_id_is_stable() {
        let a = Document::from_source("one", "notes/a.md");
        let b = Document::from_source("two", "notes/a.md");

        assert_eq!(a.doc_id, b.doc_id);
        assert_eq!(a.source.as_deref(), Some("notes/a.md"));
    }

    #[test]
    fn test_random_ids_differ() {
        let a = Document::new("same text");
        let b = Document::new("same text");

        assert_ne!(a.doc_id, b.doc_id);
        assert!(a.source.is_none());
    }
}
