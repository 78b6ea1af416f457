use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;
use walkdir::WalkDir;

use crate::document::Document;

pub struct FileReader;

impl FileReader {
    fn is_supported(path: &Path) -> bool {
        matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("txt") | Some("md")
        )
    }

    pub async fn read_file(path: &Path) -> Result<Document> {
        if !Self::is_supported(path) {
            anyhow::bail!("Unsupported file format: {:?}", path);
        }

        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read file: {:?}", path))?;

        Ok(Document::from_source(content, path.to_string_lossy()))
    }

    /// Read every supported file below `dir`, in path order
    pub async fn read_directory(dir: &Path) -> Result<Vec<Document>> {
        let mut paths = Vec::new();

        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to walk directory: {:?}", dir))?;
            if entry.file_type().is_file() && Self::is_supported(entry.path()) {
                paths.push(entry.into_path());
            }
        }

        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            documents.push(Self::read_file(&path).await?);
        }

        tracing::debug!(dir = ?dir, documents = documents.len(), "Read documents");
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_directory_filters_extensions() {
        let dir = std::env::temp_dir().join(format!("ingest-reader-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        std::fs::write(dir.join("a.md"), "# A").unwrap();
        std::fs::write(dir.join("nested/b.txt"), "B").unwrap();
        std::fs::write(dir.join("c.pdf"), "ignored").unwrap();

        let documents = FileReader::read_directory(&dir).await.unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        let texts: Vec<&str> = documents.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(texts, vec!["# A", "B"]);
    }

    #[tokio::test]
    async fn test_unsupported_file_is_rejected() {
        let result = FileReader::read_file(Path::new("report.pdf")).await;
        assert!(result.is_err());
    }
}
