//! JSONL file corpus source.

use anyhow::{Context, Result};
use async_trait::async_trait;
use guidebot_core::source::CorpusSource;
use std::path::PathBuf;

/// Reads the corpus from a UTF-8 line-delimited JSON file.
#[derive(Debug, Clone)]
pub struct JsonlFileSource {
    path: PathBuf,
}

impl JsonlFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CorpusSource for JsonlFileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn read_lines(&self) -> Result<Vec<String>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read corpus file: {}", self.path.display()))?;
        Ok(content.lines().map(str::to_string).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports.jsonl");
        std::fs::write(&path, "{\"text\": \"a\"}\r\n\n{\"text\": \"b\"}\n").unwrap();

        let lines = JsonlFileSource::new(&path).read_lines().await.unwrap();
        assert_eq!(lines, vec!["{\"text\": \"a\"}", "", "{\"text\": \"b\"}"]);
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let src = JsonlFileSource::new("/nonexistent/reports.jsonl");
        let err = src.read_lines().await.unwrap_err();
        assert!(err.to_string().contains("Failed to read corpus file"));
    }
}
