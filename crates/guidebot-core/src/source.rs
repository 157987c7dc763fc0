//! Raw corpus sources.
//!
//! A [`CorpusSource`] yields the line-delimited corpus as text lines. The
//! application crate provides a JSONL file source; [`StaticSource`] serves
//! lines held in memory (tests, embedded corpora).

use anyhow::Result;
use async_trait::async_trait;

/// Provider of raw corpus lines.
#[async_trait]
pub trait CorpusSource: Send + Sync {
    /// Human-readable description used in logs (e.g. the file path).
    fn describe(&self) -> String;

    /// Read every line of the corpus, in order.
    async fn read_lines(&self) -> Result<Vec<String>>;
}

/// In-memory corpus source.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    lines: Vec<String>,
}

impl StaticSource {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl CorpusSource for StaticSource {
    fn describe(&self) -> String {
        format!("in-memory ({} lines)", self.lines.len())
    }

    async fn read_lines(&self) -> Result<Vec<String>> {
        Ok(self.lines.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_source_returns_lines_in_order() {
        let src = StaticSource::new(["a", "b", "c"]);
        assert_eq!(src.read_lines().await.unwrap(), vec!["a", "b", "c"]);
        assert_eq!(src.describe(), "in-memory (3 lines)");
    }
}
