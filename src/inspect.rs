//! `guidebot inspect`: validate a corpus file without embedding it.
//!
//! Parses every line with the configured field aliases and prints how many
//! records survive, plus the reason each skipped line was rejected. Nothing
//! is sent to the embedding provider.

use anyhow::Result;
use guidebot_core::corpus::{parse_corpus, ParsedCorpus};
use guidebot_core::source::CorpusSource;
use serde::Serialize;

use crate::config::Config;
use crate::source::JsonlFileSource;

/// How many skip reasons to list before summarizing the rest.
const MAX_LISTED_SKIPS: usize = 20;

#[derive(Serialize)]
struct InspectSummary {
    source: String,
    lines: usize,
    records: usize,
    skipped: Vec<SkipEntry>,
}

#[derive(Serialize)]
struct SkipEntry {
    /// One-based line number.
    line: usize,
    reason: String,
}

fn summarize(source: String, parsed: &ParsedCorpus) -> InspectSummary {
    InspectSummary {
        source,
        lines: parsed.lines,
        records: parsed.records.len(),
        skipped: parsed
            .skipped
            .iter()
            .map(|s| SkipEntry {
                line: s.line + 1,
                reason: s.reason.to_string(),
            })
            .collect(),
    }
}

pub async fn run_inspect(config: &Config, json: bool) -> Result<()> {
    let source = JsonlFileSource::new(&config.corpus.path);
    let lines = source.read_lines().await?;
    let parsed = parse_corpus(
        &lines,
        &config.corpus.record_fields(),
        config.corpus.max_reports,
    );
    let summary = summarize(source.describe(), &parsed);

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Corpus:   {}", summary.source);
    println!("Lines:    {}", summary.lines);
    println!("Records:  {}", summary.records);
    println!("Skipped:  {}", summary.skipped.len());
    for entry in summary.skipped.iter().take(MAX_LISTED_SKIPS) {
        println!("  line {}: {}", entry.line, entry.reason);
    }
    if summary.skipped.len() > MAX_LISTED_SKIPS {
        println!("  ... and {} more", summary.skipped.len() - MAX_LISTED_SKIPS);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use guidebot_core::corpus::RecordFields;

    #[test]
    fn summary_uses_one_based_lines() {
        let lines = vec![
            r#"{"id": "a", "text": "alpha"}"#,
            "not json",
            r#"{"id": "a", "text": "again"}"#,
        ];
        let parsed = parse_corpus(&lines, &RecordFields::default(), None);
        let summary = summarize("mem".to_string(), &parsed);

        assert_eq!(summary.records, 1);
        assert_eq!(summary.skipped.len(), 2);
        assert_eq!(summary.skipped[0].line, 2);
        assert_eq!(summary.skipped[1].line, 3);
        assert!(summary.skipped[1].reason.contains("duplicate"));
    }
}
