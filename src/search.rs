//! `guidebot search`: one-shot retrieval from the command line.

use anyhow::Result;
use guidebot_core::models::ScoredReport;

use crate::config::Config;
use crate::index::ReportIndex;

/// Load the corpus, retrieve the top `k` reports for `query`, and print them.
///
/// `k` defaults to `retrieval.default_k` and is capped at `retrieval.max_k`.
/// With `json`, prints the result list as a JSON array on stdout.
pub async fn run_search(
    config: &Config,
    index: &ReportIndex,
    query: &str,
    k: Option<i64>,
    json: bool,
) -> Result<()> {
    let k = k
        .unwrap_or(config.retrieval.default_k)
        .min(config.retrieval.max_k);

    index.ensure_loaded().await?;
    let results = index.retrieve(query, k).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }
    print_results(&results);
    Ok(())
}

fn print_results(results: &[ScoredReport]) {
    for (i, result) in results.iter().enumerate() {
        println!("{}. [{:.3}] {}", i + 1, result.score, result.id);
        println!(
            "    excerpt: \"{}\"",
            result.snippet.replace('\n', " ").trim()
        );
        println!();
    }
}
