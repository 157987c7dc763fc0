//! Corpus statistics and health overview.
//!
//! Loads the corpus and prints what made it into the index: line and
//! record counts, embedding coverage, and the last load error if any.
//! Used by `guidebot stats` to check a corpus and provider before serving.

use anyhow::Result;
use guidebot_core::models::CorpusStats;

use crate::config::Config;
use crate::index::ReportIndex;

/// Run the stats command: load the corpus and print a summary.
///
/// A failed load is not an error here; the summary shows the failure.
pub async fn run_stats(config: &Config, index: &ReportIndex, json: bool) -> Result<()> {
    let load = index.ensure_loaded().await;
    let stats = index.stats();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_stats(config, &stats);
    }

    load.map_err(Into::into)
}

fn print_stats(config: &Config, stats: &CorpusStats) {
    println!("GuideBot — Corpus Stats");
    println!("=======================");
    println!();
    println!("  Corpus:      {}", config.corpus.path.display());
    println!("  State:       {}", stats.state);
    println!(
        "  Model:       {}",
        stats.model.as_deref().unwrap_or(config.embedding.provider.as_str())
    );
    if let Some(dims) = stats.dims {
        println!("  Dimensions:  {}", dims);
    }
    println!();
    println!("  Lines:       {}", stats.lines);
    println!("  Skipped:     {}", stats.skipped);
    println!("  Reports:     {}", stats.reports);
    println!(
        "  Embedded:    {} / {} ({}%)",
        stats.embedded,
        stats.reports,
        coverage_percent(stats.embedded, stats.reports)
    );
    if let Some(ms) = stats.load_duration_ms {
        println!("  Load time:   {}", format_duration_ms(ms));
    }
    if let Some(ts) = &stats.loaded_at {
        println!("  Loaded at:   {}", ts);
    }
    if let Some(err) = &stats.last_error {
        println!();
        println!("  Last error:  {}", err);
    }
    println!();
}

fn coverage_percent(embedded: usize, total: usize) -> usize {
    if total > 0 {
        (embedded * 100) / total
    } else {
        0
    }
}

/// Format milliseconds as a short human-readable duration.
fn format_duration_ms(ms: u64) -> String {
    if ms < 1000 {
        format!("{} ms", ms)
    } else if ms < 60_000 {
        format!("{:.1} s", ms as f64 / 1000.0)
    } else {
        format!("{}m {}s", ms / 60_000, (ms % 60_000) / 1000)
    }
}
