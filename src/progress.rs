//! Corpus load progress reporting.
//!
//! Reports observable progress while the corpus is read and embedded so
//! operators can see how much of a cold start is left. Progress is emitted
//! on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event for a corpus load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadProgressEvent {
    /// Reading and parsing the corpus source.
    Reading { source: String },
    /// `n` of `total` records have been through the embedder.
    Embedding { n: u64, total: u64 },
    /// The load finished (successfully or not).
    Done { embedded: u64, failed: u64 },
}

/// Receives load progress. Implementations write to stderr (human or JSON).
pub trait LoadProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the corpus loader.
    fn report(&self, event: LoadProgressEvent);
}

/// Human-friendly progress on stderr: "load  embedding  120 / 1,000 reports".
pub struct StderrProgress;

impl LoadProgressReporter for StderrProgress {
    fn report(&self, event: LoadProgressEvent) {
        let line = match &event {
            LoadProgressEvent::Reading { source } => format!("load  reading {}\n", source),
            LoadProgressEvent::Embedding { n, total } => format!(
                "load  embedding  {} / {} reports\n",
                format_number(*n),
                format_number(*total)
            ),
            LoadProgressEvent::Done { embedded, failed } => format!(
                "load  done  {} embedded, {} failed\n",
                format_number(*embedded),
                format_number(*failed)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl LoadProgressReporter for JsonProgress {
    fn report(&self, event: LoadProgressEvent) {
        let obj = match &event {
            LoadProgressEvent::Reading { source } => serde_json::json!({
                "event": "progress",
                "phase": "reading",
                "source": source,
            }),
            LoadProgressEvent::Embedding { n, total } => serde_json::json!({
                "event": "progress",
                "phase": "embedding",
                "n": n,
                "total": total,
            }),
            LoadProgressEvent::Done { embedded, failed } => serde_json::json!({
                "event": "progress",
                "phase": "done",
                "embedded": embedded,
                "failed": failed,
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl LoadProgressReporter for NoProgress {
    fn report(&self, _event: LoadProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    Auto,
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn LoadProgressReporter> {
        match self {
            ProgressMode::Auto => {
                if atty::is(atty::Stream::Stderr) {
                    Box::new(StderrProgress)
                } else {
                    Box::new(NoProgress)
                }
            }
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }
}
