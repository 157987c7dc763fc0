//! Line-delimited corpus record parsing.
//!
//! Each corpus line is a self-contained JSON object. Two record shapes are
//! accepted and normalized to one identity scheme:
//!
//! - **Identified** — carries one of the configured id fields
//!   (`id`, `report_id`, ...). A non-empty string or an integer becomes the
//!   report id verbatim.
//! - **Anonymous** — carries no id field at all. The report id is
//!   `line:<n>`, where `n` is the zero-based line number of the record in
//!   the corpus source.
//!
//! The `line:` prefix is reserved for anonymous records, so the two shapes
//! never share an id. A record whose id field is present but unusable
//! (null, empty, nested) or uses the reserved prefix is skipped. Report text comes from the first configured text field holding
//! a non-empty string after trimming.

use std::collections::HashSet;

use serde_json::Value;

use crate::error::RecordError;

/// Id prefix reserved for records without an id field.
pub const LINE_ID_PREFIX: &str = "line:";

/// Field-name aliases recognized in corpus records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFields {
    /// Text field aliases, in priority order.
    pub text_fields: Vec<String>,
    /// Identifier field aliases, in priority order.
    pub id_fields: Vec<String>,
}

impl Default for RecordFields {
    fn default() -> Self {
        Self {
            text_fields: ["text", "report", "report_text", "findings", "content", "body"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            id_fields: ["id", "report_id", "reportId"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// A record that survived parsing and validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusRecord {
    pub id: String,
    pub text: String,
    /// Zero-based line number in the corpus source.
    pub line: usize,
}

/// A line that did not produce a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    pub line: usize,
    pub reason: RecordError,
}

/// Result of parsing a whole corpus.
#[derive(Debug, Clone, Default)]
pub struct ParsedCorpus {
    pub records: Vec<CorpusRecord>,
    pub skipped: Vec<SkippedLine>,
    /// Total lines seen, blank lines included.
    pub lines: usize,
}

/// Parse one corpus line.
///
/// Returns `Ok(None)` for blank lines.
pub fn parse_record(
    line: &str,
    line_no: usize,
    fields: &RecordFields,
) -> Result<Option<CorpusRecord>, RecordError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let value: Value =
        serde_json::from_str(trimmed).map_err(|e| RecordError::Parse(e.to_string()))?;
    let obj = value.as_object().ok_or(RecordError::NotAnObject)?;

    let text = fields
        .text_fields
        .iter()
        .filter_map(|f| obj.get(f).and_then(Value::as_str))
        .map(str::trim)
        .find(|t| !t.is_empty())
        .ok_or(RecordError::MissingText)?;

    let mut id_present = false;
    let mut id = None;
    for f in &fields.id_fields {
        if let Some(v) = obj.get(f) {
            id_present = true;
            if let Some(s) = id_value(v) {
                id = Some(s);
                break;
            }
        }
    }

    let id = match (id, id_present) {
        (Some(id), _) if id.starts_with(LINE_ID_PREFIX) => {
            return Err(RecordError::ReservedId(id))
        }
        (Some(id), _) => id,
        (None, true) => return Err(RecordError::MissingId),
        (None, false) => format!("{}{}", LINE_ID_PREFIX, line_no),
    };

    Ok(Some(CorpusRecord {
        id,
        text: text.to_string(),
        line: line_no,
    }))
}

fn id_value(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

/// Parse every line of a corpus.
///
/// Invalid lines are collected in [`ParsedCorpus::skipped`]; they never
/// fail the parse. Duplicate ids keep the first occurrence. When
/// `max_records` is set, parsing stops once that many records are kept.
pub fn parse_corpus<S: AsRef<str>>(
    lines: &[S],
    fields: &RecordFields,
    max_records: Option<usize>,
) -> ParsedCorpus {
    let mut parsed = ParsedCorpus::default();
    let mut seen: HashSet<String> = HashSet::new();

    for (line_no, line) in lines.iter().enumerate() {
        if max_records.is_some_and(|max| parsed.records.len() >= max) {
            break;
        }
        parsed.lines += 1;

        match parse_record(line.as_ref(), line_no, fields) {
            Ok(Some(record)) => {
                if seen.insert(record.id.clone()) {
                    parsed.records.push(record);
                } else {
                    parsed.skipped.push(SkippedLine {
                        line: line_no,
                        reason: RecordError::DuplicateId(record.id),
                    });
                }
            }
            Ok(None) => {}
            Err(reason) => parsed.skipped.push(SkippedLine {
                line: line_no,
                reason,
            }),
        }
    }

    parsed
}

/// Truncate report text to at most `max_chars` characters for embedding.
///
/// Cuts on a character boundary; `0` disables truncation.
pub fn embedding_input(text: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return text.to_string();
    }
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
