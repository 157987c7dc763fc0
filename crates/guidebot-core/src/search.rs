//! Top-k cosine ranking over the corpus.
//!
//! The ranking step is a pure function of the report list and a query
//! vector. Embedding the query and guarding the load state are the
//! caller's job (see `guidebot::index::ReportIndex::retrieve`).
//!
//! # Algorithm
//!
//! 1. Keep reports with a non-empty embedding; none → [`RetrievalError::EmptyIndex`].
//! 2. Reject a query vector whose length differs from the index dimension.
//! 3. Score each report with [`cosine_similarity`].
//! 4. Stable sort by score descending, so equal scores keep corpus order.
//! 5. Truncate to `min(k, embedded reports)`; `k <= 0` yields no results.
//!
//! This is a linear scan, `O(reports × dims)` per query.

use std::cmp::Ordering;

use crate::embedding::cosine_similarity;
use crate::error::RetrievalError;
use crate::models::{Report, ScoredReport};

/// Default snippet length in characters.
pub const DEFAULT_SNIPPET_CHARS: usize = 240;

/// Rank `reports` against `query_vec` and return the top `k`.
pub fn rank(
    reports: &[Report],
    query_vec: &[f32],
    k: i64,
    snippet_chars: usize,
) -> Result<Vec<ScoredReport>, RetrievalError> {
    let valid: Vec<&Report> = reports.iter().filter(|r| r.is_embedded()).collect();
    if valid.is_empty() {
        return Err(RetrievalError::EmptyIndex);
    }

    if k <= 0 {
        return Ok(Vec::new());
    }

    let dims = valid[0].embedding.len();
    if query_vec.len() != dims {
        return Err(RetrievalError::DimensionMismatch {
            expected: dims,
            actual: query_vec.len(),
        });
    }

    let mut scored: Vec<(&Report, f32)> = valid
        .into_iter()
        .map(|r| (r, cosine_similarity(query_vec, &r.embedding)))
        .collect();

    // sort_by is stable: ties keep corpus order.
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored.truncate(k.min(scored.len() as i64) as usize);

    Ok(scored
        .into_iter()
        .map(|(r, score)| ScoredReport {
            id: r.id.clone(),
            text: r.text.clone(),
            snippet: make_snippet(&r.text, snippet_chars),
            score,
        })
        .collect())
}

/// Leading excerpt of `text`, at most `max_chars` characters, with an
/// ellipsis when truncated.
pub fn make_snippet(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut snippet: String = text.chars().take(max_chars).collect();
    snippet.push('…');
    snippet
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(id: &str, embedding: Vec<f32>) -> Report {
        Report {
            id: id.to_string(),
            text: format!("report {}", id),
            embedding,
        }
    }

    fn sample() -> Vec<Report> {
        vec![
            report("r1", vec![1.0, 0.0]),
            report("r2", vec![0.0, 1.0]),
            report("r3", vec![0.9, 0.1]),
            report("r4", vec![-1.0, 0.0]),
            report("r5", vec![0.5, 0.5]),
        ]
    }

    fn ids(results: &[ScoredReport]) -> Vec<&str> {
        results.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn top_k_in_descending_order() {
        let results = rank(&sample(), &[1.0, 0.0], 3, 240).unwrap();
        assert_eq!(ids(&results), vec!["r1", "r3", "r5"]);
        assert!((results[0].score - 1.0).abs() < 1e-6);
        assert!((results[1].score - 0.9939).abs() < 1e-3);
        assert!((results[2].score - 0.7071).abs() < 1e-3);
    }

    #[test]
    fn k_is_clamped_to_corpus_size() {
        let results = rank(&sample(), &[1.0, 0.0], 100, 240).unwrap();
        assert_eq!(results.len(), 5);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert_eq!(results[4].id, "r4");
    }

    #[test]
    fn non_positive_k_returns_nothing() {
        assert!(rank(&sample(), &[1.0, 0.0], 0, 240).unwrap().is_empty());
        assert!(rank(&sample(), &[1.0, 0.0], -3, 240).unwrap().is_empty());
    }

    #[test]
    fn unembedded_reports_are_never_ranked() {
        let mut reports = sample();
        reports[0].embedding.clear();
        let results = rank(&reports, &[1.0, 0.0], 10, 240).unwrap();
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.id != "r1"));
    }

    #[test]
    fn ties_keep_corpus_order() {
        let reports = vec![
            report("b", vec![1.0, 0.0]),
            report("a", vec![2.0, 0.0]),
            report("c", vec![4.0, 0.0]),
        ];
        let first = rank(&reports, &[1.0, 0.0], 3, 240).unwrap();
        let second = rank(&reports, &[1.0, 0.0], 3, 240).unwrap();
        assert_eq!(ids(&first), vec!["b", "a", "c"]);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_index_is_an_error() {
        let reports = vec![report("a", vec![]), report("b", vec![])];
        assert_eq!(
            rank(&reports, &[1.0], 3, 240).unwrap_err(),
            RetrievalError::EmptyIndex
        );
    }

    #[test]
    fn dimension_mismatch_is_an_error() {
        let err = rank(&sample(), &[1.0, 0.0, 0.0], 3, 240).unwrap_err();
        assert_eq!(
            err,
            RetrievalError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        );
    }

    #[test]
    fn snippet_truncates_with_ellipsis() {
        assert_eq!(make_snippet("short text", 240), "short text");
        assert_eq!(make_snippet("abcdefgh", 3), "abc…");
    }
}
