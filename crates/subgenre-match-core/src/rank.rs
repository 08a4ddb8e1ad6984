//! Top-K ranking of reference entries against one query vector.
//!
//! Every reference entry is scored, the scores are sorted descending with
//! a stable sort (equal similarities keep the store's order), and the list
//! is truncated to `k`.

use crate::embedding::cosine_similarity;
use crate::error::MatchError;
use crate::models::{RankedMatch, ReferenceEntry};
use crate::TOP_K;

/// Rank `references` by cosine similarity to `query`, keeping the top `k`.
///
/// Returns `min(references.len(), k)` matches.
///
/// # Errors
///
/// [`MatchError::DimensionMismatch`] if the query's length disagrees with
/// any reference vector, even one that would not make the top `k`.
pub fn rank(
    query: &[f64],
    references: &[ReferenceEntry],
    k: usize,
) -> Result<Vec<RankedMatch>, MatchError> {
    let mut scored = Vec::with_capacity(references.len());

    for entry in references {
        let similarity = cosine_similarity(query, &entry.vector)?;
        scored.push(RankedMatch {
            label: entry.label.clone(),
            parent_label: entry.parent_label.clone(),
            prototype_text: entry.prototype_text.clone(),
            similarity,
        });
    }

    // `sort_by` is stable: ties keep store order.
    scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    scored.truncate(k);

    Ok(scored)
}

/// [`rank`] with the fixed [`TOP_K`] cutoff.
pub fn rank_top(
    query: &[f64],
    references: &[ReferenceEntry],
) -> Result<Vec<RankedMatch>, MatchError> {
    rank(query, references, TOP_K)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: i64, label: &str, vector: Vec<f64>) -> ReferenceEntry {
        ReferenceEntry {
            id,
            parent_label: "Parent".to_string(),
            label: label.to_string(),
            prototype_text: format!("{} prototype", label),
            vector,
        }
    }

    #[test]
    fn test_noir_romance_scenario() {
        let refs = vec![
            entry(1, "noir", vec![1.0, 0.0]),
            entry(2, "romance", vec![0.0, 1.0]),
        ];
        let ranked = rank_top(&[0.9, 0.1], &refs).unwrap();

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].label, "noir");
        assert_eq!(ranked[1].label, "romance");

        let norm = (0.9f64 * 0.9 + 0.1 * 0.1).sqrt();
        assert!((ranked[0].similarity - 0.9 / norm).abs() < 1e-12);
        assert!((ranked[1].similarity - 0.1 / norm).abs() < 1e-12);
        assert!((ranked[0].similarity - 0.994).abs() < 1e-3);
        assert!((ranked[1].similarity - 0.110).abs() < 1e-3);
    }

    #[test]
    fn test_truncates_to_top_k() {
        let refs: Vec<ReferenceEntry> = (0..30)
            .map(|i| entry(i, &format!("g{}", i), vec![1.0, i as f64]))
            .collect();
        let ranked = rank_top(&[1.0, 0.0], &refs).unwrap();
        assert_eq!(ranked.len(), TOP_K);
        for pair in ranked.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
        // Smaller second component means a closer angle to [1, 0].
        assert_eq!(ranked[0].label, "g0");
    }

    #[test]
    fn test_fewer_than_k_returns_all() {
        let refs = vec![entry(1, "a", vec![1.0]), entry(2, "b", vec![2.0])];
        assert_eq!(rank_top(&[1.0], &refs).unwrap().len(), 2);
        assert!(rank_top(&[1.0], &[]).unwrap().is_empty());
    }

    #[test]
    fn test_ties_keep_store_order() {
        let refs = vec![
            entry(1, "first", vec![1.0, 1.0]),
            entry(2, "best", vec![1.0, 0.0]),
            entry(3, "second", vec![2.0, 2.0]),
            entry(4, "third", vec![0.5, 0.5]),
        ];
        let ranked = rank_top(&[1.0, 0.0], &refs).unwrap();
        let labels: Vec<&str> = ranked.iter().map(|m| m.label.as_str()).collect();
        assert_eq!(labels, vec!["best", "first", "second", "third"]);
    }

    #[test]
    fn test_dimension_mismatch_in_any_entry() {
        let refs = vec![entry(1, "ok", vec![1.0, 0.0]), entry(2, "bad", vec![1.0, 0.0, 0.0])];
        assert_eq!(
            rank_top(&[1.0, 0.0], &refs),
            Err(MatchError::DimensionMismatch { left: 2, right: 3 })
        );
    }

    #[test]
    fn test_custom_k() {
        let refs: Vec<ReferenceEntry> = (0..5)
            .map(|i| entry(i, &format!("g{}", i), vec![1.0, i as f64]))
            .collect();
        assert_eq!(rank(&[1.0, 0.0], &refs, 3).unwrap().len(), 3);
        assert!(rank(&[1.0, 0.0], &refs, 0).unwrap().is_empty());
    }
}
