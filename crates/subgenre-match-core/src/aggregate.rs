//! Per-document vote aggregation across chunk rankings.
//!
//! Each chunk's top-K list is one ballot: every label in it gets one vote
//! and contributes its similarity to that label's average. The document's
//! labels are then ordered by `(vote_count desc, avg_similarity desc)`.
//!
//! # Order independence
//!
//! Chunks are buffered and tallied in ascending `chunk_index` order when
//! the summary is built. Vote counts, similarity sums, and the
//! first-encounter order used to break exact ties therefore do not depend
//! on the order in which chunks were pushed.

use std::collections::HashMap;

use crate::models::{ChunkDetail, ChunkMatch, DocumentSummary, LabelVotes, RankedMatch};
use crate::{truncate_chars, DETAIL_K, PREVIEW_CHARS, TOP_K};

struct PendingChunk {
    chunk_index: i64,
    preview_text: String,
    matches: Vec<RankedMatch>,
}

struct Tally {
    label: String,
    parent_label: String,
    prototype_text: String,
    votes: usize,
    scores: Vec<f64>,
}

/// Accumulates chunk rankings for one document.
pub struct Aggregator {
    document_title: String,
    chunks: Vec<PendingChunk>,
}

impl Aggregator {
    pub fn new(document_title: impl Into<String>) -> Self {
        Self {
            document_title: document_title.into(),
            chunks: Vec::new(),
        }
    }

    pub fn document_title(&self) -> &str {
        &self.document_title
    }

    /// Number of chunks pushed so far.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Add one chunk's ranked matches (already truncated to top-K by the ranker).
    pub fn push(&mut self, chunk_index: i64, chunk_text: &str, matches: Vec<RankedMatch>) {
        self.chunks.push(PendingChunk {
            chunk_index,
            preview_text: truncate_chars(chunk_text, PREVIEW_CHARS).to_string(),
            matches,
        });
    }

    /// Build the document summary.
    pub fn finish(mut self) -> DocumentSummary {
        let total_chunks = self.chunks.len();

        // Stable: duplicate indices keep push order.
        self.chunks.sort_by_key(|c| c.chunk_index);

        let mut tallies: Vec<Tally> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut per_chunk_detail = Vec::with_capacity(total_chunks);

        for chunk in self.chunks {
            for m in chunk.matches.iter().take(TOP_K) {
                let pos = *positions.entry(m.label.clone()).or_insert_with(|| {
                    tallies.push(Tally {
                        label: m.label.clone(),
                        parent_label: m.parent_label.clone(),
                        prototype_text: m.prototype_text.clone(),
                        votes: 0,
                        scores: Vec::new(),
                    });
                    tallies.len() - 1
                });
                let tally = &mut tallies[pos];
                tally.votes += 1;
                tally.scores.push(m.similarity);
            }

            per_chunk_detail.push(ChunkDetail {
                chunk_index: chunk.chunk_index,
                preview_text: chunk.preview_text,
                top_5: chunk.matches.iter().take(DETAIL_K).map(ChunkMatch::from).collect(),
            });
        }

        let mut top_labels: Vec<LabelVotes> = tallies
            .into_iter()
            .map(|t| LabelVotes {
                avg_similarity: t.scores.iter().sum::<f64>() / t.scores.len() as f64,
                label: t.label,
                parent_label: t.parent_label,
                prototype_text: t.prototype_text,
                vote_count: t.votes,
            })
            .collect();

        top_labels.sort_by(|a, b| {
            b.vote_count
                .cmp(&a.vote_count)
                .then_with(|| b.avg_similarity.total_cmp(&a.avg_similarity))
        });
        top_labels.truncate(TOP_K);

        DocumentSummary {
            document_title: self.document_title,
            total_chunks,
            top_labels,
            per_chunk_detail,
            processing_complete: true,
        }
    }
}

/// Summarize one document from `(chunk_index, chunk_text, matches)` triples.
pub fn summarize<I>(document_title: &str, chunks: I) -> DocumentSummary
where
    I: IntoIterator<Item = (i64, String, Vec<RankedMatch>)>,
{
    let mut agg = Aggregator::new(document_title);
    for (idx, text, matches) in chunks {
        agg.push(idx, &text, matches);
    }
    agg.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(label: &str, similarity: f64) -> RankedMatch {
        RankedMatch {
            label: label.to_string(),
            parent_label: format!("{} parent", label),
            prototype_text: format!("{} prototype", label),
            similarity,
        }
    }

    #[test]
    fn test_zero_chunks() {
        let summary = Aggregator::new("Empty Book").finish();
        assert_eq!(summary.document_title, "Empty Book");
        assert_eq!(summary.total_chunks, 0);
        assert!(summary.top_labels.is_empty());
        assert!(summary.per_chunk_detail.is_empty());
        assert!(summary.processing_complete);
    }

    #[test]
    fn test_two_chunk_vote_average() {
        let summary = summarize(
            "Book",
            vec![
                (1, "chunk a".to_string(), vec![m("noir", 0.9)]),
                (2, "chunk b".to_string(), vec![m("noir", 0.8)]),
            ],
        );
        assert_eq!(summary.total_chunks, 2);
        assert_eq!(summary.top_labels.len(), 1);
        let noir = &summary.top_labels[0];
        assert_eq!(noir.label, "noir");
        assert_eq!(noir.vote_count, 2);
        assert!((noir.avg_similarity - 0.85).abs() < 1e-12);
        assert_eq!(noir.parent_label, "noir parent");
        assert_eq!(noir.prototype_text, "noir prototype");
    }

    #[test]
    fn test_votes_outrank_similarity() {
        let summary = summarize(
            "Book",
            vec![
                (1, String::new(), vec![m("rare", 0.99), m("common", 0.4)]),
                (2, String::new(), vec![m("common", 0.5)]),
            ],
        );
        let labels: Vec<&str> = summary.top_labels.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(labels, vec!["common", "rare"]);
    }

    #[test]
    fn test_equal_votes_sorted_by_average() {
        let summary = summarize(
            "Book",
            vec![(1, String::new(), vec![m("low", 0.2), m("high", 0.7), m("mid", 0.5)])],
        );
        let labels: Vec<&str> = summary.top_labels.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(labels, vec!["high", "mid", "low"]);
    }

    #[test]
    fn test_exact_ties_keep_first_encounter() {
        let summary = summarize(
            "Book",
            vec![(1, String::new(), vec![m("b", 0.5), m("a", 0.5), m("c", 0.5)])],
        );
        let labels: Vec<&str> = summary.top_labels.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(labels, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_top_labels_truncated() {
        let matches: Vec<RankedMatch> = (0..25).map(|i| m(&format!("g{}", i), 0.9)).collect();
        let summary = summarize("Book", vec![(1, String::new(), matches)]);
        assert_eq!(summary.top_labels.len(), TOP_K);
    }

    #[test]
    fn test_detail_keeps_top_five_and_preview() {
        let matches: Vec<RankedMatch> = (0..8)
            .map(|i| m(&format!("g{}", i), 1.0 - i as f64 * 0.1))
            .collect();
        let text = "x".repeat(400);
        let summary = summarize("Book", vec![(3, text, matches)]);
        let detail = &summary.per_chunk_detail[0];
        assert_eq!(detail.chunk_index, 3);
        assert_eq!(detail.top_5.len(), DETAIL_K);
        assert_eq!(detail.top_5[0].label, "g0");
        assert_eq!(detail.preview_text.chars().count(), PREVIEW_CHARS);
    }

    #[test]
    fn test_permutation_invariance() {
        let chunks = vec![
            (1, "one".to_string(), vec![m("noir", 0.91), m("cozy", 0.33), m("gothic", 0.5)]),
            (2, "two".to_string(), vec![m("gothic", 0.72), m("noir", 0.61)]),
            (3, "three".to_string(), vec![m("cozy", 0.5), m("gothic", 0.5), m("noir", 0.17)]),
            (4, "four".to_string(), vec![m("space", 0.8), m("cozy", 0.44)]),
        ];
        let forward = summarize("Book", chunks.clone());

        let mut reversed = chunks.clone();
        reversed.reverse();
        let backward = summarize("Book", reversed);

        let mut shuffled = chunks;
        shuffled.swap(0, 2);
        shuffled.swap(1, 3);
        let mixed = summarize("Book", shuffled);

        assert_eq!(forward, backward);
        assert_eq!(forward, mixed);

        let indices: Vec<i64> = forward.per_chunk_detail.iter().map(|d| d.chunk_index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4]);
    }
}
