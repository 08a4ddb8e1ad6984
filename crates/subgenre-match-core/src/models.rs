//! Core data models shared by the ranker, aggregator, and application.
//!
//! Reference entries are immutable once loaded for a run. Query records
//! are transient; every other type here is derived and never persisted.

use serde::{Deserialize, Serialize};

/// A labelled subgenre prototype with its precomputed embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    /// Store row identifier.
    pub id: i64,
    /// Parent genre (e.g. `"Crime"`).
    pub parent_label: String,
    /// Subgenre name; the identity key within a store.
    pub label: String,
    /// Text the embedding was generated from.
    pub prototype_text: String,
    pub vector: Vec<f64>,
}

/// One embedded text chunk of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRecord {
    pub document_title: String,
    pub chunk_index: i64,
    pub chunk_text: String,
    pub vector: Vec<f64>,
}

/// A reference entry scored against one query vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedMatch {
    pub label: String,
    pub parent_label: String,
    pub prototype_text: String,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub similarity: f64,
}

/// Per-chunk ranking emitted by `sgm rank`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkRanking {
    pub document_title: String,
    pub chunk_index: i64,
    /// Chunk text, truncated to [`RANK_TEXT_CHARS`](crate::RANK_TEXT_CHARS).
    pub chunk_text: String,
    pub top_matches: Vec<RankedMatch>,
}

/// A label's tally across all chunks of one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelVotes {
    pub label: String,
    pub parent_label: String,
    pub prototype_text: String,
    /// Number of chunks whose top-K list contains this label.
    pub vote_count: usize,
    /// Mean similarity over those appearances.
    pub avg_similarity: f64,
}

/// Compact match shown in per-chunk detail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkMatch {
    pub label: String,
    pub parent_label: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkDetail {
    pub chunk_index: i64,
    /// First [`PREVIEW_CHARS`](crate::PREVIEW_CHARS) characters of the chunk.
    pub preview_text: String,
    pub top_5: Vec<ChunkMatch>,
}

/// Aggregated classification result for one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSummary {
    pub document_title: String,
    pub total_chunks: usize,
    /// Sorted by `vote_count` desc, then `avg_similarity` desc.
    pub top_labels: Vec<LabelVotes>,
    /// Sorted by `chunk_index` asc.
    pub per_chunk_detail: Vec<ChunkDetail>,
    pub processing_complete: bool,
}

impl From<&RankedMatch> for ChunkMatch {
    fn from(m: &RankedMatch) -> Self {
        ChunkMatch {
            label: m.label.clone(),
            parent_label: m.parent_label.clone(),
            similarity: m.similarity,
        }
    }
}
