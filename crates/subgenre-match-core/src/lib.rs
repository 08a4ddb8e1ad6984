//! # Subgenre Match Core
//!
//! Pure classification logic for Subgenre Match: data models, cosine
//! similarity, top-K ranking against a reference store, and per-document
//! vote aggregation.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or network code.
//! Every operation is a synchronous computation over data already in
//! memory; the application crate owns loading and serialization.
//!
//! ```text
//! QueryRecord ──▶ rank() ──▶ Vec<RankedMatch> ──▶ Aggregator ──▶ DocumentSummary
//!                   ▲
//!          &[ReferenceEntry] (loaded once per run)
//! ```

pub mod aggregate;
pub mod embedding;
pub mod error;
pub mod models;
pub mod rank;
pub mod store;

pub use error::MatchError;

/// Number of reference matches kept per chunk and labels kept per document.
pub const TOP_K: usize = 20;

/// Number of matches kept per chunk in a document summary's detail list.
pub const DETAIL_K: usize = 5;

/// Characters of chunk text kept as a preview in a document summary.
pub const PREVIEW_CHARS: usize = 150;

/// Characters of chunk text echoed back by per-chunk rankings.
pub const RANK_TEXT_CHARS: usize = 500;

/// Truncate `text` to at most `max_chars` characters (not bytes).
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
