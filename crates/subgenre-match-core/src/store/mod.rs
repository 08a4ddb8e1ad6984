//! Reference store abstraction.
//!
//! The [`ReferenceStore`] trait is the read accessor the ranking pipeline
//! consumes. The application provides a SQLite-backed implementation;
//! [`memory::InMemoryStore`] serves tests and callers that already hold
//! their entries in memory.
//!
//! Loading is all-or-nothing: an implementation either returns every
//! entry, in persisted order, or an error. Partial stores are never
//! returned.

pub mod memory;

use async_trait::async_trait;

use crate::error::MatchError;
use crate::models::ReferenceEntry;

/// Read accessor for the labelled reference entries.
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    /// Load every reference entry in persisted order.
    ///
    /// # Errors
    ///
    /// - [`MatchError::StoreUnavailable`] if the store cannot be opened or read.
    /// - [`MatchError::MalformedEntry`] if any stored vector fails to parse.
    async fn load_references(&self) -> Result<Vec<ReferenceEntry>, MatchError>;
}

/// Build a [`ReferenceEntry`] from a persisted row whose embedding is
/// stored as JSON array text.
///
/// A missing embedding is malformed: an entry that was never embedded
/// cannot take part in ranking.
pub fn decode_entry(
    id: i64,
    parent_label: String,
    label: String,
    prototype_text: String,
    embedding: Option<&str>,
) -> Result<ReferenceEntry, MatchError> {
    let raw = embedding.ok_or_else(|| MatchError::MalformedEntry {
        id,
        reason: format!("subgenre '{}' has no embedding", label),
    })?;
    let vector = crate::embedding::parse_vector(raw).map_err(|e| MatchError::MalformedEntry {
        id,
        reason: format!("embedding for '{}' is not a numeric array: {}", label, e),
    })?;

    Ok(ReferenceEntry {
        id,
        parent_label,
        label,
        prototype_text,
        vector,
    })
}
