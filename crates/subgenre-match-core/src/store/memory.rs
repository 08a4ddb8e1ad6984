//! In-memory [`ReferenceStore`] implementation for tests and embedding hosts.
//!
//! Rows are kept with their embeddings as JSON text, exactly as the SQLite
//! store persists them, so parsing and malformed-entry behaviour match.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::format_vector;
use crate::error::MatchError;
use crate::models::ReferenceEntry;

use super::{decode_entry, ReferenceStore};

struct StoredRow {
    id: i64,
    parent_label: String,
    label: String,
    prototype_text: String,
    embedding: Option<String>,
}

/// In-memory reference store; rows load in insertion order.
pub struct InMemoryStore {
    rows: RwLock<Vec<StoredRow>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
        }
    }

    /// Build a store from already-decoded entries.
    pub fn from_entries(entries: Vec<ReferenceEntry>) -> Self {
        let store = Self::new();
        for e in entries {
            store.insert(e);
        }
        store
    }

    pub fn insert(&self, entry: ReferenceEntry) {
        let embedding = Some(format_vector(&entry.vector));
        self.insert_raw(
            entry.id,
            &entry.parent_label,
            &entry.label,
            &entry.prototype_text,
            embedding.as_deref(),
        );
    }

    /// Insert a row with an unparsed embedding, as read from disk.
    pub fn insert_raw(
        &self,
        id: i64,
        parent_label: &str,
        label: &str,
        prototype_text: &str,
        embedding: Option<&str>,
    ) {
        let mut rows = self.rows.write().unwrap_or_else(|e| e.into_inner());
        rows.push(StoredRow {
            id,
            parent_label: parent_label.to_string(),
            label: label.to_string(),
            prototype_text: prototype_text.to_string(),
            embedding: embedding.map(str::to_string),
        });
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReferenceStore for InMemoryStore {
    async fn load_references(&self) -> Result<Vec<ReferenceEntry>, MatchError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| MatchError::StoreUnavailable("in-memory store lock poisoned".into()))?;

        rows.iter()
            .map(|r| {
                decode_entry(
                    r.id,
                    r.parent_label.clone(),
                    r.label.clone(),
                    r.prototype_text.clone(),
                    r.embedding.as_deref(),
                )
            })
            .collect()
    }
}
