//! Interchange records for the reference store.
//!
//! [`SubgenreRecord`] is the shape of `subgenres.json` files accepted by
//! `sgm import json` and emitted by `sgm export` and the JSON server.

use serde::{Deserialize, Serialize};

/// One subgenre as exchanged in JSON files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubgenreRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub parent_genre: String,
    pub sub_genre: String,
    #[serde(default)]
    pub prototype_text: String,
    #[serde(default)]
    pub embedding: Option<Vec<f64>>,
}

impl SubgenreRecord {
    pub fn new(parent_genre: &str, sub_genre: &str, prototype_text: &str) -> Self {
        Self {
            id: None,
            parent_genre: parent_genre.to_string(),
            sub_genre: sub_genre.to_string(),
            prototype_text: prototype_text.to_string(),
            embedding: None,
        }
    }
}
