//! Export the reference store as JSON.
//!
//! Two layouts are produced:
//!
//! - JSON Lines (default): one subgenre object per line, for streaming
//!   into workflow tools.
//! - Compact (`--compact`): a single JSON array on one line, the same
//!   document `sgm serve` returns and `sgm import json` accepts.

use anyhow::Result;
use std::path::Path;

use crate::config::Config;
use crate::db;
use crate::models::SubgenreRecord;
use crate::output;
use crate::sqlite_store::SqliteStore;

/// Read every subgenre from the configured database, in store order.
pub async fn load_records(config: &Config) -> Result<Vec<SubgenreRecord>> {
    let store = SqliteStore::new(db::connect_existing(config).await?);
    let records = store.list_records().await;
    store.close().await;
    records
}

/// Render records in the requested layout.
pub fn render(records: &[SubgenreRecord], compact: bool) -> Result<String> {
    if compact {
        let mut json = serde_json::to_string(records)?;
        json.push('\n');
        Ok(json)
    } else {
        output::to_json_lines(records)
    }
}

/// Export the store to `output`, or stdout when `None`.
pub async fn run_export(config: &Config, compact: bool, output: Option<&Path>) -> Result<()> {
    let records = load_records(config).await?;
    let content = render(&records, compact)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, &content)?;
            let embedded = records.iter().filter(|r| r.embedding.is_some()).count();
            eprintln!(
                "Exported {} subgenres ({} with embeddings) to {}",
                records.len(),
                embedded,
                path.display()
            );
        }
        None => output::emit(&content, None)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<SubgenreRecord> {
        vec![
            SubgenreRecord {
                id: Some(1),
                embedding: Some(vec![0.5, -1.0]),
                ..SubgenreRecord::new("Crime", "Noir", "Crime - Noir")
            },
            SubgenreRecord {
                id: Some(2),
                ..SubgenreRecord::new("Romance", "Regency", "Romance - Regency")
            },
        ]
    }

    #[test]
    fn test_render_jsonl() {
        let out = render(&records(), false).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["sub_genre"], "Noir");
        assert_eq!(first["embedding"], serde_json::json!([0.5, -1.0]));
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert!(second["embedding"].is_null());
    }

    #[test]
    fn test_render_compact() {
        let out = render(&records(), true).unwrap();
        assert_eq!(out.lines().count(), 1);
        let parsed: Vec<SubgenreRecord> = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed, records());
    }

    #[test]
    fn test_render_empty_store() {
        assert_eq!(render(&[], true).unwrap(), "[]\n");
        assert_eq!(render(&[], false).unwrap(), "");
    }
}
