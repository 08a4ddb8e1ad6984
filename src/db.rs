use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::config::Config;
use subgenre_match_core::MatchError;

/// Open the database for writing, creating the file if needed.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Open an existing database. Never creates the file.
pub async fn connect_existing(config: &Config) -> Result<SqlitePool, MatchError> {
    let db_path = &config.db.path;

    if !db_path.is_file() {
        return Err(MatchError::StoreUnavailable(format!(
            "database not found at {}",
            db_path.display()
        )));
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
        .map_err(|e| MatchError::StoreUnavailable(e.to_string()))?
        .create_if_missing(false);

    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(|e| {
            MatchError::StoreUnavailable(format!("cannot open {}: {}", db_path.display(), e))
        })
}
