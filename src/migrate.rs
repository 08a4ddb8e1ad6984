use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    // Reference store. `embedding` is a JSON array of numbers; the model and
    // prototype-text hash record what it was generated from.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS subgenres (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            parent_genre TEXT NOT NULL,
            sub_genre TEXT NOT NULL,
            prototype_text TEXT NOT NULL,
            embedding TEXT,
            embedding_model TEXT,
            embedding_hash TEXT,
            embedded_at INTEGER
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_subgenres_sub_genre ON subgenres(sub_genre)")
        .execute(&pool)
        .await?;

    pool.close().await;
    Ok(())
}
