//! SQLite-backed reference store.
//!
//! Implements the core [`ReferenceStore`] trait over the `subgenres` table
//! and adds the write operations used by the import and embed commands.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool};

use crate::models::SubgenreRecord;
use subgenre_match_core::embedding::format_vector;
use subgenre_match_core::models::ReferenceEntry;
use subgenre_match_core::store::{decode_entry, ReferenceStore};
use subgenre_match_core::MatchError;

/// A subgenre whose embedding is missing, stale, or from another model.
#[derive(Debug, Clone)]
pub struct PendingEmbedding {
    pub id: i64,
    pub label: String,
    pub prototype_text: String,
    pub text_hash: String,
}

/// SQLite implementation of [`ReferenceStore`].
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    pub async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subgenres")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    /// Insert records in one transaction, optionally replacing every existing row.
    ///
    /// Records carrying an embedding are stored with it, tagged with
    /// `model` when given.
    pub async fn insert_records(
        &self,
        records: &[SubgenreRecord],
        replace: bool,
        model: Option<&str>,
    ) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        if replace {
            sqlx::query("DELETE FROM subgenres").execute(&mut *tx).await?;
        }

        let now = chrono::Utc::now().timestamp();
        let mut inserted = 0u64;

        for rec in records {
            let embedding = rec.embedding.as_deref().map(format_vector);
            let hash = rec
                .embedding
                .as_ref()
                .map(|_| crate::embed_cmd::hash_text(&rec.prototype_text));
            let embedded_at = rec.embedding.as_ref().map(|_| now);

            sqlx::query(
                r#"
                INSERT INTO subgenres (parent_genre, sub_genre, prototype_text,
                                       embedding, embedding_model, embedding_hash, embedded_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&rec.parent_genre)
            .bind(&rec.sub_genre)
            .bind(&rec.prototype_text)
            .bind(embedding)
            .bind(rec.embedding.as_ref().and(model))
            .bind(hash)
            .bind(embedded_at)
            .execute(&mut *tx)
            .await?;
            inserted += 1;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// All rows as interchange records, in store order.
    pub async fn list_records(&self) -> Result<Vec<SubgenreRecord>> {
        let rows = sqlx::query(
            "SELECT id, parent_genre, sub_genre, prototype_text, embedding FROM subgenres ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let id = row_id(row)?;
            let sub_genre: String = column(row, id, "sub_genre")?;
            let raw: Option<String> = column(row, id, "embedding")?;
            let embedding = match raw {
                Some(text) => Some(subgenre_match_core::embedding::parse_vector(&text).map_err(
                    |e| MatchError::MalformedEntry {
                        id,
                        reason: format!("embedding for '{}' is not a numeric array: {}", sub_genre, e),
                    },
                )?),
                None => None,
            };
            records.push(SubgenreRecord {
                id: Some(id),
                parent_genre: column(row, id, "parent_genre")?,
                sub_genre,
                prototype_text: column(row, id, "prototype_text")?,
                embedding,
            });
        }
        Ok(records)
    }

    /// Rows needing an embedding for `model`: never embedded, embedded by
    /// another model, or whose prototype text changed since. An embedding
    /// stored as anything other than text counts as missing.
    pub async fn pending_embeddings(
        &self,
        model: &str,
        limit: Option<usize>,
    ) -> Result<Vec<PendingEmbedding>> {
        let rows = sqlx::query(
            "SELECT id, sub_genre, prototype_text, typeof(embedding) = 'text' AS has_embedding, \
             embedding_model, embedding_hash \
             FROM subgenres ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut pending = Vec::new();
        for row in &rows {
            let id = row_id(row)?;
            let prototype_text: String = column(row, id, "prototype_text")?;
            let text_hash = crate::embed_cmd::hash_text(&prototype_text);
            let has_embedding: i64 = column(row, id, "has_embedding")?;
            let stored_model: Option<String> = column(row, id, "embedding_model")?;
            let stored_hash: Option<String> = column(row, id, "embedding_hash")?;

            let up_to_date = has_embedding != 0
                && stored_model.as_deref() == Some(model)
                && stored_hash.as_deref() == Some(text_hash.as_str());
            if up_to_date {
                continue;
            }

            pending.push(PendingEmbedding {
                id,
                label: column(row, id, "sub_genre")?,
                prototype_text,
                text_hash,
            });
            if limit.is_some_and(|l| pending.len() >= l) {
                break;
            }
        }
        Ok(pending)
    }

    pub async fn store_embedding(
        &self,
        id: i64,
        vector: &[f64],
        model: &str,
        text_hash: &str,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            UPDATE subgenres
            SET embedding = ?, embedding_model = ?, embedding_hash = ?, embedded_at = ?
            WHERE id = ?
            "#,
        )
        .bind(format_vector(vector))
        .bind(model)
        .bind(text_hash)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn clear_embeddings(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE subgenres SET embedding = NULL, embedding_model = NULL, \
             embedding_hash = NULL, embedded_at = NULL",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ReferenceStore for SqliteStore {
    async fn load_references(&self) -> Result<Vec<ReferenceEntry>, MatchError> {
        let rows = sqlx::query(
            "SELECT id, parent_genre, sub_genre, prototype_text, embedding FROM subgenres ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MatchError::StoreUnavailable(format!("cannot read subgenres: {}", e)))?;

        rows.iter()
            .map(|row| {
                let id = row_id(row)?;
                let embedding: Option<String> = column(row, id, "embedding")?;
                decode_entry(
                    id,
                    column(row, id, "parent_genre")?,
                    column(row, id, "sub_genre")?,
                    column(row, id, "prototype_text")?,
                    embedding.as_deref(),
                )
            })
            .collect()
    }
}

fn row_id(row: &SqliteRow) -> Result<i64, MatchError> {
    row.try_get("id")
        .map_err(|e| MatchError::StoreUnavailable(format!("cannot read subgenre id: {}", e)))
}

/// Decode one column of row `id`. SQLite does not enforce column types, so a
/// value of the wrong storage class is reported as a malformed entry.
fn column<'r, T>(row: &'r SqliteRow, id: i64, name: &str) -> Result<T, MatchError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name).map_err(|e| MatchError::MalformedEntry {
        id,
        reason: format!("column '{}': {}", name, e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, SqliteStore) {
        let tmp = TempDir::new().unwrap();
        let cfg: Config = toml::from_str(&format!(
            "[db]\npath = \"{}\"\n",
            tmp.path().join("subgenres.db").display()
        ))
        .unwrap();
        crate::migrate::run_migrations(&cfg).await.unwrap();
        let pool = crate::db::connect_existing(&cfg).await.unwrap();
        (tmp, SqliteStore::new(pool))
    }

    fn record(parent: &str, sub: &str, embedding: Option<Vec<f64>>) -> SubgenreRecord {
        SubgenreRecord {
            embedding,
            ..SubgenreRecord::new(parent, sub, &format!("{} - {}", parent, sub))
        }
    }

    #[tokio::test]
    async fn test_insert_and_load_in_order() {
        let (_tmp, store) = setup().await;
        store
            .insert_records(
                &[
                    record("Crime", "Noir", Some(vec![1.0, 0.0])),
                    record("Romance", "Regency", Some(vec![0.0, 1.0])),
                ],
                false,
                Some("test-model"),
            )
            .await
            .unwrap();

        let refs = store.load_references().await.unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].label, "Noir");
        assert_eq!(refs[0].parent_label, "Crime");
        assert_eq!(refs[1].vector, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_missing_embedding_fails_load() {
        let (_tmp, store) = setup().await;
        store
            .insert_records(
                &[
                    record("Crime", "Noir", Some(vec![1.0, 0.0])),
                    record("Horror", "Gothic", None),
                ],
                false,
                None,
            )
            .await
            .unwrap();

        let err = store.load_references().await.unwrap_err();
        assert!(matches!(err, MatchError::MalformedEntry { id: 2, .. }));
    }

    #[tokio::test]
    async fn test_replace_clears_existing() {
        let (_tmp, store) = setup().await;
        store
            .insert_records(&[record("Crime", "Noir", None)], false, None)
            .await
            .unwrap();
        store
            .insert_records(&[record("Horror", "Gothic", None)], true, None)
            .await
            .unwrap();
        let records = store.list_records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sub_genre, "Gothic");
    }

    #[tokio::test]
    async fn test_pending_embeddings_tracks_model_and_text() {
        let (_tmp, store) = setup().await;
        store
            .insert_records(
                &[
                    record("Crime", "Noir", Some(vec![1.0])),
                    record("Horror", "Gothic", None),
                ],
                false,
                Some("model-a"),
            )
            .await
            .unwrap();

        let pending = store.pending_embeddings("model-a", None).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].label, "Gothic");

        // A different model makes every row stale.
        assert_eq!(store.pending_embeddings("model-b", None).await.unwrap().len(), 2);
        assert_eq!(store.pending_embeddings("model-b", Some(1)).await.unwrap().len(), 1);

        let p = &pending[0];
        store
            .store_embedding(p.id, &[0.5], "model-a", &p.text_hash)
            .await
            .unwrap();
        assert!(store.pending_embeddings("model-a", None).await.unwrap().is_empty());

        store.clear_embeddings().await.unwrap();
        assert_eq!(store.pending_embeddings("model-a", None).await.unwrap().len(), 2);
    }

    async fn insert_raw_embedding(store: &SqliteStore, sub: &str, embedding_sql: &str) {
        sqlx::query(&format!(
            "INSERT INTO subgenres (parent_genre, sub_genre, prototype_text, embedding) \
             VALUES ('Crime', '{}', 'Crime - {}', {})",
            sub, sub, embedding_sql
        ))
        .execute(&store.pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_blob_embedding_is_malformed_entry() {
        let (_tmp, store) = setup().await;
        store
            .insert_records(&[record("Crime", "Noir", Some(vec![1.0, 0.0]))], false, None)
            .await
            .unwrap();
        insert_raw_embedding(&store, "Heist", "X'0102'").await;

        let err = store.load_references().await.unwrap_err();
        assert!(matches!(err, MatchError::MalformedEntry { id: 2, .. }), "{:?}", err);
        assert_eq!(err.code(), "malformed_entry");

        let err = store.list_records().await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<MatchError>().map(MatchError::code),
            Some("malformed_entry")
        );
    }

    #[tokio::test]
    async fn test_numeric_embedding_is_malformed_entry() {
        let (_tmp, store) = setup().await;
        insert_raw_embedding(&store, "Caper", "42.5").await;

        let err = store.load_references().await.unwrap_err();
        assert!(matches!(err, MatchError::MalformedEntry { id: 1, .. }), "{:?}", err);
    }

    #[tokio::test]
    async fn test_non_text_embedding_is_pending() {
        let (_tmp, store) = setup().await;
        insert_raw_embedding(&store, "Heist", "X'0102'").await;

        let pending = store.pending_embeddings("model-a", None).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].label, "Heist");

        store
            .store_embedding(pending[0].id, &[0.25, 0.75], "model-a", &pending[0].text_hash)
            .await
            .unwrap();
        let refs = store.load_references().await.unwrap();
        assert_eq!(refs[0].vector, vec![0.25, 0.75]);
    }
}
