use anyhow::{bail, Result};
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::db;
use crate::embedding::{self, EmbeddingProvider};
use crate::progress::{ProgressEvent, ProgressReporter, Stage};
use crate::sqlite_store::{PendingEmbedding, SqliteStore};

/// Counts reported by an embedding run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EmbedStats {
    pub total: usize,
    pub embedded: usize,
}

/// Check the provider is enabled, then open it and the existing store.
async fn open(config: &Config) -> Result<(Box<dyn EmbeddingProvider>, SqliteStore)> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }
    let provider = embedding::create_provider(&config.embedding)?;
    let store = SqliteStore::new(db::connect_existing(config).await?);
    Ok((provider, store))
}

/// Embed up to `limit` subgenres whose embedding is missing, stale, or
/// from another model.
pub async fn embed_pending(
    config: &Config,
    limit: Option<usize>,
    progress: &dyn ProgressReporter,
) -> Result<EmbedStats> {
    let (provider, store) = open(config).await?;
    let result = async {
        let pending = store
            .pending_embeddings(provider.model_name(), limit)
            .await?;
        embed_all(config, provider.as_ref(), &store, &pending, progress).await
    }
    .await;
    store.close().await;
    result
}

/// Clear every embedding and regenerate them all. Returns the number of
/// rows cleared alongside the run's counts.
pub async fn embed_rebuild(
    config: &Config,
    progress: &dyn ProgressReporter,
) -> Result<(u64, EmbedStats)> {
    let (provider, store) = open(config).await?;
    let result = async {
        let cleared = store.clear_embeddings().await?;
        let pending = store.pending_embeddings(provider.model_name(), None).await?;
        let stats = embed_all(config, provider.as_ref(), &store, &pending, progress).await?;
        Ok::<_, anyhow::Error>((cleared, stats))
    }
    .await;
    store.close().await;
    result
}

/// `sgm embed pending`.
pub async fn run_embed_pending(
    config: &Config,
    limit: Option<usize>,
    dry_run: bool,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    if dry_run {
        let (provider, store) = open(config).await?;
        let pending = store.pending_embeddings(provider.model_name(), limit).await;
        store.close().await;

        println!("embed pending (dry-run)");
        println!("  subgenres needing embeddings: {}", pending?.len());
        return Ok(());
    }

    let stats = embed_pending(config, limit, progress).await?;

    println!("embed pending");
    if stats.total == 0 {
        println!("  all subgenres up to date");
    } else {
        println!("  total pending: {}", stats.total);
        println!("  embedded: {}", stats.embedded);
    }
    Ok(())
}

/// `sgm embed rebuild`.
pub async fn run_embed_rebuild(config: &Config, progress: &dyn ProgressReporter) -> Result<()> {
    let (cleared, stats) = embed_rebuild(config, progress).await?;

    println!("embed rebuild: cleared {} embeddings", cleared);
    println!("  total subgenres: {}", stats.total);
    println!("  embedded: {}", stats.embedded);
    Ok(())
}

/// Embed `pending` in batches. The first failed batch aborts the run;
/// batches already stored stay stored and are skipped on the next run.
async fn embed_all(
    config: &Config,
    provider: &dyn EmbeddingProvider,
    store: &SqliteStore,
    pending: &[PendingEmbedding],
    progress: &dyn ProgressReporter,
) -> Result<EmbedStats> {
    let model_name = provider.model_name();
    let mut stats = EmbedStats {
        total: pending.len(),
        embedded: 0,
    };

    for batch in pending.chunks(config.embedding.batch_size) {
        let texts: Vec<String> = batch.iter().map(|p| p.prototype_text.clone()).collect();

        let vectors = embedding::embed_texts(provider, &config.embedding, &texts)
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "embedding failed at '{}' after {} of {} subgenres: {}",
                    batch[0].label,
                    stats.embedded,
                    stats.total,
                    e
                )
            })?;

        for (item, vec) in batch.iter().zip(vectors.iter()) {
            store
                .store_embedding(item.id, vec, model_name, &item.text_hash)
                .await?;
            tracing::debug!(label = %item.label, dims = vec.len(), "stored embedding");
            stats.embedded += 1;
        }

        progress.report(ProgressEvent {
            stage: Stage::Embedding,
            n: stats.embedded as u64,
            total: stats.total as u64,
        });
    }

    Ok(stats)
}

/// SHA-256 of a prototype text, hex encoded; detects stale embeddings.
pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::classify::load_references;
    use crate::models::SubgenreRecord;
    use crate::progress::NoProgress;
    use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Stand-in for Ollama's `/api/embed`: each text embeds as
    /// `[text length, 1.0]`.
    #[derive(Default)]
    struct FakeOllama {
        batches: Mutex<Vec<usize>>,
        failures_left: AtomicUsize,
        drop_one: bool,
    }

    async fn fake_embed(
        State(fake): State<Arc<FakeOllama>>,
        Json(body): Json<serde_json::Value>,
    ) -> axum::response::Response {
        if fake.failures_left.load(Ordering::SeqCst) > 0 {
            fake.failures_left.fetch_sub(1, Ordering::SeqCst);
            return (StatusCode::INTERNAL_SERVER_ERROR, "model loading").into_response();
        }
        let input: Vec<String> = serde_json::from_value(body["input"].clone()).unwrap();
        fake.batches.lock().unwrap().push(input.len());

        let mut embeddings: Vec<Vec<f64>> =
            input.iter().map(|t| vec![t.len() as f64, 1.0]).collect();
        if fake.drop_one {
            embeddings.pop();
        }
        Json(serde_json::json!({ "model": body["model"], "embeddings": embeddings }))
            .into_response()
    }

    async fn spawn_fake(fake: Arc<FakeOllama>) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new()
            .route("/api/embed", post(fake_embed))
            .with_state(fake);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    /// A migrated store holding three unembedded subgenres, configured to
    /// embed through `url` two texts at a time.
    async fn setup(url: &str, extra: &str) -> (TempDir, Config) {
        let tmp = TempDir::new().unwrap();
        let cfg: Config = toml::from_str(&format!(
            "[db]\npath = \"{}\"\n\n[embedding]\nprovider = \"ollama\"\nmodel = \"fake-embed\"\n\
             url = \"{}\"\nbatch_size = 2\ntimeout_secs = 5\n{}",
            tmp.path().join("subgenres.db").display(),
            url,
            extra
        ))
        .unwrap();
        crate::migrate::run_migrations(&cfg).await.unwrap();

        let store = SqliteStore::new(db::connect_existing(&cfg).await.unwrap());
        store
            .insert_records(
                &[
                    SubgenreRecord::new("Crime", "Noir", "Crime - Noir"),
                    SubgenreRecord::new("Crime", "Heist", "Crime - Heist caper"),
                    SubgenreRecord::new("Romance", "Regency", "Romance - Regency"),
                ],
                false,
                None,
            )
            .await
            .unwrap();
        store.close().await;
        (tmp, cfg)
    }

    async fn pending_for(cfg: &Config, model: &str) -> usize {
        let store = SqliteStore::new(db::connect_existing(cfg).await.unwrap());
        let n = store.pending_embeddings(model, None).await.unwrap().len();
        store.close().await;
        n
    }

    #[test]
    fn test_hash_text_stable() {
        assert_eq!(hash_text("noir"), hash_text("noir"));
        assert_ne!(hash_text("noir"), hash_text("Noir"));
        assert_eq!(hash_text("").len(), 64);
    }

    #[tokio::test]
    async fn test_embed_pending_stores_vectors_in_batches() {
        let fake = Arc::new(FakeOllama::default());
        let url = spawn_fake(fake.clone()).await;
        let (_tmp, cfg) = setup(&url, "").await;

        let stats = embed_pending(&cfg, None, &NoProgress).await.unwrap();
        assert_eq!(stats, EmbedStats { total: 3, embedded: 3 });
        assert_eq!(*fake.batches.lock().unwrap(), vec![2, 1]);

        let refs = load_references(&cfg).await.unwrap();
        assert_eq!(refs.len(), 3);
        for entry in &refs {
            assert_eq!(entry.vector, vec![entry.prototype_text.len() as f64, 1.0]);
        }

        // Model and text hash were recorded with each vector.
        assert_eq!(pending_for(&cfg, "fake-embed").await, 0);
        assert_eq!(pending_for(&cfg, "other-model").await, 3);

        let again = embed_pending(&cfg, None, &NoProgress).await.unwrap();
        assert_eq!(again, EmbedStats::default());
        assert_eq!(fake.batches.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_embed_pending_respects_limit() {
        let fake = Arc::new(FakeOllama::default());
        let url = spawn_fake(fake.clone()).await;
        let (_tmp, cfg) = setup(&url, "").await;

        let stats = embed_pending(&cfg, Some(1), &NoProgress).await.unwrap();
        assert_eq!(stats, EmbedStats { total: 1, embedded: 1 });
        assert_eq!(pending_for(&cfg, "fake-embed").await, 2);
    }

    #[tokio::test]
    async fn test_embed_rebuild_reembeds_everything() {
        let fake = Arc::new(FakeOllama::default());
        let url = spawn_fake(fake.clone()).await;
        let (_tmp, cfg) = setup(&url, "").await;
        embed_pending(&cfg, None, &NoProgress).await.unwrap();

        let (cleared, stats) = embed_rebuild(&cfg, &NoProgress).await.unwrap();
        assert_eq!(cleared, 3);
        assert_eq!(stats, EmbedStats { total: 3, embedded: 3 });
        assert_eq!(*fake.batches.lock().unwrap(), vec![2, 1, 2, 1]);
        assert_eq!(load_references(&cfg).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_vector_count_mismatch_stores_nothing() {
        let fake = Arc::new(FakeOllama {
            drop_one: true,
            ..FakeOllama::default()
        });
        let url = spawn_fake(fake).await;
        let (_tmp, cfg) = setup(&url, "").await;

        let err = embed_pending(&cfg, None, &NoProgress).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("vectors for"), "{}", msg);
        assert!(msg.contains("after 0 of 3"), "{}", msg);
        assert_eq!(pending_for(&cfg, "fake-embed").await, 3);
    }

    #[tokio::test]
    async fn test_wrong_dimensions_rejected() {
        let url = spawn_fake(Arc::new(FakeOllama::default())).await;
        let (_tmp, cfg) = setup(&url, "dims = 3\n").await;

        let err = embed_pending(&cfg, None, &NoProgress).await.unwrap_err();
        assert!(err.to_string().contains("expected 3"), "{}", err);
        assert_eq!(pending_for(&cfg, "fake-embed").await, 3);
    }

    #[tokio::test]
    async fn test_server_error_retried_only_when_configured() {
        let fake = Arc::new(FakeOllama::default());
        fake.failures_left.store(1, Ordering::SeqCst);
        let url = spawn_fake(fake.clone()).await;
        let (_tmp, cfg) = setup(&url, "").await;

        let err = embed_pending(&cfg, None, &NoProgress).await.unwrap_err();
        assert!(err.to_string().contains("Ollama API error 500"), "{}", err);

        fake.failures_left.store(1, Ordering::SeqCst);
        let (_tmp, cfg) = setup(&url, "max_retries = 1\n").await;
        let stats = embed_pending(&cfg, None, &NoProgress).await.unwrap();
        assert_eq!(stats.embedded, 3);
    }
}
