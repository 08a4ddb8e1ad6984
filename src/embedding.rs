//! Embedding provider implementations.
//!
//! Concrete backends for the core
//! [`EmbeddingProvider`](subgenre_match_core::embedding::EmbeddingProvider) trait:
//! - **[`DisabledProvider`]**: returns errors; used when embeddings are not configured.
//! - **[`OllamaProvider`]**: calls a local Ollama instance's `/api/embed` endpoint.
//!
//! Every request runs under the configured timeout. A failed request is a
//! terminal error unless `embedding.max_retries` is raised, in which case
//! transient failures back off exponentially:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::EmbeddingConfig;
pub use subgenre_match_core::embedding::EmbeddingProvider;

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Embed a batch of texts using the configured provider.
///
/// Returns one vector per input text, in input order.
///
/// # Errors
///
/// - `"disabled"` provider: always returns an error.
/// - `"ollama"` provider: connection failures, non-success statuses, a
///   response whose count or dimensionality does not match the request.
pub async fn embed_texts(
    _provider: &dyn EmbeddingProvider,
    config: &EmbeddingConfig,
    texts: &[String],
) -> Result<Vec<Vec<f64>>> {
    let vectors = match config.provider.as_str() {
        "ollama" => embed_ollama(config, texts).await?,
        "disabled" => bail!("Embedding provider is disabled"),
        other => bail!("Unknown embedding provider: {}", other),
    };

    if vectors.len() != texts.len() {
        bail!(
            "Embedding response has {} vectors for {} inputs",
            vectors.len(),
            texts.len()
        );
    }
    if let Some(dims) = config.dims {
        if let Some(v) = vectors.iter().find(|v| v.len() != dims) {
            bail!(
                "Embedding has {} dimensions, expected {} (embedding.dims)",
                v.len(),
                dims
            );
        }
    }

    Ok(vectors)
}

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
pub struct DisabledProvider;

impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default:
/// `http://127.0.0.1:11434`). Requires Ollama to be running with the model
/// pulled (e.g. `ollama pull snowflake-arctic-embed`).
pub struct OllamaProvider {
    model: String,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        Ok(Self { model })
    }
}

impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f64>>,
}

/// Outcome of one `/api/embed` call.
enum Attempt {
    Done(Vec<Vec<f64>>),
    Retry(anyhow::Error),
}

/// Delay before retry number `retry` (1-based): 1s doubling, capped at 32s.
fn backoff(retry: u32) -> Duration {
    Duration::from_secs(1 << (retry - 1).min(5))
}

async fn embed_ollama(config: &EmbeddingConfig, texts: &[String]) -> Result<Vec<Vec<f64>>> {
    let model = config
        .model
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("embedding.model required"))?;
    let base = config
        .url
        .as_deref()
        .unwrap_or(DEFAULT_OLLAMA_URL)
        .trim_end_matches('/');

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    let request = EmbedRequest { model, input: texts };

    let mut retry = 0;
    loop {
        match post_embed(&client, base, &request).await? {
            Attempt::Done(vectors) => return Ok(vectors),
            Attempt::Retry(err) if retry < config.max_retries => {
                retry += 1;
                let delay = backoff(retry);
                tracing::warn!(retry, ?delay, "embedding request failed, retrying: {:#}", err);
                tokio::time::sleep(delay).await;
            }
            Attempt::Retry(err) => return Err(err),
        }
    }
}

/// Send one embed request. Rate limits, server errors, and connection
/// failures come back as [`Attempt::Retry`]; other client errors are
/// terminal.
async fn post_embed(
    client: &reqwest::Client,
    base: &str,
    request: &EmbedRequest<'_>,
) -> Result<Attempt> {
    let response = match client
        .post(format!("{}/api/embed", base))
        .json(request)
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => {
            return Ok(Attempt::Retry(anyhow::anyhow!(
                "Ollama connection error (is Ollama running at {}?): {}",
                base,
                e
            )));
        }
    };

    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if status.is_success() {
        return parse_ollama_response(&body).map(Attempt::Done);
    }

    let err = anyhow::anyhow!("Ollama API error {}: {}", status, body);
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Ok(Attempt::Retry(err))
    } else {
        Err(err)
    }
}

/// Parse the `/api/embed` response body: `{"embeddings": [[...], ...]}`.
fn parse_ollama_response(body: &str) -> Result<Vec<Vec<f64>>> {
    let parsed: EmbedResponse =
        serde_json::from_str(body).context("Invalid Ollama embed response")?;
    Ok(parsed.embeddings)
}

/// Create the appropriate [`EmbeddingProvider`] based on configuration.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "ollama" => Ok(Box::new(OllamaProvider::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}
