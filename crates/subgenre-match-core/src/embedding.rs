//! Embedding provider trait and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] trait that embedding backends
//! implement, plus pure helpers for parsing stored vectors and computing
//! similarity.
//!
//! Concrete providers (Ollama) live in the `subgenre-match` app crate.

use crate::error::MatchError;

/// Trait for embedding providers.
///
/// Implementations are created by the application; the core only needs
/// their metadata.
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"snowflake-arctic-embed"`).
    fn model_name(&self) -> &str;
}

/// Parse a stored embedding (a JSON array of numbers) into a vector.
///
/// # Example
///
/// ```rust
/// use subgenre_match_core::embedding::parse_vector;
///
/// assert_eq!(parse_vector("[1, 0.5, -2]").unwrap(), vec![1.0, 0.5, -2.0]);
/// assert!(parse_vector("[1, \"x\"]").is_err());
/// ```
pub fn parse_vector(text: &str) -> Result<Vec<f64>, serde_json::Error> {
    serde_json::from_str(text)
}

/// Encode a vector as the JSON array text stored alongside reference entries.
pub fn format_vector(vector: &[f64]) -> String {
    serde_json::to_string(vector).unwrap_or_else(|_| "[]".to_string())
}

/// Compute cosine similarity between two vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal, or either vector is all zeros
/// - `-1.0` = opposite direction
///
/// # Errors
///
/// [`MatchError::DimensionMismatch`] when the lengths differ.
///
/// # Formula
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> Result<f64, MatchError> {
    if a.len() != b.len() {
        return Err(MatchError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let norm_a = norm_a.sqrt();
    let norm_b = norm_b.sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    Ok(dot / (norm_a * norm_b))
}
