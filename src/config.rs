use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL of the Ollama server.
    #[serde(default)]
    pub url: Option<String>,
    /// Expected dimensionality; vectors of any other length are rejected.
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            url: None,
            dims: None,
            batch_size: 16,
            max_retries: 0,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    16
}
fn default_timeout_secs() -> u64 {
    30
}

/// What to do with a query record that is missing its vector or has
/// fields of the wrong type.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// Fail the whole run.
    #[default]
    Abort,
    /// Log a warning and drop the record.
    Skip,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct InputConfig {
    #[serde(default)]
    pub on_malformed: MalformedPolicy,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImportConfig {
    #[serde(default = "default_sheet")]
    pub sheet: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            sheet: default_sheet(),
        }
    }
}

fn default_sheet() -> String {
    "subgenres2.0_extendedv3".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8765".to_string()
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    if config.embedding.dims == Some(0) {
        anyhow::bail!("embedding.dims must be > 0 when set");
    }

    if config.embedding.is_enabled() && config.embedding.model.is_none() {
        anyhow::bail!(
            "embedding.model must be specified when provider is '{}'",
            config.embedding.provider
        );
    }

    match config.embedding.provider.as_str() {
        "disabled" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or ollama.",
            other
        ),
    }

    if config.import.sheet.trim().is_empty() {
        anyhow::bail!("import.sheet must not be empty");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_defaults() {
        let cfg = parse("[db]\npath = \"data/subgenres.db\"\n").unwrap();
        assert_eq!(cfg.db.path, PathBuf::from("data/subgenres.db"));
        assert!(!cfg.embedding.is_enabled());
        assert_eq!(cfg.embedding.max_retries, 0);
        assert_eq!(cfg.input.on_malformed, MalformedPolicy::Abort);
        assert_eq!(cfg.import.sheet, "subgenres2.0_extendedv3");
        assert_eq!(cfg.server.bind, "127.0.0.1:8765");
    }

    #[test]
    fn test_skip_policy() {
        let cfg = parse("[db]\npath = \"x.db\"\n[input]\non_malformed = \"skip\"\n").unwrap();
        assert_eq!(cfg.input.on_malformed, MalformedPolicy::Skip);
    }

    #[test]
    fn test_unknown_policy_rejected() {
        assert!(parse("[db]\npath = \"x.db\"\n[input]\non_malformed = \"ignore\"\n").is_err());
    }

    #[test]
    fn test_ollama_requires_model() {
        let err = parse("[db]\npath = \"x.db\"\n[embedding]\nprovider = \"ollama\"\n").unwrap_err();
        assert!(err.to_string().contains("embedding.model"));

        let cfg = parse(
            "[db]\npath = \"x.db\"\n[embedding]\nprovider = \"ollama\"\nmodel = \"snowflake-arctic-embed\"\n",
        )
        .unwrap();
        assert!(cfg.embedding.is_enabled());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let err = parse("[db]\npath = \"x.db\"\n[embedding]\nprovider = \"openai\"\nmodel = \"m\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn test_missing_db_section() {
        assert!(parse("[server]\nbind = \"0.0.0.0:1\"\n").is_err());
    }
}
