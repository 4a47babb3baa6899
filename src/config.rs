//! TOML configuration parsing and validation.
//!
//! ```toml
//! [db]
//! path = "./data/chx.sqlite"
//!
//! [source]
//! host = "https://bluebubbles.local:1234"
//! password_env = "BLUEBUBBLES_PASSWORD"
//!
//! [ingest]
//! page_size = 1000
//! blob_size = 1000
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Connection settings for the messaging source.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub host: String,
    /// Inline password. Prefer `password_env`.
    #[serde(default)]
    pub password: Option<String>,
    /// Name of the environment variable holding the password.
    #[serde(default)]
    pub password_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl SourceConfig {
    /// Resolve the password from the inline value or the environment.
    pub fn resolve_password(&self) -> Result<String> {
        if let Some(ref var) = self.password_env {
            return std::env::var(var)
                .with_context(|| format!("source password variable {} is not set", var));
        }
        self.password
            .clone()
            .ok_or_else(|| anyhow::anyhow!("source.password or source.password_env is required"))
    }

    /// Base URL with a scheme, without a trailing slash.
    pub fn base_url(&self) -> String {
        let host = self.host.trim().trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_blob_size")]
    pub blob_size: usize,
    /// Stop after this many contacts. `0` means no limit.
    #[serde(default)]
    pub contact_limit: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            blob_size: default_blob_size(),
            contact_limit: 0,
        }
    }
}

fn default_page_size() -> usize {
    1000
}
fn default_blob_size() -> usize {
    crate::chunk::BLOB_SIZE
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Fixed at [`EMBEDDING_DIMS`](crate::models::EMBEDDING_DIMS); other values are rejected.
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Endpoint override; defaults depend on the provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: default_dims(),
            url: None,
            timeout_secs: default_embed_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_dims() -> usize {
    crate::models::EMBEDDING_DIMS
}
fn default_embed_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            candidate_limit: default_candidate_limit(),
        }
    }
}

fn default_candidate_limit() -> i64 {
    50
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.source.host.trim().is_empty() {
        anyhow::bail!("source.host must not be empty");
    }
    if config.source.password.is_none() && config.source.password_env.is_none() {
        anyhow::bail!("source.password or source.password_env must be set");
    }
    if config.ingest.page_size == 0 {
        anyhow::bail!("ingest.page_size must be > 0");
    }
    if config.ingest.blob_size == 0 {
        anyhow::bail!("ingest.blob_size must be > 0");
    }
    if config.retrieval.candidate_limit < 1 {
        anyhow::bail!("retrieval.candidate_limit must be >= 1");
    }
    if config.embedding.dims != crate::models::EMBEDDING_DIMS {
        anyhow::bail!(
            "embedding.dims must be {} (got {})",
            crate::models::EMBEDDING_DIMS,
            config.embedding.dims
        );
    }

    match config.embedding.provider.as_str() {
        "disabled" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
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

    const MINIMAL: &str = r#"
[db]
path = "./data/chx.sqlite"

[source]
host = "bb.local:1234"
password = "secret"
"#;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = parse(MINIMAL).unwrap();
        assert_eq!(config.ingest.page_size, 1000);
        assert_eq!(config.ingest.blob_size, 1000);
        assert_eq!(config.embedding.dims, 1536);
        assert!(!config.embedding.is_enabled());
        assert_eq!(config.source.base_url(), "https://bb.local:1234");
        assert_eq!(config.source.resolve_password().unwrap(), "secret");
    }

    #[test]
    fn rejects_zero_page_size() {
        let src = format!("{}\n[ingest]\npage_size = 0\n", MINIMAL);
        let err = parse(&src).unwrap_err();
        assert!(err.to_string().contains("page_size"));
    }

    #[test]
    fn rejects_missing_password() {
        let src = r#"
[db]
path = "x.sqlite"

[source]
host = "http://bb.local/"
"#;
        assert!(parse(src).is_err());
    }

    #[test]
    fn rejects_unknown_embedding_provider() {
        let src = format!("{}\n[embedding]\nprovider = \"magic\"\n", MINIMAL);
        assert!(parse(&src).is_err());
    }

    #[test]
    fn rejects_non_standard_embedding_dims() {
        let src = format!("{}\n[embedding]\ndims = 768\n", MINIMAL);
        let err = parse(&src).unwrap_err();
        assert!(err.to_string().contains("embedding.dims must be 1536"));

        let src = format!("{}\n[embedding]\ndims = 1536\n", MINIMAL);
        assert!(parse(&src).is_ok());
    }

    #[test]
    fn base_url_keeps_explicit_scheme() {
        let mut config = parse(MINIMAL).unwrap();
        config.source.host = "http://localhost:1234/".into();
        assert_eq!(config.source.base_url(), "http://localhost:1234");
    }
}
