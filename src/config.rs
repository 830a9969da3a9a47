/// Configuration module for docrag.
///
/// Handles loading, validating, and providing default configuration values.
/// Values come from a JSON file first and can then be overridden from
/// environment variables through an injected lookup.
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Default configuration file name.
pub const DEFAULT_CONFIG_PATH: &str = "docrag.json";

// ── Default value functions ──────────────────────────────────────────

fn default_documents_path() -> String {
    "./documents".to_string()
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_embedding_model() -> String {
    "text-embedding-ada-002".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_batch_size() -> usize {
    64
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_model_dir() -> String {
    "models/all-MiniLM-L6-v2".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    6333
}

fn default_collection_name() -> String {
    "documents".to_string()
}

fn default_db_path() -> String {
    "./vectors.db".to_string()
}

fn default_search_limit() -> usize {
    5
}

fn default_score_threshold() -> f32 {
    0.5
}

// ── Enumerated options ───────────────────────────────────────────────

/// Which embedding implementation backs the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local sentence-embedding model run through ONNX Runtime.
    #[default]
    Local,
    /// OpenAI-compatible embeddings API.
    OpenAi,
}

/// Where the vector collection lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    /// Qdrant server reached over its REST API.
    #[default]
    Qdrant,
    /// Embedded SQLite database with the sqlite-vec extension.
    Sqlite,
}

/// How point ids are derived when chunks are upserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PointIdStrategy {
    /// Fresh random id per upsert: re-ingestion appends new points.
    #[default]
    Random,
    /// Id derived from `source` and `chunk_index`: re-ingestion overwrites.
    Deterministic,
}

impl FromStr for EmbeddingProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "openai" => Ok(Self::OpenAi),
            other => Err(format!("unknown embedding provider: {other}")),
        }
    }
}

impl FromStr for IndexBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "qdrant" => Ok(Self::Qdrant),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(format!("unknown vector backend: {other}")),
        }
    }
}

impl FromStr for PointIdStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(Self::Random),
            "deterministic" => Ok(Self::Deterministic),
            other => Err(format!("unknown point id strategy: {other}")),
        }
    }
}

impl fmt::Display for EmbeddingProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::OpenAi => f.write_str("openai"),
        }
    }
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_documents_path")]
    pub documents_path: String,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    /// Model identifier sent to the remote API.
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Never written back to disk.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Overrides the output size inferred from the model name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Directory holding `model.onnx` and `tokenizer.json` for the local model.
    #[serde(default = "default_model_dir")]
    pub model_dir: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexConfig {
    #[serde(default)]
    pub backend: IndexBackend,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    /// Database file for the sqlite backend.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default)]
    pub id_strategy: PointIdStrategy,

    #[serde(default = "default_batch_size")]
    pub upsert_batch_size: usize,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_limit")]
    pub limit: usize,

    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            documents_path: default_documents_path(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            embedding: EmbeddingConfig::default(),
            index: IndexConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            model: default_embedding_model(),
            api_key: None,
            base_url: default_base_url(),
            dimensions: None,
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
            model_dir: default_model_dir(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: IndexBackend::default(),
            host: default_host(),
            port: default_port(),
            api_key: None,
            collection_name: default_collection_name(),
            db_path: default_db_path(),
            id_strategy: PointIdStrategy::default(),
            upsert_batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: default_search_limit(),
            score_threshold: default_score_threshold(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to [`DEFAULT_CONFIG_PATH`].
    /// If the file does not exist, returns a default config and generates a
    /// template when the default path was used.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            DEFAULT_CONFIG_PATH
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == DEFAULT_CONFIG_PATH {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config =
            serde_json::from_str(&data).with_context(|| format!("invalid JSON in {path}"))?;

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file. Secrets are skipped.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Override values from environment-style variables.
    ///
    /// `lookup` is usually `|k| std::env::var(k).ok()`; empty values count as
    /// unset. Unparseable values are reported as errors.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("DOCUMENTS_PATH") {
            self.documents_path = v;
        }
        if let Some(v) = parse_var(&get, "CHUNK_SIZE")? {
            self.chunk_size = v;
        }
        if let Some(v) = parse_var(&get, "CHUNK_OVERLAP")? {
            self.chunk_overlap = v;
        }

        if let Some(v) = parse_var(&get, "EMBEDDING_PROVIDER")? {
            self.embedding.provider = v;
        }
        if let Some(v) = get("EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Some(v) = parse_var(&get, "EMBEDDING_DIMENSIONS")? {
            self.embedding.dimensions = Some(v);
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.embedding.api_key = Some(v);
        }
        if let Some(v) = get("OPENAI_BASE_URL") {
            self.embedding.base_url = v;
        }

        if let Some(v) = parse_var(&get, "VECTOR_BACKEND")? {
            self.index.backend = v;
        }
        if let Some(v) = get("QDRANT_HOST") {
            self.index.host = v;
        }
        if let Some(v) = parse_var(&get, "QDRANT_PORT")? {
            self.index.port = v;
        }
        if let Some(v) = get("QDRANT_API_KEY") {
            self.index.api_key = Some(v);
        }
        if let Some(v) = get("COLLECTION_NAME") {
            self.index.collection_name = v;
        }
        if let Some(v) = get("VECTOR_DB_PATH") {
            self.index.db_path = v;
        }
        if let Some(v) = parse_var(&get, "POINT_ID_STRATEGY")? {
            self.index.id_strategy = v;
        }

        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.chunk_size > 0, "chunk_size must be positive");
        anyhow::ensure!(
            self.chunk_overlap < self.chunk_size,
            "chunk_overlap ({}) must be smaller than chunk_size ({})",
            self.chunk_overlap,
            self.chunk_size
        );
        anyhow::ensure!(
            self.embedding.batch_size > 0,
            "embedding.batch_size must be positive"
        );
        anyhow::ensure!(
            self.embedding.dimensions != Some(0),
            "embedding.dimensions must be positive"
        );
        anyhow::ensure!(
            self.index.upsert_batch_size > 0,
            "index.upsert_batch_size must be positive"
        );
        anyhow::ensure!(
            !self.index.collection_name.trim().is_empty(),
            "index.collection_name must not be empty"
        );
        anyhow::ensure!(self.search.limit > 0, "search.limit must be positive");
        anyhow::ensure!(
            (-1.0..=1.0).contains(&self.search.score_threshold),
            "search.score_threshold must be within [-1, 1]"
        );
        if self.embedding.provider == EmbeddingProvider::OpenAi {
            anyhow::ensure!(
                self.embedding
                    .api_key
                    .as_deref()
                    .is_some_and(|k| !k.trim().is_empty()),
                "embedding.provider is openai but no API key is set (OPENAI_API_KEY)"
            );
        }
        Ok(())
    }

    /// Documents root as a path.
    #[must_use]
    pub fn documents_dir(&self) -> PathBuf {
        PathBuf::from(&self.documents_path)
    }
}

impl IndexConfig {
    /// Base URL of the Qdrant REST API.
    #[must_use]
    pub fn qdrant_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            format!("{host}:{}", self.port)
        } else {
            format!("http://{host}:{}", self.port)
        }
    }
}

fn parse_var<T, G>(get: &G, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid value for {key} ({raw}): {e}")),
        None => Ok(None),
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.chunk_overlap, 200);
        assert_eq!(config.documents_path, "./documents");
        assert_eq!(config.embedding.provider, EmbeddingProvider::Local);
        assert_eq!(config.embedding.model, "text-embedding-ada-002");
        assert_eq!(config.index.backend, IndexBackend::Qdrant);
        assert_eq!(config.index.port, 6333);
        assert_eq!(config.index.collection_name, "documents");
        assert_eq!(config.index.id_strategy, PointIdStrategy::Random);
        assert_eq!(config.search.limit, 5);
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"{"chunk_size": 500, "index": {"backend": "sqlite", "db_path": "./t.db"}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.index.backend, IndexBackend::Sqlite);
        assert_eq!(config.index.db_path, "./t.db");
        // Other fields should have defaults
        assert_eq!(config.chunk_overlap, 200);
        assert_eq!(config.index.collection_name, "documents");
    }

    #[test]
    fn test_load_missing_custom_path_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.chunk_size, 1000);
        assert!(!path.exists(), "template only written for the default path");
    }

    #[test]
    fn test_load_invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(Config::load(path.to_str().unwrap()).is_err());
    }

    #[test]
    fn test_validate_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_overlap_not_smaller_than_chunk() {
        let mut config = Config::default();
        config.chunk_overlap = config.chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bad_chunk_size() {
        let mut config = Config::default();
        config.chunk_size = 0;
        config.chunk_overlap = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_openai_requires_key() {
        let mut config = Config::default();
        config.embedding.provider = EmbeddingProvider::OpenAi;
        assert!(config.validate().is_err());
        config.embedding.api_key = Some("sk-test".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_apply_env_overrides() {
        let vars = env(&[
            ("CHUNK_SIZE", "800"),
            ("CHUNK_OVERLAP", "100"),
            ("EMBEDDING_PROVIDER", "OpenAI"),
            ("OPENAI_API_KEY", "sk-abc"),
            ("QDRANT_HOST", "qdrant.internal"),
            ("QDRANT_PORT", "6334"),
            ("COLLECTION_NAME", "kb"),
            ("POINT_ID_STRATEGY", "deterministic"),
            ("DOCUMENTS_PATH", ""),
        ]);
        let mut config = Config::default();
        config.apply_env(|k| vars.get(k).cloned()).unwrap();

        assert_eq!(config.chunk_size, 800);
        assert_eq!(config.chunk_overlap, 100);
        assert_eq!(config.embedding.provider, EmbeddingProvider::OpenAi);
        assert_eq!(config.embedding.api_key.as_deref(), Some("sk-abc"));
        assert_eq!(config.index.qdrant_url(), "http://qdrant.internal:6334");
        assert_eq!(config.index.collection_name, "kb");
        assert_eq!(config.index.id_strategy, PointIdStrategy::Deterministic);
        // empty values leave the default in place
        assert_eq!(config.documents_path, "./documents");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_apply_env_rejects_garbage() {
        let vars = env(&[("QDRANT_PORT", "not-a-port")]);
        let mut config = Config::default();
        assert!(config.apply_env(|k| vars.get(k).cloned()).is_err());

        let vars = env(&[("VECTOR_BACKEND", "pinecone")]);
        assert!(config.apply_env(|k| vars.get(k).cloned()).is_err());
    }

    #[test]
    fn test_qdrant_url_keeps_scheme() {
        let mut index = IndexConfig::default();
        index.host = "https://cloud.example.com/".to_string();
        assert_eq!(index.qdrant_url(), "https://cloud.example.com:6333");
    }

    #[test]
    fn test_serialization_skips_secrets() {
        let mut config = Config::default();
        config.embedding.api_key = Some("sk-secret".to_string());
        config.index.api_key = Some("qd-secret".to_string());
        let json = serde_json::to_string_pretty(&config).unwrap();
        assert!(!json.contains("secret"));

        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.chunk_size, config.chunk_size);
        assert_eq!(parsed.index.collection_name, config.index.collection_name);
        assert!(parsed.embedding.api_key.is_none());
    }
}
