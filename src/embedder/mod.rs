/// Embedder trait and shared types for text embedding.
///
/// Two production implementations exist: [`openai::OpenAiEmbedder`] for a
/// remote embeddings API and [`onnx::OnnxEmbedder`] for a local
/// sentence-embedding model. [`from_config`] picks one once at startup.
pub mod download;
pub mod mock;
pub mod onnx;
pub mod openai;
pub mod tokenizer;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use crate::config::{EmbeddingConfig, EmbeddingProvider};

/// Errors that can occur during embedding operations.
#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("model load failed: {0}")]
    ModelLoadFailed(String),

    #[error("tokenizer error: {0}")]
    TokenizerError(String),

    #[error("embedding request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("embedding API returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedder misconfigured: {0}")]
    Config(String),
}

/// Trait for text embedding implementations.
///
/// All implementations must be `Send + Sync` to allow concurrent use
/// behind `Arc`.
pub trait Embedder: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;

    /// Embed multiple text strings into vectors, in input order.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError>;

    /// Return the dimensionality of the embedding vectors.
    fn dimensions(&self) -> usize;
}

/// Build the embedder selected by `config.provider`.
///
/// The local provider downloads its model files on first use.
pub fn from_config(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, EmbedderError> {
    match config.provider {
        EmbeddingProvider::OpenAi => {
            let api_key = config
                .api_key
                .clone()
                .ok_or_else(|| EmbedderError::Config("missing OpenAI API key".to_string()))?;
            let embedder = openai::OpenAiEmbedder::new(
                api_key,
                config.base_url.clone(),
                config.model.clone(),
                config.dimensions,
                Duration::from_secs(config.timeout_secs),
                config.batch_size,
            )?;
            info!(
                "Using remote embeddings: {} ({} dimensions)",
                config.model,
                embedder.dimensions()
            );
            Ok(Arc::new(embedder))
        }
        EmbeddingProvider::Local => {
            let model_dir = Path::new(&config.model_dir);
            download::download_model_files(model_dir)
                .map_err(|e| EmbedderError::ModelLoadFailed(format!("{e:#}")))?;
            let embedder = onnx::OnnxEmbedder::new(model_dir)?;
            info!(
                "Using local embeddings from {} ({} dimensions)",
                model_dir.display(),
                embedder.dimensions()
            );
            Ok(Arc::new(embedder))
        }
    }
}
