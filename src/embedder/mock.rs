/// Mock embedder for testing purposes.
///
/// Generates deterministic unit vectors from text hashes so tests can run
/// without a model or network access.
use std::hash::{DefaultHasher, Hash, Hasher};

use super::{Embedder, EmbedderError};

/// A mock embedder that produces deterministic vectors from text hashes.
///
/// Identical texts map to identical vectors (cosine similarity 1.0);
/// different texts map to roughly orthogonal ones.
pub struct MockEmbedder {
    pub dimensions: usize,
    /// When set, every call fails with this message.
    pub fail_with: Option<String>,
}

impl MockEmbedder {
    /// Create a new `MockEmbedder` with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            fail_with: None,
        }
    }

    /// A mock whose every call returns an inference error.
    #[must_use]
    pub fn failing(dimensions: usize, message: &str) -> Self {
        Self {
            dimensions,
            fail_with: Some(message.to_string()),
        }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

impl Embedder for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        if let Some(msg) = &self.fail_with {
            return Err(EmbedderError::InferenceFailed(msg.clone()));
        }

        let mut embedding = Vec::with_capacity(self.dimensions);
        for i in 0..self.dimensions {
            let mut hasher = DefaultHasher::new();
            text.hash(&mut hasher);
            i.hash(&mut hasher);
            let unit = hasher.finish() as f64 / u64::MAX as f64;
            embedding.push((unit * 2.0 - 1.0) as f32);
        }

        // L2 normalize
        let norm_sq: f32 = embedding.iter().map(|v| v * v).sum();
        if norm_sq > 0.0 {
            let inv = 1.0 / norm_sq.sqrt();
            for v in &mut embedding {
                *v *= inv;
            }
        }

        Ok(embedding)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
