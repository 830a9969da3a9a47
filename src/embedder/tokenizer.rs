/// BERT tokenizer wrapper around HuggingFace `tokenizers` crate.
///
/// Provides tokenization with attention masks for the ONNX embedder.
use std::path::Path;

use anyhow::Result;
use tokenizers::{Encoding, PaddingParams, Tokenizer, TruncationParams};

/// Sequence length all-MiniLM-L6-v2 was trained with.
pub const DEFAULT_MAX_LENGTH: usize = 256;

/// Wrapper around the HuggingFace tokenizer for BERT-style models.
pub struct BertTokenizer {
    inner: Tokenizer,
    max_length: usize,
}

/// Output of a tokenization operation.
#[derive(Debug, Clone)]
pub struct TokenizerOutput {
    /// Token IDs (input_ids for the model).
    pub input_ids: Vec<i64>,
    /// Attention mask (1 for real tokens, 0 for padding).
    pub attention_mask: Vec<i64>,
}

impl From<&Encoding> for TokenizerOutput {
    fn from(enc: &Encoding) -> Self {
        Self {
            input_ids: enc.get_ids().iter().map(|&id| i64::from(id)).collect(),
            attention_mask: enc
                .get_attention_mask()
                .iter()
                .map(|&m| i64::from(m))
                .collect(),
        }
    }
}

impl BertTokenizer {
    /// Load `tokenizer.json` from the model directory, truncating at
    /// [`DEFAULT_MAX_LENGTH`] tokens.
    pub fn from_model_dir(model_dir: &Path) -> Result<Self> {
        Self::with_max_length(model_dir, DEFAULT_MAX_LENGTH)
    }

    /// Load `tokenizer.json` with an explicit truncation length.
    pub fn with_max_length(model_dir: &Path, max_length: usize) -> Result<Self> {
        let tokenizer_path = model_dir.join("tokenizer.json");

        anyhow::ensure!(
            tokenizer_path.exists(),
            "tokenizer.json not found in {}",
            model_dir.display()
        );
        anyhow::ensure!(max_length > 0, "max_length must be positive");

        let mut inner = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;

        inner
            .with_truncation(Some(TruncationParams {
                max_length,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("failed to configure truncation: {e}"))?;

        // Pad batches to their longest member
        inner.with_padding(Some(PaddingParams::default()));

        Ok(Self { inner, max_length })
    }

    /// Tokenize a single text, returning input IDs and attention mask.
    pub fn tokenize(&self, text: &str) -> Result<TokenizerOutput> {
        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("failed to encode text: {e}"))?;
        Ok(TokenizerOutput::from(&encoding))
    }

    /// Tokenize multiple texts in a batch.
    pub fn tokenize_batch(&self, texts: &[&str]) -> Result<Vec<TokenizerOutput>> {
        let encodings = self
            .inner
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("failed to encode batch: {e}"))?;
        Ok(encodings.iter().map(TokenizerOutput::from).collect())
    }

    /// Get the vocabulary size.
    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(false)
    }

    /// Get the configured maximum sequence length.
    #[must_use]
    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenizer_missing_file() {
        let result = BertTokenizer::from_model_dir(Path::new("/nonexistent/path"));
        assert!(result.is_err());
    }

    /// Run with: cargo test tokenizer -- --ignored
    #[test]
    #[ignore]
    fn test_tokenize_batch_with_real_model() {
        let model_dir = Path::new("models/all-MiniLM-L6-v2");
        if !model_dir.join("tokenizer.json").exists() {
            return;
        }

        let tokenizer = BertTokenizer::from_model_dir(model_dir).unwrap();
        let outputs = tokenizer
            .tokenize_batch(&["Hello", "a somewhat longer sentence"])
            .unwrap();

        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].input_ids.len(), outputs[1].input_ids.len());
        assert!(outputs[0].attention_mask.contains(&0), "short row is padded");
        assert_eq!(tokenizer.max_length(), DEFAULT_MAX_LENGTH);
    }
}
