/// ONNX Runtime embedder using the `ort` crate.
///
/// Runs a sentence-transformers model (all-MiniLM-L6-v2 by default),
/// applies mean pooling with the attention mask, and L2-normalizes the
/// result.
use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use serde::Deserialize;
use tracing::{info, warn};

use super::tokenizer::{BertTokenizer, TokenizerOutput};
use super::{Embedder, EmbedderError};

/// Output size of all-MiniLM-L6-v2, used when `config.json` is unreadable.
pub const DEFAULT_DIMENSIONS: usize = 384;

#[derive(Deserialize)]
struct ModelConfig {
    hidden_size: usize,
}

/// ONNX-backed embedder implementing the `Embedder` trait.
pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: BertTokenizer,
    dimensions: usize,
}

impl OnnxEmbedder {
    /// Create a new `OnnxEmbedder` by loading a model from the given directory.
    ///
    /// Expects `model.onnx` and `tokenizer.json` in `model_dir`; the
    /// embedding size is read from `config.json` when present.
    pub fn new(model_dir: &Path) -> Result<Self, EmbedderError> {
        let model_path = model_dir.join("model.onnx");

        if !model_path.exists() {
            return Err(EmbedderError::ModelLoadFailed(format!(
                "model.onnx not found in {}",
                model_dir.display()
            )));
        }

        info!("Initializing ONNX Runtime...");

        let session = Session::builder()
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("session builder error: {e}")))?
            .with_intra_threads(4)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("thread config error: {e}")))?
            .commit_from_file(&model_path)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("model load error: {e}")))?;

        let tokenizer = BertTokenizer::from_model_dir(model_dir)
            .map_err(|e| EmbedderError::TokenizerError(format!("{e:#}")))?;

        let dimensions = read_hidden_size(model_dir);
        info!(
            "ONNX model loaded (vocab size: {}, {dimensions} dimensions)",
            tokenizer.vocab_size()
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimensions,
        })
    }

    /// Run one padded batch through the model and pool each row.
    fn infer(&self, batch: &[TokenizerOutput]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let rows = batch.len();
        let seq_len = batch.iter().map(|t| t.input_ids.len()).max().unwrap_or(0);
        if rows == 0 || seq_len == 0 {
            return Ok(vec![vec![0.0; self.dimensions]; rows]);
        }

        let mut input_ids = Vec::with_capacity(rows * seq_len);
        let mut attention_mask = Vec::with_capacity(rows * seq_len);
        for tokens in batch {
            let pad = seq_len - tokens.input_ids.len();
            input_ids.extend_from_slice(&tokens.input_ids);
            input_ids.extend(std::iter::repeat_n(0i64, pad));
            attention_mask.extend_from_slice(&tokens.attention_mask);
            attention_mask.extend(std::iter::repeat_n(0i64, pad));
        }

        // (shape, data) tuples avoid coupling to an ndarray version
        let input_ids_val = Tensor::from_array(([rows, seq_len], input_ids))
            .map_err(|e| EmbedderError::InferenceFailed(format!("input_ids error: {e}")))?;
        let attention_mask_val = Tensor::from_array(([rows, seq_len], attention_mask.clone()))
            .map_err(|e| EmbedderError::InferenceFailed(format!("attention_mask error: {e}")))?;
        let token_type_ids_val = Tensor::from_array(([rows, seq_len], vec![0i64; rows * seq_len]))
            .map_err(|e| EmbedderError::InferenceFailed(format!("token_type_ids error: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| EmbedderError::InferenceFailed(format!("lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_val,
                "attention_mask" => attention_mask_val,
                "token_type_ids" => token_type_ids_val,
            ])
            .map_err(|e| EmbedderError::InferenceFailed(format!("inference failed: {e}")))?;

        // shape [rows, seq_len, hidden_size]
        let (_shape, hidden_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("output extraction: {e}")))?;

        let row_len = seq_len * self.dimensions;
        if hidden_data.len() != rows * row_len {
            return Err(EmbedderError::InferenceFailed(format!(
                "unexpected output size {} for {rows}x{seq_len}x{}",
                hidden_data.len(),
                self.dimensions
            )));
        }

        Ok((0..rows)
            .map(|r| {
                let hidden = &hidden_data[r * row_len..(r + 1) * row_len];
                let mask = &attention_mask[r * seq_len..(r + 1) * seq_len];
                l2_normalize(&mean_pooling(hidden, mask, seq_len, self.dimensions))
            })
            .collect())
    }
}

impl Embedder for OnnxEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let tokens = self
            .tokenizer
            .tokenize(text)
            .map_err(|e| EmbedderError::TokenizerError(format!("{e:#}")))?;
        self.infer(std::slice::from_ref(&tokens))?
            .pop()
            .ok_or_else(|| EmbedderError::InferenceFailed("no output row".to_string()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let tokens = self
            .tokenizer
            .tokenize_batch(texts)
            .map_err(|e| EmbedderError::TokenizerError(format!("{e:#}")))?;
        self.infer(&tokens)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Read `hidden_size` from the model's `config.json`.
fn read_hidden_size(model_dir: &Path) -> usize {
    let path = model_dir.join("config.json");
    let parsed = std::fs::read_to_string(&path)
        .ok()
        .and_then(|data| serde_json::from_str::<ModelConfig>(&data).ok());
    match parsed {
        Some(cfg) if cfg.hidden_size > 0 => cfg.hidden_size,
        _ => {
            warn!(
                "Could not read hidden_size from {}, assuming {DEFAULT_DIMENSIONS}",
                path.display()
            );
            DEFAULT_DIMENSIONS
        }
    }
}

/// Mean pooling over hidden states weighted by attention mask.
///
/// `hidden_data` is a flat array with shape `[seq_len, hidden_size]`.
fn mean_pooling(
    hidden_data: &[f32],
    attention_mask: &[i64],
    seq_len: usize,
    hidden_size: usize,
) -> Vec<f32> {
    let mut result = vec![0.0f32; hidden_size];
    let mut mask_sum: f32 = 0.0;

    for t in 0..seq_len {
        let mask = attention_mask[t] as f32;
        mask_sum += mask;

        for h in 0..hidden_size {
            result[h] += hidden_data[t * hidden_size + h] * mask;
        }
    }

    if mask_sum > 0.0 {
        for v in &mut result {
            *v /= mask_sum;
        }
    }

    result
}

/// L2-normalize a vector, returning the normalized copy.
fn l2_normalize(vec: &[f32]) -> Vec<f32> {
    let norm_sq: f32 = vec.iter().map(|v| v * v).sum();
    if norm_sq == 0.0 {
        return vec.to_vec();
    }

    let inv_norm = 1.0 / norm_sq.sqrt();
    vec.iter().map(|v| v * inv_norm).collect()
}
