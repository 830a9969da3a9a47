//! OpenAI-compatible remote embedding client.
//!
//! Calls fail fast: there is no retry here, callers decide what to do with
//! an [`EmbedderError`].

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Embedder, EmbedderError};

/// Output sizes of the embedding models we know by name.
const KNOWN_MODELS: &[(&str, usize)] = &[
    ("text-embedding-ada-002", 1536),
    ("text-embedding-3-small", 1536),
    ("text-embedding-3-large", 3072),
];

/// Look up the output size of a known model.
#[must_use]
pub fn known_dimensions(model: &str) -> Option<usize> {
    KNOWN_MODELS
        .iter()
        .find(|(name, _)| *name == model)
        .map(|&(_, dims)| dims)
}

/// Blocking embeddings client that talks to OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: usize,
    /// Only sent when the caller asked for a non-default size.
    requested_dimensions: Option<usize>,
    batch_size: usize,
}

impl OpenAiEmbedder {
    /// Builds a new OpenAI embeddings client.
    ///
    /// `dimensions` overrides the size inferred from the model name; one of
    /// the two must be known.
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        dimensions: Option<usize>,
        timeout: Duration,
        batch_size: usize,
    ) -> Result<Self, EmbedderError> {
        if api_key.trim().is_empty() {
            return Err(EmbedderError::Config("missing OpenAI API key".to_string()));
        }
        if model.trim().is_empty() {
            return Err(EmbedderError::Config("missing embedding model name".to_string()));
        }
        let resolved = dimensions.or_else(|| known_dimensions(&model)).ok_or_else(|| {
            EmbedderError::Config(format!(
                "unknown output size for model {model}; set embedding.dimensions"
            ))
        })?;

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|e| EmbedderError::Config(format!("invalid OpenAI API key: {e}")))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        let endpoint = format!("{}/embeddings", base_url.trim_end_matches('/'));
        let requested_dimensions = dimensions.filter(|&d| known_dimensions(&model) != Some(d));

        Ok(Self {
            client,
            endpoint,
            model,
            dimensions: resolved,
            requested_dimensions,
            batch_size: batch_size.max(1),
        })
    }

    /// Maximum batch size configured for this client.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn request(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
            dimensions: self.requested_dimensions,
        };
        debug!("Requesting {} embeddings from {}", inputs.len(), self.endpoint);

        let resp = self.client.post(&self.endpoint).json(&request).send()?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(EmbedderError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbeddingResponse = resp.json()?;
        parsed.into_embeddings(inputs.len(), self.dimensions)
    }
}

impl Embedder for OpenAiEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        self.request(&[text])?
            .pop()
            .ok_or_else(|| EmbedderError::InvalidResponse("empty embedding list".to_string()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            out.extend(self.request(batch)?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl EmbeddingResponse {
    /// Restore input order and check counts and sizes.
    fn into_embeddings(
        mut self,
        expected_len: usize,
        dimensions: usize,
    ) -> Result<Vec<Vec<f32>>, EmbedderError> {
        if self.data.len() != expected_len {
            return Err(EmbedderError::InvalidResponse(format!(
                "API returned {} embeddings for {} inputs",
                self.data.len(),
                expected_len
            )));
        }
        self.data.sort_by_key(|entry| entry.index);
        if let Some(bad) = self.data.iter().find(|d| d.embedding.len() != dimensions) {
            return Err(EmbedderError::InvalidResponse(format!(
                "expected {dimensions}-dimensional vectors, got {}",
                bad.embedding.len()
            )));
        }
        Ok(self.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedder(model: &str, dims: Option<usize>) -> Result<OpenAiEmbedder, EmbedderError> {
        OpenAiEmbedder::new(
            "sk-test".to_string(),
            "https://api.example.com/v1/".to_string(),
            model.to_string(),
            dims,
            Duration::from_secs(5),
            16,
        )
    }

    #[test]
    fn test_known_model_dimensions() {
        assert_eq!(known_dimensions("text-embedding-ada-002"), Some(1536));
        assert_eq!(known_dimensions("text-embedding-3-large"), Some(3072));
        assert_eq!(known_dimensions("mystery"), None);
    }

    #[test]
    fn test_new_resolves_dimensions() {
        let e = embedder("text-embedding-ada-002", None).unwrap();
        assert_eq!(e.dimensions(), 1536);
        assert_eq!(e.endpoint, "https://api.example.com/v1/embeddings");
        assert!(e.requested_dimensions.is_none());

        let e = embedder("text-embedding-3-large", Some(256)).unwrap();
        assert_eq!(e.dimensions(), 256);
        assert_eq!(e.requested_dimensions, Some(256));
    }

    #[test]
    fn test_unknown_model_needs_dimensions() {
        assert!(matches!(
            embedder("in-house-model", None),
            Err(EmbedderError::Config(_))
        ));
        assert_eq!(embedder("in-house-model", Some(768)).unwrap().dimensions(), 768);
    }

    #[test]
    fn test_request_body_shape() {
        let request = EmbeddingRequest {
            model: "text-embedding-ada-002",
            input: &["a", "b"],
            dimensions: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"model": "text-embedding-ada-002", "input": ["a", "b"]})
        );
    }

    #[test]
    fn test_response_reordered_by_index() {
        let body = r#"{"data": [
            {"embedding": [0.0, 1.0], "index": 1},
            {"embedding": [1.0, 0.0], "index": 0}
        ]}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(body).unwrap();
        let vectors = parsed.into_embeddings(2, 2).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_response_count_mismatch() {
        let body = r#"{"data": [{"embedding": [0.5, 0.5], "index": 0}]}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(body).unwrap();
        assert!(matches!(
            parsed.into_embeddings(2, 2),
            Err(EmbedderError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_response_wrong_size() {
        let body = r#"{"data": [{"embedding": [0.5, 0.5, 0.5], "index": 0}]}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(body).unwrap();
        assert!(parsed.into_embeddings(1, 2).is_err());
    }
}
