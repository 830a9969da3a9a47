//! Vector index over one named collection.
//!
//! [`VectorIndex`] keeps the collection's vector size in step with the active
//! embedder, embeds and upserts chunks, and answers thresholded similarity
//! queries. Storage is delegated to a [`VectorBackend`]: a Qdrant server or
//! an embedded SQLite database.
pub mod qdrant;
pub mod sqlite;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{IndexBackend, IndexConfig, PointIdStrategy};
use crate::embedder::{Embedder, EmbedderError};
use crate::ingest::Chunk;

pub use qdrant::QdrantBackend;
pub use sqlite::SqliteBackend;

/// Flat JSON payload stored with each point.
pub type Payload = Map<String, Value>;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("vector store unreachable: {0}")]
    Connectivity(String),

    #[error("vector store returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("payload encoding failed: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("invalid vector store response: {0}")]
    InvalidResponse(String),

    #[error("vector has {actual} dimensions, collection expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("collection {0} does not exist")]
    MissingCollection(String),
}

impl From<reqwest::Error> for IndexError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Http {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            Self::Connectivity(err.to_string())
        }
    }
}

/// A vector with its id and payload, ready to store.
#[derive(Debug, Clone)]
pub struct Point {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: Payload,
}

/// A stored point returned by a backend search.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: Payload,
}

/// One search result as handed to the chat layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub content: String,
    /// Payload without `content`.
    pub metadata: Payload,
    pub score: f32,
}

impl From<ScoredPoint> for SearchHit {
    fn from(point: ScoredPoint) -> Self {
        let mut metadata = point.payload;
        let content = match metadata.remove("content") {
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => String::new(),
        };
        Self {
            content,
            metadata,
            score: point.score,
        }
    }
}

/// What a backend knows about an existing collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDescription {
    pub dimension: usize,
    pub points_count: u64,
    pub status: String,
    /// Points carry several named vectors instead of one unnamed vector.
    /// Such a collection cannot take the points this index writes.
    pub named_vectors: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub points_count: u64,
    pub dimension: usize,
    pub status: String,
}

/// Result of [`VectorIndex::info`]. Never an error: an unreachable backend or
/// a missing collection is reported as `Degraded`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum CollectionStatus {
    Ready(CollectionInfo),
    Degraded { name: String, reason: String },
}

impl CollectionStatus {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

/// Transition taken by [`VectorIndex::ensure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Created,
    Recreated { from: usize, to: usize },
    Unchanged,
}

/// Storage operations a vector index needs.
pub trait VectorBackend: Send + Sync {
    /// `None` when the collection does not exist.
    fn describe(&self, name: &str) -> Result<Option<CollectionDescription>, IndexError>;

    /// Create a cosine-distance collection of `dimension`-sized vectors.
    fn create_collection(&self, name: &str, dimension: usize) -> Result<(), IndexError>;

    /// Remove the collection and all its points. Absent collections are fine.
    fn delete_collection(&self, name: &str) -> Result<(), IndexError>;

    /// Insert or replace points by id.
    fn upsert(&self, name: &str, points: &[Point]) -> Result<(), IndexError>;

    /// Points with `score >= score_threshold`, best first, at most `limit`.
    fn search(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredPoint>, IndexError>;
}

pub const DEFAULT_UPSERT_BATCH_SIZE: usize = 64;

pub struct VectorIndex {
    backend: Arc<dyn VectorBackend>,
    embedder: Arc<dyn Embedder>,
    collection: String,
    id_strategy: PointIdStrategy,
    upsert_batch_size: usize,
}

impl VectorIndex {
    /// Bind to `collection`, creating or repairing it for the embedder's
    /// vector size.
    pub fn new(
        backend: Arc<dyn VectorBackend>,
        embedder: Arc<dyn Embedder>,
        collection: impl Into<String>,
    ) -> Result<Self, IndexError> {
        let index = Self {
            backend,
            embedder,
            collection: collection.into(),
            id_strategy: PointIdStrategy::default(),
            upsert_batch_size: DEFAULT_UPSERT_BATCH_SIZE,
        };
        index.ensure()?;
        Ok(index)
    }

    /// Build the configured backend and bind to the configured collection.
    pub fn from_config(
        config: &IndexConfig,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, IndexError> {
        let backend: Arc<dyn VectorBackend> = match config.backend {
            IndexBackend::Qdrant => Arc::new(QdrantBackend::new(
                &config.qdrant_url(),
                config.api_key.as_deref(),
                Duration::from_secs(config.timeout_secs),
            )?),
            IndexBackend::Sqlite => Arc::new(SqliteBackend::open(&config.db_path)?),
        };
        Ok(Self::new(backend, embedder, config.collection_name.clone())?
            .with_id_strategy(config.id_strategy)
            .with_upsert_batch_size(config.upsert_batch_size))
    }

    #[must_use]
    pub fn with_id_strategy(mut self, id_strategy: PointIdStrategy) -> Self {
        self.id_strategy = id_strategy;
        self
    }

    #[must_use]
    pub fn with_upsert_batch_size(mut self, batch_size: usize) -> Self {
        self.upsert_batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Vector size of the active embedder, and thus of the collection.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.embedder.dimensions()
    }

    #[must_use]
    pub fn id_strategy(&self) -> PointIdStrategy {
        self.id_strategy
    }

    /// Make sure the collection exists with the embedder's vector size.
    ///
    /// A collection of any other size is deleted and recreated empty.
    pub fn ensure(&self) -> Result<EnsureOutcome, IndexError> {
        let expected = self.embedder.dimensions();

        match self.backend.describe(&self.collection)? {
            None => {
                info!(
                    "Creating collection {} ({expected} dimensions)",
                    self.collection
                );
                self.backend.create_collection(&self.collection, expected)?;
                Ok(EnsureOutcome::Created)
            }
            Some(desc) if desc.dimension == expected && !desc.named_vectors => {
                debug!(
                    "Collection {} ready: {} points, {expected} dimensions",
                    self.collection, desc.points_count
                );
                Ok(EnsureOutcome::Unchanged)
            }
            Some(desc) => {
                if desc.named_vectors {
                    warn!(
                        "Collection {} uses named vectors; \
                         recreating it with a single vector and discarding {} points",
                        self.collection, desc.points_count
                    );
                } else {
                    warn!(
                        "Collection {} has vector size {} but the embedder produces {expected}; \
                         recreating it and discarding {} points",
                        self.collection, desc.dimension, desc.points_count
                    );
                }
                self.backend.delete_collection(&self.collection)?;
                self.backend.create_collection(&self.collection, expected)?;
                Ok(EnsureOutcome::Recreated {
                    from: desc.dimension,
                    to: expected,
                })
            }
        }
    }

    /// Embed and store chunks in batches.
    ///
    /// Embedding failures are returned as errors. Storage failures are logged
    /// and reported as `Ok(false)`; batches written before the failure stay.
    pub fn add_documents(&self, chunks: &[Chunk]) -> Result<bool, EmbedderError> {
        if chunks.is_empty() {
            return Ok(true);
        }

        for batch in chunks.chunks(self.upsert_batch_size) {
            let texts: Vec<&str> = batch.iter().map(|c| c.content.as_str()).collect();
            let vectors = self.embedder.embed_batch(&texts)?;
            if vectors.len() != batch.len() {
                return Err(EmbedderError::InvalidResponse(format!(
                    "got {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                )));
            }

            let points: Vec<Point> = batch
                .iter()
                .zip(vectors)
                .map(|(chunk, vector)| Point {
                    id: self.point_id(chunk),
                    vector,
                    payload: chunk.payload(),
                })
                .collect();

            if !self.upsert(&points) {
                return Ok(false);
            }
        }

        info!(
            "Added {} chunks to collection {}",
            chunks.len(),
            self.collection
        );
        Ok(true)
    }

    /// Store pre-computed points. Returns `false` on any failure.
    pub fn upsert(&self, points: &[Point]) -> bool {
        let expected = self.embedder.dimensions();
        if let Some(bad) = points.iter().find(|p| p.vector.len() != expected) {
            error!(
                "Rejecting upsert into {}: {}",
                self.collection,
                IndexError::DimensionMismatch {
                    expected,
                    actual: bad.vector.len()
                }
            );
            return false;
        }
        if points.is_empty() {
            return true;
        }

        match self.backend.upsert(&self.collection, points) {
            Ok(()) => true,
            Err(e) => {
                error!("Error adding documents to {}: {e}", self.collection);
                false
            }
        }
    }

    /// Similarity search with a pre-computed query vector.
    ///
    /// Hits are sorted by descending score, all at or above `score_threshold`.
    /// Backend failures are logged and give an empty list.
    pub fn search_vector(
        &self,
        vector: &[f32],
        limit: usize,
        score_threshold: f32,
    ) -> Vec<SearchHit> {
        if limit == 0 {
            return Vec::new();
        }

        match self
            .backend
            .search(&self.collection, vector, limit, score_threshold)
        {
            Ok(points) => {
                let mut hits: Vec<SearchHit> = points
                    .into_iter()
                    .filter(|p| p.score >= score_threshold)
                    .map(SearchHit::from)
                    .collect();
                hits.sort_by(|a, b| b.score.total_cmp(&a.score));
                hits.truncate(limit);
                hits
            }
            Err(e) => {
                error!("Error searching {}: {e}", self.collection);
                Vec::new()
            }
        }
    }

    /// Embed `query` and return the closest chunks.
    pub fn search(
        &self,
        query: &str,
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<SearchHit>, EmbedderError> {
        let vector = self.embedder.embed(query)?;
        Ok(self.search_vector(&vector, limit, score_threshold))
    }

    pub fn info(&self) -> CollectionStatus {
        match self.backend.describe(&self.collection) {
            Ok(Some(desc)) => CollectionStatus::Ready(CollectionInfo {
                name: self.collection.clone(),
                points_count: desc.points_count,
                dimension: desc.dimension,
                status: desc.status,
            }),
            Ok(None) => CollectionStatus::Degraded {
                name: self.collection.clone(),
                reason: IndexError::MissingCollection(self.collection.clone()).to_string(),
            },
            Err(e) => {
                warn!("Error getting collection info for {}: {e}", self.collection);
                CollectionStatus::Degraded {
                    name: self.collection.clone(),
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Delete every point by dropping the collection and creating it again
    /// at the embedder's vector size.
    pub fn drop_and_recreate(&self) -> Result<(), IndexError> {
        if self.backend.describe(&self.collection)?.is_some() {
            self.backend.delete_collection(&self.collection)?;
        }
        self.backend
            .create_collection(&self.collection, self.embedder.dimensions())?;
        info!("Collection {} reset", self.collection);
        Ok(())
    }

    /// Remove the collection. Later writes fail until [`Self::ensure`] runs.
    pub fn delete_collection(&self) -> Result<(), IndexError> {
        self.backend.delete_collection(&self.collection)?;
        info!("Deleted collection {}", self.collection);
        Ok(())
    }

    fn point_id(&self, chunk: &Chunk) -> Uuid {
        match self.id_strategy {
            PointIdStrategy::Random => Uuid::new_v4(),
            PointIdStrategy::Deterministic => {
                let key = format!("{}#{}", chunk.metadata.source, chunk.metadata.chunk_index);
                Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes())
            }
        }
    }
}
