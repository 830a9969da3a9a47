//! Directory to vector index: extract, chunk, embed, upsert.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{error, info, warn};

use super::chunker::Chunker;
use super::extractor::DocumentProcessor;
use crate::config::Config;
use crate::embedder::{Embedder, EmbedderError};
use crate::index::{CollectionStatus, IndexError, VectorIndex};

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Chunks were produced and all of them were stored.
    pub success: bool,
    pub chunks: usize,
    pub files_seen: usize,
    pub files_extracted: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestionStatus {
    pub collection: CollectionStatus,
    pub documents_path: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

pub struct IngestionPipeline {
    processor: DocumentProcessor,
    index: VectorIndex,
    documents_path: PathBuf,
}

impl IngestionPipeline {
    pub fn new(
        processor: DocumentProcessor,
        index: VectorIndex,
        documents_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            processor,
            index,
            documents_path: documents_path.into(),
        }
    }

    /// Wire chunker, index and documents root from a validated config.
    pub fn from_config(config: &Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let chunker = Chunker::new(config.chunk_size, config.chunk_overlap)
            .context("invalid chunking parameters")?;
        let index = VectorIndex::from_config(&config.index, embedder)
            .context("failed to open vector index")?;
        Ok(Self::new(
            DocumentProcessor::new(chunker),
            index,
            config.documents_dir(),
        ))
    }

    #[must_use]
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    #[must_use]
    pub fn documents_path(&self) -> &Path {
        &self.documents_path
    }

    /// Ingest every supported file under `path`, or the configured root.
    ///
    /// A missing root or an empty result is an unsuccessful report, not an
    /// error. Embedding failures abort the run.
    pub fn process_documents(&self, path: Option<&Path>) -> Result<IngestReport, EmbedderError> {
        let root = path.unwrap_or(&self.documents_path);

        if !root.exists() {
            error!("Documents path {} does not exist", root.display());
            return Ok(IngestReport::default());
        }

        info!("Processing documents from {}", root.display());
        let found = self.processor.process_directory(root);
        let mut report = IngestReport {
            success: false,
            chunks: found.chunks.len(),
            files_seen: found.files_seen,
            files_extracted: found.files_extracted,
            files_skipped: found.files_skipped,
            files_failed: found.files_failed,
        };

        if found.chunks.is_empty() {
            warn!("No documents found to process in {}", root.display());
            return Ok(report);
        }

        info!(
            "Embedding {} chunks from {} files",
            report.chunks, report.files_extracted
        );
        report.success = self.index.add_documents(&found.chunks)?;

        if report.success {
            info!("Successfully processed {} chunks", report.chunks);
        } else {
            error!("Failed to store chunks in {}", self.index.collection());
        }
        Ok(report)
    }

    pub fn status(&self) -> IngestionStatus {
        let chunker = self.processor.chunker();
        IngestionStatus {
            collection: self.index.info(),
            documents_path: self.documents_path.to_string_lossy().to_string(),
            chunk_size: chunker.chunk_size(),
            chunk_overlap: chunker.overlap(),
        }
    }

    /// Delete everything ingested so far.
    pub fn clear(&self) -> Result<(), IndexError> {
        self.index.drop_and_recreate()
    }
}
