//! Document ingestion: chunking, PDF/JSON extraction, and the pipeline that
//! feeds the vector index.

pub mod chunker;
pub mod extractor;
pub mod pipeline;

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use chunker::{Chunker, ChunkerError, chunk_text};
pub use extractor::{DirectoryChunks, DocumentProcessor, ExtractionError};
pub use pipeline::{IngestReport, IngestionPipeline, IngestionStatus};

/// Source format a chunk was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Json,
}

impl DocumentKind {
    /// Classify a path by extension, case-insensitively.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Json => "json",
        }
    }
}

/// Provenance carried by every chunk and copied into the point payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Origin file path.
    pub source: String,
    #[serde(rename = "type")]
    pub kind: DocumentKind,
    /// Position within the source's chunk sequence.
    pub chunk_index: usize,
    /// PDF only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<usize>,
}

/// A bounded piece of extracted document text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub metadata: ChunkMetadata,
    /// `{file_stem}_{chunk_index}`; unique within one file only.
    pub chunk_id: String,
}

impl Chunk {
    /// Build the chunks of one source file from its already-split texts.
    pub(crate) fn sequence(
        path: &Path,
        kind: DocumentKind,
        total_pages: Option<usize>,
        texts: Vec<String>,
    ) -> Vec<Chunk> {
        let source = path.to_string_lossy().to_string();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        texts
            .into_iter()
            .enumerate()
            .map(|(idx, content)| Chunk {
                content,
                metadata: ChunkMetadata {
                    source: source.clone(),
                    kind,
                    chunk_index: idx,
                    total_pages,
                },
                chunk_id: format!("{stem}_{idx}"),
            })
            .collect()
    }

    /// Flat point payload: `content`, `chunk_id`, then the metadata fields.
    #[must_use]
    pub fn payload(&self) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("content".to_string(), Value::String(self.content.clone()));
        payload.insert("chunk_id".to_string(), Value::String(self.chunk_id.clone()));
        if let Ok(Value::Object(meta)) = serde_json::to_value(&self.metadata) {
            payload.extend(meta);
        }
        payload
    }
}
