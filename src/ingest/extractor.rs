//! PDF and JSON text extraction.
//!
//! Every failure is contained per file: it is logged and the file yields no
//! chunks, so one bad document never stops a directory run.
use std::fs;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use lopdf::Document;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::chunker::Chunker;
use super::{Chunk, DocumentKind};

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("unreadable PDF {path}: {source}")]
    Pdf {
        path: PathBuf,
        source: lopdf::Error,
    },
}

/// Result of walking a directory.
#[derive(Debug, Default)]
pub struct DirectoryChunks {
    pub chunks: Vec<Chunk>,
    pub files_seen: usize,
    pub files_extracted: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
}

/// Turns source files into chunks.
#[derive(Debug, Clone, Copy)]
pub struct DocumentProcessor {
    chunker: Chunker,
}

impl DocumentProcessor {
    pub fn new(chunker: Chunker) -> Self {
        Self { chunker }
    }

    #[must_use]
    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    /// Chunks of one PDF file; empty on any failure.
    pub fn process_pdf(&self, path: &Path) -> Vec<Chunk> {
        self.extract_or_log(path, DocumentKind::Pdf)
    }

    /// Chunks of one JSON file; empty on any failure.
    pub fn process_json(&self, path: &Path) -> Vec<Chunk> {
        self.extract_or_log(path, DocumentKind::Json)
    }

    /// Dispatch on extension. Unsupported files yield `None`.
    pub fn process_file(&self, path: &Path) -> Option<Vec<Chunk>> {
        DocumentKind::from_path(path).map(|kind| self.extract_or_log(path, kind))
    }

    /// Recursively chunk every `.pdf` and `.json` file under `root`.
    pub fn process_directory(&self, root: &Path) -> DirectoryChunks {
        let mut out = DirectoryChunks::default();

        // Visit everything: no gitignore or hidden-file filtering
        let walker = WalkBuilder::new(root)
            .standard_filters(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Failed to walk {}: {e}", root.display());
                    continue;
                }
            };
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            out.files_seen += 1;

            let Some(kind) = DocumentKind::from_path(path) else {
                info!("Skipping unsupported file: {}", path.display());
                out.files_skipped += 1;
                continue;
            };

            match self.extract(path, kind) {
                Ok(chunks) => {
                    debug!("{}: {} chunks", path.display(), chunks.len());
                    out.files_extracted += 1;
                    out.chunks.extend(chunks);
                }
                Err(e) => {
                    error!("Error processing {} {}: {e}", kind.as_str(), path.display());
                    out.files_failed += 1;
                }
            }
        }

        out
    }

    fn extract_or_log(&self, path: &Path, kind: DocumentKind) -> Vec<Chunk> {
        self.extract(path, kind).unwrap_or_else(|e| {
            error!("Error processing {} {}: {e}", kind.as_str(), path.display());
            Vec::new()
        })
    }

    fn extract(&self, path: &Path, kind: DocumentKind) -> Result<Vec<Chunk>, ExtractionError> {
        match kind {
            DocumentKind::Pdf => {
                let (text, pages) = pdf_to_text(path)?;
                Ok(Chunk::sequence(path, kind, Some(pages), self.chunker.split(&text)))
            }
            DocumentKind::Json => {
                let data = fs::read_to_string(path).map_err(|source| ExtractionError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                let value: Value =
                    serde_json::from_str(&data).map_err(|source| ExtractionError::Json {
                        path: path.to_path_buf(),
                        source,
                    })?;
                Ok(Chunk::sequence(path, kind, None, self.chunker.split(&json_to_text(&value))))
            }
        }
    }
}

/// Extract all pages as one blob with a `Page N:` header before each page.
///
/// Returns the text and the page count. A page whose text cannot be decoded
/// keeps its header and contributes no text.
pub fn pdf_to_text(path: &Path) -> Result<(String, usize), ExtractionError> {
    let doc = Document::load(path).map_err(|source| ExtractionError::Pdf {
        path: path.to_path_buf(),
        source,
    })?;

    let pages = doc.get_pages();
    let mut text = String::new();
    for &page_num in pages.keys() {
        let page_text = doc.extract_text(&[page_num]).unwrap_or_else(|e| {
            warn!("No text on page {page_num} of {}: {e}", path.display());
            String::new()
        });
        text.push_str(&format!("\n\nPage {page_num}:\n{page_text}"));
    }

    Ok((text, pages.len()))
}

/// Flatten arbitrary JSON into `path: value` lines, depth first.
///
/// Object keys extend the path with `.key`, array elements with `[i]`.
/// Nested containers first get a `path:` header line.
#[must_use]
pub fn json_to_text(value: &Value) -> String {
    let mut lines = Vec::new();
    flatten(value, "", &mut lines);
    lines.join("\n")
}

fn flatten(value: &Value, path: &str, lines: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                emit(child, child_path, lines);
            }
        }
        Value::Array(items) => {
            for (idx, child) in items.iter().enumerate() {
                emit(child, format!("{path}[{idx}]"), lines);
            }
        }
        scalar => lines.push(scalar_text(scalar)),
    }
}

fn emit(value: &Value, path: String, lines: &mut Vec<String>) {
    if value.is_object() || value.is_array() {
        lines.push(format!("{path}:"));
        flatten(value, &path, lines);
    } else {
        lines.push(format!("{path}: {}", scalar_text(value)));
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Minimal one-font PDF with one line of text per page.
#[cfg(test)]
pub(crate) fn write_test_pdf(path: &Path, pages: &[&str]) {
    use lopdf::content::{Content, Operation};
    use lopdf::{Object, Stream, dictionary};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for line in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(*line)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id =
            doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}
