/// End-to-end integration tests for the docrag pipeline.
///
/// Tests the complete flow:
///   Config → Embedder → VectorIndex (SQLite file) → Ingest → Search → Reset
use docrag::config::{Config, IndexBackend, PointIdStrategy};
use docrag::embedder::Embedder;
use docrag::embedder::mock::MockEmbedder;
use docrag::index::{CollectionStatus, EnsureOutcome, SqliteBackend, VectorIndex};
use docrag::ingest::{IngestionPipeline, chunk_text};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn sqlite_config(root: &Path, docs: &Path) -> Config {
    let mut config = Config::default();
    config.documents_path = docs.to_string_lossy().to_string();
    config.index.backend = IndexBackend::Sqlite;
    config.index.db_path = root.join("vectors.db").to_string_lossy().to_string();
    config.validate().unwrap();
    config
}

fn points_count(status: &CollectionStatus) -> u64 {
    match status {
        CollectionStatus::Ready(info) => info.points_count,
        other => panic!("collection not ready: {other:?}"),
    }
}

fn write_corpus(docs: &Path) {
    fs::create_dir_all(docs.join("faq")).unwrap();
    fs::write(
        docs.join("products.json"),
        r#"{"products": [{"name": "Widget", "price": 9.5}, {"name": "Gadget", "price": 12}]}"#,
    )
    .unwrap();
    fs::write(
        docs.join("faq").join("returns.json"),
        r#"{"question": "Can I return an item?", "answer": "Within 30 days with a receipt."}"#,
    )
    .unwrap();
    fs::write(docs.join("README.md"), "# not ingested").unwrap();
}

/// Full pipeline: config → ingest → status → search → reset
#[test]
fn test_full_pipeline() {
    let temp_dir = tempdir().unwrap();
    let docs = temp_dir.path().join("documents");
    write_corpus(&docs);

    let config = sqlite_config(temp_dir.path(), &docs);
    let embedder: Arc<dyn Embedder> = Arc::new(MockEmbedder::new(384));
    let pipeline = IngestionPipeline::from_config(&config, embedder.clone()).unwrap();

    let report = pipeline.process_documents(None).unwrap();
    assert!(report.success);
    assert_eq!(report.files_seen, 3);
    assert_eq!(report.files_extracted, 2);
    assert_eq!(report.files_skipped, 1);
    assert_eq!(report.files_failed, 0);
    assert_eq!(report.chunks, 2, "each small file is one chunk");

    let status = pipeline.status();
    assert_eq!(points_count(&status.collection), 2);
    assert_eq!(status.chunk_size, 1000);

    // The mock embeds identical text to an identical vector
    let faq_text = "question: Can I return an item?\nanswer: Within 30 days with a receipt.";
    let hits = pipeline.index().search(faq_text, 5, 0.9).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].content, faq_text);
    assert!(hits[0].score > 0.99);
    assert!(
        hits[0].metadata["source"]
            .as_str()
            .unwrap()
            .ends_with("returns.json")
    );
    assert_eq!(hits[0].metadata["chunk_id"], "returns_0");

    let products = pipeline.index().search("products:", 5, -1.0).unwrap();
    assert!(
        products
            .iter()
            .any(|h| h.content.contains("products[1].name: Gadget"))
    );

    pipeline.clear().unwrap();
    assert_eq!(points_count(&pipeline.index().info()), 0);
    assert!(pipeline.index().search(faq_text, 5, 0.9).unwrap().is_empty());
}

/// Switching providers rebuilds the persisted collection at the new size
#[test]
fn test_provider_switch_rebuilds_collection() {
    let temp_dir = tempdir().unwrap();
    let docs = temp_dir.path().join("documents");
    write_corpus(&docs);
    let config = sqlite_config(temp_dir.path(), &docs);

    {
        let local = IngestionPipeline::from_config(&config, Arc::new(MockEmbedder::new(384)))
            .unwrap();
        assert!(local.process_documents(None).unwrap().success);
        assert_eq!(points_count(&local.index().info()), 2);
    }

    let remote =
        IngestionPipeline::from_config(&config, Arc::new(MockEmbedder::new(1536))).unwrap();
    match remote.index().info() {
        CollectionStatus::Ready(info) => {
            assert_eq!(info.dimension, 1536);
            assert_eq!(info.points_count, 0);
        }
        other => panic!("unexpected status: {other:?}"),
    }
    assert_eq!(remote.index().ensure().unwrap(), EnsureOutcome::Unchanged);
}

/// Deterministic ids make re-ingestion overwrite instead of append
#[test]
fn test_reingest_with_each_id_strategy() {
    let temp_dir = tempdir().unwrap();
    let docs = temp_dir.path().join("documents");
    write_corpus(&docs);

    let mut config = sqlite_config(temp_dir.path(), &docs);
    let appending =
        IngestionPipeline::from_config(&config, Arc::new(MockEmbedder::new(64))).unwrap();
    appending.process_documents(None).unwrap();
    appending.process_documents(None).unwrap();
    assert_eq!(points_count(&appending.index().info()), 4);
    appending.clear().unwrap();

    config.index.id_strategy = PointIdStrategy::Deterministic;
    let overwriting =
        IngestionPipeline::from_config(&config, Arc::new(MockEmbedder::new(64))).unwrap();
    overwriting.process_documents(None).unwrap();
    overwriting.process_documents(None).unwrap();
    assert_eq!(points_count(&overwriting.index().info()), 2);
}

/// Two indexes over one backend see each other's writes
#[test]
fn test_shared_backend() {
    let backend = Arc::new(SqliteBackend::open_in_memory().unwrap());
    let embedder: Arc<dyn Embedder> = Arc::new(MockEmbedder::new(16));
    let writer = VectorIndex::new(backend.clone(), embedder.clone(), "kb").unwrap();
    let reader = VectorIndex::new(backend, embedder, "kb").unwrap();

    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.json"), r#"{"k": "v"}"#).unwrap();
    let processor = docrag::ingest::DocumentProcessor::new(
        docrag::ingest::Chunker::new(100, 10).unwrap(),
    );
    let chunks = processor.process_json(&dir.path().join("a.json"));
    assert!(writer.add_documents(&chunks).unwrap());

    let hits = reader.search("k: v", 1, 0.5).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].metadata["type"], "json");
}

/// 2500 characters at 1000/200 give three overlapping chunks
#[test]
fn test_chunking_overlap_contract() {
    let text: String = "retrieval augmented generation grounds answers in documents "
        .chars()
        .cycle()
        .take(2500)
        .collect();
    let chunks = chunk_text(&text, 1000, 200);

    assert_eq!(chunks.len(), 3);
    for chunk in &chunks {
        assert!(chunk.chars().count() <= 1000);
    }
    for pair in chunks.windows(2) {
        let tail: String = pair[0]
            .chars()
            .skip(pair[0].chars().count().saturating_sub(260))
            .collect();
        let head: String = pair[1].chars().take(40).collect();
        assert!(tail.contains(&head), "chunk should start in the previous tail");
    }
}
