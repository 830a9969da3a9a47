//! # docrag — document ingestion and retrieval core
//!
//! Turns a directory of PDF and JSON files into a searchable vector
//! collection and answers similarity queries for a chat layer, either as a
//! library, from the command line, or as an MCP server over stdio.
//!
//! ## Architecture
//!
//! - **[`config`]** — JSON config file, environment overrides, validation
//! - **[`ingest`]** — Chunking, PDF/JSON extraction, and the ingestion pipeline
//! - **[`embedder`]** — Text embedding via an OpenAI-compatible API or ONNX Runtime
//! - **[`index`]** — Collection lifecycle and similarity search over Qdrant or SQLite + sqlite-vec
//! - **[`mcp`]** — MCP server exposing search and ingestion tools (stdio transport via rmcp)

pub mod config;
pub mod embedder;
pub mod index;
pub mod ingest;
pub mod mcp;
