/// MCP Tool handlers for docrag.
///
/// 1. search            – similarity search over ingested chunks
/// 2. ingest_documents  – ingest a directory of PDF/JSON files
/// 3. collection_info   – collection readiness, size and dimension
/// 4. reset_collection  – delete every ingested point
/// 5. ingestion_status  – collection state plus chunking settings
///
/// The core is blocking, so every handler runs it on tokio's blocking pool.
use crate::ingest::IngestionPipeline;
use crate::mcp::server::McpContext;
use rmcp::handler::server::ServerHandler;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{ErrorData as McpError, handler::server::tool::ToolRouter, model::*, tool, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;
use std::path::PathBuf;

// ── Parameter structs ────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
struct SearchParams {
    /// Search query (natural language)
    query: String,
    /// Max results (default from config)
    limit: Option<usize>,
    /// Minimum cosine similarity, -1.0 to 1.0 (default from config)
    score_threshold: Option<f32>,
}

#[derive(Deserialize, JsonSchema)]
struct IngestParams {
    /// Directory to ingest (configured documents path if omitted)
    path: Option<String>,
}

#[derive(Deserialize, JsonSchema)]
struct ResetParams {
    /// Must be true: every ingested chunk is deleted
    confirm: bool,
}

// ── Response helpers ─────────────────────────────────────────────────

fn json_result(value: serde_json::Value) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(&value).unwrap_or_default(),
    )]))
}

fn error_result(msg: &str) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(msg.to_string())]))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, McpError> {
    serde_json::to_value(value)
        .map_err(|e| McpError::internal_error(format!("serialization failed: {e}"), None))
}

/// Run `f` against the pipeline on the blocking pool.
async fn blocking<T, F>(ctx: &McpContext, f: F) -> Result<T, McpError>
where
    F: FnOnce(&IngestionPipeline) -> T + Send + 'static,
    T: Send + 'static,
{
    let pipeline = ctx.pipeline.clone();
    tokio::task::spawn_blocking(move || f(&pipeline))
        .await
        .map_err(|e| McpError::internal_error(format!("worker task failed: {e}"), None))
}

// ── Tool implementations ─────────────────────────────────────────────

#[derive(Clone)]
pub struct AppTools {
    pub ctx: McpContext,
    pub tool_router: ToolRouter<Self>,
}

impl ServerHandler for AppTools {}

#[tool_router]
impl AppTools {
    pub fn new(ctx: McpContext) -> Self {
        Self {
            ctx,
            tool_router: Self::tool_router(),
        }
    }

    // ── Tool 1: search ──────────────────────────────────────────────

    #[tool(
        description = "Semantic search over ingested documents. Returns the most similar chunks with their source metadata and cosine score, best first."
    )]
    async fn search(&self, params: Parameters<SearchParams>) -> Result<CallToolResult, McpError> {
        let p = params.0;
        if p.query.trim().is_empty() {
            return error_result("query is required");
        }

        let limit = p.limit.unwrap_or(self.ctx.search.limit);
        let threshold = p.score_threshold.unwrap_or(self.ctx.search.score_threshold);
        if !(-1.0..=1.0).contains(&threshold) {
            return error_result("score_threshold must be within [-1, 1]");
        }

        let query = p.query;
        let hits = blocking(&self.ctx, move |pipeline| {
            pipeline.index().search(&query, limit, threshold)
        })
        .await?
        .map_err(|e| McpError::internal_error(format!("embedding failed: {e}"), None))?;

        json_result(serde_json::json!({
            "count": hits.len(),
            "results": to_json(&hits)?,
        }))
    }

    // ── Tool 2: ingest_documents ────────────────────────────────────

    #[tool(
        description = "Extract, chunk, embed and store every PDF and JSON file under a directory (defaults to the configured documents path)"
    )]
    async fn ingest_documents(
        &self,
        params: Parameters<IngestParams>,
    ) -> Result<CallToolResult, McpError> {
        let path = params.0.path.filter(|p| !p.trim().is_empty()).map(PathBuf::from);

        let report = blocking(&self.ctx, move |pipeline| {
            pipeline.process_documents(path.as_deref())
        })
        .await?
        .map_err(|e| McpError::internal_error(format!("embedding failed: {e}"), None))?;

        json_result(to_json(&report)?)
    }

    // ── Tool 3: collection_info ─────────────────────────────────────

    #[tool(
        description = "Report whether the vector collection is ready, with its point count and vector size"
    )]
    async fn collection_info(&self) -> Result<CallToolResult, McpError> {
        let status = blocking(&self.ctx, |pipeline| pipeline.index().info()).await?;
        json_result(to_json(&status)?)
    }

    // ── Tool 4: reset_collection ────────────────────────────────────

    #[tool(description = "Delete all ingested chunks by dropping and recreating the collection")]
    async fn reset_collection(
        &self,
        params: Parameters<ResetParams>,
    ) -> Result<CallToolResult, McpError> {
        if !params.0.confirm {
            return error_result("set confirm to true to delete every ingested chunk");
        }

        let outcome = blocking(&self.ctx, |pipeline| pipeline.clear()).await?;
        match outcome {
            Ok(()) => json_result(serde_json::json!({ "success": true })),
            Err(e) => error_result(&format!("reset failed: {e}")),
        }
    }

    // ── Tool 5: ingestion_status ────────────────────────────────────

    #[tool(description = "Collection state plus the documents path and chunking settings in use")]
    async fn ingestion_status(&self) -> Result<CallToolResult, McpError> {
        let status = blocking(&self.ctx, |pipeline| pipeline.status()).await?;
        json_result(to_json(&status)?)
    }
}
