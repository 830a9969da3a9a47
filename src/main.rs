use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use docrag::config::Config;
use docrag::embedder::{self, download};
use docrag::ingest::IngestionPipeline;
use docrag::mcp::server::{McpContext, McpServer};

#[derive(Parser, Debug)]
#[command(
    name = "docrag",
    version,
    about = "Ingest PDF/JSON documents into a vector collection and search them"
)]
struct Cli {
    /// Path to the JSON config file (default: docrag.json)
    #[arg(short, long, default_value = "")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract, chunk, embed and store every PDF/JSON file under a directory
    Ingest {
        /// Directory to ingest instead of the configured documents path
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Print the chunks most similar to a query
    Search {
        query: String,
        #[arg(short, long)]
        limit: Option<usize>,
        /// Minimum cosine similarity
        #[arg(short, long, allow_negative_numbers = true)]
        threshold: Option<f32>,
    },
    /// Show collection readiness, size and vector dimension
    Info,
    /// Show collection state plus documents path and chunking settings
    Status,
    /// Delete every ingested chunk
    Reset {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
    /// Fetch the local embedding model files
    DownloadModel,
    /// Serve the MCP tools over stdio
    Serve,
}

fn main() -> Result<()> {
    // stdout is reserved for results and the MCP transport
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    config
        .apply_env(|key| std::env::var(key).ok())
        .context("invalid environment override")?;
    config.validate().context("invalid configuration")?;

    if let Command::DownloadModel = cli.command {
        let model_dir = Path::new(&config.embedding.model_dir);
        download::download_model_files(model_dir)?;
        println!("Model files ready in {}", model_dir.display());
        return Ok(());
    }

    let embedder =
        embedder::from_config(&config.embedding).context("failed to initialise embedder")?;
    let pipeline = Arc::new(IngestionPipeline::from_config(&config, embedder)?);

    match cli.command {
        Command::Ingest { path } => {
            let report = pipeline.process_documents(path.as_deref())?;
            print_json(&report)?;
            anyhow::ensure!(report.success, "ingestion did not complete");
        }
        Command::Search {
            query,
            limit,
            threshold,
        } => {
            let hits = pipeline.index().search(
                &query,
                limit.unwrap_or(config.search.limit),
                threshold.unwrap_or(config.search.score_threshold),
            )?;
            print_json(&hits)?;
        }
        Command::Info => print_json(&pipeline.index().info())?,
        Command::Status => print_json(&pipeline.status())?,
        Command::Reset { yes } => {
            anyhow::ensure!(yes, "refusing to delete every ingested chunk without --yes");
            pipeline.clear()?;
            println!("Collection {} reset", pipeline.index().collection());
        }
        Command::Serve => serve(pipeline.clone(), &config)?,
        Command::DownloadModel => {}
    }

    Ok(())
}

/// Run the MCP server until the client disconnects.
///
/// The runtime is dropped before `pipeline`'s last reference, which owns
/// blocking HTTP clients that must not be dropped inside async context.
fn serve(pipeline: Arc<IngestionPipeline>, config: &Config) -> Result<()> {
    info!("Starting docrag MCP Server...");
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let server = McpServer::new(McpContext {
        pipeline,
        search: config.search.clone(),
    });
    runtime.block_on(server.start())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{out}");
    Ok(())
}
