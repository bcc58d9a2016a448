use anyhow::Context;
use clap::{Parser, Subcommand};
use recall_retriever::{
    config::{DATA_DIR, RecallConfig},
    index::IndexStats,
    indexer::{IndexReport, Indexer, IndexerConfig},
    pipeline::{Pipeline, SearchResult},
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Index a directory of notes and search it by meaning.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory to index; the database lives in <workspace>/.recall
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// TOML configuration file (defaults to <workspace>/.recall/config.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log more (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan the workspace once and print the report
    Index {
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Scan, then keep rescanning until interrupted
    Watch {
        /// Seconds between scans, overriding the configuration
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Search the index
    Search {
        query: String,
        /// Maximum number of results
        #[arg(short, default_value_t = 10)]
        k: usize,
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Show index statistics
    Stats {
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum OutputFormat {
    Summary,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[derive(Serialize)]
struct StatsOutput {
    documents: usize,
    chunks: usize,
    embedder: String,
    dimensions: usize,
    index: IndexStats,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(args).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(workspace: &Path, explicit: Option<&Path>) -> anyhow::Result<RecallConfig> {
    let config = match explicit {
        Some(path) => RecallConfig::load(path)?,
        None => {
            let implicit = workspace.join(DATA_DIR).join("config.toml");
            if implicit.is_file() {
                RecallConfig::load(&implicit)?
            } else {
                RecallConfig::default()
            }
        }
    };
    Ok(config.with_workspace(workspace))
}

async fn open_pipeline(config: &RecallConfig) -> anyhow::Result<Arc<Pipeline>> {
    let pipeline = Pipeline::from_config(config).await?;
    pipeline.load().await.context("Failed to load the index")?;
    Ok(Arc::new(pipeline))
}

async fn run(args: Args) -> anyhow::Result<()> {
    let workspace = std::fs::canonicalize(&args.workspace)
        .with_context(|| format!("Workspace {} not found", args.workspace.display()))?;
    let config = load_config(&workspace, args.config.as_deref())?;

    match args.command {
        Commands::Index { format } => {
            let pipeline = open_pipeline(&config).await?;
            let indexer = Indexer::new(
                IndexerConfig::from_settings(&workspace, &config.indexer),
                pipeline.clone(),
            )?;
            let report = indexer.index_now(&CancellationToken::new()).await?;
            print_report(&report, format)?;
            pipeline.close().await?;
            Ok(())
        }
        Commands::Watch { interval } => {
            let pipeline = open_pipeline(&config).await?;
            let mut indexer_config = IndexerConfig::from_settings(&workspace, &config.indexer);
            if let Some(secs) = interval {
                indexer_config = indexer_config.with_poll_interval(Some(std::time::Duration::from_secs(secs)));
            }
            if indexer_config.poll_interval.is_none() {
                indexer_config = indexer_config.with_poll_interval(Some(std::time::Duration::from_secs(30)));
            }
            let indexer = Arc::new(Indexer::new(indexer_config, pipeline.clone())?);

            let token = CancellationToken::new();
            let report = indexer.start(token.clone()).await?;
            print_report(&report, OutputFormat::Summary)?;
            println!("Watching {} (Ctrl-C to stop)", workspace.display());

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            tracing::info!("Shutting down");
            token.cancel();
            indexer.stop().await;
            pipeline.close().await?;
            Ok(())
        }
        Commands::Search { query, k, format } => {
            let pipeline = open_pipeline(&config).await?;
            let results = pipeline.search(&query, k).await?;
            print_results(&results, format)?;
            pipeline.close().await?;
            Ok(())
        }
        Commands::Stats { format } => {
            let pipeline = open_pipeline(&config).await?;
            let stats = StatsOutput {
                documents: pipeline.document_count().await,
                chunks: pipeline.chunk_count().await,
                embedder: pipeline.embedder().provider_name().to_string(),
                dimensions: pipeline.embedder().embedding_dimension(),
                index: pipeline.index_stats().await,
            };
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
                OutputFormat::Summary => {
                    println!("Documents: {}", stats.documents);
                    println!("Chunks: {}", stats.chunks);
                    println!("Embedder: {} ({} dimensions)", stats.embedder, stats.dimensions);
                    println!(
                        "Graph: {} nodes ({} deleted), max level {}",
                        stats.index.nodes, stats.index.deleted, stats.index.max_level
                    );
                    for (layer, edges) in stats.index.edges_per_layer.iter().enumerate() {
                        println!("  layer {layer}: {edges} edges");
                    }
                }
            }
            pipeline.close().await?;
            Ok(())
        }
    }
}

fn print_report(report: &IndexReport, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Summary => {
            println!(
                "Scanned {} files in {:.2?}: {} indexed ({} chunks), {} unchanged, {} removed",
                report.files_scanned,
                report.duration,
                report.files_indexed,
                report.chunks_indexed,
                report.files_skipped,
                report.files_removed
            );
            for error in &report.errors {
                println!("  error: {error}");
            }
        }
    }
    Ok(())
}

fn print_results(results: &[SearchResult], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(results)?),
        OutputFormat::Summary => {
            if results.is_empty() {
                println!("No results");
            }
            for (rank, result) in results.iter().enumerate() {
                let path = result.metadata.get("path").unwrap_or(&result.id);
                println!("{}. {} (score {:.3})", rank + 1, path, result.score);
                let preview: String = result.content.chars().take(200).collect();
                for line in preview.lines().take(3) {
                    println!("   {line}");
                }
            }
        }
    }
    Ok(())
}
