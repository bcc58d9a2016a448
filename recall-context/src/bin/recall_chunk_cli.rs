use clap::{Parser, ValueEnum};
use recall_context::{ChunkerConfig, ChunkerKind, create_chunker};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};

/// Chunk a document with one of the recall chunkers and print the chunks as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input file. If not provided, reads from stdin.
    #[arg(short, long)]
    input: Option<String>,

    /// Chunking strategy.
    #[arg(short, long, value_enum, default_value_t = Strategy::Markdown)]
    strategy: Strategy,

    /// Maximum token estimate (whitespace words) per chunk.
    #[arg(short, long, default_value_t = 512)]
    max_tokens: usize,

    /// Words shared between consecutive windows (fixed strategy only).
    #[arg(short, long, default_value_t = 64)]
    overlap: usize,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Strategy {
    Markdown,
    Json,
    Fixed,
}

impl From<Strategy> for ChunkerKind {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Markdown => ChunkerKind::Markdown,
            Strategy::Json => ChunkerKind::Json,
            Strategy::Fixed => ChunkerKind::Fixed,
        }
    }
}

#[derive(Serialize)]
struct ChunkOutput<'a> {
    index: usize,
    tokens: usize,
    metadata: &'a recall_context::Metadata,
    content: &'a str,
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    let content = if let Some(input_path) = args.input {
        fs::read_to_string(input_path)?
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    };

    let config = ChunkerConfig::new(args.strategy.into())
        .with_max_tokens(args.max_tokens)
        .with_overlap(args.overlap);
    let chunker = create_chunker(&config);
    let chunks = chunker.chunk(&content);

    let output: Vec<ChunkOutput> = chunks
        .iter()
        .map(|c| ChunkOutput {
            index: c.index,
            tokens: c.tokens(),
            metadata: &c.metadata,
            content: &c.content,
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
