//! qcat - concatenate files (or stdin) into one stream under byte budgets
//!
//! ```text
//! qcat --max-bytes 1000 intro.bin:300 body.bin - > out.bin
//! ```

mod segment;

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use qcat_core::{reader_source, BoxSource, QueuedStream, SpliceConfig};
use std::path::PathBuf;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use segment::{SegmentArg, SegmentInput};

/// Environment variable holding the log filter
const LOG_ENV: &str = "QCAT_LOG";

#[derive(Parser, Debug)]
#[command(name = "qcat", version, about)]
struct Cli {
    /// TOML config file (max_bytes, terminate_on_error)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop after this many bytes in total (overrides the config file)
    #[arg(short, long)]
    max_bytes: Option<u64>,

    /// Write to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Segments in order: PATH or PATH:EXPECTED_BYTES, "-" for stdin
    #[arg(required = true)]
    segments: Vec<SegmentArg>,
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    // stdout may carry the data, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Config file values, with command-line flags on top
fn build_config(cli: &Cli) -> Result<SpliceConfig> {
    let mut config = match &cli.config {
        Some(path) => SpliceConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SpliceConfig::default(),
    };
    if cli.max_bytes.is_some() {
        config.max_bytes = cli.max_bytes;
    }
    Ok(config)
}

async fn open_segment(segment: &SegmentArg) -> Result<BoxSource> {
    match &segment.input {
        SegmentInput::Stdin => Ok(reader_source(tokio::io::stdin())),
        SegmentInput::File(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?;
            Ok(reader_source(file))
        }
    }
}

async fn open_output(path: Option<&PathBuf>) -> Result<Box<dyn AsyncWrite + Unpin + Send>> {
    match path {
        Some(path) => {
            let file = tokio::fs::File::create(path)
                .await
                .with_context(|| format!("Failed to create {}", path.display()))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(tokio::io::stdout())),
    }
}

/// Concatenate every segment into the output; returns bytes written
async fn run(cli: Cli) -> Result<u64> {
    let config = build_config(&cli)?;
    debug!("Using config: {:?}", config);

    let mut output = QueuedStream::new(config);
    for segment in &cli.segments {
        let source = open_segment(segment).await?;
        debug!("Appending segment {}", segment);
        output.append(source, segment.expected_bytes);
    }
    output.end();

    let mut writer = open_output(cli.output.as_ref()).await?;
    let mut written: u64 = 0;
    while let Some(chunk) = output.next().await {
        let chunk = chunk.context("Source failed while streaming")?;
        writer
            .write_all(&chunk)
            .await
            .context("Failed to write output")?;
        written += chunk.len() as u64;
    }
    writer.flush().await.context("Failed to flush output")?;

    info!("Wrote {} bytes from {} segments", written, cli.segments.len());
    Ok(written)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();
    run(cli).await?;
    Ok(())
}
