//! Command-line front end: analyze a text file.
//!
//! Reads configuration from `--config`, `~/.mimir/config.toml` or
//! `/etc/mimir/config.toml`, then `MIMIR_*` environment variables.

use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::info;

use mimir::{AnalyzeParams, Config, Mimir, OverflowStrategy, TextAnalyzer};

/// Mimir CLI
#[derive(Parser)]
#[command(name = "mimir")]
#[command(version = mimir::PKG_VERSION)]
#[command(about = "Analyze long documents with a rate-limited LLM API")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze a file (or stdin with `-`) and print the merged JSON answer
    Analyze {
        /// Input file, or `-` for stdin
        file: PathBuf,
        /// Print only a 0-100 score
        #[arg(long)]
        score: bool,
        /// System instruction sent with every chunk
        #[arg(short, long, env = "MIMIR_INSTRUCTION")]
        instruction: Option<String>,
        /// Truncate oversized content instead of chunking it
        #[arg(long)]
        truncate: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;

    // Default: info, or debug in debug mode; RUST_LOG overrides.
    let default_level = if config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    info!(
        version = mimir::version_string(),
        provider = %config.provider.kind,
        model = config.provider.primary_model(),
        "mimir starting"
    );

    let analyzer = Mimir::from_config(&config)?;

    match args.command {
        Command::Analyze {
            file,
            score,
            instruction,
            truncate,
        } => {
            let content = read_input(&file)?;
            if score {
                let score = analyzer.scalar_score(&content).await?;
                println!("{score}");
                return Ok(());
            }

            let instruction = instruction.ok_or(
                "analyze: --instruction (or MIMIR_INSTRUCTION) is required unless --score is given",
            )?;
            let overflow = if truncate {
                OverflowStrategy::Truncate
            } else {
                OverflowStrategy::Chunk
            };
            let params = AnalyzeParams::new(instruction).overflow(overflow);
            let result = analyzer.analyze_text(&content, &params).await?;

            if result.is_partial() {
                eprintln!(
                    "warning: {} of {} chunks failed and were left out",
                    result.failed_chunks.len(),
                    result.chunks
                );
            }
            println!("{}", serde_json::to_string_pretty(&result.value)?);
        }
    }

    Ok(())
}

/// Read the input file, or stdin when the path is `-`.
fn read_input(path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    if path.as_os_str() == "-" {
        if io::stdin().is_terminal() {
            return Err("analyze: no input provided (pipe text into stdin or pass a file)".into());
        }
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).map_err(|e| format!("failed to read {}: {e}", path.display()).into())
}
