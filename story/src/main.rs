//! Story editor.
//!
//! A line-oriented editor for stories with AI analysis, rewrites and a
//! version tree. Reads commands from stdin; logs go to stderr.
//!
//! ```bash
//! cargo run -p story -- drafts/harbor.txt --verbose
//! ```

mod headless;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use story_core::{EditorConfig, StorySession};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Story editor with AI-assisted rewriting and version tracking
#[derive(Parser)]
#[command(name = "story")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Story file to open on start
    file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Generative model to use
    #[arg(long)]
    model: Option<String>,

    /// Base URL of the speech engine
    #[arg(long)]
    speech_url: Option<String>,

    /// Speaker id for synthesis
    #[arg(long)]
    speaker: Option<u32>,

    /// Minimum text length (characters) before analysis runs
    #[arg(long)]
    min_chars: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Setup logging; stdout is reserved for the line protocol
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    let mut config = EditorConfig::from_env().context("reading configuration")?;
    if config.api_key.is_none() {
        bail!(
            "GEMINI_API_KEY environment variable not set. \
             Set it in a .env file or with: export GEMINI_API_KEY=your_key_here"
        );
    }
    if let Some(model) = cli.model {
        config = config.with_model(model);
    }
    if let Some(url) = cli.speech_url {
        config = config.with_speech_base_url(url);
    }
    if let Some(speaker) = cli.speaker {
        config = config.with_speaker(speaker);
    }
    if let Some(min) = cli.min_chars {
        config = config.with_min_analysis_chars(min);
    }

    let session = StorySession::from_config(config).context("creating session")?;
    headless::run_headless(session, cli.file).await
}
