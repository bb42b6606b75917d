//! Readmit CLI: build the feature matrix and evaluate readmission models.

mod commands;
mod settings;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Readmit: feature extraction and readmission-risk model evaluation
#[derive(Parser, Debug)]
#[command(name = "readmit", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (holds readmit.toml)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path; replaces the layered lookup
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the feature extractors and write the feature matrix
    Extract {
        /// SQLite database to read from (overrides extraction.database)
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Ignore the cache blob and run every extractor
        #[arg(long)]
        no_cache: bool,

        /// Where to write the matrix (overrides extraction.dataset_path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Keep only the first N feature columns of each extractor
        #[arg(long)]
        column_subset: Option<usize>,
    },
    /// Train and evaluate models on the feature matrix
    Evaluate {
        /// Feature matrix to load (overrides evaluation.dataset_path)
        #[arg(short, long)]
        dataset: Option<PathBuf>,

        /// Models to train
        #[arg(short, long, value_enum, default_values_t = [commands::ModelKind::Logistic])]
        model: Vec<commands::ModelKind>,

        /// Normalizer applied before logistic regression
        #[arg(long, value_enum, default_value_t = commands::NormalizerKind::Standard)]
        normalize: commands::NormalizerKind,

        /// Restrict to visits with these health conditions
        #[arg(long = "condition")]
        conditions: Vec<String>,

        /// Random seed for splitting and sampling
        #[arg(long)]
        seed: Option<u64>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect or clear the extraction cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum CacheAction {
    /// List cached extractor outputs
    Show,
    /// Remove one cached extractor, or all of them
    Clear {
        /// Extractor name; clears everything when omitted
        extractor: Option<String>,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Write a default readmit.toml in the workspace
    Init,
    /// Show the effective configuration
    Show,
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "readmit", "readmit")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "readmit.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let settings = match &cli.config {
        Some(path) => readmit_core::config::load_config_file::<settings::Settings>(path),
        None => readmit_core::load_config::<settings::Settings>(Some(&workspace), None),
    }
    .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?
    .resolve_paths(&workspace);

    commands::handle_command(cli.command, settings, &workspace)
}
