use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use krepis_race::{
    replay, Detector, DetectorConfig, Relation, ReplaySummary, TraceReader, TracingSink,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Krepis Race CLI
/// Replays recorded execution traces through the race detector
#[derive(Parser)]
#[command(name = "krepis-race", version)]
#[command(about = "Dynamic data-race detection over HB, WCP, DC and WDC", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON-lines trace and report races
    Run {
        /// Trace file (one event per line)
        trace: PathBuf,
        /// Relation to compute (repeatable; overrides the config file)
        #[arg(short, long = "relation", value_name = "hb|wcp|dc|wdc")]
        relations: Vec<Relation>,
        /// Disable the epoch fast path
        #[arg(long)]
        no_fast_path: bool,
        /// Disable the single-owner fast path
        #[arg(long)]
        no_owned: bool,
        /// Use held-lock snapshot lists for Rule (a)
        #[arg(long)]
        snapshots: bool,
        /// Maximum thread count
        #[arg(long, value_name = "N")]
        max_threads: Option<u64>,
        /// Base configuration (JSON)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Print the replay summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate a configuration file
    CheckConfig {
        /// Configuration file (JSON)
        file: PathBuf,
    },
}

fn load_config(path: &Path) -> Result<DetectorConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: DetectorConfig = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    Ok(config)
}

fn print_summary(summary: &ReplaySummary) {
    for report in &summary.reports {
        println!("{report}");
    }
    for count in &summary.summary {
        println!("{} statically unique {}-race(s)", count.unique, count.relation);
        println!("{} dynamic {}-race(s)", count.dynamic, count.relation);
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            trace,
            relations,
            no_fast_path,
            no_owned,
            snapshots,
            max_threads,
            config,
            json,
        } => {
            let mut config = match config {
                Some(path) => load_config(&path)?,
                None => DetectorConfig::default(),
            };
            if !relations.is_empty() {
                config = config.with_relations(relations);
            }
            if no_fast_path {
                config = config.with_epoch_fast_path(false);
            }
            if no_owned {
                config = config.with_owned_fast_path(false);
            }
            if snapshots {
                config = config.with_held_lock_snapshots(true);
            }
            if let Some(n) = max_threads {
                config = config.with_max_threads(n);
            }

            let detector = Detector::new(config, Arc::new(TracingSink))?;
            info!("🔎 Replaying {}", trace.display());
            let reader = TraceReader::open(&trace)
                .with_context(|| format!("failed to open trace {}", trace.display()))?;
            let summary = replay(&detector, reader)?;
            info!(
                events = summary.events,
                races = summary.reports.len(),
                "✅ Replay finished"
            );

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
        }
        Commands::CheckConfig { file } => {
            let config = load_config(&file)?;
            if let Err(e) = config.validate() {
                bail!("{}: {e}", file.display());
            }
            info!(relations = ?config.relations, "✅ Configuration valid");
        }
    }

    Ok(())
}
