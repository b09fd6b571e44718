//! Wearlog CLI - inspect an export archive from the command line
//!
//! Commands:
//! - summary: Count records per type and workouts per activity type
//! - daily: Emit the daily aggregate table as JSON
//! - runs: Emit reconciled running workout summaries as JSON

use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;

use wearlog::pipeline::{ingest_export, ExportAnalyzer, ExportTables};
use wearlog::{ParseOptions, WEARLOG_VERSION};

/// Wearlog - ingestion and reconciliation engine for wearable export archives
#[derive(Parser)]
#[command(name = "wearlog")]
#[command(version = WEARLOG_VERSION)]
#[command(about = "Inspect a wearable export archive", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Count records per type and workouts per activity type
    Summary {
        /// Path to the export archive (.zip)
        archive: PathBuf,
    },

    /// Emit the daily aggregate table as JSON
    Daily {
        /// Path to the export archive (.zip)
        archive: PathBuf,
    },

    /// Emit reconciled running workout summaries as JSON
    Runs {
        /// Path to the export archive (.zip)
        archive: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Summary { archive } => ingest(&archive).map(print_summary),
        Commands::Daily { archive } => ingest(&archive).and_then(print_daily),
        Commands::Runs { archive } => ingest(&archive).and_then(print_runs),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn ingest(path: &PathBuf) -> Result<ExportTables, String> {
    let file = File::open(path).map_err(|e| format!("{}: {e}", path.display()))?;
    ingest_export(BufReader::new(file), &ParseOptions::default())
        .map_err(|e| format!("{}: {e}", path.display()))
}

fn print_summary(tables: ExportTables) {
    let mut record_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for record in &tables.records {
        *record_counts.entry(record.record_type.as_str()).or_default() += 1;
    }
    let mut workout_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for workout in &tables.workouts {
        *workout_counts.entry(workout.activity_type.as_str()).or_default() += 1;
    }

    println!("records:");
    for (type_id, count) in record_counts {
        println!("  {type_id}: {count}");
    }
    println!("workouts:");
    for (activity, count) in workout_counts {
        println!("  {activity}: {count}");
    }
    println!("routes: {}", tables.routes.len());
}

fn print_daily(tables: ExportTables) -> Result<(), String> {
    let mut analyzer = ExportAnalyzer::new(tables);
    let json = serde_json::to_string_pretty(analyzer.daily_aggregates())
        .map_err(|e| e.to_string())?;
    println!("{json}");
    Ok(())
}

fn print_runs(tables: ExportTables) -> Result<(), String> {
    let mut analyzer = ExportAnalyzer::new(tables);
    let json = serde_json::to_string_pretty(analyzer.running_summaries())
        .map_err(|e| e.to_string())?;
    println!("{json}");
    Ok(())
}
