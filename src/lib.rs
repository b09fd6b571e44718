//! Wearlog - ingestion and reconciliation engine for wearable export archives
//!
//! Wearlog turns a consumer wearable's exported archive (one compressed file
//! holding a primary XML export document and companion GPX route documents)
//! into analysis-ready tables through a deterministic pipeline: archive
//! reading → streaming extraction → normalization → deduplication →
//! reconciliation → derived views.
//!
//! ## Modules
//!
//! - **archive**: locate and open the export and route documents
//! - **extract** / **route**: streaming XML extraction, memory-bounded
//! - **normalize**: UTC instants, numeric values, km distances, sleep codes
//! - **dedup** / **reconcile**: collapse duplicate workouts and resolve
//!   per-workout metrics across recording sources
//! - **align**: per-workout time series on a shared relative-minute axis
//! - **metrics**: daily aggregates, workload ratios, stress balance,
//!   running dynamics
//! - **pipeline**: public entry points and memoized derived views

pub mod align;
pub mod archive;
pub mod dedup;
pub mod error;
pub mod extract;
pub mod metrics;
pub mod normalize;
pub mod pipeline;
pub mod reconcile;
pub mod route;
pub mod types;

pub use error::IngestError;
pub use extract::ParseOptions;
pub use metrics::{AcwrConfig, AcwrZone, TsbConfig};
pub use pipeline::{ingest_export, ExportAnalyzer, ExportTables};
pub use types::{
    Channel, DailyRow, DistanceResolution, RawRecord, RouteTrack, RunningWorkoutSummary,
    SleepStage, Workout, WorkoutTimeSeries,
};

/// Crate version embedded in CLI output.
pub const WEARLOG_VERSION: &str = env!("CARGO_PKG_VERSION");
