//! Pipeline orchestration
//!
//! This module provides the public API for wearlog. It runs the full
//! ingestion pipeline over one export archive and exposes the derived
//! views on top of the resulting base tables:
//!
//! 1. Archive reading - locate and open the export and route documents
//! 2. Extraction - stream records, workouts, and route points out
//! 3. Normalization - typed instants, numeric values, km distances
//! 4. Derived views - daily aggregates, running summaries, time series
//!
//! Base tables are produced once per archive and never mutated. Derived
//! tables are pure functions of the base tables, memoized behind the
//! table set's identity token.

use crate::align;
use crate::archive::read_archive;
use crate::error::IngestError;
use crate::extract::ParseOptions;
use crate::metrics;
use crate::normalize::{normalize_records, normalize_workouts};
use crate::reconcile;
use crate::types::{
    DailyRow, RawRecord, RouteLookup, RunningWorkoutSummary, Workout, WorkoutTimeSeries,
};
use std::collections::HashMap;
use std::io::{Read, Seek};
use tracing::info;
use uuid::Uuid;

/// The normalized base tables of one ingested export archive.
#[derive(Debug, Clone)]
pub struct ExportTables {
    /// Identity of this table set; derived views are memoized against it
    pub id: Uuid,
    pub records: Vec<RawRecord>,
    pub workouts: Vec<Workout>,
    /// Per-type buckets, present when the capture-all option was set
    pub records_by_type: Option<HashMap<String, Vec<RawRecord>>>,
    pub routes: RouteLookup,
}

/// Ingest one export archive into normalized base tables.
pub fn ingest_export<R: Read + Seek>(
    reader: R,
    options: &ParseOptions,
) -> Result<ExportTables, IngestError> {
    let contents = read_archive(reader, options)?;

    let records = normalize_records(contents.document.records);
    let workouts = normalize_workouts(contents.document.workouts);
    let records_by_type = contents.document.records_by_type.map(|buckets| {
        buckets
            .into_iter()
            .map(|(type_id, rows)| (type_id, normalize_records(rows)))
            .collect()
    });

    info!(
        records = records.len(),
        workouts = workouts.len(),
        routes = contents.routes.len(),
        "export archive ingested"
    );

    Ok(ExportTables {
        id: Uuid::new_v4(),
        records,
        workouts,
        records_by_type,
        routes: contents.routes,
    })
}

/// Derived-view access over one ingested table set.
///
/// Daily aggregates and running summaries are computed on first access and
/// cached against the table set's identity; [`ExportAnalyzer::invalidate`]
/// drops the caches. Per-workout time series are cheap relative to their
/// variety and are computed on demand.
#[derive(Debug)]
pub struct ExportAnalyzer {
    tables: ExportTables,
    daily: Option<(Uuid, Vec<DailyRow>)>,
    runs: Option<(Uuid, Vec<RunningWorkoutSummary>)>,
}

impl ExportAnalyzer {
    pub fn new(tables: ExportTables) -> Self {
        Self {
            tables,
            daily: None,
            runs: None,
        }
    }

    pub fn tables(&self) -> &ExportTables {
        &self.tables
    }

    /// One row per calendar date with aggregated metrics and sleep hours.
    pub fn daily_aggregates(&mut self) -> &[DailyRow] {
        let stale = !matches!(&self.daily, Some((id, _)) if *id == self.tables.id);
        if stale {
            let rows = metrics::daily_aggregates(&self.tables.records);
            self.daily = Some((self.tables.id, rows));
        }
        &self.daily.as_ref().unwrap().1
    }

    /// Deduplicated running workouts with reconciled metrics.
    pub fn running_summaries(&mut self) -> &[RunningWorkoutSummary] {
        let stale = !matches!(&self.runs, Some((id, _)) if *id == self.tables.id);
        if stale {
            let summaries = reconcile::summarize_running_workouts(
                &self.tables.workouts,
                &self.tables.records,
                &self.tables.routes,
            );
            self.runs = Some((self.tables.id, summaries));
        }
        &self.runs.as_ref().unwrap().1
    }

    /// The aligned instrument/route time series for one workout.
    pub fn workout_time_series(&self, workout: &Workout) -> WorkoutTimeSeries {
        align::workout_time_series(workout, &self.tables.records, &self.tables.routes)
    }

    /// Drop memoized derived tables, forcing recomputation on next access.
    pub fn invalidate(&mut self) {
        self.daily = None;
        self.runs = None;
    }
}
