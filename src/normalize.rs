//! Record and workout normalization
//!
//! Type-coerces raw attribute rows into the typed tables: UTC instants,
//! numeric values (null on coercion failure, never an error), sleep-stage
//! codes, and kilometer distance units.

use crate::extract::{RecordRow, WorkoutRow};
use crate::types::{record_types, RawRecord, SleepStage, Workout};
use chrono::{DateTime, Utc};

/// Record types whose values are distances subject to unit normalization.
const DISTANCE_KINDS: [&str; 3] = [
    record_types::DISTANCE_WALKING_RUNNING,
    record_types::DISTANCE_CYCLING,
    record_types::DISTANCE_SWIMMING,
];

const MILES_TO_KM: f64 = 1.60934;

/// Parse an export instant. The export writes `2024-03-01 08:00:00 +0000`;
/// route documents and some sources use RFC 3339.
pub fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S %z")
        .or_else(|_| DateTime::parse_from_rfc3339(s.trim()))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Normalize extracted record rows. Rows without a parsable start or end
/// instant cannot be keyed onto the timeline and are dropped; value
/// coercion failures survive as null values.
pub fn normalize_records(rows: Vec<RecordRow>) -> Vec<RawRecord> {
    rows.into_iter().filter_map(normalize_record).collect()
}

fn normalize_record(row: RecordRow) -> Option<RawRecord> {
    let start = parse_instant(row.start.as_deref()?)?;
    let end = parse_instant(row.end.as_deref()?)?;

    let is_sleep = row.record_type == record_types::SLEEP_ANALYSIS;
    let mut value = match (&row.value, is_sleep) {
        (Some(raw), true) => SleepStage::from_label(raw).map(|stage| f64::from(stage.code())),
        (Some(raw), false) => raw.trim().parse::<f64>().ok(),
        (None, _) => None,
    };

    // Distance metrics are normalized to km regardless of exported unit.
    let mut unit = row.unit;
    if DISTANCE_KINDS.contains(&row.record_type.as_str()) {
        if let Some(converted) = convert_distance_unit(value, unit.as_deref()) {
            value = converted;
            unit = Some("km".to_string());
        }
    }

    Some(RawRecord {
        record_type: row.record_type,
        start,
        end,
        value,
        unit,
        source_name: row.source_name,
        creation: row.creation.as_deref().and_then(parse_instant),
        device: row.device,
    })
}

/// `Some(converted)` when the unit is a convertible distance unit, `None`
/// when the unit is already km or unrecognized.
fn convert_distance_unit(value: Option<f64>, unit: Option<&str>) -> Option<Option<f64>> {
    match unit {
        Some("m") => Some(value.map(|v| v / 1000.0)),
        Some("mi") => Some(value.map(|v| v * MILES_TO_KM)),
        _ => None,
    }
}

/// Normalize extracted workout rows. Statistic-block sums take precedence
/// over the element's own attributes; a missing or zero duration attribute
/// is back-filled from the start/end window.
pub fn normalize_workouts(rows: Vec<WorkoutRow>) -> Vec<Workout> {
    rows.into_iter().filter_map(normalize_workout).collect()
}

fn normalize_workout(row: WorkoutRow) -> Option<Workout> {
    let start = parse_instant(row.attrs.get("startDate")?)?;
    let end = parse_instant(row.attrs.get("endDate")?)?;

    let duration_attr = row
        .attrs
        .get("duration")
        .and_then(|d| d.trim().parse::<f64>().ok());
    let duration_min = match duration_attr {
        Some(d) if d != 0.0 => d,
        _ => (end - start).num_seconds() as f64 / 60.0,
    };

    let raw_distance = row
        .total_distance
        .as_deref()
        .or_else(|| row.attrs.get("totalDistance").map(String::as_str))
        .and_then(|d| d.trim().parse::<f64>().ok());
    let distance_unit = row
        .total_distance_unit
        .clone()
        .or_else(|| row.attrs.get("totalDistanceUnit").cloned());

    let (total_distance, total_distance_unit) =
        match convert_distance_unit(raw_distance, distance_unit.as_deref()) {
            Some(converted) => (converted, Some("km".to_string())),
            None => (raw_distance, distance_unit),
        };

    let total_energy = row
        .total_energy
        .as_deref()
        .or_else(|| row.attrs.get("totalEnergyBurned").map(String::as_str))
        .and_then(|e| e.trim().parse::<f64>().ok());
    let total_energy_unit = row
        .total_energy_unit
        .clone()
        .or_else(|| row.attrs.get("totalEnergyBurnedUnit").cloned());

    Some(Workout {
        activity_type: row
            .attrs
            .get("workoutActivityType")
            .cloned()
            .unwrap_or_else(|| "Unknown".to_string()),
        start,
        end,
        duration_min,
        total_distance,
        total_distance_unit,
        total_energy,
        total_energy_unit,
        source_name: row.attrs.get("sourceName").cloned(),
        metadata: row.metadata,
    })
}
