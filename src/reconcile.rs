//! Multi-source metric reconciliation
//!
//! A workout window frequently overlaps records from several recording
//! sources (watch, phone, paired sensors). This module picks among them:
//! averaged heart rate and power with same-source narrowing, and a strict
//! fallback chain for distance whose outcome is a tagged
//! [`DistanceResolution`] so each branch is independently testable.

use crate::dedup::dedup_workouts;
use crate::metrics::{efficiency_factor, route_distance_km};
use crate::types::{
    record_types, DistanceResolution, RawRecord, RouteLookup, RunningWorkoutSummary, Workout,
};

/// Maximum gap between a route's first point and the workout start for the
/// route to be considered a match.
const ROUTE_MATCH_TOLERANCE_SEC: i64 = 120;

/// Average the values of `type_id` records whose interval overlaps the
/// workout window.
///
/// When the workout names a source and at least one overlapping record
/// shares it, the selection narrows to same-source records; this prevents
/// double counting from paired devices. An empty selection yields `None`.
pub fn average_overlapping(records: &[RawRecord], type_id: &str, workout: &Workout) -> Option<f64> {
    let overlapping: Vec<&RawRecord> = records
        .iter()
        .filter(|r| r.record_type == type_id && r.start < workout.end && r.end > workout.start)
        .collect();

    let selected: Vec<&RawRecord> = match &workout.source_name {
        Some(source) if overlapping.iter().any(|r| r.source_name.as_ref() == Some(source)) => {
            overlapping
                .into_iter()
                .filter(|r| r.source_name.as_ref() == Some(source))
                .collect()
        }
        _ => overlapping,
    };

    mean(selected.iter().filter_map(|r| r.value))
}

/// Resolve a workout's distance through the priority chain; first match wins.
pub fn resolve_distance(
    workout: &Workout,
    routes: &RouteLookup,
    records: &[RawRecord],
) -> DistanceResolution {
    // 1. A route track starting within tolerance of the workout start is the
    //    most reliable source.
    for (key, track) in routes {
        if (*key - workout.start).num_seconds().abs() < ROUTE_MATCH_TOLERANCE_SEC {
            return DistanceResolution::FromRoute(route_distance_km(track));
        }
    }

    // 2. The workout's own recorded distance attribute, if nonzero.
    if let Some(distance) = workout.total_distance {
        if distance != 0.0 {
            return DistanceResolution::FromAttribute(distance);
        }
    }

    let distance_records: Vec<&RawRecord> = records
        .iter()
        .filter(|r| r.record_type == record_types::DISTANCE_WALKING_RUNNING)
        .collect();

    // 3. Distance records strictly contained in the workout window.
    let strict: Vec<&RawRecord> = distance_records
        .iter()
        .filter(|r| r.start >= workout.start && r.end <= workout.end)
        .copied()
        .collect();
    if !strict.is_empty() {
        return DistanceResolution::FromRecordsStrict(sum_single_source(&strict));
    }

    // 4. Loosened to window overlap, only when containment found nothing.
    let loose: Vec<&RawRecord> = distance_records
        .iter()
        .filter(|r| r.start < workout.end && r.end > workout.start)
        .copied()
        .collect();
    if !loose.is_empty() {
        return DistanceResolution::FromRecordsLoose(sum_single_source(&loose));
    }

    DistanceResolution::Unresolved
}

/// Sum one source's distance values. With multiple sources present, a source
/// named like the first-party watch wins; otherwise the source with the most
/// samples. Summing a single source avoids double counting watch + phone.
fn sum_single_source(records: &[&RawRecord]) -> f64 {
    let mut sources: Vec<&str> = Vec::new();
    for record in records {
        let source = record.source_name.as_deref().unwrap_or("");
        if !sources.contains(&source) {
            sources.push(source);
        }
    }

    let preferred = sources
        .iter()
        .copied()
        .find(|s| s.contains("Watch") || s.contains("Apple"));

    let best = preferred.unwrap_or_else(|| {
        // Most samples, first-seen order breaking ties
        sources
            .iter()
            .copied()
            .max_by_key(|s| {
                records
                    .iter()
                    .filter(|r| r.source_name.as_deref().unwrap_or("") == *s)
                    .count()
            })
            .unwrap_or("")
    });

    records
        .iter()
        .filter(|r| r.source_name.as_deref().unwrap_or("") == best)
        .filter_map(|r| r.value)
        .sum()
}

/// Pace in minutes per km; `None` when distance is missing or non-positive.
pub fn compute_pace(duration_min: f64, distance_km: Option<f64>) -> Option<f64> {
    match distance_km {
        Some(d) if d > 0.0 => Some(duration_min / d),
        _ => None,
    }
}

/// Filter to running workouts, deduplicate, and resolve each against the
/// record and route tables.
pub fn summarize_running_workouts(
    workouts: &[Workout],
    records: &[RawRecord],
    routes: &RouteLookup,
) -> Vec<RunningWorkoutSummary> {
    let running: Vec<Workout> = workouts
        .iter()
        .filter(|w| w.activity_type == record_types::WORKOUT_RUNNING)
        .cloned()
        .collect();

    dedup_workouts(running)
        .into_iter()
        .map(|workout| summarize_workout(workout, records, routes))
        .collect()
}

fn summarize_workout(
    workout: Workout,
    records: &[RawRecord],
    routes: &RouteLookup,
) -> RunningWorkoutSummary {
    let avg_hr = average_overlapping(records, record_types::HEART_RATE, &workout);
    let avg_power = average_overlapping(records, record_types::RUNNING_POWER, &workout);
    let distance = resolve_distance(&workout, routes, records);
    let pace_min_km = compute_pace(workout.duration_min, distance.value());
    let efficiency = efficiency_factor(avg_power, avg_hr);
    let route_matched = distance.is_route();

    RunningWorkoutSummary {
        workout,
        avg_hr,
        avg_power,
        distance,
        pace_min_km,
        efficiency_factor: efficiency,
        route_matched,
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        sum += v;
        count += 1;
    }
    (count > 0).then(|| sum / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RoutePoint, RouteTrack};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::collections::HashMap;

    fn base_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    fn make_workout(distance: Option<f64>, source: Option<&str>) -> Workout {
        Workout {
            activity_type: record_types::WORKOUT_RUNNING.to_string(),
            start: base_start(),
            end: base_start() + Duration::minutes(30),
            duration_min: 30.0,
            total_distance: distance,
            total_distance_unit: distance.map(|_| "km".to_string()),
            total_energy: None,
            total_energy_unit: None,
            source_name: source.map(String::from),
            metadata: HashMap::new(),
        }
    }

    fn make_record(
        type_id: &str,
        offset_sec: i64,
        span_sec: i64,
        value: f64,
        source: &str,
    ) -> RawRecord {
        RawRecord {
            record_type: type_id.to_string(),
            start: base_start() + Duration::seconds(offset_sec),
            end: base_start() + Duration::seconds(offset_sec + span_sec),
            value: Some(value),
            unit: None,
            source_name: Some(source.to_string()),
            creation: None,
            device: None,
        }
    }

    /// Evenly spaced points along the equator; consecutive gaps of 0.001
    /// degrees longitude are ~0.111 km each.
    fn make_route(start_offset_sec: i64, points: usize) -> RouteTrack {
        RouteTrack {
            points: (0..points)
                .map(|i| RoutePoint {
                    lat: 0.0,
                    lon: 0.001 * i as f64,
                    ele: 0.0,
                    time: base_start() + Duration::seconds(start_offset_sec + i as i64 * 10),
                })
                .collect(),
        }
    }

    fn route_lookup(track: RouteTrack) -> RouteLookup {
        let mut routes = RouteLookup::new();
        if let Some(key) = track.key() {
            routes.insert(key, track);
        }
        routes
    }

    #[test]
    fn test_hr_same_source_narrowing() {
        let workout = make_workout(None, Some("Watch"));
        let records = vec![
            make_record(record_types::HEART_RATE, 60, 5, 150.0, "Watch"),
            make_record(record_types::HEART_RATE, 60, 5, 90.0, "Phone"),
        ];
        // Phone samples are excluded once a same-source record exists
        assert_eq!(
            average_overlapping(&records, record_types::HEART_RATE, &workout),
            Some(150.0)
        );
    }

    #[test]
    fn test_hr_without_source_match_uses_all() {
        let workout = make_workout(None, Some("Garmin"));
        let records = vec![
            make_record(record_types::HEART_RATE, 60, 5, 150.0, "Watch"),
            make_record(record_types::HEART_RATE, 60, 5, 90.0, "Phone"),
        ];
        assert_eq!(
            average_overlapping(&records, record_types::HEART_RATE, &workout),
            Some(120.0)
        );
    }

    #[test]
    fn test_hr_empty_selection_is_null() {
        let workout = make_workout(None, Some("Watch"));
        let records = vec![make_record(record_types::HEART_RATE, -7200, 5, 150.0, "Watch")];
        assert_eq!(
            average_overlapping(&records, record_types::HEART_RATE, &workout),
            None
        );
    }

    #[test]
    fn test_route_wins_over_nonzero_attribute() {
        let workout = make_workout(Some(4.5), Some("Watch"));
        let routes = route_lookup(make_route(30, 50));
        let resolved = resolve_distance(&workout, &routes, &[]);
        assert!(resolved.is_route());
        // 49 gaps of ~0.111 km
        let km = resolved.value().unwrap();
        assert!((km - 5.45).abs() < 0.05, "got {km}");
    }

    #[test]
    fn test_route_outside_tolerance_falls_back_to_attribute() {
        let workout = make_workout(Some(4.5), Some("Watch"));
        let routes = route_lookup(make_route(150, 50));
        assert_eq!(
            resolve_distance(&workout, &routes, &[]),
            DistanceResolution::FromAttribute(4.5)
        );
    }

    #[test]
    fn test_zero_attribute_falls_through_to_records() {
        let workout = make_workout(Some(0.0), Some("Watch"));
        let records = vec![
            make_record(record_types::DISTANCE_WALKING_RUNNING, 60, 30, 1.0, "Watch"),
            make_record(record_types::DISTANCE_WALKING_RUNNING, 120, 30, 1.2, "Watch"),
        ];
        assert_eq!(
            resolve_distance(&workout, &RouteLookup::new(), &records),
            DistanceResolution::FromRecordsStrict(2.2)
        );
    }

    #[test]
    fn test_strict_records_prefer_watch_source() {
        let workout = make_workout(None, None);
        let records = vec![
            make_record(record_types::DISTANCE_WALKING_RUNNING, 60, 30, 2.0, "iPhone de Ana"),
            make_record(record_types::DISTANCE_WALKING_RUNNING, 90, 30, 2.1, "iPhone de Ana"),
            make_record(record_types::DISTANCE_WALKING_RUNNING, 60, 30, 1.0, "Ana's Watch"),
        ];
        // "Watch" source wins despite having fewer samples
        assert_eq!(
            resolve_distance(&workout, &RouteLookup::new(), &records),
            DistanceResolution::FromRecordsStrict(1.0)
        );
    }

    #[test]
    fn test_strict_records_fall_back_to_most_samples() {
        let workout = make_workout(None, None);
        let records = vec![
            make_record(record_types::DISTANCE_WALKING_RUNNING, 60, 30, 2.0, "Strava"),
            make_record(record_types::DISTANCE_WALKING_RUNNING, 90, 30, 2.1, "Strava"),
            make_record(record_types::DISTANCE_WALKING_RUNNING, 60, 30, 1.0, "Garmin"),
        ];
        assert_eq!(
            resolve_distance(&workout, &RouteLookup::new(), &records),
            DistanceResolution::FromRecordsStrict(4.1)
        );
    }

    #[test]
    fn test_loose_window_used_only_when_strict_empty() {
        let workout = make_workout(None, None);
        // Starts 60s before the workout, so containment fails but overlap holds
        let records = vec![make_record(
            record_types::DISTANCE_WALKING_RUNNING,
            -60,
            300,
            3.3,
            "Watch",
        )];
        assert_eq!(
            resolve_distance(&workout, &RouteLookup::new(), &records),
            DistanceResolution::FromRecordsLoose(3.3)
        );
    }

    #[test]
    fn test_nothing_resolves_to_unresolved() {
        let workout = make_workout(None, None);
        assert_eq!(
            resolve_distance(&workout, &RouteLookup::new(), &[]),
            DistanceResolution::Unresolved
        );
    }

    #[test]
    fn test_pace_guards_zero_distance() {
        assert_eq!(compute_pace(30.0, Some(5.0)), Some(6.0));
        assert_eq!(compute_pace(30.0, Some(0.0)), None);
        assert_eq!(compute_pace(30.0, None), None);
    }

    #[test]
    fn test_summary_route_match() {
        let workout = make_workout(Some(4.5), Some("Watch"));
        let routes = route_lookup(make_route(30, 50));
        let summaries = summarize_running_workouts(&[workout], &[], &routes);
        assert_eq!(summaries.len(), 1);
        assert!(summaries[0].route_matched);
        assert_eq!(summaries[0].avg_hr, None);
        assert_eq!(summaries[0].avg_power, None);
        assert_eq!(summaries[0].efficiency_factor, None);
    }

    #[test]
    fn test_non_running_workouts_excluded() {
        let mut workout = make_workout(Some(4.5), Some("Watch"));
        workout.activity_type = "HKWorkoutActivityTypeCycling".to_string();
        let summaries = summarize_running_workouts(&[workout], &[], &RouteLookup::new());
        assert!(summaries.is_empty());
    }
}
