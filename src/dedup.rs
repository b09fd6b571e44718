//! Workout deduplication
//!
//! Multiple recording sources (watch, phone, third-party app) frequently log
//! the same physical activity. Near-duplicates are collapsed with a chained
//! tolerance: each candidate is compared only to the most recently accepted
//! member of the open group, not to every member.

use crate::types::Workout;

/// Maximum start-time difference for a candidate to join the open group.
const START_TOLERANCE_SEC: f64 = 600.0;
/// Maximum duration difference for a candidate to join the open group.
const DURATION_TOLERANCE_SEC: f64 = 600.0;

/// Collapse near-duplicate workouts of one activity type.
///
/// Input order is not assumed: workouts are sorted by start ascending with
/// distance descending as the tie-break before grouping. When a group closes,
/// the member with the greatest total distance survives (null distance
/// counts as 0).
pub fn dedup_workouts(mut workouts: Vec<Workout>) -> Vec<Workout> {
    if workouts.is_empty() {
        return workouts;
    }

    workouts.sort_by(|a, b| {
        a.start.cmp(&b.start).then(
            b.total_distance
                .unwrap_or(0.0)
                .partial_cmp(&a.total_distance.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal),
        )
    });

    let mut surviving = Vec::new();
    let mut group: Vec<Workout> = Vec::new();

    for workout in workouts {
        match group.last() {
            Some(last) if chains_with(last, &workout) => group.push(workout),
            Some(_) => {
                surviving.push(close_group(std::mem::take(&mut group)));
                group.push(workout);
            }
            None => group.push(workout),
        }
    }
    surviving.push(close_group(group));

    surviving
}

/// Chained tolerance against the last accepted group member only.
fn chains_with(last: &Workout, candidate: &Workout) -> bool {
    let start_diff = (candidate.start - last.start).num_seconds().abs() as f64;
    let duration_diff = (candidate.duration_min - last.duration_min).abs() * 60.0;
    start_diff < START_TOLERANCE_SEC && duration_diff < DURATION_TOLERANCE_SEC
}

/// The group member with the greatest distance survives; ties keep the
/// earliest-sorted member.
fn close_group(group: Vec<Workout>) -> Workout {
    group
        .into_iter()
        .reduce(|best, candidate| {
            if candidate.total_distance.unwrap_or(0.0) > best.total_distance.unwrap_or(0.0) {
                candidate
            } else {
                best
            }
        })
        .expect("dedup groups are never empty")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::record_types;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;

    fn make_workout(start_min: i64, duration_min: f64, distance: Option<f64>) -> Workout {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
            + chrono::Duration::minutes(start_min);
        Workout {
            activity_type: record_types::WORKOUT_RUNNING.to_string(),
            start,
            end: start + chrono::Duration::seconds((duration_min * 60.0) as i64),
            duration_min,
            total_distance: distance,
            total_distance_unit: distance.map(|_| "km".to_string()),
            total_energy: None,
            total_energy_unit: None,
            source_name: Some("Watch".to_string()),
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn test_near_duplicates_collapse_to_greatest_distance() {
        // 3 minutes apart, durations differing by 2 minutes
        let deduped = dedup_workouts(vec![
            make_workout(0, 30.0, Some(4.8)),
            make_workout(3, 28.0, Some(5.1)),
        ]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].total_distance, Some(5.1));
    }

    #[test]
    fn test_distant_workouts_survive() {
        let deduped = dedup_workouts(vec![
            make_workout(0, 30.0, Some(5.0)),
            make_workout(120, 30.0, Some(5.0)),
        ]);
        assert_eq!(deduped.len(), 2);
    }

    #[test]
    fn test_duration_gap_splits_group() {
        // Same start window but durations 30 vs 45 minutes (900s apart)
        let deduped = dedup_workouts(vec![
            make_workout(0, 30.0, Some(5.0)),
            make_workout(2, 45.0, Some(5.0)),
        ]);
        assert_eq!(deduped.len(), 2);
    }

    #[test]
    fn test_null_distance_treated_as_zero() {
        let deduped = dedup_workouts(vec![
            make_workout(0, 30.0, None),
            make_workout(1, 30.0, Some(0.2)),
        ]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].total_distance, Some(0.2));
    }

    #[test]
    fn test_chained_tolerance_extends_group() {
        // Each member is within tolerance of the previous one, but the third
        // is 16 minutes after the first. Chained comparison still merges all.
        let deduped = dedup_workouts(vec![
            make_workout(0, 30.0, Some(4.0)),
            make_workout(8, 30.0, Some(4.5)),
            make_workout(16, 30.0, Some(4.2)),
        ]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].total_distance, Some(4.5));
    }

    #[test]
    fn test_idempotent() {
        let input = vec![
            make_workout(0, 30.0, Some(4.8)),
            make_workout(3, 28.0, Some(5.1)),
            make_workout(120, 40.0, Some(8.0)),
        ];
        let once = dedup_workouts(input);
        let twice = dedup_workouts(once.clone());
        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(twice.iter()) {
            assert_eq!(a.start, b.start);
            assert_eq!(a.total_distance, b.total_distance);
        }
    }
}
