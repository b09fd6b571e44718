//! Per-workout time-series alignment
//!
//! Builds one time-indexed table per workout out of channels sampled at
//! unrelated rates: instrument records are pivoted into per-instant rows,
//! a matched route track is distilled into distance/pace columns, the two
//! are joined by nearest instant, and route columns are interpolated in
//! time across the instrument axis. Every row carries a rounded
//! relative-minute offset so downstream consumers share one axis.

use crate::metrics::haversine_km;
use crate::types::{
    Channel, RawRecord, RouteLookup, RouteTrack, TimeSeriesRow, Workout, WorkoutTimeSeries,
};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

/// Records starting within this buffer around the workout window are
/// considered part of the workout.
const DYNAMICS_BUFFER_SEC: i64 = 120;
/// Route tracks whose first point lies within this window of the workout
/// start are matched.
const ROUTE_MATCH_TOLERANCE_SEC: i64 = 120;
/// Maximum instant gap for the nearest-sample join.
const MERGE_TOLERANCE_SEC: i64 = 5;
/// Raw pace above this is treated as a GPS artifact and nulled.
const MAX_PACE_MIN_KM: f64 = 20.0;
/// Centered moving-mean window for pace smoothing.
const PACE_SMOOTH_WINDOW: usize = 10;

/// One route point reduced to its derived columns.
#[derive(Debug, Clone, Copy)]
struct RouteSample {
    time: DateTime<Utc>,
    elevation: f64,
    dist_delta_km: f64,
    cum_dist_km: f64,
    pace_min_km: Option<f64>,
    pace_smoothed: Option<f64>,
}

/// Build the aligned time series for one workout.
///
/// With instrument samples present they form the row axis and route columns
/// are joined onto it; with no instrument samples the route supplies the
/// axis alone. No samples and no route yields an empty series.
pub fn workout_time_series(
    workout: &Workout,
    records: &[RawRecord],
    routes: &RouteLookup,
) -> WorkoutTimeSeries {
    let dynamics = pivot_dynamics(records, workout);
    let route_series = match_route(workout, routes).map(build_route_series);

    let mut rows: Vec<TimeSeriesRow> = if dynamics.is_empty() {
        match &route_series {
            Some(samples) => samples.iter().map(route_only_row).collect(),
            None => Vec::new(),
        }
    } else {
        let mut rows: Vec<TimeSeriesRow> = dynamics.into_values().collect();
        if let Some(samples) = &route_series {
            merge_nearest(&mut rows, samples);
            interpolate_route_columns(&mut rows);
        }
        rows
    };

    apply_relative_minutes(&mut rows);
    WorkoutTimeSeries { rows }
}

fn match_route<'a>(workout: &Workout, routes: &'a RouteLookup) -> Option<&'a RouteTrack> {
    routes
        .iter()
        .find(|(key, _)| (**key - workout.start).num_seconds().abs() < ROUTE_MATCH_TOLERANCE_SEC)
        .map(|(_, track)| track)
}

/// Pivot instrument records into per-instant rows, one column per channel.
/// Duplicate samples of one channel at one instant are averaged.
fn pivot_dynamics(records: &[RawRecord], workout: &Workout) -> BTreeMap<DateTime<Utc>, TimeSeriesRow> {
    let buffer = Duration::seconds(DYNAMICS_BUFFER_SEC);
    let window_start = workout.start - buffer;
    let window_end = workout.end + buffer;

    let mut cells: BTreeMap<(DateTime<Utc>, Channel), (f64, usize)> = BTreeMap::new();
    for record in records {
        if record.start < window_start || record.start > window_end {
            continue;
        }
        let (Some(channel), Some(value)) =
            (Channel::from_type_id(&record.record_type), record.value)
        else {
            continue;
        };
        let cell = cells.entry((record.start, channel)).or_insert((0.0, 0));
        cell.0 += value;
        cell.1 += 1;
    }

    let mut rows: BTreeMap<DateTime<Utc>, TimeSeriesRow> = BTreeMap::new();
    for ((time, channel), (sum, count)) in cells {
        rows.entry(time)
            .or_insert_with(|| TimeSeriesRow::at(time))
            .set_channel(channel, Some(sum / count as f64));
    }
    rows
}

/// Reduce a route track to derived columns: per-point geodesic delta,
/// cumulative distance, raw pace with artifact nulling, and a centered
/// moving-mean smoothed pace.
fn build_route_series(track: &RouteTrack) -> Vec<RouteSample> {
    let mut cum = 0.0;
    let mut samples: Vec<RouteSample> = Vec::with_capacity(track.points.len());

    for (i, point) in track.points.iter().enumerate() {
        let dist_delta = if i == 0 {
            0.0
        } else {
            let prev = &track.points[i - 1];
            haversine_km(prev.lat, prev.lon, point.lat, point.lon)
        };
        cum += dist_delta;

        let pace = if i == 0 || dist_delta == 0.0 {
            None
        } else {
            let minutes =
                (point.time - track.points[i - 1].time).num_milliseconds() as f64 / 60_000.0;
            let pace = minutes / dist_delta;
            (pace <= MAX_PACE_MIN_KM).then_some(pace)
        };

        samples.push(RouteSample {
            time: point.time,
            elevation: point.ele,
            dist_delta_km: dist_delta,
            cum_dist_km: cum,
            pace_min_km: pace,
            pace_smoothed: None,
        });
    }

    smooth_pace(&mut samples);
    samples
}

/// Centered moving mean over the raw pace, one sample minimum. Null raw
/// samples are skipped, not propagated.
fn smooth_pace(samples: &mut [RouteSample]) {
    let half = PACE_SMOOTH_WINDOW / 2;
    let paces: Vec<Option<f64>> = samples.iter().map(|s| s.pace_min_km).collect();

    for i in 0..samples.len() {
        let lo = i.saturating_sub(half);
        let hi = (i + half).min(paces.len());
        let window: Vec<f64> = paces[lo..hi].iter().filter_map(|p| *p).collect();
        samples[i].pace_smoothed = match window.len() {
            0 => None,
            n => Some(window.iter().sum::<f64>() / n as f64),
        };
    }
}

fn route_only_row(sample: &RouteSample) -> TimeSeriesRow {
    let mut row = TimeSeriesRow::at(sample.time);
    set_route_columns(&mut row, sample);
    row
}

fn set_route_columns(row: &mut TimeSeriesRow, sample: &RouteSample) {
    row.elevation = Some(sample.elevation);
    row.dist_delta_km = Some(sample.dist_delta_km);
    row.cum_dist_km = Some(sample.cum_dist_km);
    row.pace_min_km = sample.pace_min_km;
    row.pace_smoothed = sample.pace_smoothed;
}

/// Join route columns onto the instrument rows by nearest instant, within
/// tolerance. `samples` must be time-ordered, which route documents are.
fn merge_nearest(rows: &mut [TimeSeriesRow], samples: &[RouteSample]) {
    for row in rows.iter_mut() {
        let idx = samples.partition_point(|s| s.time < row.time);
        let after = samples.get(idx);
        let before = idx.checked_sub(1).and_then(|i| samples.get(i));

        let nearest = match (before, after) {
            (Some(b), Some(a)) => {
                if (row.time - b.time) <= (a.time - row.time) {
                    Some(b)
                } else {
                    Some(a)
                }
            }
            (Some(b), None) => Some(b),
            (None, Some(a)) => Some(a),
            (None, None) => None,
        };

        if let Some(sample) = nearest {
            if (sample.time - row.time).num_seconds().abs() <= MERGE_TOLERANCE_SEC {
                set_route_columns(row, sample);
            }
        }
    }
}

/// Fill route-column gaps across the instrument axis: interior gaps are
/// linear in elapsed time, trailing gaps hold the last known value, leading
/// gaps stay null.
fn interpolate_route_columns(rows: &mut [TimeSeriesRow]) {
    let times: Vec<DateTime<Utc>> = rows.iter().map(|r| r.time).collect();

    let columns: [(fn(&TimeSeriesRow) -> Option<f64>, fn(&mut TimeSeriesRow, Option<f64>)); 5] = [
        (|r| r.elevation, |r, v| r.elevation = v),
        (|r| r.dist_delta_km, |r, v| r.dist_delta_km = v),
        (|r| r.cum_dist_km, |r, v| r.cum_dist_km = v),
        (|r| r.pace_min_km, |r, v| r.pace_min_km = v),
        (|r| r.pace_smoothed, |r, v| r.pace_smoothed = v),
    ];

    for (get, set) in columns {
        let mut values: Vec<Option<f64>> = rows.iter().map(get).collect();
        interpolate_in_time(&times, &mut values);
        for (row, value) in rows.iter_mut().zip(values) {
            set(row, value);
        }
    }
}

fn interpolate_in_time(times: &[DateTime<Utc>], values: &mut [Option<f64>]) {
    let known: Vec<usize> = (0..values.len()).filter(|&i| values[i].is_some()).collect();
    // Leading gaps are left null; there is nothing to anchor them to.
    let Some(&last) = known.last() else {
        return;
    };

    for pair in known.windows(2) {
        let (lo, hi) = (pair[0], pair[1]);
        let (Some(a), Some(b)) = (values[lo], values[hi]) else {
            continue;
        };
        let span_ms = (times[hi] - times[lo]).num_milliseconds() as f64;
        for i in lo + 1..hi {
            let t = if span_ms == 0.0 {
                0.0
            } else {
                (times[i] - times[lo]).num_milliseconds() as f64 / span_ms
            };
            values[i] = Some(a + (b - a) * t);
        }
    }

    // Trailing gaps hold the last known value.
    let hold = values[last];
    for value in values.iter_mut().skip(last + 1) {
        *value = hold;
    }
}

/// Minutes since the earliest merged instant, rounded to two decimals.
fn apply_relative_minutes(rows: &mut [TimeSeriesRow]) {
    let Some(origin) = rows.iter().map(|r| r.time).min() else {
        return;
    };
    for row in rows.iter_mut() {
        let minutes = (row.time - origin).num_milliseconds() as f64 / 60_000.0;
        row.rel_min = (minutes * 100.0).round() / 100.0;
    }
}
