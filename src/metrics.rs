//! Derived training metrics
//!
//! Pure functions over the normalized tables: daily aggregation with
//! per-metric sum/mean policy and sleep-stage hours, acute:chronic workload
//! ratio with zone classification, training stress balance from exponential
//! moving averages, geodesic route distance, efficiency factor, and the
//! running-dynamics vertical ratio.

use crate::types::{
    record_types, DailyRow, DynamicsSample, RawRecord, RouteTrack, SleepDaily, SleepStage,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mean earth radius in km, the conventional haversine constant.
const EARTH_RADIUS_KM: f64 = 6371.0;
/// Maximum instant gap when pairing running-dynamics channels.
const DYNAMICS_MATCH_TOLERANCE_SEC: i64 = 2;

/// Metric types aggregated by daily sum; everything else takes the mean.
const SUM_METRICS: [&str; 6] = [
    record_types::ACTIVE_ENERGY,
    record_types::EXERCISE_TIME,
    record_types::STAND_TIME,
    record_types::DISTANCE_WALKING_RUNNING,
    record_types::STEP_COUNT,
    record_types::BASAL_ENERGY,
];

/// Great-circle distance between two coordinates in km.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// Total geodesic length of a route track. The first point anchors the sum
/// and contributes zero.
pub fn route_distance_km(track: &RouteTrack) -> f64 {
    track
        .points
        .windows(2)
        .map(|pair| haversine_km(pair[0].lat, pair[0].lon, pair[1].lat, pair[1].lon))
        .sum()
}

/// Average power over average heart rate. Null when either operand is
/// missing or heart rate is zero.
pub fn efficiency_factor(avg_power: Option<f64>, avg_hr: Option<f64>) -> Option<f64> {
    match (avg_power, avg_hr) {
        (Some(power), Some(hr)) if hr != 0.0 => Some(power / hr),
        _ => None,
    }
}

/// Collapse the record table to one row per calendar date.
///
/// Cumulative metrics (energy, time, distance, steps) are summed; sampled
/// metrics are averaged. Sleep records become per-stage hour totals keyed by
/// the record's start date, with total sleep excluding in-bed and awake time.
pub fn daily_aggregates(records: &[RawRecord]) -> Vec<DailyRow> {
    let mut metrics: BTreeMap<NaiveDate, BTreeMap<String, (f64, usize)>> = BTreeMap::new();
    let mut sleep: BTreeMap<NaiveDate, SleepDaily> = BTreeMap::new();

    for record in records {
        let date = record.start.date_naive();

        if record.record_type == record_types::SLEEP_ANALYSIS {
            let stage = record
                .value
                .filter(|v| v.fract() == 0.0 && (0.0..=5.0).contains(v))
                .and_then(|v| SleepStage::from_code(v as u8));
            if let Some(stage) = stage {
                let hours = (record.end - record.start).num_milliseconds() as f64 / 3_600_000.0;
                add_sleep_hours(sleep.entry(date).or_default(), stage, hours);
            }
            continue;
        }

        let Some(value) = record.value else { continue };
        let cell = metrics
            .entry(date)
            .or_default()
            .entry(record.record_type.clone())
            .or_insert((0.0, 0));
        cell.0 += value;
        cell.1 += 1;
    }

    let dates: Vec<NaiveDate> = metrics
        .keys()
        .chain(sleep.keys())
        .copied()
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();

    dates
        .into_iter()
        .map(|date| DailyRow {
            date,
            metrics: metrics
                .remove(&date)
                .unwrap_or_default()
                .into_iter()
                .map(|(type_id, (sum, count))| {
                    let value = if SUM_METRICS.contains(&type_id.as_str()) {
                        sum
                    } else {
                        sum / count as f64
                    };
                    (type_id, value)
                })
                .collect(),
            sleep: sleep.remove(&date),
        })
        .collect()
}

fn add_sleep_hours(daily: &mut SleepDaily, stage: SleepStage, hours: f64) {
    match stage {
        SleepStage::InBed => daily.in_bed += hours,
        SleepStage::Asleep => daily.asleep += hours,
        SleepStage::Awake => daily.awake += hours,
        SleepStage::Core => daily.core += hours,
        SleepStage::Deep => daily.deep += hours,
        SleepStage::Rem => daily.rem += hours,
    }
    daily.total_sleep = daily.asleep + daily.core + daily.deep + daily.rem;
}

/// Acute:chronic workload ratio windows, in days.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcwrConfig {
    pub acute_window: usize,
    pub chronic_window: usize,
}

impl Default for AcwrConfig {
    fn default() -> Self {
        Self {
            acute_window: 7,
            chronic_window: 28,
        }
    }
}

/// Workload-ratio risk zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcwrZone {
    Underload,
    Optimal,
    Elevated,
    High,
}

impl AcwrZone {
    pub fn classify(ratio: f64) -> AcwrZone {
        if ratio < 0.8 {
            AcwrZone::Underload
        } else if ratio <= 1.3 {
            AcwrZone::Optimal
        } else if ratio <= 1.5 {
            AcwrZone::Elevated
        } else {
            AcwrZone::High
        }
    }
}

/// Acute:chronic workload ratio over a contiguous daily-load series.
///
/// Acute load is a rolling sum, chronic load a rolling mean scaled back to
/// the acute window; both windows shrink at the head of the series rather
/// than emitting nulls. A zero chronic load yields null.
pub fn acwr(daily_load: &[f64], config: &AcwrConfig) -> Vec<Option<f64>> {
    (0..daily_load.len())
        .map(|i| {
            let acute_lo = (i + 1).saturating_sub(config.acute_window);
            let acute: f64 = daily_load[acute_lo..=i].iter().sum();

            let chronic_lo = (i + 1).saturating_sub(config.chronic_window);
            let chronic_window = &daily_load[chronic_lo..=i];
            let chronic_mean = chronic_window.iter().sum::<f64>() / chronic_window.len() as f64;

            let denom = chronic_mean * config.acute_window as f64;
            (denom != 0.0).then(|| acute / denom)
        })
        .collect()
}

/// Fatigue/fitness EMA spans, in days.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TsbConfig {
    pub atl_days: usize,
    pub ctl_days: usize,
}

impl Default for TsbConfig {
    fn default() -> Self {
        Self {
            atl_days: 7,
            ctl_days: 42,
        }
    }
}

/// One day of the training-stress-balance series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingStress {
    /// Acute training load (short-span EMA of daily load)
    pub atl: f64,
    /// Chronic training load (long-span EMA of daily load)
    pub ctl: f64,
    /// Yesterday's ctl minus yesterday's atl; null on the first day
    pub tsb: Option<f64>,
}

/// Training stress balance over a contiguous daily-load series.
///
/// Form readiness is measured against yesterday's fitness and fatigue, so
/// the balance lags the EMAs by one day and the first row is null.
pub fn tsb(daily_load: &[f64], config: &TsbConfig) -> Vec<TrainingStress> {
    let atl = ema(daily_load, config.atl_days);
    let ctl = ema(daily_load, config.ctl_days);

    (0..daily_load.len())
        .map(|i| TrainingStress {
            atl: atl[i],
            ctl: ctl[i],
            tsb: (i > 0).then(|| ctl[i - 1] - atl[i - 1]),
        })
        .collect()
}

/// Span-form exponential moving average: alpha = 2 / (span + 1), seeded with
/// the first observation.
fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut current = 0.0;
    for (i, &value) in values.iter().enumerate() {
        current = if i == 0 {
            value
        } else {
            alpha * value + (1.0 - alpha) * current
        };
        out.push(current);
    }
    out
}

/// Align the three running-dynamics channels into complete samples.
///
/// Vertical oscillation defines the sample axis; for each VO sample the
/// nearest ground-contact and stride-length samples within tolerance are
/// attached. Instants missing either partner are dropped.
pub fn vertical_ratio_series(records: &[RawRecord]) -> Vec<DynamicsSample> {
    let vo = channel_samples(records, record_types::VERTICAL_OSCILLATION);
    let gct = channel_samples(records, record_types::GROUND_CONTACT_TIME);
    let sl = channel_samples(records, record_types::STRIDE_LENGTH);

    vo.iter()
        .filter_map(|&(time, vertical_oscillation)| {
            let ground_contact_time = nearest_within(&gct, time)?;
            let stride_length = nearest_within(&sl, time)?;
            // VO in cm against stride length in m, expressed as a percentage
            let vertical_ratio = (vertical_oscillation / (stride_length * 100.0)) * 100.0;
            Some(DynamicsSample {
                time,
                vertical_oscillation,
                ground_contact_time,
                stride_length,
                vertical_ratio,
            })
        })
        .collect()
}

fn channel_samples(records: &[RawRecord], type_id: &str) -> Vec<(DateTime<Utc>, f64)> {
    let mut samples: Vec<_> = records
        .iter()
        .filter(|r| r.record_type == type_id)
        .filter_map(|r| r.value.map(|v| (r.start, v)))
        .collect();
    samples.sort_by_key(|(time, _)| *time);
    samples
}

fn nearest_within(samples: &[(DateTime<Utc>, f64)], time: DateTime<Utc>) -> Option<f64> {
    let idx = samples.partition_point(|(t, _)| *t < time);
    let candidates = [idx.checked_sub(1).and_then(|i| samples.get(i)), samples.get(idx)];
    candidates
        .into_iter()
        .flatten()
        .map(|&(t, v)| ((t - time).num_seconds().abs(), v))
        .filter(|(gap, _)| *gap <= DYNAMICS_MATCH_TOLERANCE_SEC)
        .min_by_key(|(gap, _)| *gap)
        .map(|(_, v)| v)
}
