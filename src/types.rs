//! Core types for the wearlog pipeline
//!
//! This module defines the tables that flow through each stage of the
//! pipeline: normalized raw records, workouts, route tracks, and the derived
//! daily/per-workout views built on top of them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Well-known record type identifiers (HealthKit naming).
pub mod record_types {
    pub const HEART_RATE: &str = "HKQuantityTypeIdentifierHeartRate";
    pub const RESTING_HEART_RATE: &str = "HKQuantityTypeIdentifierRestingHeartRate";
    pub const HRV_SDNN: &str = "HKQuantityTypeIdentifierHeartRateVariabilitySDNN";
    pub const VO2_MAX: &str = "HKQuantityTypeIdentifierVO2Max";
    pub const ACTIVE_ENERGY: &str = "HKQuantityTypeIdentifierActiveEnergyBurned";
    pub const EXERCISE_TIME: &str = "HKQuantityTypeIdentifierAppleExerciseTime";
    pub const STAND_TIME: &str = "HKQuantityTypeIdentifierAppleStandTime";
    pub const DISTANCE_WALKING_RUNNING: &str = "HKQuantityTypeIdentifierDistanceWalkingRunning";
    pub const DISTANCE_CYCLING: &str = "HKQuantityTypeIdentifierDistanceCycling";
    pub const DISTANCE_SWIMMING: &str = "HKQuantityTypeIdentifierDistanceSwimming";
    pub const RUNNING_POWER: &str = "HKQuantityTypeIdentifierRunningPower";
    pub const RUNNING_SPEED: &str = "HKQuantityTypeIdentifierRunningSpeed";
    pub const VERTICAL_OSCILLATION: &str = "HKQuantityTypeIdentifierRunningVerticalOscillation";
    pub const GROUND_CONTACT_TIME: &str = "HKQuantityTypeIdentifierRunningGroundContactTime";
    pub const STRIDE_LENGTH: &str = "HKQuantityTypeIdentifierRunningStrideLength";
    pub const STEP_COUNT: &str = "HKQuantityTypeIdentifierStepCount";
    pub const BASAL_ENERGY: &str = "HKQuantityTypeIdentifierBasalEnergyBurned";
    pub const SLEEP_ANALYSIS: &str = "HKCategoryTypeIdentifierSleepAnalysis";

    pub const WORKOUT_RUNNING: &str = "HKWorkoutActivityTypeRunning";
}

/// Sleep stage codes as stored in normalized record values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepStage {
    InBed,
    Asleep,
    Awake,
    Core,
    Deep,
    Rem,
}

impl SleepStage {
    /// Integer code used in the normalized record table (0-5).
    pub fn code(&self) -> u8 {
        match self {
            SleepStage::InBed => 0,
            SleepStage::Asleep => 1,
            SleepStage::Awake => 2,
            SleepStage::Core => 3,
            SleepStage::Deep => 4,
            SleepStage::Rem => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<SleepStage> {
        match code {
            0 => Some(SleepStage::InBed),
            1 => Some(SleepStage::Asleep),
            2 => Some(SleepStage::Awake),
            3 => Some(SleepStage::Core),
            4 => Some(SleepStage::Deep),
            5 => Some(SleepStage::Rem),
            _ => None,
        }
    }

    /// Map an export label to a stage. Covers the long HealthKit category
    /// names, the short names, and numeric-string forms. `AsleepUnspecified`
    /// maps to `Asleep`.
    pub fn from_label(label: &str) -> Option<SleepStage> {
        let trimmed = label.trim();
        let stage = match trimmed {
            "HKCategoryValueSleepAnalysisInBed" | "InBed" => SleepStage::InBed,
            "HKCategoryValueSleepAnalysisAsleep"
            | "HKCategoryValueSleepAnalysisAsleepUnspecified"
            | "Asleep"
            | "AsleepUnspecified" => SleepStage::Asleep,
            "HKCategoryValueSleepAnalysisAwake" | "Awake" => SleepStage::Awake,
            "HKCategoryValueSleepAnalysisAsleepCore" | "Core" => SleepStage::Core,
            "HKCategoryValueSleepAnalysisAsleepDeep" | "Deep" => SleepStage::Deep,
            "HKCategoryValueSleepAnalysisAsleepREM" | "REM" => SleepStage::Rem,
            other => {
                // Numeric-string forms ("3", "3.0") already carry the code.
                let code = other.parse::<f64>().ok()?;
                if code.fract() != 0.0 || !(0.0..=5.0).contains(&code) {
                    return None;
                }
                return SleepStage::from_code(code as u8);
            }
        };
        Some(stage)
    }
}

/// One normalized attribute record from the export document.
///
/// Immutable once produced: start/end are UTC instants, the value is numeric
/// (or an integer sleep-stage code for sleep records) and distances are in km.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    /// Record type identifier, e.g. `HKQuantityTypeIdentifierHeartRate`
    pub record_type: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Numeric value; `None` when the exported value failed to coerce
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub source_name: Option<String>,
    pub creation: Option<DateTime<Utc>>,
    pub device: Option<String>,
}

/// One workout entry from the export document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workout {
    pub activity_type: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Duration in minutes; back-filled from the start/end window when the
    /// exported attribute is missing or zero
    pub duration_min: f64,
    /// Total distance in km after normalization
    pub total_distance: Option<f64>,
    pub total_distance_unit: Option<String>,
    pub total_energy: Option<f64>,
    pub total_energy_unit: Option<String>,
    pub source_name: Option<String>,
    /// Nested metadata entries, keys stored with a `meta_` prefix
    pub metadata: HashMap<String, String>,
}

/// One geographic sample from a companion route document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RoutePoint {
    pub lat: f64,
    pub lon: f64,
    /// Elevation in meters; 0 when the route document omits it
    pub ele: f64,
    pub time: DateTime<Utc>,
}

/// Ordered, timestamped point sequence recorded during one activity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteTrack {
    pub points: Vec<RoutePoint>,
}

impl RouteTrack {
    /// Lookup key for workout matching: the first retained point's instant.
    pub fn key(&self) -> Option<DateTime<Utc>> {
        self.points.first().map(|p| p.time)
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Route tracks keyed by their first point's instant.
pub type RouteLookup = BTreeMap<DateTime<Utc>, RouteTrack>;

/// Per-stage sleep durations for one calendar date, in hours.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SleepDaily {
    pub in_bed: f64,
    pub asleep: f64,
    pub awake: f64,
    pub core: f64,
    pub deep: f64,
    pub rem: f64,
    /// Asleep + Core + Deep + REM (excludes InBed and Awake)
    pub total_sleep: f64,
}

/// One row of the daily aggregate table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyRow {
    pub date: NaiveDate,
    /// Metric type identifier to aggregated value (mean or sum per kind)
    pub metrics: BTreeMap<String, f64>,
    /// Present only on dates that carry sleep records
    pub sleep: Option<SleepDaily>,
}

/// Fixed set of instrument channels carried by a workout time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    HeartRate,
    Power,
    VerticalOscillation,
    GroundContactTime,
    StrideLength,
}

impl Channel {
    pub const ALL: [Channel; 5] = [
        Channel::HeartRate,
        Channel::Power,
        Channel::VerticalOscillation,
        Channel::GroundContactTime,
        Channel::StrideLength,
    ];

    pub fn from_type_id(type_id: &str) -> Option<Channel> {
        match type_id {
            record_types::HEART_RATE => Some(Channel::HeartRate),
            record_types::RUNNING_POWER => Some(Channel::Power),
            record_types::VERTICAL_OSCILLATION => Some(Channel::VerticalOscillation),
            record_types::GROUND_CONTACT_TIME => Some(Channel::GroundContactTime),
            record_types::STRIDE_LENGTH => Some(Channel::StrideLength),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::HeartRate => "heart_rate",
            Channel::Power => "power",
            Channel::VerticalOscillation => "vertical_oscillation",
            Channel::GroundContactTime => "ground_contact_time",
            Channel::StrideLength => "stride_length",
        }
    }
}

/// Outcome of the workout distance fallback chain, tagged by which step
/// resolved it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", content = "km", rename_all = "snake_case")]
pub enum DistanceResolution {
    /// Summed geodesic distance of a route matched within 120s of start
    FromRoute(f64),
    /// The workout's own recorded distance attribute
    FromAttribute(f64),
    /// Summed distance records strictly contained in the workout window
    FromRecordsStrict(f64),
    /// Summed distance records merely overlapping the workout window
    FromRecordsLoose(f64),
    Unresolved,
}

impl DistanceResolution {
    pub fn value(&self) -> Option<f64> {
        match self {
            DistanceResolution::FromRoute(km)
            | DistanceResolution::FromAttribute(km)
            | DistanceResolution::FromRecordsStrict(km)
            | DistanceResolution::FromRecordsLoose(km) => Some(*km),
            DistanceResolution::Unresolved => None,
        }
    }

    /// True when the distance came from a matched route track.
    pub fn is_route(&self) -> bool {
        matches!(self, DistanceResolution::FromRoute(_))
    }
}

/// A deduplicated running workout with reconciled metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunningWorkoutSummary {
    pub workout: Workout,
    pub avg_hr: Option<f64>,
    pub avg_power: Option<f64>,
    pub distance: DistanceResolution,
    /// Duration / distance, minutes per km; `None` when distance is absent
    /// or zero
    pub pace_min_km: Option<f64>,
    /// Avg power / avg HR; `None` when either operand is missing or HR is 0
    pub efficiency_factor: Option<f64>,
    pub route_matched: bool,
}

/// One row of a per-workout aligned time series.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeSeriesRow {
    pub time: DateTime<Utc>,
    pub heart_rate: Option<f64>,
    pub power: Option<f64>,
    pub vertical_oscillation: Option<f64>,
    pub ground_contact_time: Option<f64>,
    pub stride_length: Option<f64>,
    /// Route-derived columns, filled when a route track was merged
    pub elevation: Option<f64>,
    pub dist_delta_km: Option<f64>,
    pub cum_dist_km: Option<f64>,
    pub pace_min_km: Option<f64>,
    pub pace_smoothed: Option<f64>,
    /// Minutes since the merged series' earliest instant, rounded to 2
    /// decimals: the shared axis for heterogeneous-rate channels
    pub rel_min: f64,
}

impl TimeSeriesRow {
    pub fn at(time: DateTime<Utc>) -> Self {
        Self {
            time,
            heart_rate: None,
            power: None,
            vertical_oscillation: None,
            ground_contact_time: None,
            stride_length: None,
            elevation: None,
            dist_delta_km: None,
            cum_dist_km: None,
            pace_min_km: None,
            pace_smoothed: None,
            rel_min: 0.0,
        }
    }

    pub fn channel(&self, channel: Channel) -> Option<f64> {
        match channel {
            Channel::HeartRate => self.heart_rate,
            Channel::Power => self.power,
            Channel::VerticalOscillation => self.vertical_oscillation,
            Channel::GroundContactTime => self.ground_contact_time,
            Channel::StrideLength => self.stride_length,
        }
    }

    pub fn set_channel(&mut self, channel: Channel, value: Option<f64>) {
        match channel {
            Channel::HeartRate => self.heart_rate = value,
            Channel::Power => self.power = value,
            Channel::VerticalOscillation => self.vertical_oscillation = value,
            Channel::GroundContactTime => self.ground_contact_time = value,
            Channel::StrideLength => self.stride_length = value,
        }
    }
}

/// Time-indexed table of one workout's merged instrument and route channels.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkoutTimeSeries {
    pub rows: Vec<TimeSeriesRow>,
}

impl WorkoutTimeSeries {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One aligned running-dynamics sample (vertical oscillation, ground contact
/// time, stride length) with the derived vertical ratio.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DynamicsSample {
    pub time: DateTime<Utc>,
    /// Vertical oscillation in cm
    pub vertical_oscillation: f64,
    /// Ground contact time in ms
    pub ground_contact_time: f64,
    /// Stride length in m
    pub stride_length: f64,
    /// (VO cm / (SL m * 100)) * 100, in percent
    pub vertical_ratio: f64,
}
