//! Streaming record extraction
//!
//! Single forward pass over the primary export document. Each qualifying
//! element is visited once, its attributes are copied out, and the event
//! buffer is cleared before the cursor moves on, so peak memory stays bounded
//! by one element plus accumulated output regardless of document size.

use crate::error::IngestError;
use crate::types::record_types;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::{HashMap, HashSet};
use std::io::BufRead;
use tracing::debug;

/// Extraction parameters: which record types to keep, and whether to bucket
/// every type regardless of the allow-list.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub allow_list: HashSet<String>,
    pub capture_all: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            allow_list: [
                record_types::HEART_RATE,
                record_types::RESTING_HEART_RATE,
                record_types::HRV_SDNN,
                record_types::VO2_MAX,
                record_types::ACTIVE_ENERGY,
                record_types::EXERCISE_TIME,
                record_types::STAND_TIME,
                record_types::DISTANCE_WALKING_RUNNING,
                record_types::RUNNING_POWER,
                record_types::RUNNING_SPEED,
                record_types::VERTICAL_OSCILLATION,
                record_types::GROUND_CONTACT_TIME,
                record_types::STRIDE_LENGTH,
                record_types::STEP_COUNT,
                record_types::BASAL_ENERGY,
                record_types::SLEEP_ANALYSIS,
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            capture_all: false,
        }
    }
}

impl ParseOptions {
    /// Reduced allow-list for lower memory use: running dynamics only.
    pub fn reduced() -> Self {
        Self {
            allow_list: [
                record_types::VERTICAL_OSCILLATION,
                record_types::GROUND_CONTACT_TIME,
                record_types::STRIDE_LENGTH,
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            capture_all: false,
        }
    }
}

/// One record element's attributes, verbatim from the document.
#[derive(Debug, Clone, Default)]
pub struct RecordRow {
    pub record_type: String,
    pub start: Option<String>,
    pub end: Option<String>,
    pub value: Option<String>,
    pub unit: Option<String>,
    pub source_name: Option<String>,
    pub creation: Option<String>,
    pub device: Option<String>,
}

/// One workout element with its nested metadata and statistic blocks.
#[derive(Debug, Clone, Default)]
pub struct WorkoutRow {
    /// The workout element's own attributes
    pub attrs: HashMap<String, String>,
    /// Nested metadata entries, keys stored with a `meta_` prefix
    pub metadata: HashMap<String, String>,
    /// Captured from a nested distance statistic block
    pub total_distance: Option<String>,
    pub total_distance_unit: Option<String>,
    /// Captured from a nested energy statistic block
    pub total_energy: Option<String>,
    pub total_energy_unit: Option<String>,
}

/// Raw extraction output, prior to normalization.
#[derive(Debug, Default)]
pub struct RawDocument {
    pub records: Vec<RecordRow>,
    pub workouts: Vec<WorkoutRow>,
    /// Per-type buckets of every record seen, when capture-all is enabled
    pub records_by_type: Option<HashMap<String, Vec<RecordRow>>>,
}

/// Stream the export document and pull out record and workout elements.
pub fn extract_document<R: BufRead>(
    reader: R,
    options: &ParseOptions,
) -> Result<RawDocument, IngestError> {
    let mut xml = Reader::from_reader(reader);
    let mut buf = Vec::new();

    let mut records = Vec::new();
    let mut workouts = Vec::new();
    let mut by_type: HashMap<String, Vec<RecordRow>> = HashMap::new();

    loop {
        match xml.read_event_into(&mut buf)? {
            Event::Empty(e) | Event::Start(e) if e.name().as_ref() == b"Record" => {
                let row = read_record(&e)?;
                if options.capture_all {
                    by_type
                        .entry(row.record_type.clone())
                        .or_default()
                        .push(row.clone());
                }
                if options.allow_list.contains(&row.record_type) {
                    records.push(row);
                }
            }
            Event::Start(e) if e.name().as_ref() == b"Workout" => {
                let row = read_workout(&mut xml, &e)?;
                workouts.push(row);
            }
            Event::Empty(e) if e.name().as_ref() == b"Workout" => {
                // Workout with no nested entries
                workouts.push(WorkoutRow {
                    attrs: attr_map(&e)?,
                    ..Default::default()
                });
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    debug!(
        records = records.len(),
        workouts = workouts.len(),
        "export document extracted"
    );

    Ok(RawDocument {
        records,
        workouts,
        records_by_type: options.capture_all.then_some(by_type),
    })
}

fn read_record(e: &BytesStart<'_>) -> Result<RecordRow, IngestError> {
    let mut row = RecordRow::default();
    for attr in e.attributes() {
        let attr = attr?;
        let value = attr.unescape_value()?.into_owned();
        match attr.key.as_ref() {
            b"type" => row.record_type = value,
            b"startDate" => row.start = Some(value),
            b"endDate" => row.end = Some(value),
            b"value" => row.value = Some(value),
            b"unit" => row.unit = Some(value),
            b"sourceName" => row.source_name = Some(value),
            b"creationDate" => row.creation = Some(value),
            b"device" => row.device = Some(value),
            _ => {}
        }
    }
    Ok(row)
}

/// Consume a workout element through its end tag, collecting nested metadata
/// entries and the known statistic blocks.
fn read_workout<R: BufRead>(
    xml: &mut Reader<R>,
    start: &BytesStart<'_>,
) -> Result<WorkoutRow, IngestError> {
    let mut row = WorkoutRow {
        attrs: attr_map(start)?,
        ..Default::default()
    };

    let mut buf = Vec::new();
    loop {
        match xml.read_event_into(&mut buf)? {
            Event::Empty(e) | Event::Start(e) => match e.name().as_ref() {
                b"MetadataEntry" => {
                    let attrs = attr_map(&e)?;
                    if let Some(key) = attrs.get("key") {
                        let value = attrs.get("value").cloned().unwrap_or_default();
                        row.metadata.insert(format!("meta_{key}"), value);
                    }
                }
                b"WorkoutStatistics" => {
                    let attrs = attr_map(&e)?;
                    match attrs.get("type").map(String::as_str) {
                        Some(record_types::DISTANCE_WALKING_RUNNING) => {
                            row.total_distance = attrs.get("sum").cloned();
                            row.total_distance_unit = attrs.get("unit").cloned();
                        }
                        Some(record_types::ACTIVE_ENERGY) => {
                            row.total_energy = attrs.get("sum").cloned();
                            row.total_energy_unit = attrs.get("unit").cloned();
                        }
                        _ => {}
                    }
                }
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"Workout" => break,
            Event::Eof => {
                return Err(IngestError::Parse(
                    "unexpected end of document inside workout element".into(),
                ))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(row)
}

fn attr_map(e: &BytesStart<'_>) -> Result<HashMap<String, String>, IngestError> {
    let mut map = HashMap::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        map.insert(key, attr.unescape_value()?.into_owned());
    }
    Ok(map)
}
