//! Route document extraction
//!
//! Parses one companion GPX document into an ordered point sequence. Tag
//! matching is by local name, so documents with or without namespace
//! declarations parse identically.

use crate::error::IngestError;
use crate::types::{RoutePoint, RouteTrack};
use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::BufRead;

/// Child element of a trackpoint currently being read.
enum PointChild {
    None,
    Elevation,
    Time,
}

/// Parse one route document into a track.
///
/// Latitude and longitude are required point attributes; elevation defaults
/// to 0 when absent; a point without a timestamp child is skipped entirely.
pub fn extract_route<R: BufRead>(reader: R) -> Result<RouteTrack, IngestError> {
    let mut xml = Reader::from_reader(reader);
    let mut buf = Vec::new();

    let mut track = RouteTrack::default();
    let mut in_point = false;
    let mut lat: Option<f64> = None;
    let mut lon: Option<f64> = None;
    let mut ele: Option<f64> = None;
    let mut time: Option<DateTime<Utc>> = None;
    let mut child = PointChild::None;

    loop {
        match xml.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.name().local_name().as_ref() == b"trkpt" => {
                in_point = true;
                lat = None;
                lon = None;
                ele = None;
                time = None;
                for attr in e.attributes() {
                    let attr = attr?;
                    let value = attr.unescape_value()?;
                    match attr.key.local_name().as_ref() {
                        b"lat" => lat = Some(parse_coord(&value)?),
                        b"lon" => lon = Some(parse_coord(&value)?),
                        _ => {}
                    }
                }
            }
            Event::Start(e) if in_point => {
                child = match e.name().local_name().as_ref() {
                    b"ele" => PointChild::Elevation,
                    b"time" => PointChild::Time,
                    _ => PointChild::None,
                };
            }
            Event::Text(t) if in_point => {
                let text = t.unescape()?;
                match child {
                    PointChild::Elevation => ele = text.trim().parse::<f64>().ok(),
                    PointChild::Time => {
                        time = DateTime::parse_from_rfc3339(text.trim())
                            .ok()
                            .map(|dt| dt.with_timezone(&Utc));
                    }
                    PointChild::None => {}
                }
            }
            Event::End(e) => match e.name().local_name().as_ref() {
                b"trkpt" => {
                    in_point = false;
                    child = PointChild::None;
                    let (point_lat, point_lon) = match (lat, lon) {
                        (Some(lat), Some(lon)) => (lat, lon),
                        _ => {
                            return Err(IngestError::Parse(
                                "trackpoint missing lat/lon attribute".into(),
                            ))
                        }
                    };
                    // No timestamp means the point cannot be aligned; drop it.
                    if let Some(time) = time {
                        track.points.push(RoutePoint {
                            lat: point_lat,
                            lon: point_lon,
                            ele: ele.unwrap_or(0.0),
                            time,
                        });
                    }
                }
                b"ele" | b"time" => child = PointChild::None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(track)
}

fn parse_coord(value: &str) -> Result<f64, IngestError> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| IngestError::Parse(format!("invalid coordinate: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Cursor;

    const NAMESPACED: &str = r#"<?xml version="1.0"?>
<gpx xmlns="http://www.topografix.com/GPX/1/1" version="1.1">
 <trk><trkseg>
  <trkpt lat="51.5000" lon="-0.1000">
   <ele>12.5</ele><time>2024-03-01T08:00:00Z</time>
  </trkpt>
  <trkpt lat="51.5010" lon="-0.1000">
   <time>2024-03-01T08:00:10Z</time>
  </trkpt>
  <trkpt lat="51.5020" lon="-0.1000">
   <ele>13.0</ele>
  </trkpt>
 </trkseg></trk>
</gpx>"#;

    #[test]
    fn test_namespaced_document() {
        let track = extract_route(Cursor::new(NAMESPACED)).unwrap();
        // Third point has no timestamp and is skipped
        assert_eq!(track.points.len(), 2);
        assert_eq!(track.points[0].ele, 12.5);
        // Missing elevation defaults to 0
        assert_eq!(track.points[1].ele, 0.0);
        assert_eq!(
            track.key(),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_unqualified_document() {
        let plain = NAMESPACED.replace(" xmlns=\"http://www.topografix.com/GPX/1/1\"", "");
        let track = extract_route(Cursor::new(plain)).unwrap();
        assert_eq!(track.points.len(), 2);
    }

    #[test]
    fn test_missing_coordinates_fail() {
        let bad = r#"<gpx><trk><trkseg>
            <trkpt lon="-0.1"><time>2024-03-01T08:00:00Z</time></trkpt>
        </trkseg></trk></gpx>"#;
        assert!(extract_route(Cursor::new(bad)).is_err());
    }

    #[test]
    fn test_empty_track() {
        let track = extract_route(Cursor::new("<gpx><trk><trkseg/></trk></gpx>")).unwrap();
        assert!(track.is_empty());
        assert_eq!(track.key(), None);
    }
}
