//! Export archive reading
//!
//! Opens the compressed export archive, locates the primary export document
//! among its entries, streams it through the record extractor, and parses
//! every companion route document. A route document that fails to parse is
//! logged and skipped; the primary document is mandatory.

use crate::error::IngestError;
use crate::extract::{extract_document, ParseOptions, RawDocument};
use crate::route::extract_route;
use crate::types::RouteLookup;
use std::io::{BufReader, Read, Seek};
use tracing::{debug, warn};
use zip::ZipArchive;

/// Everything pulled out of one export archive, prior to normalization.
#[derive(Debug, Default)]
pub struct ArchiveContents {
    pub document: RawDocument,
    pub routes: RouteLookup,
}

/// Read an export archive: the primary document plus all route documents.
pub fn read_archive<R: Read + Seek>(
    reader: R,
    options: &ParseOptions,
) -> Result<ArchiveContents, IngestError> {
    let mut archive = ZipArchive::new(reader)?;
    let names: Vec<String> = archive.file_names().map(String::from).collect();

    let export_name = find_export_entry(&names).ok_or(IngestError::MissingExport)?;
    debug!(entry = %export_name, "primary export document located");

    let document = {
        let entry = archive.by_name(&export_name)?;
        extract_document(BufReader::new(entry), options)?
    };

    let mut routes = RouteLookup::new();
    for name in names.iter().filter(|n| n.ends_with(".gpx")) {
        let entry = archive.by_name(name)?;
        match extract_route(BufReader::new(entry)) {
            Ok(track) if !track.is_empty() => {
                if let Some(key) = track.key() {
                    routes.insert(key, track);
                }
            }
            Ok(_) => debug!(entry = %name, "route document has no usable points"),
            // A single bad route never fails the whole archive
            Err(err) => warn!(entry = %name, error = %err, "skipping route document"),
        }
    }

    debug!(routes = routes.len(), "archive read");
    Ok(ArchiveContents { document, routes })
}

/// The primary document is the `.xml` entry one directory deep; exports
/// place it at `<root>/export.xml`. Any other `.xml` entry is the fallback.
fn find_export_entry(names: &[String]) -> Option<String> {
    let xml: Vec<&String> = names.iter().filter(|n| n.ends_with(".xml")).collect();
    xml.iter()
        .find(|n| n.matches('/').count() == 1)
        .or_else(|| xml.first())
        .map(|n| n.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const EXPORT: &str = r#"<HealthData>
 <Record type="HKQuantityTypeIdentifierHeartRate" sourceName="Watch"
         startDate="2024-03-01 08:00:00 +0000" endDate="2024-03-01 08:00:05 +0000"
         value="62" unit="count/min"/>
</HealthData>"#;

    const ROUTE: &str = r#"<gpx><trk><trkseg>
 <trkpt lat="51.5" lon="-0.1"><time>2024-03-01T08:00:00Z</time></trkpt>
 <trkpt lat="51.501" lon="-0.1"><time>2024-03-01T08:00:10Z</time></trkpt>
</trkseg></trk></gpx>"#;

    fn build_zip(entries: &[(&str, &str)]) -> Cursor<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap()
    }

    #[test]
    fn test_primary_document_one_directory_deep_preferred() {
        let zip = build_zip(&[
            ("export_root/extra/other.xml", "<HealthData/>"),
            ("export_root/export.xml", EXPORT),
        ]);
        let contents = read_archive(zip, &ParseOptions::default()).unwrap();
        assert_eq!(contents.document.records.len(), 1);
    }

    #[test]
    fn test_fallback_to_any_xml_entry() {
        let zip = build_zip(&[("export.xml", EXPORT)]);
        let contents = read_archive(zip, &ParseOptions::default()).unwrap();
        assert_eq!(contents.document.records.len(), 1);
    }

    #[test]
    fn test_missing_export_document() {
        let zip = build_zip(&[("readme.txt", "no xml here")]);
        let err = read_archive(zip, &ParseOptions::default()).unwrap_err();
        assert!(matches!(err, IngestError::MissingExport));
    }

    #[test]
    fn test_routes_collected_and_keyed() {
        let zip = build_zip(&[
            ("export_root/export.xml", EXPORT),
            ("export_root/workout-routes/route_1.gpx", ROUTE),
        ]);
        let contents = read_archive(zip, &ParseOptions::default()).unwrap();
        assert_eq!(contents.routes.len(), 1);
    }

    #[test]
    fn test_bad_route_skipped_not_fatal() {
        let zip = build_zip(&[
            ("export_root/export.xml", EXPORT),
            ("export_root/workout-routes/bad.gpx", "<gpx><trkpt lon=\"1\"</gpx>"),
            ("export_root/workout-routes/good.gpx", ROUTE),
        ]);
        let contents = read_archive(zip, &ParseOptions::default()).unwrap();
        assert_eq!(contents.routes.len(), 1);
    }

    #[test]
    fn test_empty_route_not_inserted() {
        let zip = build_zip(&[
            ("export_root/export.xml", EXPORT),
            ("export_root/workout-routes/empty.gpx", "<gpx><trk><trkseg/></trk></gpx>"),
        ]);
        let contents = read_archive(zip, &ParseOptions::default()).unwrap();
        assert!(contents.routes.is_empty());
    }
}
