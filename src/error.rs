//! Error types for wearlog

use thiserror::Error;

/// Errors that can occur during ingestion.
///
/// Structural failures abort the whole pipeline; per-record value problems
/// never surface here, they degrade to null fields instead.
#[derive(Debug, Error)]
pub enum IngestError {
    /// No structured export document was found in the archive
    #[error("no export document found in archive")]
    MissingExport,

    #[error("failed to read archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("malformed export document: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("malformed export document: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),

    #[error("failed to parse export document: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
