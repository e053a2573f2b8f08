//! # Chipglass I/O
//!
//! File readers for the Chipglass layout viewer: the GDSII binary stream
//! parser (record reader + document builder) and the DXF text converter,
//! plus a minimal GDSII writer used for round-trips and test fixtures.
//!
//! The single entry point is [`load`]: bytes in, `Document` + `Statistics`
//! out. Fatal errors leave the caller's previous document untouched; the
//! loader only ever returns a fresh value or an error.

pub mod builder;
pub mod dxf;
pub mod error;
pub mod record;
pub mod stats;
pub mod write;

use std::time::Instant;

use chipglass_core::Document;

pub use builder::{BuildReport, LoadOptions};
pub use error::{LoadError, LoadWarning};
pub use stats::Statistics;

/// A successfully loaded document with its summary and non-fatal findings.
#[derive(Debug)]
pub struct LoadResult {
    pub document: Document,
    pub stats: Statistics,
    pub warnings: Vec<LoadWarning>,
}

/// Detected input format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Gds,
    Dxf,
}

/// Decide the format from the file name, falling back to content sniffing:
/// a GDSII stream opens with a HEADER record (type 0x00, data type 0x02),
/// a DXF file is ASCII group-code pairs.
pub fn detect_format(bytes: &[u8], file_name: &str) -> FileFormat {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".dxf") {
        return FileFormat::Dxf;
    }
    if lower.ends_with(".gds") || lower.ends_with(".gds2") || lower.ends_with(".gdsii") {
        return FileFormat::Gds;
    }
    if bytes.len() >= 4 && bytes[2] == 0x00 && bytes[3] == 0x02 {
        return FileFormat::Gds;
    }
    FileFormat::Dxf
}

/// Parse a layout file into a document plus load statistics.
pub fn load(
    bytes: &[u8],
    file_name: &str,
    opts: &mut LoadOptions<'_>,
) -> Result<LoadResult, LoadError> {
    let started = Instant::now();
    let (document, report) = match detect_format(bytes, file_name) {
        FileFormat::Gds => builder::build_gds(bytes, file_name, opts)?,
        FileFormat::Dxf => dxf::build_dxf(bytes, file_name)?,
    };
    let stats = Statistics::gather(&document, &report, bytes.len(), started.elapsed());
    log::info!(
        "loaded {:?} in {:.1?} ({} cells, {} polygons)",
        file_name,
        stats.parse_time,
        stats.cell_count,
        stats.polygon_count
    );
    Ok(LoadResult {
        document,
        stats,
        warnings: report.warnings,
    })
}
