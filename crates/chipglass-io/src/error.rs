use serde::Serialize;
use thiserror::Error;

/// Fatal load failures. Each carries enough context (byte offset, name,
/// reference chain) to point at the offending spot in the file. A fatal
/// error aborts the load; the caller's previous document stays live.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("truncated file: record at byte offset {offset} extends past the end of the buffer")]
    TruncatedFile { offset: usize },

    #[error("malformed record length {len} at byte offset {offset}")]
    OddRecordLength { offset: usize, len: u16 },

    #[error("unknown data type 0x{tag:02X} at byte offset {offset}")]
    UnknownDataType { offset: usize, tag: u8 },

    #[error("geometry before UNITS record (byte offset {offset})")]
    MissingUnits { offset: usize },

    #[error("cell {name:?} is referenced but never defined")]
    UnresolvedReference { name: String },

    #[error("cell reference cycle: {}", path.join(" -> "))]
    ReferenceCycle { path: Vec<String> },

    #[error("DXF parse failed: {message}")]
    Dxf { message: String },

    #[error("load canceled")]
    Canceled,
}

/// Non-fatal findings accumulated during a load. Surfaced in statistics and
/// in the UI; they never stop a render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
pub enum LoadWarning {
    #[error("cell {cell:?}: dropped polygon with {distinct} distinct point(s)")]
    DegeneratePolygon { cell: String, distinct: usize },

    #[error("skipped {count} record(s) of unknown type 0x{record_type:02X}")]
    UnknownRecord { record_type: u8, count: usize },

    #[error("cell {cell:?}: omitted {cols}x{rows} array of {target:?}")]
    DegenerateArray {
        cell: String,
        target: String,
        cols: u16,
        rows: u16,
    },

    #[error("cell {cell:?}: array of {target:?} steps in a reversed direction")]
    ReversedArrayDirection { cell: String, target: String },
}
