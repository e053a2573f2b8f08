//! Minimal GDSII stream writer.
//!
//! Enough of the format to serialize a [`Document`] back out: library
//! wrapper, cells, boundaries, single and array references. Used by
//! round-trip tests and fixture construction; the viewer itself never
//! writes files.

use std::io::{self, Write};

use chipglass_core::{Cell, CellRef, Document, Polygon, Vec2};

use crate::record::{f64_to_gds_real64, RecordKind};

/// Fixed timestamp payload for BGNLIB/BGNSTR (the viewer ignores dates).
const TIMESTAMP: [i16; 12] = [2026, 1, 1, 0, 0, 0, 2026, 1, 1, 0, 0, 0];

pub struct GdsWriter<W: Write> {
    out: W,
}

impl<W: Write> GdsWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn write(&mut self, doc: &Document) -> io::Result<()> {
        self.write_i16(RecordKind::Header, &[600])?;
        self.write_i16(RecordKind::BgnLib, &TIMESTAMP)?;
        self.write_str(RecordKind::LibName, "LIB")?;
        self.write_f64(
            RecordKind::Units,
            &[doc.units.dbu_in_user, doc.units.dbu_in_m],
        )?;
        for cell in &doc.cells {
            self.write_cell(cell)?;
        }
        self.write_record(RecordKind::EndLib, 0x00, &[])
    }

    fn write_cell(&mut self, cell: &Cell) -> io::Result<()> {
        self.write_i16(RecordKind::BgnStr, &TIMESTAMP)?;
        self.write_str(RecordKind::StrName, &cell.name)?;
        for poly in &cell.polygons {
            self.write_boundary(poly)?;
        }
        for r in &cell.refs {
            self.write_ref(r)?;
        }
        self.write_record(RecordKind::EndStr, 0x00, &[])
    }

    fn write_boundary(&mut self, poly: &Polygon) -> io::Result<()> {
        self.write_record(RecordKind::Boundary, 0x00, &[])?;
        self.write_i16(RecordKind::Layer, &[poly.layer.layer as i16])?;
        self.write_i16(RecordKind::Datatype, &[poly.layer.datatype as i16])?;
        let mut coords: Vec<i32> = Vec::with_capacity(poly.points.len() * 2 + 2);
        for p in &poly.points {
            coords.push(p.x);
            coords.push(p.y);
        }
        // Close the ring explicitly, as producers conventionally do.
        if let Some(first) = poly.points.first() {
            coords.push(first.x);
            coords.push(first.y);
        }
        self.write_i32(RecordKind::Xy, &coords)?;
        self.write_record(RecordKind::EndEl, 0x00, &[])
    }

    fn write_ref(&mut self, r: &CellRef) -> io::Result<()> {
        let kind = if r.array.is_some() {
            RecordKind::Aref
        } else {
            RecordKind::Sref
        };
        self.write_record(kind, 0x00, &[])?;
        self.write_str(RecordKind::Sname, &r.target)?;
        if r.transform.mirror_x {
            self.write_record(RecordKind::Strans, 0x01, &0x8000u16.to_be_bytes())?;
        } else if r.transform.rotation != 0.0 || r.transform.mag != 1.0 {
            self.write_record(RecordKind::Strans, 0x01, &[0, 0])?;
        }
        if r.transform.mag != 1.0 {
            self.write_f64(RecordKind::Mag, &[r.transform.mag])?;
        }
        if r.transform.rotation != 0.0 {
            self.write_f64(RecordKind::Angle, &[r.transform.rotation])?;
        }
        let origin = r.transform.offset;
        match &r.array {
            None => {
                self.write_i32(RecordKind::Xy, &[origin.x as i32, origin.y as i32])?;
            }
            Some(a) => {
                self.write_i16(RecordKind::ColRow, &[a.cols as i16, a.rows as i16])?;
                let col_ref = origin.add(a.col_step.scale(a.cols as f64));
                let row_ref = origin.add(a.row_step.scale(a.rows as f64));
                let xy = [origin, col_ref, row_ref];
                let coords: Vec<i32> = xy
                    .iter()
                    .flat_map(|v: &Vec2| [v.x as i32, v.y as i32])
                    .collect();
                self.write_i32(RecordKind::Xy, &coords)?;
            }
        }
        self.write_record(RecordKind::EndEl, 0x00, &[])
    }

    // ── Record primitives ────────────────────────────────────────────

    fn write_record(&mut self, kind: RecordKind, dtype: u8, payload: &[u8]) -> io::Result<()> {
        let total = (payload.len() + 4) as u16;
        self.out.write_all(&total.to_be_bytes())?;
        self.out.write_all(&[kind.code(), dtype])?;
        self.out.write_all(payload)
    }

    fn write_i16(&mut self, kind: RecordKind, values: &[i16]) -> io::Result<()> {
        let payload: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        self.write_record(kind, 0x02, &payload)
    }

    fn write_i32(&mut self, kind: RecordKind, values: &[i32]) -> io::Result<()> {
        let payload: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        self.write_record(kind, 0x03, &payload)
    }

    fn write_f64(&mut self, kind: RecordKind, values: &[f64]) -> io::Result<()> {
        let payload: Vec<u8> = values.iter().flat_map(|v| f64_to_gds_real64(*v)).collect();
        self.write_record(kind, 0x05, &payload)
    }

    fn write_str(&mut self, kind: RecordKind, s: &str) -> io::Result<()> {
        let mut payload: Vec<u8> = s.bytes().collect();
        if payload.len() % 2 != 0 {
            payload.push(0); // even length, NUL padded
        }
        self.write_record(kind, 0x06, &payload)
    }
}

/// Serialize a document to an in-memory GDSII stream.
pub fn to_bytes(doc: &Document) -> Vec<u8> {
    let mut out = Vec::new();
    GdsWriter::new(&mut out)
        .write(doc)
        .expect("writing to a Vec cannot fail");
    out
}
