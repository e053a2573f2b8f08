//! Folds the GDSII record stream into a [`Document`].
//!
//! A small pushdown state machine walks the stream: library level, cell
//! level, element level. Element records accumulate into scratch structs
//! that are finalized on `ENDEL`. Reference targets are held by name and
//! resolved after the whole file is parsed, at which point one topological
//! sort validates the DAG and drives the bottom-up bounds pass.

use std::collections::{HashMap, HashSet};

use chipglass_core::{
    ArraySpec, CancelToken, Cell, CellRef, Document, LayerKey, Point, Polygon, Transform, Units,
    Vec2,
};

use crate::error::{LoadError, LoadWarning};
use crate::record::{Record, RecordIter, RecordKind};

/// Records between cooperative yields (progress callback + cancel check).
const YIELD_EVERY_RECORDS: usize = 10_000;

/// STRANS bit 0 (leftmost): reflect about X before rotation.
const STRANS_REFLECT: u16 = 0x8000;

/// Host hooks for a load: progress reporting and cancellation. Progress is
/// monotonic 0–100, tied to bytes consumed.
#[derive(Default)]
pub struct LoadOptions<'a> {
    pub progress: Option<&'a mut dyn FnMut(u8, &str)>,
    pub cancel: CancelToken,
}

impl<'a> LoadOptions<'a> {
    fn report(&mut self, percent: u8, message: &str) {
        if let Some(cb) = self.progress.as_mut() {
            cb(percent, message);
        }
    }
}

/// Non-fatal findings of one load, reported alongside the document.
#[derive(Debug, Default)]
pub struct BuildReport {
    pub warnings: Vec<LoadWarning>,
    pub degenerate_polygons: usize,
    pub unknown_records: usize,
    pub format_version: Option<i16>,
    pub library_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    TopLevel,
    InLibrary,
    InCell,
    InBoundary,
    InSref,
    InAref,
}

#[derive(Default)]
struct PendingBoundary {
    layer: u16,
    datatype: u16,
    points: Vec<Point>,
}

#[derive(Default)]
struct PendingRef {
    sname: Option<String>,
    mirror_x: bool,
    mag: Option<f64>,
    angle: Option<f64>,
    xy: Vec<Point>,
    colrow: Option<(i16, i16)>,
}

struct Builder<'a, 'b> {
    doc: Document,
    report: BuildReport,
    unknown_counts: HashMap<u8, usize>,
    state: State,
    units_seen: bool,
    cur_cell: Option<Cell>,
    boundary: PendingBoundary,
    pending_ref: PendingRef,
    /// Inside a PATH/TEXT/NODE/BOX element the viewer does not model;
    /// everything up to ENDEL is ignored.
    skipping_element: bool,
    opts: &'a mut LoadOptions<'b>,
}

/// Parse a GDSII byte buffer into a document.
pub fn build_gds(
    bytes: &[u8],
    file_name: &str,
    opts: &mut LoadOptions<'_>,
) -> Result<(Document, BuildReport), LoadError> {
    let mut b = Builder {
        doc: Document::new(file_name),
        report: BuildReport::default(),
        unknown_counts: HashMap::new(),
        state: State::TopLevel,
        units_seen: false,
        cur_cell: None,
        boundary: PendingBoundary::default(),
        pending_ref: PendingRef::default(),
        skipping_element: false,
        opts,
    };
    b.consume_stream(bytes)?;
    b.finish()
}

impl Builder<'_, '_> {
    fn consume_stream(&mut self, bytes: &[u8]) -> Result<(), LoadError> {
        let total = bytes.len().max(1);
        let mut since_yield = 0usize;
        let mut iter = RecordIter::new(bytes);
        while let Some(record) = iter.next() {
            let record = record?;
            since_yield += 1;
            if since_yield >= YIELD_EVERY_RECORDS {
                since_yield = 0;
                if self.opts.cancel.is_canceled() {
                    return Err(LoadError::Canceled);
                }
                let pct = (iter.pos() * 100 / total).min(99) as u8;
                self.opts.report(pct, "Parsing records");
            }
            if self.handle(record)? {
                break; // ENDLIB
            }
        }
        Ok(())
    }

    /// Returns `true` once ENDLIB terminates the stream.
    fn handle(&mut self, record: Record) -> Result<bool, LoadError> {
        use RecordKind as R;

        if let R::Unknown(t) = record.kind {
            *self.unknown_counts.entry(t).or_insert(0) += 1;
            self.report.unknown_records += 1;
            return Ok(false);
        }

        if self.skipping_element {
            if record.kind == R::EndEl {
                self.skipping_element = false;
            }
            return Ok(false);
        }

        match (self.state, record.kind) {
            (State::TopLevel, R::Header) => {
                self.report.format_version = record.data.first_i16();
                if let Some(v) = self.report.format_version {
                    log::debug!("GDSII format version {v}");
                }
                self.state = State::InLibrary;
            }

            (State::InLibrary, R::BgnLib) => {} // timestamps
            (State::InLibrary, R::LibName) => {
                self.report.library_name = record.data.str().map(str::to_string);
            }
            (State::InLibrary, R::Units) => {
                if let Some((dbu_in_user, dbu_in_m)) = record.data.f64_pair() {
                    self.doc.units = Units {
                        dbu_in_user,
                        dbu_in_m,
                    };
                    self.units_seen = true;
                    log::debug!("units: 1 DBU = {dbu_in_user} user units = {dbu_in_m} m");
                }
            }
            (State::InLibrary, R::BgnStr) => {
                self.cur_cell = Some(Cell::new(""));
                self.state = State::InCell;
            }
            (State::InLibrary, R::EndLib) => return Ok(true),

            (State::InCell, R::StrName) => {
                if let (Some(cell), Some(name)) = (self.cur_cell.as_mut(), record.data.str()) {
                    cell.name = name.to_string();
                }
            }
            (State::InCell, R::Boundary) => {
                if !self.units_seen {
                    return Err(LoadError::MissingUnits {
                        offset: record.offset,
                    });
                }
                self.boundary = PendingBoundary::default();
                self.state = State::InBoundary;
            }
            (State::InCell, R::Sref) => {
                self.pending_ref = PendingRef::default();
                self.state = State::InSref;
            }
            (State::InCell, R::Aref) => {
                self.pending_ref = PendingRef::default();
                self.state = State::InAref;
            }
            (State::InCell, R::Path | R::Text | R::Node | R::Box_) => {
                // Legal GDSII, but outside the viewer's geometry model.
                self.skipping_element = true;
            }
            (State::InCell, R::EndStr) => {
                if let Some(cell) = self.cur_cell.take() {
                    if cell.name.is_empty() {
                        log::warn!("cell without STRNAME at offset {}, dropped", record.offset);
                    } else {
                        self.doc.add_cell(cell);
                    }
                }
                self.state = State::InLibrary;
            }

            (State::InBoundary, R::Layer) => {
                self.boundary.layer = record.data.first_i16().unwrap_or(0).max(0) as u16;
            }
            (State::InBoundary, R::Datatype) => {
                self.boundary.datatype = record.data.first_i16().unwrap_or(0).max(0) as u16;
            }
            (State::InBoundary, R::Xy) => {
                for pair in record.data.i32s().chunks_exact(2) {
                    self.boundary.points.push(Point::new(pair[0], pair[1]));
                }
            }
            (State::InBoundary, R::EndEl) => {
                self.finish_boundary();
                self.state = State::InCell;
            }

            (State::InSref | State::InAref, R::Sname) => {
                self.pending_ref.sname = record.data.str().map(str::to_string);
            }
            (State::InSref | State::InAref, R::Strans) => {
                if let Some(bits) = record.data.bits() {
                    self.pending_ref.mirror_x = bits & STRANS_REFLECT != 0;
                }
            }
            (State::InSref | State::InAref, R::Mag) => {
                self.pending_ref.mag = record.data.first_f64();
            }
            (State::InSref | State::InAref, R::Angle) => {
                self.pending_ref.angle = record.data.first_f64();
            }
            (State::InSref | State::InAref, R::Xy) => {
                for pair in record.data.i32s().chunks_exact(2) {
                    self.pending_ref.xy.push(Point::new(pair[0], pair[1]));
                }
            }
            (State::InAref, R::ColRow) => {
                self.pending_ref.colrow = record.data.i16_pair();
            }
            (State::InSref, R::EndEl) => {
                self.finish_ref(false);
                self.state = State::InCell;
            }
            (State::InAref, R::EndEl) => {
                self.finish_ref(true);
                self.state = State::InCell;
            }

            (state, kind) => {
                log::debug!("ignoring record {kind:?} in state {state:?}");
            }
        }
        Ok(false)
    }

    fn finish_boundary(&mut self) {
        let mut points = std::mem::take(&mut self.boundary.points);
        // GDS boundaries usually repeat the first point; strip the closer.
        if points.len() > 1 && points.first() == points.last() {
            points.pop();
        }
        let distinct: HashSet<Point> = points.iter().copied().collect();
        let cell = match self.cur_cell.as_mut() {
            Some(c) => c,
            None => return,
        };
        if distinct.len() < 3 {
            self.report.degenerate_polygons += 1;
            self.report.warnings.push(LoadWarning::DegeneratePolygon {
                cell: cell.name.clone(),
                distinct: distinct.len(),
            });
            return;
        }
        let key = LayerKey::new(self.boundary.layer, self.boundary.datatype);
        self.doc.layers.ensure(key);
        cell.polygons.push(Polygon::new(key, points));
    }

    fn finish_ref(&mut self, arrayed: bool) {
        let pending = std::mem::take(&mut self.pending_ref);
        let cell = match self.cur_cell.as_mut() {
            Some(c) => c,
            None => return,
        };
        let target = match pending.sname {
            Some(s) if !s.is_empty() => s,
            _ => {
                log::warn!("reference without SNAME in cell {:?}, dropped", cell.name);
                return;
            }
        };
        let origin = match pending.xy.first() {
            Some(p) => p.to_vec2(),
            None => Vec2::ZERO,
        };
        let transform = Transform {
            offset: origin,
            rotation: pending.angle.unwrap_or(0.0),
            mirror_x: pending.mirror_x,
            mag: pending.mag.unwrap_or(1.0),
        };

        let array = if arrayed {
            let (cols, rows) = pending.colrow.unwrap_or((0, 0));
            if cols <= 0 || rows <= 0 {
                self.report.warnings.push(LoadWarning::DegenerateArray {
                    cell: cell.name.clone(),
                    target,
                    cols: cols.max(0) as u16,
                    rows: rows.max(0) as u16,
                });
                return;
            }
            let (cols, rows) = (cols as u16, rows as u16);
            if pending.xy.len() < 3 {
                log::warn!("AREF of {target:?} without lattice points, dropped");
                return;
            }
            if cols == 1 && rows == 1 {
                None // a 1x1 array is just a reference
            } else {
                let col_ref = pending.xy[1].to_vec2();
                let row_ref = pending.xy[2].to_vec2();
                let col_step = col_ref.sub(origin).scale(1.0 / cols as f64);
                let row_step = row_ref.sub(origin).scale(1.0 / rows as f64);
                // Reversed lattice directions are kept as-is but noted.
                if step_is_reversed(col_step) || step_is_reversed(row_step) {
                    self.report.warnings.push(LoadWarning::ReversedArrayDirection {
                        cell: cell.name.clone(),
                        target: target.clone(),
                    });
                }
                Some(ArraySpec {
                    cols,
                    rows,
                    col_step,
                    row_step,
                })
            }
        } else {
            None
        };

        cell.refs.push(CellRef::new(target, transform, array));
    }

    fn finish(mut self) -> Result<(Document, BuildReport), LoadError> {
        if let Some(cell) = self.cur_cell.take() {
            // ENDLIB before ENDSTR; keep what we have.
            if !cell.name.is_empty() {
                self.doc.add_cell(cell);
            }
        }
        let mut unknowns: Vec<(u8, usize)> = self.unknown_counts.drain().collect();
        unknowns.sort_unstable();
        for (record_type, count) in unknowns {
            self.report
                .warnings
                .push(LoadWarning::UnknownRecord { record_type, count });
        }

        self.opts.report(100, "Validating hierarchy");
        if self.opts.cancel.is_canceled() {
            return Err(LoadError::Canceled);
        }
        finalize_document(&mut self.doc)?;
        self.opts.report(100, "Done");

        log::info!(
            "parsed {:?}: {} cells, {} polygons, {} top cell(s)",
            self.doc.file_name,
            self.doc.cell_count(),
            self.doc.polygon_count(),
            self.doc.top_cells.len()
        );
        Ok((self.doc, self.report))
    }
}

/// A lattice step runs "backwards" when its dominant component is negative.
/// The dominant-axis test keeps rotated arrays (whose column step may point
/// along Y) out of the warning.
fn step_is_reversed(step: Vec2) -> bool {
    if step.x.abs() >= step.y.abs() {
        step.x < 0.0
    } else {
        step.y < 0.0
    }
}

/// Post-parse validation and derived state, shared by the GDS and DXF paths:
/// resolve reference targets, check the DAG, find top cells, compute bounds
/// bottom-up, flag minimap skips.
pub fn finalize_document(doc: &mut Document) -> Result<(), LoadError> {
    doc.resolve_refs()
        .map_err(|name| LoadError::UnresolvedReference { name })?;
    let order = doc
        .topo_order()
        .map_err(|path| LoadError::ReferenceCycle { path })?;
    doc.compute_top_cells();
    doc.compute_bounds(&order);
    doc.flag_minimap_skips();
    Ok(())
}
