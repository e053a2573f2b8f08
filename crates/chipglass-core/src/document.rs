use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::cell::Cell;
use crate::geometry::BBox;
use crate::layer::LayerTable;

/// GDSII unit metadata. `dbu_in_user` is the size of one database unit in
/// user units; `dbu_in_m` its size in meters (the two reals of the UNITS
/// record, in file order).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Units {
    pub dbu_in_user: f64,
    pub dbu_in_m: f64,
}

impl Default for Units {
    fn default() -> Self {
        // 1 DBU = 1 nm, user unit = 1 µm.
        Self {
            dbu_in_user: 1e-3,
            dbu_in_m: 1e-9,
        }
    }
}

impl Units {
    pub fn user_in_m(&self) -> f64 {
        self.dbu_in_m / self.dbu_in_user
    }

    pub fn dbu_to_um(&self, v: f64) -> f64 {
        v * self.dbu_in_m * 1e6
    }

    pub fn dbu_to_nm(&self, v: f64) -> f64 {
        v * self.dbu_in_m * 1e9
    }

    /// How many DBU one meter spans (used for zoom clamping).
    pub fn meters_to_dbu(&self, m: f64) -> f64 {
        m / self.dbu_in_m
    }
}

/// Fraction of the document's largest extent below which a cell is flagged
/// as not worth drawing in the minimap.
const MINIMAP_SKIP_FRACTION: f64 = 0.01;

/// The in-memory library: an arena of cells plus the layer table, unit
/// metadata, top-cell roots, and the overall bounds. Immutable after load
/// except for per-layer visibility and color.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    pub file_name: String,
    pub cells: Vec<Cell>,
    /// Cell name → arena index. Names are unique within a document.
    pub cell_index: HashMap<String, usize>,
    pub layers: LayerTable,
    /// Cells not referenced by any other cell, in definition order.
    pub top_cells: Vec<usize>,
    pub bbox: BBox,
    pub units: Units,
}

impl Document {
    pub fn new(file_name: &str) -> Self {
        Self {
            file_name: file_name.to_string(),
            bbox: BBox::EMPTY,
            units: Units::default(),
            ..Default::default()
        }
    }

    /// Insert a cell, replacing any previous one with the same name.
    pub fn add_cell(&mut self, cell: Cell) -> usize {
        match self.cell_index.get(&cell.name) {
            Some(&idx) => {
                log::warn!("duplicate cell name {:?}, keeping the later definition", cell.name);
                self.cells[idx] = cell;
                idx
            }
            None => {
                let idx = self.cells.len();
                self.cell_index.insert(cell.name.clone(), idx);
                self.cells.push(cell);
                idx
            }
        }
    }

    pub fn cell_by_name(&self, name: &str) -> Option<&Cell> {
        self.cell_index.get(name).map(|&i| &self.cells[i])
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn polygon_count(&self) -> usize {
        self.cells.iter().map(|c| c.polygons.len()).sum()
    }

    pub fn top_cell_names(&self) -> Vec<&str> {
        self.top_cells
            .iter()
            .map(|&i| self.cells[i].name.as_str())
            .collect()
    }

    // ── Post-parse services (called in order by the builder) ─────────────

    /// Fill every reference's `resolved` index. Returns the first target
    /// name that does not exist in the cell table.
    pub fn resolve_refs(&mut self) -> Result<(), String> {
        let index = self.cell_index.clone();
        for cell in &mut self.cells {
            for r in &mut cell.refs {
                match index.get(&r.target) {
                    Some(&i) => r.resolved = Some(i),
                    None => return Err(r.target.clone()),
                }
            }
        }
        Ok(())
    }

    /// Children-before-parents order over the reference DAG. On a cycle,
    /// returns the offending name path, first cell repeated at the end
    /// (`["A", "B", "A"]`). Requires `resolve_refs` to have run.
    pub fn topo_order(&self) -> Result<Vec<usize>, Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            White,
            Gray,
            Black,
        }
        let mut marks = vec![Mark::White; self.cells.len()];
        let mut order = Vec::with_capacity(self.cells.len());

        for start in 0..self.cells.len() {
            if marks[start] != Mark::White {
                continue;
            }
            // Iterative DFS; each frame is (cell, next child to visit).
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
            marks[start] = Mark::Gray;
            while let Some(&(cell, child)) = stack.last() {
                let refs = &self.cells[cell].refs;
                if child < refs.len() {
                    let target = refs[child].resolved.expect("refs resolved before topo sort");
                    stack.last_mut().unwrap().1 += 1;
                    match marks[target] {
                        Mark::White => {
                            marks[target] = Mark::Gray;
                            stack.push((target, 0));
                        }
                        Mark::Gray => {
                            // Back edge: slice the current path from the
                            // first occurrence of `target`.
                            let mut path: Vec<String> = stack
                                .iter()
                                .skip_while(|&&(c, _)| c != target)
                                .map(|&(c, _)| self.cells[c].name.clone())
                                .collect();
                            path.push(self.cells[target].name.clone());
                            return Err(path);
                        }
                        Mark::Black => {}
                    }
                } else {
                    marks[cell] = Mark::Black;
                    order.push(cell);
                    stack.pop();
                }
            }
        }
        Ok(order)
    }

    /// Bottom-up bounds: per-cell box is the union of its polygon boxes and
    /// its placed reference boxes; the document box is the union of the
    /// top-cell boxes. `order` must be children-first.
    pub fn compute_bounds(&mut self, order: &[usize]) {
        for &idx in order {
            let mut bb = BBox::EMPTY;
            for p in &self.cells[idx].polygons {
                bb = bb.union(&p.bbox);
            }
            for i in 0..self.cells[idx].refs.len() {
                let target = self.cells[idx].refs[i]
                    .resolved
                    .expect("refs resolved before bounds");
                let target_bbox = self.cells[target].bbox;
                let placed = self.cells[idx].refs[i].bbox_of_target(&target_bbox);
                self.cells[idx].refs[i].bbox = placed;
                bb = bb.union(&placed);
            }
            self.cells[idx].bbox = bb;
        }
        self.bbox = self
            .top_cells
            .iter()
            .fold(BBox::EMPTY, |acc, &i| acc.union(&self.cells[i].bbox));
    }

    /// Top cells = all cells minus those referenced somewhere, in
    /// definition order.
    pub fn compute_top_cells(&mut self) {
        let mut referenced = vec![false; self.cells.len()];
        for cell in &self.cells {
            for r in &cell.refs {
                if let Some(i) = r.resolved {
                    referenced[i] = true;
                }
            }
        }
        self.top_cells = (0..self.cells.len()).filter(|&i| !referenced[i]).collect();
    }

    /// Flag cells whose extent is under 1% of the document's largest extent.
    pub fn flag_minimap_skips(&mut self) {
        let threshold = self.bbox.largest_extent() * MINIMAP_SKIP_FRACTION;
        if threshold <= 0.0 {
            return;
        }
        for cell in &mut self.cells {
            cell.skip_in_minimap = cell.bbox.largest_extent() < threshold;
        }
    }

    /// Per-cell cumulative flattened polygon counts for render depths
    /// `0..=max_depth`: at depth `d` a cell contributes its own polygons
    /// plus, for `d > 0`, each reference's copy count times the target's
    /// count at `d − 1`. `order` must be children-first.
    pub fn polygon_counts_by_depth(&self, order: &[usize], max_depth: usize) -> Vec<Vec<u64>> {
        let mut counts = vec![vec![0u64; max_depth + 1]; self.cells.len()];
        for &idx in order {
            let own = self.cells[idx].polygons.len() as u64;
            for d in 0..=max_depth {
                let mut total = own;
                if d > 0 {
                    for r in &self.cells[idx].refs {
                        if let Some(t) = r.resolved {
                            total = total
                                .saturating_add((r.copies() as u64).saturating_mul(counts[t][d - 1]));
                        }
                    }
                }
                counts[idx][d] = total;
            }
        }
        counts
    }

    /// Flattened polygon count of the whole document at a render depth.
    pub fn polygons_at_depth(&self, counts: &[Vec<u64>], depth: usize) -> u64 {
        self.top_cells
            .iter()
            .map(|&i| counts[i][depth.min(counts[i].len() - 1)])
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{ArraySpec, CellRef, Polygon};
    use crate::geometry::{Point, Vec2};
    use crate::layer::LayerKey;
    use crate::transform::Transform;

    fn square(layer: LayerKey, x: i32, y: i32, side: i32) -> Polygon {
        Polygon::new(
            layer,
            vec![
                Point::new(x, y),
                Point::new(x + side, y),
                Point::new(x + side, y + side),
                Point::new(x, y + side),
            ],
        )
    }

    fn finish(doc: &mut Document) -> Result<(), Vec<String>> {
        doc.resolve_refs().map_err(|n| vec![n])?;
        let order = doc.topo_order()?;
        doc.compute_top_cells();
        doc.compute_bounds(&order);
        doc.flag_minimap_skips();
        Ok(())
    }

    #[test]
    fn test_hierarchy_bounds_and_tops() {
        let mut doc = Document::new("test.gds");
        let mut leaf = Cell::new("LEAF");
        leaf.polygons.push(square(LayerKey::new(1, 0), 0, 0, 100));
        doc.add_cell(leaf);

        let mut top = Cell::new("TOP");
        top.refs.push(CellRef::new(
            "LEAF".into(),
            Transform::translate(1000.0, 0.0),
            None,
        ));
        doc.add_cell(top);

        finish(&mut doc).unwrap();
        assert_eq!(doc.top_cell_names(), vec!["TOP"]);
        assert_eq!(doc.bbox, BBox::from_corners(1000.0, 0.0, 1100.0, 100.0));
        let top = doc.cell_by_name("TOP").unwrap();
        assert_eq!(top.refs[0].bbox, doc.bbox);
    }

    #[test]
    fn test_array_document_bounds() {
        // S2 shape: 3 rows x 4 cols of a 100 DBU square at 200 pitch.
        let mut doc = Document::new("array.gds");
        let mut a = Cell::new("CELL_A");
        a.polygons.push(square(LayerKey::new(1, 0), 0, 0, 100));
        doc.add_cell(a);

        let mut top = Cell::new("TOP");
        top.refs.push(CellRef::new(
            "CELL_A".into(),
            Transform::default(),
            Some(ArraySpec {
                cols: 4,
                rows: 3,
                col_step: Vec2::new(200.0, 0.0),
                row_step: Vec2::new(0.0, 200.0),
            }),
        ));
        doc.add_cell(top);

        finish(&mut doc).unwrap();
        assert_eq!(doc.bbox, BBox::from_corners(0.0, 0.0, 700.0, 500.0));
    }

    #[test]
    fn test_cycle_detected_with_path() {
        let mut doc = Document::new("cycle.gds");
        let mut a = Cell::new("A");
        a.refs
            .push(CellRef::new("B".into(), Transform::default(), None));
        doc.add_cell(a);
        let mut b = Cell::new("B");
        b.refs
            .push(CellRef::new("A".into(), Transform::default(), None));
        doc.add_cell(b);

        doc.resolve_refs().unwrap();
        let err = doc.topo_order().unwrap_err();
        assert_eq!(err, vec!["A".to_string(), "B".to_string(), "A".to_string()]);
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let mut doc = Document::new("selfref.gds");
        let mut a = Cell::new("A");
        a.refs
            .push(CellRef::new("A".into(), Transform::default(), None));
        doc.add_cell(a);
        doc.resolve_refs().unwrap();
        let err = doc.topo_order().unwrap_err();
        assert_eq!(err, vec!["A".to_string(), "A".to_string()]);
    }

    #[test]
    fn test_unresolved_reference() {
        let mut doc = Document::new("bad.gds");
        let mut a = Cell::new("A");
        a.refs
            .push(CellRef::new("MISSING".into(), Transform::default(), None));
        doc.add_cell(a);
        assert_eq!(doc.resolve_refs().unwrap_err(), "MISSING");
    }

    #[test]
    fn test_minimap_skip_flags() {
        let mut doc = Document::new("skip.gds");
        let mut tiny = Cell::new("TINY");
        tiny.polygons.push(square(LayerKey::new(1, 0), 0, 0, 5));
        doc.add_cell(tiny);
        let mut big = Cell::new("BIG");
        big.polygons
            .push(square(LayerKey::new(1, 0), 0, 0, 100_000));
        big.refs
            .push(CellRef::new("TINY".into(), Transform::default(), None));
        doc.add_cell(big);

        finish(&mut doc).unwrap();
        assert!(doc.cell_by_name("TINY").unwrap().skip_in_minimap);
        assert!(!doc.cell_by_name("BIG").unwrap().skip_in_minimap);
    }

    #[test]
    fn test_polygon_counts_by_depth() {
        let mut doc = Document::new("counts.gds");
        let mut leaf = Cell::new("LEAF");
        leaf.polygons.push(square(LayerKey::new(1, 0), 0, 0, 10));
        doc.add_cell(leaf);

        let mut mid = Cell::new("MID");
        mid.polygons.push(square(LayerKey::new(1, 0), 0, 0, 50));
        mid.refs.push(CellRef::new(
            "LEAF".into(),
            Transform::default(),
            Some(ArraySpec {
                cols: 3,
                rows: 2,
                col_step: Vec2::new(20.0, 0.0),
                row_step: Vec2::new(0.0, 20.0),
            }),
        ));
        doc.add_cell(mid);

        let mut top = Cell::new("TOP");
        top.refs
            .push(CellRef::new("MID".into(), Transform::default(), None));
        doc.add_cell(top);

        finish(&mut doc).unwrap();
        let order = doc.topo_order().unwrap();
        let counts = doc.polygon_counts_by_depth(&order, 3);
        // depth 0: TOP has no own polygons; depth 1: MID's square;
        // depth 2: plus 6 LEAF squares.
        assert_eq!(doc.polygons_at_depth(&counts, 0), 0);
        assert_eq!(doc.polygons_at_depth(&counts, 1), 1);
        assert_eq!(doc.polygons_at_depth(&counts, 2), 7);
        assert_eq!(doc.polygons_at_depth(&counts, 3), 7);
    }
}
