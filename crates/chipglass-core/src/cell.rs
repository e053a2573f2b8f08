use serde::{Deserialize, Serialize};

use crate::geometry::{BBox, Point, Vec2};
use crate::layer::LayerKey;
use crate::transform::{Affine, Transform};

/// A closed polygon on one layer. The closing duplicate vertex, if the file
/// carried one, has already been stripped; the fill closes the ring either way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub layer: LayerKey,
    pub points: Vec<Point>,
    pub bbox: BBox,
}

impl Polygon {
    pub fn new(layer: LayerKey, points: Vec<Point>) -> Self {
        let bbox = BBox::from_points(&points);
        Self {
            layer,
            points,
            bbox,
        }
    }
}

/// Regular grid of reference copies. Pitches are kept as parent-space
/// vectors so rotated arrays stay regular; an orthogonal array has
/// `col_step = (stepX, 0)` and `row_step = (0, stepY)`. Negative steps
/// reverse the array direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArraySpec {
    pub cols: u16,
    pub rows: u16,
    pub col_step: Vec2,
    pub row_step: Vec2,
}

impl ArraySpec {
    pub fn count(&self) -> usize {
        self.cols as usize * self.rows as usize
    }

    /// Lattice offsets in parent coordinates, row-major.
    pub fn offsets(&self) -> impl Iterator<Item = Vec2> + '_ {
        let (cols, rows) = (self.cols as i64, self.rows as i64);
        (0..rows).flat_map(move |r| {
            (0..cols).map(move |c| {
                self.col_step
                    .scale(c as f64)
                    .add(self.row_step.scale(r as f64))
            })
        })
    }

    /// The four extreme lattice offsets; enough to bound the whole grid.
    pub fn corner_offsets(&self) -> [Vec2; 4] {
        let col_end = self.col_step.scale((self.cols.max(1) - 1) as f64);
        let row_end = self.row_step.scale((self.rows.max(1) - 1) as f64);
        [Vec2::ZERO, col_end, row_end, col_end.add(row_end)]
    }
}

/// An oriented, scaled, optionally reflected, optionally arrayed instance of
/// another cell. The target is held by name; `resolved` is the arena index
/// filled in by post-parse validation (the reference graph stays cycle-free
/// by construction this way).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellRef {
    pub target: String,
    pub resolved: Option<usize>,
    pub transform: Transform,
    pub array: Option<ArraySpec>,
    /// World AABB of the (array-expanded, transformed) target, filled in
    /// during the bottom-up bounds pass.
    pub bbox: BBox,
}

impl CellRef {
    pub fn new(target: String, transform: Transform, array: Option<ArraySpec>) -> Self {
        Self {
            target,
            resolved: None,
            transform,
            array,
            bbox: BBox::EMPTY,
        }
    }

    /// Number of placed copies (1 unless arrayed).
    pub fn copies(&self) -> usize {
        self.array.map(|a| a.count()).unwrap_or(1)
    }

    /// AABB of this reference in parent coordinates, given the target's box.
    pub fn bbox_of_target(&self, target_bbox: &BBox) -> BBox {
        let placed = Affine::from_transform(&self.transform).bbox_of(target_bbox);
        match &self.array {
            None => placed,
            Some(array) => {
                let mut out = BBox::EMPTY;
                for off in array.corner_offsets() {
                    out = out.union(&placed.translated(off));
                }
                out
            }
        }
    }
}

/// A named container of polygons and references ("structure" in GDSII terms).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    pub name: String,
    pub polygons: Vec<Polygon>,
    pub refs: Vec<CellRef>,
    /// Union of polygon boxes and placed reference boxes, in this cell's
    /// own coordinates.
    pub bbox: BBox,
    /// Advisory: too small to matter at minimap resolution.
    pub skip_in_minimap: bool,
}

impl Cell {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            polygons: Vec::new(),
            refs: Vec::new(),
            bbox: BBox::EMPTY,
            skip_in_minimap: false,
        }
    }

    pub fn polygon_count(&self) -> usize {
        self.polygons.len()
    }

    pub fn ref_count(&self) -> usize {
        self.refs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polygon_bbox_matches_points() {
        let p = Polygon::new(
            LayerKey::new(1, 0),
            vec![Point::new(0, 0), Point::new(10, 0), Point::new(10, 5)],
        );
        assert_eq!(p.bbox, BBox::from_corners(0.0, 0.0, 10.0, 5.0));
    }

    #[test]
    fn test_array_offsets_grid() {
        let a = ArraySpec {
            cols: 4,
            rows: 3,
            col_step: Vec2::new(200.0, 0.0),
            row_step: Vec2::new(0.0, 200.0),
        };
        let offs: Vec<Vec2> = a.offsets().collect();
        assert_eq!(offs.len(), 12);
        assert_eq!(offs[0], Vec2::ZERO);
        assert_eq!(offs[3], Vec2::new(600.0, 0.0));
        assert_eq!(offs[11], Vec2::new(600.0, 400.0));
    }

    #[test]
    fn test_ref_bbox_of_array() {
        // 3 rows x 4 cols of a 100x100 square at 200 pitch: (0,0)..(700,500).
        let r = CellRef::new(
            "CELL_A".into(),
            Transform::default(),
            Some(ArraySpec {
                cols: 4,
                rows: 3,
                col_step: Vec2::new(200.0, 0.0),
                row_step: Vec2::new(0.0, 200.0),
            }),
        );
        let bb = r.bbox_of_target(&BBox::from_corners(0.0, 0.0, 100.0, 100.0));
        assert_eq!(bb, BBox::from_corners(0.0, 0.0, 700.0, 500.0));
    }

    #[test]
    fn test_ref_bbox_negative_step() {
        let r = CellRef::new(
            "A".into(),
            Transform::default(),
            Some(ArraySpec {
                cols: 2,
                rows: 1,
                col_step: Vec2::new(-50.0, 0.0),
                row_step: Vec2::new(0.0, 1.0),
            }),
        );
        let bb = r.bbox_of_target(&BBox::from_corners(0.0, 0.0, 10.0, 10.0));
        assert_eq!(bb, BBox::from_corners(-50.0, 0.0, 10.0, 10.0));
    }
}
