//! Scene-graph flattening.
//!
//! A batch is the unit of drawing and culling: the polygons of one cell
//! instance on one layer, flattened to world coordinates. The batcher
//! walks the reference DAG from the top cells, composing affine transforms
//! on the way down, stopping at the render depth or when the global polygon
//! budget runs out — deterministically, in document order. References left
//! unexpanded become instance stubs so they can still be culled, outlined,
//! and hit-tested.

use std::collections::BTreeMap;
use std::sync::Arc;

use chipglass_core::{
    Affine, BBox, CancelToken, Document, IndexItem, ItemKind, LayerKey, SpatialIndex, Vec2,
};

/// One draw-list entry: same instance context, same layer.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Arena index of the cell the polygons belong to.
    pub cell: usize,
    pub layer: LayerKey,
    /// Hierarchy depth the owning instance sits at (top cells are 0).
    pub depth: u8,
    /// World-space rings, one per polygon.
    pub polys: Vec<Vec<Vec2>>,
    pub bbox: BBox,
    pub visible: bool,
}

impl Batch {
    pub fn polygon_count(&self) -> usize {
        self.polys.len()
    }
}

/// A reference that the current depth did not expand, kept as a world box.
#[derive(Debug, Clone)]
pub struct InstanceStub {
    pub cell: usize,
    pub bbox: BBox,
    pub visible: bool,
}

/// All batches of one committed render depth, plus the spatial index over
/// them. Swapped wholesale on an LOD commit.
#[derive(Debug, Default)]
pub struct BatchSet {
    pub depth: u8,
    pub batches: Vec<Batch>,
    pub stubs: Vec<InstanceStub>,
    pub polygon_total: usize,
    pub budget_exhausted: bool,
}

impl BatchSet {
    /// Synchronous build; the chunked path is [`RebuildJob`].
    pub fn build(doc: &Document, depth: u8, budget: usize) -> (BatchSet, SpatialIndex) {
        let mut job = RebuildJob::new(Arc::new(doc.clone()), depth, budget, CancelToken::new());
        loop {
            match job.step() {
                RebuildStatus::Running { .. } => {}
                RebuildStatus::Done => break,
                RebuildStatus::Canceled => unreachable!("fresh token is never canceled"),
            }
        }
        job.into_result()
    }

    pub fn visible_polygons(&self) -> usize {
        self.batches
            .iter()
            .filter(|b| b.visible)
            .map(|b| b.polygon_count())
            .sum()
    }
}

/// Progress of a chunked rebuild.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RebuildStatus {
    Running { percent: u8 },
    Done,
    Canceled,
}

/// Chunked batch rebuild: one top cell per [`RebuildJob::step`] call, so
/// input keeps producing frames on the previous batch set while this one
/// materializes. The engine swaps the result in at a frame boundary.
pub struct RebuildJob {
    doc: Arc<Document>,
    depth: u8,
    budget_left: usize,
    next_top: usize,
    set: BatchSet,
    items: Vec<IndexItem>,
    cancel: CancelToken,
}

impl RebuildJob {
    pub fn new(doc: Arc<Document>, depth: u8, budget: usize, cancel: CancelToken) -> Self {
        Self {
            doc,
            depth,
            budget_left: budget,
            next_top: 0,
            set: BatchSet {
                depth,
                ..Default::default()
            },
            items: Vec::new(),
            cancel,
        }
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Process the next top cell. Yield boundary: progress and cancellation
    /// are observed here and nowhere else.
    pub fn step(&mut self) -> RebuildStatus {
        if self.cancel.is_canceled() {
            return RebuildStatus::Canceled;
        }
        let total = self.doc.top_cells.len();
        if self.next_top >= total {
            return RebuildStatus::Done;
        }
        let top = self.doc.top_cells[self.next_top];
        self.next_top += 1;
        self.emit_cell(top, Affine::IDENTITY, 0);
        if self.next_top >= total {
            RebuildStatus::Done
        } else {
            RebuildStatus::Running {
                percent: (self.next_top * 100 / total) as u8,
            }
        }
    }

    /// Finished batches plus the index over them.
    pub fn into_result(self) -> (BatchSet, SpatialIndex) {
        (self.set, SpatialIndex::bulk_load(self.items))
    }

    fn emit_cell(&mut self, cell_idx: usize, affine: Affine, level: u8) {
        if self.budget_left == 0 {
            return;
        }
        let doc = Arc::clone(&self.doc);
        let cell = &doc.cells[cell_idx];

        // One batch per layer over the cell's direct polygons.
        let mut by_layer: BTreeMap<LayerKey, Vec<Vec<Vec2>>> = BTreeMap::new();
        let mut counted = 0usize;
        for poly in &cell.polygons {
            if counted >= self.budget_left {
                self.set.budget_exhausted = true;
                break;
            }
            counted += 1;
            let ring: Vec<Vec2> = poly.points.iter().map(|&p| affine.apply_point(p)).collect();
            by_layer.entry(poly.layer).or_default().push(ring);
        }
        self.budget_left -= counted;
        self.set.polygon_total += counted;

        for (layer, polys) in by_layer {
            let mut bbox = BBox::EMPTY;
            for ring in &polys {
                for &p in ring {
                    bbox.include(p);
                }
            }
            let id = self.set.batches.len();
            self.items.push(IndexItem {
                bbox,
                id,
                kind: ItemKind::PolygonBatch,
            });
            self.set.batches.push(Batch {
                cell: cell_idx,
                layer,
                depth: level,
                polys,
                bbox,
                visible: false,
            });
        }

        // Recurse into references, or stub them out past the depth limit.
        for r in &cell.refs {
            let target = match r.resolved {
                Some(t) => t,
                None => continue,
            };
            let placed = Affine::from_transform(&r.transform);
            if level < self.depth && self.budget_left > 0 {
                match &r.array {
                    None => self.emit_cell(target, affine.compose(&placed), level + 1),
                    Some(array) => {
                        for off in array.offsets() {
                            if self.budget_left == 0 {
                                self.set.budget_exhausted = true;
                                break;
                            }
                            self.emit_cell(
                                target,
                                affine.compose(&placed.translated(off)),
                                level + 1,
                            );
                        }
                    }
                }
            } else {
                // Stubbed by the budget running dry rather than the depth
                // limit: the render is partial.
                if level < self.depth && self.budget_left == 0 {
                    self.set.budget_exhausted = true;
                }
                let bbox = affine.bbox_of(&r.bbox);
                if !bbox.is_empty() {
                    let id = self.set.stubs.len();
                    self.items.push(IndexItem {
                        bbox,
                        id,
                        kind: ItemKind::CellInstance,
                    });
                    self.set.stubs.push(InstanceStub {
                        cell: target,
                        bbox,
                        visible: false,
                    });
                }
            }
        }
    }
}
