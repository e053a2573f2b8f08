use rstar::{RTree, RTreeObject, AABB};

use crate::geometry::{BBox, Vec2};

/// What an index entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    /// A flattened per-(instance, layer) polygon batch.
    PolygonBatch,
    /// A cell instance left unexpanded by the current render depth.
    CellInstance,
}

/// An entry in the R-tree: a world AABB plus the stable handle the batcher
/// uses to toggle visibility.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexItem {
    pub bbox: BBox,
    pub id: usize,
    pub kind: ItemKind,
}

impl RTreeObject for IndexItem {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.bbox.min.x, self.bbox.min.y],
            [self.bbox.max.x, self.bbox.max.y],
        )
    }
}

/// Bulk-loadable R-tree over world AABBs. Window queries drive culling,
/// point queries drive hit-testing; insertion order carries no meaning.
#[derive(Debug, Default)]
pub struct SpatialIndex {
    tree: RTree<IndexItem>,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self { tree: RTree::new() }
    }

    pub fn bulk_load(items: Vec<IndexItem>) -> Self {
        Self {
            tree: RTree::bulk_load(items),
        }
    }

    pub fn insert(&mut self, item: IndexItem) {
        self.tree.insert(item);
    }

    pub fn remove(&mut self, item: &IndexItem) -> bool {
        self.tree.remove(item).is_some()
    }

    pub fn clear(&mut self) {
        self.tree = RTree::new();
    }

    /// Items whose AABB intersects the window.
    pub fn window_query(&self, window: &BBox) -> impl Iterator<Item = &IndexItem> {
        let envelope = AABB::from_corners(
            [window.min.x, window.min.y],
            [window.max.x, window.max.y],
        );
        self.tree.locate_in_envelope_intersecting(&envelope)
    }

    /// Items whose AABB contains `point` expanded by `tolerance`.
    pub fn point_query(&self, point: Vec2, tolerance: f64) -> Vec<&IndexItem> {
        let envelope = AABB::from_corners(
            [point.x - tolerance, point.y - tolerance],
            [point.x + tolerance, point.y + tolerance],
        );
        self.tree.locate_in_envelope_intersecting(&envelope).collect()
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}
