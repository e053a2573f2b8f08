//! # Chipglass Core
//!
//! Geometry model for the Chipglass layout viewer: cells, polygons,
//! references, the layer table, document-level bookkeeping (bounds,
//! top cells, reference DAG validation), and the R-tree spatial index
//! used for viewport culling and hit-testing.
//!
//! Everything here is read-only after a document is built, except
//! per-layer visibility and color, which are user state.

pub mod cell;
pub mod document;
pub mod geometry;
pub mod layer;
pub mod spatial;
pub mod task;
pub mod transform;

pub use cell::{ArraySpec, Cell, CellRef, Polygon};
pub use document::{Document, Units};
pub use geometry::{BBox, Point, Vec2};
pub use layer::{LayerDef, LayerKey, LayerTable, Rgb};
pub use spatial::{IndexItem, ItemKind, SpatialIndex};
pub use task::CancelToken;
pub use transform::{Affine, Transform};
