//! # Chipglass Renderer
//!
//! The frame-producing half of the viewer: viewport math and culling, the
//! level-of-detail controller, the batcher that flattens the cell hierarchy
//! into draw batches under a polygon budget, overlays (grid, scale bar,
//! FPS, coordinate readout), the input controller, and the minimap.
//!
//! Everything draws against the opaque [`draw::DrawSurface`] seam; the GPU
//! layer behind it is a host concern.

pub mod batch;
pub mod draw;
pub mod engine;
pub mod input;
pub mod lod;
pub mod minimap;
pub mod overlay;
pub mod viewport;

pub use batch::{Batch, BatchSet, RebuildJob, RebuildStatus};
pub use draw::{DrawCmd, DrawSurface, Recording, Rgba};
pub use engine::{LayerState, Metrics, RenderConfig, RenderEngine};
pub use input::{Command, InputController, InputEvent, Key, MouseButton, Touch};
pub use lod::{LodController, LodParams};
pub use minimap::Minimap;
pub use viewport::{Viewport, ViewportState};
