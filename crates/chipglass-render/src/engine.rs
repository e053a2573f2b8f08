//! The per-frame pipeline: input commands → viewport → index query →
//! batch visibility → draw list, with the LOD controller deciding when the
//! batch set is rebuilt. Rebuilds are chunked and swapped in atomically at
//! a frame boundary; pan and zoom stay live on the old set meanwhile.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use chipglass_core::{
    BBox, CancelToken, Document, ItemKind, LayerDef, LayerKey, Rgb, SpatialIndex, Vec2,
};

use crate::batch::{BatchSet, RebuildJob, RebuildStatus};
use crate::draw::{palette, DrawSurface, Rgba};
use crate::input::Command;
use crate::lod::{self, LodController, LodParams};
use crate::overlay::{self, FpsCounter};
use crate::viewport::{Viewport, ViewportState};

/// Fill alpha for layer geometry on the dark canvas.
const LAYER_FILL_ALPHA: f32 = 0.7;

/// Rebuild chunks worked off per frame; one top cell each.
const REBUILD_STEPS_PER_FRAME: usize = 1;

/// Construction-time configuration. No global state anywhere: everything
/// tunable lives here and is owned by the engine.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Global per-frame polygon cap across all batches.
    pub polygon_budget: usize,
    pub lod: LodParams,
    pub fps_interval: Duration,
    pub grid_target_lines: f64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            polygon_budget: 100_000,
            lod: LodParams::default(),
            fps_interval: Duration::from_millis(500),
            grid_target_lines: overlay::GRID_TARGET_LINES,
        }
    }
}

/// Frame metrics for the HUD and the host.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Metrics {
    pub fps: f64,
    pub visible_polygons: usize,
    pub total_polygons: usize,
    pub polygon_budget: usize,
    /// Fraction of the budget the current batch set consumed; `>= 1.0`
    /// means the build stopped at the cap and the render is partial.
    pub budget_utilization: f64,
    pub current_depth: u8,
    pub zoom_level: f64,
    pub next_lod_threshold_low: f64,
    pub next_lod_threshold_high: f64,
    pub invalid_viewport_updates: u32,
}

/// Persistable per-layer view state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerState {
    pub key: LayerKey,
    pub visible: bool,
    pub color: Rgb,
}

pub struct RenderEngine {
    config: RenderConfig,
    doc: Arc<Document>,
    /// Session view state over the document's layer table (the geometry
    /// arena itself is shared read-only).
    layers: Vec<LayerDef>,
    viewport: Viewport,
    index: SpatialIndex,
    set: BatchSet,
    lod: LodController,
    rebuild: Option<RebuildJob>,
    grid_on: bool,
    metrics_on: bool,
    layer_panel_on: bool,
    pointer: Option<Vec2>,
    fps: FpsCounter,
    metrics: Metrics,
    /// A freshly swapped batch set hit the budget; surface it once.
    budget_notice_pending: bool,
}

impl RenderEngine {
    pub fn new(
        doc: Document,
        config: RenderConfig,
        width: f64,
        height: f64,
        now: Instant,
    ) -> Self {
        let mut engine = Self {
            lod: LodController::new(config.lod),
            fps: FpsCounter::new(config.fps_interval, now),
            config,
            doc: Arc::new(Document::default()),
            layers: Vec::new(),
            viewport: Viewport::new(width, height),
            index: SpatialIndex::new(),
            set: BatchSet::default(),
            rebuild: None,
            grid_on: true,
            metrics_on: false,
            layer_panel_on: false,
            pointer: None,
            metrics: Metrics::default(),
            budget_notice_pending: false,
        };
        engine.set_document(doc, now);
        engine
    }

    /// Swap in a freshly loaded document. The old state is dropped only
    /// here, after the new build succeeded — a failed load upstream never
    /// reaches this point.
    pub fn set_document(&mut self, doc: Document, now: Instant) {
        if let Some(job) = self.rebuild.take() {
            job.cancel_token().cancel();
        }
        let doc = Arc::new(doc);
        let depth = lod::initial_depth(&doc, self.config.polygon_budget, &self.config.lod);
        let (set, index) = build_now(doc.clone(), depth, self.config.polygon_budget);

        self.layers = doc.layers.iter().cloned().collect();
        self.apply_scale_limits(&doc);
        self.viewport.fit(&doc.bbox);
        self.lod.reset(depth, self.viewport.scale(), now);
        self.budget_notice_pending = set.budget_exhausted;
        self.set = set;
        self.index = index;
        self.doc = doc;
        log::info!(
            "document ready: depth {}, {} batches, {} polygons",
            depth,
            self.set.batches.len(),
            self.set.polygon_total
        );
    }

    /// Zoom limits chosen so the scale bar stays labelable: its quarter-
    /// width span reads 1 nm fully zoomed in and 1 m fully zoomed out.
    fn apply_scale_limits(&mut self, doc: &Document) {
        let quarter = (self.viewport.width * 0.25).max(1.0);
        let nm = doc.units.meters_to_dbu(1e-9);
        let m = doc.units.meters_to_dbu(1.0);
        if nm > 0.0 && m > 0.0 {
            self.viewport.set_scale_limits(quarter / m, quarter / nm);
        }
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn viewport_bounds(&self) -> BBox {
        self.viewport.visible_bounds()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn grid_enabled(&self) -> bool {
        self.grid_on
    }

    pub fn metrics_panel_enabled(&self) -> bool {
        self.metrics_on
    }

    pub fn layer_panel_enabled(&self) -> bool {
        self.layer_panel_on
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.viewport.resize(width, height);
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn apply(&mut self, command: Command) {
        match command {
            Command::Pan { dx, dy } => self.viewport.pan(dx, dy),
            Command::ZoomAt { at, factor } => self.viewport.zoom_at(at, factor),
            Command::Fit => self.viewport.fit(&self.doc.bbox),
            Command::CenterOn(world) => self.viewport.center_on(world),
            Command::PointerAt(screen) => self.pointer = Some(screen),
            Command::ToggleGrid => self.grid_on = !self.grid_on,
            Command::ToggleMetrics => self.metrics_on = !self.metrics_on,
            Command::ToggleLayerPanel => self.layer_panel_on = !self.layer_panel_on,
            Command::SetLayerVisible { key, visible } => self.set_layer_visible(key, visible),
            Command::SetLayerColor { key, color } => self.set_layer_color(key, color),
        }
    }

    pub fn set_layer_visible(&mut self, key: LayerKey, visible: bool) {
        if let Some(def) = self.layers.iter_mut().find(|d| d.key == key) {
            def.visible = visible;
        }
    }

    pub fn set_layer_color(&mut self, key: LayerKey, color: Rgb) {
        if let Some(def) = self.layers.iter_mut().find(|d| d.key == key) {
            def.color = color;
        }
    }

    pub fn layers(&self) -> &[LayerDef] {
        &self.layers
    }

    fn layer_visible(&self, key: LayerKey) -> bool {
        self.layers
            .iter()
            .find(|d| d.key == key)
            .map(|d| d.visible)
            .unwrap_or(false)
    }

    fn layer_color(&self, key: LayerKey) -> Rgba {
        self.layers
            .iter()
            .find(|d| d.key == key)
            .map(|d| Rgba::from_rgb8(d.color, LAYER_FILL_ALPHA))
            .unwrap_or(palette::OVERLAY_TEXT)
    }

    // ── Host persistence hooks ───────────────────────────────────────

    pub fn viewport_state(&self) -> ViewportState {
        self.viewport.state()
    }

    pub fn restore_viewport_state(&mut self, state: ViewportState) {
        self.viewport.restore(state);
    }

    pub fn layer_state(&self) -> Vec<LayerState> {
        self.layers
            .iter()
            .map(|d| LayerState {
                key: d.key,
                visible: d.visible,
                color: d.color,
            })
            .collect()
    }

    pub fn restore_layer_state(&mut self, state: &[LayerState]) {
        for entry in state {
            self.set_layer_visible(entry.key, entry.visible);
            self.set_layer_color(entry.key, entry.color);
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Batch handles whose world box contains the point (expanded by the
    /// tolerance).
    pub fn hit_test(&self, world: Vec2, tolerance: f64) -> Vec<usize> {
        self.index
            .point_query(world, tolerance)
            .into_iter()
            .filter(|i| i.kind == ItemKind::PolygonBatch)
            .map(|i| i.id)
            .collect()
    }

    // ── Frame ────────────────────────────────────────────────────────

    /// Produce one frame. Idempotent: repeated calls with unchanged state
    /// draw the same list. Ordering within the frame is fixed: rebuild
    /// pump, cull, LOD, draw, metrics.
    pub fn render(
        &mut self,
        surface: &mut dyn DrawSurface,
        now: Instant,
        mut on_progress: Option<&mut dyn FnMut(u8, &str)>,
    ) {
        self.pump_rebuild(&mut on_progress);
        if self.budget_notice_pending {
            self.budget_notice_pending = false;
            log::warn!("polygon budget exhausted; render is partial");
            if let Some(cb) = on_progress.as_deref_mut() {
                cb(100, "Polygon budget exhausted; showing partial detail");
            }
        }

        // Cull: one window query toggles per-batch visibility.
        let window = self.viewport.visible_bounds();
        for batch in &mut self.set.batches {
            batch.visible = false;
        }
        for stub in &mut self.set.stubs {
            stub.visible = false;
        }
        for item in self.index.window_query(&window) {
            match item.kind {
                ItemKind::PolygonBatch => self.set.batches[item.id].visible = true,
                ItemKind::CellInstance => self.set.stubs[item.id].visible = true,
            }
        }

        // Hidden layers do not count toward LOD utilization.
        let visible_polygons: usize = self
            .set
            .batches
            .iter()
            .filter(|b| b.visible && self.layer_visible(b.layer))
            .map(|b| b.polygon_count())
            .sum();

        if let Some(depth) = self.lod.observe(
            visible_polygons,
            self.config.polygon_budget,
            self.viewport.scale(),
            now,
        ) {
            self.start_rebuild(depth, &mut on_progress);
        }

        self.draw_frame(surface, visible_polygons);

        self.fps.tick(now);
        let (low, high) = self.lod.thresholds(self.config.polygon_budget);
        self.metrics = Metrics {
            fps: self.fps.fps(),
            visible_polygons,
            total_polygons: self.set.polygon_total,
            polygon_budget: self.config.polygon_budget,
            budget_utilization: self.set.polygon_total as f64
                / self.config.polygon_budget.max(1) as f64,
            current_depth: self.lod.depth(),
            zoom_level: self.viewport.scale(),
            next_lod_threshold_low: low,
            next_lod_threshold_high: high,
            invalid_viewport_updates: self.viewport.invalid_updates,
        };
    }

    fn start_rebuild(&mut self, depth: u8, on_progress: &mut Option<&mut dyn FnMut(u8, &str)>) {
        if let Some(old) = self.rebuild.take() {
            old.cancel_token().cancel();
        }
        if let Some(cb) = on_progress.as_deref_mut() {
            cb(0, "Adjusting level of detail");
        }
        self.rebuild = Some(RebuildJob::new(
            self.doc.clone(),
            depth,
            self.config.polygon_budget,
            CancelToken::new(),
        ));
    }

    fn pump_rebuild(&mut self, on_progress: &mut Option<&mut dyn FnMut(u8, &str)>) {
        for _ in 0..REBUILD_STEPS_PER_FRAME {
            let status = match self.rebuild.as_mut() {
                Some(job) => job.step(),
                None => return,
            };
            match status {
                RebuildStatus::Running { percent } => {
                    if let Some(cb) = on_progress.as_deref_mut() {
                        cb(percent, "Adjusting level of detail");
                    }
                }
                RebuildStatus::Canceled => {
                    self.rebuild = None;
                    return;
                }
                RebuildStatus::Done => {
                    // Frame-boundary swap: queries never see a half-built set.
                    let job = self.rebuild.take().expect("job present");
                    let depth = job.depth();
                    let (set, index) = job.into_result();
                    self.budget_notice_pending = set.budget_exhausted;
                    self.set = set;
                    self.index = index;
                    log::debug!(
                        "batch set swapped at depth {depth}: {} batches",
                        self.set.batches.len()
                    );
                    return;
                }
            }
        }
    }

    fn draw_frame(&self, surface: &mut dyn DrawSurface, visible_polygons: usize) {
        surface.clear(palette::BACKGROUND);
        if self.grid_on {
            overlay::draw_grid(surface, &self.viewport, self.config.grid_target_lines);
        }

        // Geometry in document order.
        let mut screen_ring: Vec<Vec2> = Vec::new();
        for batch in &self.set.batches {
            if !batch.visible || !self.layer_visible(batch.layer) {
                continue;
            }
            let color = self.layer_color(batch.layer);
            for ring in &batch.polys {
                screen_ring.clear();
                screen_ring.extend(ring.iter().map(|&p| self.viewport.world_to_screen(p)));
                surface.fill_polygon(&screen_ring, color);
                surface.stroke_polyline(&screen_ring, 1.0, color.with_alpha(1.0));
            }
        }
        for stub in &self.set.stubs {
            if !stub.visible {
                continue;
            }
            let min = self.viewport.world_to_screen(stub.bbox.min);
            let max = self.viewport.world_to_screen(stub.bbox.max);
            surface.stroke_rect(
                Vec2::new(min.x.min(max.x), min.y.min(max.y)),
                Vec2::new(min.x.max(max.x), min.y.max(max.y)),
                1.0,
                palette::INSTANCE_OUTLINE,
            );
        }

        overlay::draw_scale_bar(surface, &self.viewport, &self.doc.units);
        if let Some(pointer) = self.pointer {
            let world = self.viewport.screen_to_world(pointer);
            surface.text(
                &overlay::format_coords(world, &self.doc.units),
                Vec2::new(self.viewport.width - 220.0, self.viewport.height - 16.0),
                palette::OVERLAY_TEXT,
            );
        }
        if self.metrics_on {
            let line = format!(
                "{:.0} fps | {} / {} polys | depth {} | zoom {:.5}",
                self.metrics.fps,
                visible_polygons,
                self.set.polygon_total,
                self.lod.depth(),
                self.viewport.scale(),
            );
            surface.text(&line, Vec2::new(16.0, 24.0), palette::OVERLAY_TEXT);
        }
    }
}

/// Run a rebuild to completion on the calling thread (initial build after a
/// document swap; the cap keeps it bounded by the polygon budget).
fn build_now(doc: Arc<Document>, depth: u8, budget: usize) -> (BatchSet, SpatialIndex) {
    let mut job = RebuildJob::new(doc, depth, budget, CancelToken::new());
    while !matches!(job.step(), RebuildStatus::Done) {}
    job.into_result()
}
