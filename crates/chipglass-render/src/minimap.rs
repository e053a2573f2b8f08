//! Document-overview renderer.
//!
//! The minimap draws the whole document into a fixed logical rectangle in
//! one pass — full depth, no viewport culling, no LOD — skipping only the
//! cells flagged too small to matter at this resolution. The main
//! viewport's window is layered on top as a red outline, and a click maps
//! back to world coordinates for a `CenterOn` command.

use chipglass_core::{Affine, BBox, Document, Vec2};

use crate::draw::{palette, DrawSurface, Rgba};

/// Fraction of the panel kept as padding around the document.
const PADDING_FRACTION: f64 = 0.05;

/// Geometry alpha; the minimap is a silhouette, not a rendering.
const FILL_ALPHA: f32 = 0.8;

pub struct Minimap {
    pub width: f64,
    pub height: f64,
    on_navigate: Option<Box<dyn FnMut(f64, f64)>>,
}

impl Minimap {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            on_navigate: None,
        }
    }

    /// Register the click callback; it receives world coordinates.
    pub fn on_navigate(&mut self, callback: impl FnMut(f64, f64) + 'static) {
        self.on_navigate = Some(Box::new(callback));
    }

    /// The world→panel map that fits the document with padding and flips Y.
    fn fit_affine(&self, doc_bbox: &BBox) -> Option<Affine> {
        if doc_bbox.is_empty() || doc_bbox.largest_extent() <= 0.0 {
            return None;
        }
        let usable_w = self.width * (1.0 - 2.0 * PADDING_FRACTION);
        let usable_h = self.height * (1.0 - 2.0 * PADDING_FRACTION);
        let scale = (usable_w / doc_bbox.width().max(f64::MIN_POSITIVE))
            .min(usable_h / doc_bbox.height().max(f64::MIN_POSITIVE));
        let center = doc_bbox.center();
        // Panel-centered, Y flipped.
        Some(Affine {
            a: scale,
            b: 0.0,
            c: 0.0,
            d: -scale,
            tx: self.width / 2.0 - center.x * scale,
            ty: self.height / 2.0 + center.y * scale,
        })
    }

    pub fn world_to_panel(&self, doc: &Document, world: Vec2) -> Option<Vec2> {
        self.fit_affine(&doc.bbox).map(|m| m.apply(world))
    }

    pub fn panel_to_world(&self, doc: &Document, panel: Vec2) -> Option<Vec2> {
        let m = self.fit_affine(&doc.bbox)?;
        // The fit map is axis-aligned: invert directly.
        Some(Vec2::new(
            (panel.x - m.tx) / m.a,
            (panel.y - m.ty) / m.d,
        ))
    }

    /// Draw the overview plus the main viewport's world window in red.
    pub fn render(
        &self,
        doc: &Document,
        main_viewport_world: &BBox,
        surface: &mut dyn DrawSurface,
    ) {
        surface.fill_polygon(
            &[
                Vec2::ZERO,
                Vec2::new(self.width, 0.0),
                Vec2::new(self.width, self.height),
                Vec2::new(0.0, self.height),
            ],
            palette::MINIMAP_BACKDROP,
        );
        let m = match self.fit_affine(&doc.bbox) {
            Some(m) => m,
            None => return,
        };

        for &top in &doc.top_cells {
            self.draw_cell(doc, top, m, surface);
        }

        if !main_viewport_world.is_empty() {
            let a = m.apply(main_viewport_world.min);
            let b = m.apply(main_viewport_world.max);
            surface.stroke_rect(
                Vec2::new(a.x.min(b.x), a.y.min(b.y)),
                Vec2::new(a.x.max(b.x), a.y.max(b.y)),
                1.5,
                palette::VIEWPORT_OUTLINE,
            );
        }
    }

    fn draw_cell(&self, doc: &Document, cell_idx: usize, affine: Affine, surface: &mut dyn DrawSurface) {
        let cell = &doc.cells[cell_idx];
        if cell.skip_in_minimap {
            return;
        }
        for poly in &cell.polygons {
            if !doc.layers.is_visible(poly.layer) {
                continue;
            }
            let color = doc
                .layers
                .get(poly.layer)
                .map(|d| Rgba::from_rgb8(d.color, FILL_ALPHA))
                .unwrap_or(palette::OVERLAY_TEXT);
            let ring: Vec<Vec2> = poly.points.iter().map(|&p| affine.apply_point(p)).collect();
            surface.fill_polygon(&ring, color);
        }
        for r in &cell.refs {
            let target = match r.resolved {
                Some(t) => t,
                None => continue,
            };
            let placed = Affine::from_transform(&r.transform);
            match &r.array {
                None => self.draw_cell(doc, target, affine.compose(&placed), surface),
                Some(array) => {
                    for off in array.offsets() {
                        self.draw_cell(doc, target, affine.compose(&placed.translated(off)), surface);
                    }
                }
            }
        }
    }

    /// A click at panel coordinates: map back to world, notify the host.
    pub fn click(&mut self, doc: &Document, x: f64, y: f64) -> Option<Vec2> {
        let world = self.panel_to_world(doc, Vec2::new(x, y))?;
        if let Some(cb) = self.on_navigate.as_mut() {
            cb(world.x, world.y);
        }
        Some(world)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draw::{DrawCmd, Recording};
    use chipglass_core::{Cell, LayerKey, Point, Polygon};

    fn doc_with_square() -> Document {
        let mut doc = Document::new("mm.gds");
        let mut top = Cell::new("TOP");
        top.polygons.push(Polygon::new(
            LayerKey::new(1, 0),
            vec![
                Point::new(0, 0),
                Point::new(1000, 0),
                Point::new(1000, 1000),
                Point::new(0, 1000),
            ],
        ));
        doc.layers.ensure(LayerKey::new(1, 0));
        doc.add_cell(top);
        doc.resolve_refs().unwrap();
        let order = doc.topo_order().unwrap();
        doc.compute_top_cells();
        doc.compute_bounds(&order);
        doc
    }

    #[test]
    fn test_click_round_trips_through_panel() {
        // S6: panel -> world -> panel is the identity.
        let doc = doc_with_square();
        let mut minimap = Minimap::new(200.0, 200.0);
        let world = minimap.panel_to_world(&doc, Vec2::new(120.0, 80.0)).unwrap();
        let back = minimap.world_to_panel(&doc, world).unwrap();
        assert!((back.x - 120.0).abs() < 1e-9);
        assert!((back.y - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_click_fires_navigate_callback() {
        let doc = doc_with_square();
        let mut minimap = Minimap::new(200.0, 200.0);
        let seen = std::rc::Rc::new(std::cell::Cell::new((0.0, 0.0)));
        let sink = seen.clone();
        minimap.on_navigate(move |x, y| sink.set((x, y)));
        // Panel center maps to the document center.
        let world = minimap.click(&doc, 100.0, 100.0).unwrap();
        assert!((world.x - 500.0).abs() < 0.5);
        assert!((world.y - 500.0).abs() < 0.5);
        assert_eq!(seen.get(), (world.x, world.y));
    }

    #[test]
    fn test_render_outlines_viewport_in_red() {
        let doc = doc_with_square();
        let minimap = Minimap::new(200.0, 200.0);
        let mut surface = Recording::new();
        minimap.render(
            &doc,
            &BBox::from_corners(250.0, 250.0, 750.0, 750.0),
            &mut surface,
        );
        assert_eq!(surface.fill_count(), 2); // backdrop + the square
        let outline = surface
            .commands
            .iter()
            .find(|c| matches!(c, DrawCmd::StrokeRect { .. }))
            .expect("viewport outline drawn");
        match outline {
            DrawCmd::StrokeRect { color, .. } => assert_eq!(*color, palette::VIEWPORT_OUTLINE),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_skip_flagged_cells() {
        let mut doc = doc_with_square();
        doc.cells[0].skip_in_minimap = true;
        let minimap = Minimap::new(200.0, 200.0);
        let mut surface = Recording::new();
        minimap.render(&doc, &BBox::EMPTY, &mut surface);
        assert_eq!(surface.fill_count(), 1); // backdrop only
    }

    #[test]
    fn test_y_axis_flipped_in_panel() {
        let doc = doc_with_square();
        let minimap = Minimap::new(200.0, 200.0);
        let low = minimap.world_to_panel(&doc, Vec2::new(500.0, 0.0)).unwrap();
        let high = minimap.world_to_panel(&doc, Vec2::new(500.0, 1000.0)).unwrap();
        assert!(high.y < low.y);
    }
}
