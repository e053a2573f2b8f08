use serde::{Deserialize, Serialize};

use chipglass_core::{BBox, Vec2};

/// Fit margin: the document occupies 90% of the canvas after `fit`.
const FIT_MARGIN: f64 = 0.9;

/// World-to-screen mapping with a Y-up world and Y-down screen:
/// `screen = ((wx − origin.x) · scale, (wy − origin.y) · (−scale))`,
/// so `origin` is the world point at the top-left pixel and the vertical
/// scale is negative.
#[derive(Debug, Clone)]
pub struct Viewport {
    origin: Vec2,
    scale: f64,
    pub width: f64,
    pub height: f64,
    min_scale: f64,
    max_scale: f64,
    /// Rejected NaN/zero-scale updates (the viewport keeps its last valid state).
    pub invalid_updates: u32,
}

/// Persistable viewport state for the host.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ViewportState {
    pub origin: Vec2,
    pub scale: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            origin: Vec2::ZERO,
            scale: 1.0,
            width,
            height,
            min_scale: f64::MIN_POSITIVE,
            max_scale: f64::MAX,
            invalid_updates: 0,
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    /// Clamp zoom to a scale range (px per DBU). The engine derives this
    /// from document units so scale-bar labels stay between 1 nm and 1 m.
    pub fn set_scale_limits(&mut self, min_scale: f64, max_scale: f64) {
        self.min_scale = min_scale;
        self.max_scale = max_scale;
        self.scale = self.scale.clamp(min_scale, max_scale);
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        if width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0 {
            self.width = width;
            self.height = height;
        } else {
            self.invalid_updates += 1;
        }
    }

    pub fn world_to_screen(&self, w: Vec2) -> Vec2 {
        Vec2::new(
            (w.x - self.origin.x) * self.scale,
            (w.y - self.origin.y) * -self.scale,
        )
    }

    pub fn screen_to_world(&self, s: Vec2) -> Vec2 {
        Vec2::new(
            self.origin.x + s.x / self.scale,
            self.origin.y - s.y / self.scale,
        )
    }

    /// The visible window in world coordinates.
    pub fn visible_bounds(&self) -> BBox {
        BBox::from_corners(
            self.origin.x,
            self.origin.y - self.height / self.scale,
            self.origin.x + self.width / self.scale,
            self.origin.y,
        )
    }

    pub fn center(&self) -> Vec2 {
        self.visible_bounds().center()
    }

    /// Pan by a screen-pixel delta (dragging content right is positive dx).
    pub fn pan(&mut self, dx: f64, dy: f64) {
        if !dx.is_finite() || !dy.is_finite() {
            self.invalid_updates += 1;
            return;
        }
        self.origin.x -= dx / self.scale;
        self.origin.y += dy / self.scale;
    }

    /// Zoom by `factor` keeping the world point under `cursor` fixed.
    pub fn zoom_at(&mut self, cursor: Vec2, factor: f64) {
        if !factor.is_finite() || factor <= 0.0 || !cursor.x.is_finite() || !cursor.y.is_finite() {
            self.invalid_updates += 1;
            return;
        }
        let anchor = self.screen_to_world(cursor);
        let new_scale = (self.scale * factor).clamp(self.min_scale, self.max_scale);
        if !new_scale.is_finite() || new_scale <= 0.0 {
            self.invalid_updates += 1;
            return;
        }
        self.scale = new_scale;
        // Re-anchor so `cursor` still maps to the same world point.
        self.origin.x = anchor.x - cursor.x / self.scale;
        self.origin.y = anchor.y + cursor.y / self.scale;
    }

    /// Center the view on a world point without changing zoom.
    pub fn center_on(&mut self, world: Vec2) {
        if !world.x.is_finite() || !world.y.is_finite() {
            self.invalid_updates += 1;
            return;
        }
        self.origin.x = world.x - self.width / (2.0 * self.scale);
        self.origin.y = world.y + self.height / (2.0 * self.scale);
    }

    /// Fit a world box into the canvas with a 10% margin. A degenerate box
    /// leaves the viewport unchanged.
    pub fn fit(&mut self, bbox: &BBox) {
        if bbox.is_empty() || (bbox.width() <= 0.0 && bbox.height() <= 0.0) {
            return;
        }
        let zoom_x = if bbox.width() > 0.0 {
            self.width / bbox.width()
        } else {
            f64::MAX
        };
        let zoom_y = if bbox.height() > 0.0 {
            self.height / bbox.height()
        } else {
            f64::MAX
        };
        let scale = (zoom_x.min(zoom_y) * FIT_MARGIN).clamp(self.min_scale, self.max_scale);
        if !scale.is_finite() || scale <= 0.0 {
            self.invalid_updates += 1;
            return;
        }
        self.scale = scale;
        self.center_on(bbox.center());
    }

    pub fn state(&self) -> ViewportState {
        ViewportState {
            origin: self.origin,
            scale: self.scale,
        }
    }

    /// Restore persisted state; invalid values are rejected and counted.
    pub fn restore(&mut self, state: ViewportState) {
        let ok = state.origin.x.is_finite()
            && state.origin.y.is_finite()
            && state.scale.is_finite()
            && state.scale > 0.0;
        if ok {
            self.origin = state.origin;
            self.scale = state.scale.clamp(self.min_scale, self.max_scale);
        } else {
            self.invalid_updates += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_round_trip_world_screen() {
        let mut vp = Viewport::new(800.0, 600.0);
        vp.fit(&BBox::from_corners(0.0, 0.0, 1000.0, 1000.0));
        let w = Vec2::new(123.0, 456.0);
        let back = vp.screen_to_world(vp.world_to_screen(w));
        assert!(close(back.x, w.x) && close(back.y, w.y));
    }

    #[test]
    fn test_y_axis_flips() {
        let mut vp = Viewport::new(800.0, 600.0);
        vp.fit(&BBox::from_corners(0.0, 0.0, 100.0, 100.0));
        let top = vp.world_to_screen(Vec2::new(50.0, 100.0));
        let bottom = vp.world_to_screen(Vec2::new(50.0, 0.0));
        assert!(top.y < bottom.y, "higher world Y must be higher on screen");
    }

    #[test]
    fn test_fit_is_idempotent() {
        // Property 8.
        let mut vp = Viewport::new(800.0, 600.0);
        let bb = BBox::from_corners(-200.0, -100.0, 700.0, 400.0);
        vp.fit(&bb);
        let first = vp.state();
        vp.fit(&bb);
        assert!(close(first.scale, vp.scale()));
        assert!(close(first.origin.x, vp.origin().x));
        assert!(close(first.origin.y, vp.origin().y));
    }

    #[test]
    fn test_fit_centers_and_contains() {
        let mut vp = Viewport::new(800.0, 600.0);
        let bb = BBox::from_corners(0.0, 0.0, 1000.0, 500.0);
        vp.fit(&bb);
        let visible = vp.visible_bounds();
        assert!(visible.min.x <= 0.0 && visible.max.x >= 1000.0);
        assert!(visible.min.y <= 0.0 && visible.max.y >= 500.0);
        let c = vp.center();
        assert!(close(c.x, 500.0) && close(c.y, 250.0));
    }

    #[test]
    fn test_zoom_in_then_out_restores() {
        // Property 9.
        let mut vp = Viewport::new(800.0, 600.0);
        vp.fit(&BBox::from_corners(0.0, 0.0, 1000.0, 1000.0));
        let before = vp.state();
        let cursor = Vec2::new(300.0, 200.0);
        vp.zoom_at(cursor, 1.1);
        vp.zoom_at(cursor, 1.0 / 1.1);
        assert!(close(before.scale, vp.scale()));
        assert!(close(before.origin.x, vp.origin().x));
        assert!(close(before.origin.y, vp.origin().y));
    }

    #[test]
    fn test_zoom_keeps_cursor_anchored() {
        let mut vp = Viewport::new(800.0, 600.0);
        vp.fit(&BBox::from_corners(0.0, 0.0, 1000.0, 1000.0));
        let cursor = Vec2::new(640.0, 120.0);
        let before = vp.screen_to_world(cursor);
        vp.zoom_at(cursor, 1.1);
        let after = vp.screen_to_world(cursor);
        assert!(close(before.x, after.x) && close(before.y, after.y));
    }

    #[test]
    fn test_invalid_updates_are_rejected_and_counted() {
        let mut vp = Viewport::new(800.0, 600.0);
        vp.fit(&BBox::from_corners(0.0, 0.0, 100.0, 100.0));
        let before = vp.state();
        vp.pan(f64::NAN, 0.0);
        vp.zoom_at(Vec2::new(10.0, 10.0), 0.0);
        vp.restore(ViewportState {
            origin: Vec2::new(f64::NAN, 0.0),
            scale: 1.0,
        });
        assert_eq!(vp.invalid_updates, 3);
        assert!(close(before.scale, vp.scale()));
        assert!(close(before.origin.x, vp.origin().x));
    }

    #[test]
    fn test_scale_clamped_to_limits() {
        let mut vp = Viewport::new(800.0, 600.0);
        vp.set_scale_limits(0.01, 100.0);
        for _ in 0..200 {
            vp.zoom_at(Vec2::new(400.0, 300.0), 1.1);
        }
        assert!(close(vp.scale(), 100.0));
        for _ in 0..400 {
            vp.zoom_at(Vec2::new(400.0, 300.0), 0.9);
        }
        assert!(close(vp.scale(), 0.01));
    }

    #[test]
    fn test_pan_moves_view() {
        let mut vp = Viewport::new(800.0, 600.0);
        vp.fit(&BBox::from_corners(0.0, 0.0, 800.0, 600.0));
        let before = vp.center();
        vp.pan(100.0, 0.0); // drag content right; view moves left in world
        let after = vp.center();
        assert!(after.x < before.x);
        assert!(close(after.y, before.y));
    }

    #[test]
    fn test_state_round_trip() {
        let mut vp = Viewport::new(800.0, 600.0);
        vp.fit(&BBox::from_corners(0.0, 0.0, 123.0, 456.0));
        let state = vp.state();
        let json = serde_json::to_string(&state).unwrap();
        let back: ViewportState = serde_json::from_str(&json).unwrap();
        let mut other = Viewport::new(800.0, 600.0);
        other.restore(back);
        assert!(close(other.scale(), vp.scale()));
    }
}
