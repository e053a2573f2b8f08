//! Screen furniture: reference grid, scale bar, FPS counter, coordinate
//! readout. All of it draws after the geometry except the grid, which goes
//! underneath at 30% alpha.

use std::time::{Duration, Instant};

use chipglass_core::{Units, Vec2};

use crate::draw::{palette, DrawSurface};
use crate::viewport::Viewport;

/// Grid lines the spacing formula aims for across the viewport width.
pub const GRID_TARGET_LINES: f64 = 10.0;

/// Scale bar target: about a quarter of the viewport width.
const SCALE_BAR_FRACTION: f64 = 0.25;

/// Decimal grid pitch in world units: `10^⌊log10(width / target_lines)⌋`.
pub fn grid_spacing(view_width_world: f64, target_lines: f64) -> f64 {
    if view_width_world <= 0.0 || target_lines <= 0.0 {
        return 1.0;
    }
    10f64.powf((view_width_world / target_lines).log10().floor())
}

/// Draw the decimal grid under the geometry.
pub fn draw_grid(surface: &mut dyn DrawSurface, viewport: &Viewport, target_lines: f64) {
    let bounds = viewport.visible_bounds();
    let spacing = grid_spacing(bounds.width(), target_lines);
    if spacing <= 0.0 || !spacing.is_finite() {
        return;
    }

    let mut x = (bounds.min.x / spacing).floor() * spacing;
    while x <= bounds.max.x {
        let top = viewport.world_to_screen(Vec2::new(x, bounds.max.y));
        let bottom = viewport.world_to_screen(Vec2::new(x, bounds.min.y));
        surface.stroke_polyline(&[top, bottom], 1.0, palette::GRID);
        x += spacing;
    }
    let mut y = (bounds.min.y / spacing).floor() * spacing;
    while y <= bounds.max.y {
        let left = viewport.world_to_screen(Vec2::new(bounds.min.x, y));
        let right = viewport.world_to_screen(Vec2::new(bounds.max.x, y));
        surface.stroke_polyline(&[left, right], 1.0, palette::GRID);
        y += spacing;
    }
}

/// A chosen scale bar: a round length and its label.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleBar {
    pub length_um: f64,
    pub length_px: f64,
    pub label: String,
}

/// Pick a 1/2/5-series length in µm whose bar is at most a quarter of the
/// viewport width.
pub fn pick_scale_bar(viewport: &Viewport, units: &Units) -> ScaleBar {
    let target_px = viewport.width * SCALE_BAR_FRACTION;
    let target_um = units.dbu_to_um(target_px / viewport.scale());

    let mut best = 1e-3; // 1 nm floor
    let mut magnitude = 10f64.powf(target_um.abs().max(1e-12).log10().floor());
    for _ in 0..2 {
        for mult in [1.0, 2.0, 5.0] {
            let candidate = mult * magnitude;
            if candidate <= target_um && candidate > best {
                best = candidate;
            }
        }
        magnitude *= 10.0;
    }

    let length_px = best / units.dbu_to_um(1.0) * viewport.scale();
    ScaleBar {
        length_um: best,
        length_px,
        label: format_length_um(best),
    }
}

/// nm below 1 µm, mm at 1000 µm and beyond.
pub fn format_length_um(um: f64) -> String {
    if um < 1.0 {
        format!("{:.0} nm", um * 1e3)
    } else if um < 1000.0 {
        format!("{:.0} µm", um)
    } else {
        format!("{:.0} mm", um / 1e3)
    }
}

pub fn draw_scale_bar(surface: &mut dyn DrawSurface, viewport: &Viewport, units: &Units) {
    let bar = pick_scale_bar(viewport, units);
    let y = viewport.height - 24.0;
    let x0 = 16.0;
    let x1 = x0 + bar.length_px;
    surface.stroke_polyline(
        &[Vec2::new(x0, y), Vec2::new(x1, y)],
        2.0,
        palette::OVERLAY_TEXT,
    );
    for x in [x0, x1] {
        surface.stroke_polyline(
            &[Vec2::new(x, y - 4.0), Vec2::new(x, y + 4.0)],
            2.0,
            palette::OVERLAY_TEXT,
        );
    }
    surface.text(&bar.label, Vec2::new(x0, y - 8.0), palette::OVERLAY_TEXT);
}

/// Pointer position rendered in µm.
pub fn format_coords(world: Vec2, units: &Units) -> String {
    format!(
        "{:.3} µm, {:.3} µm",
        units.dbu_to_um(world.x),
        units.dbu_to_um(world.y)
    )
}

/// Frame counter folded into an FPS reading on a fixed interval.
#[derive(Debug)]
pub struct FpsCounter {
    interval: Duration,
    window_start: Instant,
    frames: u32,
    fps: f64,
}

impl FpsCounter {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            window_start: now,
            frames: 0,
            fps: 0.0,
        }
    }

    /// Count one frame; the published value refreshes every `interval`.
    pub fn tick(&mut self, now: Instant) {
        self.frames += 1;
        let elapsed = now.duration_since(self.window_start);
        if elapsed >= self.interval {
            self.fps = self.frames as f64 / elapsed.as_secs_f64();
            self.frames = 0;
            self.window_start = now;
        }
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }
}
