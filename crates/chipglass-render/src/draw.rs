use chipglass_core::Vec2;

/// Straight-alpha color for the draw list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn from_rgb8(rgb: chipglass_core::Rgb, alpha: f32) -> Self {
        let [r, g, b, a] = rgb.to_f32_array(alpha);
        Self { r, g, b, a }
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }
}

/// Dark-theme palette.
pub mod palette {
    use super::Rgba;

    pub const BACKGROUND: Rgba = Rgba::new(0.07, 0.07, 0.09, 1.0);
    pub const GRID: Rgba = Rgba::new(0.55, 0.58, 0.65, 0.3);
    pub const INSTANCE_OUTLINE: Rgba = Rgba::new(0.45, 0.48, 0.55, 0.6);
    pub const VIEWPORT_OUTLINE: Rgba = Rgba::new(0.95, 0.2, 0.2, 1.0);
    pub const OVERLAY_TEXT: Rgba = Rgba::new(0.85, 0.87, 0.9, 1.0);
    pub const MINIMAP_BACKDROP: Rgba = Rgba::new(0.05, 0.05, 0.06, 1.0);
}

/// The opaque draw-list seam between the engine and the GPU layer.
///
/// Calls are a FIFO in document order: whatever is submitted first is drawn
/// first. Coordinates are logical screen pixels; the engine has already
/// applied the viewport transform.
pub trait DrawSurface {
    fn clear(&mut self, color: Rgba);
    fn fill_polygon(&mut self, points: &[Vec2], color: Rgba);
    fn stroke_polyline(&mut self, points: &[Vec2], width: f32, color: Rgba);
    fn stroke_rect(&mut self, min: Vec2, max: Vec2, width: f32, color: Rgba);
    fn text(&mut self, text: &str, at: Vec2, color: Rgba);
}

/// A recorded draw command, for tests and headless hosts.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCmd {
    Clear(Rgba),
    FillPolygon { points: Vec<Vec2>, color: Rgba },
    StrokePolyline { points: Vec<Vec2>, width: f32, color: Rgba },
    StrokeRect { min: Vec2, max: Vec2, width: f32, color: Rgba },
    Text { text: String, at: Vec2, color: Rgba },
}

/// [`DrawSurface`] that appends every command to a list.
#[derive(Debug, Default)]
pub struct Recording {
    pub commands: Vec<DrawCmd>,
}

impl Recording {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn fill_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, DrawCmd::FillPolygon { .. }))
            .count()
    }

    pub fn fills(&self) -> impl Iterator<Item = (&[Vec2], Rgba)> {
        self.commands.iter().filter_map(|c| match c {
            DrawCmd::FillPolygon { points, color } => Some((points.as_slice(), *color)),
            _ => None,
        })
    }
}

impl DrawSurface for Recording {
    fn clear(&mut self, color: Rgba) {
        self.commands.push(DrawCmd::Clear(color));
    }

    fn fill_polygon(&mut self, points: &[Vec2], color: Rgba) {
        self.commands.push(DrawCmd::FillPolygon {
            points: points.to_vec(),
            color,
        });
    }

    fn stroke_polyline(&mut self, points: &[Vec2], width: f32, color: Rgba) {
        self.commands.push(DrawCmd::StrokePolyline {
            points: points.to_vec(),
            width,
            color,
        });
    }

    fn stroke_rect(&mut self, min: Vec2, max: Vec2, width: f32, color: Rgba) {
        self.commands.push(DrawCmd::StrokeRect {
            min,
            max,
            width,
            color,
        });
    }

    fn text(&mut self, text: &str, at: Vec2, color: Rgba) {
        self.commands.push(DrawCmd::Text {
            text: text.to_string(),
            at,
            color,
        });
    }
}
