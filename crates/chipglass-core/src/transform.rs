use serde::{Deserialize, Serialize};

use crate::geometry::{BBox, Point, Vec2};

/// Placement of a cell reference: magnification, optional reflection across
/// the X axis (applied before rotation), rotation in degrees, translation
/// in parent DBU. Arbitrary angles are legal and are never snapped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Transform {
    pub offset: Vec2,
    /// Rotation in degrees, counterclockwise.
    pub rotation: f64,
    /// Reflect across the X axis before rotating.
    pub mirror_x: bool,
    /// Magnification (positive).
    pub mag: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            rotation: 0.0,
            mirror_x: false,
            mag: 1.0,
        }
    }
}

impl Transform {
    pub fn translate(x: f64, y: f64) -> Self {
        Self {
            offset: Vec2::new(x, y),
            ..Default::default()
        }
    }

    pub fn apply(&self, p: Point) -> Vec2 {
        Affine::from_transform(self).apply(p.to_vec2())
    }
}

/// A 2D affine map in row form: `(x, y) → (a·x + c·y + tx, b·x + d·y + ty)`.
///
/// Instance transforms compose into one of these during batching so each
/// polygon vertex is touched exactly once per flatten.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub tx: f64,
    pub ty: f64,
}

impl Affine {
    pub const IDENTITY: Affine = Affine {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    /// Magnify, mirror (y = −y), rotate, translate — in that order.
    pub fn from_transform(t: &Transform) -> Self {
        let s = if t.mirror_x { -1.0 } else { 1.0 };
        let rad = t.rotation.to_radians();
        let (sin, cos) = rad.sin_cos();
        Affine {
            a: t.mag * cos,
            b: t.mag * sin,
            c: -s * t.mag * sin,
            d: s * t.mag * cos,
            tx: t.offset.x,
            ty: t.offset.y,
        }
    }

    /// `self ∘ rhs`: applies `rhs` first, then `self`.
    pub fn compose(&self, rhs: &Affine) -> Affine {
        Affine {
            a: self.a * rhs.a + self.c * rhs.b,
            b: self.b * rhs.a + self.d * rhs.b,
            c: self.a * rhs.c + self.c * rhs.d,
            d: self.b * rhs.c + self.d * rhs.d,
            tx: self.a * rhs.tx + self.c * rhs.ty + self.tx,
            ty: self.b * rhs.tx + self.d * rhs.ty + self.ty,
        }
    }

    /// The same map with an extra translation applied last (array lattice
    /// offsets live in the parent coordinate space).
    pub fn translated(&self, by: Vec2) -> Affine {
        Affine {
            tx: self.tx + by.x,
            ty: self.ty + by.y,
            ..*self
        }
    }

    pub fn apply(&self, p: Vec2) -> Vec2 {
        Vec2::new(
            self.a * p.x + self.c * p.y + self.tx,
            self.b * p.x + self.d * p.y + self.ty,
        )
    }

    pub fn apply_point(&self, p: Point) -> Vec2 {
        self.apply(p.to_vec2())
    }

    /// The AABB of the transformed box: map all four corners, re-wrap.
    pub fn bbox_of(&self, bb: &BBox) -> BBox {
        if bb.is_empty() {
            return *bb;
        }
        let mut out = BBox::EMPTY;
        out.include(self.apply(Vec2::new(bb.min.x, bb.min.y)));
        out.include(self.apply(Vec2::new(bb.max.x, bb.min.y)));
        out.include(self.apply(Vec2::new(bb.max.x, bb.max.y)));
        out.include(self.apply(Vec2::new(bb.min.x, bb.max.y)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec2, b: Vec2) -> bool {
        (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9
    }

    #[test]
    fn test_translate_only() {
        let t = Transform::translate(10.0, 20.0);
        assert!(close(t.apply(Point::new(5, 5)), Vec2::new(15.0, 25.0)));
    }

    #[test]
    fn test_rotate_90() {
        let t = Transform {
            rotation: 90.0,
            ..Default::default()
        };
        assert!(close(t.apply(Point::new(10, 0)), Vec2::new(0.0, 10.0)));
    }

    #[test]
    fn test_mirror_before_rotation() {
        // Reflection across X happens before the 90° turn: (0, 1) → (0, −1) → (1, 0).
        let t = Transform {
            rotation: 90.0,
            mirror_x: true,
            ..Default::default()
        };
        assert!(close(t.apply(Point::new(0, 1)), Vec2::new(1.0, 0.0)));
    }

    #[test]
    fn test_magnify_then_translate() {
        let t = Transform {
            offset: Vec2::new(100.0, 0.0),
            mag: 2.0,
            ..Default::default()
        };
        assert!(close(t.apply(Point::new(3, 4)), Vec2::new(106.0, 8.0)));
    }

    #[test]
    fn test_compose_matches_nested_apply() {
        let outer = Affine::from_transform(&Transform {
            offset: Vec2::new(7.0, -3.0),
            rotation: 30.0,
            ..Default::default()
        });
        let inner = Affine::from_transform(&Transform {
            offset: Vec2::new(1.0, 2.0),
            rotation: 45.0,
            mirror_x: true,
            mag: 1.5,
            ..Default::default()
        });
        let composed = outer.compose(&inner);
        let p = Vec2::new(11.0, -4.0);
        assert!(close(composed.apply(p), outer.apply(inner.apply(p))));
    }

    #[test]
    fn test_bbox_of_rotated_box() {
        let t = Affine::from_transform(&Transform {
            rotation: 90.0,
            ..Default::default()
        });
        let bb = t.bbox_of(&BBox::from_corners(0.0, 0.0, 10.0, 20.0));
        let want = BBox::from_corners(-20.0, 0.0, 0.0, 10.0);
        assert!((bb.min.x - want.min.x).abs() < 1e-9);
        assert!((bb.max.y - want.max.y).abs() < 1e-9);
    }
}
