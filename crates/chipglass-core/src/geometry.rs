use serde::{Deserialize, Serialize};

/// A point in database units (DBU), exactly as stored in GDSII `XY` records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn to_vec2(self) -> Vec2 {
        Vec2::new(self.x as f64, self.y as f64)
    }
}

/// A 2D vector in world coordinates (DBU, but fractional after transforms).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn add(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x + other.x, self.y + other.y)
    }

    pub fn sub(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x - other.x, self.y - other.y)
    }

    pub fn scale(self, k: f64) -> Vec2 {
        Vec2::new(self.x * k, self.y * k)
    }

    pub fn distance_to(self, other: Vec2) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// An axis-aligned bounding box. Empty iff `max < min` on either axis;
/// [`BBox::EMPTY`] is the identity for [`BBox::union`] and intersects nothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min: Vec2,
    pub max: Vec2,
}

impl Default for BBox {
    fn default() -> Self {
        BBox::EMPTY
    }
}

impl BBox {
    pub const EMPTY: BBox = BBox {
        min: Vec2 {
            x: f64::INFINITY,
            y: f64::INFINITY,
        },
        max: Vec2 {
            x: f64::NEG_INFINITY,
            y: f64::NEG_INFINITY,
        },
    };

    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            min: Vec2::new(x1.min(x2), y1.min(y2)),
            max: Vec2::new(x1.max(x2), y1.max(y2)),
        }
    }

    pub fn from_points(points: &[Point]) -> Self {
        let mut bb = BBox::EMPTY;
        for p in points {
            bb.include(p.to_vec2());
        }
        bb
    }

    pub fn is_empty(&self) -> bool {
        self.max.x < self.min.x || self.max.y < self.min.y
    }

    pub fn include(&mut self, p: Vec2) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
    }

    pub fn union(&self, other: &BBox) -> BBox {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        BBox {
            min: Vec2::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: Vec2::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        }
    }

    pub fn intersects(&self, other: &BBox) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    pub fn contains_point(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    pub fn translated(&self, by: Vec2) -> BBox {
        if self.is_empty() {
            return *self;
        }
        BBox {
            min: self.min.add(by),
            max: self.max.add(by),
        }
    }

    pub fn expanded(&self, margin: f64) -> BBox {
        if self.is_empty() {
            return *self;
        }
        BBox {
            min: Vec2::new(self.min.x - margin, self.min.y - margin),
            max: Vec2::new(self.max.x + margin, self.max.y + margin),
        }
    }

    pub fn width(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.max.x - self.min.x
        }
    }

    pub fn height(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.max.y - self.min.y
        }
    }

    /// The longer side, 0 for an empty box.
    pub fn largest_extent(&self) -> f64 {
        self.width().max(self.height())
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_from_points() {
        let pts = [
            Point::new(0, 0),
            Point::new(1000, 0),
            Point::new(1000, 1000),
            Point::new(0, 1000),
        ];
        let bb = BBox::from_points(&pts);
        assert_eq!(bb, BBox::from_corners(0.0, 0.0, 1000.0, 1000.0));
    }

    #[test]
    fn test_empty_bbox_union_identity() {
        let a = BBox::from_corners(1.0, 2.0, 3.0, 4.0);
        assert_eq!(BBox::EMPTY.union(&a), a);
        assert_eq!(a.union(&BBox::EMPTY), a);
        assert!(BBox::EMPTY.is_empty());
        assert!(BBox::from_points(&[]).is_empty());
    }

    #[test]
    fn test_empty_bbox_intersects_nothing() {
        let a = BBox::from_corners(0.0, 0.0, 10.0, 10.0);
        assert!(!BBox::EMPTY.intersects(&a));
        assert!(!a.intersects(&BBox::EMPTY));
        assert!(a.intersects(&a));
    }

    #[test]
    fn test_bbox_intersection() {
        let a = BBox::from_corners(0.0, 0.0, 10.0, 10.0);
        let b = BBox::from_corners(5.0, 5.0, 15.0, 15.0);
        let c = BBox::from_corners(20.0, 20.0, 30.0, 30.0);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_largest_extent() {
        let a = BBox::from_corners(0.0, 0.0, 30.0, 10.0);
        assert!((a.largest_extent() - 30.0).abs() < 1e-12);
        assert_eq!(BBox::EMPTY.largest_extent(), 0.0);
    }
}
