//! Math types for rtbuild

pub use glam::{Affine3A, Mat3A, Vec3, Vec3A};

/// Axis-aligned bounding box.
///
/// `Aabb::EMPTY` has `+inf` lower and `-inf` upper corners, so merging any box
/// into it yields that box. A box is empty when any lower component exceeds
/// its upper component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub lower: Vec3,
    pub upper: Vec3,
}

impl Aabb {
    pub const EMPTY: Self = Self {
        lower: Vec3::splat(f32::INFINITY),
        upper: Vec3::splat(f32::NEG_INFINITY),
    };

    pub fn new(lower: Vec3, upper: Vec3) -> Self {
        Self { lower, upper }
    }

    pub fn from_point(point: Vec3) -> Self {
        Self {
            lower: point,
            upper: point,
        }
    }

    /// Smallest box enclosing all `points`; `EMPTY` for an empty slice.
    pub fn from_points(points: &[Vec3]) -> Self {
        points
            .iter()
            .fold(Self::EMPTY, |acc, &p| acc.merge(&Self::from_point(p)))
    }

    pub fn is_empty(&self) -> bool {
        self.lower.x > self.upper.x || self.lower.y > self.upper.y || self.lower.z > self.upper.z
    }

    pub fn is_finite(&self) -> bool {
        self.lower.is_finite() && self.upper.is_finite()
    }

    pub fn merge(&self, other: &Self) -> Self {
        Self {
            lower: self.lower.min(other.lower),
            upper: self.upper.max(other.upper),
        }
    }

    pub fn extend(&mut self, other: &Self) {
        *self = self.merge(other);
    }

    /// Twice the center; avoids the multiply when only relative positions matter.
    pub fn center2(&self) -> Vec3 {
        self.lower + self.upper
    }

    pub fn size(&self) -> Vec3 {
        self.upper - self.lower
    }

    /// Bounds of this box after transforming all eight corners.
    pub fn transformed(&self, xfm: &Affine3A) -> Self {
        let mut out = Self::EMPTY;
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { self.lower.x } else { self.upper.x },
                if i & 2 == 0 { self.lower.y } else { self.upper.y },
                if i & 4 == 0 { self.lower.z } else { self.upper.z },
            );
            out.extend(&Self::from_point(xfm.transform_point3(corner)));
        }
        out
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}
