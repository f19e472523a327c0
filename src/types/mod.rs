//! Shared types used throughout the library.

mod color;
mod transform;

pub use color::Color;
pub use transform::{is_mirroring, ldraw_matrix, orientation_fix, translation};

use glam::{Mat4, Vec3};

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// A zero-size box at the origin.
    pub fn degenerate() -> Self {
        Self {
            min: Vec3::ZERO,
            max: Vec3::ZERO,
        }
    }

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        let mut has_points = false;

        for p in points {
            has_points = true;
            min = min.min(p);
            max = max.max(p);
        }

        if has_points {
            Some(Self { min, max })
        } else {
            None
        }
    }

    pub fn dimensions(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Largest extent along any axis.
    pub fn max_dimension(&self) -> f32 {
        self.dimensions().max_element()
    }

    /// Smallest box containing both boxes.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// The eight corners of the box.
    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    /// Axis-aligned box enclosing this box after an affine transform.
    pub fn transformed(&self, matrix: &Mat4) -> BoundingBox {
        // from_points only returns None for an empty iterator
        BoundingBox::from_points(self.corners().iter().map(|c| matrix.transform_point3(*c)))
            .unwrap_or(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_points() {
        let bounds = BoundingBox::from_points([
            Vec3::new(1.0, -2.0, 3.0),
            Vec3::new(-1.0, 4.0, 0.0),
        ])
        .unwrap();
        assert_eq!(bounds.min, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(bounds.max, Vec3::new(1.0, 4.0, 3.0));
        assert_eq!(bounds.max_dimension(), 6.0);

        assert!(BoundingBox::from_points(std::iter::empty()).is_none());
    }

    #[test]
    fn test_transformed_box() {
        let bounds = BoundingBox::new(Vec3::ZERO, Vec3::new(2.0, 1.0, 1.0));
        let moved = bounds.transformed(&Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0)));
        assert_eq!(moved.min, Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(moved.max, Vec3::new(12.0, 1.0, 1.0));

        let flipped = bounds.transformed(&orientation_fix());
        assert!((flipped.min.y - -1.0).abs() < 1e-5);
        assert!(flipped.max.y.abs() < 1e-5);
    }
}
