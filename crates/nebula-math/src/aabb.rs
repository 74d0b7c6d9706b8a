use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::BoundingSphere;

/// Axis-Aligned Bounding Box in f32 world space (meters).
///
/// Invariant: min.x <= max.x, min.y <= max.y, min.z <= max.z.
/// The constructor enforces this by swapping components if needed.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Create an AABB from two corners. Automatically sorts
    /// components so that min <= max on every axis.
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Create an AABB from a center point and half-extents.
    pub fn from_center_half_extents(center: Vec3, half: Vec3) -> Self {
        Self::new(center - half, center + half)
    }

    /// The tightest box around a bounding sphere.
    pub fn from_sphere(sphere: &BoundingSphere) -> Self {
        Self::from_center_half_extents(sphere.center, Vec3::splat(sphere.radius))
    }

    /// Returns true if the point lies inside or on the boundary.
    pub fn contains_point(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    /// Returns true if this AABB overlaps with other
    /// (including touching edges/faces).
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }

    /// Returns the smallest AABB enclosing both self and other.
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Returns the volume in cubic meters.
    pub fn volume(&self) -> f32 {
        let size = self.size();
        size.x * size.y * size.z
    }

    /// Returns the center point of the AABB.
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Returns a new AABB expanded by `margin` on each side.
    pub fn expand_by(&self, margin: f32) -> Aabb {
        Aabb {
            min: self.min - Vec3::splat(margin),
            max: self.max + Vec3::splat(margin),
        }
    }

    /// Returns the size along each axis.
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// The sphere through all eight corners.
    pub fn bounding_sphere(&self) -> BoundingSphere {
        BoundingSphere::new(self.center(), self.size().length() * 0.5)
    }

    /// Returns true if the AABB has zero volume
    /// (degenerate on at least one axis).
    pub fn is_degenerate(&self) -> bool {
        self.min.x == self.max.x || self.min.y == self.max.y || self.min.z == self.max.z
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube(min: f32, max: f32) -> Aabb {
        Aabb::new(Vec3::splat(min), Vec3::splat(max))
    }

    #[test]
    fn test_contains_point_inside() {
        assert!(cube(0.0, 10.0).contains_point(Vec3::splat(5.0)));
    }

    #[test]
    fn test_contains_point_outside() {
        assert!(!cube(0.0, 10.0).contains_point(Vec3::new(11.0, 5.0, 5.0)));
    }

    #[test]
    fn test_contains_point_on_edge() {
        let aabb = cube(0.0, 10.0);
        assert!(aabb.contains_point(Vec3::ZERO)); // min corner
        assert!(aabb.contains_point(Vec3::splat(10.0))); // max corner
        assert!(aabb.contains_point(Vec3::new(10.0, 5.0, 5.0))); // face
    }

    #[test]
    fn test_intersects_overlapping() {
        let a = cube(0.0, 10.0);
        let b = cube(5.0, 15.0);
        assert!(a.intersects(&b));
        assert!(b.intersects(&a)); // symmetric
    }

    #[test]
    fn test_intersects_disjoint() {
        let a = cube(0.0, 10.0);
        let b = cube(20.0, 30.0);
        assert!(!a.intersects(&b));
        assert!(!b.intersects(&a));
    }

    #[test]
    fn test_union_encloses_both() {
        let a = cube(0.0, 5.0);
        let b = cube(3.0, 10.0);
        let u = a.union(&b);
        assert_eq!(u.min, Vec3::ZERO);
        assert_eq!(u.max, Vec3::splat(10.0));
    }

    #[test]
    fn test_volume() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::new(10.0, 20.0, 30.0));
        assert_eq!(aabb.volume(), 6000.0);
    }

    #[test]
    fn test_constructor_auto_sorts() {
        let aabb = Aabb::new(Vec3::splat(10.0), Vec3::ZERO);
        assert_eq!(aabb.min, Vec3::ZERO);
        assert_eq!(aabb.max, Vec3::splat(10.0));
    }

    #[test]
    fn test_from_sphere_is_tight() {
        let sphere = BoundingSphere::new(Vec3::new(1.0, 2.0, 3.0), 2.0);
        let aabb = Aabb::from_sphere(&sphere);
        assert_eq!(aabb.min, Vec3::new(-1.0, 0.0, 1.0));
        assert_eq!(aabb.max, Vec3::new(3.0, 4.0, 5.0));
        assert_eq!(aabb.center(), sphere.center);
    }

    #[test]
    fn test_bounding_sphere_reaches_corners() {
        let aabb = cube(-1.0, 1.0);
        let sphere = aabb.bounding_sphere();
        assert_eq!(sphere.center, Vec3::ZERO);
        assert!((sphere.radius - 3.0_f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_expand_by() {
        let expanded = cube(5.0, 15.0).expand_by(2.0);
        assert_eq!(expanded.min, Vec3::splat(3.0));
        assert_eq!(expanded.max, Vec3::splat(17.0));
    }

    #[test]
    fn test_is_degenerate() {
        assert!(!cube(0.0, 10.0).is_degenerate());
        let flat = Aabb::new(Vec3::new(0.0, 5.0, 0.0), Vec3::new(10.0, 5.0, 10.0));
        assert!(flat.is_degenerate());
    }
}
