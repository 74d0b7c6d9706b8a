use std::f32::consts::PI;

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Volume of a sphere with the given radius.
pub fn sphere_volume(radius: f32) -> f32 {
    (4.0 / 3.0) * PI * radius * radius * radius
}

/// Bounding sphere in f32 world space (meters).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Default for BoundingSphere {
    fn default() -> Self {
        Self {
            center: Vec3::ZERO,
            radius: 0.0,
        }
    }
}

impl BoundingSphere {
    /// Create a sphere. Negative radii are clamped to zero.
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self {
            center,
            radius: radius.max(0.0),
        }
    }

    /// Volume in cubic meters.
    pub fn volume(&self) -> f32 {
        sphere_volume(self.radius)
    }

    /// Returns true for zero-radius or non-finite spheres.
    pub fn is_degenerate(&self) -> bool {
        self.radius <= 0.0 || !self.radius.is_finite() || !self.center.is_finite()
    }

    /// Returns true if `other` lies entirely inside this sphere.
    pub fn contains_sphere(&self, other: &BoundingSphere) -> bool {
        self.center.distance(other.center) + other.radius <= self.radius
    }

    /// Returns true if the point lies inside or on the surface.
    pub fn contains_point(&self, p: Vec3) -> bool {
        self.center.distance_squared(p) <= self.radius * self.radius
    }

    /// Returns true if the two spheres overlap (touching does not count).
    pub fn intersects(&self, other: &BoundingSphere) -> bool {
        self.center.distance(other.center) < self.radius + other.radius
    }

    /// Smallest sphere enclosing both spheres.
    ///
    /// When one sphere contains the other the container is returned unchanged,
    /// so the union of two identical spheres is bit-identical to either input.
    pub fn union(&self, other: &BoundingSphere) -> BoundingSphere {
        let offset = other.center - self.center;
        let dist = offset.length();

        if dist + other.radius <= self.radius {
            return *self;
        }
        if dist + self.radius <= other.radius {
            return *other;
        }

        // dist > 0 here: coincident centers always take one of the branches above.
        let radius = (dist + self.radius + other.radius) * 0.5;
        let center = self.center + offset * ((radius - self.radius) / dist);
        BoundingSphere { center, radius }
    }

    /// Volume shared by both spheres.
    ///
    /// Zero when disjoint, the smaller sphere's full volume when one contains
    /// the other, and the closed-form spherical lens volume otherwise.
    pub fn intersection_volume(&self, other: &BoundingSphere) -> f32 {
        let dist = self.center.distance(other.center);
        let (big, small) = if self.radius >= other.radius {
            (self.radius, other.radius)
        } else {
            (other.radius, self.radius)
        };

        if dist >= big + small || small <= 0.0 {
            return 0.0;
        }
        let small_volume = sphere_volume(small);
        if dist + small <= big {
            return small_volume;
        }

        let gap = big + small - dist;
        let lens = PI * gap * gap
            * (dist * dist + 2.0 * dist * small - 3.0 * small * small + 2.0 * dist * big
                + 6.0 * small * big
                - 3.0 * big * big)
            / (12.0 * dist);
        lens.clamp(0.0, small_volume)
    }
}
