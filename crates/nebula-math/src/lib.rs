//! f32 bounding volumes and fundamental geometry operations for the Nebula Engine.

mod aabb;
mod sphere;

pub use aabb::Aabb;
pub use sphere::{BoundingSphere, sphere_volume};
