//! Vector type aliases for mesh positions and grid offsets.

use nalgebra::{Vector2, Vector3};

/// 3D vector type for vertex positions, normals, and world placements.
///
/// This is a simple alias for `nalgebra::Vector3<f32>`.
pub type Vec3 = Vector3<f32>;

/// 2D vector type for chunk placement offsets and per-axis scale factors.
pub type Vec2 = Vector2<f32>;

/// 2D integer vector used for noise domain offsets.
pub type IVec2 = Vector2<i32>;
