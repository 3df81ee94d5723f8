//! Core types shared by the synthesizers

pub mod chunk;
pub mod height_field;
pub mod mesh;
pub mod vec3;

pub use chunk::{ChunkGrid, ChunkLayout, ChunkResolution};
pub use height_field::{HeightField, HEIGHT_CHANNEL_BITS, HEIGHT_LEVELS};
pub use mesh::{Bounds, GeometryMesh};
pub use vec3::{IVec2, Vec2, Vec3};
