//! Terrain Generation Core Library
//!
//! GPU-accelerated procedural terrain: layered noise fields are synthesized
//! by compute kernels and converted into triangle meshes, either as a single
//! mesh or as a grid of fixed-resolution chunks whose edges line up exactly.
//!
//! ## Pipeline
//!
//! 1. [`NoiseFieldSynthesizer`] composites up to six weighted noise layers
//!    into a [`HeightField`].
//! 2. The field is uploaded to a GPU image.
//! 3. [`MeshSynthesizer`] or [`ChunkedMeshSynthesizer`] dispatches the mesh
//!    kernels and reads back vertices and triangles.
//!
//! All device work goes through the [`ComputeDevice`] trait. With the `gpu`
//! feature (on by default) [`WgpuDevice`] runs it on any wgpu adapter.
//!
//! ```no_run
//! use terrain_gen_core::{TerrainGenerator, TerrainSettings, WgpuDevice};
//!
//! # fn main() -> terrain_gen_core::Result<()> {
//! let mut generator = TerrainGenerator::with_default_device()?;
//! let terrain = generator.generate_terrain(&TerrainSettings::default())?;
//! for placement in TerrainGenerator::<WgpuDevice>::placements(&terrain.chunks) {
//!     println!("chunk ({}, {}) at {:?}", placement.column, placement.row, placement.position);
//! }
//! # Ok(())
//! # }
//! ```

// Core types and utilities
pub mod core_types;
pub mod error;

// Device layer
pub mod gpu;

// Synthesis
pub mod generator;
pub mod mesh;
pub mod noise;

// Re-export core types
pub use core_types::{
    Bounds, ChunkGrid, ChunkLayout, ChunkResolution, GeometryMesh, HeightField, IVec2, Vec2,
    Vec3,
};
pub use error::{Advisory, Generated, Result, TerrainError};

// Re-export device layer
pub use gpu::{ComputeDevice, ProgramProvider, RenderTargetScope};
#[cfg(feature = "gpu")]
pub use gpu::{GpuContext, WgpuDevice};

// Re-export synthesizers
pub use generator::{
    ChunkPlacement, MeshSettings, NoiseSettings, Terrain, TerrainGenerator, TerrainSettings,
};
pub use mesh::{ChunkedMeshSynthesizer, MeshSynthesizer, MESH_SIZE_THRESHOLD};
pub use noise::{
    NoiseFieldSynthesizer, NoiseLayerConfig, NoiseLayerStack, NoiseType, MAX_NOISE_LAYERS,
};
