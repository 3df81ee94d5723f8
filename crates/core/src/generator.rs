//! End-to-end terrain generation
//!
//! [`TerrainGenerator`] owns a compute device and the three synthesizers and
//! runs noise synthesis followed by chunked (or single) mesh generation from
//! a [`TerrainSettings`] document.

use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core_types::{ChunkGrid, ChunkResolution, GeometryMesh, HeightField, Vec3};
use crate::error::{Generated, Result, TerrainError};
use crate::gpu::ComputeDevice;
use crate::mesh::{ChunkedMeshSynthesizer, MeshSynthesizer};
use crate::noise::{NoiseFieldSynthesizer, NoiseLayerConfig, NoiseLayerStack};

/// Noise field size and layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseSettings {
    /// Field width in pixels
    pub width: u32,
    /// Field height in pixels
    pub height: u32,
    /// Layers summed into the field
    pub layers: NoiseLayerStack,
}

impl Default for NoiseSettings {
    fn default() -> Self {
        Self {
            width: 256,
            height: 256,
            layers: NoiseLayerStack::single(NoiseLayerConfig::default()),
        }
    }
}

/// Mesh conversion parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshSettings {
    /// Vertices along one chunk edge
    pub resolution: ChunkResolution,
    /// Chunk footprint scaling
    pub scale: f32,
    /// Vertical scale applied to heights
    pub height_modifier: f32,
    /// Average normals along chunk seams after generation
    pub blend_seam_normals: bool,
}

impl Default for MeshSettings {
    fn default() -> Self {
        Self {
            resolution: ChunkResolution::R64,
            scale: 1.0,
            height_modifier: 1.0,
            blend_seam_normals: false,
        }
    }
}

/// Complete generation settings, loadable from JSON.
///
/// Missing fields take their defaults, so `{}` is a valid document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainSettings {
    pub noise: NoiseSettings,
    pub mesh: MeshSettings,
}

impl TerrainSettings {
    /// Parse and validate settings from a JSON string.
    ///
    /// # Errors
    /// Returns [`TerrainError::Settings`] on malformed JSON and
    /// [`TerrainError::InvalidParameter`] on out-of-range values
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read settings from a JSON file.
    ///
    /// # Errors
    /// Returns [`TerrainError::Io`] if the file cannot be read, otherwise as [`Self::from_json_str`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check value ranges.
    ///
    /// # Errors
    /// Returns [`TerrainError::InvalidParameter`] naming the first invalid value
    pub fn validate(&self) -> Result<()> {
        if self.noise.width == 0 || self.noise.height == 0 {
            return Err(TerrainError::invalid_parameter(
                "noise.size",
                format!(
                    "must be positive, got {}x{}",
                    self.noise.width, self.noise.height
                ),
            ));
        }
        if !self.mesh.scale.is_finite() || self.mesh.scale <= 0.0 {
            return Err(TerrainError::invalid_parameter(
                "mesh.scale",
                format!("must be finite and positive, got {}", self.mesh.scale),
            ));
        }
        if !self.mesh.height_modifier.is_finite() {
            return Err(TerrainError::invalid_parameter(
                "mesh.height_modifier",
                "must be finite",
            ));
        }
        Ok(())
    }
}

/// World placement of one chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkPlacement {
    pub column: u32,
    pub row: u32,
    /// Chunk origin; the grid offset lies in the XZ plane
    pub position: Vec3,
}

/// Output of [`TerrainGenerator::generate_terrain`].
#[derive(Debug, Clone)]
pub struct Terrain {
    pub field: HeightField,
    pub chunks: ChunkGrid,
}

/// Runs the generation pipeline on one device.
pub struct TerrainGenerator<D: ComputeDevice> {
    device: D,
    noise: NoiseFieldSynthesizer,
    mesh: MeshSynthesizer,
    chunked: ChunkedMeshSynthesizer,
}

impl<D: ComputeDevice> TerrainGenerator<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            noise: NoiseFieldSynthesizer::new(),
            mesh: MeshSynthesizer::new(),
            chunked: ChunkedMeshSynthesizer::new(),
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn into_device(self) -> D {
        self.device
    }

    /// Synthesize the layered noise field described by `settings`.
    ///
    /// # Errors
    /// Propagates synthesizer errors
    pub fn generate_field(&mut self, settings: &NoiseSettings) -> Result<HeightField> {
        self.noise.generate_layered(
            &mut self.device,
            settings.width,
            settings.height,
            &settings.layers,
        )
    }

    /// Convert a field into chunks, blending seam normals if requested.
    ///
    /// # Errors
    /// Propagates synthesizer errors
    pub fn generate_chunks(
        &mut self,
        field: &HeightField,
        settings: &MeshSettings,
    ) -> Result<ChunkGrid> {
        let mut grid = self.chunked.generate(
            &mut self.device,
            field,
            settings.resolution,
            settings.height_modifier,
            settings.scale,
        )?;
        if settings.blend_seam_normals {
            grid.blend_seam_normals();
        }
        Ok(grid)
    }

    /// Convert a field into one mesh.
    ///
    /// # Errors
    /// Propagates synthesizer errors
    pub fn generate_mesh(
        &mut self,
        field: &HeightField,
        settings: &MeshSettings,
    ) -> Result<Generated<GeometryMesh>> {
        self.mesh
            .generate(&mut self.device, field, settings.height_modifier)
    }

    /// Run noise synthesis then chunked mesh generation.
    ///
    /// # Errors
    /// Propagates synthesizer errors
    pub fn generate_terrain(&mut self, settings: &TerrainSettings) -> Result<Terrain> {
        let start = Instant::now();
        let field = self.generate_field(&settings.noise)?;
        let chunks = self.generate_chunks(&field, &settings.mesh)?;

        let vertices: usize = chunks.meshes().iter().map(GeometryMesh::vertex_count).sum();
        info!(
            "Generated {}x{} terrain: {}x{} chunks at {}, {} vertices in {:.1}ms",
            field.width(),
            field.height(),
            chunks.cols(),
            chunks.rows(),
            settings.mesh.resolution,
            vertices,
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(Terrain { field, chunks })
    }

    /// World placements for every chunk, in row-major order.
    pub fn placements(grid: &ChunkGrid) -> Vec<ChunkPlacement> {
        grid.iter()
            .map(|(column, row, _, offset)| ChunkPlacement {
                column,
                row,
                position: Vec3::new(offset.x, 0.0, offset.y),
            })
            .collect()
    }
}

#[cfg(feature = "gpu")]
impl TerrainGenerator<crate::gpu::WgpuDevice> {
    /// Generator on the default wgpu adapter.
    ///
    /// # Errors
    /// Returns [`TerrainError::DeviceUnavailable`] if no adapter or device can be created
    pub fn with_default_device() -> Result<Self> {
        crate::gpu::WgpuDevice::create_blocking().map(Self::new)
    }
}
