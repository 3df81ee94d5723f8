//! Tiled mesh generation
//!
//! Every tile has the same topology, so the triangle list is generated once
//! and shared. Each tile then costs one vertex dispatch and one readback.

use tracing::debug;

use super::{decode_indices, decode_positions};
use crate::core_types::{ChunkGrid, ChunkLayout, ChunkResolution, GeometryMesh, HeightField};
use crate::error::Result;
use crate::gpu::programs::{
    slots, MapParams, INDEX_STRIDE, INDICES_PER_VERTEX, MAP_CHUNK_KERNEL, MAP_PROGRAM,
    TRIANGLE_SETUP_KERNEL, VERTEX_STRIDE,
};
use crate::gpu::{
    upload_to_gpu_image, Binding, BufferHandle, ComputeDevice, ImageHandle, KernelHandle,
    ProgramProvider,
};

/// Kernels used by one chunked generation
#[derive(Debug, Clone, Copy)]
struct ChunkKernels {
    vertices: KernelHandle,
    triangles: KernelHandle,
}

/// Device resources shared by every tile
struct ChunkResources<'a> {
    image: &'a ImageHandle,
    vertices: &'a BufferHandle,
    triangles: &'a BufferHandle,
}

/// Splits a height field into a [`ChunkGrid`] of fixed-resolution meshes.
#[derive(Debug)]
pub struct ChunkedMeshSynthesizer {
    programs: ProgramProvider,
}

impl Default for ChunkedMeshSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedMeshSynthesizer {
    pub fn new() -> Self {
        Self {
            programs: ProgramProvider::new(MAP_PROGRAM),
        }
    }

    /// Generate one mesh per tile of the layout computed for `field`.
    ///
    /// # Arguments
    /// * `field` - Source heights
    /// * `resolution` - Vertices along one tile edge
    /// * `height_multiplier` - Vertical scale applied to sampled heights
    /// * `scaling` - Footprint scaling; larger values give fewer, larger chunks
    ///
    /// # Errors
    /// - [`crate::TerrainError::InvalidParameter`] if `scaling` is not finite and positive
    /// - [`crate::TerrainError::ResourceLoad`] if a kernel is missing (nothing is allocated)
    /// - [`crate::TerrainError::Allocation`] or [`crate::TerrainError::Readback`] from the device
    pub fn generate<D: ComputeDevice + ?Sized>(
        &mut self,
        device: &mut D,
        field: &HeightField,
        resolution: ChunkResolution,
        height_multiplier: f32,
        scaling: f32,
    ) -> Result<ChunkGrid> {
        let layout = ChunkLayout::compute(field.width(), field.height(), resolution, scaling)?;
        let kernels = ChunkKernels {
            vertices: self.programs.kernel(device, MAP_CHUNK_KERNEL)?,
            triangles: self.programs.kernel(device, TRIANGLE_SETUP_KERNEL)?,
        };

        let vertex_count = resolution.vertex_count();
        let image = upload_to_gpu_image(device, field)?;
        let vertices = match device.create_buffer(vertex_count, VERTEX_STRIDE) {
            Ok(buffer) => buffer,
            Err(err) => {
                device.release_image(image);
                return Err(err);
            }
        };
        let triangles =
            match device.create_buffer(vertex_count * INDICES_PER_VERTEX, INDEX_STRIDE) {
                Ok(buffer) => buffer,
                Err(err) => {
                    device.release_buffer(vertices);
                    device.release_image(image);
                    return Err(err);
                }
            };

        let result = build_grid(
            device,
            kernels,
            &layout,
            height_multiplier,
            &ChunkResources {
                image: &image,
                vertices: &vertices,
                triangles: &triangles,
            },
        );

        device.release_buffer(triangles);
        device.release_buffer(vertices);
        device.release_image(image);

        let grid = result?;
        debug!(
            "Generated {}x{} grid of {} chunks",
            grid.cols(),
            grid.rows(),
            resolution
        );
        Ok(grid)
    }
}

fn build_grid<D: ComputeDevice + ?Sized>(
    device: &mut D,
    kernels: ChunkKernels,
    layout: &ChunkLayout,
    height_multiplier: f32,
    resources: &ChunkResources<'_>,
) -> Result<ChunkGrid> {
    let d = layout.chunk_dimension;
    let vertex_count = d as usize * d as usize;
    let scale = layout.kernel_scale();
    let base_params = MapParams {
        width: d,
        height: d,
        height_multiplier,
        scale_x: scale.x,
        scale_y: scale.y,
        ..MapParams::default()
    };

    device.dispatch(
        kernels.triangles,
        &[
            Binding::uniforms(slots::PARAMS, bytemuck::bytes_of(&base_params)),
            Binding::buffer(slots::TRIANGLES, resources.triangles),
        ],
        (d, d),
    )?;
    let shared_triangles = decode_indices(
        &device.read_buffer(resources.triangles)?,
        vertex_count * INDICES_PER_VERTEX,
    )?;

    let mut meshes = Vec::with_capacity(layout.tile_count());
    let mut offsets = Vec::with_capacity(layout.tile_count());
    for (i, j) in layout.tiles() {
        let origin = layout.vertex_offset(i, j);
        let params = MapParams {
            offset_x: origin.x,
            offset_y: origin.y,
            ..base_params
        };

        device.dispatch(
            kernels.vertices,
            &[
                Binding::uniforms(slots::PARAMS, bytemuck::bytes_of(&params)),
                Binding::image(slots::IMAGE, resources.image),
                Binding::buffer(slots::STRUCTURED, resources.vertices),
            ],
            (d, d),
        )?;
        let positions = decode_positions(&device.read_buffer(resources.vertices)?, vertex_count)?;

        meshes.push(GeometryMesh::from_packed(&positions, shared_triangles.clone()));
        offsets.push(layout.placement(i, j));
    }

    ChunkGrid::new(layout.cols, layout.rows, d, meshes, offsets)
}
