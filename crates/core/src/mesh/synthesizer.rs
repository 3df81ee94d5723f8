//! Single-dispatch mesh generation

use tracing::{debug, warn};

use super::{decode_indices, decode_positions};
use crate::core_types::{GeometryMesh, HeightField};
use crate::error::{Advisory, Generated, Result};
use crate::gpu::programs::{
    slots, MapParams, INDEX_STRIDE, INDICES_PER_VERTEX, MAP_KERNEL, MAP_PROGRAM, VERTEX_STRIDE,
};
use crate::gpu::{
    upload_to_gpu_image, Binding, BufferHandle, ComputeDevice, ImageHandle, KernelHandle,
    ProgramProvider,
};

/// Vertex count above which single-dispatch meshes raise an advisory.
///
/// Some back ends cap index width at 16 bits; chunked generation stays below it.
pub const MESH_SIZE_THRESHOLD: usize = 65536;

/// Builds one mesh covering a whole height field.
///
/// Vertex `(x, y)` is placed at `(x, height(x, y) * height_multiplier, y)`
/// and every vertex with a right and a lower neighbour owns the two
/// triangles of its quad.
#[derive(Debug)]
pub struct MeshSynthesizer {
    programs: ProgramProvider,
}

impl Default for MeshSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl MeshSynthesizer {
    pub fn new() -> Self {
        Self {
            programs: ProgramProvider::new(MAP_PROGRAM),
        }
    }

    /// Generate a mesh with `width * height` vertices and `width * height * 6` indices.
    ///
    /// Fields above [`MESH_SIZE_THRESHOLD`] still produce a mesh, with an
    /// [`Advisory::VertexCountExceedsThreshold`] attached.
    ///
    /// # Errors
    /// - [`crate::TerrainError::ResourceLoad`] if the map program is missing (nothing is allocated)
    /// - [`crate::TerrainError::Allocation`] if the image or buffers cannot be allocated
    /// - [`crate::TerrainError::Readback`] if the results cannot be read
    pub fn generate<D: ComputeDevice + ?Sized>(
        &mut self,
        device: &mut D,
        field: &HeightField,
        height_multiplier: f32,
    ) -> Result<Generated<GeometryMesh>> {
        let kernel = self.programs.kernel(device, MAP_KERNEL)?;

        let vertex_count = field.pixel_count();
        let mut advisories = Vec::new();
        if vertex_count > MESH_SIZE_THRESHOLD {
            let advisory = Advisory::VertexCountExceedsThreshold {
                vertex_count,
                threshold: MESH_SIZE_THRESHOLD,
            };
            warn!("{}", advisory);
            advisories.push(advisory);
        }

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

        let result = build_mesh(
            device,
            kernel,
            field,
            height_multiplier,
            &image,
            &vertices,
            &triangles,
        );

        device.release_buffer(triangles);
        device.release_buffer(vertices);
        device.release_image(image);

        let mesh = result?;
        debug!(
            "Generated mesh with {} vertices and {} triangles",
            mesh.vertex_count(),
            mesh.triangle_count()
        );
        Ok(Generated {
            value: mesh,
            advisories,
        })
    }
}

fn build_mesh<D: ComputeDevice + ?Sized>(
    device: &mut D,
    kernel: KernelHandle,
    field: &HeightField,
    height_multiplier: f32,
    image: &ImageHandle,
    vertices: &BufferHandle,
    triangles: &BufferHandle,
) -> Result<GeometryMesh> {
    let (width, height) = (field.width(), field.height());
    let vertex_count = field.pixel_count();
    let params = MapParams {
        width,
        height,
        height_multiplier,
        scale_x: 1.0,
        scale_y: 1.0,
        ..MapParams::default()
    };

    device.dispatch(
        kernel,
        &[
            Binding::uniforms(slots::PARAMS, bytemuck::bytes_of(&params)),
            Binding::image(slots::IMAGE, image),
            Binding::buffer(slots::STRUCTURED, vertices),
            Binding::buffer(slots::TRIANGLES, triangles),
        ],
        (width, height),
    )?;

    let positions = decode_positions(&device.read_buffer(vertices)?, vertex_count)?;
    let indices = decode_indices(
        &device.read_buffer(triangles)?,
        vertex_count * INDICES_PER_VERTEX,
    )?;
    Ok(GeometryMesh::from_packed(&positions, indices))
}
