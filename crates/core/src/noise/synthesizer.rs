//! GPU noise field synthesis

use tracing::debug;

use super::config::{NoiseLayerConfig, NoiseLayerStack};
use super::packed::{encode_layers, NOISE_LAYER_STRIDE};
use crate::core_types::HeightField;
use crate::error::Result;
use crate::gpu::programs::{slots, NoiseParams, LAYERED_NOISE_KERNEL, NOISE_KERNEL, NOISE_PROGRAM};
use crate::gpu::{
    allocate_gpu_image, read_back_and_release, Binding, ComputeDevice, ProgramProvider,
};

/// Evaluates noise layers on the GPU and reads the composite back as a
/// [`HeightField`].
///
/// The noise program is resolved on first use and reused by later calls.
#[derive(Debug)]
pub struct NoiseFieldSynthesizer {
    programs: ProgramProvider,
}

impl Default for NoiseFieldSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl NoiseFieldSynthesizer {
    pub fn new() -> Self {
        Self {
            programs: ProgramProvider::new(NOISE_PROGRAM),
        }
    }

    /// Generate a field from a single layer. The layer weight is ignored.
    ///
    /// # Errors
    /// - [`crate::TerrainError::ResourceLoad`] if the noise program is missing (nothing is allocated)
    /// - [`crate::TerrainError::Allocation`] on zero dimensions or exhausted device memory
    pub fn generate<D: ComputeDevice + ?Sized>(
        &mut self,
        device: &mut D,
        width: u32,
        height: u32,
        layer: &NoiseLayerConfig,
    ) -> Result<HeightField> {
        let kernel = self.programs.kernel(device, NOISE_KERNEL)?;
        let (image, mut field) = allocate_gpu_image(device, width, height)?;

        let params = NoiseParams {
            width,
            height,
            scale_multiplier: layer.scale_multiplier,
            seed: layer.seed,
            offset_x: layer.offset.x,
            offset_y: layer.offset.y,
            noise_type: layer.noise_type.wire_value(),
            warping: u32::from(layer.warp),
            ..NoiseParams::default()
        };

        let dispatched = device.dispatch(
            kernel,
            &[
                Binding::uniforms(slots::PARAMS, bytemuck::bytes_of(&params)),
                Binding::storage_image(slots::IMAGE, &image),
            ],
            (width, height),
        );
        if let Err(err) = dispatched {
            device.release_image(image);
            return Err(err);
        }

        read_back_and_release(device, image, &mut field)?;
        debug!(
            "Generated {}x{} {:?} noise field (seed {})",
            width, height, layer.noise_type, layer.seed
        );
        Ok(field)
    }

    /// Generate a field as the weighted sum of every layer in `layers`.
    ///
    /// An empty stack yields an all-zero field.
    ///
    /// # Errors
    /// - [`crate::TerrainError::ResourceLoad`] if the noise program is missing (nothing is allocated)
    /// - [`crate::TerrainError::Allocation`] on zero dimensions or exhausted device memory
    pub fn generate_layered<D: ComputeDevice + ?Sized>(
        &mut self,
        device: &mut D,
        width: u32,
        height: u32,
        layers: &NoiseLayerStack,
    ) -> Result<HeightField> {
        let kernel = self.programs.kernel(device, LAYERED_NOISE_KERNEL)?;

        // Buffers cannot be empty; a zeroed record is never read with a count of 0
        let packed = if layers.is_empty() {
            vec![0_u8; NOISE_LAYER_STRIDE]
        } else {
            encode_layers(layers.layers())
        };
        let record_count = packed.len() / NOISE_LAYER_STRIDE;

        let (image, mut field) = allocate_gpu_image(device, width, height)?;
        let configs = match device.create_buffer(record_count, NOISE_LAYER_STRIDE) {
            Ok(buffer) => buffer,
            Err(err) => {
                device.release_image(image);
                return Err(err);
            }
        };

        let params = NoiseParams {
            width,
            height,
            config_count: layers.len() as u32,
            ..NoiseParams::default()
        };

        let dispatched = device.write_buffer(&configs, &packed).and_then(|()| {
            device.dispatch(
                kernel,
                &[
                    Binding::uniforms(slots::PARAMS, bytemuck::bytes_of(&params)),
                    Binding::storage_image(slots::IMAGE, &image),
                    Binding::buffer(slots::STRUCTURED, &configs),
                ],
                (width, height),
            )
        });
        device.release_buffer(configs);
        if let Err(err) = dispatched {
            device.release_image(image);
            return Err(err);
        }

        read_back_and_release(device, image, &mut field)?;
        debug!(
            "Generated {}x{} layered noise field from {} layers",
            width,
            height,
            layers.len()
        );
        Ok(field)
    }
}
