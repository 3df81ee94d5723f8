//! GPU program names, binding layouts, and kernel resolution
//!
//! Each program is identified by a logical name and exposes named kernels.
//! The uniform parameter blocks below are the host side of the WGSL structs
//! in `shaders/`; their sizes are checked at compile time.

use bytemuck::{Pod, Zeroable};
use rustc_hash::FxHashMap;
use tracing::debug;

use super::device::{ComputeDevice, DeviceId, KernelHandle, ProgramHandle};
use crate::error::Result;

/// Noise synthesis program
pub const NOISE_PROGRAM: &str = "NoiseGenerator";
/// Single-layer noise kernel
pub const NOISE_KERNEL: &str = "NoiseGenerator";
/// Multi-layer compositing noise kernel
pub const LAYERED_NOISE_KERNEL: &str = "LayeredNoiseGenerator";

/// Mesh synthesis program
pub const MAP_PROGRAM: &str = "MapGenerator";
/// Full-field vertex and triangle kernel
pub const MAP_KERNEL: &str = "MapGenerator";
/// Per-tile vertex kernel
pub const MAP_CHUNK_KERNEL: &str = "MapGeneratorChunk";
/// Shared tile topology kernel
pub const TRIANGLE_SETUP_KERNEL: &str = "TriangleSetup";

/// Binding slots shared by both programs
pub mod slots {
    /// Uniform parameter block
    pub const PARAMS: u32 = 0;
    /// Output noise image or input height image
    pub const IMAGE: u32 = 1;
    /// Noise layer configs (noise program) or vertex results (map program)
    pub const STRUCTURED: u32 = 2;
    /// Triangle index results (map program)
    pub const TRIANGLES: u32 = 3;
}

/// Bytes per packed vertex (three `f32`)
pub const VERTEX_STRIDE: usize = 3 * std::mem::size_of::<f32>();
/// Bytes per triangle index
pub const INDEX_STRIDE: usize = std::mem::size_of::<u32>();
/// Indices written per vertex cell (two triangles)
pub const INDICES_PER_VERTEX: usize = 6;

/// Noise shader parameters (must match WGSL struct layout)
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct NoiseParams {
    pub width: u32,
    pub height: u32,
    pub scale_multiplier: f32,
    pub seed: u32,
    pub offset_x: i32,
    pub offset_y: i32,
    pub noise_type: u32,
    pub warping: u32,
    pub config_count: u32,
    pub _padding: [u32; 3],
}

/// Map shader parameters (must match WGSL struct layout)
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MapParams {
    pub width: u32,
    pub height: u32,
    pub height_multiplier: f32,
    pub _padding: u32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

// Uniform blocks are sized in 16-byte steps
const _: () = assert!(std::mem::size_of::<NoiseParams>() == 48);
const _: () = assert!(std::mem::size_of::<MapParams>() == 32);

/// Resolves one program and its kernels on first use and caches the handles.
///
/// A provider is owned by the component that dispatches the program, so
/// resolution happens once per component instead of through hidden globals.
/// Cached handles belong to the device that issued them; passing a different
/// device drops the cache and resolves again on that device.
#[derive(Debug)]
pub struct ProgramProvider {
    program_name: &'static str,
    device: Option<DeviceId>,
    program: Option<ProgramHandle>,
    kernels: FxHashMap<&'static str, KernelHandle>,
}

impl ProgramProvider {
    /// Provider for the program with the given logical name.
    pub fn new(program_name: &'static str) -> Self {
        Self {
            program_name,
            device: None,
            program: None,
            kernels: FxHashMap::default(),
        }
    }

    /// Logical program name
    pub fn program_name(&self) -> &'static str {
        self.program_name
    }

    /// Resolve (or return the cached) kernel with the given name.
    ///
    /// # Errors
    /// Returns [`crate::TerrainError::ResourceLoad`] if the program or kernel cannot be found
    pub fn kernel<D: ComputeDevice + ?Sized>(
        &mut self,
        device: &mut D,
        name: &'static str,
    ) -> Result<KernelHandle> {
        let device_id = device.device_id();
        if self.device != Some(device_id) {
            if self.device.is_some() {
                debug!("Device changed, re-resolving program '{}'", self.program_name);
            }
            self.device = Some(device_id);
            self.program = None;
            self.kernels.clear();
        }

        if let Some(kernel) = self.kernels.get(name) {
            return Ok(*kernel);
        }

        let program = match self.program {
            Some(program) => program,
            None => {
                let program = device.load_program(self.program_name)?;
                debug!("Loaded GPU program '{}'", self.program_name);
                self.program = Some(program);
                program
            }
        };

        let kernel = device.find_kernel(program, name)?;
        debug!("Resolved kernel '{}' in '{}'", name, self.program_name);
        self.kernels.insert(name, kernel);
        Ok(kernel)
    }

    /// Whether the program has been loaded on `device`
    pub fn is_loaded_on<D: ComputeDevice + ?Sized>(&self, device: &D) -> bool {
        self.program.is_some() && self.device == Some(device.device_id())
    }
}
