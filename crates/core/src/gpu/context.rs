//! GPU Context Management
//!
//! Provides wgpu device initialization and capacity checks for the terrain
//! generation compute programs.

use crate::error::{Result, TerrainError};

/// GPU context for terrain generation compute operations
///
/// Manages the wgpu device and queue plus the adapter description used for
/// logging.
pub struct GpuContext {
    /// wgpu device for GPU operations
    device: wgpu::Device,
    /// Command queue for submitting GPU work
    queue: wgpu::Queue,
    /// Adapter information for diagnostics
    adapter_info: wgpu::AdapterInfo,
}

impl GpuContext {
    /// Create a new GPU context with default settings
    ///
    /// Automatically selects the best available GPU adapter.
    ///
    /// # Errors
    /// Returns [`TerrainError::DeviceUnavailable`] if no compatible adapter or device can be created
    pub async fn new() -> Result<Self> {
        Self::with_power_preference(wgpu::PowerPreference::HighPerformance).await
    }

    /// Create a new GPU context with specific power preference
    ///
    /// # Arguments
    /// * `power_preference` - GPU selection preference (`LowPower`, `HighPerformance`, or default)
    ///
    /// # Errors
    /// Returns [`TerrainError::DeviceUnavailable`] if no compatible adapter or device can be created
    pub async fn with_power_preference(power_preference: wgpu::PowerPreference) -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| {
                TerrainError::DeviceUnavailable("no compatible GPU adapter".to_string())
            })?;

        let adapter_info = adapter.get_info();
        tracing::info!(
            "GPU adapter selected: {} ({:?})",
            adapter_info.name,
            adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Terrain Generation GPU Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None, // No trace path
            )
            .await
            .map_err(|e| {
                TerrainError::DeviceUnavailable(format!("failed to create GPU device: {e}"))
            })?;

        Ok(Self {
            device,
            queue,
            adapter_info,
        })
    }

    /// Get reference to the wgpu device
    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Get reference to the command queue
    #[must_use]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Get adapter information
    #[must_use]
    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    /// Check whether an image of the given size fits the device limits
    #[must_use]
    pub fn supports_image(&self, width: u32, height: u32) -> bool {
        let max = self.device.limits().max_texture_dimension_2d;
        width <= max && height <= max
    }

    /// Check whether a storage buffer of `size` bytes can be allocated and bound
    #[must_use]
    pub fn supports_storage_buffer(&self, size: u64) -> bool {
        let limits = self.device.limits();
        size <= limits.max_buffer_size && size <= u64::from(limits.max_storage_buffer_binding_size)
    }
}

/// Blocking wrapper for creating GPU context
///
/// Uses pollster to block on async GPU initialization.
/// Suitable for non-async contexts like CLIs or tests.
///
/// # Errors
/// Returns error if GPU context creation fails
pub fn create_gpu_context_blocking() -> Result<GpuContext> {
    pollster::block_on(GpuContext::new())
}
