//! wgpu implementation of [`ComputeDevice`]
//!
//! Programs are WGSL sources embedded in the crate. Kernels are compute
//! pipelines with automatically derived bind group layouts, so each dispatch
//! must bind exactly the slots its entry point uses. Validation and
//! out-of-memory errors are captured with error scopes and converted into
//! [`TerrainError`] values instead of reaching wgpu's default panic handler.

use std::borrow::Cow;
use std::sync::mpsc;

use rustc_hash::FxHashMap;
use tracing::{debug, trace};
use wgpu::util::DeviceExt;

use super::context::{create_gpu_context_blocking, GpuContext};
use super::device::{
    Binding, BindingResource, BufferHandle, ComputeDevice, DeviceId, ImageHandle, KernelHandle,
    ProgramHandle, ResourceId,
};
use super::programs::{MAP_PROGRAM, NOISE_PROGRAM};
use crate::core_types::height_field::BYTES_PER_PIXEL;
use crate::core_types::HeightField;
use crate::error::{Result, TerrainError};

/// Must match `@workgroup_size` in the WGSL kernels
const WORKGROUP_SIZE: u32 = 8;

/// Image format shared by noise output and mesh input
const IMAGE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

fn program_source(name: &str) -> Option<&'static str> {
    match name {
        NOISE_PROGRAM => Some(include_str!("shaders/noise_generator.wgsl")),
        MAP_PROGRAM => Some(include_str!("shaders/map_generator.wgsl")),
        _ => None,
    }
}

struct Program {
    name: String,
    source: &'static str,
    module: wgpu::ShaderModule,
    kernels: Vec<wgpu::ComputePipeline>,
    kernel_names: FxHashMap<String, u32>,
}

struct GpuImage {
    texture: wgpu::Texture,
    width: u32,
    height: u32,
}

struct GpuBuffer {
    buffer: wgpu::Buffer,
    /// Requested size; the allocation is rounded up to the copy alignment
    len: usize,
}

/// Run `op` inside validation and out-of-memory error scopes.
fn capture_errors<T>(
    device: &wgpu::Device,
    op: impl FnOnce(&wgpu::Device) -> T,
) -> (T, Option<wgpu::Error>) {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = op(device);
    let validation = pollster::block_on(device.pop_error_scope());
    let out_of_memory = pollster::block_on(device.pop_error_scope());
    (value, validation.or(out_of_memory))
}

fn align_copy(size: u64) -> u64 {
    size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT)
}

/// Compute device backed by a wgpu adapter.
pub struct WgpuDevice {
    id: DeviceId,
    context: GpuContext,
    programs: Vec<Program>,
    program_names: FxHashMap<String, u64>,
    images: FxHashMap<u64, GpuImage>,
    buffers: FxHashMap<u64, GpuBuffer>,
    active_target: Option<ResourceId>,
    next_resource: u64,
}

impl WgpuDevice {
    /// Wrap an initialized GPU context.
    pub fn new(context: GpuContext) -> Self {
        Self {
            id: DeviceId::unique(),
            context,
            programs: Vec::new(),
            program_names: FxHashMap::default(),
            images: FxHashMap::default(),
            buffers: FxHashMap::default(),
            active_target: None,
            next_resource: 1,
        }
    }

    /// Create a context on the default adapter and wrap it.
    ///
    /// # Errors
    /// Returns [`TerrainError::DeviceUnavailable`] if no adapter or device can be created
    pub fn create_blocking() -> Result<Self> {
        create_gpu_context_blocking().map(Self::new)
    }

    /// Underlying GPU context
    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    /// Images allocated and not yet released
    pub fn live_images(&self) -> usize {
        self.images.len()
    }

    /// Buffers allocated and not yet released
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_resource;
        self.next_resource += 1;
        id
    }

    fn active_image(&self) -> Option<&GpuImage> {
        self.active_target.and_then(|target| self.images.get(&target.raw()))
    }

    /// Block until the staging buffer is mapped and copy its contents out.
    fn map_staging(&self, staging: &wgpu::Buffer) -> Result<Vec<u8>> {
        let slice = staging.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            sender.send(result).ok();
        });

        self.context.device().poll(wgpu::Maintain::Wait);

        receiver
            .recv()
            .map_err(|e| TerrainError::Readback(format!("map callback dropped: {e}")))?
            .map_err(|e| TerrainError::Readback(format!("failed to map staging buffer: {e}")))?;

        let data = slice.get_mapped_range().to_vec();
        staging.unmap();
        Ok(data)
    }

    fn create_staging(&self, label: &str, size: u64) -> wgpu::Buffer {
        self.context
            .device()
            .create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
    }
}

impl ComputeDevice for WgpuDevice {
    fn device_id(&self) -> DeviceId {
        self.id
    }

    fn load_program(&mut self, name: &str) -> Result<ProgramHandle> {
        if let Some(&index) = self.program_names.get(name) {
            return Ok(ProgramHandle::from_raw(index));
        }

        let source = program_source(name)
            .ok_or_else(|| TerrainError::ResourceLoad(format!("unknown GPU program '{name}'")))?;

        let (module, error) = capture_errors(self.context.device(), |device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(name),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        });
        if let Some(error) = error {
            return Err(TerrainError::ResourceLoad(format!(
                "GPU program '{name}' failed to compile: {error}"
            )));
        }

        let index = self.programs.len() as u64;
        self.programs.push(Program {
            name: name.to_string(),
            source,
            module,
            kernels: Vec::new(),
            kernel_names: FxHashMap::default(),
        });
        self.program_names.insert(name.to_string(), index);
        debug!("Compiled GPU program '{}'", name);

        Ok(ProgramHandle::from_raw(index))
    }

    fn find_kernel(&mut self, program: ProgramHandle, name: &str) -> Result<KernelHandle> {
        let device = self.context.device();
        let entry = self
            .programs
            .get_mut(program.raw() as usize)
            .ok_or_else(|| {
                TerrainError::ResourceLoad(format!("program {} is not loaded", program.raw()))
            })?;

        if let Some(&index) = entry.kernel_names.get(name) {
            return Ok(KernelHandle::new(program, index));
        }

        if !entry.source.contains(&format!("fn {name}(")) {
            return Err(TerrainError::ResourceLoad(format!(
                "kernel '{name}' not found in GPU program '{}'",
                entry.name
            )));
        }

        let module = &entry.module;
        let (pipeline, error) = capture_errors(device, |device| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(name),
                layout: None,
                module,
                entry_point: Some(name),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            })
        });
        if let Some(error) = error {
            return Err(TerrainError::ResourceLoad(format!(
                "kernel '{name}' in '{}' failed to build: {error}",
                entry.name
            )));
        }

        let index = entry.kernels.len() as u32;
        entry.kernels.push(pipeline);
        entry.kernel_names.insert(name.to_string(), index);
        Ok(KernelHandle::new(program, index))
    }

    fn create_image(&mut self, width: u32, height: u32) -> Result<ImageHandle> {
        if width == 0 || height == 0 {
            return Err(TerrainError::Allocation(format!(
                "image dimensions must be positive, got {width}x{height}"
            )));
        }
        if !self.context.supports_image(width, height) {
            return Err(TerrainError::Allocation(format!(
                "{width}x{height} image exceeds the device texture limit"
            )));
        }

        let (texture, error) = capture_errors(self.context.device(), |device| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some("Height Field Image"),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: IMAGE_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::STORAGE_BINDING
                    | wgpu::TextureUsages::COPY_SRC
                    | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            })
        });
        if let Some(error) = error {
            return Err(TerrainError::Allocation(format!(
                "failed to allocate {width}x{height} image: {error}"
            )));
        }

        let id = self.next_id();
        self.images.insert(
            id,
            GpuImage {
                texture,
                width,
                height,
            },
        );
        trace!("Created image {} ({}x{})", id, width, height);
        Ok(ImageHandle::from_raw(id))
    }

    fn release_image(&mut self, image: ImageHandle) {
        let id = image.id();
        // Dropping defers destruction until submitted work using it has completed
        if self.images.remove(&id.raw()).is_some() {
            trace!("Released image {}", id.raw());
        }
        if self.active_target == Some(id) {
            self.active_target = None;
        }
    }

    fn create_buffer(&mut self, count: usize, stride: usize) -> Result<BufferHandle> {
        let len = count
            .checked_mul(stride)
            .filter(|&len| len > 0)
            .ok_or_else(|| {
                TerrainError::Allocation(format!(
                    "invalid buffer size: {count} elements of {stride} bytes"
                ))
            })?;
        let size = align_copy(len as u64);
        if !self.context.supports_storage_buffer(size) {
            return Err(TerrainError::Allocation(format!(
                "{size}-byte buffer exceeds the device storage buffer limit"
            )));
        }

        let (buffer, error) = capture_errors(self.context.device(), |device| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Structured Buffer"),
                size,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });
        if let Some(error) = error {
            return Err(TerrainError::Allocation(format!(
                "failed to allocate {size}-byte buffer: {error}"
            )));
        }

        let id = self.next_id();
        self.buffers.insert(id, GpuBuffer { buffer, len });
        trace!("Created buffer {} ({} x {} bytes)", id, count, stride);
        Ok(BufferHandle::from_raw(id))
    }

    fn write_buffer(&mut self, buffer: &BufferHandle, data: &[u8]) -> Result<()> {
        let target = self.buffers.get(&buffer.id().raw()).ok_or_else(|| {
            TerrainError::Dispatch(format!("buffer {} is not allocated", buffer.id().raw()))
        })?;
        if data.len() > target.len {
            return Err(TerrainError::Dispatch(format!(
                "{} bytes do not fit a {}-byte buffer",
                data.len(),
                target.len
            )));
        }

        let aligned = align_copy(data.len() as u64) as usize;
        let bytes: Cow<'_, [u8]> = if aligned == data.len() {
            Cow::Borrowed(data)
        } else {
            let mut padded = data.to_vec();
            padded.resize(aligned, 0);
            Cow::Owned(padded)
        };
        self.context
            .queue()
            .write_buffer(&target.buffer, 0, bytes.as_ref());
        Ok(())
    }

    fn read_buffer(&mut self, buffer: &BufferHandle) -> Result<Vec<u8>> {
        let source = self.buffers.get(&buffer.id().raw()).ok_or_else(|| {
            TerrainError::Readback(format!("buffer {} is not allocated", buffer.id().raw()))
        })?;
        let size = source.buffer.size();
        let staging = self.create_staging("Structured Buffer Readback", size);

        let mut encoder =
            self.context
                .device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Buffer Readback Encoder"),
                });
        encoder.copy_buffer_to_buffer(&source.buffer, 0, &staging, 0, size);
        self.context.queue().submit(Some(encoder.finish()));

        let mut data = self.map_staging(&staging)?;
        data.truncate(source.len);
        Ok(data)
    }

    fn release_buffer(&mut self, buffer: BufferHandle) {
        if self.buffers.remove(&buffer.id().raw()).is_some() {
            trace!("Released buffer {}", buffer.id().raw());
        }
    }

    fn active_render_target(&self) -> Option<ResourceId> {
        self.active_target
    }

    fn set_active_render_target(&mut self, target: Option<ResourceId>) {
        self.active_target = target;
    }

    fn blit_to_active(&mut self, source: &HeightField) -> Result<()> {
        let image = self.active_image().ok_or_else(|| {
            TerrainError::Dispatch("no active render target to copy into".to_string())
        })?;
        if (image.width, image.height) != (source.width(), source.height()) {
            return Err(TerrainError::Dispatch(format!(
                "cannot copy {}x{} field into {}x{} image",
                source.width(),
                source.height(),
                image.width,
                image.height
            )));
        }

        self.context.queue().write_texture(
            wgpu::ImageCopyTexture {
                texture: &image.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            source.as_bytes(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(BYTES_PER_PIXEL as u32 * image.width),
                rows_per_image: Some(image.height),
            },
            wgpu::Extent3d {
                width: image.width,
                height: image.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn read_active_pixels(&mut self, destination: &mut HeightField) -> Result<()> {
        let image = self.active_image().ok_or_else(|| {
            TerrainError::Readback("no active render target to read from".to_string())
        })?;
        let (width, height) = (image.width, image.height);
        if (width, height) != (destination.width(), destination.height()) {
            return Err(TerrainError::Readback(format!(
                "cannot read {width}x{height} image into {}x{} field",
                destination.width(),
                destination.height()
            )));
        }

        // Texture copies need rows padded to 256 bytes
        let tight_bpr = BYTES_PER_PIXEL * width as usize;
        let padded_bpr = (tight_bpr as u64).next_multiple_of(u64::from(
            wgpu::COPY_BYTES_PER_ROW_ALIGNMENT,
        )) as usize;
        let staging =
            self.create_staging("Image Readback", (padded_bpr * height as usize) as u64);

        let mut encoder =
            self.context
                .device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Image Readback Encoder"),
                });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &image.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bpr as u32),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.context.queue().submit(Some(encoder.finish()));

        let data = self.map_staging(&staging)?;

        let pixels = destination.as_bytes_mut();
        for row in 0..height as usize {
            let src = row * padded_bpr;
            let dst = row * tight_bpr;
            pixels[dst..dst + tight_bpr].copy_from_slice(&data[src..src + tight_bpr]);
        }
        Ok(())
    }

    fn dispatch(
        &mut self,
        kernel: KernelHandle,
        bindings: &[Binding<'_>],
        grid: (u32, u32),
    ) -> Result<()> {
        let device = self.context.device();
        let program = self
            .programs
            .get(kernel.program().raw() as usize)
            .ok_or_else(|| TerrainError::Dispatch("kernel program is not loaded".to_string()))?;
        let pipeline = program
            .kernels
            .get(kernel.index() as usize)
            .ok_or_else(|| TerrainError::Dispatch("kernel is not resolved".to_string()))?;

        // Own the per-dispatch uniform buffers and views before borrowing them
        let mut uniforms = Vec::new();
        let mut views = Vec::new();
        for binding in bindings {
            match binding.resource {
                BindingResource::Uniforms(bytes) => {
                    let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("Kernel Params"),
                        contents: bytes,
                        usage: wgpu::BufferUsages::UNIFORM,
                    });
                    uniforms.push((binding.slot, buffer));
                }
                BindingResource::Image(id) | BindingResource::StorageImage(id) => {
                    let image = self.images.get(&id.raw()).ok_or_else(|| {
                        TerrainError::Dispatch(format!("image {} is not allocated", id.raw()))
                    })?;
                    views.push((
                        binding.slot,
                        image
                            .texture
                            .create_view(&wgpu::TextureViewDescriptor::default()),
                    ));
                }
                BindingResource::Buffer(_) => {}
            }
        }

        let mut entries = Vec::with_capacity(bindings.len());
        for binding in bindings {
            let resource = match binding.resource {
                BindingResource::Uniforms(_) => uniforms
                    .iter()
                    .find(|(slot, _)| *slot == binding.slot)
                    .map(|(_, buffer)| buffer.as_entire_binding()),
                BindingResource::Image(_) | BindingResource::StorageImage(_) => views
                    .iter()
                    .find(|(slot, _)| *slot == binding.slot)
                    .map(|(_, view)| wgpu::BindingResource::TextureView(view)),
                BindingResource::Buffer(id) => self
                    .buffers
                    .get(&id.raw())
                    .map(|buffer| buffer.buffer.as_entire_binding()),
            }
            .ok_or_else(|| {
                TerrainError::Dispatch(format!("slot {} has no bound resource", binding.slot))
            })?;
            entries.push(wgpu::BindGroupEntry {
                binding: binding.slot,
                resource,
            });
        }

        let workgroups = (
            grid.0.div_ceil(WORKGROUP_SIZE),
            grid.1.div_ceil(WORKGROUP_SIZE),
        );

        let ((), error) = capture_errors(device, |device| {
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Kernel Bind Group"),
                layout: &pipeline.get_bind_group_layout(0),
                entries: &entries,
            });

            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Kernel Dispatch Encoder"),
            });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("Kernel Dispatch Pass"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.dispatch_workgroups(workgroups.0, workgroups.1, 1);
            }
            self.context.queue().submit(Some(encoder.finish()));
        });
        if let Some(error) = error {
            return Err(TerrainError::Dispatch(format!(
                "kernel {} of '{}' rejected: {error}",
                kernel.index(),
                program.name
            )));
        }

        trace!(
            "Dispatched kernel {} of '{}' over {}x{} ({:?} workgroups)",
            kernel.index(),
            program.name,
            grid.0,
            grid.1,
            workgroups
        );
        Ok(())
    }
}
