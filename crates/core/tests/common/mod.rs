//! Shared test support: an instrumented in-memory compute device.
//!
//! `TrackingDevice` implements `ComputeDevice` on the CPU. It emulates the
//! kernels closely enough to check data flow (noise values, mesh vertices and
//! triangles) and records every allocation, release, resolution and dispatch
//! so tests can assert on resource lifecycle.

#![allow(dead_code)]

use std::collections::HashMap;

use terrain_gen_core::gpu::programs::{
    slots, MapParams, NoiseParams, LAYERED_NOISE_KERNEL, MAP_CHUNK_KERNEL, MAP_KERNEL,
    MAP_PROGRAM, NOISE_KERNEL, NOISE_PROGRAM, TRIANGLE_SETUP_KERNEL,
};
use terrain_gen_core::gpu::{
    Binding, BindingResource, BufferHandle, ComputeDevice, DeviceId, ImageHandle, KernelHandle,
    ProgramHandle, ResourceId,
};
use terrain_gen_core::noise::decode_layers;
use terrain_gen_core::{HeightField, Result, TerrainError};

#[ctor::ctor]
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Contribution of one full-weight layer in the emulated layered kernel
pub const FAKE_LAYER_VALUE: f32 = 0.25;

static PROGRAMS: [(&str, &[&str]); 2] = [
    (NOISE_PROGRAM, &[NOISE_KERNEL, LAYERED_NOISE_KERNEL]),
    (
        MAP_PROGRAM,
        &[MAP_KERNEL, MAP_CHUNK_KERNEL, TRIANGLE_SETUP_KERNEL],
    ),
];

/// Failures to inject into the next calls
#[derive(Debug, Default, Clone)]
pub struct Failures {
    /// `load_program` fails for this program
    pub missing_program: Option<&'static str>,
    /// `find_kernel` fails for this kernel
    pub missing_kernel: Option<&'static str>,
    /// Every `create_image` fails
    pub image_allocation: bool,
    /// The n-th (zero-based) `create_buffer` call fails
    pub buffer_allocation_at: Option<usize>,
    /// Dispatches of this kernel fail
    pub dispatch_of: Option<&'static str>,
    /// The n-th (zero-based) `read_buffer` call fails
    pub read_buffer_at: Option<usize>,
    /// `blit_to_active` fails
    pub blit: bool,
    /// `read_active_pixels` fails
    pub read_pixels: bool,
}

/// One recorded dispatch
#[derive(Debug, Clone)]
pub struct DispatchRecord {
    pub kernel: &'static str,
    pub grid: (u32, u32),
    pub uniforms: Vec<u8>,
    pub slots: Vec<u32>,
    /// Active render target when the dispatch was issued
    pub active_target: Option<ResourceId>,
}

impl DispatchRecord {
    pub fn map_params(&self) -> MapParams {
        bytemuck::pod_read_unaligned(&self.uniforms)
    }

    pub fn noise_params(&self) -> NoiseParams {
        bytemuck::pod_read_unaligned(&self.uniforms)
    }
}

struct FakeImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl FakeImage {
    fn texel(&self, x: i32, y: i32) -> f32 {
        let x = x.clamp(0, self.width as i32 - 1) as usize;
        let y = y.clamp(0, self.height as i32 - 1) as usize;
        f32::from(self.pixels[(y * self.width as usize + x) * 4]) / 255.0
    }

    fn sample(&self, px: f32, py: f32) -> f32 {
        let (bx, by) = (px.floor(), py.floor());
        let (fx, fy) = (px - bx, py - by);
        let (cx, cy) = (bx as i32, by as i32);
        let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
        let top = lerp(self.texel(cx, cy), self.texel(cx + 1, cy), fx);
        let bottom = lerp(self.texel(cx, cy + 1), self.texel(cx + 1, cy + 1), fx);
        lerp(top, bottom, fy)
    }

    fn fill(&mut self, value: f32) {
        let level = (value.clamp(0.0, 1.0) * 255.0).round() as u8;
        for pixel in self.pixels.chunks_exact_mut(4) {
            pixel.copy_from_slice(&[level, level, level, 255]);
        }
    }
}

fn put_f32(buffer: &mut [u8], index: usize, value: f32) {
    buffer[index * 4..index * 4 + 4].copy_from_slice(&value.to_ne_bytes());
}

fn put_u32(buffer: &mut [u8], index: usize, value: u32) {
    buffer[index * 4..index * 4 + 4].copy_from_slice(&value.to_ne_bytes());
}

fn write_quad(triangles: &mut [u8], x: u32, y: u32, width: u32, height: u32) {
    let v = y * width + x;
    let base = v as usize * 6;
    let quad = if x + 1 < width && y + 1 < height {
        [v, v + width, v + 1, v + 1, v + width, v + width + 1]
    } else {
        [0; 6]
    };
    for (k, index) in quad.into_iter().enumerate() {
        put_u32(triangles, base + k, index);
    }
}

/// In-memory `ComputeDevice` that records everything it is asked to do.
pub struct TrackingDevice {
    pub failures: Failures,
    id: DeviceId,
    next_id: u64,
    programs: Vec<&'static str>,
    images: HashMap<u64, FakeImage>,
    buffers: HashMap<u64, Vec<u8>>,
    active: Option<ResourceId>,

    /// `load_program` calls per program name
    pub program_loads: HashMap<String, usize>,
    /// `find_kernel` calls per kernel name
    pub kernel_lookups: HashMap<String, usize>,
    pub images_created: usize,
    pub buffers_created: Vec<(usize, usize)>,
    pub released: Vec<ResourceId>,
    /// Releases of ids that are not live
    pub double_releases: usize,
    /// Every `write_buffer` payload in order
    pub uploads: Vec<Vec<u8>>,
    pub buffer_reads: usize,
    pub dispatches: Vec<DispatchRecord>,
}

impl TrackingDevice {
    pub fn new() -> Self {
        Self {
            failures: Failures::default(),
            id: DeviceId::unique(),
            next_id: 1,
            programs: Vec::new(),
            images: HashMap::new(),
            buffers: HashMap::new(),
            active: None,
            program_loads: HashMap::new(),
            kernel_lookups: HashMap::new(),
            images_created: 0,
            buffers_created: Vec::new(),
            released: Vec::new(),
            double_releases: 0,
            uploads: Vec::new(),
            buffer_reads: 0,
            dispatches: Vec::new(),
        }
    }

    pub fn failing(failures: Failures) -> Self {
        Self {
            failures,
            ..Self::new()
        }
    }

    pub fn live_images(&self) -> usize {
        self.images.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Nothing allocated is still alive and nothing was released twice
    pub fn assert_clean(&self) {
        assert_eq!(self.live_images(), 0, "leaked images");
        assert_eq!(self.live_buffers(), 0, "leaked buffers");
        assert_eq!(self.double_releases, 0, "resources released twice");
        assert_eq!(
            self.released.len(),
            self.images_created + self.buffers_created.len(),
            "every allocation released exactly once"
        );
    }

    pub fn dispatches_of(&self, kernel: &str) -> Vec<&DispatchRecord> {
        self.dispatches.iter().filter(|d| d.kernel == kernel).collect()
    }

    pub fn total_allocations(&self) -> usize {
        self.images_created + self.buffers_created.len()
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id.max(1);
        self.next_id = id + 1;
        id
    }

    fn kernel_name(&self, kernel: KernelHandle) -> Option<&'static str> {
        let program = self.programs.get(kernel.program().raw() as usize)?;
        let (_, kernels) = PROGRAMS.iter().find(|(name, _)| name == program)?;
        kernels.get(kernel.index() as usize).copied()
    }

    fn bound<'a>(bindings: &[Binding<'a>], slot: u32) -> Option<BindingResource<'a>> {
        bindings.iter().find(|b| b.slot == slot).map(|b| b.resource)
    }

    fn bound_id(bindings: &[Binding<'_>], slot: u32) -> Result<u64> {
        match Self::bound(bindings, slot) {
            Some(
                BindingResource::Image(id)
                | BindingResource::StorageImage(id)
                | BindingResource::Buffer(id),
            ) => Ok(id.raw()),
            _ => Err(TerrainError::Dispatch(format!("slot {slot} not bound"))),
        }
    }

    fn run_kernel(
        &mut self,
        kernel: &str,
        bindings: &[Binding<'_>],
        grid: (u32, u32),
    ) -> Result<()> {
        let uniforms = match Self::bound(bindings, slots::PARAMS) {
            Some(BindingResource::Uniforms(bytes)) => bytes.to_vec(),
            _ => return Err(TerrainError::Dispatch("params not bound".to_string())),
        };

        match kernel {
            NOISE_KERNEL => {
                let params: NoiseParams = bytemuck::pod_read_unaligned(&uniforms);
                let image = self.image_mut(Self::bound_id(bindings, slots::IMAGE)?)?;
                image.fill(f32::from((params.seed % 256) as u8) / 255.0);
            }
            LAYERED_NOISE_KERNEL => {
                let params: NoiseParams = bytemuck::pod_read_unaligned(&uniforms);
                let configs = self.buffer(Self::bound_id(bindings, slots::STRUCTURED)?)?;
                let layers = decode_layers(configs)?;
                let value: f32 = layers
                    .iter()
                    .take(params.config_count as usize)
                    .map(|layer| FAKE_LAYER_VALUE * layer.weight)
                    .sum();
                let image = self.image_mut(Self::bound_id(bindings, slots::IMAGE)?)?;
                image.fill(value);
            }
            MAP_KERNEL => {
                let params: MapParams = bytemuck::pod_read_unaligned(&uniforms);
                let image_id = Self::bound_id(bindings, slots::IMAGE)?;
                let vertex_id = Self::bound_id(bindings, slots::STRUCTURED)?;
                let triangle_id = Self::bound_id(bindings, slots::TRIANGLES)?;

                self.image(image_id)?;
                self.buffer(triangle_id)?;
                let mut vertices = self.take_buffer(vertex_id)?;
                let mut triangles = self.take_buffer(triangle_id)?;
                let image = self.image(image_id)?;
                for y in 0..grid.1.min(params.height) {
                    for x in 0..grid.0.min(params.width) {
                        let v = (y * params.width + x) as usize;
                        let h = image.texel(x as i32, y as i32) * params.height_multiplier;
                        put_f32(&mut vertices, v * 3, x as f32);
                        put_f32(&mut vertices, v * 3 + 1, h);
                        put_f32(&mut vertices, v * 3 + 2, y as f32);
                        write_quad(&mut triangles, x, y, params.width, params.height);
                    }
                }
                self.buffers.insert(vertex_id, vertices);
                self.buffers.insert(triangle_id, triangles);
            }
            MAP_CHUNK_KERNEL => {
                let params: MapParams = bytemuck::pod_read_unaligned(&uniforms);
                let image_id = Self::bound_id(bindings, slots::IMAGE)?;
                let vertex_id = Self::bound_id(bindings, slots::STRUCTURED)?;

                self.image(image_id)?;
                let mut vertices = self.take_buffer(vertex_id)?;
                let image = self.image(image_id)?;
                for y in 0..grid.1.min(params.height) {
                    for x in 0..grid.0.min(params.width) {
                        let v = (y * params.width + x) as usize;
                        let sx = (x as f32 + params.offset_x) * params.scale_x;
                        let sy = (y as f32 + params.offset_y) * params.scale_y;
                        let h = image.sample(sx, sy) * params.height_multiplier;
                        put_f32(&mut vertices, v * 3, x as f32 * params.scale_x);
                        put_f32(&mut vertices, v * 3 + 1, h);
                        put_f32(&mut vertices, v * 3 + 2, y as f32 * params.scale_y);
                    }
                }
                self.buffers.insert(vertex_id, vertices);
            }
            TRIANGLE_SETUP_KERNEL => {
                let params: MapParams = bytemuck::pod_read_unaligned(&uniforms);
                let triangle_id = Self::bound_id(bindings, slots::TRIANGLES)?;
                let triangles = self
                    .buffers
                    .get_mut(&triangle_id)
                    .ok_or_else(|| TerrainError::Dispatch("triangles not live".to_string()))?;
                for y in 0..grid.1.min(params.height) {
                    for x in 0..grid.0.min(params.width) {
                        write_quad(triangles, x, y, params.width, params.height);
                    }
                }
            }
            other => return Err(TerrainError::Dispatch(format!("unknown kernel {other}"))),
        }
        Ok(())
    }

    fn image(&self, id: u64) -> Result<&FakeImage> {
        self.images
            .get(&id)
            .ok_or_else(|| TerrainError::Dispatch(format!("image {id} not live")))
    }

    fn image_mut(&mut self, id: u64) -> Result<&mut FakeImage> {
        self.images
            .get_mut(&id)
            .ok_or_else(|| TerrainError::Dispatch(format!("image {id} not live")))
    }

    fn buffer(&self, id: u64) -> Result<&[u8]> {
        self.buffers
            .get(&id)
            .map(Vec::as_slice)
            .ok_or_else(|| TerrainError::Dispatch(format!("buffer {id} not live")))
    }

    fn take_buffer(&mut self, id: u64) -> Result<Vec<u8>> {
        self.buffers
            .remove(&id)
            .ok_or_else(|| TerrainError::Dispatch(format!("buffer {id} not live")))
    }

    fn release(&mut self, id: ResourceId, was_live: bool) {
        if was_live {
            self.released.push(id);
        } else {
            self.double_releases += 1;
        }
    }
}

impl ComputeDevice for TrackingDevice {
    fn device_id(&self) -> DeviceId {
        self.id
    }

    fn load_program(&mut self, name: &str) -> Result<ProgramHandle> {
        *self.program_loads.entry(name.to_string()).or_default() += 1;
        if self.failures.missing_program == Some(name) {
            return Err(TerrainError::ResourceLoad(format!("program {name} missing")));
        }
        let (program, _) = PROGRAMS
            .iter()
            .find(|(program, _)| *program == name)
            .ok_or_else(|| TerrainError::ResourceLoad(format!("unknown program {name}")))?;
        self.programs.push(*program);
        Ok(ProgramHandle::from_raw(self.programs.len() as u64 - 1))
    }

    fn find_kernel(&mut self, program: ProgramHandle, name: &str) -> Result<KernelHandle> {
        *self.kernel_lookups.entry(name.to_string()).or_default() += 1;
        if self.failures.missing_kernel == Some(name) {
            return Err(TerrainError::ResourceLoad(format!("kernel {name} missing")));
        }
        let program_name = self
            .programs
            .get(program.raw() as usize)
            .ok_or_else(|| TerrainError::ResourceLoad("program not loaded".to_string()))?;
        let (_, kernels) = PROGRAMS
            .iter()
            .find(|(p, _)| p == program_name)
            .ok_or_else(|| TerrainError::ResourceLoad("program not loaded".to_string()))?;
        let index = kernels
            .iter()
            .position(|k| *k == name)
            .ok_or_else(|| TerrainError::ResourceLoad(format!("unknown kernel {name}")))?;
        Ok(KernelHandle::new(program, index as u32))
    }

    fn create_image(&mut self, width: u32, height: u32) -> Result<ImageHandle> {
        if self.failures.image_allocation || width == 0 || height == 0 {
            return Err(TerrainError::Allocation(format!("{width}x{height} image")));
        }
        let id = self.next_id();
        self.images.insert(
            id,
            FakeImage {
                width,
                height,
                pixels: vec![0; width as usize * height as usize * 4],
            },
        );
        self.images_created += 1;
        Ok(ImageHandle::from_raw(id))
    }

    fn release_image(&mut self, image: ImageHandle) {
        let was_live = self.images.remove(&image.id().raw()).is_some();
        self.release(image.id(), was_live);
    }

    fn create_buffer(&mut self, count: usize, stride: usize) -> Result<BufferHandle> {
        let attempt = self.buffers_created.len();
        if self.failures.buffer_allocation_at == Some(attempt) || count * stride == 0 {
            // Fail once
            self.failures.buffer_allocation_at = None;
            return Err(TerrainError::Allocation(format!("{count}x{stride} buffer")));
        }
        let id = self.next_id();
        self.buffers.insert(id, vec![0; count * stride]);
        self.buffers_created.push((count, stride));
        Ok(BufferHandle::from_raw(id))
    }

    fn write_buffer(&mut self, buffer: &BufferHandle, data: &[u8]) -> Result<()> {
        let target = self
            .buffers
            .get_mut(&buffer.id().raw())
            .ok_or_else(|| TerrainError::Dispatch("buffer not live".to_string()))?;
        if data.len() > target.len() {
            return Err(TerrainError::Dispatch("write overflows buffer".to_string()));
        }
        target[..data.len()].copy_from_slice(data);
        self.uploads.push(data.to_vec());
        Ok(())
    }

    fn read_buffer(&mut self, buffer: &BufferHandle) -> Result<Vec<u8>> {
        let attempt = self.buffer_reads;
        self.buffer_reads += 1;
        if self.failures.read_buffer_at == Some(attempt) {
            return Err(TerrainError::Readback("injected read failure".to_string()));
        }
        self.buffers
            .get(&buffer.id().raw())
            .cloned()
            .ok_or_else(|| TerrainError::Readback("buffer not live".to_string()))
    }

    fn release_buffer(&mut self, buffer: BufferHandle) {
        let was_live = self.buffers.remove(&buffer.id().raw()).is_some();
        self.release(buffer.id(), was_live);
    }

    fn active_render_target(&self) -> Option<ResourceId> {
        self.active
    }

    fn set_active_render_target(&mut self, target: Option<ResourceId>) {
        self.active = target;
    }

    fn blit_to_active(&mut self, source: &HeightField) -> Result<()> {
        if self.failures.blit {
            return Err(TerrainError::Dispatch("injected blit failure".to_string()));
        }
        let target = self
            .active
            .ok_or_else(|| TerrainError::Dispatch("no active target".to_string()))?;
        let image = self.image_mut(target.raw())?;
        if (image.width, image.height) != (source.width(), source.height()) {
            return Err(TerrainError::Dispatch("size mismatch".to_string()));
        }
        image.pixels.copy_from_slice(source.as_bytes());
        Ok(())
    }

    fn read_active_pixels(&mut self, destination: &mut HeightField) -> Result<()> {
        if self.failures.read_pixels {
            return Err(TerrainError::Readback("injected pixel read failure".to_string()));
        }
        let target = self
            .active
            .ok_or_else(|| TerrainError::Readback("no active target".to_string()))?;
        let image = self
            .images
            .get(&target.raw())
            .ok_or_else(|| TerrainError::Readback("target not live".to_string()))?;
        if (image.width, image.height) != (destination.width(), destination.height()) {
            return Err(TerrainError::Readback("size mismatch".to_string()));
        }
        destination.as_bytes_mut().copy_from_slice(&image.pixels);
        Ok(())
    }

    fn dispatch(
        &mut self,
        kernel: KernelHandle,
        bindings: &[Binding<'_>],
        grid: (u32, u32),
    ) -> Result<()> {
        let name = self
            .kernel_name(kernel)
            .ok_or_else(|| TerrainError::Dispatch("unresolved kernel".to_string()))?;

        let uniforms = match Self::bound(bindings, slots::PARAMS) {
            Some(BindingResource::Uniforms(bytes)) => bytes.to_vec(),
            _ => Vec::new(),
        };
        self.dispatches.push(DispatchRecord {
            kernel: name,
            grid,
            uniforms,
            slots: bindings.iter().map(|b| b.slot).collect(),
            active_target: self.active,
        });

        if self.failures.dispatch_of == Some(name) {
            return Err(TerrainError::Dispatch(format!("injected failure in {name}")));
        }
        self.run_kernel(name, bindings, grid)
    }
}

/// Height field whose red channel is `f(x, y)` in `[0, 1]`
pub fn field_from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> f32) -> HeightField {
    let heights: Vec<f32> = (0..height)
        .flat_map(|y| (0..width).map(move |x| (x, y)))
        .map(|(x, y)| f(x, y))
        .collect();
    HeightField::from_heights(width, height, &heights).expect("valid field")
}
