//! Backend-agnostic compute device interface
//!
//! The synthesizers never talk to wgpu directly. They drive a
//! [`ComputeDevice`], which exposes the handful of operations the pipeline
//! needs: resolving programs and kernels, allocating images and structured
//! buffers, copying between host and device, and dispatching kernels.
//!
//! # Ownership
//!
//! [`ImageHandle`] and [`BufferHandle`] are move-only. Releasing a resource
//! consumes its handle, so a released image or buffer cannot be bound or
//! released again. Bindings and the active render target refer to resources
//! through the copyable [`ResourceId`].
//!
//! Program and kernel handles are indices into one device's tables. Each
//! device reports a [`DeviceId`] so cached handles can be checked against
//! the device they are about to be used on.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::core_types::HeightField;
use crate::error::Result;

/// Identity of one device instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(u64);

impl DeviceId {
    /// Allocate an identifier no other device in this process shares.
    pub fn unique() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Copyable identifier of a device image or buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    /// Raw identifier value
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Exclusive ownership of a device image.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ImageHandle(u64);

impl ImageHandle {
    /// Mint a handle. Only device implementations should call this.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Identifier used for bindings and render targets
    pub fn id(&self) -> ResourceId {
        ResourceId(self.0)
    }
}

/// Exclusive ownership of a device structured buffer.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct BufferHandle(u64);

impl BufferHandle {
    /// Mint a handle. Only device implementations should call this.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Identifier used for bindings
    pub fn id(&self) -> ResourceId {
        ResourceId(self.0)
    }
}

/// A loaded GPU program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(u64);

impl ProgramHandle {
    /// Mint a handle. Only device implementations should call this.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw identifier value
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// A resolved kernel (compute entry point) of a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelHandle {
    program: ProgramHandle,
    index: u32,
}

impl KernelHandle {
    /// Mint a handle. Only device implementations should call this.
    pub fn new(program: ProgramHandle, index: u32) -> Self {
        Self { program, index }
    }

    /// Program the kernel belongs to
    pub fn program(self) -> ProgramHandle {
        self.program
    }

    /// Device-specific kernel index within the program
    pub fn index(self) -> u32 {
        self.index
    }
}

/// What is bound to a binding slot for one dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BindingResource<'a> {
    /// Uniform parameter block, uploaded for this dispatch only
    Uniforms(&'a [u8]),
    /// Image read by the kernel
    Image(ResourceId),
    /// Image written by the kernel
    StorageImage(ResourceId),
    /// Structured buffer read or written by the kernel
    Buffer(ResourceId),
}

/// One binding slot assignment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Binding<'a> {
    /// Binding index in the kernel's resource group
    pub slot: u32,
    /// Bound resource
    pub resource: BindingResource<'a>,
}

impl<'a> Binding<'a> {
    /// Bind a uniform parameter block
    pub fn uniforms(slot: u32, bytes: &'a [u8]) -> Self {
        Self {
            slot,
            resource: BindingResource::Uniforms(bytes),
        }
    }

    /// Bind an image for reading
    pub fn image(slot: u32, image: &ImageHandle) -> Self {
        Self {
            slot,
            resource: BindingResource::Image(image.id()),
        }
    }

    /// Bind an image for writing
    pub fn storage_image(slot: u32, image: &ImageHandle) -> Self {
        Self {
            slot,
            resource: BindingResource::StorageImage(image.id()),
        }
    }

    /// Bind a structured buffer
    pub fn buffer(slot: u32, buffer: &BufferHandle) -> Self {
        Self {
            slot,
            resource: BindingResource::Buffer(buffer.id()),
        }
    }
}

/// Operations the generation pipeline needs from a compute backend.
///
/// All calls are synchronous from the host's point of view: `read_buffer`
/// and `read_active_pixels` block until the device has finished every
/// previously submitted dispatch.
pub trait ComputeDevice {
    /// Identity of this device; stable for its lifetime.
    fn device_id(&self) -> DeviceId;

    /// Load a program by logical name (e.g. `"MapGenerator"`).
    ///
    /// # Errors
    /// Returns [`crate::TerrainError::ResourceLoad`] if the program is unknown or fails to compile
    fn load_program(&mut self, name: &str) -> Result<ProgramHandle>;

    /// Resolve a named kernel of a loaded program.
    ///
    /// # Errors
    /// Returns [`crate::TerrainError::ResourceLoad`] if the program has no such kernel
    fn find_kernel(&mut self, program: ProgramHandle, name: &str) -> Result<KernelHandle>;

    /// Allocate a GPU-writable RGBA8 image.
    ///
    /// # Errors
    /// Returns [`crate::TerrainError::Allocation`] on zero dimensions or exhausted memory
    fn create_image(&mut self, width: u32, height: u32) -> Result<ImageHandle>;

    /// Release an image. The handle is consumed.
    fn release_image(&mut self, image: ImageHandle);

    /// Allocate a structured buffer of `count` elements of `stride` bytes.
    ///
    /// # Errors
    /// Returns [`crate::TerrainError::Allocation`] on a zero size or exhausted memory
    fn create_buffer(&mut self, count: usize, stride: usize) -> Result<BufferHandle>;

    /// Upload bytes to the start of a buffer.
    ///
    /// # Errors
    /// Returns [`crate::TerrainError::Dispatch`] if the data does not fit
    fn write_buffer(&mut self, buffer: &BufferHandle, data: &[u8]) -> Result<()>;

    /// Read the whole buffer back to the host.
    ///
    /// # Errors
    /// Returns [`crate::TerrainError::Readback`] if mapping fails
    fn read_buffer(&mut self, buffer: &BufferHandle) -> Result<Vec<u8>>;

    /// Release a buffer. The handle is consumed.
    fn release_buffer(&mut self, buffer: BufferHandle);

    /// Currently active render target, if any.
    fn active_render_target(&self) -> Option<ResourceId>;

    /// Replace the active render target.
    ///
    /// Prefer [`super::RenderTargetScope`], which restores the previous target on every exit path.
    fn set_active_render_target(&mut self, target: Option<ResourceId>);

    /// Copy a whole CPU image into the active render target.
    ///
    /// # Errors
    /// Returns [`crate::TerrainError::Dispatch`] if no target is active or the sizes differ
    fn blit_to_active(&mut self, source: &HeightField) -> Result<()>;

    /// Read the active render target into a CPU image, overwriting its pixels.
    ///
    /// # Errors
    /// Returns [`crate::TerrainError::Readback`] if no target is active, the sizes differ, or mapping fails
    fn read_active_pixels(&mut self, destination: &mut HeightField) -> Result<()>;

    /// Dispatch a kernel with one invocation per cell of a `grid.0 × grid.1` grid.
    ///
    /// # Errors
    /// Returns [`crate::TerrainError::Dispatch`] if the bindings do not match the kernel
    fn dispatch(
        &mut self,
        kernel: KernelHandle,
        bindings: &[Binding<'_>],
        grid: (u32, u32),
    ) -> Result<()>;
}
