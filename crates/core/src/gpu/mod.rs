//! GPU compute layer
//!
//! The generation pipeline is written against the [`ComputeDevice`] trait.
//! [`WgpuDevice`] implements it with wgpu compute pipelines (Vulkan, Metal,
//! DX12 or GL) and is available with the `gpu` feature.
//!
//! Kernels run over 8×8 workgroups; every kernel bounds-checks its
//! invocation against the dispatch grid.

pub mod device;
pub mod programs;
pub mod render_target;
pub mod transfer;

#[cfg(feature = "gpu")]
pub mod context;
#[cfg(feature = "gpu")]
pub mod wgpu_device;

pub use device::{
    Binding, BindingResource, BufferHandle, ComputeDevice, DeviceId, ImageHandle, KernelHandle,
    ProgramHandle, ResourceId,
};
pub use programs::ProgramProvider;
pub use render_target::RenderTargetScope;
pub use transfer::{allocate_gpu_image, read_back_and_release, upload_to_gpu_image};

#[cfg(feature = "gpu")]
pub use context::{create_gpu_context_blocking, GpuContext};
#[cfg(feature = "gpu")]
pub use wgpu_device::WgpuDevice;
