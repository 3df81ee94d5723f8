//! Scoped activation of the device's render target
//!
//! The active render target is device-wide state shared with unrelated
//! rendering work. [`RenderTargetScope`] sets it for the lifetime of the
//! scope and restores the previous value on drop, including when the scoped
//! operation returns early with an error.

use std::ops::{Deref, DerefMut};

use super::device::{ComputeDevice, ResourceId};

/// Guard that makes an image the active render target until dropped.
///
/// The guard dereferences to the device, so operations that act on the
/// active target are issued through it.
pub struct RenderTargetScope<'a, D: ComputeDevice + ?Sized> {
    device: &'a mut D,
    previous: Option<ResourceId>,
}

impl<'a, D: ComputeDevice + ?Sized> RenderTargetScope<'a, D> {
    /// Remember the current target and activate `target`.
    pub fn activate(device: &'a mut D, target: ResourceId) -> Self {
        let previous = device.active_render_target();
        device.set_active_render_target(Some(target));
        Self { device, previous }
    }

    /// Target that will be restored when the scope ends
    pub fn previous(&self) -> Option<ResourceId> {
        self.previous
    }
}

impl<D: ComputeDevice + ?Sized> Deref for RenderTargetScope<'_, D> {
    type Target = D;

    fn deref(&self) -> &D {
        self.device
    }
}

impl<D: ComputeDevice + ?Sized> DerefMut for RenderTargetScope<'_, D> {
    fn deref_mut(&mut self) -> &mut D {
        self.device
    }
}

impl<D: ComputeDevice + ?Sized> Drop for RenderTargetScope<'_, D> {
    fn drop(&mut self) {
        self.device.set_active_render_target(self.previous);
    }
}
