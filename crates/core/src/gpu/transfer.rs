//! Moving height fields between host and device
//!
//! Every function here leaves the device's active render target exactly as
//! it found it and never leaks the images it allocates.

use tracing::debug;

use super::device::{ComputeDevice, ImageHandle};
use super::render_target::RenderTargetScope;
use crate::core_types::HeightField;
use crate::error::{Result, TerrainError};

/// Allocate a GPU-writable image and a blank CPU image of the same size.
///
/// # Errors
/// Returns [`TerrainError::Allocation`] if a dimension is zero or the device is out of memory
pub fn allocate_gpu_image<D: ComputeDevice + ?Sized>(
    device: &mut D,
    width: u32,
    height: u32,
) -> Result<(ImageHandle, HeightField)> {
    if width == 0 || height == 0 {
        return Err(TerrainError::Allocation(format!(
            "image dimensions must be positive, got {width}x{height}"
        )));
    }
    let field = HeightField::new(width, height)?;
    let image = device.create_image(width, height)?;
    debug!("Allocated {}x{} GPU image {:?}", width, height, image.id());
    Ok((image, field))
}

/// Allocate a GPU image matching `field` and copy the field into it.
///
/// # Errors
/// Returns the allocation or copy error; the new image is released before a copy error is returned
pub fn upload_to_gpu_image<D: ComputeDevice + ?Sized>(
    device: &mut D,
    field: &HeightField,
) -> Result<ImageHandle> {
    let image = device.create_image(field.width(), field.height())?;

    let copied = {
        let mut scope = RenderTargetScope::activate(&mut *device, image.id());
        scope.blit_to_active(field)
    };

    match copied {
        Ok(()) => {
            debug!(
                "Uploaded {}x{} height field to {:?}",
                field.width(),
                field.height(),
                image.id()
            );
            Ok(image)
        }
        Err(err) => {
            device.release_image(image);
            Err(err)
        }
    }
}

/// Read a GPU image into `field`, then release the image.
///
/// The image is released even when the read fails.
///
/// # Errors
/// Returns [`TerrainError::Readback`] if the pixels cannot be read
pub fn read_back_and_release<D: ComputeDevice + ?Sized>(
    device: &mut D,
    image: ImageHandle,
    field: &mut HeightField,
) -> Result<()> {
    let read = {
        let mut scope = RenderTargetScope::activate(&mut *device, image.id());
        scope.read_active_pixels(field)
    };
    device.release_image(image);
    read
}
