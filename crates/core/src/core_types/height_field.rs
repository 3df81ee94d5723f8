//! CPU-readable height field images
//!
//! A [`HeightField`] is the host-side half of the image pair used by the
//! generation pipeline. Heights live in the red channel of an RGBA8 image, so
//! the representable precision is bounded by the image encoding:
//! [`HEIGHT_CHANNEL_BITS`] bits per channel, i.e. [`HEIGHT_LEVELS`] distinct
//! heights between 0.0 and 1.0. Noise synthesis writes the same value into
//! the red, green, and blue channels and 1.0 into alpha.

use std::path::Path;

use image::RgbaImage;

use crate::error::{Result, TerrainError};

/// Bits of height precision carried by one image channel.
pub const HEIGHT_CHANNEL_BITS: u32 = 8;

/// Number of distinct height values the encoding can represent.
pub const HEIGHT_LEVELS: u32 = 1 << HEIGHT_CHANNEL_BITS;

/// Bytes per pixel of the RGBA8 encoding shared with the device.
pub const BYTES_PER_PIXEL: usize = 4;

/// A 2D grid of elevation values encoded as an RGBA8 image.
#[derive(Debug, Clone, PartialEq)]
pub struct HeightField {
    image: RgbaImage,
}

impl HeightField {
    /// Create a zero-filled height field.
    ///
    /// # Errors
    /// Returns [`TerrainError::Allocation`] if either dimension is zero
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(TerrainError::Allocation(format!(
                "height field dimensions must be positive, got {width}x{height}"
            )));
        }
        Ok(Self {
            image: RgbaImage::new(width, height),
        })
    }

    /// Wrap an existing RGBA8 image.
    ///
    /// # Errors
    /// Returns [`TerrainError::Allocation`] if the image is empty
    pub fn from_image(image: RgbaImage) -> Result<Self> {
        if image.width() == 0 || image.height() == 0 {
            return Err(TerrainError::Allocation(
                "height field image must not be empty".to_string(),
            ));
        }
        Ok(Self { image })
    }

    /// Decode a height field from an image file in any format the `image` crate reads.
    ///
    /// # Errors
    /// Returns [`TerrainError::Image`] if the file cannot be decoded
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let image = image::open(path)?.to_rgba8();
        Self::from_image(image)
    }

    /// Build a height field from normalized heights in row-major order.
    ///
    /// Values are clamped to [0, 1] and quantized to [`HEIGHT_LEVELS`] steps.
    ///
    /// # Errors
    /// Returns [`TerrainError::InvalidParameter`] if `heights.len() != width * height`
    pub fn from_heights(width: u32, height: u32, heights: &[f32]) -> Result<Self> {
        let mut field = Self::new(width, height)?;
        if heights.len() != field.pixel_count() {
            return Err(TerrainError::invalid_parameter(
                "heights",
                format!(
                    "expected {} samples for {width}x{height}, got {}",
                    field.pixel_count(),
                    heights.len()
                ),
            ));
        }
        for (pixel, &value) in field.image.pixels_mut().zip(heights) {
            let level = quantize(value);
            pixel.0 = [level, level, level, u8::MAX];
        }
        Ok(field)
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Number of pixels (and vertices of a single-shot mesh)
    pub fn pixel_count(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    /// Normalized height at a pixel, read from the red channel.
    ///
    /// # Returns
    /// `None` when the coordinate is outside the field
    pub fn height_at(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        Some(f32::from(self.image.get_pixel(x, y).0[0]) / f32::from(u8::MAX))
    }

    /// All normalized heights in row-major order.
    pub fn heights(&self) -> Vec<f32> {
        self.image
            .pixels()
            .map(|pixel| f32::from(pixel.0[0]) / f32::from(u8::MAX))
            .collect()
    }

    /// Tightly packed RGBA8 bytes, row-major.
    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Mutable access to the RGBA8 bytes, used by device readback.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.image
    }

    /// Borrow the underlying image.
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Consume the field and return the underlying image.
    pub fn into_image(self) -> RgbaImage {
        self.image
    }
}

fn quantize(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * f32::from(u8::MAX)).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_dimensions_rejected() {
        assert!(matches!(
            HeightField::new(0, 16),
            Err(TerrainError::Allocation(_))
        ));
        assert!(matches!(
            HeightField::new(16, 0),
            Err(TerrainError::Allocation(_))
        ));
    }

    #[test]
    fn test_from_heights_quantizes_to_eight_bits() {
        let field = HeightField::from_heights(2, 2, &[0.0, 0.5, 1.0, 2.0]).unwrap();

        assert_eq!(field.as_bytes().len(), 16);
        assert_eq!(field.height_at(0, 0), Some(0.0));
        // 0.5 * 255 rounds to 128
        assert_eq!(field.image().get_pixel(1, 0).0, [128, 128, 128, 255]);
        assert_eq!(field.height_at(0, 1), Some(1.0));
        // Out-of-range input is clamped
        assert_eq!(field.height_at(1, 1), Some(1.0));
        assert_eq!(field.height_at(2, 0), None);
    }

    #[test]
    fn test_from_heights_length_mismatch() {
        let err = HeightField::from_heights(4, 4, &[0.0; 3]).unwrap_err();
        assert!(matches!(
            err,
            TerrainError::InvalidParameter {
                name: "heights",
                ..
            }
        ));
    }

    #[test]
    fn test_height_precision_constants() {
        assert_eq!(HEIGHT_LEVELS, 256);
        assert_eq!(BYTES_PER_PIXEL * 8, 32);
    }
}
