//! Image loading utilities.

use std::path::Path;

use image::{imageops::FilterType, DynamicImage};
use ndarray::Array4;

use crate::error::{Error, Result};

use super::{ImageTensor, GRAY_CHANNELS};

/// Decode raw bytes and convert them to a normalized tensor.
///
/// The image is:
/// 1. Decoded from memory (format sniffed from the bytes)
/// 2. Converted to 8-bit grayscale
/// 3. Resized to `size`x`size`
/// 4. Normalized to [0, 1] range
/// 5. Returned as NHWC tensor (1, size, size, 1)
///
/// # Errors
///
/// Returns [`Error::InvalidImage`] if the bytes are not a decodable image.
pub fn decode_image(bytes: &[u8], size: u32) -> Result<ImageTensor> {
    let img = image::load_from_memory(bytes).map_err(|source| Error::InvalidImage { source })?;

    Ok(image_to_tensor(&img, size))
}

/// Read an image file from disk and convert it to a normalized tensor.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a valid image.
pub fn load_image<P: AsRef<Path>>(path: P, size: u32) -> Result<ImageTensor> {
    let bytes = std::fs::read(path.as_ref())?;
    decode_image(&bytes, size)
}

/// Convert a `DynamicImage` to a normalized single-channel NHWC tensor.
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub fn image_to_tensor(img: &DynamicImage, size: u32) -> ImageTensor {
    let gray = img.to_luma8();
    let resized = image::imageops::resize(&gray, size, size, FilterType::CatmullRom);

    let side = size as usize;

    // Safe: x and y are bounded by `size`, which came from a u32
    Array4::from_shape_fn((1, side, side, GRAY_CHANNELS), |(_, y, x, _)| {
        f32::from(resized.get_pixel(x as u32, y as u32)[0]) / 255.0
    })
}
