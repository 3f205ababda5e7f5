//! Image decoding and normalization utilities.

mod inline;
mod load;

pub use inline::decode_inline;
pub use load::{decode_image, image_to_tensor, load_image};

use ndarray::Array4;

/// Image tensor in NHWC format (batch, height, width, channels).
/// Values are normalized to [0, 1].
pub type ImageTensor = Array4<f32>;

/// Side length the classifier expects its input resized to.
pub const DEFAULT_IMAGE_SIZE: u32 = 256;

/// Number of channels in grayscale images.
pub const GRAY_CHANNELS: usize = 1;
