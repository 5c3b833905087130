use std::borrow::Cow;
use std::ops::RangeInclusive;

use image::DynamicImage;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct EncodeFailure(pub String);

/// Produces target-format bytes from a decoded image.
pub trait Encoder {
    /// Accepted values for the `quality` argument of [`Encoder::encode`].
    fn quality_range(&self) -> RangeInclusive<u32> {
        0..=100
    }

    fn encode(&self, image: &DynamicImage, quality: u32) -> Result<Vec<u8>, EncodeFailure>;
}

impl<T: Encoder + ?Sized> Encoder for &T {
    fn quality_range(&self) -> RangeInclusive<u32> {
        (**self).quality_range()
    }

    fn encode(&self, image: &DynamicImage, quality: u32) -> Result<Vec<u8>, EncodeFailure> {
        (**self).encode(image, quality)
    }
}

/// Lossy WebP encoder backed by libwebp.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebpEncoder;

impl Encoder for WebpEncoder {
    fn encode(&self, image: &DynamicImage, quality: u32) -> Result<Vec<u8>, EncodeFailure> {
        let prepared = to_webp_color(image);
        let encoder = webp::Encoder::from_image(&*prepared)
            .map_err(|e| EncodeFailure(format!("unsupported color mode: {e}")))?;
        let memory = encoder
            .encode_simple(false, quality as f32)
            .map_err(|e| EncodeFailure(format!("libwebp failed: {e:?}")))?;
        if memory.is_empty() {
            return Err(EncodeFailure("encoder produced no output".to_string()));
        }
        Ok(memory.to_vec())
    }
}

// libwebp only takes 8-bit RGB or RGBA buffers.
fn to_webp_color(image: &DynamicImage) -> Cow<'_, DynamicImage> {
    match image {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => Cow::Borrowed(image),
        other if other.color().has_alpha() => Cow::Owned(DynamicImage::ImageRgba8(other.to_rgba8())),
        other => Cow::Owned(DynamicImage::ImageRgb8(other.to_rgb8())),
    }
}
