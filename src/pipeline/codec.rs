//! Codec adapter: transcode and recompress one image.
//!
//! [`Codec`] is the seam between the batch controller and the actual image
//! work. The default [`ImageCodec`] decodes with the `image` crate, caps the
//! pixel dimensions, then re-encodes, stepping quality and size down until the
//! payload fits [`CodecLimits::max_output_bytes`] or the attempt budget runs
//! out. Callers may inject their own codec through
//! [`crate::config::ConversionConfigBuilder::codec`].
//!
//! Codecs run on Tokio's blocking pool, one item at a time.

use crate::config::{CodecLimits, ConversionRequest};
use crate::error::ConversionError;
use crate::pipeline::encode::encode_image;
use image::imageops::FilterType;
use image::DynamicImage;
use tracing::debug;

/// Progress after decoding succeeded.
const DECODED: u8 = 10;
/// Progress after the dimension cap was applied.
const RESIZED: u8 = 20;
/// Progress reserved for encode attempts, spread over `max_iterations`.
const ENCODE_SPAN: u8 = 80;

/// Converts one image payload.
///
/// `progress` must be called with non-decreasing percentages in `0..=100`,
/// zero or more times.
pub trait Codec: Send + Sync {
    fn convert(
        &self,
        input: &[u8],
        request: &ConversionRequest,
        progress: &dyn Fn(u8),
    ) -> Result<Vec<u8>, ConversionError>;
}

/// The default codec, backed by the `image` crate.
#[derive(Debug, Clone, Default)]
pub struct ImageCodec {
    limits: CodecLimits,
}

impl ImageCodec {
    pub fn new(limits: CodecLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &CodecLimits {
        &self.limits
    }
}

impl Codec for ImageCodec {
    fn convert(
        &self,
        input: &[u8],
        request: &ConversionRequest,
        progress: &dyn Fn(u8),
    ) -> Result<Vec<u8>, ConversionError> {
        if request.format.is_passthrough() {
            progress(100);
            return Ok(input.to_vec());
        }

        progress(0);
        let decoded = image::load_from_memory(input).map_err(|e| ConversionError::Decode {
            detail: e.to_string(),
        })?;
        progress(DECODED);

        let mut img = fit_within(decoded, self.limits.max_dimension);
        progress(RESIZED);

        let max_bytes = self.limits.max_output_bytes;
        let attempts = self.limits.max_iterations.max(1);
        let mut quality = request.quality;
        let mut attempt = 0;

        let output = loop {
            attempt += 1;
            let bytes = encode_image(&img, request.format, quality, self.limits.avif_speed)?;
            progress(RESIZED + (ENCODE_SPAN as u32 * attempt / attempts) as u8);

            if bytes.len() as u64 <= max_bytes || attempt >= attempts {
                break bytes;
            }

            debug!(
                "Attempt {}: {} bytes over the {}-byte ceiling, shrinking",
                attempt,
                bytes.len(),
                max_bytes
            );
            quality = (quality as u32 * 9 / 10) as u8;
            img = shrink(&img);
        };

        progress(100);
        Ok(output)
    }
}

/// Downscale so the longest edge is at most `max_dimension`, keeping aspect.
fn fit_within(img: DynamicImage, max_dimension: u32) -> DynamicImage {
    if img.width() <= max_dimension && img.height() <= max_dimension {
        return img;
    }
    debug!(
        "Resizing {}x{} to fit {}px",
        img.width(),
        img.height(),
        max_dimension
    );
    img.resize(max_dimension, max_dimension, FilterType::Lanczos3)
}

/// Scale both edges to 90 %, never below 1 px.
fn shrink(img: &DynamicImage) -> DynamicImage {
    let w = (img.width() * 9 / 10).max(1);
    let h = (img.height() * 9 / 10).max(1);
    img.resize_exact(w, h, FilterType::Triangle)
}
