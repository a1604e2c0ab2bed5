//! Image encoding: `DynamicImage` → bytes in the requested raster format.
//!
//! Quality arrives on the request's 0–100 scale (0 = most compression,
//! 100 = most fidelity) and is mapped onto each encoder's own knob:
//!
//! | Format | Knob |
//! |--------|------|
//! | JPEG   | quality 1–100 |
//! | AVIF   | quality 1–100, speed from [`crate::config::CodecLimits::avif_speed`] |
//! | PNG    | 0–33 `Best`, 34–66 `Default`, 67–100 `Fast` deflate effort |
//! | WebP   | quality 0–100 (lossy, libwebp via the `webp` crate) |

use crate::config::TargetFormat;
use crate::error::ConversionError;
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ColorType, DynamicImage, ImageError};
use tracing::debug;

/// Encode `img` as `format` at `quality`.
///
/// Returns [`ConversionError::Unsupported`] for pass-through formats and
/// [`ConversionError::EmptyOutput`] if the encoder wrote nothing.
pub fn encode_image(
    img: &DynamicImage,
    format: TargetFormat,
    quality: u8,
    avif_speed: u8,
) -> Result<Vec<u8>, ConversionError> {
    let mut buf = Vec::new();
    let quality = quality.min(100);

    let result = match format {
        TargetFormat::Jpeg => {
            // JPEG has no alpha channel.
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality.max(1)))
        }
        TargetFormat::Png => img.write_with_encoder(PngEncoder::new_with_quality(
            &mut buf,
            png_compression(quality),
            FilterType::Adaptive,
        )),
        TargetFormat::Webp => {
            buf = encode_webp(img, quality)?;
            Ok(())
        }
        TargetFormat::Avif => to_rgb_family(img).write_with_encoder(
            AvifEncoder::new_with_speed_quality(&mut buf, avif_speed.clamp(1, 10), quality.max(1)),
        ),
        TargetFormat::Svg => {
            return Err(ConversionError::Unsupported {
                format: format.to_string(),
            })
        }
    };

    result.map_err(|e| encode_error(format, e))?;

    if buf.is_empty() {
        return Err(ConversionError::EmptyOutput {
            format: format.to_string(),
        });
    }

    debug!(
        "Encoded {}x{} → {} bytes {} (q={})",
        img.width(),
        img.height(),
        buf.len(),
        format,
        quality
    );
    Ok(buf)
}

/// Map 0–100 quality onto PNG deflate effort. Lower quality = harder squeeze.
pub fn png_compression(quality: u8) -> CompressionType {
    match quality {
        0..=33 => CompressionType::Best,
        34..=66 => CompressionType::Default,
        _ => CompressionType::Fast,
    }
}

/// Lossy WebP at `quality` (libwebp's own 0–100 scale).
fn encode_webp(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, ConversionError> {
    let rgb = to_rgb_family(img);
    let encoder = webp::Encoder::from_image(&rgb).map_err(|e| ConversionError::Encode {
        format: TargetFormat::Webp.to_string(),
        detail: e.to_string(),
    })?;
    let memory = encoder
        .encode_simple(false, quality as f32)
        .map_err(|e| ConversionError::Encode {
            format: TargetFormat::Webp.to_string(),
            detail: format!("{e:?}"),
        })?;
    Ok(memory.to_vec())
}

/// libwebp and ravif want 8-bit RGB or RGBA.
fn to_rgb_family(img: &DynamicImage) -> DynamicImage {
    match img.color() {
        ColorType::Rgb8 | ColorType::Rgba8 => img.clone(),
        _ => DynamicImage::ImageRgba8(img.to_rgba8()),
    }
}

fn encode_error(format: TargetFormat, e: ImageError) -> ConversionError {
    ConversionError::Encode {
        format: format.to_string(),
        detail: e.to_string(),
    }
}
