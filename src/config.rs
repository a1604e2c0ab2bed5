//! Configuration types for batch image conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. The per-run request (target format and
//! quality) lives in [`ConversionRequest`]; the encoder ceilings that the codec
//! enforces live in [`CodecLimits`]; archive packaging knobs live in
//! [`ArchiveOptions`].
//!
//! A config is cloned into each batch run, so the request cannot change while
//! a run is in flight.

use crate::error::ImgBatchError;
use crate::pipeline::codec::Codec;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// One of the five supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    /// WebP (default).
    #[default]
    Webp,
    Jpeg,
    Png,
    Avif,
    /// Vector format: no transcoding is defined, input bytes pass through.
    Svg,
}

impl TargetFormat {
    /// All supported formats, in display order.
    pub const ALL: [TargetFormat; 5] = [
        TargetFormat::Webp,
        TargetFormat::Jpeg,
        TargetFormat::Png,
        TargetFormat::Avif,
        TargetFormat::Svg,
    ];

    /// The string identifier, also used as the output file extension.
    pub fn identifier(self) -> &'static str {
        match self {
            TargetFormat::Webp => "webp",
            TargetFormat::Jpeg => "jpeg",
            TargetFormat::Png => "png",
            TargetFormat::Avif => "avif",
            TargetFormat::Svg => "svg",
        }
    }

    /// File extension for converted items (same as the identifier).
    pub fn extension(self) -> &'static str {
        self.identifier()
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            TargetFormat::Webp => "image/webp",
            TargetFormat::Jpeg => "image/jpeg",
            TargetFormat::Png => "image/png",
            TargetFormat::Avif => "image/avif",
            TargetFormat::Svg => "image/svg+xml",
        }
    }

    /// `true` for formats where the input bytes are returned unchanged.
    pub fn is_passthrough(self) -> bool {
        matches!(self, TargetFormat::Svg)
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

impl FromStr for TargetFormat {
    type Err = ImgBatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        TargetFormat::ALL
            .into_iter()
            .find(|f| f.identifier() == wanted)
            .ok_or_else(|| ImgBatchError::UnsupportedFormat {
                identifier: s.to_string(),
            })
    }
}

/// Format and quality for one batch run.
///
/// `quality` is on a 0–100 scale: 0 = most compression, 100 = most fidelity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub format: TargetFormat,
    pub quality: u8,
}

impl Default for ConversionRequest {
    fn default() -> Self {
        Self {
            format: TargetFormat::Webp,
            quality: 80,
        }
    }
}

impl ConversionRequest {
    /// Parse a request from a format identifier, failing fast on unknown
    /// identifiers and out-of-range quality.
    pub fn new(format: &str, quality: u8) -> Result<Self, ImgBatchError> {
        let request = Self {
            format: format.parse()?,
            quality,
        };
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<(), ImgBatchError> {
        if self.quality > 100 {
            return Err(ImgBatchError::InvalidConfig(format!(
                "Quality must be 0–100, got {}",
                self.quality
            )));
        }
        Ok(())
    }
}

/// Ceilings enforced by the default codec when recompressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecLimits {
    /// Target maximum payload per converted image, in bytes. Default: 5 MiB.
    ///
    /// When an encode exceeds this, quality and dimensions are stepped down
    /// and the image re-encoded, up to `max_iterations` attempts.
    pub max_output_bytes: u64,

    /// Longest edge, in pixels, after resizing. Default: 4096.
    pub max_dimension: u32,

    /// Maximum encode attempts while chasing `max_output_bytes`. Default: 10.
    pub max_iterations: u32,

    /// ravif speed preset, 1 (slowest, smallest) to 10 (fastest). Default: 8.
    pub avif_speed: u8,
}

impl Default for CodecLimits {
    fn default() -> Self {
        Self {
            max_output_bytes: 5 * 1024 * 1024,
            max_dimension: 4096,
            max_iterations: 10,
            avif_speed: 8,
        }
    }
}

/// What to do when two converted items share an output name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CollisionPolicy {
    /// Rename later entries: `b.webp`, `b (1).webp`, `b (2).webp`. (default)
    #[default]
    AutoSuffix,
    /// Fail packaging with [`crate::error::ArchiveError::DuplicateEntry`].
    Reject,
    /// A later entry replaces the earlier one.
    LastWriteWins,
}

/// Compression applied to archive entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ArchiveCompression {
    /// No compression; image payloads are already compressed. (default)
    #[default]
    Stored,
    Deflated,
}

/// Options for [`crate::pipeline::archive::package_archive`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveOptions {
    pub collision: CollisionPolicy,
    pub compression: ArchiveCompression,
    /// Suggested file name for the archive. Default: `converted-images.zip`.
    pub file_name: String,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            collision: CollisionPolicy::default(),
            compression: ArchiveCompression::default(),
            file_name: DEFAULT_ARCHIVE_NAME.to_string(),
        }
    }
}

/// Conventional name of the downloadable archive.
pub const DEFAULT_ARCHIVE_NAME: &str = "converted-images.zip";

/// Configuration for a batch conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use imgbatch::{ConversionConfig, TargetFormat};
///
/// let config = ConversionConfig::builder()
///     .format(TargetFormat::Avif)
///     .quality(60)
///     .max_dimension(2048)
///     .build()
///     .unwrap();
/// assert_eq!(config.request.quality, 60);
/// ```
#[derive(Clone, Default)]
pub struct ConversionConfig {
    /// Target format and quality.
    pub request: ConversionRequest,

    /// Encoder ceilings for the default codec.
    pub limits: CodecLimits,

    /// Archive packaging options.
    pub archive: ArchiveOptions,

    /// Pre-constructed codec. When `None`, an
    /// [`crate::pipeline::codec::ImageCodec`] is built from `limits`.
    pub codec: Option<Arc<dyn Codec>>,

    /// Receives per-item progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("request", &self.request)
            .field("limits", &self.limits)
            .field("archive", &self.archive)
            .field("codec", &self.codec.as_ref().map(|_| "<dyn Codec>"))
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Check the request and limits. Called before any item is processed.
    pub fn validate(&self) -> Result<(), ImgBatchError> {
        self.request.validate()?;
        let l = &self.limits;
        if l.max_dimension == 0 {
            return Err(ImgBatchError::InvalidConfig(
                "Max dimension must be ≥ 1".into(),
            ));
        }
        if l.max_output_bytes == 0 {
            return Err(ImgBatchError::InvalidConfig(
                "Max output size must be ≥ 1 byte".into(),
            ));
        }
        if l.max_iterations == 0 {
            return Err(ImgBatchError::InvalidConfig(
                "Max iterations must be ≥ 1".into(),
            ));
        }
        if !(1..=10).contains(&l.avif_speed) {
            return Err(ImgBatchError::InvalidConfig(format!(
                "AVIF speed must be 1–10, got {}",
                l.avif_speed
            )));
        }
        Ok(())
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn request(mut self, request: ConversionRequest) -> Self {
        self.config.request = request;
        self
    }

    pub fn format(mut self, format: TargetFormat) -> Self {
        self.config.request.format = format;
        self
    }

    pub fn quality(mut self, quality: u8) -> Self {
        self.config.request.quality = quality.min(100);
        self
    }

    pub fn limits(mut self, limits: CodecLimits) -> Self {
        self.config.limits = limits;
        self
    }

    pub fn max_output_bytes(mut self, bytes: u64) -> Self {
        self.config.limits.max_output_bytes = bytes.max(1);
        self
    }

    pub fn max_dimension(mut self, px: u32) -> Self {
        self.config.limits.max_dimension = px.max(1);
        self
    }

    pub fn max_iterations(mut self, n: u32) -> Self {
        self.config.limits.max_iterations = n.max(1);
        self
    }

    pub fn avif_speed(mut self, speed: u8) -> Self {
        self.config.limits.avif_speed = speed.clamp(1, 10);
        self
    }

    pub fn archive(mut self, options: ArchiveOptions) -> Self {
        self.config.archive = options;
        self
    }

    pub fn collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.config.archive.collision = policy;
        self
    }

    pub fn archive_compression(mut self, compression: ArchiveCompression) -> Self {
        self.config.archive.compression = compression;
        self
    }

    pub fn codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.config.codec = Some(codec);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, ImgBatchError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_identifiers() {
        for f in TargetFormat::ALL {
            assert_eq!(f.identifier().parse::<TargetFormat>().unwrap(), f);
        }
        assert_eq!(" WebP ".parse::<TargetFormat>().unwrap(), TargetFormat::Webp);
    }

    #[test]
    fn rejects_unknown_identifier() {
        let err = "gif".parse::<TargetFormat>().unwrap_err();
        assert!(matches!(err, ImgBatchError::UnsupportedFormat { ref identifier } if identifier == "gif"));
        assert!(ConversionRequest::new("jpg", 80).is_err());
    }

    #[test]
    fn only_svg_passes_through() {
        let passthrough: Vec<_> = TargetFormat::ALL
            .into_iter()
            .filter(|f| f.is_passthrough())
            .collect();
        assert_eq!(passthrough, vec![TargetFormat::Svg]);
        assert_eq!(TargetFormat::Svg.mime_type(), "image/svg+xml");
    }

    #[test]
    fn request_rejects_quality_above_100() {
        let req = ConversionRequest {
            format: TargetFormat::Png,
            quality: 101,
        };
        assert!(req.validate().is_err());
        assert!(ConversionRequest::new("png", 100).is_ok());
    }

    #[test]
    fn builder_defaults() {
        let config = ConversionConfig::builder().build().unwrap();
        assert_eq!(config.request.format, TargetFormat::Webp);
        assert_eq!(config.request.quality, 80);
        assert_eq!(config.limits.max_output_bytes, 5 * 1024 * 1024);
        assert_eq!(config.limits.max_dimension, 4096);
        assert_eq!(config.archive.file_name, "converted-images.zip");
        assert_eq!(config.archive.collision, CollisionPolicy::AutoSuffix);
        assert_eq!(config.archive.compression, ArchiveCompression::Stored);
    }

    #[test]
    fn builder_clamps() {
        let config = ConversionConfig::builder()
            .quality(250)
            .max_dimension(0)
            .avif_speed(42)
            .build()
            .unwrap();
        assert_eq!(config.request.quality, 100);
        assert_eq!(config.limits.max_dimension, 1);
        assert_eq!(config.limits.avif_speed, 10);
    }

    #[test]
    fn validate_catches_direct_field_edits() {
        let mut config = ConversionConfig::default();
        config.limits.max_iterations = 0;
        assert!(matches!(
            config.validate(),
            Err(ImgBatchError::InvalidConfig(_))
        ));
    }

    #[test]
    fn debug_hides_trait_objects() {
        let dbg = format!("{:?}", ConversionConfig::default());
        assert!(dbg.contains("ConversionConfig"));
        assert!(dbg.contains("codec: None"));
    }
}
