//! # imgbatch
//!
//! Batch-convert images to WebP, JPEG, PNG or AVIF, then bundle the results
//! into a single zip archive.
//!
//! ## Pipeline Overview
//!
//! ```text
//! images
//!  │
//!  ├─ 1. Input    named byte payloads, in order (files or in-memory)
//!  ├─ 2. Codec    decode → cap dimensions → encode, shrinking until ≤ 5 MiB
//!  │              (CPU-bound, spawn_blocking, one image at a time)
//!  ├─ 3. Fallback a failing image keeps its original bytes; the batch goes on
//!  ├─ 4. Progress per-image percentages, all 100 when the run completes
//!  └─ 5. Archive  zip of every result, keyed by output name
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use imgbatch::{convert_to_archive, ConversionConfig, TargetFormat};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder()
//!         .format(TargetFormat::Webp)
//!         .quality(80)
//!         .build()?;
//!     let output = convert_to_archive(&["a.jpg", "b.png"], "converted-images.zip", &config).await?;
//!     for item in &output.items {
//!         println!("{}: {}% smaller", item.output_name, item.percent_smaller());
//!     }
//!     if output.any_error {
//!         eprintln!("some images were kept unchanged");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `imgbatch` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! imgbatch = { version = "0.1", default-features = false }
//! ```
//!
//! ## Choosing a Format
//!
//! | Format | Quality knob | Notes |
//! |--------|--------------|-------|
//! | `webp` | 0–100        | Default. Lossy, via libwebp |
//! | `jpeg` | 1–100        | No alpha channel |
//! | `png`  | compression level | Lossless |
//! | `avif` | 1–100        | Smallest output, slowest encoder |
//! | `svg`  | n/a          | Pass-through: bytes are kept, only the name changes |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod session;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ArchiveCompression, ArchiveOptions, CodecLimits, CollisionPolicy, ConversionConfig,
    ConversionConfigBuilder, ConversionRequest, TargetFormat, DEFAULT_ARCHIVE_NAME,
};
pub use convert::{
    convert_batch, convert_batch_observed, convert_batch_sync, convert_files,
    convert_to_archive, package, write_items,
};
pub use error::{ArchiveError, ConversionError, ImgBatchError};
pub use output::{BatchOutput, BatchState, BatchStats, ConvertedItem, ItemOutcome};
pub use pipeline::archive::package_archive;
pub use pipeline::codec::{Codec, ImageCodec};
pub use pipeline::input::{load_input, load_inputs, InputItem};
pub use progress::{
    BatchProgressCallback, NoopProgressCallback, ProgressCallback, ProgressHandle,
    ProgressTracker,
};
pub use session::ConverterSession;
pub use stream::{convert_stream, BatchEvent, BatchStream};
