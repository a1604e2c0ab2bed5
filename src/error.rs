//! Error types for the imgbatch library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`ImgBatchError`]: **Fatal**: the batch cannot start or its result cannot
//!   be delivered (unknown format identifier, unreadable input file, archive
//!   could not be written). Returned as `Err(ImgBatchError)` from the
//!   top-level functions.
//!
//! * [`ConversionError`]: **Non-fatal**: a single item failed to transcode.
//!   The controller recovers locally by substituting the original bytes and
//!   records the error in [`crate::output::ItemOutcome::Fallback`], so the
//!   batch still yields one output per input.
//!
//! * [`ArchiveError`]: packaging the results into a zip failed. Surfaced to
//!   the caller; the in-memory results are untouched and packaging may be
//!   retried.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the imgbatch library.
///
/// Item-level failures use [`ConversionError`] and are stored in
/// [`crate::output::ConvertedItem`] rather than propagated here.
#[derive(Debug, Error)]
pub enum ImgBatchError {
    // ── Configuration errors ──────────────────────────────────────────────
    /// The target format identifier is not one of the supported five.
    #[error("Unsupported output format '{identifier}'\nSupported formats: webp, jpeg, png, avif, svg.")]
    UnsupportedFormat { identifier: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    InputNotFound { path: PathBuf },

    /// Input file exists but could not be read.
    #[error("Failed to read input file '{path}': {source}")]
    InputReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A batch run was requested with no inputs.
    #[error("No input images to convert")]
    NoInputs,

    // ── Session errors ────────────────────────────────────────────────────
    /// The session was mutated while a batch run was in flight.
    #[error("Cannot {action} while a batch conversion is running")]
    SessionBusy { action: &'static str },

    /// Some items fell back to their original bytes.
    ///
    /// Returned by [`crate::output::BatchOutput::into_result`] when the
    /// caller wants to treat any fallback as an error.
    #[error("{failed}/{total} images failed to convert and were kept unchanged")]
    PartialFailure { failed: usize, total: usize },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Archive serialisation failed.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single item.
///
/// Stored in [`crate::output::ItemOutcome::Fallback`] when an item could not
/// be converted. The batch continues with the next item.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ConversionError {
    /// The input bytes are not a decodable image.
    #[error("cannot decode image: {detail}")]
    Decode { detail: String },

    /// The encoder rejected the image.
    #[error("{format} encoder failed: {detail}")]
    Encode { format: String, detail: String },

    /// The encoder produced no bytes.
    #[error("encoder produced an empty {format} payload")]
    EmptyOutput { format: String },

    /// The format has no raster encoder (pass-through formats).
    #[error("no encoder for {format}")]
    Unsupported { format: String },

    /// The worker running the codec panicked or was cancelled.
    #[error("conversion task failed: {detail}")]
    TaskFailed { detail: String },
}

/// Failure to serialise converted items into an archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Two items map to the same entry name under [`crate::config::CollisionPolicy::Reject`].
    #[error("Duplicate archive entry '{name}'")]
    DuplicateEntry { name: String },

    /// An output name is not a plain file name (it carries a directory,
    /// a root or `..`).
    #[error("Refusing output name '{name}': it must be a plain file name")]
    UnsafeEntryName { name: String },

    /// The zip writer failed.
    #[error("Zip serialisation failed: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Writing entry bytes failed.
    #[error("Archive write failed: {0}")]
    Io(#[from] std::io::Error),
}
