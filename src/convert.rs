//! Batch conversion entry points.
//!
//! [`convert_batch`] is the controller: it walks the inputs strictly in order,
//! one at a time, runs the codec for each on Tokio's blocking pool and awaits
//! it before touching the next item. A failing item never aborts the batch:
//! its original bytes are kept under the same output name (the *fallback*
//! policy) and the batch-level `any_error` flag is raised.
//!
//! Use [`crate::stream::convert_stream`] to receive the same run as a stream
//! of events instead of waiting for the final [`BatchOutput`].

use crate::config::{ArchiveOptions, ConversionConfig};
use crate::error::{ConversionError, ImgBatchError};
use crate::output::{BatchOutput, BatchStats, ConvertedItem, ItemOutcome};
use crate::pipeline::archive;
use crate::pipeline::codec::{Codec, ImageCodec};
use crate::pipeline::input::{load_inputs, InputItem};
use crate::pipeline::naming::output_name;
use crate::progress::{ProgressCallback, ProgressHandle, DONE};
use crate::stream::BatchEvent;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// Convert every item with the configured request.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(BatchOutput)` with exactly one [`ConvertedItem`] per input, in input
/// order, even when some items fell back (check `output.any_error`).
///
/// # Errors
/// Only configuration misuse, detected before any item is processed.
pub async fn convert_batch(
    items: &[InputItem],
    config: &ConversionConfig,
) -> Result<BatchOutput, ImgBatchError> {
    config.validate()?;
    Ok(run_batch(items, config, &ProgressHandle::default(), None).await)
}

/// Like [`convert_batch`], writing live percentages into `progress` so another
/// task can poll them while the run is in flight.
pub async fn convert_batch_observed(
    items: &[InputItem],
    config: &ConversionConfig,
    progress: &ProgressHandle,
) -> Result<BatchOutput, ImgBatchError> {
    config.validate()?;
    Ok(run_batch(items, config, progress, None).await)
}

/// Synchronous wrapper around [`convert_batch`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_batch_sync(
    items: &[InputItem],
    config: &ConversionConfig,
) -> Result<BatchOutput, ImgBatchError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ImgBatchError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert_batch(items, config))
}

/// Read the files at `paths` (in order) and convert them.
pub async fn convert_files<P: AsRef<Path>>(
    paths: &[P],
    config: &ConversionConfig,
) -> Result<BatchOutput, ImgBatchError> {
    config.validate()?;
    let items = load_inputs(paths).await?;
    convert_batch(&items, config).await
}

/// Package converted items into a zip archive.
///
/// Serialisation runs on the blocking pool. `items` are not modified, so a
/// failed attempt can simply be retried.
pub async fn package(
    items: &[ConvertedItem],
    options: &ArchiveOptions,
) -> Result<Vec<u8>, ImgBatchError> {
    let items = items.to_vec();
    let options = options.clone();
    let archive = tokio::task::spawn_blocking(move || archive::package_archive(&items, &options))
        .await
        .map_err(|e| ImgBatchError::Internal(format!("Archive task panicked: {}", e)))??;
    Ok(archive)
}

/// Convert files and write the archive to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial archives.
pub async fn convert_to_archive<P: AsRef<Path>>(
    paths: &[P],
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<BatchOutput, ImgBatchError> {
    let output = convert_files(paths, config).await?;
    let archive = package(&output.items, &config.archive).await?;
    write_atomic(output_path.as_ref(), &archive).await?;
    Ok(output)
}

/// Write each converted item into `dir`.
///
/// File names are resolved exactly as [`package`] resolves archive entries,
/// so the directory and the archive agree under every [`CollisionPolicy`]
/// (`Reject` fails here too, before anything is written). Names that are not
/// plain file names are refused.
///
/// [`CollisionPolicy`]: crate::config::CollisionPolicy
pub async fn write_items(
    items: &[ConvertedItem],
    dir: impl AsRef<Path>,
    options: &ArchiveOptions,
) -> Result<(), ImgBatchError> {
    let dir = dir.as_ref();
    let entries = archive::resolve_entries(items, options.collision)?;

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| ImgBatchError::OutputWriteFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;
    for (name, item) in &entries {
        write_atomic(&dir.join(name), &item.bytes).await?;
    }
    debug!("Wrote {} images to {}", entries.len(), dir.display());
    Ok(())
}

/// Write via a sibling temp file, then rename over `path`.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ImgBatchError> {
    let fail = |source: std::io::Error| ImgBatchError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(fail)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp_path, bytes).await.map_err(fail)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(fail)?;
    Ok(())
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Use the injected codec, or build the default one from the limits.
fn resolve_codec(config: &ConversionConfig) -> Arc<dyn Codec> {
    match config.codec {
        Some(ref codec) => Arc::clone(codec),
        None => Arc::new(ImageCodec::new(config.limits)),
    }
}

/// Fan-out for progress: the tracker, the optional callback and the optional
/// stream sender.
///
/// Tracker writes are stamped with the run's generation, so a codec still
/// working for an abandoned run cannot touch a later run's entries.
#[derive(Clone)]
pub(crate) struct Observers {
    progress: ProgressHandle,
    generation: u64,
    callback: Option<ProgressCallback>,
    events: Option<UnboundedSender<BatchEvent>>,
}

impl Observers {
    fn emit(&self, event: BatchEvent) {
        if let Some(ref tx) = self.events {
            // A dropped receiver does not cancel the run.
            let _ = tx.send(event);
        }
    }

    fn batch_start(&self, total: usize) {
        if let Some(ref cb) = self.callback {
            cb.on_batch_start(total);
        }
        self.emit(BatchEvent::Started { total });
    }

    fn item_start(&self, index: usize, total: usize, name: &str) {
        if let Some(ref cb) = self.callback {
            cb.on_item_start(index, total, name);
        }
        self.emit(BatchEvent::ItemStarted {
            index,
            name: name.to_string(),
        });
    }

    fn item_progress(&self, index: usize, percent: u8) {
        let Some(stored) = self.progress.update_in(self.generation, index, percent) else {
            return;
        };
        if let Some(ref cb) = self.callback {
            cb.on_item_progress(index, stored);
        }
        self.emit(BatchEvent::Progress {
            index,
            percent: stored,
        });
    }

    fn item_finished(&self, index: usize, total: usize, item: &ConvertedItem) {
        if let Some(ref cb) = self.callback {
            if let Some(error) = item.error() {
                cb.on_item_fallback(index, total, error);
            }
            cb.on_item_complete(index, total, item);
        }
        self.emit(BatchEvent::ItemFinished {
            index,
            item: item.clone(),
        });
    }

    fn batch_complete(&self, any_error: bool, stats: &BatchStats) {
        self.progress.complete_all_in(self.generation);
        if let Some(ref cb) = self.callback {
            cb.on_batch_complete(stats.total_items, any_error);
        }
        self.emit(BatchEvent::Completed {
            any_error,
            progress: self.progress.snapshot(),
            stats: stats.clone(),
        });
    }
}

/// The controller loop. `config` must already be validated.
pub(crate) async fn run_batch(
    items: &[InputItem],
    config: &ConversionConfig,
    progress: &ProgressHandle,
    events: Option<UnboundedSender<BatchEvent>>,
) -> BatchOutput {
    let start = Instant::now();
    let total = items.len();
    let codec = resolve_codec(config);
    let observers = Observers {
        progress: progress.clone(),
        generation: progress.reset(total),
        callback: config.progress_callback.clone(),
        events,
    };

    info!(
        "Converting {} images to {} (quality {})",
        total, config.request.format, config.request.quality
    );
    observers.batch_start(total);

    let mut results = Vec::with_capacity(total);
    let mut any_error = false;

    for (index, item) in items.iter().enumerate() {
        observers.item_start(index, total, item.name());
        let converted = convert_item(index, item, &codec, config, &observers).await;
        if let Some(error) = converted.error() {
            warn!(
                "Image {} ({}) kept unchanged: {}",
                index + 1,
                item.name(),
                error
            );
            any_error = true;
        }
        observers.item_finished(index, total, &converted);
        results.push(converted);
    }

    let stats = BatchStats::from_items(&results, start.elapsed().as_millis() as u64);
    observers.batch_complete(any_error, &stats);

    info!(
        "Batch complete: {}/{} converted, {} kept unchanged, {} → {} bytes in {}ms",
        stats.converted_items + stats.passed_through_items,
        total,
        stats.fallback_items,
        stats.total_original_bytes,
        stats.total_output_bytes,
        stats.duration_ms
    );

    BatchOutput {
        items: results,
        any_error,
        progress: progress.snapshot(),
        stats,
    }
}

/// Convert one item, applying the fallback policy on failure.
async fn convert_item(
    index: usize,
    item: &InputItem,
    codec: &Arc<dyn Codec>,
    config: &ConversionConfig,
    observers: &Observers,
) -> ConvertedItem {
    let request = config.request;
    let name = output_name(item.name(), request.format);

    if request.format.is_passthrough() {
        observers.item_progress(index, DONE);
        return ConvertedItem::new(
            name,
            item.bytes().clone(),
            item.size(),
            ItemOutcome::PassedThrough,
        );
    }

    let codec = Arc::clone(codec);
    let input = item.bytes().clone();
    let reporter = observers.clone();
    let result = tokio::task::spawn_blocking(move || {
        codec.convert(&input, &request, &|p| reporter.item_progress(index, p))
    })
    .await
    .map_err(|e| ConversionError::TaskFailed {
        detail: e.to_string(),
    })
    .and_then(|r| r);

    let error = match result {
        Ok(bytes) if !bytes.is_empty() => {
            debug!(
                "Image {}: {} → {} ({} → {} bytes)",
                index + 1,
                item.name(),
                name,
                item.size(),
                bytes.len()
            );
            return ConvertedItem::new(name, bytes.into(), item.size(), ItemOutcome::Converted);
        }
        Ok(_) => ConversionError::EmptyOutput {
            format: request.format.to_string(),
        },
        Err(error) => error,
    };

    fallback(name, item, error)
}

/// Keep the original bytes under the converted name.
fn fallback(name: String, item: &InputItem, error: ConversionError) -> ConvertedItem {
    ConvertedItem::new(
        name,
        item.bytes().clone(),
        item.size(),
        ItemOutcome::Fallback { error },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConversionRequest, TargetFormat};

    /// Returns the first 60 % of the input, reporting 50 then 100.
    struct Shrink;

    impl Codec for Shrink {
        fn convert(
            &self,
            input: &[u8],
            _request: &ConversionRequest,
            progress: &dyn Fn(u8),
        ) -> Result<Vec<u8>, ConversionError> {
            progress(50);
            let out = input[..input.len() * 6 / 10].to_vec();
            progress(100);
            Ok(out)
        }
    }

    struct Empty;

    impl Codec for Empty {
        fn convert(
            &self,
            _input: &[u8],
            _request: &ConversionRequest,
            _progress: &dyn Fn(u8),
        ) -> Result<Vec<u8>, ConversionError> {
            Ok(Vec::new())
        }
    }

    struct Panics;

    impl Codec for Panics {
        fn convert(
            &self,
            _input: &[u8],
            _request: &ConversionRequest,
            _progress: &dyn Fn(u8),
        ) -> Result<Vec<u8>, ConversionError> {
            panic!("codec blew up")
        }
    }

    fn config_with(codec: Arc<dyn Codec>, format: TargetFormat) -> ConversionConfig {
        ConversionConfig::builder()
            .format(format)
            .codec(codec)
            .build()
            .unwrap()
    }

    fn inputs() -> Vec<InputItem> {
        vec![
            InputItem::new("a.jpg", vec![1u8; 100]),
            InputItem::new("b.png", vec![2u8; 200]),
        ]
    }

    #[tokio::test]
    async fn converts_in_order() {
        let output = convert_batch(&inputs(), &config_with(Arc::new(Shrink), TargetFormat::Webp))
            .await
            .unwrap();
        let names: Vec<_> = output.items.iter().map(|i| i.output_name.as_str()).collect();
        assert_eq!(names, vec!["a.webp", "b.webp"]);
        assert_eq!(output.items[0].output_size, 60);
        assert_eq!(output.items[1].output_size, 120);
        assert!(!output.any_error);
        assert_eq!(output.progress, vec![100, 100]);
    }

    #[tokio::test]
    async fn empty_output_falls_back() {
        let output = convert_batch(&inputs(), &config_with(Arc::new(Empty), TargetFormat::Png))
            .await
            .unwrap();
        assert!(output.any_error);
        for (item, input) in output.items.iter().zip(inputs()) {
            assert_eq!(&item.bytes, input.bytes());
            assert_eq!(item.output_size, input.size());
            assert!(matches!(
                item.error(),
                Some(ConversionError::EmptyOutput { .. })
            ));
        }
    }

    #[tokio::test]
    async fn panicking_codec_falls_back() {
        let output = convert_batch(&inputs(), &config_with(Arc::new(Panics), TargetFormat::Jpeg))
            .await
            .unwrap();
        assert!(output.any_error);
        assert_eq!(output.stats.fallback_items, 2);
        assert!(matches!(
            output.items[0].error(),
            Some(ConversionError::TaskFailed { .. })
        ));
    }

    #[tokio::test]
    async fn svg_never_calls_the_codec() {
        let output = convert_batch(&inputs(), &config_with(Arc::new(Panics), TargetFormat::Svg))
            .await
            .unwrap();
        assert!(!output.any_error);
        assert_eq!(output.items[1].output_name, "b.svg");
        assert_eq!(&output.items[1].bytes, inputs()[1].bytes());
        assert_eq!(output.items[1].outcome, ItemOutcome::PassedThrough);
    }

    #[tokio::test]
    async fn invalid_config_fails_before_items() {
        let mut config = ConversionConfig::default();
        config.request.quality = 150;
        let err = convert_batch(&inputs(), &config).await.unwrap_err();
        assert!(matches!(err, ImgBatchError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn empty_batch_completes() {
        let output = convert_batch(&[], &ConversionConfig::default()).await.unwrap();
        assert!(output.items.is_empty());
        assert!(output.progress.is_empty());
        assert!(!output.any_error);
    }

    #[tokio::test]
    async fn observed_handle_sees_final_state() {
        let handle = ProgressHandle::default();
        let observer = handle.clone();
        convert_batch_observed(
            &inputs(),
            &config_with(Arc::new(Empty), TargetFormat::Webp),
            &handle,
        )
        .await
        .unwrap();
        assert_eq!(observer.snapshot(), vec![100, 100]);
    }

    fn converted(name: &str, payload: &'static [u8]) -> ConvertedItem {
        ConvertedItem::new(
            name.to_string(),
            bytes::Bytes::from_static(payload),
            payload.len() as u64,
            ItemOutcome::Converted,
        )
    }

    fn files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn written_files_match_archive_entries() {
        let inputs = vec![
            InputItem::new("b.png", b"png".to_vec()),
            InputItem::new("b.jpg", b"jpg".to_vec()),
        ];
        let config = config_with(Arc::new(Shrink), TargetFormat::Webp);
        let output = convert_batch(&inputs, &config).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        write_items(&output.items, dir.path(), &config.archive)
            .await
            .unwrap();
        assert_eq!(files_in(dir.path()), vec!["b (1).webp", "b.webp"]);
        assert_eq!(std::fs::read(dir.path().join("b (1).webp")).unwrap(), b"j");
    }

    #[tokio::test]
    async fn reject_policy_applies_to_written_files() {
        let items = vec![converted("b.webp", b"1"), converted("b.webp", b"2")];
        let options = ArchiveOptions {
            collision: crate::config::CollisionPolicy::Reject,
            ..ArchiveOptions::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let err = write_items(&items, &out, &options).await.unwrap_err();
        assert!(matches!(
            err,
            ImgBatchError::Archive(crate::error::ArchiveError::DuplicateEntry { .. })
        ));
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn files_stay_inside_the_output_directory() {
        let base = tempfile::tempdir().unwrap();
        let out = base.path().join("out");

        // Names derived from inputs lose their directory parts.
        let inputs = vec![InputItem::new("../escaped.png", b"png".to_vec())];
        let output = convert_batch(&inputs, &config_with(Arc::new(Shrink), TargetFormat::Webp))
            .await
            .unwrap();
        write_items(&output.items, &out, &ArchiveOptions::default())
            .await
            .unwrap();
        assert!(!base.path().join("escaped.webp").exists());
        assert_eq!(files_in(&out), vec!["escaped.webp"]);

        // Hand-built items with a path are refused outright.
        let crafted = vec![converted("../escaped.webp", b"x")];
        let err = write_items(&crafted, &out, &ArchiveOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ImgBatchError::Archive(crate::error::ArchiveError::UnsafeEntryName { .. })
        ));
        assert!(!base.path().join("escaped.webp").exists());
    }

    #[tokio::test]
    async fn write_atomic_creates_parent_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.zip");
        write_atomic(&path, b"zip").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"zip");
        assert!(!dir.path().join("nested/out.zip.tmp").exists());
    }

    #[test]
    fn sync_wrapper_runs() {
        let output =
            convert_batch_sync(&inputs(), &config_with(Arc::new(Shrink), TargetFormat::Avif)).unwrap();
        assert_eq!(output.items[0].output_name, "a.avif");
    }

    #[test]
    fn package_runs_on_blocking_pool() {
        let items = vec![converted("a.webp", b"abc")];
        let archive =
            tokio_test::block_on(package(&items, &ArchiveOptions::default())).unwrap();
        assert_eq!(&archive[..2], b"PK");
    }
}
