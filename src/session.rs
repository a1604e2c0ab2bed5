//! A stateful converter holding inputs, settings and the last results.
//!
//! [`ConverterSession`] is what an interactive host (a UI, a watch loop)
//! keeps around between runs. It enforces the lifecycle rules:
//!
//! * results and progress are emptied whenever the inputs, format or quality
//!   change, and are repopulated only by a complete [`ConverterSession::run`];
//! * no mutation is accepted while a run is in flight
//!   ([`ImgBatchError::SessionBusy`]).
//!
//! All methods take `&self`, so a session can be shared through an `Arc`
//! between the task driving `run` and the tasks observing it.

use crate::config::{ConversionConfig, TargetFormat};
use crate::convert::{package, run_batch};
use crate::error::ImgBatchError;
use crate::output::{BatchOutput, BatchState, ConvertedItem};
use crate::pipeline::input::InputItem;
use crate::progress::ProgressHandle;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

#[derive(Debug, Default)]
struct SessionState {
    config: ConversionConfig,
    items: Vec<InputItem>,
    results: Vec<ConvertedItem>,
    state: BatchState,
}

impl SessionState {
    fn ensure_idle(&self, action: &'static str) -> Result<(), ImgBatchError> {
        if self.state == BatchState::Running {
            return Err(ImgBatchError::SessionBusy { action });
        }
        Ok(())
    }
}

/// Stateful batch converter.
#[derive(Debug, Default)]
pub struct ConverterSession {
    inner: Mutex<SessionState>,
    progress: ProgressHandle,
}

impl ConverterSession {
    /// A session using `config` for every run.
    ///
    /// # Errors
    /// [`ImgBatchError::InvalidConfig`] when `config` does not validate.
    pub fn new(config: ConversionConfig) -> Result<Self, ImgBatchError> {
        config.validate()?;
        Ok(Self {
            inner: Mutex::new(SessionState {
                config,
                ..SessionState::default()
            }),
            progress: ProgressHandle::default(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` to an idle session, then drop results and progress.
    fn mutate<T>(
        &self,
        action: &'static str,
        f: impl FnOnce(&mut SessionState) -> Result<T, ImgBatchError>,
    ) -> Result<T, ImgBatchError> {
        let mut s = self.lock();
        s.ensure_idle(action)?;
        let value = f(&mut s)?;
        s.results.clear();
        s.state = BatchState::Idle;
        self.progress.clear();
        Ok(value)
    }

    /// Append items after the current ones.
    pub fn add_items(&self, items: impl IntoIterator<Item = InputItem>) -> Result<(), ImgBatchError> {
        self.mutate("add items", |s| {
            s.items.extend(items);
            Ok(())
        })
    }

    /// Remove and return the item at `index`.
    pub fn remove_item(&self, index: usize) -> Result<InputItem, ImgBatchError> {
        self.mutate("remove an item", |s| {
            if index >= s.items.len() {
                return Err(ImgBatchError::InvalidConfig(format!(
                    "No input at index {} (session holds {})",
                    index,
                    s.items.len()
                )));
            }
            Ok(s.items.remove(index))
        })
    }

    /// Drop every input.
    pub fn clear(&self) -> Result<(), ImgBatchError> {
        self.mutate("clear inputs", |s| {
            s.items.clear();
            Ok(())
        })
    }

    /// Switch the target format. Unknown identifiers fail fast.
    pub fn set_format(&self, identifier: &str) -> Result<(), ImgBatchError> {
        let format: TargetFormat = identifier.parse()?;
        self.mutate("change the format", |s| {
            s.config.request.format = format;
            Ok(())
        })
    }

    /// Set the quality, 0–100.
    pub fn set_quality(&self, quality: u8) -> Result<(), ImgBatchError> {
        if quality > 100 {
            return Err(ImgBatchError::InvalidConfig(format!(
                "Quality must be 0–100, got {}",
                quality
            )));
        }
        self.mutate("change the quality", |s| {
            s.config.request.quality = quality;
            Ok(())
        })
    }

    /// Convert every current input with the current settings.
    ///
    /// On success the session's results, progress and state reflect this run.
    /// If the returned future is dropped before completion the session goes
    /// back to `Idle` with empty results.
    pub async fn run(&self) -> Result<BatchOutput, ImgBatchError> {
        let (items, config) = {
            let mut s = self.lock();
            s.ensure_idle("start a run")?;
            if s.items.is_empty() {
                return Err(ImgBatchError::NoInputs);
            }
            s.state = BatchState::Running;
            s.results.clear();
            (s.items.clone(), s.config.clone())
        };

        let mut guard = RunGuard {
            session: self,
            finished: false,
        };
        info!("Session run started with {} inputs", items.len());
        let output = run_batch(&items, &config, &self.progress, None).await;
        guard.finished = true;

        let mut s = self.lock();
        s.results = output.items.clone();
        s.state = output.state();
        debug!("Session run finished: {:?}", s.state);
        Ok(output)
    }

    /// Package the current results into a zip archive.
    ///
    /// Before any run (or after a reset) this yields an empty archive.
    pub async fn package(&self) -> Result<Vec<u8>, ImgBatchError> {
        let (results, options) = {
            let s = self.lock();
            s.ensure_idle("package results")?;
            (s.results.clone(), s.config.archive.clone())
        };
        package(&results, &options).await
    }

    pub fn items(&self) -> Vec<InputItem> {
        self.lock().items.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn results(&self) -> Vec<ConvertedItem> {
        self.lock().results.clone()
    }

    /// Live progress: updated while a run is in flight.
    pub fn progress(&self) -> Vec<u8> {
        self.progress.snapshot()
    }

    /// A handle for polling progress from another task.
    pub fn progress_handle(&self) -> ProgressHandle {
        self.progress.clone()
    }

    pub fn state(&self) -> BatchState {
        self.lock().state
    }

    /// `true` when the last completed run had at least one fallback.
    pub fn any_error(&self) -> bool {
        matches!(self.state(), BatchState::Completed { any_error: true })
    }

    pub fn config(&self) -> ConversionConfig {
        self.lock().config.clone()
    }
}

/// Returns an abandoned run's session to `Idle`.
struct RunGuard<'a> {
    session: &'a ConverterSession,
    finished: bool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let mut s = self.session.lock();
            s.state = BatchState::Idle;
            s.results.clear();
            self.session.progress.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConversionError;
    use crate::output::ItemOutcome;
    use crate::pipeline::codec::Codec;
    use crate::config::ConversionRequest;
    use std::sync::Arc;

    /// Echoes the input, failing on payloads starting with `!`.
    struct Echo;

    impl Codec for Echo {
        fn convert(
            &self,
            input: &[u8],
            _request: &ConversionRequest,
            progress: &dyn Fn(u8),
        ) -> Result<Vec<u8>, ConversionError> {
            if input.first() == Some(&b'!') {
                return Err(ConversionError::Decode {
                    detail: "bang".into(),
                });
            }
            progress(100);
            Ok(input.to_vec())
        }
    }

    fn session() -> ConverterSession {
        let config = ConversionConfig::builder()
            .codec(Arc::new(Echo))
            .build()
            .unwrap();
        let session = ConverterSession::new(config).unwrap();
        session
            .add_items([
                InputItem::new("a.jpg", b"aaaa".to_vec()),
                InputItem::new("b.png", b"!bb".to_vec()),
            ])
            .unwrap();
        session
    }

    #[tokio::test]
    async fn run_populates_results_and_state() {
        let s = session();
        let output = s.run().await.unwrap();
        assert!(output.any_error);
        assert_eq!(s.results().len(), 2);
        assert_eq!(s.progress(), vec![100, 100]);
        assert_eq!(s.state(), BatchState::Completed { any_error: true });
        assert!(s.any_error());
        assert!(matches!(s.results()[1].outcome, ItemOutcome::Fallback { .. }));
    }

    #[tokio::test]
    async fn changing_settings_resets_results() {
        let s = session();
        s.run().await.unwrap();
        s.set_quality(50).unwrap();
        assert!(s.results().is_empty());
        assert!(s.progress().is_empty());
        assert_eq!(s.state(), BatchState::Idle);

        s.run().await.unwrap();
        s.set_format("PNG").unwrap();
        assert!(s.results().is_empty());
        assert_eq!(s.config().request.format, TargetFormat::Png);
    }

    #[tokio::test]
    async fn removing_an_item_resets_results() {
        let s = session();
        s.run().await.unwrap();
        let removed = s.remove_item(1).unwrap();
        assert_eq!(removed.name(), "b.png");
        assert!(s.results().is_empty());

        let output = s.run().await.unwrap();
        assert!(!output.any_error);
        assert_eq!(output.items[0].output_name, "a.webp");
    }

    #[tokio::test]
    async fn empty_session_refuses_to_run() {
        let s = session();
        s.clear().unwrap();
        assert!(matches!(s.run().await, Err(ImgBatchError::NoInputs)));
    }

    #[test]
    fn bad_settings_fail_fast() {
        let s = session();
        assert!(matches!(
            s.set_format("jpg"),
            Err(ImgBatchError::UnsupportedFormat { .. })
        ));
        assert!(s.set_quality(101).is_err());
        assert!(s.remove_item(9).is_err());
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn running_session_rejects_mutation() {
        let s = session();
        s.lock().state = BatchState::Running;
        assert!(matches!(
            s.set_quality(10),
            Err(ImgBatchError::SessionBusy { .. })
        ));
        assert!(matches!(
            s.add_items([InputItem::new("c.gif", vec![1])]),
            Err(ImgBatchError::SessionBusy { .. })
        ));
        assert_eq!(s.len(), 2);
    }

    /// Sleeps before reporting completion.
    struct Slow;

    impl Codec for Slow {
        fn convert(
            &self,
            input: &[u8],
            _request: &ConversionRequest,
            progress: &dyn Fn(u8),
        ) -> Result<Vec<u8>, ConversionError> {
            std::thread::sleep(std::time::Duration::from_millis(300));
            progress(100);
            Ok(input.to_vec())
        }
    }

    #[tokio::test]
    async fn abandoned_run_cannot_touch_later_progress() {
        let config = ConversionConfig::builder()
            .codec(Arc::new(Slow))
            .build()
            .unwrap();
        let s = ConverterSession::new(config).unwrap();
        s.add_items([
            InputItem::new("a.png", vec![1u8; 8]),
            InputItem::new("b.png", vec![2u8; 8]),
        ])
        .unwrap();

        let abandoned =
            tokio::time::timeout(std::time::Duration::from_millis(50), s.run()).await;
        assert!(abandoned.is_err());
        assert_eq!(s.state(), BatchState::Idle);
        assert!(s.progress().is_empty());

        // A new run begins while the first codec call is still sleeping.
        let handle = s.progress_handle();
        handle.reset(2);
        tokio::time::sleep(std::time::Duration::from_millis(400)).await;
        assert_eq!(s.progress(), vec![0, 0]);
    }

    #[tokio::test]
    async fn package_before_run_is_empty_archive() {
        let s = session();
        let archive = s.package().await.unwrap();
        let zip = zip::ZipArchive::new(std::io::Cursor::new(archive)).unwrap();
        assert_eq!(zip.len(), 0);
    }
}
