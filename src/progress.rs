//! Progress tracking for batch runs.
//!
//! Two pieces live here:
//!
//! * [`ProgressTracker`]: the per-item percentage vector, index-aligned with
//!   the inputs. The controller resets it at the start of a run, the codec
//!   updates the entry of the item in flight, and the controller forces every
//!   entry to 100 once the run completes.
//! * [`BatchProgressCallback`]: a callback trait for hosts that want push
//!   notifications (progress bars, log lines). Inject it via
//!   [`crate::config::ConversionConfigBuilder::progress_callback`]. Hosts that
//!   prefer pulling events can use [`crate::stream::convert_stream`] instead.
//!
//! # Example
//!
//! ```rust
//! use imgbatch::{BatchProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl BatchProgressCallback for Counter {
//!     fn on_item_complete(&self, _index: usize, _total: usize, _item: &imgbatch::ConvertedItem) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(Arc::new(Counter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::ConversionError;
use crate::output::ConvertedItem;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Terminal percentage: the item is done, converted or fallen back.
pub const DONE: u8 = 100;

/// Per-item percentages for the active batch.
///
/// Every `reset` or `clear` starts a new *generation*. Writers that captured
/// an older generation (a run that was abandoned while its codec kept
/// working) are ignored by the `*_in` methods.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressTracker {
    percents: Vec<u8>,
    #[serde(skip)]
    generation: u64,
}

impl ProgressTracker {
    /// A tracker of `len` items, all at 0.
    pub fn new(len: usize) -> Self {
        Self {
            percents: vec![0; len],
            generation: 0,
        }
    }

    /// Resize to `len`, zero every entry and return the new generation.
    pub fn reset(&mut self, len: usize) -> u64 {
        self.percents.clear();
        self.percents.resize(len, 0);
        self.bump()
    }

    fn bump(&mut self) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// [`ProgressTracker::update`], ignored unless `generation` is current.
    pub fn update_in(&mut self, generation: u64, index: usize, percent: u8) -> Option<u8> {
        if generation != self.generation {
            return None;
        }
        self.update(index, percent)
    }

    /// [`ProgressTracker::complete_all`], ignored unless `generation` is current.
    pub fn complete_all_in(&mut self, generation: u64) {
        if generation == self.generation {
            self.complete_all();
        }
    }

    /// Record `percent` for `index` and return the stored value.
    ///
    /// Values are clamped to 100 and never move backwards. Returns `None` for
    /// an index outside the batch; no other entry is touched.
    pub fn update(&mut self, index: usize, percent: u8) -> Option<u8> {
        let slot = self.percents.get_mut(index)?;
        *slot = (*slot).max(percent.min(DONE));
        Some(*slot)
    }

    /// Force every entry to 100.
    pub fn complete_all(&mut self) {
        self.percents.iter_mut().for_each(|p| *p = DONE);
    }

    pub fn get(&self, index: usize) -> Option<u8> {
        self.percents.get(index).copied()
    }

    pub fn is_done(&self, index: usize) -> bool {
        self.get(index) == Some(DONE)
    }

    /// `true` when every entry reads 100 (vacuously true when empty).
    pub fn all_done(&self) -> bool {
        self.percents.iter().all(|&p| p == DONE)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.percents
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.percents.clone()
    }

    pub fn len(&self) -> usize {
        self.percents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.percents.is_empty()
    }

    /// Drop every entry and start a new generation.
    pub fn clear(&mut self) {
        self.percents.clear();
        self.bump();
    }
}

/// A shared, clonable view of a [`ProgressTracker`].
///
/// The controller writes through one clone while a display collaborator polls
/// another with [`ProgressHandle::snapshot`].
#[derive(Debug, Clone, Default)]
pub struct ProgressHandle {
    inner: Arc<Mutex<ProgressTracker>>,
}

impl ProgressHandle {
    pub fn new(len: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ProgressTracker::new(len))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProgressTracker> {
        // A panic mid-update leaves plain integers behind; keep using them.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a new generation of `len` entries; returns its number.
    pub fn reset(&self, len: usize) -> u64 {
        self.lock().reset(len)
    }

    pub fn update(&self, index: usize, percent: u8) -> Option<u8> {
        self.lock().update(index, percent)
    }

    pub fn update_in(&self, generation: u64, index: usize, percent: u8) -> Option<u8> {
        self.lock().update_in(generation, index, percent)
    }

    pub fn complete_all(&self) {
        self.lock().complete_all();
    }

    pub fn complete_all_in(&self, generation: u64) {
        self.lock().complete_all_in(generation);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.lock().snapshot()
    }
}

/// Called by the batch controller as it processes each item.
///
/// Items are processed one at a time, so events for item *i* always arrive
/// before any event for item *i + 1*. `on_item_progress` is invoked from the
/// blocking worker thread that runs the codec, hence `Send + Sync`. All
/// methods default to no-ops.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before the first item.
    fn on_batch_start(&self, total_items: usize) {
        let _ = total_items;
    }

    /// Called just before the codec runs for an item.
    ///
    /// # Arguments
    /// * `index`: 0-based position in the batch
    /// * `name`: the input's original name
    fn on_item_start(&self, index: usize, total_items: usize, name: &str) {
        let _ = (index, total_items, name);
    }

    /// Called with each non-decreasing percentage the tracker records.
    fn on_item_progress(&self, index: usize, percent: u8) {
        let _ = (index, percent);
    }

    /// Called when an item finished, whatever its outcome.
    fn on_item_complete(&self, index: usize, total_items: usize, item: &ConvertedItem) {
        let _ = (index, total_items, item);
    }

    /// Called before `on_item_complete` when an item fell back to its
    /// original bytes.
    fn on_item_fallback(&self, index: usize, total_items: usize, error: &ConversionError) {
        let _ = (index, total_items, error);
    }

    /// Called once after every item has been attempted.
    fn on_batch_complete(&self, total_items: usize, any_error: bool) {
        let _ = (total_items, any_error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
