//! Streaming conversion API: emit events as the batch progresses.
//!
//! Unlike the eager [`crate::convert::convert_batch`], which returns only after
//! every item was attempted, [`convert_stream`] yields [`BatchEvent`]s as they
//! happen: a `Started`, then per item an `ItemStarted`, zero or more
//! `Progress` and one `ItemFinished`, and finally a single `Completed`, after
//! which the stream ends.
//!
//! Items are processed one at a time, so events always arrive in item order.

use crate::config::ConversionConfig;
use crate::convert::run_batch;
use crate::error::ImgBatchError;
use crate::output::{BatchStats, ConvertedItem};
use crate::pipeline::input::InputItem;
use crate::progress::ProgressHandle;
use serde::Serialize;
use std::pin::Pin;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tracing::info;

/// One observable step of a batch run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
    Started {
        total: usize,
    },
    ItemStarted {
        index: usize,
        name: String,
    },
    /// The tracker recorded a new percentage for `index`.
    Progress {
        index: usize,
        percent: u8,
    },
    ItemFinished {
        index: usize,
        item: ConvertedItem,
    },
    /// Last event of every stream. `progress` is all 100.
    Completed {
        any_error: bool,
        progress: Vec<u8>,
        stats: BatchStats,
    },
}

/// A boxed stream of batch events.
pub type BatchStream = Pin<Box<dyn Stream<Item = BatchEvent> + Send>>;

/// Start a batch in the background and return its event stream.
///
/// Must be called from within a Tokio runtime. Dropping the stream does not
/// stop the run; the remaining events are discarded.
///
/// # Errors
/// Configuration misuse, detected before the run starts.
pub fn convert_stream(
    items: Vec<InputItem>,
    config: ConversionConfig,
) -> Result<BatchStream, ImgBatchError> {
    config.validate()?;
    info!("Starting streaming conversion of {} images", items.len());

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(async move {
        run_batch(&items, &config, &ProgressHandle::default(), Some(tx)).await;
    });

    Ok(Box::pin(UnboundedReceiverStream::new(rx)))
}
