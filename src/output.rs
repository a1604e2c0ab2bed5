//! Result types produced by a batch run.

use crate::error::{ConversionError, ImgBatchError};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// How an item's output bytes came to be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemOutcome {
    /// The codec produced new bytes.
    Converted,
    /// Pass-through format: the input bytes were kept unchanged.
    PassedThrough,
    /// The codec failed; the original bytes were kept.
    Fallback { error: ConversionError },
}

/// One converted (or fallen-back) item, positionally aligned with its input.
///
/// Serialize-only: the JSON form carries `output_size` but not the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConvertedItem {
    /// Input name with its extension replaced by the target format.
    pub output_name: String,

    /// Output payload. Skipped in JSON summaries.
    #[serde(skip)]
    pub bytes: Bytes,

    pub original_size: u64,

    /// Always equal to `bytes.len()`.
    pub output_size: u64,

    pub outcome: ItemOutcome,
}

impl ConvertedItem {
    pub fn new(output_name: String, bytes: Bytes, original_size: u64, outcome: ItemOutcome) -> Self {
        Self {
            output_name,
            output_size: bytes.len() as u64,
            bytes,
            original_size,
            outcome,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.outcome, ItemOutcome::Fallback { .. })
    }

    /// The error that triggered the fallback, if any.
    pub fn error(&self) -> Option<&ConversionError> {
        match &self.outcome {
            ItemOutcome::Fallback { error } => Some(error),
            _ => None,
        }
    }

    /// `round(100 - output_size / original_size * 100)`; negative when the
    /// output grew, 0 for an empty original.
    pub fn percent_smaller(&self) -> i64 {
        if self.original_size == 0 {
            return 0;
        }
        (100.0 - self.output_size as f64 / self.original_size as f64 * 100.0).round() as i64
    }
}

/// Aggregate statistics for a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total_items: usize,
    pub converted_items: usize,
    pub passed_through_items: usize,
    pub fallback_items: usize,
    pub total_original_bytes: u64,
    pub total_output_bytes: u64,
    pub duration_ms: u64,
}

impl BatchStats {
    pub(crate) fn from_items(items: &[ConvertedItem], duration_ms: u64) -> Self {
        let count = |f: fn(&ItemOutcome) -> bool| items.iter().filter(|i| f(&i.outcome)).count();
        Self {
            total_items: items.len(),
            converted_items: count(|o| matches!(o, ItemOutcome::Converted)),
            passed_through_items: count(|o| matches!(o, ItemOutcome::PassedThrough)),
            fallback_items: count(|o| matches!(o, ItemOutcome::Fallback { .. })),
            total_original_bytes: items.iter().map(|i| i.original_size).sum(),
            total_output_bytes: items.iter().map(|i| i.output_size).sum(),
            duration_ms,
        }
    }
}

/// Lifecycle of a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BatchState {
    #[default]
    Idle,
    Running,
    Completed { any_error: bool },
}

/// Everything a completed batch run produced.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutput {
    /// One entry per input, same order.
    pub items: Vec<ConvertedItem>,
    /// `true` when at least one item fell back.
    pub any_error: bool,
    /// Final progress vector; every entry is 100.
    pub progress: Vec<u8>,
    pub stats: BatchStats,
}

impl BatchOutput {
    /// `(results, any_error)`.
    pub fn into_parts(self) -> (Vec<ConvertedItem>, bool) {
        (self.items, self.any_error)
    }

    /// Treat any fallback as an error.
    pub fn into_result(self) -> Result<Self, ImgBatchError> {
        if self.any_error {
            return Err(ImgBatchError::PartialFailure {
                failed: self.stats.fallback_items,
                total: self.stats.total_items,
            });
        }
        Ok(self)
    }

    pub fn state(&self) -> BatchState {
        BatchState::Completed {
            any_error: self.any_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(original: u64, output: usize, outcome: ItemOutcome) -> ConvertedItem {
        ConvertedItem::new("x.webp".into(), Bytes::from(vec![0u8; output]), original, outcome)
    }

    #[test]
    fn output_size_tracks_bytes() {
        let i = item(10, 6, ItemOutcome::Converted);
        assert_eq!(i.output_size, 6);
    }

    #[test]
    fn percent_smaller_rounds() {
        assert_eq!(item(10_240, 6_144, ItemOutcome::Converted).percent_smaller(), 40);
        assert_eq!(item(3, 2, ItemOutcome::Converted).percent_smaller(), 33);
        assert_eq!(item(10, 15, ItemOutcome::Converted).percent_smaller(), -50);
        assert_eq!(item(0, 0, ItemOutcome::PassedThrough).percent_smaller(), 0);
    }

    #[test]
    fn fallback_exposes_error() {
        let err = ConversionError::Decode {
            detail: "nope".into(),
        };
        let i = item(5, 5, ItemOutcome::Fallback { error: err.clone() });
        assert!(i.is_fallback());
        assert_eq!(i.error(), Some(&err));
        assert!(item(5, 5, ItemOutcome::Converted).error().is_none());
    }

    #[test]
    fn stats_count_outcomes() {
        let items = vec![
            item(10, 6, ItemOutcome::Converted),
            item(20, 20, ItemOutcome::Fallback {
                error: ConversionError::EmptyOutput { format: "webp".into() },
            }),
            item(5, 5, ItemOutcome::PassedThrough),
        ];
        let stats = BatchStats::from_items(&items, 7);
        assert_eq!(stats.total_items, 3);
        assert_eq!(stats.converted_items, 1);
        assert_eq!(stats.fallback_items, 1);
        assert_eq!(stats.passed_through_items, 1);
        assert_eq!(stats.total_original_bytes, 35);
        assert_eq!(stats.total_output_bytes, 31);
        assert_eq!(stats.duration_ms, 7);
    }

    #[test]
    fn into_result_flags_partial_failure() {
        let items = vec![item(20, 20, ItemOutcome::Fallback {
            error: ConversionError::EmptyOutput { format: "png".into() },
        })];
        let output = BatchOutput {
            stats: BatchStats::from_items(&items, 0),
            items,
            any_error: true,
            progress: vec![100],
        };
        assert_eq!(output.state(), BatchState::Completed { any_error: true });
        match output.into_result() {
            Err(ImgBatchError::PartialFailure { failed, total }) => {
                assert_eq!((failed, total), (1, 1));
            }
            other => panic!("expected PartialFailure, got {other:?}"),
        }
    }

    #[test]
    fn json_summary_omits_bytes() {
        let json = serde_json::to_value(item(10, 6, ItemOutcome::Converted)).unwrap();
        assert!(json.get("bytes").is_none());
        assert_eq!(json["outcome"]["kind"], "converted");
        assert_eq!(json["output_size"], 6);
    }

    #[test]
    fn batch_summary_reports_sizes_without_payloads() {
        let items = vec![
            item(10, 6, ItemOutcome::Converted),
            item(4, 4, ItemOutcome::PassedThrough),
        ];
        let output = BatchOutput {
            stats: BatchStats::from_items(&items, 3),
            items,
            any_error: false,
            progress: vec![100, 100],
        };
        let json = serde_json::to_value(&output).unwrap();
        let sizes: Vec<_> = json["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|i| {
                assert!(i.get("bytes").is_none());
                i["output_size"].as_u64().unwrap()
            })
            .collect();
        assert_eq!(sizes, vec![6, 4]);
        assert_eq!(json["stats"]["total_output_bytes"], 10);
    }
}
