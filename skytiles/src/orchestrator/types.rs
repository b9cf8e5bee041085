//! Run progress and summary types.

use std::fmt;

/// One progress notification during a cache run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Tiles processed so far (cached, skipped, or failed).
    pub processed: u64,
    /// Total tiles in the run across all layers.
    pub total: u64,
}

impl ProgressEvent {
    /// Completion ratio in `[0.0, 1.0]`.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.processed as f64 / self.total as f64
        }
    }
}

/// Outcome of a cache run.
///
/// Produced exactly once per run, whether the run completed, partially
/// failed, or was cancelled.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Tiles found in or written to the store.
    pub cached_count: u64,
    /// Tiles that could neither be fetched nor persisted.
    pub failed_count: u64,
    /// Request URLs of the failed tiles, for diagnostics.
    pub failed_urls: Vec<String>,
    /// True if the run was cancelled before finishing.
    pub cancelled: bool,
    /// Total tiles the run covered (tiles x layers).
    pub total_tiles: u64,
    /// One-line user-facing outcome message.
    pub message: String,
    /// Non-fatal warnings (skipped layers, size threshold).
    pub warnings: Vec<String>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}
