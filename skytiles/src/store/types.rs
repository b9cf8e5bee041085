//! Store record and result types.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One persisted tile.
///
/// The key is always the canonical URL once migration has run; the
/// payload length is the source of truth for size accounting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TileRecord {
    /// Canonical tile URL.
    pub key: String,
    /// Store time, Unix milliseconds UTC.
    pub stored_at_ms: i64,
    /// Raw tile bytes.
    pub payload: Vec<u8>,
}

/// Errors from tile store operations.
///
/// All of these are soft at the run level: callers log them, surface a
/// user message, and continue.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The cache directory could not be created.
    #[error("failed to initialize tile store: {0}")]
    Init(std::io::Error),

    /// A record or the directory could not be read.
    #[error("failed to read from tile store: {0}")]
    Read(std::io::Error),

    /// A record could not be written or deleted.
    #[error("failed to write to tile store: {0}")]
    Write(std::io::Error),

    /// A record could not be encoded.
    #[error("failed to encode tile record: {0}")]
    Encode(String),
}

/// Result of an age-based eviction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EvictionResult {
    /// Number of records deleted.
    pub deleted_count: u64,
    /// Total payload bytes freed.
    pub deleted_bytes: u64,
}

impl fmt::Display for EvictionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "deleted {} tiles, freed {} bytes",
            self.deleted_count, self.deleted_bytes
        )
    }
}

/// Result of a full size scan.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheSize {
    /// Sum of payload lengths.
    pub total_bytes: u64,
    /// Number of decodable records.
    pub tile_count: u64,
}

impl fmt::Display for CacheSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} tiles, {} bytes", self.tile_count, self.total_bytes)
    }
}
