//! Persistent tile store.
//!
//! Durable mapping from canonical tile URL to tile bytes, stored as one
//! bincode-encoded record per file under the cache directory. A bounded
//! in-memory read-through layer (moka) fronts the disk so hot tiles skip
//! file I/O during rendering.
//!
//! # File layout
//!
//! ```text
//! {cache_dir}/{sha256-prefix}.tile
//! ```
//!
//! The key is hashed to produce a filename that is safe on every platform;
//! the full key travels inside the record so maintenance scans (size,
//! eviction, migration) can recover it.
//!
//! # Failure semantics
//!
//! Directory creation is lazy and retried on the next call after a
//! failure. A record that fails to decode is treated as a miss and skipped
//! by scans with a warning; it never aborts an aggregate operation.

mod types;

pub use types::{CacheSize, EvictionResult, StoreError, TileRecord};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use chrono::Utc;
use moka::future::Cache as MokaCache;
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::canonical;

/// Maximum entries held by the in-memory layer.
const MEMORY_CACHE_CAPACITY: u64 = 256;

/// Persistent, asynchronous key-value store for tile payloads.
///
/// Keys are canonical tile URLs; callers are expected to canonicalize
/// before storing (the orchestrator and resolver both do).
pub struct TileStore {
    directory: PathBuf,
    initialized: AtomicBool,
    memory: MokaCache<String, Bytes>,
}

impl TileStore {
    /// Create a store rooted at `directory`.
    ///
    /// No I/O happens here; the directory is created lazily on first use
    /// so a failing backend is retried on the next operation.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            initialized: AtomicBool::new(false),
            memory: MokaCache::new(MEMORY_CACHE_CAPACITY),
        }
    }

    /// The directory holding the tile records.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Create the cache directory if needed.
    ///
    /// Idempotent. On failure the store stays uninitialized so the next
    /// operation retries.
    pub async fn init(&self) -> Result<(), StoreError> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(StoreError::Init)?;
        self.initialized.store(true, Ordering::Release);
        debug!(dir = %self.directory.display(), "tile store initialized");
        Ok(())
    }

    /// Upsert a tile record under `key` with the current timestamp.
    ///
    /// The write is atomic (temp file + rename), so concurrent writers to
    /// the same key settle on last-writer-wins without torn records.
    pub async fn put(&self, key: &str, payload: Bytes) -> Result<(), StoreError> {
        self.init().await?;

        let record = TileRecord {
            key: key.to_string(),
            stored_at_ms: Utc::now().timestamp_millis(),
            payload: payload.to_vec(),
        };
        let encoded = bincode::serialize(&record)
            .map_err(|e| StoreError::Encode(e.to_string()))?;

        let path = self.key_path(key);
        let temp_path = path.with_extension(format!("tmp{:08x}", rand::rng().random::<u32>()));
        tokio::fs::write(&temp_path, &encoded)
            .await
            .map_err(StoreError::Write)?;
        tokio::fs::rename(&temp_path, &path)
            .await
            .map_err(StoreError::Write)?;

        self.memory.insert(key.to_string(), payload).await;
        debug!(key, bytes = record.payload.len(), "stored tile");
        Ok(())
    }

    /// Exact-key lookup.
    ///
    /// Returns `Ok(None)` for absent keys and for records that fail to
    /// decode (logged as a warning). Variant-key fallback lives in the
    /// resolver, not here.
    pub async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        if let Some(payload) = self.memory.get(key).await {
            return Ok(Some(payload));
        }

        self.init().await?;
        let path = self.key_path(key);
        let encoded = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Read(e)),
        };

        match decode_record(&path, &encoded) {
            // Hash-prefix collisions store a different key in the record;
            // treat those as a miss.
            Some(record) if record.key == key => {
                let payload = Bytes::from(record.payload);
                self.memory.insert(key.to_string(), payload.clone()).await;
                Ok(Some(payload))
            }
            _ => Ok(None),
        }
    }

    /// Delete all records.
    pub async fn clear(&self) -> Result<(), StoreError> {
        self.init().await?;
        let mut entries = tokio::fs::read_dir(&self.directory)
            .await
            .map_err(StoreError::Read)?;
        let mut deleted = 0u64;
        while let Some(entry) = entries.next_entry().await.map_err(StoreError::Read)? {
            let path = entry.path();
            if is_record_file(&path) {
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(StoreError::Write)?;
                deleted += 1;
            }
        }
        self.memory.invalidate_all();
        info!(deleted, "tile cache cleared");
        Ok(())
    }

    /// Delete records whose `stored_at` is older than `max_age_days`.
    pub async fn clear_older_than(&self, max_age_days: u32) -> Result<EvictionResult, StoreError> {
        self.init().await?;
        let cutoff_ms = Utc::now().timestamp_millis() - i64::from(max_age_days) * 86_400_000;

        let mut result = EvictionResult::default();
        let mut entries = tokio::fs::read_dir(&self.directory)
            .await
            .map_err(StoreError::Read)?;

        while let Some(entry) = entries.next_entry().await.map_err(StoreError::Read)? {
            let path = entry.path();
            if !is_record_file(&path) {
                continue;
            }
            let Ok(encoded) = tokio::fs::read(&path).await else {
                continue;
            };
            let Some(record) = decode_record(&path, &encoded) else {
                continue;
            };
            if record.stored_at_ms < cutoff_ms {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {
                        result.deleted_count += 1;
                        result.deleted_bytes += record.payload.len() as u64;
                        self.memory.invalidate(&record.key).await;
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "failed to evict tile");
                    }
                }
            }
        }

        info!(
            deleted = result.deleted_count,
            bytes = result.deleted_bytes,
            max_age_days,
            "old tiles evicted"
        );
        Ok(result)
    }

    /// Full-scan size accounting.
    ///
    /// Size is derived from payload lengths. Records that fail to decode
    /// are warned about and skipped; the aggregate never aborts on them.
    pub async fn compute_size(&self) -> Result<CacheSize, StoreError> {
        self.init().await?;
        let mut size = CacheSize::default();
        let mut entries = tokio::fs::read_dir(&self.directory)
            .await
            .map_err(StoreError::Read)?;

        while let Some(entry) = entries.next_entry().await.map_err(StoreError::Read)? {
            let path = entry.path();
            if !is_record_file(&path) {
                continue;
            }
            let Ok(encoded) = tokio::fs::read(&path).await else {
                warn!(path = %path.display(), "unreadable record skipped in size scan");
                continue;
            };
            match decode_record(&path, &encoded) {
                Some(record) => {
                    size.total_bytes += record.payload.len() as u64;
                    size.tile_count += 1;
                }
                None => {
                    // decode_record already warned
                }
            }
        }

        debug!(
            bytes = size.total_bytes,
            tiles = size.tile_count,
            "cache size computed"
        );
        Ok(size)
    }

    /// One-time key migration: re-keys records stored under rotated
    /// subdomain URLs to their canonical key, preserving payload and
    /// timestamp.
    ///
    /// Safe to run repeatedly (a no-op once all keys are canonical) and
    /// concurrently with reads.
    ///
    /// # Returns
    ///
    /// The number of records migrated.
    pub async fn migrate(&self) -> Result<u64, StoreError> {
        self.init().await?;
        let mut migrated = 0u64;
        let mut entries = tokio::fs::read_dir(&self.directory)
            .await
            .map_err(StoreError::Read)?;

        while let Some(entry) = entries.next_entry().await.map_err(StoreError::Read)? {
            let path = entry.path();
            if !is_record_file(&path) {
                continue;
            }
            let Ok(encoded) = tokio::fs::read(&path).await else {
                continue;
            };
            let Some(record) = decode_record(&path, &encoded) else {
                continue;
            };

            let canonical_key = canonical::canonicalize(&record.key);
            if canonical_key == record.key {
                continue;
            }

            let rekeyed = TileRecord {
                key: canonical_key.clone(),
                stored_at_ms: record.stored_at_ms,
                payload: record.payload,
            };
            let encoded = bincode::serialize(&rekeyed)
                .map_err(|e| StoreError::Encode(e.to_string()))?;
            let new_path = self.key_path(&canonical_key);
            let temp_path =
                new_path.with_extension(format!("tmp{:08x}", rand::rng().random::<u32>()));
            tokio::fs::write(&temp_path, &encoded)
                .await
                .map_err(StoreError::Write)?;
            tokio::fs::rename(&temp_path, &new_path)
                .await
                .map_err(StoreError::Write)?;
            tokio::fs::remove_file(&path)
                .await
                .map_err(StoreError::Write)?;

            self.memory.invalidate(&record.key).await;
            self.memory.invalidate(&rekeyed.key).await;
            migrated += 1;
        }

        info!(migrated, "tile keys migrated to canonical form");
        Ok(migrated)
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.directory.join(key_to_filename(key))
    }
}

/// Hash a cache key into a filesystem-safe filename.
fn key_to_filename(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    let mut name = String::with_capacity(37);
    for byte in &digest[..16] {
        name.push_str(&format!("{byte:02x}"));
    }
    name.push_str(".tile");
    name
}

fn is_record_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "tile")
}

fn decode_record(path: &Path, encoded: &[u8]) -> Option<TileRecord> {
    match bincode::deserialize(encoded) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt tile record skipped");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, TileStore) {
        let temp = TempDir::new().unwrap();
        let store = TileStore::new(temp.path());
        (temp, store)
    }

    #[tokio::test]
    async fn test_put_then_get_roundtrip() {
        let (_temp, store) = test_store();
        let key = "https://tile.openstreetmap.org/12/2200/1343.png";
        let payload = Bytes::from_static(b"not really a png");

        store.put(key, payload.clone()).await.unwrap();
        let read = store.get(key).await.unwrap();
        assert_eq!(read, Some(payload));
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let (_temp, store) = test_store();
        let read = store
            .get("https://tile.openstreetmap.org/1/0/0.png")
            .await
            .unwrap();
        assert!(read.is_none());
    }

    #[tokio::test]
    async fn test_get_survives_memory_layer_bypass() {
        // A fresh store instance over the same directory must hit disk.
        let (temp, store) = test_store();
        let key = "https://tile.opentopomap.org/11/1100/671.png";
        store.put(key, Bytes::from_static(b"abc")).await.unwrap();

        let reopened = TileStore::new(temp.path());
        let read = reopened.get(key).await.unwrap();
        assert_eq!(read, Some(Bytes::from_static(b"abc")));
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let (_temp, store) = test_store();
        let key = "https://tile.openstreetmap.org/12/1/1.png";
        store.put(key, Bytes::from_static(b"old")).await.unwrap();
        store.put(key, Bytes::from_static(b"new")).await.unwrap();
        assert_eq!(store.get(key).await.unwrap(), Some(Bytes::from_static(b"new")));
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let (_temp, store) = test_store();
        store.put("k1", Bytes::from_static(b"1")).await.unwrap();
        store.put("k2", Bytes::from_static(b"2")).await.unwrap();

        store.clear().await.unwrap();

        assert!(store.get("k1").await.unwrap().is_none());
        assert!(store.get("k2").await.unwrap().is_none());
        let size = store.compute_size().await.unwrap();
        assert_eq!(size.tile_count, 0);
    }

    #[tokio::test]
    async fn test_compute_size_counts_payload_bytes() {
        let (_temp, store) = test_store();
        store.put("k1", Bytes::from(vec![0u8; 100])).await.unwrap();
        store.put("k2", Bytes::from(vec![0u8; 50])).await.unwrap();

        let size = store.compute_size().await.unwrap();
        assert_eq!(size.tile_count, 2);
        assert_eq!(size.total_bytes, 150);
    }

    #[tokio::test]
    async fn test_compute_size_tolerates_corrupt_record() {
        let (temp, store) = test_store();
        store.put("k1", Bytes::from(vec![0u8; 100])).await.unwrap();
        std::fs::write(temp.path().join("deadbeef.tile"), b"garbage").unwrap();

        let size = store.compute_size().await.unwrap();
        assert_eq!(size.tile_count, 1);
        assert_eq!(size.total_bytes, 100);
    }

    #[tokio::test]
    async fn test_clear_older_than_cutoff() {
        let (temp, store) = test_store();
        store.put("fresh", Bytes::from(vec![0u8; 10])).await.unwrap();

        // Plant an aged record directly on disk.
        let old = TileRecord {
            key: "stale".to_string(),
            stored_at_ms: Utc::now().timestamp_millis() - 10 * 86_400_000,
            payload: vec![0u8; 40],
        };
        let encoded = bincode::serialize(&old).unwrap();
        std::fs::write(temp.path().join(key_to_filename("stale")), encoded).unwrap();

        let result = store.clear_older_than(7).await.unwrap();
        assert_eq!(result.deleted_count, 1);
        assert_eq!(result.deleted_bytes, 40);

        assert!(store.get("stale").await.unwrap().is_none());
        assert!(store.get("fresh").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_migrate_rekeys_variant_urls() {
        let (temp, store) = test_store();
        let variant = "https://a.tile.openstreetmap.org/12/2200/1343.png";
        let canonical_key = "https://tile.openstreetmap.org/12/2200/1343.png";

        // Legacy record stored under the rotated key.
        let legacy = TileRecord {
            key: variant.to_string(),
            stored_at_ms: 12345,
            payload: b"payload".to_vec(),
        };
        let encoded = bincode::serialize(&legacy).unwrap();
        std::fs::write(temp.path().join(key_to_filename(variant)), encoded).unwrap();

        let migrated = store.migrate().await.unwrap();
        assert_eq!(migrated, 1);

        assert!(store.get(variant).await.unwrap().is_none());
        assert_eq!(
            store.get(canonical_key).await.unwrap(),
            Some(Bytes::from_static(b"payload"))
        );

        // Timestamp preserved through migration.
        let raw = std::fs::read(temp.path().join(key_to_filename(canonical_key))).unwrap();
        let record: TileRecord = bincode::deserialize(&raw).unwrap();
        assert_eq!(record.stored_at_ms, 12345);
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let (_temp, store) = test_store();
        store
            .put(
                "https://tile.openstreetmap.org/1/0/0.png",
                Bytes::from_static(b"x"),
            )
            .await
            .unwrap();

        assert_eq!(store.migrate().await.unwrap(), 0);
        assert_eq!(store.migrate().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_writes_same_key() {
        let (_temp, store) = test_store();
        let store = std::sync::Arc::new(store);
        let key = "https://tile.openstreetmap.org/12/5/5.png";

        let writes = (0..8).map(|i| {
            let store = std::sync::Arc::clone(&store);
            async move { store.put(key, Bytes::from(vec![i as u8; 64])).await }
        });
        let results = futures::future::join_all(writes).await;
        assert!(results.into_iter().all(|r| r.is_ok()));

        // Last writer wins; the record must be intact.
        let read = store.get(key).await.unwrap().unwrap();
        assert_eq!(read.len(), 64);
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let (temp, store) = test_store();
        store.put("k", Bytes::from_static(b"v")).await.unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .is_some_and(|ext| ext.to_string_lossy().starts_with("tmp"))
            })
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_key_to_filename_safe_and_deterministic() {
        let a = key_to_filename("https://tile.openstreetmap.org/1/0/0.png");
        let b = key_to_filename("https://tile.openstreetmap.org/1/0/0.png");
        let c = key_to_filename("https://tile.openstreetmap.org/1/0/1.png");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.ends_with(".tile"));
        assert!(!a.contains('/'));
        assert!(!a.contains(':'));
    }
}
