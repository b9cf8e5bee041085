//! Batch cache orchestration.
//!
//! Drives a bulk store-or-fetch-then-store run over an enumerated tile set
//! and the active basemap's layers. Layers are processed sequentially;
//! tiles within a layer fan out in fixed-size batches that are awaited
//! fully before the next batch starts. Cancellation is cooperative: the
//! token is polled at batch boundaries and before each tile operation, and
//! an in-flight fetch is allowed to finish.
//!
//! Identical canonical keys are not deduplicated within a run; overlapping
//! layers may fetch the same tile twice. Both writes land on the same key
//! without corruption, so the redundancy costs bandwidth, not correctness.

mod types;

pub use types::{ProgressEvent, RunSummary};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{CacheConfig, PROGRESS_INTERVAL};
use crate::coord::TileCoord;
use crate::fetch::TileFetcher;
use crate::layer::TileLayerDescriptor;
use crate::store::TileStore;

/// Orchestrates one bulk caching run.
pub struct CacheRunner {
    store: Arc<TileStore>,
    fetcher: Arc<TileFetcher>,
    config: CacheConfig,
}

/// Shared per-run counters.
struct RunState {
    processed: AtomicU64,
    cached: AtomicU64,
    failed: AtomicU64,
    failed_urls: Mutex<Vec<String>>,
}

impl CacheRunner {
    /// Create a runner over the shared store and fetcher.
    pub fn new(store: Arc<TileStore>, fetcher: Arc<TileFetcher>, config: CacheConfig) -> Self {
        Self {
            store,
            fetcher,
            config,
        }
    }

    /// Run the batch caching job.
    ///
    /// Progress events are delivered through `progress` every
    /// [`PROGRESS_INTERVAL`] processed tiles and on the final tile.
    /// Cancelling `token` stops further batches; the in-flight batch
    /// finishes. A summary is always produced, reflecting completion,
    /// partial failure, or cancellation.
    pub async fn run(
        &self,
        tiles: &[TileCoord],
        layers: &[TileLayerDescriptor],
        token: CancellationToken,
        progress: Option<UnboundedSender<ProgressEvent>>,
    ) -> RunSummary {
        let total = (tiles.len() * layers.len()) as u64;
        if total == 0 {
            return RunSummary {
                message: "No tiles to cache for this basemap.".to_string(),
                ..RunSummary::default()
            };
        }

        info!(
            tiles = tiles.len(),
            layers = layers.len(),
            total,
            "starting cache run"
        );

        let state = RunState {
            processed: AtomicU64::new(0),
            cached: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            failed_urls: Mutex::new(Vec::new()),
        };

        let mut cancelled = false;
        'layers: for layer in layers {
            if token.is_cancelled() {
                cancelled = true;
                break;
            }

            for batch in tiles.chunks(self.config.batch_size) {
                if token.is_cancelled() {
                    cancelled = true;
                    break 'layers;
                }

                join_all(batch.iter().map(|tile| {
                    self.process_tile(layer, tile, &state, &token, total, progress.as_ref())
                }))
                .await;

                if !self.config.batch_pause.is_zero() {
                    tokio::time::sleep(self.config.batch_pause).await;
                }
            }
        }
        cancelled = cancelled || token.is_cancelled();

        let cached_count = state.cached.load(Ordering::SeqCst);
        let failed_count = state.failed.load(Ordering::SeqCst);
        let failed_urls = std::mem::take(&mut *state.failed_urls.lock());

        let message = if cancelled {
            format!("Caching cancelled. {cached_count} tiles processed.")
        } else if failed_count > 0 {
            format!("Caching complete. {cached_count} tiles cached, {failed_count} failed")
        } else {
            format!("Caching complete. {cached_count} tiles cached.")
        };

        let mut warnings = Vec::new();
        match self.store.compute_size().await {
            Ok(size) => {
                if size.total_bytes > self.config.size_warning_bytes {
                    warnings.push(format!(
                        "Cache size {} exceeds the {} warning threshold. Consider clearing old tiles.",
                        crate::config::format_size(size.total_bytes),
                        crate::config::format_size(self.config.size_warning_bytes),
                    ));
                }
            }
            Err(e) => {
                warn!(error = %e, "post-run cache size check failed");
                warnings.push(format!("Could not determine cache size: {e}"));
            }
        }

        info!(cached_count, failed_count, cancelled, "cache run finished");

        RunSummary {
            cached_count,
            failed_count,
            failed_urls,
            cancelled,
            total_tiles: total,
            message,
            warnings,
        }
    }

    /// Store-or-fetch-then-store for one tile on one layer.
    async fn process_tile(
        &self,
        layer: &TileLayerDescriptor,
        tile: &TileCoord,
        state: &RunState,
        token: &CancellationToken,
        total: u64,
        progress: Option<&UnboundedSender<ProgressEvent>>,
    ) {
        if token.is_cancelled() {
            return;
        }

        let request_url = layer.request_url(tile);
        let canonical_url = layer.canonical_url(tile);

        let already_cached = match self.store.get(&canonical_url).await {
            Ok(hit) => hit.is_some(),
            Err(e) => {
                // Soft failure: fall through to the network.
                warn!(key = %canonical_url, error = %e, "store lookup failed during run");
                false
            }
        };

        if already_cached {
            state.cached.fetch_add(1, Ordering::SeqCst);
        } else {
            match self.fetcher.fetch_with_retry(&request_url).await {
                Ok(payload) => match self.store.put(&canonical_url, payload).await {
                    Ok(()) => {
                        state.cached.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(e) => {
                        // The bytes were fetched but not persisted; count
                        // the tile as failed for the summary.
                        warn!(key = %canonical_url, error = %e, "tile store write failed");
                        state.failed.fetch_add(1, Ordering::SeqCst);
                        state.failed_urls.lock().push(request_url.clone());
                    }
                },
                Err(e) => {
                    warn!(url = %request_url, error = %e, "tile fetch failed");
                    state.failed.fetch_add(1, Ordering::SeqCst);
                    state.failed_urls.lock().push(request_url.clone());
                }
            }
        }

        let processed = state.processed.fetch_add(1, Ordering::SeqCst) + 1;
        if processed % PROGRESS_INTERVAL == 0 || processed == total {
            if let Some(sender) = progress {
                let _ = sender.send(ProgressEvent { processed, total });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::tests::FlakyClient;
    use crate::fetch::{BoxFuture, FetchError, HttpClient};
    use bytes::Bytes;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;
    use tempfile::TempDir;

    fn fast_config(dir: &TempDir) -> CacheConfig {
        CacheConfig::default()
            .with_cache_dir(dir.path())
            .with_retry_delay(Duration::from_millis(1))
            .with_batch_pause(Duration::ZERO)
            .with_batch_size(10)
    }

    fn osm_layer() -> TileLayerDescriptor {
        TileLayerDescriptor::new(
            "OpenStreetMap",
            "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png",
            Some(vec!["a".into(), "b".into(), "c".into()]),
        )
        .unwrap()
    }

    fn tiles(count: u32) -> Vec<TileCoord> {
        (0..count)
            .map(|i| TileCoord {
                zoom: 12,
                x: 2000 + i,
                y: 1300,
            })
            .collect()
    }

    fn runner_with(client: Arc<dyn HttpClient>, config: CacheConfig) -> CacheRunner {
        let store = Arc::new(TileStore::new(config.cache_dir.clone()));
        let fetcher = Arc::new(TileFetcher::new(client, &config));
        CacheRunner::new(store, fetcher, config)
    }

    #[tokio::test]
    async fn test_all_tiles_cached_on_success() {
        let temp = TempDir::new().unwrap();
        let runner = runner_with(
            Arc::new(FlakyClient::failing_first(0)),
            fast_config(&temp),
        );

        let tiles = tiles(25);
        let summary = runner
            .run(&tiles, &[osm_layer()], CancellationToken::new(), None)
            .await;

        assert_eq!(summary.cached_count, 25);
        assert_eq!(summary.failed_count, 0);
        assert!(!summary.cancelled);
        assert_eq!(summary.message, "Caching complete. 25 tiles cached.");

        let size = runner.store.compute_size().await.unwrap();
        assert_eq!(size.tile_count, 25);
    }

    #[tokio::test]
    async fn test_cache_hits_skip_network() {
        let temp = TempDir::new().unwrap();
        let config = fast_config(&temp);
        let client = Arc::new(FlakyClient::failing_first(0));
        let runner = runner_with(client.clone(), config);

        let tiles = tiles(5);
        let layer = osm_layer();
        for tile in &tiles {
            runner
                .store
                .put(&layer.canonical_url(tile), Bytes::from_static(b"cached"))
                .await
                .unwrap();
        }

        let summary = runner
            .run(&tiles, &[layer], CancellationToken::new(), None)
            .await;

        assert_eq!(summary.cached_count, 5);
        assert_eq!(client.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failures_counted_and_listed() {
        let temp = TempDir::new().unwrap();
        let runner = runner_with(
            Arc::new(FlakyClient::failing_first(u32::MAX)),
            fast_config(&temp),
        );

        let tiles = tiles(4);
        let summary = runner
            .run(&tiles, &[osm_layer()], CancellationToken::new(), None)
            .await;

        assert_eq!(summary.cached_count, 0);
        assert_eq!(summary.failed_count, 4);
        assert_eq!(summary.failed_urls.len(), 4);
        assert_eq!(summary.message, "Caching complete. 0 tiles cached, 4 failed");
    }

    /// Client that cancels the run token on its first call.
    struct CancellingClient {
        token: CancellationToken,
        calls: AtomicU32,
    }

    impl HttpClient for CancellingClient {
        fn get(&self, _url: &str) -> BoxFuture<'_, Result<Bytes, FetchError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.token.cancel();
            Box::pin(async { Ok(Bytes::from_static(b"tile")) })
        }
    }

    #[tokio::test]
    async fn test_cancel_stops_future_batches() {
        let temp = TempDir::new().unwrap();
        let config = fast_config(&temp);
        let token = CancellationToken::new();
        let client = Arc::new(CancellingClient {
            token: token.clone(),
            calls: AtomicU32::new(0),
        });
        let runner = runner_with(client.clone(), config);

        let tiles = tiles(50);
        let summary = runner.run(&tiles, &[osm_layer()], token, None).await;

        assert!(summary.cancelled);
        // Only the in-flight batch of 10 issued fetches.
        assert_eq!(client.calls.load(Ordering::SeqCst), 10);
        assert!(summary.message.contains("cancelled"));
        assert_eq!(summary.cached_count, 10);
    }

    #[tokio::test]
    async fn test_progress_cadence() {
        let temp = TempDir::new().unwrap();
        let runner = runner_with(
            Arc::new(FlakyClient::failing_first(0)),
            fast_config(&temp),
        );

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let tiles = tiles(25);
        runner
            .run(&tiles, &[osm_layer()], CancellationToken::new(), Some(tx))
            .await;

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.total, 25);
            seen.push(event.processed);
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![10, 20, 25]);
    }

    #[tokio::test]
    async fn test_size_warning_emitted() {
        let temp = TempDir::new().unwrap();
        let config = fast_config(&temp).with_size_warning_bytes(1);
        let runner = runner_with(Arc::new(FlakyClient::failing_first(0)), config);

        let tiles = tiles(3);
        let summary = runner
            .run(&tiles, &[osm_layer()], CancellationToken::new(), None)
            .await;

        assert!(summary
            .warnings
            .iter()
            .any(|w| w.contains("warning threshold")));
    }

    #[tokio::test]
    async fn test_empty_run_summary() {
        let temp = TempDir::new().unwrap();
        let runner = runner_with(
            Arc::new(FlakyClient::failing_first(0)),
            fast_config(&temp),
        );

        let summary = runner
            .run(&[], &[osm_layer()], CancellationToken::new(), None)
            .await;
        assert_eq!(summary.message, "No tiles to cache for this basemap.");
        assert_eq!(summary.total_tiles, 0);
    }

    #[tokio::test]
    async fn test_two_layers_processed_sequentially() {
        let temp = TempDir::new().unwrap();
        let runner = runner_with(
            Arc::new(FlakyClient::failing_first(0)),
            fast_config(&temp),
        );

        let carto = TileLayerDescriptor::new(
            "Carto",
            "https://{s}.basemaps.cartocdn.com/light_all/{z}/{x}/{y}.png",
            Some(vec!["a".into(), "b".into(), "c".into(), "d".into()]),
        )
        .unwrap();

        let tiles = tiles(6);
        let summary = runner
            .run(&tiles, &[osm_layer(), carto], CancellationToken::new(), None)
            .await;

        assert_eq!(summary.total_tiles, 12);
        assert_eq!(summary.cached_count, 12);

        // Distinct canonical keys per layer.
        let size = runner.store.compute_size().await.unwrap();
        assert_eq!(size.tile_count, 12);
    }
}
