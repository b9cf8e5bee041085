//! Service facade over the caching core.
//!
//! `TileCacheService` wires the store, fetcher, orchestrator, and resolver
//! together and exposes the surface the map UI and settings UI consume:
//! bulk pre-fetch around a point, viewport caching, the per-tile read
//! path, and the maintenance operations.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::CacheConfig;
use crate::coord::{CoordError, LatLonBounds};
use crate::fetch::{FetchError, HttpClient, ReqwestClient, TileFetcher};
use crate::layer::TileLayerDescriptor;
use crate::orchestrator::{CacheRunner, ProgressEvent, RunSummary};
use crate::region;
use crate::resolve::{ResolveError, TileResolver};
use crate::store::{CacheSize, EvictionResult, StoreError, TileStore};

/// Raw layer input from the map collaborator, validated at this boundary.
#[derive(Debug, Clone)]
pub struct LayerSpec {
    /// Display name.
    pub name: String,
    /// URL template with `{z}`, `{x}`, `{y}` and optionally `{s}`.
    pub url_template: String,
    /// Rotating subdomains for `{s}` templates.
    pub subdomains: Option<Vec<String>>,
}

/// The caching core's public surface.
pub struct TileCacheService {
    store: Arc<TileStore>,
    runner: CacheRunner,
    resolver: TileResolver,
    config: CacheConfig,
}

impl TileCacheService {
    /// Create a service with the real HTTP transport.
    pub fn new(config: CacheConfig) -> Result<Self, FetchError> {
        let client = Arc::new(ReqwestClient::new(config.fetch_timeout)?);
        Ok(Self::with_client(config, client))
    }

    /// Create a service over an injected HTTP client (used by tests).
    pub fn with_client(config: CacheConfig, client: Arc<dyn HttpClient>) -> Self {
        let store = Arc::new(TileStore::new(config.cache_dir.clone()));
        let fetcher = Arc::new(TileFetcher::new(client, &config));
        let runner = CacheRunner::new(
            Arc::clone(&store),
            Arc::clone(&fetcher),
            config.clone(),
        );
        let resolver = TileResolver::new(Arc::clone(&store), Arc::clone(&fetcher), config.clone());
        Self {
            store,
            runner,
            resolver,
            config,
        }
    }

    /// Bulk pre-fetch: cache every tile within `radius_km` of a center
    /// point for the given zoom levels and layers.
    ///
    /// # Arguments
    ///
    /// * `lat` / `lon` - Center point (typically the landing point)
    /// * `radius_km` - Radius in kilometers
    /// * `zoom_levels` - Zoom levels to cover
    /// * `layers` - The active basemap's layers
    /// * `token` - Cancellation token; cancel to stop after the current batch
    /// * `progress` - Optional progress event channel
    pub async fn cache_region(
        &self,
        lat: f64,
        lon: f64,
        radius_km: f64,
        zoom_levels: &[u8],
        layers: &[LayerSpec],
        token: CancellationToken,
        progress: Option<UnboundedSender<ProgressEvent>>,
    ) -> Result<RunSummary, CoordError> {
        let tiles = region::tiles_in_radius(lat, lon, radius_km, zoom_levels)?;
        let (descriptors, mut warnings) = validate_layers(layers);

        let mut summary = self.runner.run(&tiles, &descriptors, token, progress).await;
        warnings.append(&mut summary.warnings);
        summary.warnings = warnings;
        Ok(summary)
    }

    /// Live caching: cache the tiles covering the current viewport at the
    /// current zoom. Intended to be called on pan/zoom settle (debounced
    /// by the caller); a no-op when `zoom` is not one of the configured
    /// cache zoom levels.
    pub async fn cache_viewport(
        &self,
        bounds: &LatLonBounds,
        zoom: u8,
        cache_zoom_levels: &[u8],
        layers: &[LayerSpec],
        token: CancellationToken,
        progress: Option<UnboundedSender<ProgressEvent>>,
    ) -> Result<RunSummary, CoordError> {
        if !cache_zoom_levels.contains(&zoom) {
            info!(zoom, "viewport zoom outside cache zoom levels, skipping");
            return Ok(RunSummary {
                message: format!("Zoom {zoom} is not cached."),
                ..RunSummary::default()
            });
        }

        let tiles = region::tiles_in_viewport(bounds, zoom)?;
        let (descriptors, mut warnings) = validate_layers(layers);

        let mut summary = self.runner.run(&tiles, &descriptors, token, progress).await;
        warnings.append(&mut summary.warnings);
        summary.warnings = warnings;
        Ok(summary)
    }

    /// Per-tile read path for the renderer.
    pub async fn resolve_tile(
        &self,
        url: &str,
        is_online: bool,
        zoom: u8,
    ) -> Result<Bytes, ResolveError> {
        self.resolver.resolve(url, is_online, zoom).await
    }

    /// Current cache size and tile count.
    pub async fn cache_size(&self) -> Result<CacheSize, StoreError> {
        self.store.compute_size().await
    }

    /// Delete all cached tiles.
    pub async fn clear_cache(&self) -> Result<(), StoreError> {
        self.store.clear().await
    }

    /// Delete tiles older than `days` (or the configured default).
    pub async fn evict_older_than(&self, days: Option<u32>) -> Result<EvictionResult, StoreError> {
        let days = days.unwrap_or(self.config.max_age_days);
        self.store.clear_older_than(days).await
    }

    /// Re-key legacy records to canonical keys.
    pub async fn migrate_keys(&self) -> Result<u64, StoreError> {
        self.store.migrate().await
    }
}

/// Validate layer specs, skipping invalid ones with a warning each.
fn validate_layers(layers: &[LayerSpec]) -> (Vec<TileLayerDescriptor>, Vec<String>) {
    let mut descriptors = Vec::with_capacity(layers.len());
    let mut warnings = Vec::new();

    for spec in layers {
        match TileLayerDescriptor::new(
            spec.name.clone(),
            spec.url_template.clone(),
            spec.subdomains.clone(),
        ) {
            Ok(descriptor) => descriptors.push(descriptor),
            Err(e) => {
                warn!(layer = %spec.name, error = %e, "skipping invalid layer");
                warnings.push(format!("Layer '{}' skipped: {e}", spec.name));
            }
        }
    }

    (descriptors, warnings)
}
