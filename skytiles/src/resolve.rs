//! Read-path tile resolution.
//!
//! Called by the tile renderer per draw request. Decides, from the
//! connectivity signal and the offline zoom policy, whether a tile comes
//! from the network or the store, and probes legacy variant keys when the
//! canonical key misses. The render path stays responsive: online fetches
//! are single-attempt, and persistence of fetched tiles happens in the
//! background.

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, warn};

use crate::canonical;
use crate::config::CacheConfig;
use crate::fetch::{FetchError, TileFetcher};
use crate::store::TileStore;

/// Errors from tile resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Offline and the requested zoom is outside the servable band.
    /// A policy rejection, not a failure.
    #[error("offline: zoom {zoom} outside cached band {min}-{max}")]
    ZoomRestricted {
        /// Requested zoom level.
        zoom: u8,
        /// Lower bound of the servable band.
        min: u8,
        /// Upper bound of the servable band.
        max: u8,
    },

    /// The tile is in neither the store nor (while offline) reachable.
    /// Expected while offline in uncached areas; not logged as an error.
    #[error("tile not cached: {0}")]
    CacheMiss(String),

    /// Online fetch failed and the store had no fallback copy.
    #[error("tile fetch failed: {0}")]
    Fetch(#[from] FetchError),
}

/// Per-tile read path for the renderer.
pub struct TileResolver {
    store: Arc<TileStore>,
    fetcher: Arc<TileFetcher>,
    config: CacheConfig,
}

impl TileResolver {
    /// Create a resolver over the shared store and fetcher.
    pub fn new(store: Arc<TileStore>, fetcher: Arc<TileFetcher>, config: CacheConfig) -> Self {
        Self {
            store,
            fetcher,
            config,
        }
    }

    /// Resolve one tile request.
    ///
    /// Offline, zoom outside the servable band: fails immediately with
    /// [`ResolveError::ZoomRestricted`], no store access. Offline in
    /// band: canonical store lookup with variant fallback. Online:
    /// single-attempt network fetch with background persistence, falling
    /// back to the store on failure; if the store also misses, the
    /// original fetch error surfaces.
    pub async fn resolve(
        &self,
        url: &str,
        is_online: bool,
        zoom: u8,
    ) -> Result<Bytes, ResolveError> {
        if !is_online && !self.config.zoom_servable_offline(zoom) {
            let (min, max) = self.config.offline_zoom_band;
            debug!(url, zoom, "offline tile request outside cached zoom band");
            return Err(ResolveError::ZoomRestricted { zoom, min, max });
        }

        let canonical_url = canonical::canonicalize(url);

        if !is_online {
            return self
                .lookup_with_variants(&canonical_url)
                .await
                .ok_or_else(|| ResolveError::CacheMiss(canonical_url));
        }

        match self.fetcher.fetch_once(url).await {
            Ok(payload) => {
                self.persist_in_background(canonical_url, payload.clone());
                Ok(payload)
            }
            Err(fetch_error) => {
                debug!(url, error = %fetch_error, "render fetch failed, trying cache");
                match self.lookup_with_variants(&canonical_url).await {
                    Some(payload) => Ok(payload),
                    None => Err(ResolveError::Fetch(fetch_error)),
                }
            }
        }
    }

    /// Canonical lookup, then each rotated-subdomain variant in order.
    ///
    /// Variant keys only exist for records written before key migration;
    /// the probe order is deterministic, first hit wins.
    async fn lookup_with_variants(&self, canonical_url: &str) -> Option<Bytes> {
        match self.store.get(canonical_url).await {
            Ok(Some(payload)) => return Some(payload),
            Ok(None) => {}
            Err(e) => warn!(key = %canonical_url, error = %e, "store read failed"),
        }

        for variant in canonical::variants(canonical_url) {
            match self.store.get(&variant).await {
                Ok(Some(payload)) => {
                    debug!(key = %variant, "tile served from pre-migration variant key");
                    return Some(payload);
                }
                Ok(None) => {}
                Err(e) => warn!(key = %variant, error = %e, "store read failed"),
            }
        }

        None
    }

    /// Fire-and-forget store write; failures are logged only.
    fn persist_in_background(&self, key: String, payload: Bytes) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(e) = store.put(&key, payload).await {
                warn!(key = %key, error = %e, "background tile persist failed");
            }
        });
    }
}
