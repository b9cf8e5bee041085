//! SkyTiles - offline map-tile caching for jump planning in the field.
//!
//! A persistent key-value store of raster map tiles keyed by canonical
//! source URL, a concurrent, retrying, cancellable bulk-fetch orchestrator
//! that populates it for a region and zoom range, and a read path that
//! falls back from network to cache (and across CDN subdomain variants)
//! when offline or on fetch failure.
//!
//! # Architecture
//!
//! - [`canonical`] - one storage identity per logical tile across CDN
//!   subdomain rotation
//! - [`coord`] / [`region`] - slippy-map projection and region/viewport
//!   tile enumeration
//! - [`store`] - the persistent tile store with size accounting, age
//!   eviction, and key migration
//! - [`fetch`] - HTTP transport with a fixed-attempt retry policy
//! - [`orchestrator`] - batched, cancellable bulk caching runs
//! - [`resolve`] - the per-tile read path with offline zoom policy
//! - [`service`] - the facade the map and settings UIs consume

pub mod canonical;
pub mod config;
pub mod coord;
pub mod fetch;
pub mod layer;
pub mod logging;
pub mod orchestrator;
pub mod region;
pub mod resolve;
pub mod service;
pub mod store;

pub use config::{CacheConfig, ConfigFile};
pub use coord::{LatLonBounds, TileCoord};
pub use layer::TileLayerDescriptor;
pub use orchestrator::{ProgressEvent, RunSummary};
pub use resolve::ResolveError;
pub use service::{LayerSpec, TileCacheService};
pub use store::{CacheSize, EvictionResult, TileStore};
