//! Configuration for the tile cache.
//!
//! `CacheConfig` groups the tunable parameters of the caching core and is
//! passed to the components that need them. Defaults match the values the
//! mobile app ships with. `ConfigFile` handles persistence of user-facing
//! settings in `~/.skytiles/config.ini`.

use std::path::PathBuf;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

/// Default pre-fetch radius around the landing point, in kilometers.
pub const DEFAULT_RADIUS_KM: f64 = 10.0;

/// Zoom levels cached by default and servable while offline.
pub const DEFAULT_CACHE_ZOOM_LEVELS: [u8; 4] = [11, 12, 13, 14];

/// Default maximum tile age before eviction, in days.
pub const DEFAULT_MAX_AGE_DAYS: u32 = 7;

/// Per-attempt network timeout for tile fetches.
pub const FETCH_TIMEOUT: Duration = Duration::from_millis(15_000);

/// Number of fetch attempts before a tile is reported as failed.
pub const MAX_FETCH_ATTEMPTS: u32 = 3;

/// Delay between fetch attempts.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Cache size above which a post-run warning is emitted.
pub const SIZE_WARNING_BYTES: u64 = 500 * 1024 * 1024;

/// Number of tile operations in flight per batch.
pub const BATCH_SIZE: usize = 20;

/// Pause between batches so tile servers are not hammered.
pub const BATCH_PAUSE: Duration = Duration::from_millis(250);

/// Progress is reported every this many processed tiles.
pub const PROGRESS_INTERVAL: u64 = 10;

/// Inclusive zoom band servable from the cache while offline.
pub const OFFLINE_ZOOM_BAND: (u8, u8) = (11, 14);

/// Runtime configuration for the caching core.
///
/// Construct with `CacheConfig::default()` and adjust with the `with_*`
/// builders where a caller needs non-default behavior (mostly tests).
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Directory holding the persisted tile records.
    pub cache_dir: PathBuf,

    /// Per-attempt network timeout.
    pub fetch_timeout: Duration,

    /// Fetch attempts per tile before giving up.
    pub max_fetch_attempts: u32,

    /// Delay between fetch attempts.
    pub retry_delay: Duration,

    /// Maximum tile age used by `evict_older_than` when no explicit
    /// value is supplied.
    pub max_age_days: u32,

    /// Cache size that triggers the post-run warning.
    pub size_warning_bytes: u64,

    /// Tile operations in flight per batch.
    pub batch_size: usize,

    /// Pause between batches.
    pub batch_pause: Duration,

    /// Inclusive zoom band servable offline.
    pub offline_zoom_band: (u8, u8),
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            fetch_timeout: FETCH_TIMEOUT,
            max_fetch_attempts: MAX_FETCH_ATTEMPTS,
            retry_delay: RETRY_DELAY,
            max_age_days: DEFAULT_MAX_AGE_DAYS,
            size_warning_bytes: SIZE_WARNING_BYTES,
            batch_size: BATCH_SIZE,
            batch_pause: BATCH_PAUSE,
            offline_zoom_band: OFFLINE_ZOOM_BAND,
        }
    }
}

impl CacheConfig {
    /// Set the cache directory.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Set the per-attempt fetch timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Set the number of fetch attempts.
    pub fn with_max_fetch_attempts(mut self, attempts: u32) -> Self {
        self.max_fetch_attempts = attempts;
        self
    }

    /// Set the delay between fetch attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the batch width for orchestrated runs.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set the pause between batches.
    pub fn with_batch_pause(mut self, pause: Duration) -> Self {
        self.batch_pause = pause;
        self
    }

    /// Set the size-warning threshold.
    pub fn with_size_warning_bytes(mut self, bytes: u64) -> Self {
        self.size_warning_bytes = bytes;
        self
    }

    /// Set the offline-servable zoom band (inclusive).
    pub fn with_offline_zoom_band(mut self, min: u8, max: u8) -> Self {
        self.offline_zoom_band = (min, max);
        self
    }

    /// True if `zoom` is inside the offline-servable band.
    pub fn zoom_servable_offline(&self, zoom: u8) -> bool {
        let (min, max) = self.offline_zoom_band;
        (min..=max).contains(&zoom)
    }
}

/// Default cache directory: `~/.skytiles/tiles`, falling back to a
/// relative path when the home directory cannot be determined.
pub fn default_cache_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".skytiles").join("tiles"))
        .unwrap_or_else(|| PathBuf::from(".skytiles/tiles"))
}

/// Path of the user settings file: `~/.skytiles/config.ini`.
pub fn config_file_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".skytiles").join("config.ini"))
        .unwrap_or_else(|| PathBuf::from(".skytiles/config.ini"))
}

/// Errors from loading or saving the settings file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The INI file could not be read or parsed.
    #[error("failed to read config file: {0}")]
    Read(#[from] ini::Error),

    /// The INI file could not be written.
    #[error("failed to write config file: {0}")]
    Write(#[from] std::io::Error),
}

/// User-facing settings persisted in `config.ini`.
///
/// These are the knobs the settings UI exposes; everything else in
/// [`CacheConfig`] stays at its compiled-in default.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigFile {
    /// Pre-fetch radius in kilometers.
    pub radius_km: f64,

    /// Zoom levels to cache.
    pub zoom_levels: Vec<u8>,

    /// Maximum tile age in days.
    pub max_age_days: u32,

    /// Cache size warning threshold in megabytes.
    pub size_warning_mb: u64,

    /// Cache directory override, if any.
    pub cache_dir: Option<PathBuf>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            radius_km: DEFAULT_RADIUS_KM,
            zoom_levels: DEFAULT_CACHE_ZOOM_LEVELS.to_vec(),
            max_age_days: DEFAULT_MAX_AGE_DAYS,
            size_warning_mb: SIZE_WARNING_BYTES / (1024 * 1024),
            cache_dir: None,
        }
    }
}

impl ConfigFile {
    /// Load settings from the default path, falling back to defaults when
    /// the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_file_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load settings from an explicit path.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path)?;
        let mut config = Self::default();

        if let Some(section) = ini.section(Some("cache")) {
            if let Some(radius) = section.get("radius_km").and_then(|v| v.parse().ok()) {
                config.radius_km = radius;
            }
            if let Some(levels) = section.get("zoom_levels") {
                let parsed: Vec<u8> = levels
                    .split(',')
                    .filter_map(|z| z.trim().parse().ok())
                    .collect();
                if !parsed.is_empty() {
                    config.zoom_levels = parsed;
                }
            }
            if let Some(days) = section.get("max_age_days").and_then(|v| v.parse().ok()) {
                config.max_age_days = days;
            }
            if let Some(mb) = section.get("size_warning_mb").and_then(|v| v.parse().ok()) {
                config.size_warning_mb = mb;
            }
            if let Some(dir) = section.get("directory") {
                config.cache_dir = Some(PathBuf::from(dir));
            }
        }

        Ok(config)
    }

    /// Save settings to an explicit path, creating parent directories.
    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut ini = Ini::new();
        let zoom_levels = self
            .zoom_levels
            .iter()
            .map(|z| z.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let mut section = ini.with_section(Some("cache"));
        let setter = section
            .set("radius_km", self.radius_km.to_string())
            .set("zoom_levels", zoom_levels)
            .set("max_age_days", self.max_age_days.to_string())
            .set("size_warning_mb", self.size_warning_mb.to_string());
        if let Some(dir) = &self.cache_dir {
            setter.set("directory", dir.display().to_string());
        }

        ini.write_to_file(path)?;
        Ok(())
    }

    /// Fold these settings into a [`CacheConfig`].
    pub fn to_cache_config(&self) -> CacheConfig {
        let mut config = CacheConfig::default()
            .with_size_warning_bytes(self.size_warning_mb * 1024 * 1024);
        config.max_age_days = self.max_age_days;
        if let Some(dir) = &self.cache_dir {
            config = config.with_cache_dir(dir.clone());
        }
        config
    }
}

/// Format a byte count for human-readable output (e.g. "12.34 MB").
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let bytes = bytes as f64;
    if bytes >= GB {
        format!("{:.2} GB", bytes / GB)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes / MB)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes / KB)
    } else {
        format!("{} B", bytes)
    }
}
