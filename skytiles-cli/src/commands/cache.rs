//! Cache maintenance CLI commands.

use clap::Subcommand;
use skytiles::config::{format_size, CacheConfig, ConfigFile};
use skytiles::TileStore;

use crate::error::CliError;

/// Cache action subcommands.
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Show tile cache statistics
    Stats,
    /// Clear the tile cache, removing all cached tiles
    Clear,
    /// Evict tiles older than the retention limit
    Evict {
        /// Age cutoff in days (defaults to the configured retention)
        #[arg(long)]
        days: Option<u32>,
    },
    /// Re-key tiles stored under legacy CDN-subdomain URLs
    Migrate,
}

/// Run a cache subcommand against the configured store.
pub async fn run(action: CacheAction) -> Result<(), CliError> {
    let config = ConfigFile::load().unwrap_or_default();
    let cache_config = config.to_cache_config();
    let store = TileStore::new(cache_config.cache_dir.clone());
    execute(&store, &cache_config, action).await
}

/// Run a cache subcommand against an explicit store and config.
async fn execute(
    store: &TileStore,
    config: &CacheConfig,
    action: CacheAction,
) -> Result<(), CliError> {
    match action {
        CacheAction::Stats => {
            println!("Tile cache: {}", config.cache_dir.display());

            let size = store.compute_size().await?;
            println!("  Tiles: {}", size.tile_count);
            println!("  Size:  {}", format_size(size.total_bytes));
            Ok(())
        }
        CacheAction::Clear => {
            println!("Clearing tile cache at: {}", config.cache_dir.display());

            let before = store.compute_size().await?;
            store.clear().await?;
            println!(
                "Deleted {} tiles, freed {}",
                before.tile_count,
                format_size(before.total_bytes)
            );
            Ok(())
        }
        CacheAction::Evict { days } => {
            let days = days.unwrap_or(config.max_age_days);
            println!("Evicting tiles older than {} days...", days);

            let result = store.clear_older_than(days).await?;
            println!(
                "Deleted {} tiles, freed {}",
                result.deleted_count,
                format_size(result.deleted_bytes)
            );
            Ok(())
        }
        CacheAction::Migrate => {
            println!("Migrating legacy tile keys...");

            let migrated = store.migrate().await?;
            if migrated == 0 {
                println!("No legacy keys found.");
            } else {
                println!("Migrated {} tiles to canonical keys.", migrated);
            }
            Ok(())
        }
    }
}
