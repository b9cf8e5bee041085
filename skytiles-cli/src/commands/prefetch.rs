//! Prefetch command - bulk-cache tiles around a landing point.

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::info;

use skytiles::config::{format_size, ConfigFile};
use skytiles::{LayerSpec, TileCacheService};

use crate::error::CliError;

/// Arguments for the prefetch command.
#[derive(Debug, Args)]
pub struct PrefetchArgs {
    /// Latitude of the center point in decimal degrees
    #[arg(long)]
    pub lat: f64,

    /// Longitude of the center point in decimal degrees
    #[arg(long)]
    pub lon: f64,

    /// Radius to cover in kilometers (defaults to the configured radius)
    #[arg(long)]
    pub radius: Option<f64>,

    /// Zoom levels to cache (defaults to the configured levels)
    #[arg(long, value_delimiter = ',')]
    pub zoom: Option<Vec<u8>>,

    /// Tile URL template ({z}/{x}/{y}, optional {s})
    #[arg(
        long,
        default_value = "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png"
    )]
    pub url: String,

    /// Rotating subdomains for {s} templates
    #[arg(long, value_delimiter = ',', default_value = "a,b,c")]
    pub subdomains: Vec<String>,

    /// Layer display name
    #[arg(long, default_value = "OpenStreetMap")]
    pub name: String,
}

/// Run the prefetch command.
pub async fn run(args: PrefetchArgs) -> Result<(), CliError> {
    let config = ConfigFile::load().unwrap_or_default();
    let radius_km = args.radius.unwrap_or(config.radius_km);
    let zoom_levels = args.zoom.unwrap_or_else(|| config.zoom_levels.clone());
    let cache_config = config.to_cache_config();

    println!("SkyTiles Prefetch v{}", env!("CARGO_PKG_VERSION"));
    println!("==================");
    println!();
    println!("Center: {}, {}", args.lat, args.lon);
    println!("Radius: {} km", radius_km);
    println!(
        "Zoom:   {}",
        zoom_levels
            .iter()
            .map(|z| z.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("Layer:  {} ({})", args.name, args.url);
    println!("Cache:  {}", cache_config.cache_dir.display());
    println!();

    let service = TileCacheService::new(cache_config)
        .map_err(|e| CliError::ServiceCreation(e.to_string()))?;

    let layer = LayerSpec {
        name: args.name,
        url_template: args.url,
        subdomains: if args.subdomains.is_empty() {
            None
        } else {
            Some(args.subdomains)
        },
    };

    // Ctrl-C cancels after the in-flight batch.
    let token = CancellationToken::new();
    let ctrlc_token = token.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nCancelling after the current batch...");
        ctrlc_token.cancel();
    })
    .map_err(|e| CliError::Config(format!("failed to install Ctrl-C handler: {e}")))?;

    let (progress_tx, mut progress_rx) =
        tokio::sync::mpsc::unbounded_channel::<skytiles::ProgressEvent>();
    let bar = ProgressBar::new(0).with_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} tiles {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    let bar_task = {
        let bar = bar.clone();
        tokio::spawn(async move {
            while let Some(event) = progress_rx.recv().await {
                bar.set_length(event.total);
                bar.set_position(event.processed);
            }
        })
    };

    let summary = service
        .cache_region(
            args.lat,
            args.lon,
            radius_km,
            &zoom_levels,
            &[layer],
            token,
            Some(progress_tx),
        )
        .await?;

    let _ = bar_task.await;
    bar.finish_and_clear();
    info!(
        cached = summary.cached_count,
        failed = summary.failed_count,
        cancelled = summary.cancelled,
        "prefetch run finished"
    );

    println!("{}", summary.message);
    for warning in &summary.warnings {
        println!("Warning: {}", warning);
    }
    if !summary.failed_urls.is_empty() {
        println!();
        println!("Failed tiles:");
        for url in summary.failed_urls.iter().take(10) {
            println!("  {}", url);
        }
        if summary.failed_urls.len() > 10 {
            println!("  ... and {} more", summary.failed_urls.len() - 10);
        }
    }

    let size = service.cache_size().await?;
    println!();
    println!(
        "Cache now holds {} tiles ({})",
        size.tile_count,
        format_size(size.total_bytes)
    );

    Ok(())
}
