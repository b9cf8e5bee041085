//! SkyTiles CLI - offline map-tile cache management.
//!
//! Pre-fetches tiles around a landing point and maintains the persistent
//! tile store from the command line.

mod commands;
mod error;

use clap::{Parser, Subcommand};

use commands::cache::CacheAction;
use commands::prefetch::PrefetchArgs;

#[derive(Parser)]
#[command(name = "skytiles")]
#[command(about = "Cache map tiles for offline use in the field", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download and cache all tiles around a point for offline use
    Prefetch(PrefetchArgs),
    /// Inspect and maintain the tile cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Keep the file-appender guard alive for the process lifetime.
    let _logging = init_logging();

    let result = match cli.command {
        Command::Prefetch(args) => commands::prefetch::run(args).await,
        Command::Cache { action } => commands::cache::run(action).await,
    };

    if let Err(e) = result {
        e.exit();
    }
}

fn init_logging() -> Option<skytiles::logging::LoggingGuard> {
    let log_dir = dirs::home_dir()
        .unwrap_or_else(|| ".".into())
        .join(".skytiles")
        .join("logs");

    match skytiles::logging::init_logging(&log_dir.to_string_lossy(), "skytiles.log") {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: failed to initialize logging: {}", e);
            None
        }
    }
}
