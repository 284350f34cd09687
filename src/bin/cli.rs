//! Mint discovery CLI
//!
//! Local execution entry point for discovery runs and cache maintenance.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use mint_discovery::{
    error::{AppError, Result},
    models::{Config, ExportData, Recommendation},
    pipeline::{DiscoverOptions, MintDiscovery, Progress},
    source::MemoryEventSource,
    storage,
};

/// mint-discovery - Cashu mint discovery and ranking
#[derive(Parser, Debug)]
#[command(
    name = "mint-discovery",
    version,
    about = "Discover and rank Cashu mints from published reviews"
)]
struct Cli {
    /// Path to storage directory holding config.toml and the cache
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a discovery cycle and print ranked mints
    Discover {
        /// JSON file with an array of events to ingest
        #[arg(long)]
        events: Option<PathBuf>,

        /// Do not fetch /v1/info from mints
        #[arg(long)]
        skip_fetch: bool,

        /// Print recommendations as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fetch /v1/info for the given mint urls
    Fetch {
        /// Mint base urls
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Show cache statistics
    Stats,

    /// Export cached reviews and info documents as JSON
    Export {
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Import a previously exported JSON file into the cache
    Import {
        /// Export file to read
        file: PathBuf,
    },

    /// Remove all cached data
    Clear,

    /// Validate configuration
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.storage_dir.join("config.toml");
    let mut config = if config_path.exists() {
        Config::load_or_default(&config_path)
    } else {
        Config::default()
    };
    config.storage.dir = cli.storage_dir.clone();

    log::debug!("Using storage directory {}", cli.storage_dir.display());

    let storage = storage::open(&config.storage);

    match cli.command {
        Command::Discover {
            events,
            skip_fetch,
            json,
        } => {
            let source = match events {
                Some(path) => MemoryEventSource::load(&path).await?,
                None => {
                    log::warn!("No events file given, using cached data only");
                    MemoryEventSource::new()
                }
            };

            let discovery = MintDiscovery::from_config(&config, Arc::new(source))?;
            let on_progress = |progress: &Progress| match progress {
                Progress::Fetched { url, error: true } => log::debug!("Fetch failed: {}", url),
                Progress::Fetched { .. } => {}
                other => log::info!("Phase: {}", other),
            };
            let recommendations = discovery
                .discover(DiscoverOptions {
                    skip_http_fetch: skip_fetch,
                    on_progress: Some(&on_progress),
                })
                .await;

            if json {
                println!("{}", serde_json::to_string_pretty(&recommendations)?);
            } else {
                print_recommendations(&recommendations);
            }
            discovery.close().await;
        }

        Command::Fetch { urls } => {
            let discovery = MintDiscovery::from_config(&config, Arc::new(MemoryEventSource::new()))?;
            let results = discovery.fetch_info(&urls).await;

            for result in &results {
                let name = result
                    .info
                    .as_ref()
                    .and_then(|info| info.get("name"))
                    .and_then(|name| name.as_str())
                    .unwrap_or("-");
                let status = if result.error { "error" } else { "ok" };
                println!("{:<6} {:<50} {}", status, result.url, name);
            }
            log::info!("Fetched {} mints", results.len());
        }

        Command::Stats => {
            let discovery = MintDiscovery::from_config(&config, Arc::new(MemoryEventSource::new()))?;
            discovery.load_from_storage().await;
            let stats = discovery.stats();

            log::info!("Storage directory: {}", cli.storage_dir.display());
            println!("Mints:               {}", stats.mint_count);
            println!("Reviews:             {}", stats.total_reviews);
            println!("Mints with reviews:  {}", stats.mints_with_reviews);
            println!("Mints with metadata: {}", stats.mints_with_metadata);
            println!("Mints with info:     {}", stats.mints_with_fetch_result);
        }

        Command::Export { output } => {
            let discovery = MintDiscovery::from_config(&config, Arc::new(MemoryEventSource::new()))?;
            discovery.load_from_storage().await;
            let json = serde_json::to_string_pretty(&discovery.export_data())?;

            match output {
                Some(path) => {
                    tokio::fs::write(&path, json).await?;
                    log::info!("Export saved to {}", path.display());
                }
                None => println!("{}", json),
            }
        }

        Command::Import { file } => {
            let Some(storage) = &storage else {
                log::warn!("Storage is disabled, nothing to import into");
                return Ok(());
            };
            let data = read_export(&file).await?;
            let discovery = MintDiscovery::from_config(&config, Arc::new(MemoryEventSource::new()))?;
            discovery.import_data(data);

            let merged = discovery.export_data();
            let reviews: Vec<_> = merged
                .reviews
                .into_iter()
                .flat_map(|group| {
                    let url = group.url;
                    group
                        .reviews
                        .into_iter()
                        .map(move |review| review.into_review(&url))
                })
                .collect();
            storage.save_reviews(&reviews).await?;
            for result in &merged.http_info {
                storage.save_fetch_result(&result.url, result).await?;
            }

            log::info!(
                "Imported {} reviews and {} info documents from {}",
                reviews.len(),
                merged.http_info.len(),
                file.display()
            );
        }

        Command::Clear => {
            match &storage {
                Some(storage) => {
                    storage.clear_all().await?;
                    log::info!("Cache cleared in {}", cli.storage_dir.display());
                }
                None => log::info!("Storage is disabled, nothing to clear"),
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("Config OK");
        }
    }

    Ok(())
}

async fn read_export(path: &Path) -> Result<ExportData> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        AppError::config(format!("Cannot read export file {}: {}", path.display(), e))
    })?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn print_recommendations(recommendations: &[Recommendation]) {
    if recommendations.is_empty() {
        log::info!("No mints discovered");
        return;
    }

    println!("{:<4} {:<50} {:>7} {:>6}  {}", "#", "URL", "REVIEWS", "RATING", "INFO");
    for (i, rec) in recommendations.iter().enumerate() {
        let rating = rec
            .average_rating
            .map(|r| format!("{r:.2}"))
            .unwrap_or_else(|| "-".to_string());
        let info = match (&rec.info, rec.error) {
            (_, true) => "error",
            (Some(_), false) => "ok",
            (None, false) => "-",
        };
        println!(
            "{:<4} {:<50} {:>7} {:>6}  {}",
            i + 1,
            rec.url,
            rec.reviews_count,
            rating,
            info
        );
    }
}
