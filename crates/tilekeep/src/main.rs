use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tilekeep_core::{
    acquisition::AcquisitionOrchestrator,
    config::Config,
    cropping::CropOrchestrator,
    db::Store,
    extract::ZipExtractor,
    filters::SearchFilters,
    geocode::{CountryResolver, GeoJsonCountryResolver, UnknownCountry},
    ingestion,
    providers::LocalCatalogueProvider,
    raster::GdalCropper,
    types::{Platform, PoiRequest},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Tilekeep satellite tile acquisition pipeline", long_about = None)]
struct Cli {
    /// Optional TOML configuration file; environment variables otherwise
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialise or migrate the tile store schema
    Migrate,
    /// Search, register, download and unpack tiles for a point of interest
    Fetch(FetchArgs),
    /// Revisit tiles stuck before download/unpack completion
    Resume(ProviderArgs),
    /// Crop every POI/tile pair whose tile is unpacked
    Crop,
    /// Stage request rows from CSV files
    ImportCsv(ImportCsvArgs),
    /// Drain staged CSV requests through the acquisition pipeline
    ProcessCsv(ProviderArgs),
}

#[derive(Args, Debug)]
struct ProviderArgs {
    /// Local product catalogue (JSON) backing the provider adapter
    #[arg(long)]
    catalogue: PathBuf,
}

#[derive(Args, Debug)]
struct FetchArgs {
    #[command(flatten)]
    provider: ProviderArgs,

    /// Group the request belongs to
    #[arg(long)]
    group: String,
    /// Latitude of the point of interest (decimal degrees)
    #[arg(long)]
    lat: f64,
    /// Longitude of the point of interest (decimal degrees)
    #[arg(long)]
    lon: f64,
    /// Start of the sensing window (ISO date)
    #[arg(long)]
    date_from: NaiveDate,
    /// End of the sensing window (ISO date)
    #[arg(long)]
    date_to: NaiveDate,
    /// Platform, e.g. Sentinel-2 or S2
    #[arg(long)]
    platform: Platform,

    #[arg(long)]
    polarisation_mode: Option<String>,
    #[arg(long)]
    product_type: Option<String>,
    #[arg(long)]
    sensor_mode: Option<String>,
    #[arg(long)]
    swath: Option<String>,
    /// Maximum cloud cover percentage (optical platforms)
    #[arg(long)]
    cloud_cover: Option<i64>,
    #[arg(long)]
    timeliness: Option<String>,
    #[arg(long)]
    orbit_direction: Option<String>,

    /// Crop width in meters; omit together with --height for download-only
    #[arg(long, requires = "height")]
    width: Option<i64>,
    /// Crop height in meters
    #[arg(long, requires = "width")]
    height: Option<i64>,
    #[arg(long, default_value_t = 1)]
    tile_limit: i64,
    #[arg(long, default_value_t = 0)]
    tile_start: i64,
    #[arg(long)]
    description: Option<String>,
    /// Register and download only; skip the crop pass of this invocation
    #[arg(long)]
    skip_crop: bool,
}

#[derive(Args, Debug)]
struct ImportCsvArgs {
    /// CSV files or glob patterns to stage
    #[arg(required = true)]
    patterns: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Migrate => {
            let store = open_store(&config).await?;
            store.close().await;
            info!(database = %config.database_path.display(), "store schema up to date");
            Ok(())
        }
        Command::Fetch(args) => handle_fetch(&config, args).await,
        Command::Resume(args) => handle_resume(&config, args).await,
        Command::Crop => handle_crop(&config).await,
        Command::ImportCsv(args) => handle_import_csv(&config, args).await,
        Command::ProcessCsv(args) => handle_process_csv(&config, args).await,
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_toml_file(path)
            .with_context(|| format!("failed to load configuration '{}'", path.display())),
        None => Ok(Config::from_env()),
    }
}

async fn open_store(config: &Config) -> Result<Store> {
    Store::open(&config.database_url(), config.retry_settings())
        .await
        .with_context(|| format!("failed to open store '{}'", config.database_path.display()))
}

fn build_resolver(config: &Config) -> Result<Box<dyn CountryResolver>> {
    match &config.country_borders {
        Some(path) => {
            let resolver = GeoJsonCountryResolver::from_file(path)
                .with_context(|| format!("failed to load country borders '{}'", path.display()))?;
            Ok(Box::new(resolver))
        }
        None => Ok(Box::new(UnknownCountry)),
    }
}

async fn handle_fetch(config: &Config, args: FetchArgs) -> Result<()> {
    let store = open_store(config).await?;
    let provider = LocalCatalogueProvider::from_file(&args.provider.catalogue)?;
    let extractor = ZipExtractor;
    let cropper = GdalCropper::default();
    let resolver = build_resolver(config)?;

    let request = PoiRequest {
        group: args.group,
        lat: args.lat,
        lon: args.lon,
        date_from: args.date_from,
        date_to: args.date_to,
        platform: args.platform,
        filters: SearchFilters {
            polarisation_mode: args.polarisation_mode,
            product_type: args.product_type,
            sensor_mode: args.sensor_mode,
            swath: args.swath,
            cloud_cover_pct: args.cloud_cover,
            timeliness: args.timeliness,
            orbit_direction: args.orbit_direction,
        },
        width_m: args.width,
        height_m: args.height,
        tile_limit: args.tile_limit,
        tile_start: args.tile_start,
        description: args.description,
    };

    let orchestrator = AcquisitionOrchestrator::new(
        &store,
        &provider,
        &extractor,
        &cropper,
        resolver.as_ref(),
        config.layout(),
    );
    let outcome = orchestrator.run(&request).await?;
    println!(
        "POI {}: {} tile(s) considered, {} unpacked, {} deferred, {} failed",
        outcome.poi_id, outcome.considered, outcome.unpacked, outcome.deferred, outcome.failed
    );

    let wants_crop = request.width_m.is_some() && request.height_m.is_some();
    if wants_crop && !args.skip_crop {
        let crops = CropOrchestrator::new(&store, &cropper, config.layout())
            .run()
            .await?;
        println!(
            "Crops: {} pair(s) considered, {} cropped, {} cancelled, {} deferred",
            crops.considered, crops.cropped, crops.cancelled, crops.deferred
        );
    }

    store.close().await;
    Ok(())
}

async fn handle_resume(config: &Config, args: ProviderArgs) -> Result<()> {
    let store = open_store(config).await?;
    let provider = LocalCatalogueProvider::from_file(&args.catalogue)?;
    let extractor = ZipExtractor;
    let cropper = GdalCropper::default();
    let resolver = UnknownCountry;

    let orchestrator = AcquisitionOrchestrator::new(
        &store,
        &provider,
        &extractor,
        &cropper,
        &resolver,
        config.layout(),
    );
    let outcome = orchestrator.resume_pending().await?;
    println!(
        "Resume: {} tile(s) considered, {} unpacked, {} deferred, {} failed",
        outcome.considered, outcome.unpacked, outcome.deferred, outcome.failed
    );

    store.close().await;
    Ok(())
}

async fn handle_crop(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let cropper = GdalCropper::default();

    let outcome = CropOrchestrator::new(&store, &cropper, config.layout())
        .run()
        .await?;
    println!(
        "Crops: {} pair(s) considered, {} cropped, {} cancelled, {} deferred",
        outcome.considered, outcome.cropped, outcome.cancelled, outcome.deferred
    );

    store.close().await;
    Ok(())
}

async fn handle_import_csv(config: &Config, args: ImportCsvArgs) -> Result<()> {
    let store = open_store(config).await?;
    let mut total = 0usize;

    for pattern in &args.patterns {
        let paths = glob::glob(pattern)
            .with_context(|| format!("invalid glob pattern '{}'", pattern))?;
        let mut matched = false;
        for path in paths {
            let path = path?;
            matched = true;
            let file = File::open(&path)
                .with_context(|| format!("failed to open '{}'", path.display()))?;
            let summary = ingestion::import(&store, file).await?;
            println!(
                "Staged {} row(s) from '{}' as batch {}",
                summary.imported,
                path.display(),
                summary.batch_id
            );
            total += summary.imported;
        }
        if !matched {
            warn!(pattern = %pattern, "no files matched pattern");
        }
    }

    println!("Staged {} row(s) in total", total);
    store.close().await;
    Ok(())
}

async fn handle_process_csv(config: &Config, args: ProviderArgs) -> Result<()> {
    let store = open_store(config).await?;
    let provider = LocalCatalogueProvider::from_file(&args.catalogue)?;
    let extractor = ZipExtractor;
    let cropper = GdalCropper::default();
    let resolver = build_resolver(config)?;

    let orchestrator = AcquisitionOrchestrator::new(
        &store,
        &provider,
        &extractor,
        &cropper,
        resolver.as_ref(),
        config.layout(),
    );
    let summary = ingestion::process(&store, &orchestrator).await?;
    println!(
        "Processed {} staged row(s): {} archived, {} left queued",
        summary.processed, summary.archived, summary.failed
    );

    let crops = CropOrchestrator::new(&store, &cropper, config.layout())
        .run()
        .await?;
    println!(
        "Crops: {} pair(s) considered, {} cropped, {} cancelled, {} deferred",
        crops.considered, crops.cropped, crops.cancelled, crops.deferred
    );

    store.close().await;
    Ok(())
}
