use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use comfy_table::Table;
use tilekeep_core::{config::Config, db::Store, repo, resync};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Tilekeep administrative tooling", long_about = None)]
struct Cli {
    /// Optional TOML configuration file; environment variables otherwise
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Summarise store contents and pending work
    Status,
    /// List registered points of interest
    Pois,
    /// List registered tiles
    Tiles,
    /// Plan (and optionally apply) store-vs-filesystem reconciliation
    Resync(ResyncArgs),
    /// Mark a point of interest as abandoned (its rows are kept)
    CancelPoi(CancelArgs),
    /// Mark a tile as abandoned (its rows are kept)
    CancelTile(CancelArgs),
}

#[derive(Args, Debug)]
struct CancelArgs {
    #[arg(long)]
    id: i64,
}

#[derive(Args, Debug, Default)]
struct ResyncArgs {
    /// Apply the clears instead of running in dry-run mode
    #[arg(long)]
    apply: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::from_toml_file(path)
            .with_context(|| format!("failed to load configuration '{}'", path.display()))?,
        None => Config::from_env(),
    };

    let store = Store::open(&config.database_url(), config.retry_settings())
        .await
        .with_context(|| format!("failed to open store '{}'", config.database_path.display()))?;

    let result = match cli.command {
        Command::Status => handle_status(&store).await,
        Command::Pois => handle_pois(&store).await,
        Command::Tiles => handle_tiles(&store).await,
        Command::Resync(args) => handle_resync(&store, &config, args).await,
        Command::CancelPoi(args) => handle_cancel_poi(&store, args).await,
        Command::CancelTile(args) => handle_cancel_tile(&store, args).await,
    };

    store.close().await;
    result
}

async fn handle_status(store: &Store) -> Result<()> {
    let pois = repo::pois::list(store).await?;
    let tiles = repo::tiles::list(store).await?;
    let crop_work = repo::links::crop_work(store).await?;
    let staged = repo::staging::staged(store).await?;
    let loaded = repo::staging::loaded_count(store).await?;

    let identified = pois
        .iter()
        .filter(|poi| poi.tiles_identified_at.is_some())
        .count();

    let mut table = Table::new();
    table.set_header(vec!["Metric", "Count"]);
    table.add_row(vec!["Points of interest".to_string(), pois.len().to_string()]);
    table.add_row(vec![
        "POIs with tiles identified".to_string(),
        identified.to_string(),
    ]);
    table.add_row(vec!["Tiles".to_string(), tiles.len().to_string()]);
    for status in ["pending", "requested", "downloaded", "unpacked", "cancelled"] {
        let count = tiles
            .iter()
            .filter(|tile| tile.status.as_str() == status)
            .count();
        table.add_row(vec![format!("Tiles {}", status), count.to_string()]);
    }
    table.add_row(vec![
        "Pairs ready to crop".to_string(),
        crop_work.len().to_string(),
    ]);
    table.add_row(vec!["Staged CSV rows".to_string(), staged.len().to_string()]);
    table.add_row(vec!["Archived CSV rows".to_string(), loaded.to_string()]);

    println!("{table}");
    Ok(())
}

async fn handle_pois(store: &Store) -> Result<()> {
    let pois = repo::pois::list(store).await?;

    let mut table = Table::new();
    table.set_header(vec![
        "Id", "Group", "Country", "Platform", "Lat", "Lon", "From", "To", "Crop", "Identified",
    ]);
    for poi in pois {
        let crop = match (poi.width_m, poi.height_m) {
            (Some(width), Some(height)) => format!("{}x{} m", width, height),
            _ => "download-only".to_string(),
        };
        table.add_row(vec![
            poi.id.to_string(),
            poi.group_name.clone(),
            poi.country.clone(),
            poi.platform.to_string(),
            poi.lat.to_string(),
            poi.lon.to_string(),
            poi.date_from.to_string(),
            poi.date_to.to_string(),
            crop,
            poi.tiles_identified_at
                .map(|at| at.to_rfc3339())
                .unwrap_or_else(|| "-".to_string()),
        ]);
    }

    println!("{table}");
    Ok(())
}

async fn handle_tiles(store: &Store) -> Result<()> {
    let tiles = repo::tiles::list(store).await?;

    let mut table = Table::new();
    table.set_header(vec![
        "Id",
        "Platform",
        "Product",
        "Status",
        "Downloaded",
        "Unpacked",
        "SRS",
    ]);
    for tile in tiles {
        table.add_row(vec![
            tile.id.to_string(),
            tile.platform.to_string(),
            tile.product_id.clone(),
            tile.status.to_string(),
            tile.downloaded_at
                .map(|at| at.to_rfc3339())
                .unwrap_or_else(|| "-".to_string()),
            tile.unpacked_at
                .map(|at| at.to_rfc3339())
                .unwrap_or_else(|| "-".to_string()),
            tile.spatial_reference
                .as_deref()
                .map(truncate_srs)
                .unwrap_or_else(|| "-".to_string()),
        ]);
    }

    println!("{table}");
    Ok(())
}

fn truncate_srs(srs: &str) -> String {
    const MAX: usize = 40;
    if srs.chars().count() > MAX {
        let head: String = srs.chars().take(MAX).collect();
        format!("{}...", head)
    } else {
        srs.to_string()
    }
}

async fn handle_cancel_poi(store: &Store, args: CancelArgs) -> Result<()> {
    repo::pois::cancel(store, args.id).await?;
    println!("POI {} marked cancelled", args.id);
    Ok(())
}

async fn handle_cancel_tile(store: &Store, args: CancelArgs) -> Result<()> {
    repo::tiles::cancel(store, args.id).await?;
    println!("Tile {} marked cancelled", args.id);
    Ok(())
}

async fn handle_resync(store: &Store, config: &Config, args: ResyncArgs) -> Result<()> {
    let layout = config.layout();
    let report = resync::plan(store, &layout).await?;

    if report.is_clean() {
        println!("No stale tile state found. Store is in sync with the filesystem.");
        return Ok(());
    }

    println!("Found {} stale tile(s):", report.findings.len());
    for finding in &report.findings {
        println!(
            "  tile {} ({}): {:?}",
            finding.tile_id, finding.product_id, finding.action
        );
    }

    if args.apply {
        resync::apply(store, &report).await?;
        println!("Cleared stale tile state successfully.");
    } else {
        println!("Run again with --apply to clear the stale state.");
    }

    Ok(())
}
