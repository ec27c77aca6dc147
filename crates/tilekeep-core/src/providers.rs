// crates/tilekeep-core/src/providers.rs
//
// Provider adapter seam. The Copernicus/USGS/ASF HTTP clients live outside
// this crate; the core only depends on this narrow contract. The bundled
// `LocalCatalogueProvider` serves pre-staged archives from disk, which is
// enough to run the pipeline end-to-end and to exercise every state
// transition in tests.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::filters::SearchFilters;
use crate::types::{NewTile, Platform, PoiRequest};

/// Parameters of one provider search, derived from a POI request.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub lat: f64,
    pub lon: f64,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub platform: Platform,
    pub filters: SearchFilters,
    pub limit: i64,
    pub start: i64,
}

impl SearchQuery {
    pub fn from_request(request: &PoiRequest) -> Self {
        Self {
            lat: request.lat,
            lon: request.lon,
            date_from: request.date_from,
            date_to: request.date_to,
            platform: request.platform,
            filters: request.filters.clone(),
            limit: request.tile_limit,
            start: request.tile_start,
        }
    }
}

/// One product returned by a provider search. `folder_name` is derived from
/// provider metadata and is the deterministic local name for the unpacked
/// tile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductDescriptor {
    pub platform: Platform,
    pub product_id: String,
    pub folder_name: String,
    pub sensing_begin: DateTime<Utc>,
    pub sensing_end: DateTime<Utc>,
    #[serde(default)]
    pub cloud_cover_pct: Option<f64>,
    #[serde(default = "default_online")]
    pub online: bool,
}

fn default_online() -> bool {
    true
}

impl From<&ProductDescriptor> for NewTile {
    fn from(descriptor: &ProductDescriptor) -> Self {
        Self {
            platform: descriptor.platform,
            product_id: descriptor.product_id.clone(),
            folder_name: descriptor.folder_name.clone(),
            sensing_begin: descriptor.sensing_begin,
            sensing_end: descriptor.sensing_end,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The archive is on disk under the destination directory.
    Completed,
    /// The product sits in an offline/archived tier; a retrieval has to be
    /// requested and the tile revisited by a later pass.
    Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalRequest {
    Accepted,
    Rejected,
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<ProductDescriptor>>;

    async fn is_available_for_immediate_download(&self, product_id: &str) -> Result<bool>;

    /// Fetch the product archive into `dest_dir` as `<folder_name>.zip`.
    async fn download(&self, product_id: &str, dest_dir: &Path) -> Result<DownloadOutcome>;

    async fn request_async_retrieval(&self, product_id: &str) -> Result<RetrievalRequest>;
}

/// Bounding box a catalogue entry covers, used to match search coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Footprint {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl Footprint {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogueEntry {
    pub platform: Platform,
    pub product_id: String,
    pub folder_name: String,
    pub sensing_begin: DateTime<Utc>,
    pub sensing_end: DateTime<Utc>,
    /// Path of the product archive on disk.
    pub archive: PathBuf,
    #[serde(default = "default_online")]
    pub online: bool,
    #[serde(default)]
    pub cloud_cover_pct: Option<f64>,
    #[serde(default)]
    pub footprint: Option<Footprint>,
}

/// Filesystem-backed provider over a JSON product catalogue.
pub struct LocalCatalogueProvider {
    entries: Vec<CatalogueEntry>,
}

impl LocalCatalogueProvider {
    pub fn new(entries: Vec<CatalogueEntry>) -> Self {
        Self { entries }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read catalogue '{}'", path.display()))?;
        let entries: Vec<CatalogueEntry> = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse catalogue '{}'", path.display()))?;
        Ok(Self::new(entries))
    }

    fn find(&self, product_id: &str) -> Option<&CatalogueEntry> {
        self.entries
            .iter()
            .find(|entry| entry.product_id == product_id)
    }

    fn matches(entry: &CatalogueEntry, query: &SearchQuery) -> bool {
        if entry.platform != query.platform {
            return false;
        }
        if entry.sensing_begin.date_naive() > query.date_to
            || entry.sensing_end.date_naive() < query.date_from
        {
            return false;
        }
        if let Some(footprint) = entry.footprint {
            if !footprint.contains(query.lat, query.lon) {
                return false;
            }
        }
        if let Some(max_cloud) = query.filters.cloud_cover_pct {
            match entry.cloud_cover_pct {
                Some(cloud) if cloud <= max_cloud as f64 => {}
                _ => return false,
            }
        }
        true
    }
}

#[async_trait]
impl ProviderAdapter for LocalCatalogueProvider {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<ProductDescriptor>> {
        let results: Vec<ProductDescriptor> = self
            .entries
            .iter()
            .filter(|entry| Self::matches(entry, query))
            .skip(query.start.max(0) as usize)
            .take(query.limit.max(0) as usize)
            .map(|entry| ProductDescriptor {
                platform: entry.platform,
                product_id: entry.product_id.clone(),
                folder_name: entry.folder_name.clone(),
                sensing_begin: entry.sensing_begin,
                sensing_end: entry.sensing_end,
                cloud_cover_pct: entry.cloud_cover_pct,
                online: entry.online,
            })
            .collect();

        info!(
            platform = %query.platform,
            candidates = results.len(),
            "catalogue search complete"
        );
        Ok(results)
    }

    async fn is_available_for_immediate_download(&self, product_id: &str) -> Result<bool> {
        Ok(self.find(product_id).map(|entry| entry.online).unwrap_or(false))
    }

    async fn download(&self, product_id: &str, dest_dir: &Path) -> Result<DownloadOutcome> {
        let entry = self
            .find(product_id)
            .with_context(|| format!("product '{}' not in catalogue", product_id))?;
        if !entry.online {
            return Ok(DownloadOutcome::Deferred);
        }

        std::fs::create_dir_all(dest_dir)?;
        let dest = dest_dir.join(format!("{}.zip", entry.folder_name));
        std::fs::copy(&entry.archive, &dest).with_context(|| {
            format!(
                "failed to copy archive '{}' to '{}'",
                entry.archive.display(),
                dest.display()
            )
        })?;
        info!(product_id, dest = %dest.display(), "archive staged from catalogue");
        Ok(DownloadOutcome::Completed)
    }

    async fn request_async_retrieval(&self, product_id: &str) -> Result<RetrievalRequest> {
        // A local catalogue has no offline tier to wake up; accept the
        // request so the tile stays in the requested state for a later pass.
        match self.find(product_id) {
            Some(_) => Ok(RetrievalRequest::Accepted),
            None => Ok(RetrievalRequest::Rejected),
        }
    }
}
