// Shared fakes for the integration tests: a scripted provider serving
// in-memory zip archives, a recording cropper and a fixed country resolver.
#![allow(dead_code)]

use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};

use tilekeep_core::db::{RetrySettings, Store};
use tilekeep_core::filters::SearchFilters;
use tilekeep_core::geocode::CountryResolver;
use tilekeep_core::providers::{
    DownloadOutcome, ProductDescriptor, ProviderAdapter, RetrievalRequest, SearchQuery,
};
use tilekeep_core::raster::{CropError, CropOutput, CropRequest, RasterCropper};
use tilekeep_core::types::{Platform, PoiRequest, SceneClassRatios};

pub async fn memory_store() -> Store {
    let retry = RetrySettings {
        max_attempts: 3,
        backoff: Duration::from_millis(1),
    };
    Store::open("sqlite::memory:", retry)
        .await
        .expect("open in-memory store")
}

/// The request of the basic-flow scenario: g1 @ 48.0/16.0, August 2019,
/// Sentinel-2, cloud cover 10, one tile, 1500x1500 m crop.
pub fn sample_request() -> PoiRequest {
    PoiRequest {
        group: "g1".to_string(),
        lat: 48.0,
        lon: 16.0,
        date_from: NaiveDate::from_ymd_opt(2019, 8, 1).unwrap(),
        date_to: NaiveDate::from_ymd_opt(2019, 8, 31).unwrap(),
        platform: Platform::Sentinel2,
        filters: SearchFilters {
            cloud_cover_pct: Some(10),
            ..SearchFilters::default()
        },
        width_m: Some(1500),
        height_m: Some(1500),
        tile_limit: 1,
        tile_start: 0,
        description: None,
    }
}

pub fn sample_product(product_id: &str, folder_name: &str) -> ProductDescriptor {
    ProductDescriptor {
        platform: Platform::Sentinel2,
        product_id: product_id.to_string(),
        folder_name: folder_name.to_string(),
        sensing_begin: Utc.with_ymd_and_hms(2019, 8, 10, 10, 0, 0).unwrap(),
        sensing_end: Utc.with_ymd_and_hms(2019, 8, 10, 10, 5, 0).unwrap(),
        cloud_cover_pct: Some(5.0),
        online: true,
    }
}

/// A zip archive holding `<folder>/measurement.tif`, matching the layout the
/// extractor expects from provider downloads.
pub fn zip_bytes(folder: &str) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::FileOptions::default();
        writer
            .add_directory(format!("{}/", folder), options)
            .expect("add directory");
        writer
            .start_file(format!("{}/measurement.tif", folder), options)
            .expect("start file");
        writer.write_all(b"raster").expect("write raster");
        writer.finish().expect("finish zip");
    }
    cursor.into_inner()
}

pub struct ScriptedProvider {
    pub products: Vec<ProductDescriptor>,
    pub offline: HashSet<String>,
    pub fail_downloads: HashSet<String>,
    pub downloads: Mutex<Vec<String>>,
    pub retrievals: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(products: Vec<ProductDescriptor>) -> Self {
        Self {
            products,
            offline: HashSet::new(),
            fail_downloads: HashSet::new(),
            downloads: Mutex::new(Vec::new()),
            retrievals: Mutex::new(Vec::new()),
        }
    }

    pub fn with_offline(mut self, product_id: &str) -> Self {
        self.offline.insert(product_id.to_string());
        self
    }

    pub fn with_failing_download(mut self, product_id: &str) -> Self {
        self.fail_downloads.insert(product_id.to_string());
        self
    }

    pub fn download_count(&self) -> usize {
        self.downloads.lock().unwrap().len()
    }

    pub fn retrieval_count(&self) -> usize {
        self.retrievals.lock().unwrap().len()
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedProvider {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<ProductDescriptor>> {
        Ok(self
            .products
            .iter()
            .filter(|product| product.platform == query.platform)
            .skip(query.start.max(0) as usize)
            .take(query.limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn is_available_for_immediate_download(&self, product_id: &str) -> Result<bool> {
        Ok(!self.offline.contains(product_id))
    }

    async fn download(&self, product_id: &str, dest_dir: &Path) -> Result<DownloadOutcome> {
        if self.offline.contains(product_id) {
            return Ok(DownloadOutcome::Deferred);
        }
        if self.fail_downloads.contains(product_id) {
            return Err(anyhow!("simulated download failure for '{}'", product_id));
        }
        let product = self
            .products
            .iter()
            .find(|product| product.product_id == product_id)
            .ok_or_else(|| anyhow!("unknown product '{}'", product_id))?;

        self.downloads.lock().unwrap().push(product_id.to_string());
        std::fs::create_dir_all(dest_dir)?;
        let dest = dest_dir.join(format!("{}.zip", product.folder_name));
        std::fs::write(&dest, zip_bytes(&product.folder_name))?;
        Ok(DownloadOutcome::Completed)
    }

    async fn request_async_retrieval(&self, product_id: &str) -> Result<RetrievalRequest> {
        self.retrievals.lock().unwrap().push(product_id.to_string());
        Ok(RetrievalRequest::Accepted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropBehaviour {
    Succeed,
    Unsupported,
    Fail,
}

pub struct RecordingCropper {
    pub behaviour: CropBehaviour,
    pub ratios: Option<SceneClassRatios>,
    pub srs: Option<String>,
    pub calls: Mutex<Vec<CropRequest>>,
}

impl RecordingCropper {
    pub fn new() -> Self {
        Self {
            behaviour: CropBehaviour::Succeed,
            ratios: None,
            srs: Some("EPSG:32633".to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_behaviour(mut self, behaviour: CropBehaviour) -> Self {
        self.behaviour = behaviour;
        self
    }

    pub fn with_ratios(mut self, ratios: SceneClassRatios) -> Self {
        self.ratios = Some(ratios);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl RasterCropper for RecordingCropper {
    fn crop(&self, request: &CropRequest) -> Result<CropOutput, CropError> {
        self.calls.lock().unwrap().push(request.clone());
        match self.behaviour {
            CropBehaviour::Unsupported => Err(CropError::Unsupported(
                "no reprojection toolchain for this platform".to_string(),
            )),
            CropBehaviour::Fail => Err(CropError::Failed("simulated crop failure".to_string())),
            CropBehaviour::Succeed => {
                std::fs::create_dir_all(&request.dest_dir)
                    .map_err(|err| CropError::Failed(err.to_string()))?;
                let path = request
                    .dest_dir
                    .join(format!("{}.tif", request.output_stem));
                std::fs::write(&path, b"crop").map_err(|err| CropError::Failed(err.to_string()))?;
                Ok(CropOutput {
                    path,
                    scene_class_ratios: self.ratios,
                })
            }
        }
    }

    fn spatial_reference(&self, _source_dir: &Path) -> Option<String> {
        self.srs.clone()
    }
}

pub struct StaticCountry(pub &'static str);

impl CountryResolver for StaticCountry {
    fn country_for(&self, _lat: f64, _lon: f64) -> String {
        self.0.to_string()
    }
}
