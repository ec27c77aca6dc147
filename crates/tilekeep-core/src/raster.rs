// crates/tilekeep-core/src/raster.rs
//
// Raster-cropping seam. Pixel extraction is delegated to external GDAL
// processes; this module owns only the crop-window arithmetic and the
// process plumbing. Raster correctness is the collaborator's contract.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::{debug, warn};

use crate::types::{Platform, SceneClassRatios};

#[derive(Error, Debug)]
pub enum CropError {
    /// The platform/projection combination has no working toolchain here.
    /// Recorded as cancelled and never retried automatically.
    #[error("unsupported crop: {0}")]
    Unsupported(String),

    /// Transient or data-specific failure; the pair stays pending for a
    /// later pass.
    #[error("crop failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct CropRequest {
    pub source_dir: PathBuf,
    pub platform: Platform,
    pub center_lat: f64,
    pub center_lon: f64,
    pub width_m: i64,
    pub height_m: i64,
    pub dest_dir: PathBuf,
    /// File stem of the output; the cropper picks the extension.
    pub output_stem: String,
}

#[derive(Debug, Clone)]
pub struct CropOutput {
    pub path: PathBuf,
    /// Sentinel-2 scene-classification composition of the crop, when the
    /// toolchain computes it.
    pub scene_class_ratios: Option<SceneClassRatios>,
}

pub trait RasterCropper: Send + Sync {
    fn crop(&self, request: &CropRequest) -> Result<CropOutput, CropError>;

    /// Spatial reference of an unpacked tile, read from its raster. `None`
    /// when it cannot be determined.
    fn spatial_reference(&self, source_dir: &Path) -> Option<String>;
}

/// WGS84 window around a center point, metres converted to degrees at the
/// center latitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropWindow {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

pub fn crop_window(center_lat: f64, center_lon: f64, width_m: i64, height_m: i64) -> CropWindow {
    let half_height_deg = height_m as f64 / 2.0 / METERS_PER_DEGREE_LAT;
    let meters_per_degree_lon = METERS_PER_DEGREE_LAT * center_lat.to_radians().cos();
    let half_width_deg = width_m as f64 / 2.0 / meters_per_degree_lon;

    CropWindow {
        min_lon: center_lon - half_width_deg,
        min_lat: center_lat - half_height_deg,
        max_lon: center_lon + half_width_deg,
        max_lat: center_lat + half_height_deg,
    }
}

/// Cropper shelling out to `gdal_translate` / `gdalinfo`.
#[derive(Debug, Clone)]
pub struct GdalCropper {
    translate_bin: String,
    info_bin: String,
}

impl Default for GdalCropper {
    fn default() -> Self {
        Self {
            translate_bin: "gdal_translate".to_string(),
            info_bin: "gdalinfo".to_string(),
        }
    }
}

impl GdalCropper {
    pub fn new(translate_bin: impl Into<String>, info_bin: impl Into<String>) -> Self {
        Self {
            translate_bin: translate_bin.into(),
            info_bin: info_bin.into(),
        }
    }
}

impl RasterCropper for GdalCropper {
    fn crop(&self, request: &CropRequest) -> Result<CropOutput, CropError> {
        let source = find_raster(&request.source_dir).ok_or_else(|| {
            CropError::Failed(format!(
                "no raster found under '{}'",
                request.source_dir.display()
            ))
        })?;

        std::fs::create_dir_all(&request.dest_dir)
            .map_err(|err| CropError::Failed(err.to_string()))?;
        let output = request
            .dest_dir
            .join(format!("{}.tif", request.output_stem));

        let window = crop_window(
            request.center_lat,
            request.center_lon,
            request.width_m,
            request.height_m,
        );

        let result = Command::new(&self.translate_bin)
            .arg("-projwin")
            .arg(window.min_lon.to_string())
            .arg(window.max_lat.to_string())
            .arg(window.max_lon.to_string())
            .arg(window.min_lat.to_string())
            .arg("-projwin_srs")
            .arg("EPSG:4326")
            .arg(&source)
            .arg(&output)
            .output();

        match result {
            Ok(out) if out.status.success() => {
                debug!(output = %output.display(), "gdal_translate crop complete");
                // Scene-classification statistics need the full SCL band
                // toolchain, which is part of the external GDAL integration.
                Ok(CropOutput {
                    path: output,
                    scene_class_ratios: None,
                })
            }
            Ok(out) => Err(CropError::Failed(format!(
                "gdal_translate exited with {}: {}",
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            ))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(CropError::Unsupported(
                format!("'{}' is not installed", self.translate_bin),
            )),
            Err(err) => Err(CropError::Failed(err.to_string())),
        }
    }

    fn spatial_reference(&self, source_dir: &Path) -> Option<String> {
        let source = find_raster(source_dir)?;
        let out = Command::new(&self.info_bin)
            .arg("-json")
            .arg(&source)
            .output();
        let out = match out {
            Ok(out) if out.status.success() => out,
            Ok(out) => {
                warn!(
                    raster = %source.display(),
                    status = %out.status,
                    "gdalinfo failed, leaving spatial reference unset"
                );
                return None;
            }
            Err(err) => {
                warn!(error = %err, "gdalinfo unavailable, leaving spatial reference unset");
                return None;
            }
        };

        let parsed: serde_json::Value = serde_json::from_slice(&out.stdout).ok()?;
        parsed
            .get("coordinateSystem")
            .and_then(|cs| cs.get("wkt"))
            .and_then(|wkt| wkt.as_str())
            .map(|wkt| wkt.to_string())
    }
}

const RASTER_EXTENSIONS: &[&str] = &["tif", "tiff", "jp2", "img"];

/// First raster file below the folder, walking depth-first. Provider folder
/// layouts differ (SAFE granules vs flat Landsat scenes), so no structure is
/// assumed.
fn find_raster(dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut subdirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            subdirs.push(path);
            continue;
        }
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            if RASTER_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
                return Some(path);
            }
        }
    }
    subdirs.sort();
    for subdir in subdirs {
        if let Some(found) = find_raster(&subdir) {
            return Some(found);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_window_is_centered() {
        let window = crop_window(48.0, 16.0, 1500, 1500);
        assert!((window.min_lon + window.max_lon - 32.0).abs() < 1e-9);
        assert!((window.min_lat + window.max_lat - 96.0).abs() < 1e-9);
    }

    #[test]
    fn crop_window_height_matches_requested_meters() {
        let window = crop_window(48.0, 16.0, 1500, 1500);
        let height_deg = window.max_lat - window.min_lat;
        let height_m = height_deg * METERS_PER_DEGREE_LAT;
        assert!((height_m - 1500.0).abs() < 1e-6);
    }

    #[test]
    fn crop_window_widens_with_latitude() {
        let equator = crop_window(0.0, 16.0, 1500, 1500);
        let alpine = crop_window(48.0, 16.0, 1500, 1500);
        let width_at = |w: &CropWindow| w.max_lon - w.min_lon;
        assert!(width_at(&alpine) > width_at(&equator));
    }
}
