// crates/tilekeep-core/src/cropping.rs
//
// Drives the unpack → crop lifecycle over POI/tile pairs. Pure sequencing
// and state transitions; geometric correctness belongs to the raster
// collaborator.

use tracing::{info, warn};

use crate::db::Store;
use crate::error::Result;
use crate::layout::DataLayout;
use crate::raster::{CropError, CropRequest, RasterCropper};
use crate::repo;

#[derive(Debug, Clone, Copy, Default)]
pub struct CropOutcome {
    pub considered: usize,
    pub cropped: usize,
    pub cancelled: usize,
    /// Pairs left for a later pass: artifacts missing or a transient crop
    /// failure.
    pub deferred: usize,
}

pub struct CropOrchestrator<'a> {
    store: &'a Store,
    cropper: &'a dyn RasterCropper,
    layout: DataLayout,
}

impl<'a> CropOrchestrator<'a> {
    pub fn new(store: &'a Store, cropper: &'a dyn RasterCropper, layout: DataLayout) -> Self {
        Self {
            store,
            cropper,
            layout,
        }
    }

    pub async fn run(&self) -> Result<CropOutcome> {
        let work = repo::links::crop_work(self.store).await?;
        let mut outcome = CropOutcome {
            considered: work.len(),
            ..CropOutcome::default()
        };

        for item in work {
            let folder = self.layout.tile_dir(&item.tile.folder_name);

            if !folder.is_dir() {
                if self.layout.archive_path(&item.tile.folder_name).is_file() {
                    // The archive survived; a later unpack pass restores the
                    // folder.
                    info!(
                        tile_id = item.tile.id,
                        "unpacked folder missing, archive present, leaving for unpack pass"
                    );
                    outcome.deferred += 1;
                    continue;
                }
                warn!(
                    tile_id = item.tile.id,
                    product_id = %item.tile.product_id,
                    "no local artifacts for tile recorded as unpacked, clearing downloaded state"
                );
                repo::tiles::clear_downloaded(self.store, item.tile.id).await?;
                outcome.deferred += 1;
                continue;
            }

            // width/height are guaranteed by the crop_work query.
            let request = CropRequest {
                source_dir: folder,
                platform: item.tile.platform,
                center_lat: item.poi.lat,
                center_lon: item.poi.lon,
                width_m: item.poi.width_m.unwrap_or_default(),
                height_m: item.poi.height_m.unwrap_or_default(),
                dest_dir: self.layout.crop_dir(&item.poi),
                output_stem: item.tile.folder_name.clone(),
            };

            match self.cropper.crop(&request) {
                Ok(output) => {
                    repo::links::mark_cropped(
                        self.store,
                        item.assoc_id,
                        &output.path,
                        output.scene_class_ratios.as_ref(),
                    )
                    .await?;
                    outcome.cropped += 1;
                }
                Err(CropError::Unsupported(reason)) => {
                    warn!(
                        assoc_id = item.assoc_id,
                        tile_id = item.tile.id,
                        reason = %reason,
                        "crop unsupported, cancelling pair"
                    );
                    repo::links::cancel_crop(self.store, item.assoc_id).await?;
                    outcome.cancelled += 1;
                }
                Err(CropError::Failed(reason)) => {
                    warn!(
                        assoc_id = item.assoc_id,
                        tile_id = item.tile.id,
                        reason = %reason,
                        "crop failed, leaving pair for a later pass"
                    );
                    outcome.deferred += 1;
                }
            }
        }

        info!(
            considered = outcome.considered,
            cropped = outcome.cropped,
            cancelled = outcome.cancelled,
            deferred = outcome.deferred,
            "crop pass complete"
        );
        Ok(outcome)
    }
}
