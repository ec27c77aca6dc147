// crates/tilekeep-core/src/acquisition.rs
//
// Drives the search → register → download → unpack → link lifecycle for a
// POI. The orchestrator is re-invoked rather than internally retried: a tile
// that fails a stage stays in its last successful state and is picked up by
// the next pass. Only store-level failures abort a run.

use std::path::Path;

use tracing::{info, warn};

use crate::db::Store;
use crate::error::{PipelineError, Result};
use crate::extract::ArchiveExtractor;
use crate::geocode::CountryResolver;
use crate::layout::DataLayout;
use crate::providers::{DownloadOutcome, ProviderAdapter, RetrievalRequest, SearchQuery};
use crate::raster::RasterCropper;
use crate::repo;
use crate::types::{NewTile, PoiRequest, TileRecord, TileStatus};

#[derive(Debug, Clone, Copy, Default)]
pub struct AcquisitionOutcome {
    pub poi_id: i64,
    /// Products considered in this pass (search results or linked tiles).
    pub considered: usize,
    pub unpacked: usize,
    pub deferred: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResumeOutcome {
    pub considered: usize,
    pub unpacked: usize,
    pub deferred: usize,
    pub failed: usize,
}

/// How far one tile got in this pass.
enum TileAdvance {
    Unpacked,
    Deferred,
    Skipped,
}

pub struct AcquisitionOrchestrator<'a> {
    store: &'a Store,
    provider: &'a dyn ProviderAdapter,
    extractor: &'a dyn ArchiveExtractor,
    cropper: &'a dyn RasterCropper,
    resolver: &'a dyn CountryResolver,
    layout: DataLayout,
}

impl<'a> AcquisitionOrchestrator<'a> {
    pub fn new(
        store: &'a Store,
        provider: &'a dyn ProviderAdapter,
        extractor: &'a dyn ArchiveExtractor,
        cropper: &'a dyn RasterCropper,
        resolver: &'a dyn CountryResolver,
        layout: DataLayout,
    ) -> Self {
        Self {
            store,
            provider,
            extractor,
            cropper,
            resolver,
            layout,
        }
    }

    /// Resolve-or-create the POI, identify its tiles and push each one as far
    /// down the pipeline as this pass can take it.
    pub async fn run(&self, request: &PoiRequest) -> Result<AcquisitionOutcome> {
        self.layout.ensure()?;

        let poi_id = repo::pois::find_or_create(self.store, self.resolver, request).await?;
        let poi = repo::pois::get(self.store, poi_id).await?;

        if poi.tiles_identified_at.is_some() {
            // Terminal search marker already set: reconcile the linked tiles
            // without asking the provider again.
            info!(poi_id, "tiles already identified, reconciling linked tiles");
            let tiles = repo::links::tiles_for_poi(self.store, poi_id).await?;
            let progress = self.advance_tiles(&tiles).await?;
            return Ok(AcquisitionOutcome {
                poi_id,
                considered: progress.considered,
                unpacked: progress.unpacked,
                deferred: progress.deferred,
                failed: progress.failed,
            });
        }

        let query = SearchQuery::from_request(request);
        let products = self
            .provider
            .search(&query)
            .await
            .map_err(|err| PipelineError::Provider(err.to_string()))?;

        let mut outcome = AcquisitionOutcome {
            poi_id,
            considered: products.len(),
            ..AcquisitionOutcome::default()
        };

        for descriptor in &products {
            let tile_id =
                repo::tiles::find_or_register(self.store, &NewTile::from(descriptor)).await?;
            // Link before advancing so interrupted work stays discoverable.
            repo::links::link(self.store, poi_id, tile_id).await?;

            let tile = repo::tiles::get(self.store, tile_id).await?;
            match self.advance_tile(&tile).await {
                Ok(TileAdvance::Unpacked) => outcome.unpacked += 1,
                Ok(TileAdvance::Deferred) => outcome.deferred += 1,
                Ok(TileAdvance::Skipped) => {}
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(
                        tile_id,
                        product_id = %tile.product_id,
                        error = %err,
                        "tile left in last good state for a later pass"
                    );
                    outcome.failed += 1;
                }
            }
        }

        repo::pois::mark_tiles_identified(self.store, poi_id).await?;
        info!(
            poi_id,
            considered = outcome.considered,
            unpacked = outcome.unpacked,
            deferred = outcome.deferred,
            "acquisition pass complete"
        );
        Ok(outcome)
    }

    /// Revisit every tile stuck before unpack completion, regardless of POI:
    /// offline-tier downloads that may have surfaced, and downloaded archives
    /// that still need extraction.
    pub async fn resume_pending(&self) -> Result<ResumeOutcome> {
        self.layout.ensure()?;

        let mut tiles = repo::tiles::pending_download(self.store).await?;
        tiles.extend(repo::tiles::pending_unpack(self.store).await?);
        let outcome = self.advance_tiles(&tiles).await?;
        info!(
            considered = outcome.considered,
            unpacked = outcome.unpacked,
            deferred = outcome.deferred,
            "resume pass complete"
        );
        Ok(outcome)
    }

    async fn advance_tiles(&self, tiles: &[TileRecord]) -> Result<ResumeOutcome> {
        let mut outcome = ResumeOutcome {
            considered: tiles.len(),
            ..ResumeOutcome::default()
        };
        for tile in tiles {
            match self.advance_tile(tile).await {
                Ok(TileAdvance::Unpacked) => outcome.unpacked += 1,
                Ok(TileAdvance::Deferred) => outcome.deferred += 1,
                Ok(TileAdvance::Skipped) => {}
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(
                        tile_id = tile.id,
                        product_id = %tile.product_id,
                        error = %err,
                        "tile left in last good state for a later pass"
                    );
                    outcome.failed += 1;
                }
            }
        }
        Ok(outcome)
    }

    async fn advance_tile(&self, tile: &TileRecord) -> Result<TileAdvance> {
        if tile.cancelled_at.is_some() || tile.status == TileStatus::Cancelled {
            return Ok(TileAdvance::Skipped);
        }

        let folder = self.layout.tile_dir(&tile.folder_name);

        if tile.status == TileStatus::Unpacked {
            if tile.spatial_reference.is_none() && folder.is_dir() {
                self.probe_spatial_reference(tile.id, &folder).await?;
            }
            return Ok(TileAdvance::Skipped);
        }

        // Disk state wins over recorded state after a crash or manual
        // intervention: an unpacked folder means download and unpack are
        // done, whatever the row says.
        if folder.is_dir() {
            repo::tiles::mark_downloaded(self.store, tile.id).await?;
            repo::tiles::mark_unpacked(self.store, tile.id).await?;
            self.probe_spatial_reference(tile.id, &folder).await?;
            info!(
                tile_id = tile.id,
                product_id = %tile.product_id,
                "reconciled unpacked folder already on disk"
            );
            return Ok(TileAdvance::Unpacked);
        }

        let archive = self.layout.archive_path(&tile.folder_name);
        if archive.is_file() {
            repo::tiles::mark_downloaded(self.store, tile.id).await?;
            return self.unpack_tile(tile).await;
        }

        let available = self
            .provider
            .is_available_for_immediate_download(&tile.product_id)
            .await
            .map_err(|err| PipelineError::Provider(err.to_string()))?;

        if !available {
            let retrieval = self
                .provider
                .request_async_retrieval(&tile.product_id)
                .await
                .map_err(|err| PipelineError::Provider(err.to_string()))?;
            match retrieval {
                RetrievalRequest::Accepted => {
                    repo::tiles::mark_requested(self.store, tile.id).await?;
                    info!(
                        tile_id = tile.id,
                        product_id = %tile.product_id,
                        "offline tier, async retrieval requested"
                    );
                }
                RetrievalRequest::Rejected => {
                    warn!(
                        tile_id = tile.id,
                        product_id = %tile.product_id,
                        "async retrieval request rejected"
                    );
                }
            }
            return Ok(TileAdvance::Deferred);
        }

        let download = self
            .provider
            .download(&tile.product_id, &self.layout.archives_dir())
            .await
            .map_err(|err| PipelineError::Provider(err.to_string()))?;

        match download {
            DownloadOutcome::Completed => {
                repo::tiles::mark_downloaded(self.store, tile.id).await?;
                self.unpack_tile(tile).await
            }
            DownloadOutcome::Deferred => {
                repo::tiles::mark_requested(self.store, tile.id).await?;
                Ok(TileAdvance::Deferred)
            }
        }
    }

    async fn unpack_tile(&self, tile: &TileRecord) -> Result<TileAdvance> {
        let archive = self.layout.archive_path(&tile.folder_name);
        let extracted = self.extractor.unpack(&archive, &self.layout.tiles_dir())?;
        if extracted != tile.folder_name {
            warn!(
                tile_id = tile.id,
                expected = %tile.folder_name,
                extracted = %extracted,
                "archive folder name differs from provider metadata"
            );
        }
        repo::tiles::mark_unpacked(self.store, tile.id).await?;
        self.probe_spatial_reference(tile.id, &self.layout.tile_dir(&tile.folder_name))
            .await?;
        Ok(TileAdvance::Unpacked)
    }

    async fn probe_spatial_reference(&self, tile_id: i64, folder: &Path) -> Result<()> {
        if let Some(srs) = self.cropper.spatial_reference(folder) {
            repo::tiles::set_spatial_reference(self.store, tile_id, &srs).await?;
        }
        Ok(())
    }
}
