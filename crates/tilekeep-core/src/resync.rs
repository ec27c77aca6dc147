// crates/tilekeep-core/src/resync.rs
//
// Store-versus-filesystem reconciliation. `plan` reports tiles whose
// recorded state claims an artifact the disk no longer has; `apply` clears
// the affected flags so the next acquisition pass repairs them. Rows are
// reset, never deleted.

use tracing::info;

use crate::db::Store;
use crate::error::Result;
use crate::layout::DataLayout;
use crate::repo;
use crate::types::TileStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResyncAction {
    /// Folder gone but the archive survived: fall back to downloaded.
    ClearUnpacked,
    /// Neither folder nor archive on disk: fall back to pending.
    ClearDownloaded,
}

#[derive(Debug, Clone)]
pub struct ResyncFinding {
    pub tile_id: i64,
    pub product_id: String,
    pub folder_name: String,
    pub action: ResyncAction,
}

#[derive(Debug, Clone, Default)]
pub struct ResyncReport {
    pub findings: Vec<ResyncFinding>,
}

impl ResyncReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

pub async fn plan(store: &Store, layout: &DataLayout) -> Result<ResyncReport> {
    let tiles = repo::tiles::list(store).await?;
    let mut findings = Vec::new();

    for tile in tiles {
        let folder = layout.tile_dir(&tile.folder_name);
        let archive = layout.archive_path(&tile.folder_name);

        let action = match tile.status {
            TileStatus::Unpacked if !folder.is_dir() => {
                if archive.is_file() {
                    Some(ResyncAction::ClearUnpacked)
                } else {
                    Some(ResyncAction::ClearDownloaded)
                }
            }
            TileStatus::Downloaded if !archive.is_file() && !folder.is_dir() => {
                Some(ResyncAction::ClearDownloaded)
            }
            _ => None,
        };

        if let Some(action) = action {
            findings.push(ResyncFinding {
                tile_id: tile.id,
                product_id: tile.product_id,
                folder_name: tile.folder_name,
                action,
            });
        }
    }

    Ok(ResyncReport { findings })
}

pub async fn apply(store: &Store, report: &ResyncReport) -> Result<()> {
    for finding in &report.findings {
        match finding.action {
            ResyncAction::ClearUnpacked => {
                repo::tiles::clear_unpacked(store, finding.tile_id).await?;
            }
            ResyncAction::ClearDownloaded => {
                repo::tiles::clear_downloaded(store, finding.tile_id).await?;
            }
        }
        info!(
            tile_id = finding.tile_id,
            product_id = %finding.product_id,
            action = ?finding.action,
            "cleared stale tile state"
        );
    }
    Ok(())
}
