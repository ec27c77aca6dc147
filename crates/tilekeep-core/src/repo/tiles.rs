// crates/tilekeep-core/src/repo/tiles.rs

use chrono::Utc;
use tracing::{debug, info};

use crate::db::Store;
use crate::error::Result;
use crate::types::{NewTile, TileRecord, TileStatus};

/// Register-or-refresh by (platform, product id). Re-running a search never
/// creates a duplicate tile row; a repeat only refreshes the
/// last-download-request timestamp. This is what makes the whole pipeline
/// resumable after interruption.
pub async fn find_or_register(store: &Store, tile: &NewTile) -> Result<i64> {
    let now = Utc::now();

    let existing = store
        .retrying(|| {
            let pool = store.pool().clone();
            let tile = tile.clone();
            async move {
                sqlx::query_scalar::<_, i64>(
                    "SELECT id FROM tiles WHERE platform = ?1 AND product_id = ?2",
                )
                .bind(tile.platform)
                .bind(tile.product_id.clone())
                .fetch_optional(&pool)
                .await
            }
        })
        .await?;

    if let Some(id) = existing {
        store
            .retrying(|| {
                let pool = store.pool().clone();
                async move {
                    sqlx::query("UPDATE tiles SET last_requested_at = ?1 WHERE id = ?2")
                        .bind(now)
                        .bind(id)
                        .execute(&pool)
                        .await
                        .map(|_| ())
                }
            })
            .await?;
        debug!(tile_id = id, product_id = %tile.product_id, "tile already registered");
        return Ok(id);
    }

    let id = store
        .retrying(|| {
            let pool = store.pool().clone();
            let tile = tile.clone();
            async move {
                sqlx::query(
                    r#"
                    INSERT INTO tiles (
                        platform, product_id, folder_name, sensing_begin, sensing_end,
                        status, first_requested_at, last_requested_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    "#,
                )
                .bind(tile.platform)
                .bind(tile.product_id.clone())
                .bind(tile.folder_name.clone())
                .bind(tile.sensing_begin)
                .bind(tile.sensing_end)
                .bind(TileStatus::Pending)
                .bind(now)
                .bind(now)
                .execute(&pool)
                .await
                .map(|result| result.last_insert_rowid())
            }
        })
        .await?;

    info!(tile_id = id, product_id = %tile.product_id, "registered tile");
    Ok(id)
}

pub async fn get(store: &Store, id: i64) -> Result<TileRecord> {
    store
        .retrying(|| {
            let pool = store.pool().clone();
            async move {
                sqlx::query_as::<_, TileRecord>("SELECT * FROM tiles WHERE id = ?1")
                    .bind(id)
                    .fetch_one(&pool)
                    .await
            }
        })
        .await
}

pub async fn list(store: &Store) -> Result<Vec<TileRecord>> {
    store
        .retrying(|| {
            let pool = store.pool().clone();
            async move {
                sqlx::query_as::<_, TileRecord>("SELECT * FROM tiles ORDER BY id")
                    .fetch_all(&pool)
                    .await
            }
        })
        .await
}

/// An async retrieval was accepted for an offline-tier product; the tile is
/// to be revisited by a later pass.
pub async fn mark_requested(store: &Store, id: i64) -> Result<()> {
    store
        .retrying(|| {
            let pool = store.pool().clone();
            async move {
                sqlx::query("UPDATE tiles SET status = ?1 WHERE id = ?2 AND status = ?3")
                    .bind(TileStatus::Requested)
                    .bind(id)
                    .bind(TileStatus::Pending)
                    .execute(&pool)
                    .await
                    .map(|_| ())
            }
        })
        .await
}

/// Monotonic forward transition; a no-op when the tile already moved past
/// the downloaded state.
pub async fn mark_downloaded(store: &Store, id: i64) -> Result<()> {
    let now = Utc::now();
    store
        .retrying(|| {
            let pool = store.pool().clone();
            async move {
                sqlx::query(
                    "UPDATE tiles SET status = ?1, downloaded_at = ?2 \
                     WHERE id = ?3 AND status IN (?4, ?5)",
                )
                .bind(TileStatus::Downloaded)
                .bind(now)
                .bind(id)
                .bind(TileStatus::Pending)
                .bind(TileStatus::Requested)
                .execute(&pool)
                .await
                .map(|_| ())
            }
        })
        .await
}

pub async fn mark_unpacked(store: &Store, id: i64) -> Result<()> {
    let now = Utc::now();
    store
        .retrying(|| {
            let pool = store.pool().clone();
            async move {
                sqlx::query(
                    "UPDATE tiles SET status = ?1, unpacked_at = ?2 \
                     WHERE id = ?3 AND status = ?4",
                )
                .bind(TileStatus::Unpacked)
                .bind(now)
                .bind(id)
                .bind(TileStatus::Downloaded)
                .execute(&pool)
                .await
                .map(|_| ())
            }
        })
        .await
}

/// Self-healing reversal: the store believed the tile was downloaded but the
/// artifact is gone from disk. The row is reset, never deleted.
pub async fn clear_downloaded(store: &Store, id: i64) -> Result<()> {
    store
        .retrying(|| {
            let pool = store.pool().clone();
            async move {
                sqlx::query(
                    "UPDATE tiles SET status = ?1, downloaded_at = NULL, unpacked_at = NULL \
                     WHERE id = ?2 AND status IN (?3, ?4)",
                )
                .bind(TileStatus::Pending)
                .bind(id)
                .bind(TileStatus::Downloaded)
                .bind(TileStatus::Unpacked)
                .execute(&pool)
                .await
                .map(|_| ())
            }
        })
        .await
}

/// The unpacked folder vanished but the archive is still on disk: fall back
/// one stage so the next pass re-extracts.
pub async fn clear_unpacked(store: &Store, id: i64) -> Result<()> {
    store
        .retrying(|| {
            let pool = store.pool().clone();
            async move {
                sqlx::query(
                    "UPDATE tiles SET status = ?1, unpacked_at = NULL \
                     WHERE id = ?2 AND status = ?3",
                )
                .bind(TileStatus::Downloaded)
                .bind(id)
                .bind(TileStatus::Unpacked)
                .execute(&pool)
                .await
                .map(|_| ())
            }
        })
        .await
}

/// Spatial reference extracted from the raster after download; written once.
pub async fn set_spatial_reference(store: &Store, id: i64, srs: &str) -> Result<()> {
    store
        .retrying(|| {
            let pool = store.pool().clone();
            let srs = srs.to_string();
            async move {
                sqlx::query(
                    "UPDATE tiles SET spatial_reference = ?1 \
                     WHERE id = ?2 AND spatial_reference IS NULL",
                )
                .bind(srs)
                .bind(id)
                .execute(&pool)
                .await
                .map(|_| ())
            }
        })
        .await
}

pub async fn cancel(store: &Store, id: i64) -> Result<()> {
    let now = Utc::now();
    store
        .retrying(|| {
            let pool = store.pool().clone();
            async move {
                sqlx::query(
                    "UPDATE tiles SET status = ?1, cancelled_at = ?2 \
                     WHERE id = ?3 AND cancelled_at IS NULL",
                )
                .bind(TileStatus::Cancelled)
                .bind(now)
                .bind(id)
                .execute(&pool)
                .await
                .map(|_| ())
            }
        })
        .await
}

/// Tiles whose download has not completed yet, surfaced for the resume pass.
pub async fn pending_download(store: &Store) -> Result<Vec<TileRecord>> {
    store
        .retrying(|| {
            let pool = store.pool().clone();
            async move {
                sqlx::query_as::<_, TileRecord>(
                    "SELECT * FROM tiles \
                     WHERE status IN (?1, ?2) AND cancelled_at IS NULL ORDER BY id",
                )
                .bind(TileStatus::Pending)
                .bind(TileStatus::Requested)
                .fetch_all(&pool)
                .await
            }
        })
        .await
}

/// Tiles downloaded but still packed.
pub async fn pending_unpack(store: &Store) -> Result<Vec<TileRecord>> {
    store
        .retrying(|| {
            let pool = store.pool().clone();
            async move {
                sqlx::query_as::<_, TileRecord>(
                    "SELECT * FROM tiles \
                     WHERE status = ?1 AND cancelled_at IS NULL ORDER BY id",
                )
                .bind(TileStatus::Downloaded)
                .fetch_all(&pool)
                .await
            }
        })
        .await
}
