// crates/tilekeep-core/src/repo/links.rs

use std::path::Path;

use chrono::Utc;
use tracing::info;

use crate::db::Store;
use crate::error::Result;
use crate::repo::{pois, tiles};
use crate::types::{CropStatus, PoiRecord, PoiTileRecord, SceneClassRatios, TileRecord, TileStatus};

/// One POI/tile pair that is ready to crop: the tile is unpacked, the POI
/// carries a crop size, and nothing is cancelled or already cropped.
#[derive(Debug, Clone)]
pub struct CropWorkItem {
    pub assoc_id: i64,
    pub poi: PoiRecord,
    pub tile: TileRecord,
}

/// Create the association once per (poi, tile) pair. Re-linking is a no-op;
/// both records must already exist.
pub async fn link(store: &Store, poi_id: i64, tile_id: i64) -> Result<()> {
    store
        .retrying(|| {
            let pool = store.pool().clone();
            async move {
                sqlx::query(
                    "INSERT INTO poi_tiles (poi_id, tile_id, status) VALUES (?1, ?2, ?3) \
                     ON CONFLICT (poi_id, tile_id) DO NOTHING",
                )
                .bind(poi_id)
                .bind(tile_id)
                .bind(CropStatus::Pending)
                .execute(&pool)
                .await
                .map(|_| ())
            }
        })
        .await
}

pub async fn get(store: &Store, poi_id: i64, tile_id: i64) -> Result<Option<PoiTileRecord>> {
    store
        .retrying(|| {
            let pool = store.pool().clone();
            async move {
                sqlx::query_as::<_, PoiTileRecord>(
                    "SELECT * FROM poi_tiles WHERE poi_id = ?1 AND tile_id = ?2",
                )
                .bind(poi_id)
                .bind(tile_id)
                .fetch_optional(&pool)
                .await
            }
        })
        .await
}

pub async fn for_poi(store: &Store, poi_id: i64) -> Result<Vec<PoiTileRecord>> {
    store
        .retrying(|| {
            let pool = store.pool().clone();
            async move {
                sqlx::query_as::<_, PoiTileRecord>(
                    "SELECT * FROM poi_tiles WHERE poi_id = ?1 ORDER BY id",
                )
                .bind(poi_id)
                .fetch_all(&pool)
                .await
            }
        })
        .await
}

/// Tiles linked to a POI, for reconciling a POI whose search already ran.
pub async fn tiles_for_poi(store: &Store, poi_id: i64) -> Result<Vec<TileRecord>> {
    store
        .retrying(|| {
            let pool = store.pool().clone();
            async move {
                sqlx::query_as::<_, TileRecord>(
                    "SELECT t.* FROM tiles t \
                     JOIN poi_tiles a ON a.tile_id = t.id \
                     WHERE a.poi_id = ?1 ORDER BY t.id",
                )
                .bind(poi_id)
                .fetch_all(&pool)
                .await
            }
        })
        .await
}

/// Record a finished crop. Set once: a pair that is already cropped or
/// cancelled is left untouched.
pub async fn mark_cropped(
    store: &Store,
    assoc_id: i64,
    crop_path: &Path,
    ratios: Option<&SceneClassRatios>,
) -> Result<()> {
    let now = Utc::now();
    let path = crop_path.display().to_string();
    let values = ratios.map(|r| r.0);
    let updated = store
        .retrying(|| {
            let pool = store.pool().clone();
            let path = path.clone();
            async move {
                sqlx::query(
                    r#"
                    UPDATE poi_tiles SET
                        status = ?1, cropped_at = ?2, crop_path = ?3,
                        scl_no_data = ?4, scl_saturated_defective = ?5, scl_dark_area = ?6,
                        scl_cloud_shadow = ?7, scl_vegetation = ?8, scl_not_vegetated = ?9,
                        scl_water = ?10, scl_unclassified = ?11, scl_cloud_medium_prob = ?12,
                        scl_cloud_high_prob = ?13, scl_thin_cirrus = ?14, scl_snow_ice = ?15
                    WHERE id = ?16 AND status = ?17
                    "#,
                )
                .bind(CropStatus::Cropped)
                .bind(now)
                .bind(path)
                .bind(values.map(|v| v[0]))
                .bind(values.map(|v| v[1]))
                .bind(values.map(|v| v[2]))
                .bind(values.map(|v| v[3]))
                .bind(values.map(|v| v[4]))
                .bind(values.map(|v| v[5]))
                .bind(values.map(|v| v[6]))
                .bind(values.map(|v| v[7]))
                .bind(values.map(|v| v[8]))
                .bind(values.map(|v| v[9]))
                .bind(values.map(|v| v[10]))
                .bind(values.map(|v| v[11]))
                .bind(assoc_id)
                .bind(CropStatus::Pending)
                .execute(&pool)
                .await
                .map(|result| result.rows_affected())
            }
        })
        .await?;

    if updated > 0 {
        info!(assoc_id, crop_path = %crop_path.display(), "association cropped");
    }
    Ok(())
}

/// Permanently skip this pair's crop (unsupported platform or projection).
/// Never retried automatically.
pub async fn cancel_crop(store: &Store, assoc_id: i64) -> Result<()> {
    let now = Utc::now();
    store
        .retrying(|| {
            let pool = store.pool().clone();
            async move {
                sqlx::query(
                    "UPDATE poi_tiles SET status = ?1, cancelled_at = ?2 \
                     WHERE id = ?3 AND status = ?4",
                )
                .bind(CropStatus::Cancelled)
                .bind(now)
                .bind(assoc_id)
                .bind(CropStatus::Pending)
                .execute(&pool)
                .await
                .map(|_| ())
            }
        })
        .await
}

/// The crop scheduling query: join POI, tile and association and surface the
/// pairs whose previous stage succeeded and whose crop has not happened.
pub async fn crop_work(store: &Store) -> Result<Vec<CropWorkItem>> {
    let ids = store
        .retrying(|| {
            let pool = store.pool().clone();
            async move {
                sqlx::query_as::<_, (i64, i64, i64)>(
                    "SELECT a.id, a.poi_id, a.tile_id FROM poi_tiles a \
                     JOIN points_of_interest p ON p.id = a.poi_id \
                     JOIN tiles t ON t.id = a.tile_id \
                     WHERE a.status = ?1 AND a.cancelled_at IS NULL \
                     AND p.cancelled_at IS NULL \
                     AND p.width_m IS NOT NULL AND p.height_m IS NOT NULL \
                     AND t.status = ?2 AND t.cancelled_at IS NULL \
                     ORDER BY a.id",
                )
                .bind(CropStatus::Pending)
                .bind(TileStatus::Unpacked)
                .fetch_all(&pool)
                .await
            }
        })
        .await?;

    let mut items = Vec::with_capacity(ids.len());
    for (assoc_id, poi_id, tile_id) in ids {
        items.push(CropWorkItem {
            assoc_id,
            poi: pois::get(store, poi_id).await?,
            tile: tiles::get(store, tile_id).await?,
        });
    }
    Ok(items)
}
