// crates/tilekeep-core/src/repo/staging.rs
//
// CSV staging queue. `csv_input` is append-only; the only sanctioned removal
// anywhere in the store is the copy-to-archive-then-delete step below, and it
// runs as one transaction against a table nothing else references.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::db::Store;
use crate::error::{PipelineError, Result};
use crate::filters::SearchFilters;
use crate::ingestion::RequestRow;
use crate::types::{Platform, PoiRequest};

#[derive(Debug, Clone, FromRow)]
pub struct StagedRow {
    pub id: i64,
    pub batch_id: String,
    pub group_name: String,
    pub lat: f64,
    pub lon: f64,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    /// Raw platform text from the CSV; parsed when the row becomes a request
    /// so a bad value stays queued instead of poisoning the import.
    pub platform: String,
    pub polarisation_mode: Option<String>,
    pub product_type: Option<String>,
    pub sensor_mode: Option<String>,
    pub swath: Option<String>,
    pub cloud_cover_pct: Option<i64>,
    pub timeliness: Option<String>,
    pub orbit_direction: Option<String>,
    pub width_m: Option<i64>,
    pub height_m: Option<i64>,
    pub tile_limit: i64,
    pub tile_start: i64,
    pub description: Option<String>,
    pub imported_at: DateTime<Utc>,
}

impl StagedRow {
    pub fn to_request(&self) -> Result<PoiRequest> {
        let platform = Platform::parse(&self.platform).map_err(PipelineError::Validation)?;
        Ok(PoiRequest {
            group: self.group_name.clone(),
            lat: self.lat,
            lon: self.lon,
            date_from: self.date_from,
            date_to: self.date_to,
            platform,
            filters: SearchFilters {
                polarisation_mode: self.polarisation_mode.clone(),
                product_type: self.product_type.clone(),
                sensor_mode: self.sensor_mode.clone(),
                swath: self.swath.clone(),
                cloud_cover_pct: self.cloud_cover_pct,
                timeliness: self.timeliness.clone(),
                orbit_direction: self.orbit_direction.clone(),
            },
            width_m: self.width_m,
            height_m: self.height_m,
            tile_limit: self.tile_limit,
            tile_start: self.tile_start,
            description: self.description.clone(),
        })
    }
}

pub async fn enqueue(store: &Store, batch_id: Uuid, row: &RequestRow) -> Result<i64> {
    let now = Utc::now();
    store
        .retrying(|| {
            let pool = store.pool().clone();
            let row = row.clone();
            let batch = batch_id.to_string();
            async move {
                sqlx::query(
                    r#"
                    INSERT INTO csv_input (
                        batch_id, group_name, lat, lon, date_from, date_to, platform,
                        polarisation_mode, product_type, sensor_mode, swath,
                        cloud_cover_pct, timeliness, orbit_direction,
                        width_m, height_m, tile_limit, tile_start, description, imported_at
                    ) VALUES (
                        ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                        ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20
                    )
                    "#,
                )
                .bind(batch)
                .bind(row.group.clone())
                .bind(row.lat)
                .bind(row.lon)
                .bind(row.date_from)
                .bind(row.date_to)
                .bind(row.platform.clone())
                .bind(row.polarisation_mode.clone())
                .bind(row.product_type.clone())
                .bind(row.sensor_mode.clone())
                .bind(row.swath.clone())
                .bind(row.cloud_cover_pct)
                .bind(row.timeliness.clone())
                .bind(row.orbit_direction.clone())
                .bind(row.width_m)
                .bind(row.height_m)
                .bind(row.tile_limit.unwrap_or(1))
                .bind(row.tile_start.unwrap_or(0))
                .bind(row.description.clone())
                .bind(now)
                .execute(&pool)
                .await
                .map(|result| result.last_insert_rowid())
            }
        })
        .await
}

pub async fn staged(store: &Store) -> Result<Vec<StagedRow>> {
    store
        .retrying(|| {
            let pool = store.pool().clone();
            async move {
                sqlx::query_as::<_, StagedRow>("SELECT * FROM csv_input ORDER BY id")
                    .fetch_all(&pool)
                    .await
            }
        })
        .await
}

pub async fn loaded_count(store: &Store) -> Result<i64> {
    store
        .retrying(|| {
            let pool = store.pool().clone();
            async move {
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM csv_loaded")
                    .fetch_one(&pool)
                    .await
            }
        })
        .await
}

/// Move one processed row to the archive table. Copy and delete commit
/// together or not at all.
pub async fn archive(store: &Store, id: i64) -> Result<()> {
    let now = Utc::now();
    store
        .retrying(|| {
            let pool = store.pool().clone();
            async move {
                let mut tx = pool.begin().await?;
                sqlx::query(
                    r#"
                    INSERT INTO csv_loaded (
                        batch_id, group_name, lat, lon, date_from, date_to, platform,
                        polarisation_mode, product_type, sensor_mode, swath,
                        cloud_cover_pct, timeliness, orbit_direction,
                        width_m, height_m, tile_limit, tile_start, description,
                        imported_at, loaded_at
                    )
                    SELECT
                        batch_id, group_name, lat, lon, date_from, date_to, platform,
                        polarisation_mode, product_type, sensor_mode, swath,
                        cloud_cover_pct, timeliness, orbit_direction,
                        width_m, height_m, tile_limit, tile_start, description,
                        imported_at, ?1
                    FROM csv_input WHERE id = ?2
                    "#,
                )
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
                sqlx::query("DELETE FROM csv_input WHERE id = ?1")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await
            }
        })
        .await
}
