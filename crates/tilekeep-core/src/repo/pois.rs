// crates/tilekeep-core/src/repo/pois.rs

use chrono::Utc;
use tracing::info;

use crate::db::Store;
use crate::error::Result;
use crate::filters::{self, FilterValue, ALL_FILTER_FIELDS};
use crate::geocode::CountryResolver;
use crate::types::{PoiRecord, PoiRequest};

/// Lookup-or-insert by the full request key. Safe to call repeatedly with
/// identical arguments: the same id comes back every time and no duplicate
/// row is ever created.
pub async fn find_or_create(
    store: &Store,
    resolver: &dyn CountryResolver,
    request: &PoiRequest,
) -> Result<i64> {
    filters::validate(&request.filters, request.platform)?;

    if let Some(id) = find(store, request).await? {
        return Ok(id);
    }

    let country = resolver.country_for(request.lat, request.lon);
    let id = insert(store, request, &country).await?;
    info!(
        poi_id = id,
        group = %request.group,
        country = %country,
        platform = %request.platform,
        "registered point of interest"
    );
    Ok(id)
}

/// The lookup must match on every key component, including the absence of
/// each optional filter (absent filter ⇒ column IS NULL). Anything less
/// conflates differently-filtered searches sharing the same core key.
fn lookup_sql(request: &PoiRequest) -> String {
    let mut sql = String::from(
        "SELECT id FROM points_of_interest \
         WHERE group_name = ? AND lat = ? AND lon = ? \
         AND date_from = ? AND date_to = ? AND platform = ? \
         AND tile_limit = ? AND tile_start = ?",
    );

    sql.push_str(if request.width_m.is_some() {
        " AND width_m = ?"
    } else {
        " AND width_m IS NULL"
    });
    sql.push_str(if request.height_m.is_some() {
        " AND height_m = ?"
    } else {
        " AND height_m IS NULL"
    });

    for field in ALL_FILTER_FIELDS {
        if field.value(&request.filters).is_some() {
            sql.push_str(&format!(" AND {} = ?", field.column()));
        } else {
            sql.push_str(&format!(" AND {} IS NULL", field.column()));
        }
    }
    sql
}

pub async fn find(store: &Store, request: &PoiRequest) -> Result<Option<i64>> {
    let sql = lookup_sql(request);
    store
        .retrying(|| {
            let pool = store.pool().clone();
            let sql = sql.clone();
            let request = request.clone();
            async move {
                let mut query = sqlx::query_scalar::<_, i64>(&sql)
                    .bind(request.group.clone())
                    .bind(request.lat)
                    .bind(request.lon)
                    .bind(request.date_from)
                    .bind(request.date_to)
                    .bind(request.platform)
                    .bind(request.tile_limit)
                    .bind(request.tile_start);
                if let Some(width) = request.width_m {
                    query = query.bind(width);
                }
                if let Some(height) = request.height_m {
                    query = query.bind(height);
                }
                for field in ALL_FILTER_FIELDS {
                    match field.value(&request.filters) {
                        Some(FilterValue::Text(text)) => query = query.bind(text.to_string()),
                        Some(FilterValue::Int(value)) => query = query.bind(value),
                        None => {}
                    }
                }
                query.fetch_optional(&pool).await
            }
        })
        .await
}

async fn insert(store: &Store, request: &PoiRequest, country: &str) -> Result<i64> {
    let now = Utc::now();
    store
        .retrying(|| {
            let pool = store.pool().clone();
            let request = request.clone();
            let country = country.to_string();
            async move {
                sqlx::query(
                    r#"
                    INSERT INTO points_of_interest (
                        group_name, country, lat, lon, date_from, date_to, platform,
                        polarisation_mode, product_type, sensor_mode, swath,
                        cloud_cover_pct, timeliness, orbit_direction,
                        width_m, height_m, tile_limit, tile_start, description, created_at
                    ) VALUES (
                        ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                        ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20
                    )
                    "#,
                )
                .bind(request.group.clone())
                .bind(country)
                .bind(request.lat)
                .bind(request.lon)
                .bind(request.date_from)
                .bind(request.date_to)
                .bind(request.platform)
                .bind(request.filters.polarisation_mode.clone())
                .bind(request.filters.product_type.clone())
                .bind(request.filters.sensor_mode.clone())
                .bind(request.filters.swath.clone())
                .bind(request.filters.cloud_cover_pct)
                .bind(request.filters.timeliness.clone())
                .bind(request.filters.orbit_direction.clone())
                .bind(request.width_m)
                .bind(request.height_m)
                .bind(request.tile_limit)
                .bind(request.tile_start)
                .bind(request.description.clone())
                .bind(now)
                .execute(&pool)
                .await
                .map(|result| result.last_insert_rowid())
            }
        })
        .await
}

pub async fn get(store: &Store, id: i64) -> Result<PoiRecord> {
    store
        .retrying(|| {
            let pool = store.pool().clone();
            async move {
                sqlx::query_as::<_, PoiRecord>("SELECT * FROM points_of_interest WHERE id = ?1")
                    .bind(id)
                    .fetch_one(&pool)
                    .await
            }
        })
        .await
}

pub async fn list(store: &Store) -> Result<Vec<PoiRecord>> {
    store
        .retrying(|| {
            let pool = store.pool().clone();
            async move {
                sqlx::query_as::<_, PoiRecord>("SELECT * FROM points_of_interest ORDER BY id")
                    .fetch_all(&pool)
                    .await
            }
        })
        .await
}

/// Terminal marker: no further provider queries are needed for this POI,
/// even if individual tiles are still mid-pipeline. Set once.
pub async fn mark_tiles_identified(store: &Store, id: i64) -> Result<()> {
    let now = Utc::now();
    store
        .retrying(|| {
            let pool = store.pool().clone();
            async move {
                sqlx::query(
                    "UPDATE points_of_interest SET tiles_identified_at = ?1 \
                     WHERE id = ?2 AND tiles_identified_at IS NULL",
                )
                .bind(now)
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
                    "UPDATE points_of_interest SET cancelled_at = ?1 \
                     WHERE id = ?2 AND cancelled_at IS NULL",
                )
                .bind(now)
                .bind(id)
                .execute(&pool)
                .await
                .map(|_| ())
            }
        })
        .await
}
