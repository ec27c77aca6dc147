// crates/tilekeep-core/src/schema.rs
//
// Declarative table layout plus the additive bootstrap that runs before any
// query. Columns are only ever added, never removed or retyped, so every
// definition must stay valid as an `ALTER TABLE .. ADD COLUMN` clause
// (no bare NOT NULL without a default).

use std::collections::HashSet;

use sqlx::Row;
use tracing::info;

use crate::db::DbPool;
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub definition: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    pub name: &'static str,
    pub columns: &'static [ColumnSpec],
    pub constraints: &'static [&'static str],
}

const POI_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec { name: "group_name", definition: "TEXT" },
    ColumnSpec { name: "country", definition: "TEXT" },
    ColumnSpec { name: "lat", definition: "REAL" },
    ColumnSpec { name: "lon", definition: "REAL" },
    ColumnSpec { name: "date_from", definition: "TEXT" },
    ColumnSpec { name: "date_to", definition: "TEXT" },
    ColumnSpec { name: "platform", definition: "TEXT" },
    ColumnSpec { name: "polarisation_mode", definition: "TEXT" },
    ColumnSpec { name: "product_type", definition: "TEXT" },
    ColumnSpec { name: "sensor_mode", definition: "TEXT" },
    ColumnSpec { name: "swath", definition: "TEXT" },
    ColumnSpec { name: "cloud_cover_pct", definition: "INTEGER" },
    ColumnSpec { name: "timeliness", definition: "TEXT" },
    ColumnSpec { name: "orbit_direction", definition: "TEXT" },
    ColumnSpec { name: "width_m", definition: "INTEGER" },
    ColumnSpec { name: "height_m", definition: "INTEGER" },
    ColumnSpec { name: "tile_limit", definition: "INTEGER" },
    ColumnSpec { name: "tile_start", definition: "INTEGER" },
    ColumnSpec { name: "description", definition: "TEXT" },
    ColumnSpec { name: "created_at", definition: "TEXT" },
    ColumnSpec { name: "tiles_identified_at", definition: "TEXT" },
    ColumnSpec { name: "cancelled_at", definition: "TEXT" },
];

const TILE_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec { name: "platform", definition: "TEXT" },
    ColumnSpec { name: "product_id", definition: "TEXT" },
    ColumnSpec { name: "folder_name", definition: "TEXT" },
    ColumnSpec { name: "sensing_begin", definition: "TEXT" },
    ColumnSpec { name: "sensing_end", definition: "TEXT" },
    ColumnSpec { name: "status", definition: "TEXT NOT NULL DEFAULT 'pending'" },
    ColumnSpec { name: "first_requested_at", definition: "TEXT" },
    ColumnSpec { name: "last_requested_at", definition: "TEXT" },
    ColumnSpec { name: "downloaded_at", definition: "TEXT" },
    ColumnSpec { name: "unpacked_at", definition: "TEXT" },
    ColumnSpec { name: "cancelled_at", definition: "TEXT" },
    ColumnSpec { name: "spatial_reference", definition: "TEXT" },
];

const POI_TILE_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec { name: "poi_id", definition: "INTEGER" },
    ColumnSpec { name: "tile_id", definition: "INTEGER" },
    ColumnSpec { name: "status", definition: "TEXT NOT NULL DEFAULT 'pending'" },
    ColumnSpec { name: "crop_path", definition: "TEXT" },
    ColumnSpec { name: "cropped_at", definition: "TEXT" },
    ColumnSpec { name: "cancelled_at", definition: "TEXT" },
    ColumnSpec { name: "scl_no_data", definition: "REAL" },
    ColumnSpec { name: "scl_saturated_defective", definition: "REAL" },
    ColumnSpec { name: "scl_dark_area", definition: "REAL" },
    ColumnSpec { name: "scl_cloud_shadow", definition: "REAL" },
    ColumnSpec { name: "scl_vegetation", definition: "REAL" },
    ColumnSpec { name: "scl_not_vegetated", definition: "REAL" },
    ColumnSpec { name: "scl_water", definition: "REAL" },
    ColumnSpec { name: "scl_unclassified", definition: "REAL" },
    ColumnSpec { name: "scl_cloud_medium_prob", definition: "REAL" },
    ColumnSpec { name: "scl_cloud_high_prob", definition: "REAL" },
    ColumnSpec { name: "scl_thin_cirrus", definition: "REAL" },
    ColumnSpec { name: "scl_snow_ice", definition: "REAL" },
];

const CSV_INPUT_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec { name: "batch_id", definition: "TEXT" },
    ColumnSpec { name: "group_name", definition: "TEXT" },
    ColumnSpec { name: "lat", definition: "REAL" },
    ColumnSpec { name: "lon", definition: "REAL" },
    ColumnSpec { name: "date_from", definition: "TEXT" },
    ColumnSpec { name: "date_to", definition: "TEXT" },
    ColumnSpec { name: "platform", definition: "TEXT" },
    ColumnSpec { name: "polarisation_mode", definition: "TEXT" },
    ColumnSpec { name: "product_type", definition: "TEXT" },
    ColumnSpec { name: "sensor_mode", definition: "TEXT" },
    ColumnSpec { name: "swath", definition: "TEXT" },
    ColumnSpec { name: "cloud_cover_pct", definition: "INTEGER" },
    ColumnSpec { name: "timeliness", definition: "TEXT" },
    ColumnSpec { name: "orbit_direction", definition: "TEXT" },
    ColumnSpec { name: "width_m", definition: "INTEGER" },
    ColumnSpec { name: "height_m", definition: "INTEGER" },
    ColumnSpec { name: "tile_limit", definition: "INTEGER" },
    ColumnSpec { name: "tile_start", definition: "INTEGER" },
    ColumnSpec { name: "description", definition: "TEXT" },
    ColumnSpec { name: "imported_at", definition: "TEXT" },
];

const CSV_LOADED_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec { name: "batch_id", definition: "TEXT" },
    ColumnSpec { name: "group_name", definition: "TEXT" },
    ColumnSpec { name: "lat", definition: "REAL" },
    ColumnSpec { name: "lon", definition: "REAL" },
    ColumnSpec { name: "date_from", definition: "TEXT" },
    ColumnSpec { name: "date_to", definition: "TEXT" },
    ColumnSpec { name: "platform", definition: "TEXT" },
    ColumnSpec { name: "polarisation_mode", definition: "TEXT" },
    ColumnSpec { name: "product_type", definition: "TEXT" },
    ColumnSpec { name: "sensor_mode", definition: "TEXT" },
    ColumnSpec { name: "swath", definition: "TEXT" },
    ColumnSpec { name: "cloud_cover_pct", definition: "INTEGER" },
    ColumnSpec { name: "timeliness", definition: "TEXT" },
    ColumnSpec { name: "orbit_direction", definition: "TEXT" },
    ColumnSpec { name: "width_m", definition: "INTEGER" },
    ColumnSpec { name: "height_m", definition: "INTEGER" },
    ColumnSpec { name: "tile_limit", definition: "INTEGER" },
    ColumnSpec { name: "tile_start", definition: "INTEGER" },
    ColumnSpec { name: "description", definition: "TEXT" },
    ColumnSpec { name: "imported_at", definition: "TEXT" },
    ColumnSpec { name: "loaded_at", definition: "TEXT" },
];

pub const TABLES: &[TableSpec] = &[
    TableSpec {
        name: "points_of_interest",
        columns: POI_COLUMNS,
        constraints: &[],
    },
    TableSpec {
        name: "tiles",
        columns: TILE_COLUMNS,
        constraints: &["UNIQUE (platform, product_id)"],
    },
    TableSpec {
        name: "poi_tiles",
        columns: POI_TILE_COLUMNS,
        constraints: &["UNIQUE (poi_id, tile_id)"],
    },
    TableSpec {
        name: "csv_input",
        columns: CSV_INPUT_COLUMNS,
        constraints: &[],
    },
    TableSpec {
        name: "csv_loaded",
        columns: CSV_LOADED_COLUMNS,
        constraints: &[],
    },
];

fn create_sql(table: &TableSpec) -> String {
    // Plain INTEGER PRIMARY KEY: row ids are the identity other tables hold,
    // which is why no code path ever deletes a row from these tables.
    let mut parts: Vec<String> = vec!["id INTEGER PRIMARY KEY".to_string()];
    parts.extend(
        table
            .columns
            .iter()
            .map(|column| format!("{} {}", column.name, column.definition)),
    );
    parts.extend(table.constraints.iter().map(|c| (*c).to_string()));
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        table.name,
        parts.join(", ")
    )
}

/// Bring the store file up to the declared layout: create missing tables,
/// then add any declared column a table is missing. Idempotent across
/// repeated startups; must run before any other query.
pub async fn bootstrap(pool: &DbPool) -> Result<()> {
    for table in TABLES {
        sqlx::query(&create_sql(table))
            .execute(pool)
            .await
            .map_err(PipelineError::SchemaBootstrap)?;

        let existing = existing_columns(pool, table.name).await?;
        for column in table.columns {
            if existing.contains(column.name) {
                continue;
            }
            let ddl = format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                table.name, column.name, column.definition
            );
            sqlx::query(&ddl)
                .execute(pool)
                .await
                .map_err(PipelineError::SchemaBootstrap)?;
            info!(table = table.name, column = column.name, "added missing column");
        }
    }
    Ok(())
}

async fn existing_columns(pool: &DbPool, table: &str) -> Result<HashSet<String>> {
    // PRAGMA arguments cannot be bound; table names come from the static
    // declarations above, never from input.
    let rows = sqlx::query(&format!("PRAGMA table_info({})", table))
        .fetch_all(pool)
        .await
        .map_err(PipelineError::SchemaBootstrap)?;

    let mut columns = HashSet::with_capacity(rows.len());
    for row in rows {
        let name: String = row
            .try_get("name")
            .map_err(PipelineError::SchemaBootstrap)?;
        columns.insert(name);
    }
    Ok(columns)
}
