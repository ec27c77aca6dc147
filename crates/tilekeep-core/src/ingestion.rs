// crates/tilekeep-core/src/ingestion.rs
//
// CSV request ingestion: raw rows are staged into the store first, then a
// separate drain turns each staged row into an acquisition run. A row leaves
// the queue only after its run succeeded; anything else stays for a later
// pass.

use std::io::Read;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::acquisition::AcquisitionOrchestrator;
use crate::db::Store;
use crate::error::Result;
use crate::repo::staging;

/// One request row as it appears in an import CSV. Numeric optionals are
/// `Option` so empty CSV fields deserialize cleanly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRow {
    pub group: String,
    pub lat: f64,
    pub lon: f64,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub platform: String,
    #[serde(default)]
    pub polarisation_mode: Option<String>,
    #[serde(default)]
    pub product_type: Option<String>,
    #[serde(default)]
    pub sensor_mode: Option<String>,
    #[serde(default)]
    pub swath: Option<String>,
    #[serde(default)]
    pub cloud_cover_pct: Option<i64>,
    #[serde(default)]
    pub timeliness: Option<String>,
    #[serde(default)]
    pub orbit_direction: Option<String>,
    #[serde(default)]
    pub width_m: Option<i64>,
    #[serde(default)]
    pub height_m: Option<i64>,
    #[serde(default)]
    pub tile_limit: Option<i64>,
    #[serde(default)]
    pub tile_start: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct ImportSummary {
    pub batch_id: Uuid,
    pub imported: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessSummary {
    pub processed: usize,
    pub archived: usize,
    pub failed: usize,
}

pub fn read_rows<R: Read>(reader: R) -> Result<Vec<RequestRow>> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();
    for record in reader.deserialize::<RequestRow>() {
        rows.push(record?);
    }
    Ok(rows)
}

/// Stage every row of one CSV under a fresh batch id.
pub async fn import<R: Read>(store: &Store, reader: R) -> Result<ImportSummary> {
    let rows = read_rows(reader)?;
    let batch_id = Uuid::new_v4();
    for row in &rows {
        staging::enqueue(store, batch_id, row).await?;
    }
    info!(batch = %batch_id, imported = rows.len(), "staged csv requests");
    Ok(ImportSummary {
        batch_id,
        imported: rows.len(),
    })
}

/// Drain the staging queue through the acquisition orchestrator. Successful
/// rows move to the archive table; invalid or failed rows stay queued.
pub async fn process(
    store: &Store,
    orchestrator: &AcquisitionOrchestrator<'_>,
) -> Result<ProcessSummary> {
    let rows = staging::staged(store).await?;
    let mut summary = ProcessSummary::default();

    for row in rows {
        summary.processed += 1;
        let request = match row.to_request() {
            Ok(request) => request,
            Err(err) => {
                warn!(row_id = row.id, error = %err, "staged row invalid, leaving queued");
                summary.failed += 1;
                continue;
            }
        };

        match orchestrator.run(&request).await {
            Ok(outcome) => {
                staging::archive(store, row.id).await?;
                summary.archived += 1;
                info!(
                    row_id = row.id,
                    poi_id = outcome.poi_id,
                    considered = outcome.considered,
                    "staged request processed"
                );
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                warn!(row_id = row.id, error = %err, "staged request failed, leaving queued");
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}
