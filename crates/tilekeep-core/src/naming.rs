// crates/tilekeep-core/src/naming.rs

use crate::filters::{FilterValue, SearchFilters, ALL_FILTER_FIELDS};
use crate::types::PoiRecord;

/// Deterministic directory name for a POI's crop outputs, encoding the full
/// request key: group, location, `df`/`dt` date window, `pf` platform code,
/// one token per set filter (`cc10` etc.), tile bounds and crop size.
/// Identical requests always land in the same directory across runs.
pub fn poi_dir_name(poi: &PoiRecord) -> String {
    let mut name = format!(
        "{}_lat{}_lon{}_df{}_dt{}_pf{}",
        sanitize(&poi.group_name),
        fmt_coord(poi.lat),
        fmt_coord(poi.lon),
        poi.date_from.format("%Y%m%d"),
        poi.date_to.format("%Y%m%d"),
        poi.platform.short_code(),
    );

    let filters = SearchFilters {
        polarisation_mode: poi.polarisation_mode.clone(),
        product_type: poi.product_type.clone(),
        sensor_mode: poi.sensor_mode.clone(),
        swath: poi.swath.clone(),
        cloud_cover_pct: poi.cloud_cover_pct,
        timeliness: poi.timeliness.clone(),
        orbit_direction: poi.orbit_direction.clone(),
    };
    for field in ALL_FILTER_FIELDS {
        match field.value(&filters) {
            Some(FilterValue::Text(text)) => {
                name.push('_');
                name.push_str(field.token());
                name.push_str(&sanitize(text));
            }
            Some(FilterValue::Int(value)) => {
                name.push('_');
                name.push_str(field.token());
                name.push_str(&value.to_string());
            }
            None => {}
        }
    }

    name.push_str(&format!("_tl{}", poi.tile_limit));
    if poi.tile_start > 0 {
        name.push_str(&format!("_ts{}", poi.tile_start));
    }
    if let (Some(width), Some(height)) = (poi.width_m, poi.height_m) {
        name.push_str(&format!("_w{}_h{}", width, height));
    }

    name
}

/// Minus signs become `m` so the name stays shell-friendly; `48.0` prints
/// as `48`.
fn fmt_coord(value: f64) -> String {
    let text = format!("{}", value);
    text.replace('-', "m")
}

fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}
