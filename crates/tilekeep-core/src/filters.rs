// crates/tilekeep-core/src/filters.rs
//
// Enumerated configuration for the optional platform-specific search filters.
// Every filter is part of the POI uniqueness key: an absent filter must match
// only rows where the column IS NULL, so lookups always cover the full set.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::types::Platform;

/// Optional provider-search filters carried by a request. All fields are part
/// of the POI key, including their absence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    pub polarisation_mode: Option<String>,
    pub product_type: Option<String>,
    pub sensor_mode: Option<String>,
    pub swath: Option<String>,
    pub cloud_cover_pct: Option<i64>,
    pub timeliness: Option<String>,
    pub orbit_direction: Option<String>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        ALL_FILTER_FIELDS
            .iter()
            .all(|field| field.value(self).is_none())
    }
}

/// A bound value for one filter column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterValue<'a> {
    Text(&'a str),
    Int(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    PolarisationMode,
    ProductType,
    SensorMode,
    Swath,
    CloudCoverPct,
    Timeliness,
    OrbitDirection,
}

pub const ALL_FILTER_FIELDS: [FilterField; 7] = [
    FilterField::PolarisationMode,
    FilterField::ProductType,
    FilterField::SensorMode,
    FilterField::Swath,
    FilterField::CloudCoverPct,
    FilterField::Timeliness,
    FilterField::OrbitDirection,
];

impl FilterField {
    /// Store column backing this filter.
    pub fn column(&self) -> &'static str {
        match self {
            FilterField::PolarisationMode => "polarisation_mode",
            FilterField::ProductType => "product_type",
            FilterField::SensorMode => "sensor_mode",
            FilterField::Swath => "swath",
            FilterField::CloudCoverPct => "cloud_cover_pct",
            FilterField::Timeliness => "timeliness",
            FilterField::OrbitDirection => "orbit_direction",
        }
    }

    /// Token prefix used in parameter-encoded directory names.
    pub fn token(&self) -> &'static str {
        match self {
            FilterField::PolarisationMode => "pm",
            FilterField::ProductType => "pt",
            FilterField::SensorMode => "sm",
            FilterField::Swath => "sw",
            FilterField::CloudCoverPct => "cc",
            FilterField::Timeliness => "tml",
            FilterField::OrbitDirection => "od",
        }
    }

    /// Whether a provider accepts this filter for the given platform.
    pub fn applies_to(&self, platform: Platform) -> bool {
        match self {
            FilterField::PolarisationMode
            | FilterField::SensorMode
            | FilterField::Swath
            | FilterField::Timeliness => platform == Platform::Sentinel1,
            FilterField::ProductType => {
                matches!(platform, Platform::Sentinel1 | Platform::Sentinel2)
            }
            FilterField::CloudCoverPct => matches!(
                platform,
                Platform::Sentinel2 | Platform::Landsat5 | Platform::Landsat7 | Platform::Landsat8
            ),
            FilterField::OrbitDirection => {
                matches!(platform, Platform::Sentinel1 | Platform::Sentinel2)
            }
        }
    }

    pub fn value<'a>(&self, filters: &'a SearchFilters) -> Option<FilterValue<'a>> {
        match self {
            FilterField::PolarisationMode => filters
                .polarisation_mode
                .as_deref()
                .map(FilterValue::Text),
            FilterField::ProductType => filters.product_type.as_deref().map(FilterValue::Text),
            FilterField::SensorMode => filters.sensor_mode.as_deref().map(FilterValue::Text),
            FilterField::Swath => filters.swath.as_deref().map(FilterValue::Text),
            FilterField::CloudCoverPct => filters.cloud_cover_pct.map(FilterValue::Int),
            FilterField::Timeliness => filters.timeliness.as_deref().map(FilterValue::Text),
            FilterField::OrbitDirection => {
                filters.orbit_direction.as_deref().map(FilterValue::Text)
            }
        }
    }
}

/// Reject filters that the target platform's provider does not understand.
/// Runs at the repository boundary, before any row is written.
pub fn validate(filters: &SearchFilters, platform: Platform) -> Result<()> {
    for field in ALL_FILTER_FIELDS {
        if field.value(filters).is_some() && !field.applies_to(platform) {
            return Err(PipelineError::Validation(format!(
                "filter '{}' does not apply to platform {}",
                field.column(),
                platform.as_str()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cloud_cover_applies_to_optical_platforms_only() {
        assert!(FilterField::CloudCoverPct.applies_to(Platform::Sentinel2));
        assert!(FilterField::CloudCoverPct.applies_to(Platform::Landsat8));
        assert!(!FilterField::CloudCoverPct.applies_to(Platform::Sentinel1));
    }

    #[test]
    fn validate_rejects_radar_filter_on_optical_platform() {
        let filters = SearchFilters {
            polarisation_mode: Some("VV".to_string()),
            ..SearchFilters::default()
        };
        let err = validate(&filters, Platform::Sentinel2).unwrap_err();
        assert!(err.to_string().contains("polarisation_mode"));
    }

    #[test]
    fn validate_accepts_cloud_cover_on_sentinel_2() {
        let filters = SearchFilters {
            cloud_cover_pct: Some(10),
            ..SearchFilters::default()
        };
        assert!(validate(&filters, Platform::Sentinel2).is_ok());
    }

    #[test]
    fn empty_filters_report_empty() {
        assert!(SearchFilters::default().is_empty());
        let filters = SearchFilters {
            swath: Some("IW".to_string()),
            ..SearchFilters::default()
        };
        assert!(!filters.is_empty());
    }
}
