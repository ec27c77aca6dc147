// crates/tilekeep-core/src/types.rs

use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{
    decode::Decode,
    encode::{Encode, IsNull},
    error::BoxDynError,
    sqlite::{Sqlite, SqliteArgumentValue, SqliteTypeInfo, SqliteValueRef},
    types::Type,
    FromRow,
};

use crate::filters::SearchFilters;

/// Satellite program / product family a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "Sentinel-1")]
    Sentinel1,
    #[serde(rename = "Sentinel-2")]
    Sentinel2,
    #[serde(rename = "Landsat-5")]
    Landsat5,
    #[serde(rename = "Landsat-7")]
    Landsat7,
    #[serde(rename = "Landsat-8")]
    Landsat8,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Sentinel1 => "Sentinel-1",
            Platform::Sentinel2 => "Sentinel-2",
            Platform::Landsat5 => "Landsat-5",
            Platform::Landsat7 => "Landsat-7",
            Platform::Landsat8 => "Landsat-8",
        }
    }

    /// Short code used in parameter-encoded directory names (`pfS2` etc.).
    pub fn short_code(&self) -> &'static str {
        match self {
            Platform::Sentinel1 => "S1",
            Platform::Sentinel2 => "S2",
            Platform::Landsat5 => "L5",
            Platform::Landsat7 => "L7",
            Platform::Landsat8 => "L8",
        }
    }

    pub fn all() -> [Platform; 5] {
        [
            Platform::Sentinel1,
            Platform::Sentinel2,
            Platform::Landsat5,
            Platform::Landsat7,
            Platform::Landsat8,
        ]
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        for platform in Platform::all() {
            if value.eq_ignore_ascii_case(platform.as_str())
                || value.eq_ignore_ascii_case(platform.short_code())
            {
                return Ok(platform);
            }
        }
        Err(format!("Unknown platform: '{}'", value))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Platform::parse(value)
    }
}

impl Type<Sqlite> for Platform {
    fn type_info() -> SqliteTypeInfo {
        <&str as Type<Sqlite>>::type_info()
    }
}

impl<'q> Encode<'q, Sqlite> for Platform {
    fn encode_by_ref(
        &self,
        args: &mut Vec<SqliteArgumentValue<'q>>,
    ) -> Result<IsNull, Box<dyn StdError + Send + Sync + 'static>> {
        args.push(SqliteArgumentValue::Text(Cow::Borrowed(self.as_str())));
        Ok(IsNull::No)
    }
}

impl<'r> Decode<'r, Sqlite> for Platform {
    fn decode(value: SqliteValueRef<'r>) -> Result<Self, BoxDynError> {
        let text = <&str as Decode<Sqlite>>::decode(value)?;
        Platform::parse(text).map_err(Into::into)
    }
}

/// Explicit tile lifecycle state. Replaces null-timestamp sentinels; the audit
/// timestamps on `TileRecord` record when each transition happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileStatus {
    Pending,
    Requested,
    Downloaded,
    Unpacked,
    Cancelled,
}

impl TileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TileStatus::Pending => "pending",
            TileStatus::Requested => "requested",
            TileStatus::Downloaded => "downloaded",
            TileStatus::Unpacked => "unpacked",
            TileStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value {
            "pending" => Ok(TileStatus::Pending),
            "requested" => Ok(TileStatus::Requested),
            "downloaded" => Ok(TileStatus::Downloaded),
            "unpacked" => Ok(TileStatus::Unpacked),
            "cancelled" => Ok(TileStatus::Cancelled),
            _ => Err(format!("Invalid tile status: '{}'", value)),
        }
    }
}

impl fmt::Display for TileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Type<Sqlite> for TileStatus {
    fn type_info() -> SqliteTypeInfo {
        <&str as Type<Sqlite>>::type_info()
    }
}

impl<'q> Encode<'q, Sqlite> for TileStatus {
    fn encode_by_ref(
        &self,
        args: &mut Vec<SqliteArgumentValue<'q>>,
    ) -> Result<IsNull, Box<dyn StdError + Send + Sync + 'static>> {
        args.push(SqliteArgumentValue::Text(Cow::Borrowed(self.as_str())));
        Ok(IsNull::No)
    }
}

impl<'r> Decode<'r, Sqlite> for TileStatus {
    fn decode(value: SqliteValueRef<'r>) -> Result<Self, BoxDynError> {
        let text = <&str as Decode<Sqlite>>::decode(value)?;
        TileStatus::parse(text).map_err(Into::into)
    }
}

/// Per-association crop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropStatus {
    Pending,
    Cropped,
    Cancelled,
}

impl CropStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CropStatus::Pending => "pending",
            CropStatus::Cropped => "cropped",
            CropStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value {
            "pending" => Ok(CropStatus::Pending),
            "cropped" => Ok(CropStatus::Cropped),
            "cancelled" => Ok(CropStatus::Cancelled),
            _ => Err(format!("Invalid crop status: '{}'", value)),
        }
    }
}

impl fmt::Display for CropStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Type<Sqlite> for CropStatus {
    fn type_info() -> SqliteTypeInfo {
        <&str as Type<Sqlite>>::type_info()
    }
}

impl<'q> Encode<'q, Sqlite> for CropStatus {
    fn encode_by_ref(
        &self,
        args: &mut Vec<SqliteArgumentValue<'q>>,
    ) -> Result<IsNull, Box<dyn StdError + Send + Sync + 'static>> {
        args.push(SqliteArgumentValue::Text(Cow::Borrowed(self.as_str())));
        Ok(IsNull::No)
    }
}

impl<'r> Decode<'r, Sqlite> for CropStatus {
    fn decode(value: SqliteValueRef<'r>) -> Result<Self, BoxDynError> {
        let text = <&str as Decode<Sqlite>>::decode(value)?;
        CropStatus::parse(text).map_err(Into::into)
    }
}

/// Sentinel-2 L2A scene-classification classes, in band-value order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneClass {
    NoData,
    SaturatedDefective,
    DarkArea,
    CloudShadow,
    Vegetation,
    NotVegetated,
    Water,
    Unclassified,
    CloudMediumProbability,
    CloudHighProbability,
    ThinCirrus,
    SnowIce,
}

pub const ALL_SCENE_CLASSES: [SceneClass; 12] = [
    SceneClass::NoData,
    SceneClass::SaturatedDefective,
    SceneClass::DarkArea,
    SceneClass::CloudShadow,
    SceneClass::Vegetation,
    SceneClass::NotVegetated,
    SceneClass::Water,
    SceneClass::Unclassified,
    SceneClass::CloudMediumProbability,
    SceneClass::CloudHighProbability,
    SceneClass::ThinCirrus,
    SceneClass::SnowIce,
];

impl SceneClass {
    /// Store column holding this class's pixel ratio.
    pub fn column(&self) -> &'static str {
        match self {
            SceneClass::NoData => "scl_no_data",
            SceneClass::SaturatedDefective => "scl_saturated_defective",
            SceneClass::DarkArea => "scl_dark_area",
            SceneClass::CloudShadow => "scl_cloud_shadow",
            SceneClass::Vegetation => "scl_vegetation",
            SceneClass::NotVegetated => "scl_not_vegetated",
            SceneClass::Water => "scl_water",
            SceneClass::Unclassified => "scl_unclassified",
            SceneClass::CloudMediumProbability => "scl_cloud_medium_prob",
            SceneClass::CloudHighProbability => "scl_cloud_high_prob",
            SceneClass::ThinCirrus => "scl_thin_cirrus",
            SceneClass::SnowIce => "scl_snow_ice",
        }
    }

    pub fn index(&self) -> usize {
        ALL_SCENE_CLASSES
            .iter()
            .position(|class| class == self)
            .unwrap_or(0)
    }
}

/// Fraction of crop pixels falling into each scene-classification class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SceneClassRatios(pub [f64; 12]);

impl SceneClassRatios {
    pub fn ratio(&self, class: SceneClass) -> f64 {
        self.0[class.index()]
    }
}

/// A saved acquisition request: geolocation, time window, platform, optional
/// filters and crop parameters. The full tuple is the uniqueness key.
#[derive(Debug, Clone)]
pub struct PoiRequest {
    pub group: String,
    pub lat: f64,
    pub lon: f64,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub platform: Platform,
    pub filters: SearchFilters,
    /// Crop width in meters; `None` together with `height_m` means
    /// download-only, no cropping.
    pub width_m: Option<i64>,
    pub height_m: Option<i64>,
    pub tile_limit: i64,
    pub tile_start: i64,
    pub description: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PoiRecord {
    pub id: i64,
    pub group_name: String,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub platform: Platform,
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
    pub created_at: DateTime<Utc>,
    pub tiles_identified_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// Tile registration data as returned by a provider search.
#[derive(Debug, Clone)]
pub struct NewTile {
    pub platform: Platform,
    pub product_id: String,
    pub folder_name: String,
    pub sensing_begin: DateTime<Utc>,
    pub sensing_end: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct TileRecord {
    pub id: i64,
    pub platform: Platform,
    pub product_id: String,
    pub folder_name: String,
    pub sensing_begin: DateTime<Utc>,
    pub sensing_end: DateTime<Utc>,
    pub status: TileStatus,
    pub first_requested_at: DateTime<Utc>,
    pub last_requested_at: DateTime<Utc>,
    pub downloaded_at: Option<DateTime<Utc>>,
    pub unpacked_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub spatial_reference: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PoiTileRecord {
    pub id: i64,
    pub poi_id: i64,
    pub tile_id: i64,
    pub status: CropStatus,
    pub crop_path: Option<String>,
    pub cropped_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub scl_no_data: Option<f64>,
    pub scl_saturated_defective: Option<f64>,
    pub scl_dark_area: Option<f64>,
    pub scl_cloud_shadow: Option<f64>,
    pub scl_vegetation: Option<f64>,
    pub scl_not_vegetated: Option<f64>,
    pub scl_water: Option<f64>,
    pub scl_unclassified: Option<f64>,
    pub scl_cloud_medium_prob: Option<f64>,
    pub scl_cloud_high_prob: Option<f64>,
    pub scl_thin_cirrus: Option<f64>,
    pub scl_snow_ice: Option<f64>,
}

impl PoiTileRecord {
    /// The stored scene-classification vector, present only when every class
    /// column was populated by a crop. Non-optical platforms leave all
    /// columns NULL.
    pub fn scene_class_ratios(&self) -> Option<SceneClassRatios> {
        let values = [
            self.scl_no_data?,
            self.scl_saturated_defective?,
            self.scl_dark_area?,
            self.scl_cloud_shadow?,
            self.scl_vegetation?,
            self.scl_not_vegetated?,
            self.scl_water?,
            self.scl_unclassified?,
            self.scl_cloud_medium_prob?,
            self.scl_cloud_high_prob?,
            self.scl_thin_cirrus?,
            self.scl_snow_ice?,
        ];
        Some(SceneClassRatios(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_parses_canonical_names_and_short_codes() {
        assert_eq!(Platform::parse("Sentinel-2").unwrap(), Platform::Sentinel2);
        assert_eq!(Platform::parse("s2").unwrap(), Platform::Sentinel2);
        assert_eq!(Platform::parse("L8").unwrap(), Platform::Landsat8);
        assert!(Platform::parse("Meteosat-11").is_err());
    }

    #[test]
    fn statuses_round_trip_through_their_text_form() {
        for status in [
            TileStatus::Pending,
            TileStatus::Requested,
            TileStatus::Downloaded,
            TileStatus::Unpacked,
            TileStatus::Cancelled,
        ] {
            assert_eq!(TileStatus::parse(status.as_str()).unwrap(), status);
        }
        for status in [CropStatus::Pending, CropStatus::Cropped, CropStatus::Cancelled] {
            assert_eq!(CropStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(TileStatus::parse("exploded").is_err());
    }

    #[test]
    fn scene_class_columns_are_distinct_and_indexed_in_order() {
        let mut seen = std::collections::HashSet::new();
        for (index, class) in ALL_SCENE_CLASSES.iter().enumerate() {
            assert_eq!(class.index(), index);
            assert!(seen.insert(class.column()));
        }
        assert_eq!(seen.len(), 12);
    }

    #[test]
    fn scene_class_ratio_lookup_uses_band_order() {
        let mut values = [0.0; 12];
        values[SceneClass::Vegetation.index()] = 0.75;
        let ratios = SceneClassRatios(values);
        assert_eq!(ratios.ratio(SceneClass::Vegetation), 0.75);
        assert_eq!(ratios.ratio(SceneClass::Water), 0.0);
    }
}
