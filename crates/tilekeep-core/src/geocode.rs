// crates/tilekeep-core/src/geocode.rs

use std::path::Path;

use geo::{Contains, Geometry, MultiPolygon, Point};
use geojson::GeoJson;
use tracing::warn;

use crate::error::Result;

/// Sentinel country value when resolution fails or no dataset is configured.
/// The field is informational; acquisition never depends on it.
pub const UNKNOWN_COUNTRY: &str = "unknown";

pub trait CountryResolver: Send + Sync {
    /// Country code for a WGS84 coordinate. Infallible by contract: internal
    /// failures degrade to [`UNKNOWN_COUNTRY`].
    fn country_for(&self, lat: f64, lon: f64) -> String;
}

/// Resolver used when no borders dataset is available.
#[derive(Debug, Default)]
pub struct UnknownCountry;

impl CountryResolver for UnknownCountry {
    fn country_for(&self, _lat: f64, _lon: f64) -> String {
        UNKNOWN_COUNTRY.to_string()
    }
}

/// Point-in-polygon lookup against a country-borders GeoJSON feature
/// collection (e.g. Natural Earth admin-0 boundaries).
pub struct GeoJsonCountryResolver {
    countries: Vec<(String, MultiPolygon<f64>)>,
}

impl GeoJsonCountryResolver {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_geojson(&raw)
    }

    pub fn from_geojson(raw: &str) -> Result<Self> {
        let geojson: GeoJson = raw.parse::<GeoJson>()?;
        let mut countries = Vec::new();

        if let GeoJson::FeatureCollection(collection) = geojson {
            for feature in collection.features {
                let Some(code) = feature_code(&feature) else {
                    continue;
                };
                let Some(geometry) = feature.geometry else {
                    continue;
                };
                match Geometry::<f64>::try_from(geometry.value) {
                    Ok(Geometry::Polygon(polygon)) => {
                        countries.push((code, MultiPolygon(vec![polygon])));
                    }
                    Ok(Geometry::MultiPolygon(multi)) => {
                        countries.push((code, multi));
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(country = %code, error = %err, "skipping unreadable border geometry");
                    }
                }
            }
        }

        Ok(Self { countries })
    }

    pub fn len(&self) -> usize {
        self.countries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.countries.is_empty()
    }
}

impl CountryResolver for GeoJsonCountryResolver {
    fn country_for(&self, lat: f64, lon: f64) -> String {
        let point = Point::new(lon, lat);
        for (code, borders) in &self.countries {
            if borders.contains(&point) {
                return code.clone();
            }
        }
        // Open sea, unmapped territory or a sparse dataset.
        UNKNOWN_COUNTRY.to_string()
    }
}

fn feature_code(feature: &geojson::Feature) -> Option<String> {
    let properties = feature.properties.as_ref()?;
    for key in ["ISO_A2", "ISO2", "iso_a2", "ADMIN", "name"] {
        if let Some(serde_json::Value::String(code)) = properties.get(key) {
            return Some(code.clone());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const BORDERS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": { "ISO_A2": "AT" },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[15.0, 47.0], [17.0, 47.0], [17.0, 49.0], [15.0, 49.0], [15.0, 47.0]]]
                }
            }
        ]
    }"#;

    #[test]
    fn resolves_point_inside_polygon() {
        let resolver = GeoJsonCountryResolver::from_geojson(BORDERS).unwrap();
        assert_eq!(resolver.len(), 1);
        assert_eq!(resolver.country_for(48.0, 16.0), "AT");
    }

    #[test]
    fn falls_back_to_unknown_outside_all_borders() {
        let resolver = GeoJsonCountryResolver::from_geojson(BORDERS).unwrap();
        assert_eq!(resolver.country_for(0.0, -30.0), UNKNOWN_COUNTRY);
    }

    #[test]
    fn unknown_resolver_always_returns_sentinel() {
        assert_eq!(UnknownCountry.country_for(48.0, 16.0), UNKNOWN_COUNTRY);
    }
}
