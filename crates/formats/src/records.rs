//! Wire records served by the map backend and consumed by the map page.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::geojson::{Feature, FeatureCollection};

/// A tourist site marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub district: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub rating: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Site {
    pub fn category(&self) -> SiteCategory {
        SiteCategory::from_label(self.category.as_deref())
    }
}

fn null_as_zero<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(d)?.unwrap_or(0.0))
}

/// Marker style bucket. Unknown or missing labels render as `Nature`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteCategory {
    Religious,
    Nature,
    Wildlife,
    HillStation,
    Heritage,
}

impl SiteCategory {
    pub fn from_label(label: Option<&str>) -> Self {
        match label.map(str::trim) {
            Some("Religious") => SiteCategory::Religious,
            Some("Wildlife") => SiteCategory::Wildlife,
            Some("Hill Station") => SiteCategory::HillStation,
            Some("Heritage") => SiteCategory::Heritage,
            _ => SiteCategory::Nature,
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            SiteCategory::Religious => "#ff6b6b",
            SiteCategory::Nature => "#4ecdc4",
            SiteCategory::Wildlife => "#45b7d1",
            SiteCategory::HillStation => "#96ceb4",
            SiteCategory::Heritage => "#feca57",
        }
    }
}

/// District row as returned by `GET /api/districts`: the boundary is an
/// embedded GeoJSON `Feature` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistrictRecord {
    pub id: i64,
    pub name: String,
    pub geojson_data: Value,
    #[serde(default)]
    pub population: Option<i64>,
    #[serde(default)]
    pub area: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// A district with its boundary parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct DistrictBoundary {
    pub id: i64,
    pub name: String,
    pub boundary: Feature,
    pub population: Option<i64>,
    pub area_km2: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryError {
    pub district_id: i64,
    pub reason: String,
}

impl std::fmt::Display for BoundaryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "district {} has a malformed boundary: {}", self.district_id, self.reason)
    }
}

impl std::error::Error for BoundaryError {}

impl TryFrom<DistrictRecord> for DistrictBoundary {
    type Error = BoundaryError;

    fn try_from(record: DistrictRecord) -> Result<Self, Self::Error> {
        // Older rows may carry the GeoJSON as a string.
        let parsed = match &record.geojson_data {
            Value::String(s) => serde_json::from_str::<Value>(s)
                .map_err(|e| e.to_string())
                .and_then(|v| Feature::from_value(&v)),
            other => Feature::from_value(other),
        };
        let boundary = parsed.map_err(|reason| BoundaryError {
            district_id: record.id,
            reason,
        })?;
        Ok(Self {
            id: record.id,
            name: record.name,
            boundary,
            population: record.population,
            area_km2: record.area,
        })
    }
}

/// Gather every district boundary into one collection, in input order.
pub fn boundaries_to_collection(districts: &[DistrictBoundary]) -> FeatureCollection {
    FeatureCollection::new(districts.iter().map(|d| d.boundary.clone()).collect())
}
