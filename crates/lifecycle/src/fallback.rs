use formats::{DistrictBoundary, Feature, GeoPoint, Geometry, Site};
use serde_json::{Map, Value};

use crate::dataset::Dataset;

/// Supplies data when the live fetch fails so the view is never left blank.
pub trait FallbackProvider {
    /// `None` means no usable substitute exists.
    fn provide(&self) -> Option<Dataset>;
}

/// Built-in sample: two sites and the Ranchi district outline.
#[derive(Debug, Default, Copy, Clone)]
pub struct SampleDataset;

impl FallbackProvider for SampleDataset {
    fn provide(&self) -> Option<Dataset> {
        let sites = vec![
            sample_site(
                1,
                "Jagannath Temple",
                "Ancient temple dedicated to Lord Jagannath",
                (23.3441, 85.3096),
                "Ranchi",
                "Religious",
                4.5,
            ),
            sample_site(
                2,
                "Betla National Park",
                "Famous wildlife sanctuary with tigers and elephants",
                (23.9167, 84.1167),
                "Palamu",
                "Wildlife",
                4.3,
            ),
        ];

        let ring = [
            (85.2, 23.2),
            (85.4, 23.2),
            (85.4, 23.5),
            (85.2, 23.5),
            (85.2, 23.2),
        ]
        .into_iter()
        .map(|(lon, lat)| GeoPoint::new(lon, lat))
        .collect();
        let mut properties = Map::new();
        properties.insert("name".to_string(), Value::String("Ranchi".to_string()));
        let ranchi = DistrictBoundary {
            id: 1,
            name: "Ranchi".to_string(),
            boundary: Feature {
                id: None,
                properties,
                geometry: Geometry::Polygon(vec![ring]),
            },
            population: Some(2_914_253),
            area_km2: Some(5097.0),
        };

        Some(Dataset::new(sites, vec![ranchi]))
    }
}

fn sample_site(
    id: i64,
    name: &str,
    description: &str,
    (latitude, longitude): (f64, f64),
    district: &str,
    category: &str,
    rating: f64,
) -> Site {
    Site {
        id,
        name: name.to_string(),
        description: Some(description.to_string()),
        latitude,
        longitude,
        district: district.to_string(),
        category: Some(category.to_string()),
        image_url: None,
        rating,
        created_at: None,
    }
}
