use foundation::GeoBounds;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lon_deg: f64,
    pub lat_deg: f64,
}

impl GeoPoint {
    pub fn new(lon_deg: f64, lat_deg: f64) -> Self {
        Self { lon_deg, lat_deg }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(GeoPoint),
    MultiPoint(Vec<GeoPoint>),
    LineString(Vec<GeoPoint>),
    MultiLineString(Vec<Vec<GeoPoint>>),
    Polygon(Vec<Vec<GeoPoint>>),
    MultiPolygon(Vec<Vec<Vec<GeoPoint>>>),
}

impl Geometry {
    /// Every coordinate of the geometry, in document order.
    pub fn points(&self) -> Vec<GeoPoint> {
        match self {
            Geometry::Point(p) => vec![*p],
            Geometry::MultiPoint(ps) | Geometry::LineString(ps) => ps.clone(),
            Geometry::MultiLineString(lines) | Geometry::Polygon(lines) => {
                lines.iter().flatten().copied().collect()
            }
            Geometry::MultiPolygon(polys) => polys.iter().flatten().flatten().copied().collect(),
        }
    }

    /// Closed rings / open paths as flat coordinate lists, for outline drawing.
    pub fn paths(&self) -> Vec<Vec<GeoPoint>> {
        match self {
            Geometry::Point(p) => vec![vec![*p]],
            Geometry::MultiPoint(ps) => ps.iter().map(|p| vec![*p]).collect(),
            Geometry::LineString(ps) => vec![ps.clone()],
            Geometry::MultiLineString(lines) | Geometry::Polygon(lines) => lines.clone(),
            Geometry::MultiPolygon(polys) => polys.iter().flatten().cloned().collect(),
        }
    }

    pub fn bounds(&self) -> Option<GeoBounds> {
        let points = self.points();
        let first = points.first()?;
        let mut b = GeoBounds::around(first.lon_deg, first.lat_deg);
        for p in &points[1..] {
            b.extend(p.lon_deg, p.lat_deg);
        }
        Some(b)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: Option<String>,
    pub properties: Map<String, Value>,
    pub geometry: Geometry,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GeoJsonError {
    Parse(String),
    NotAFeatureCollection,
    InvalidFeature { index: usize, reason: String },
}

impl std::fmt::Display for GeoJsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeoJsonError::Parse(msg) => write!(f, "JSON parse error: {msg}"),
            GeoJsonError::NotAFeatureCollection => {
                write!(f, "expected GeoJSON FeatureCollection")
            }
            GeoJsonError::InvalidFeature { index, reason } => {
                write!(f, "invalid feature at index {index}: {reason}")
            }
        }
    }
}

impl std::error::Error for GeoJsonError {}

impl Feature {
    /// Parse a GeoJSON `Feature` object. A bare geometry object is accepted
    /// and wrapped in a feature with no properties.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        let obj = value
            .as_object()
            .ok_or("feature must be an object".to_string())?;
        let ty = obj
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or("feature missing type".to_string())?;
        if ty != "Feature" {
            let geometry = parse_geometry(value)?;
            return Ok(Self {
                id: None,
                properties: Map::new(),
                geometry,
            });
        }

        let id = match obj.get("id") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        let properties = obj
            .get("properties")
            .and_then(|v| v.as_object())
            .cloned()
            .unwrap_or_default();
        let geometry_val = obj
            .get("geometry")
            .ok_or("feature missing geometry".to_string())?;
        let geometry = parse_geometry(geometry_val)?;

        Ok(Self {
            id,
            properties,
            geometry,
        })
    }

    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(|v| v.as_str())
    }

    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("type".to_string(), Value::String("Feature".to_string()));
        if let Some(id) = &self.id {
            obj.insert("id".to_string(), Value::String(id.clone()));
        }
        obj.insert(
            "properties".to_string(),
            Value::Object(self.properties.clone()),
        );
        obj.insert("geometry".to_string(), geometry_to_value(&self.geometry));
        Value::Object(obj)
    }
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self { features }
    }

    pub fn from_geojson_str(payload: &str) -> Result<Self, GeoJsonError> {
        let value: Value =
            serde_json::from_str(payload).map_err(|e| GeoJsonError::Parse(e.to_string()))?;
        Self::from_geojson_value(&value)
    }

    pub fn from_geojson_value(value: &Value) -> Result<Self, GeoJsonError> {
        let obj = value
            .as_object()
            .ok_or(GeoJsonError::NotAFeatureCollection)?;
        if obj.get("type").and_then(|v| v.as_str()) != Some("FeatureCollection") {
            return Err(GeoJsonError::NotAFeatureCollection);
        }
        let features_val = obj
            .get("features")
            .and_then(|v| v.as_array())
            .ok_or(GeoJsonError::NotAFeatureCollection)?;

        let mut features = Vec::with_capacity(features_val.len());
        for (index, feat_val) in features_val.iter().enumerate() {
            let feature = Feature::from_value(feat_val)
                .map_err(|reason| GeoJsonError::InvalidFeature { index, reason })?;
            features.push(feature);
        }
        Ok(Self { features })
    }

    pub fn to_geojson_value(&self) -> Value {
        let mut root = Map::new();
        root.insert(
            "type".to_string(),
            Value::String("FeatureCollection".to_string()),
        );
        root.insert(
            "features".to_string(),
            Value::Array(self.features.iter().map(Feature::to_value).collect()),
        );
        Value::Object(root)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn bounds(&self) -> Option<GeoBounds> {
        self.features
            .iter()
            .filter_map(|f| f.geometry.bounds())
            .reduce(GeoBounds::union)
    }
}

fn geometry_to_value(geom: &Geometry) -> Value {
    let (ty, coords) = match geom {
        Geometry::Point(p) => ("Point", point_coords(p)),
        Geometry::MultiPoint(ps) => ("MultiPoint", path_coords(ps)),
        Geometry::LineString(ps) => ("LineString", path_coords(ps)),
        Geometry::MultiLineString(lines) => ("MultiLineString", rings_coords(lines)),
        Geometry::Polygon(rings) => ("Polygon", rings_coords(rings)),
        Geometry::MultiPolygon(polys) => (
            "MultiPolygon",
            Value::Array(polys.iter().map(|p| rings_coords(p)).collect()),
        ),
    };
    let mut obj = Map::new();
    obj.insert("type".to_string(), Value::String(ty.to_string()));
    obj.insert("coordinates".to_string(), coords);
    Value::Object(obj)
}

fn point_coords(p: &GeoPoint) -> Value {
    Value::Array(vec![Value::from(p.lon_deg), Value::from(p.lat_deg)])
}

fn path_coords(ps: &[GeoPoint]) -> Value {
    Value::Array(ps.iter().map(point_coords).collect())
}

fn rings_coords(rings: &[Vec<GeoPoint>]) -> Value {
    Value::Array(rings.iter().map(|r| path_coords(r)).collect())
}

fn parse_geometry(value: &Value) -> Result<Geometry, String> {
    let obj = value
        .as_object()
        .ok_or("geometry must be an object".to_string())?;
    let ty = obj
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or("geometry missing type".to_string())?;
    let coords = obj
        .get("coordinates")
        .ok_or("geometry missing coordinates".to_string())?;

    match ty {
        "Point" => Ok(Geometry::Point(parse_point(coords)?)),
        "MultiPoint" => Ok(Geometry::MultiPoint(parse_points(coords)?)),
        "LineString" => Ok(Geometry::LineString(parse_points(coords)?)),
        "MultiLineString" => Ok(Geometry::MultiLineString(parse_rings(coords)?)),
        "Polygon" => Ok(Geometry::Polygon(parse_rings(coords)?)),
        "MultiPolygon" => {
            let polys = coords
                .as_array()
                .ok_or("MultiPolygon coordinates must be an array of polygons".to_string())?;
            let mut out = Vec::with_capacity(polys.len());
            for poly in polys {
                out.push(parse_rings(poly)?);
            }
            Ok(Geometry::MultiPolygon(out))
        }
        other => Err(format!("unsupported geometry type: {other}")),
    }
}

fn parse_point(coords: &Value) -> Result<GeoPoint, String> {
    let arr = coords
        .as_array()
        .ok_or("Point coordinates must be an array".to_string())?;
    if arr.len() < 2 {
        return Err("Point coordinates must have [lon, lat]".to_string());
    }
    let lon = arr[0].as_f64().ok_or("lon must be a number".to_string())?;
    let lat = arr[1].as_f64().ok_or("lat must be a number".to_string())?;
    Ok(GeoPoint::new(lon, lat))
}

fn parse_points(coords: &Value) -> Result<Vec<GeoPoint>, String> {
    let arr = coords
        .as_array()
        .ok_or("coordinates must be an array".to_string())?;
    arr.iter().map(parse_point).collect()
}

fn parse_rings(coords: &Value) -> Result<Vec<Vec<GeoPoint>>, String> {
    let rings = coords
        .as_array()
        .ok_or("coordinates must be an array of rings".to_string())?;
    rings.iter().map(parse_points).collect()
}

#[cfg(test)]
mod tests {
    use super::{Feature, FeatureCollection, GeoJsonError, Geometry};
    use serde_json::json;

    #[test]
    fn parses_district_feature() {
        let v = json!({
            "type": "Feature",
            "properties": {"name": "Ranchi"},
            "geometry": {"type": "Polygon", "coordinates": [[[85.2, 23.2], [85.4, 23.2], [85.4, 23.5], [85.2, 23.5], [85.2, 23.2]]]}
        });
        let f = Feature::from_value(&v).expect("feature");
        assert_eq!(f.property_str("name"), Some("Ranchi"));
        let Geometry::Polygon(rings) = &f.geometry else {
            panic!("expected polygon");
        };
        assert_eq!(rings[0].len(), 5);
        let b = f.geometry.bounds().expect("bounds");
        assert_eq!((b.min_lon, b.max_lat), (85.2, 23.5));
    }

    #[test]
    fn bare_geometry_is_wrapped() {
        let v = json!({"type": "Point", "coordinates": [85.0, 23.0]});
        let f = Feature::from_value(&v).expect("feature");
        assert!(f.properties.is_empty());
        assert!(matches!(f.geometry, Geometry::Point(_)));
    }

    #[test]
    fn rejects_feature_without_geometry() {
        let v = json!({"type": "Feature", "properties": {}});
        assert!(Feature::from_value(&v).is_err());
    }

    #[test]
    fn collection_reports_bad_index() {
        let payload = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":{},"geometry":{"type":"Point","coordinates":[1,2]}},
            {"type":"Feature","properties":{},"geometry":{"type":"Blob","coordinates":[]}}
        ]}"#;
        let err = FeatureCollection::from_geojson_str(payload).unwrap_err();
        assert!(matches!(err, GeoJsonError::InvalidFeature { index: 1, .. }));
    }

    #[test]
    fn exported_collection_parses_back() {
        let payload = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","id":7,"properties":{"name":"x"},"geometry":{"type":"LineString","coordinates":[[1,2],[3,4]]}}
        ]}"#;
        let fc = FeatureCollection::from_geojson_str(payload).expect("parse");
        assert_eq!(fc.features[0].id.as_deref(), Some("7"));
        let again = FeatureCollection::from_geojson_value(&fc.to_geojson_value()).expect("reparse");
        assert_eq!(fc, again);
    }
}
