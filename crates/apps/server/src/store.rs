//! SQLite persistence for places, districts, users and posts.

use std::path::Path;

use formats::{DistrictRecord, Site};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    email TEXT UNIQUE NOT NULL,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS posts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    content TEXT,
    user_id INTEGER,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (user_id) REFERENCES users (id)
);
CREATE TABLE IF NOT EXISTS tourist_places (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    district TEXT NOT NULL,
    category TEXT,
    image_url TEXT,
    rating REAL DEFAULT 0,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS districts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    geojson_data TEXT NOT NULL,
    population INTEGER,
    area REAL,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);
";

/// (name, description, lat, lon, district, category, rating)
const SEED_PLACES: [(&str, &str, f64, f64, &str, &str, f64); 10] = [
    ("Jagannath Temple", "Ancient temple dedicated to Lord Jagannath", 23.3441, 85.3096, "Ranchi", "Religious", 4.5),
    ("Betla National Park", "Famous wildlife sanctuary with tigers and elephants", 23.9167, 84.1167, "Palamu", "Wildlife", 4.3),
    ("Hundru Falls", "Beautiful waterfall in Ranchi district", 23.4167, 85.3333, "Ranchi", "Nature", 4.2),
    ("Dassam Falls", "Picturesque waterfall near Ranchi", 23.3833, 85.3167, "Ranchi", "Nature", 4.1),
    ("Netarhat", "Hill station known as Queen of Chotanagpur", 23.4833, 84.2667, "Latehar", "Hill Station", 4.4),
    ("Deoghar", "Famous pilgrimage site with Baidyanath Temple", 24.4833, 86.7000, "Deoghar", "Religious", 4.6),
    ("Hazaribagh National Park", "Wildlife sanctuary with diverse flora and fauna", 24.0000, 85.3667, "Hazaribagh", "Wildlife", 4.0),
    ("Rajrappa", "Sacred temple complex with waterfall", 23.6333, 85.7167, "Ramgarh", "Religious", 4.2),
    ("Patratu Valley", "Scenic valley with dam and lake", 23.5500, 85.3167, "Ramgarh", "Nature", 3.9),
    ("McCluskieganj", "Colonial hill station with heritage buildings", 23.6333, 85.3167, "Ranchi", "Heritage", 3.8),
];

/// (name, [min_lon, min_lat, max_lon, max_lat], population, area)
const SEED_DISTRICTS: [(&str, [f64; 4], i64, f64); 6] = [
    ("Ranchi", [85.2, 23.2, 85.4, 23.5], 2_914_253, 5097.0),
    ("Palamu", [83.8, 23.6, 84.4, 24.2], 1_939_869, 5043.0),
    ("Latehar", [84.0, 23.2, 84.6, 23.8], 726_978, 4291.0),
    ("Deoghar", [86.4, 24.2, 87.0, 24.8], 1_492_073, 2479.0),
    ("Hazaribagh", [85.0, 23.6, 85.6, 24.4], 1_734_495, 3555.0),
    ("Ramgarh", [85.2, 23.4, 85.8, 23.8], 949_443, 1341.0),
];

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    /// A stored `geojson_data` value is not valid JSON.
    Corrupt { table: &'static str, id: i64, reason: String },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Sqlite(err) => write!(f, "{err}"),
            StoreError::Corrupt { table, id, reason } => {
                write!(f, "{table} row {id} is corrupt: {reason}")
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Sqlite(err) => Some(err),
            StoreError::Corrupt { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Sqlite(err)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: Option<String>,
    pub user_id: Option<i64>,
    pub created_at: Option<String>,
    pub author_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPlace {
    pub name: String,
    pub description: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub district: String,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub rating: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewDistrict {
    pub name: String,
    pub geojson_data: Value,
    pub population: Option<i64>,
    pub area: Option<f64>,
}

/// One shared connection; every call holds the lock for a single statement batch.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.seed()?;
        Ok(store)
    }

    /// Insert the sample places and districts into tables that are still empty.
    fn seed(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let places: i64 = conn.query_row("SELECT COUNT(*) FROM tourist_places", [], |r| r.get(0))?;
        if places == 0 {
            let mut stmt = conn.prepare(
                "INSERT INTO tourist_places (name, description, latitude, longitude, district, category, rating)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for (name, description, lat, lon, district, category, rating) in SEED_PLACES {
                stmt.execute(params![name, description, lat, lon, district, category, rating])?;
            }
            info!(count = SEED_PLACES.len(), "seeded tourist places");
        }

        let districts: i64 = conn.query_row("SELECT COUNT(*) FROM districts", [], |r| r.get(0))?;
        if districts == 0 {
            let mut stmt = conn.prepare(
                "INSERT INTO districts (name, geojson_data, population, area) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (name, bbox, population, area) in SEED_DISTRICTS {
                let feature = box_feature(name, bbox).to_string();
                stmt.execute(params![name, feature, population, area])?;
            }
            info!(count = SEED_DISTRICTS.len(), "seeded districts");
        }
        Ok(())
    }

    pub fn places(&self) -> Result<Vec<Site>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, description, latitude, longitude, district, category, image_url, rating, created_at
             FROM tourist_places ORDER BY name",
        )?;
        let rows = stmt.query_map([], site_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn insert_place(&self, place: &NewPlace) -> Result<Site, StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO tourist_places (name, description, latitude, longitude, district, category, image_url, rating)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                place.name,
                place.description,
                place.latitude,
                place.longitude,
                place.district,
                place.category,
                place.image_url,
                place.rating
            ],
        )?;
        Ok(Site {
            id: conn.last_insert_rowid(),
            name: place.name.clone(),
            description: place.description.clone(),
            latitude: place.latitude,
            longitude: place.longitude,
            district: place.district.clone(),
            category: place.category.clone(),
            image_url: place.image_url.clone(),
            rating: place.rating,
            created_at: None,
        })
    }

    pub fn districts(&self) -> Result<Vec<DistrictRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, geojson_data, population, area, created_at FROM districts ORDER BY name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<i64>>(3)?,
                row.get::<_, Option<f64>>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, name, geojson, population, area, created_at) = row?;
            let geojson_data = serde_json::from_str(&geojson).map_err(|e| StoreError::Corrupt {
                table: "districts",
                id,
                reason: e.to_string(),
            })?;
            out.push(DistrictRecord {
                id,
                name,
                geojson_data,
                population,
                area,
                created_at,
            });
        }
        Ok(out)
    }

    pub fn insert_district(&self, district: &NewDistrict) -> Result<DistrictRecord, StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO districts (name, geojson_data, population, area) VALUES (?1, ?2, ?3, ?4)",
            params![
                district.name,
                district.geojson_data.to_string(),
                district.population,
                district.area
            ],
        )?;
        Ok(DistrictRecord {
            id: conn.last_insert_rowid(),
            name: district.name.clone(),
            geojson_data: district.geojson_data.clone(),
            population: district.population,
            area: district.area,
            created_at: None,
        })
    }

    pub fn users(&self) -> Result<Vec<User>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT id, name, email, created_at FROM users ORDER BY created_at DESC, id DESC")?;
        let rows = stmt.query_map([], |row| {
            Ok(User {
                id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn insert_user(&self, name: &str, email: &str) -> Result<User, StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (name, email) VALUES (?1, ?2)",
            params![name, email],
        )?;
        Ok(User {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            email: email.to_string(),
            created_at: None,
        })
    }

    pub fn posts(&self) -> Result<Vec<Post>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT p.id, p.title, p.content, p.user_id, p.created_at, u.name AS author_name
             FROM posts p LEFT JOIN users u ON p.user_id = u.id
             ORDER BY p.created_at DESC, p.id DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Post {
                id: row.get(0)?,
                title: row.get(1)?,
                content: row.get(2)?,
                user_id: row.get(3)?,
                created_at: row.get(4)?,
                author_name: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn insert_post(
        &self,
        title: &str,
        content: Option<&str>,
        user_id: i64,
    ) -> Result<Post, StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO posts (title, content, user_id) VALUES (?1, ?2, ?3)",
            params![title, content, user_id],
        )?;
        let id = conn.last_insert_rowid();
        let author_name = conn
            .query_row("SELECT name FROM users WHERE id = ?1", [user_id], |r| r.get(0))
            .optional()?;
        Ok(Post {
            id,
            title: title.to_string(),
            content: content.map(str::to_string),
            user_id: Some(user_id),
            created_at: None,
            author_name,
        })
    }
}

fn site_from_row(row: &Row<'_>) -> rusqlite::Result<Site> {
    Ok(Site {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        latitude: row.get(3)?,
        longitude: row.get(4)?,
        district: row.get(5)?,
        category: row.get(6)?,
        image_url: row.get(7)?,
        rating: row.get::<_, Option<f64>>(8)?.unwrap_or(0.0),
        created_at: row.get(9)?,
    })
}

/// Rectangular district outline as a GeoJSON Feature.
fn box_feature(name: &str, [min_lon, min_lat, max_lon, max_lat]: [f64; 4]) -> Value {
    serde_json::json!({
        "type": "Feature",
        "properties": {"name": name},
        "geometry": {
            "type": "Polygon",
            "coordinates": [[
                [min_lon, min_lat],
                [max_lon, min_lat],
                [max_lon, max_lat],
                [min_lon, max_lat],
                [min_lon, min_lat]
            ]]
        }
    })
}
