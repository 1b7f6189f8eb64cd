//! REST handlers over the [`Store`](crate::store::Store).

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use formats::{DistrictRecord, Site};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::store::{NewDistrict, NewPlace, Post, StoreError, User};
use crate::AppState;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(&'static str),
    Store(StoreError),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
            }
            ApiError::Store(err) => {
                warn!("storage error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": err.to_string() })),
                )
                    .into_response()
            }
        }
    }
}

pub async fn root() -> Json<Value> {
    Json(json!({ "message": "Welcome to the Jharkhand tourism map API" }))
}

pub async fn healthz() -> Response {
    (StatusCode::OK, "ok").into_response()
}

pub async fn list_places(State(state): State<AppState>) -> Result<Json<Vec<Site>>, ApiError> {
    Ok(Json(state.store.places()?))
}

#[derive(Debug, Default, Deserialize)]
pub struct PlaceBody {
    name: Option<String>,
    description: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    district: Option<String>,
    category: Option<String>,
    image_url: Option<String>,
    rating: Option<f64>,
}

pub async fn create_place(
    State(state): State<AppState>,
    Json(body): Json<PlaceBody>,
) -> Result<Json<Site>, ApiError> {
    let (Some(name), Some(latitude), Some(longitude), Some(district)) = (
        non_empty(body.name),
        body.latitude,
        body.longitude,
        non_empty(body.district),
    ) else {
        return Err(ApiError::BadRequest(
            "Name, latitude, longitude, and district are required",
        ));
    };
    let place = NewPlace {
        name,
        description: body.description,
        latitude,
        longitude,
        district,
        category: body.category,
        image_url: body.image_url,
        rating: body.rating.unwrap_or(0.0),
    };
    Ok(Json(state.store.insert_place(&place)?))
}

pub async fn list_districts(
    State(state): State<AppState>,
) -> Result<Json<Vec<DistrictRecord>>, ApiError> {
    Ok(Json(state.store.districts()?))
}

#[derive(Debug, Default, Deserialize)]
pub struct DistrictBody {
    name: Option<String>,
    geojson_data: Option<Value>,
    population: Option<i64>,
    area: Option<f64>,
}

pub async fn create_district(
    State(state): State<AppState>,
    Json(body): Json<DistrictBody>,
) -> Result<Json<DistrictRecord>, ApiError> {
    let (Some(name), Some(geojson)) = (non_empty(body.name), body.geojson_data) else {
        return Err(ApiError::BadRequest("Name and geojson_data are required"));
    };
    // Clients may send the feature either inline or as a JSON string.
    let geojson_data = match geojson {
        Value::Null => return Err(ApiError::BadRequest("Name and geojson_data are required")),
        Value::String(text) => serde_json::from_str(&text)
            .map_err(|_| ApiError::BadRequest("geojson_data must be valid JSON"))?,
        other => other,
    };
    let district = NewDistrict {
        name,
        geojson_data,
        population: body.population,
        area: body.area,
    };
    Ok(Json(state.store.insert_district(&district)?))
}

pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, ApiError> {
    Ok(Json(state.store.users()?))
}

#[derive(Debug, Default, Deserialize)]
pub struct UserBody {
    name: Option<String>,
    email: Option<String>,
}

pub async fn create_user(
    State(state): State<AppState>,
    Json(body): Json<UserBody>,
) -> Result<Json<User>, ApiError> {
    let (Some(name), Some(email)) = (non_empty(body.name), non_empty(body.email)) else {
        return Err(ApiError::BadRequest("Name and email are required"));
    };
    Ok(Json(state.store.insert_user(&name, &email)?))
}

pub async fn list_posts(State(state): State<AppState>) -> Result<Json<Vec<Post>>, ApiError> {
    Ok(Json(state.store.posts()?))
}

#[derive(Debug, Default, Deserialize)]
pub struct PostBody {
    title: Option<String>,
    content: Option<String>,
    user_id: Option<i64>,
}

pub async fn create_post(
    State(state): State<AppState>,
    Json(body): Json<PostBody>,
) -> Result<Json<Post>, ApiError> {
    let (Some(title), Some(user_id)) = (non_empty(body.title), body.user_id) else {
        return Err(ApiError::BadRequest("Title and user_id are required"));
    };
    Ok(Json(
        state
            .store
            .insert_post(&title, body.content.as_deref(), user_id)?,
    ))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
