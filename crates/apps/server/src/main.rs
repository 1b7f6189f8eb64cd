mod api;
mod chat;
mod store;

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::chat::OllamaConfig;
use crate::store::Store;

#[derive(Clone)]
pub(crate) struct AppState {
    store: Arc<Store>,
    http: reqwest::Client,
    ollama: Arc<OllamaConfig>,
}

#[derive(Clone, Debug)]
struct ServerConfig {
    addr: SocketAddr,
    database_path: PathBuf,
    ollama: OllamaConfig,
}

impl ServerConfig {
    fn from_env() -> Result<Self, String> {
        let mut addr: SocketAddr = env::var("MAP_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:5000".to_string())
            .parse()
            .map_err(|e| format!("invalid MAP_ADDR: {e}"))?;
        if let Ok(port) = env::var("PORT") {
            addr.set_port(port.parse().map_err(|e| format!("invalid PORT: {e}"))?);
        }

        Ok(Self {
            addr,
            database_path: env::var("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./database.sqlite")),
            ollama: OllamaConfig {
                base_url: env::var("OLLAMA_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:11434".to_string()),
                model: env::var("OLLAMA_MODEL").unwrap_or_else(|_| "gemma3:4b".to_string()),
                temperature: env_var_f64("OLLAMA_TEMPERATURE", 0.7),
                top_p: env_var_f64("OLLAMA_TOP_P", 0.9),
                max_tokens: env_var_u32("OLLAMA_MAX_TOKENS", 1024),
            },
        })
    }
}

fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS]);

    Router::new()
        .route("/", get(api::root))
        .route("/healthz", get(api::healthz))
        .route(
            "/api/tourist-places",
            get(api::list_places).post(api::create_place),
        )
        .route(
            "/api/districts",
            get(api::list_districts).post(api::create_district),
        )
        .route("/api/users", get(api::list_users).post(api::create_user))
        .route("/api/posts", get(api::list_posts).post(api::create_post))
        .route("/api/chat", post(chat::chat))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("{err}");
            return;
        }
    };

    let store = match Store::open(&config.database_path) {
        Ok(store) => store,
        Err(err) => {
            error!("failed to open {}: {err}", config.database_path.display());
            return;
        }
    };
    info!("connected to sqlite database at {}", config.database_path.display());

    let state = AppState {
        store: Arc::new(store),
        http: reqwest::Client::new(),
        ollama: Arc::new(config.ollama),
    };

    let listener = match tokio::net::TcpListener::bind(config.addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("failed to bind {}: {err}", config.addr);
            return;
        }
    };
    info!("map server listening on http://{}", config.addr);
    if let Err(err) = axum::serve(listener, app(state)).await {
        error!("server error: {err}");
    }
}

fn env_var_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_var_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
