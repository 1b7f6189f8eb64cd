//! `POST /api/chat`: forwards a prompt to a local Ollama instance.

use std::error::Error as _;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::AppState;

#[derive(Clone, Debug)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f64,
    top_p: f64,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// Nothing listening at the configured address.
    Refused(String),
    /// The host name did not resolve.
    Unresolved(String),
    Upstream { status: u16, body: String },
    Other(String),
}

impl ChatError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        let details = error_chain(&err);
        if err.is_connect() {
            let lower = details.to_ascii_lowercase();
            if lower.contains("dns") || lower.contains("lookup") || lower.contains("resolve") {
                ChatError::Unresolved(details)
            } else {
                ChatError::Refused(details)
            }
        } else {
            ChatError::Other(details)
        }
    }

    /// Message shown to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            ChatError::Refused(_) => "Ollama is not running. Please start Ollama service.",
            ChatError::Unresolved(_) => {
                "Cannot connect to Ollama. Please check if Ollama is installed and running."
            }
            other if other.details().to_ascii_lowercase().contains("model") => {
                "Model not found. Please check if the model is installed in Ollama."
            }
            _ => "Sorry, I encountered an error. Please try again.",
        }
    }

    pub fn details(&self) -> String {
        match self {
            ChatError::Refused(d) | ChatError::Unresolved(d) | ChatError::Other(d) => d.clone(),
            ChatError::Upstream { status, body } => format!("Ollama API error: {status} {body}"),
        }
    }
}

impl std::fmt::Display for ChatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.details())
    }
}

impl std::error::Error for ChatError {}

fn error_chain(err: &reqwest::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        out.push_str(": ");
        out.push_str(&inner.to_string());
        source = inner.source();
    }
    out
}

pub async fn generate(
    client: &reqwest::Client,
    cfg: &OllamaConfig,
    prompt: &str,
) -> Result<String, ChatError> {
    let request = GenerateRequest {
        model: &cfg.model,
        prompt,
        stream: false,
        options: GenerateOptions {
            temperature: cfg.temperature,
            top_p: cfg.top_p,
            max_tokens: cfg.max_tokens,
        },
    };
    let url = format!("{}/api/generate", cfg.base_url.trim_end_matches('/'));
    debug!(model = %cfg.model, "sending prompt to ollama");

    let resp = client
        .post(&url)
        .json(&request)
        .send()
        .await
        .map_err(ChatError::from_reqwest)?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        return Err(ChatError::Upstream { status, body });
    }

    let body: GenerateResponse = resp.json().await.map_err(ChatError::from_reqwest)?;
    Ok(body.response)
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatBody {
    message: Option<String>,
}

pub async fn chat(State(state): State<AppState>, Json(body): Json<ChatBody>) -> Response {
    let Some(message) = body.message.filter(|m| !m.trim().is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Message is required" })),
        )
            .into_response();
    };

    match generate(&state.http, &state.ollama, &message).await {
        Ok(response) => Json(json!({ "success": true, "response": response })).into_response(),
        Err(err) => {
            warn!("chat request failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "error": err.user_message(),
                    "details": err.details(),
                })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use super::{generate, ChatError, OllamaConfig};

    fn config(base_url: String) -> OllamaConfig {
        OllamaConfig {
            base_url,
            model: "gemma3:4b".into(),
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 1024,
        }
    }

    async fn fake_ollama(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });
        addr
    }

    #[tokio::test]
    async fn forwards_prompt_and_options() {
        let seen = Arc::new(parking_lot::Mutex::new(Value::Null));
        let seen_by_handler = seen.clone();
        let app = Router::new().route(
            "/api/generate",
            post(move |Json(body): Json<Value>| {
                let seen = seen_by_handler.clone();
                async move {
                    *seen.lock() = body;
                    Json(json!({"response": "Namaste!", "done": true}))
                }
            }),
        );
        let addr = fake_ollama(app).await;

        let reply = generate(&reqwest::Client::new(), &config(format!("http://{addr}")), "hi")
            .await
            .expect("reply");
        assert_eq!(reply, "Namaste!");
        let sent = seen.lock().clone();
        assert_eq!(sent["model"], "gemma3:4b");
        assert_eq!(sent["stream"], false);
        assert_eq!(sent["options"]["max_tokens"], 1024);
    }

    #[tokio::test]
    async fn missing_model_is_classified() {
        let app = Router::new().route(
            "/api/generate",
            post(|| async {
                (
                    StatusCode::NOT_FOUND,
                    Json(json!({"error": "model 'gemma3:4b' not found"})),
                )
            }),
        );
        let addr = fake_ollama(app).await;
        let err = generate(&reqwest::Client::new(), &config(format!("http://{addr}")), "hi")
            .await
            .expect_err("404");
        assert!(matches!(err, ChatError::Upstream { status: 404, .. }));
        assert_eq!(
            err.user_message(),
            "Model not found. Please check if the model is installed in Ollama."
        );
    }

    #[tokio::test]
    async fn refused_connection_is_classified() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let err = generate(&reqwest::Client::new(), &config(format!("http://{addr}")), "hi")
            .await
            .expect_err("refused");
        assert!(matches!(err, ChatError::Refused(_)), "{err:?}");
        assert_eq!(
            err.user_message(),
            "Ollama is not running. Please start Ollama service."
        );
    }
}
