use std::time::Duration;

use formats::{DistrictRecord, Site};
use gloo_net::http::Request;
use lifecycle::{DatasetSource, FetchError};
use runtime::{Executor, LocalBoxFuture};
use serde::de::DeserializeOwned;
use wasm_bindgen::JsValue;
use wasm_bindgen_futures::{JsFuture, spawn_local};

/// Map REST API reached through `fetch`.
pub struct GlooSource {
    base_url: String,
}

impl GlooSource {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        resource: &'static str,
        path: &str,
    ) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = Request::get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Network {
                resource,
                message: e.to_string(),
            })?;
        if !resp.ok() {
            return Err(FetchError::Status {
                resource,
                status: resp.status(),
            });
        }
        let text = resp.text().await.map_err(|e| FetchError::Network {
            resource,
            message: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| FetchError::Malformed {
            resource,
            reason: e.to_string(),
        })
    }
}

impl DatasetSource for GlooSource {
    fn sites(&self) -> LocalBoxFuture<'_, Result<Vec<Site>, FetchError>> {
        Box::pin(self.get_json("sites", "/api/tourist-places"))
    }

    fn districts(&self) -> LocalBoxFuture<'_, Result<Vec<DistrictRecord>, FetchError>> {
        Box::pin(self.get_json("districts", "/api/districts"))
    }
}

/// Page event loop: tasks go to the microtask queue, pauses to `setTimeout`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserExecutor;

impl Executor for BrowserExecutor {
    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        spawn_local(task);
    }

    fn pause(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
        let millis = duration.as_millis().min(i32::MAX as u128) as i32;
        let promise = js_sys::Promise::new(&mut |resolve, _| match web_sys::window() {
            Some(window) => {
                let _ = window
                    .set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, millis);
            }
            None => {
                let _ = resolve.call0(&JsValue::NULL);
            }
        });
        Box::pin(async move {
            let _ = JsFuture::from(promise).await;
        })
    }
}
