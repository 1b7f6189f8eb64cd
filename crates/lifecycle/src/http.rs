//! Dataset source backed by the map REST API.

use formats::{DistrictRecord, Site};
use runtime::LocalBoxFuture;
use serde::de::DeserializeOwned;

use crate::dataset::{DatasetSource, FetchError};

pub const SITES_PATH: &str = "/api/tourist-places";
pub const DISTRICTS_PATH: &str = "/api/districts";

pub struct HttpDatasetSource {
    base_url: String,
    client: reqwest::Client,
}

impl HttpDatasetSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        resource: &'static str,
        path: &str,
    ) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Network {
                resource,
                message: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(FetchError::Status {
                resource,
                status: resp.status().as_u16(),
            });
        }

        let body = resp.bytes().await.map_err(|e| FetchError::Network {
            resource,
            message: e.to_string(),
        })?;
        serde_json::from_slice(&body).map_err(|e| FetchError::Malformed {
            resource,
            reason: e.to_string(),
        })
    }
}

impl DatasetSource for HttpDatasetSource {
    fn sites(&self) -> LocalBoxFuture<'_, Result<Vec<Site>, FetchError>> {
        Box::pin(self.get_json("sites", SITES_PATH))
    }

    fn districts(&self) -> LocalBoxFuture<'_, Result<Vec<DistrictRecord>, FetchError>> {
        Box::pin(self.get_json("districts", DISTRICTS_PATH))
    }
}
