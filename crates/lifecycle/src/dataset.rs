use std::rc::Rc;

use formats::{
    DistrictBoundary, DistrictRecord, FeatureCollection, Site, boundaries_to_collection,
};
use foundation::SessionKey;
use futures_util::future::try_join;
use runtime::LocalBoxFuture;
use tracing::debug;

/// Everything the map binds to: markers plus district outlines.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub sites: Vec<Site>,
    pub districts: Vec<DistrictBoundary>,
    /// One feature per district boundary, rebuilt whenever the dataset is.
    pub features: FeatureCollection,
}

impl Dataset {
    pub fn new(sites: Vec<Site>, districts: Vec<DistrictBoundary>) -> Self {
        let features = boundaries_to_collection(&districts);
        Self {
            sites,
            districts,
            features,
        }
    }
}

/// Where the bound dataset came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataOrigin {
    Live,
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchError {
    Network {
        resource: &'static str,
        message: String,
    },
    Status {
        resource: &'static str,
        status: u16,
    },
    Malformed {
        resource: &'static str,
        reason: String,
    },
    TimedOut {
        after_ms: u64,
    },
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Network { resource, message } => {
                write!(f, "{resource} request failed: {message}")
            }
            FetchError::Status { resource, status } => {
                write!(f, "{resource} request returned HTTP {status}")
            }
            FetchError::Malformed { resource, reason } => {
                write!(f, "{resource} payload malformed: {reason}")
            }
            FetchError::TimedOut { after_ms } => write!(f, "fetch timed out after {after_ms} ms"),
        }
    }
}

impl std::error::Error for FetchError {}

/// The two backend reads the map depends on.
pub trait DatasetSource {
    fn sites(&self) -> LocalBoxFuture<'_, Result<Vec<Site>, FetchError>>;
    fn districts(&self) -> LocalBoxFuture<'_, Result<Vec<DistrictRecord>, FetchError>>;
}

/// A fetch result paired with the generation that requested it.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub session: SessionKey,
    pub result: Result<Dataset, FetchError>,
}

/// Issues both reads concurrently and normalizes districts into one
/// [`FeatureCollection`]. Either both datasets arrive or the fetch fails.
#[derive(Clone)]
pub struct DatasetFetcher {
    source: Rc<dyn DatasetSource>,
}

impl DatasetFetcher {
    pub fn new(source: Rc<dyn DatasetSource>) -> Self {
        Self { source }
    }

    pub async fn fetch(&self, session: SessionKey) -> Fetched {
        let result = try_join(self.source.sites(), self.source.districts())
            .await
            .and_then(|(sites, records)| normalize(sites, records));
        if let Ok(dataset) = &result {
            debug!(
                %session,
                sites = dataset.sites.len(),
                districts = dataset.districts.len(),
                "dataset fetched"
            );
        }
        Fetched { session, result }
    }
}

fn normalize(sites: Vec<Site>, records: Vec<DistrictRecord>) -> Result<Dataset, FetchError> {
    let districts = records
        .into_iter()
        .map(DistrictBoundary::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| FetchError::Malformed {
            resource: "districts",
            reason: e.to_string(),
        })?;
    Ok(Dataset::new(sites, districts))
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use formats::{DistrictRecord, Site};
    use foundation::SessionClock;
    use runtime::LocalBoxFuture;
    use serde_json::json;

    use super::{DatasetFetcher, DatasetSource, FetchError};

    struct Fixed {
        districts_ok: bool,
        bad_geometry: bool,
        calls: Cell<u32>,
    }

    fn site(id: i64) -> Site {
        Site {
            id,
            name: format!("site {id}"),
            description: None,
            latitude: 23.3,
            longitude: 85.3,
            district: "Ranchi".into(),
            category: Some("Nature".into()),
            image_url: None,
            rating: 4.0,
            created_at: None,
        }
    }

    impl DatasetSource for Fixed {
        fn sites(&self) -> LocalBoxFuture<'_, Result<Vec<Site>, FetchError>> {
            self.calls.set(self.calls.get() + 1);
            Box::pin(async { Ok(vec![site(1), site(2)]) })
        }

        fn districts(&self) -> LocalBoxFuture<'_, Result<Vec<DistrictRecord>, FetchError>> {
            self.calls.set(self.calls.get() + 1);
            let ok = self.districts_ok;
            let geometry = if self.bad_geometry {
                json!({"type": "Feature", "properties": {}})
            } else {
                json!({"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [85.0, 23.0]}})
            };
            Box::pin(async move {
                if !ok {
                    return Err(FetchError::Status {
                        resource: "districts",
                        status: 500,
                    });
                }
                Ok(vec![DistrictRecord {
                    id: 1,
                    name: "Ranchi".into(),
                    geojson_data: geometry,
                    population: None,
                    area: None,
                    created_at: None,
                }])
            })
        }
    }

    fn fetcher(districts_ok: bool, bad_geometry: bool) -> (DatasetFetcher, Rc<Fixed>) {
        let source = Rc::new(Fixed {
            districts_ok,
            bad_geometry,
            calls: Cell::new(0),
        });
        (DatasetFetcher::new(source.clone()), source)
    }

    #[tokio::test]
    async fn success_pairs_result_with_session() {
        let (fetcher, source) = fetcher(true, false);
        let key = SessionClock::counting().next();
        let fetched = fetcher.fetch(key).await;
        assert_eq!(fetched.session, key);
        let dataset = fetched.result.expect("dataset");
        assert_eq!(dataset.sites.len(), 2);
        assert_eq!(dataset.features.len(), 1);
        assert_eq!(source.calls.get(), 2);
    }

    #[tokio::test]
    async fn one_failed_read_fails_the_whole_fetch() {
        let (fetcher, _) = fetcher(false, false);
        let fetched = fetcher.fetch(SessionClock::counting().next()).await;
        assert_eq!(
            fetched.result,
            Err(FetchError::Status {
                resource: "districts",
                status: 500
            })
        );
    }

    #[tokio::test]
    async fn malformed_boundary_is_a_fetch_error() {
        let (fetcher, _) = fetcher(true, true);
        let fetched = fetcher.fetch(SessionClock::counting().next()).await;
        assert!(matches!(
            fetched.result,
            Err(FetchError::Malformed {
                resource: "districts",
                ..
            })
        ));
    }
}
