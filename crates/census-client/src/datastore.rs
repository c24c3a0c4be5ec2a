use std::time::Duration;

use census_core::error::AppError;
use census_core::{Probe, TabularCounts};
use serde::Deserialize;
use serde_json::Value;
use tokio::time::sleep;
use tracing::debug;
use url::Url;

use crate::catalog::CkanResponse;
use crate::http::HttpClient;

#[derive(Deserialize, Debug)]
struct DataStoreResult {
    #[serde(default)]
    total: Option<Value>,
    #[serde(default)]
    fields: Option<Vec<Value>>,
}

impl DataStoreResult {
    /// Only an integer `total` is accepted.
    fn into_counts(self) -> Result<TabularCounts, AppError> {
        let Some(rows) = self.total.as_ref().and_then(Value::as_u64) else {
            let message = "datastore_search without integer total".to_string();
            return Err(AppError::UnsuccessfulResponse(message));
        };
        Ok(TabularCounts {
            rows,
            columns: self.fields.map_or(0, |f| f.len() as u64),
        })
    }
}

/// Row and column counts from the CKAN DataStore.
///
/// Asks `datastore_search` for zero records, so only the total and the field
/// list travel over the wire.
#[derive(Debug, Clone)]
pub struct DataStoreClient {
    http: HttpClient,
    endpoint: Url,
    delay: Duration,
}

impl DataStoreClient {
    /// `action_base` is the portal's `api/3/action/` URL; `delay` is slept
    /// after every successful lookup.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidUrl` if the endpoint URL cannot be built.
    pub fn new(http: HttpClient, action_base: &Url, delay: Duration) -> Result<Self, AppError> {
        let endpoint = action_base
            .join("datastore_search")
            .map_err(|e| AppError::InvalidUrl(e.to_string()))?;
        Ok(Self {
            http,
            endpoint,
            delay,
        })
    }

    pub async fn row_column_counts(&self, resource_id: &str) -> Probe<TabularCounts> {
        let counts = self
            .http
            .get_json_checked(
                &self.endpoint,
                &[("resource_id", resource_id), ("limit", "0")],
                |resp: CkanResponse<DataStoreResult>| {
                    resp.into_result("datastore_search")?.into_counts()
                },
            )
            .await;

        match counts {
            Some(counts) => {
                if !self.delay.is_zero() {
                    sleep(self.delay).await;
                }
                Probe::Known(counts)
            }
            None => {
                debug!("[datastore] lookup failed for resource {}", resource_id);
                Probe::Unknown
            }
        }
    }
}
