//! CKAN catalog access and dataset traversal.
//!
//! Datasets are enumerated with `package_search` pages. When paging is
//! unavailable the walker falls back to `package_list` followed by one
//! `package_show` per id.

use std::collections::{HashSet, VecDeque};

use census_core::error::AppError;
use census_core::{CatalogConfig, DatasetDescriptor, ResourceDescriptor};
use futures::Stream;
use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

use crate::http::HttpClient;

/// Generic wrapper for CKAN API responses.
///
/// CKAN API reference: <https://docs.ckan.org/en/2.9/api/>
///
/// CKAN always returns responses with the structure:
/// ```json
/// {
///     "success": bool,
///     "result": T
/// }
/// ```
#[derive(Deserialize, Debug)]
pub(crate) struct CkanResponse<T> {
    #[serde(default)]
    success: bool,
    result: Option<T>,
}

impl<T> CkanResponse<T> {
    /// The result of a successful call; anything else is an unsuccessful response.
    pub(crate) fn into_result(self, action: &str) -> Result<T, AppError> {
        match (self.success, self.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(AppError::UnsuccessfulResponse(format!(
                "{} returned success: false",
                action
            ))),
        }
    }
}

/// One page of `package_search`.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct SearchPage {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub results: Vec<CkanPackage>,
}

/// Data Transfer Object for a CKAN dataset (`package_show` / `package_search`).
///
/// # Examples
///
/// ```
/// use census_client::catalog::CkanPackage;
///
/// let json = r#"{
///     "id": "dataset-123",
///     "name": "my-dataset",
///     "title": "My Dataset",
///     "resources": [
///         {"id": "r1", "url": "https://x.org/a.csv",
///          "datastore_active": "True", "format": " CSV "}
///     ]
/// }"#;
///
/// let package: CkanPackage = serde_json::from_str(json).unwrap();
/// let dataset = package.into_dataset();
/// assert_eq!(dataset.title, "My Dataset");
/// assert!(dataset.resources[0].datastore_active);
/// assert_eq!(dataset.resources[0].format.as_deref(), Some("csv"));
/// ```
#[derive(Deserialize, Debug, Clone, Default)]
pub struct CkanPackage {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub resources: Vec<CkanResource>,
}

/// Data Transfer Object for a CKAN resource.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct CkanResource {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Portals send a boolean, a `"True"`/`"False"` string, or nothing.
    #[serde(default, deserialize_with = "lenient_bool")]
    pub datastore_active: bool,
    #[serde(default)]
    pub format: Option<String>,
}

impl CkanPackage {
    /// Converts into the audit's dataset descriptor.
    ///
    /// A blank title falls back to the slug, then to the id.
    pub fn into_dataset(self) -> DatasetDescriptor {
        let title = [self.title.as_deref(), self.name.as_deref()]
            .into_iter()
            .flatten()
            .find(|t| !t.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.id.clone());

        let resources = self
            .resources
            .into_iter()
            .map(|r| ResourceDescriptor::new(r.id, r.url, r.datastore_active, r.format.as_deref()))
            .collect();

        DatasetDescriptor {
            id: self.id,
            title,
            resources,
        }
    }
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(b)) => b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    })
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// HTTP client for the read-only CKAN action API.
///
/// # Examples
///
/// ```no_run
/// use census_client::{CkanClient, HttpClient};
/// use census_core::HttpConfig;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let http = HttpClient::new(HttpConfig::default())?;
/// let client = CkanClient::new("https://data.gov.ua", http)?;
/// if let Some(ids) = client.list_package_ids().await {
///     println!("Found {} datasets", ids.len());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct CkanClient {
    http: HttpClient,
    action_base: Url,
}

impl CkanClient {
    /// Creates a client for the portal at `portal_url`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidPortalUrl` if the URL is malformed or not HTTP(S).
    pub fn new(portal_url: &str, http: HttpClient) -> Result<Self, AppError> {
        let mut portal = Url::parse(portal_url.trim())
            .map_err(|_| AppError::InvalidPortalUrl(portal_url.to_string()))?;
        if !matches!(portal.scheme(), "http" | "https") {
            return Err(AppError::InvalidPortalUrl(portal_url.to_string()));
        }
        if !portal.path().ends_with('/') {
            let path = format!("{}/", portal.path());
            portal.set_path(&path);
        }
        let action_base = portal
            .join("api/3/action/")
            .map_err(|_| AppError::InvalidPortalUrl(portal_url.to_string()))?;

        Ok(Self { http, action_base })
    }

    /// Base of the action API, ending in `api/3/action/`.
    pub fn action_base(&self) -> &Url {
        &self.action_base
    }

    /// One `package_search` page for `q=*:*`.
    pub async fn search_packages(&self, start: u64, rows: usize) -> Option<SearchPage> {
        let start = start.to_string();
        let rows = rows.to_string();
        let query = [
            ("q", "*:*"),
            ("rows", rows.as_str()),
            ("start", start.as_str()),
        ];
        self.call("package_search", &query).await
    }

    /// Every dataset id (or slug) on the portal.
    pub async fn list_package_ids(&self) -> Option<Vec<String>> {
        self.call("package_list", &[]).await
    }

    /// Full record of a single dataset.
    pub async fn show_package(&self, id: &str) -> Option<CkanPackage> {
        self.call("package_show", &[("id", id)]).await
    }

    async fn call<T: DeserializeOwned>(&self, action: &str, query: &[(&str, &str)]) -> Option<T> {
        let url = match self.action_base.join(action) {
            Ok(url) => url,
            Err(e) => {
                warn!("cannot build {} URL: {}", action, e);
                return None;
            }
        };
        let extract = |resp: CkanResponse<T>| resp.into_result(action);
        self.http.get_json_checked(&url, query, extract).await
    }
}

/// Where the walker is in the traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraversalState {
    /// Paging through `package_search`. `total` is `None` until the
    /// initial one-row probe has answered.
    Paged { start: u64, total: Option<u64> },
    /// About to fetch `package_list`.
    Listing,
    /// Fetching the listed ids one by one.
    PerItem { ids: VecDeque<String> },
    Done,
}

impl TraversalState {
    pub fn initial() -> Self {
        TraversalState::Paged {
            start: 0,
            total: None,
        }
    }

    /// Transition after the initial probe: no answer or a zero total falls
    /// back to listing.
    pub fn after_probe(probe: Option<&SearchPage>) -> Self {
        match probe {
            Some(page) if page.count > 0 => TraversalState::Paged {
                start: 0,
                total: Some(page.count),
            },
            _ => TraversalState::Listing,
        }
    }

    /// Transition after fetching the page at `start`.
    pub fn after_page(start: u64, total: u64, page_size: usize, page: Option<&SearchPage>) -> Self {
        match page {
            None => TraversalState::Listing,
            Some(page) if page.results.is_empty() => TraversalState::Done,
            Some(_) => {
                let next = start.saturating_add(page_size as u64);
                if next >= total {
                    TraversalState::Done
                } else {
                    TraversalState::Paged {
                        start: next,
                        total: Some(total),
                    }
                }
            }
        }
    }

    pub fn after_listing(ids: Option<Vec<String>>) -> Self {
        match ids {
            Some(ids) => TraversalState::PerItem { ids: ids.into() },
            None => TraversalState::Done,
        }
    }
}

/// Yields each dataset of the portal once.
///
/// Datasets already emitted before a mid-paging fallback are not emitted
/// again by the listing.
#[derive(Debug)]
pub struct CatalogWalker {
    client: CkanClient,
    config: CatalogConfig,
    state: TraversalState,
    pending: VecDeque<CkanPackage>,
    seen: HashSet<String>,
    emitted: usize,
}

impl CatalogWalker {
    pub fn new(client: CkanClient, config: CatalogConfig) -> Self {
        Self {
            client,
            config,
            state: TraversalState::initial(),
            pending: VecDeque::new(),
            seen: HashSet::new(),
            emitted: 0,
        }
    }

    pub fn state(&self) -> &TraversalState {
        &self.state
    }

    /// Number of datasets yielded so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    pub async fn next_dataset(&mut self) -> Option<DatasetDescriptor> {
        loop {
            if self.config.limit.is_some_and(|limit| self.emitted >= limit) {
                self.state = TraversalState::Done;
                self.pending.clear();
                return None;
            }

            if let Some(package) = self.pending.pop_front() {
                if self.seen.contains(&package.id) {
                    continue;
                }
                self.seen.insert(package.id.clone());
                if let Some(name) = &package.name {
                    self.seen.insert(name.clone());
                }
                self.emitted += 1;
                return Some(package.into_dataset());
            }

            match std::mem::replace(&mut self.state, TraversalState::Done) {
                TraversalState::Paged { total: None, .. } => {
                    let probe = self.client.search_packages(0, 1).await;
                    self.state = TraversalState::after_probe(probe.as_ref());
                    match (&probe, &self.state) {
                        (None, _) => {
                            warn!("[ckan] package_search failed; falling back to package_list")
                        }
                        (Some(_), TraversalState::Listing) => {
                            info!("[ckan] package_search is empty; falling back to package_list")
                        }
                        (Some(page), _) => info!("[ckan] package_search count={}", page.count),
                    }
                }
                TraversalState::Paged {
                    start,
                    total: Some(total),
                } => {
                    let page_size = self.config.page_size;
                    let page = self.client.search_packages(start, page_size).await;
                    self.state = TraversalState::after_page(start, total, page_size, page.as_ref());
                    match page {
                        Some(page) => {
                            debug!("[ckan] page start={} results={}", start, page.results.len());
                            self.pending.extend(page.results);
                        }
                        None => warn!(
                            "[ckan] page at start={} failed; falling back to package_list",
                            start
                        ),
                    }
                    self.pause().await;
                }
                TraversalState::Listing => {
                    let ids = self.client.list_package_ids().await;
                    match &ids {
                        Some(ids) => info!("[ckan] package_list returned {} ids", ids.len()),
                        None => warn!("[ckan] package_list failed"),
                    }
                    self.state = TraversalState::after_listing(ids);
                }
                TraversalState::PerItem { mut ids } => {
                    let Some(id) = ids.pop_front() else {
                        continue;
                    };
                    self.state = TraversalState::PerItem { ids };
                    if self.seen.contains(&id) {
                        continue;
                    }
                    match self.client.show_package(&id).await {
                        Some(package) => self.pending.push_back(package),
                        None => warn!("[ckan] package_show failed for id={}", id),
                    }
                    self.pause().await;
                }
                TraversalState::Done => return None,
            }
        }
    }

    /// Turns the walker into a stream of datasets.
    pub fn into_stream(self) -> impl Stream<Item = DatasetDescriptor> {
        futures::stream::unfold(self, |mut walker| async move {
            walker.next_dataset().await.map(|dataset| (dataset, walker))
        })
    }

    async fn pause(&self) {
        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }
    }
}
