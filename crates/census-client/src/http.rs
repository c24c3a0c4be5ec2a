//! Bounded-retry HTTP access shared by the catalog, DataStore and counters.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use census_core::error::AppError;
use census_core::{HttpConfig, Probe};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};
use url::Url;

/// A response body as a sequence of chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes, reqwest::Error>>;

/// HTTP client with the audit's retry policy.
///
/// Every logical call makes up to `max_retries` attempts. After each failed
/// attempt it sleeps the current backoff, which starts at `retry_base_delay`
/// and doubles. Exhausted calls return `None` or [`Probe::Unknown`]; errors
/// never escape to the caller.
///
/// # Examples
///
/// ```no_run
/// use census_client::HttpClient;
/// use census_core::{HttpConfig, Probe};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let http = HttpClient::new(HttpConfig::default())?;
/// if let Probe::Known(bytes) = http.head_content_length("https://data.gov.ua/robots.txt").await {
///     println!("{} bytes", bytes);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: Client,
    config: HttpConfig,
}

impl HttpClient {
    /// Builds the underlying `reqwest` client.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ClientError` if the HTTP client cannot be built.
    pub fn new(config: HttpConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| AppError::ClientError(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// GETs a JSON document. Non-200 statuses, network errors and bodies that
    /// do not deserialize into `T` are all retried.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &Url,
        query: &[(&str, &str)],
    ) -> Option<T> {
        self.get_json_checked(url, query, Ok).await
    }

    /// Like [`Self::get_json`], but also retries when `check` rejects the payload.
    pub async fn get_json_checked<T, U, F>(
        &self,
        url: &Url,
        query: &[(&str, &str)],
        check: F,
    ) -> Option<U>
    where
        T: DeserializeOwned,
        F: Fn(T) -> Result<U, AppError>,
    {
        let result = self
            .with_retry(url.as_str(), || async {
                let resp = self
                    .client
                    .get(url.clone())
                    .query(query)
                    .timeout(self.config.timeout)
                    .send()
                    .await
                    .map_err(|e| self.map_reqwest_error(e))?;

                if resp.status() != StatusCode::OK {
                    return Err(status_error(resp.status(), url.as_str()));
                }

                let body = resp.bytes().await.map_err(|e| self.map_reqwest_error(e))?;
                let payload: T = serde_json::from_slice(&body)?;
                check(payload)
            })
            .await;

        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("GET {} failed: {}", url, e);
                None
            }
        }
    }

    /// Probes the size of a resource with a HEAD request.
    ///
    /// Redirects are followed. Malformed URLs and unsupported schemes are
    /// `Unknown` without a retry. Only a 2xx response with a numeric
    /// `Content-Length` is `Known`. Network errors, server errors (5xx) and
    /// rate limiting (429) are retried; other statuses are `Unknown` at once.
    pub async fn head_content_length(&self, url: &str) -> Probe<u64> {
        let result = self
            .with_retry(url, || async {
                let resp = self
                    .client
                    .head(url)
                    .timeout(self.config.timeout)
                    .send()
                    .await
                    .map_err(|e| self.map_reqwest_error(e))?;

                let status = resp.status();
                if status == StatusCode::TOO_MANY_REQUESTS {
                    return Err(AppError::RateLimitExceeded);
                }
                if status.is_server_error() {
                    return Err(status_error(status, url));
                }
                if !status.is_success() {
                    return Ok(Probe::Unknown);
                }

                let length = resp
                    .headers()
                    .get(CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_content_length);
                Ok(Probe::from(length))
            })
            .await;

        result.unwrap_or_else(|e| {
            debug!("HEAD {} failed: {}", url, e);
            Probe::Unknown
        })
    }

    /// Opens a streaming GET. The body is not read here; use [`next_chunk`]
    /// to pull it with the per-chunk timeout.
    pub async fn get_stream(&self, url: &str) -> Option<ByteStream> {
        let result = self
            .with_retry(url, || async {
                let resp = timeout(self.config.timeout, self.client.get(url).send())
                    .await
                    .map_err(|_| AppError::Timeout(self.config.timeout.as_secs()))?
                    .map_err(|e| self.map_reqwest_error(e))?;

                if !resp.status().is_success() {
                    return Err(status_error(resp.status(), url));
                }
                Ok(resp.bytes_stream().boxed())
            })
            .await;

        match result {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!("GET {} failed: {}", url, e);
                None
            }
        }
    }

    /// Idle timeout applied to each body chunk of a stream.
    pub fn chunk_timeout(&self) -> Duration {
        self.config.timeout
    }

    async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let attempts = self.config.max_retries.max(1);
        let mut delay = self.config.retry_base_delay;
        let mut last_error = AppError::Generic("No attempts made".to_string());

        for attempt in 1..=attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    debug!("{} attempt {}/{} failed: {}", what, attempt, attempts, e);
                    last_error = e;
                    sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error)
    }

    fn map_reqwest_error(&self, e: reqwest::Error) -> AppError {
        if e.is_builder() {
            AppError::InvalidUrl(e.to_string())
        } else if e.is_timeout() {
            AppError::Timeout(self.config.timeout.as_secs())
        } else if e.is_connect() {
            AppError::NetworkError(format!("Connection failed: {}", e))
        } else {
            AppError::ClientError(e.to_string())
        }
    }
}

fn status_error(status: StatusCode, url: &str) -> AppError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        AppError::RateLimitExceeded
    } else {
        AppError::ClientError(format!("HTTP {} from {}", status.as_u16(), url))
    }
}

fn parse_content_length(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

/// Pulls the next chunk of a body, failing if none arrives within `idle`.
///
/// Returns `Ok(None)` at the end of the body.
pub async fn next_chunk<S, E>(stream: &mut S, idle: Duration) -> Result<Option<Bytes>, AppError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: fmt::Display,
{
    match timeout(idle, stream.next()).await {
        Err(_) => Err(AppError::Timeout(idle.as_secs())),
        Ok(None) => Ok(None),
        Ok(Some(Ok(chunk))) => Ok(Some(chunk)),
        Ok(Some(Err(e))) => Err(AppError::NetworkError(format!("body read failed: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fast_http_config, serve, TestResponse};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn test_parse_content_length() {
        assert_eq!(parse_content_length("1024"), Some(1024));
        assert_eq!(parse_content_length(" 7 "), Some(7));
        assert_eq!(parse_content_length("+5"), None);
        assert_eq!(parse_content_length("abc"), None);
        assert_eq!(parse_content_length(""), None);
    }

    #[tokio::test]
    async fn test_get_json_success() {
        let base = serve(|req| {
            assert!(req.target.contains("rows=1"));
            TestResponse::json(json!({"success": true, "result": {"count": 3}}))
        })
        .await;
        let http = HttpClient::new(fast_http_config()).unwrap();
        let url = Url::parse(&format!("{base}/api/3/action/package_search")).unwrap();

        let value: Value = http.get_json(&url, &[("rows", "1")]).await.unwrap();
        assert_eq!(value["result"]["count"], 3);
    }

    #[tokio::test]
    async fn test_get_json_retries_then_succeeds() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let base = serve(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                TestResponse::status(503)
            } else {
                TestResponse::json(json!({"ok": 1}))
            }
        })
        .await;
        let http = HttpClient::new(fast_http_config()).unwrap();
        let url = Url::parse(&base).unwrap();

        let value: Option<Value> = http.get_json(&url, &[]).await;
        assert_eq!(value.unwrap()["ok"], 1);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_returns_none_after_backoff() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let base = serve(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            TestResponse::status(500)
        })
        .await;
        let config = HttpConfig {
            max_retries: 3,
            retry_base_delay: Duration::from_millis(20),
            ..fast_http_config()
        };
        let http = HttpClient::new(config).unwrap();
        let url = Url::parse(&base).unwrap();

        let started = Instant::now();
        let value: Option<Value> = http.get_json(&url, &[]).await;

        assert!(value.is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_millis(20 + 40 + 80));
    }

    #[tokio::test]
    async fn test_retry_exhaustion_on_connection_refused() {
        let config = HttpConfig {
            max_retries: 2,
            retry_base_delay: Duration::from_millis(10),
            ..fast_http_config()
        };
        let http = HttpClient::new(config).unwrap();
        let url = Url::parse("http://127.0.0.1:1/api/3/action/package_list").unwrap();

        let started = Instant::now();
        let value: Option<Value> = http.get_json(&url, &[]).await;

        assert!(value.is_none());
        assert!(started.elapsed() >= Duration::from_millis(10 + 20));
    }

    #[tokio::test]
    async fn test_get_json_checked_retries_rejected_payload() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let base = serve(move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            TestResponse::json(json!({"success": n > 0}))
        })
        .await;
        let http = HttpClient::new(fast_http_config()).unwrap();
        let url = Url::parse(&base).unwrap();

        let accepted = http
            .get_json_checked(&url, &[], |v: Value| {
                if v["success"] == true {
                    Ok(())
                } else {
                    Err(AppError::UnsuccessfulResponse("success: false".into()))
                }
            })
            .await;

        assert!(accepted.is_some());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_head_content_length_known() {
        let base = serve(|req| {
            assert_eq!(req.method, "HEAD");
            TestResponse::ok(vec![b'x'; 10]).with_header("Content-Length", "2048")
        })
        .await;
        let http = HttpClient::new(fast_http_config()).unwrap();

        assert_eq!(
            http.head_content_length(&format!("{base}/file.csv")).await,
            Probe::Known(2048)
        );
    }

    #[tokio::test]
    async fn test_head_without_length_is_unknown() {
        let base = serve(|_| TestResponse::ok(Vec::new()).without_length()).await;
        let http = HttpClient::new(fast_http_config()).unwrap();

        assert_eq!(
            http.head_content_length(&format!("{base}/file.csv")).await,
            Probe::Unknown
        );
    }

    #[tokio::test]
    async fn test_head_client_error_is_unknown_without_retry() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let base = serve(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            TestResponse::status(405)
        })
        .await;
        let http = HttpClient::new(fast_http_config()).unwrap();

        assert_eq!(
            http.head_content_length(&format!("{base}/file.csv")).await,
            Probe::Unknown
        );
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_head_follows_redirects() {
        let base = serve(|req| match req.target.as_str() {
            "/old.csv" => TestResponse::status(302).with_header("Location", "/new.csv"),
            "/new.csv" => TestResponse::ok(Vec::new()).with_header("Content-Length", "4096"),
            _ => TestResponse::status(404),
        })
        .await;
        let http = HttpClient::new(fast_http_config()).unwrap();

        assert_eq!(
            http.head_content_length(&format!("{base}/old.csv")).await,
            Probe::Known(4096)
        );
    }

    #[tokio::test]
    async fn test_malformed_urls_fail_without_retry() {
        let config = HttpConfig {
            max_retries: 3,
            retry_base_delay: Duration::from_millis(200),
            ..fast_http_config()
        };
        let http = HttpClient::new(config).unwrap();

        let started = Instant::now();
        let head = http.head_content_length("not a url/data.csv").await;
        let stream = http.get_stream("ftp://example.org/data.csv").await;

        assert_eq!(head, Probe::Unknown);
        assert!(stream.is_none());
        assert!(started.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_get_stream_reads_body() {
        let base = serve(|_| TestResponse::ok(b"a\nb\n".to_vec())).await;
        let http = HttpClient::new(fast_http_config()).unwrap();

        let mut stream = http.get_stream(&format!("{base}/x.csv")).await.unwrap();
        let idle = Duration::from_secs(5);
        let mut body = Vec::new();
        while let Some(chunk) = next_chunk(&mut stream, idle).await.unwrap() {
            body.extend_from_slice(&chunk);
        }
        assert_eq!(body, b"a\nb\n");
    }

    #[tokio::test]
    async fn test_get_stream_not_found() {
        let base = serve(|_| TestResponse::status(404)).await;
        let http = HttpClient::new(fast_http_config()).unwrap();

        let url = format!("{base}/missing.csv");
        assert!(http.get_stream(&url).await.is_none());
    }

    #[tokio::test]
    async fn test_next_chunk_surfaces_stream_errors() {
        let mut stream = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"ok")),
            Err(std::io::Error::from(std::io::ErrorKind::ConnectionReset)),
        ]);
        let idle = Duration::from_secs(1);

        let first = next_chunk(&mut stream, idle).await.unwrap();
        assert_eq!(first.as_deref(), Some(&b"ok"[..]));
        let err = next_chunk(&mut stream, idle).await.unwrap_err();
        assert!(matches!(err, AppError::NetworkError(_)));
    }
}
