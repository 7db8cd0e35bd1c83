use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::error::ConnectorError;
use crate::service::{ApiService, ServiceHandle, ServiceHandles};
use crate::worker_pool::{WorkerPool, DEFAULT_WORKERS};

const MAX_PAGES: usize = 50;
const INITIAL_BACKOFF_MS: u64 = 800;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
}

/// One call against a Google REST collection, relative to the API base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Post,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Patch,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn with_query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn with_page_token(&self, token: &str) -> Self {
        let mut next = self.clone();
        next.query.retain(|(k, _)| k != "pageToken");
        next.query.push(("pageToken".to_string(), token.to_string()));
        next
    }
}

/// Percent-encode a caller supplied identifier for use as a path segment.
pub fn segment(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}

/// Everything the API bindings need from the network.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn execute(
        &self,
        service: ApiService,
        request: ApiRequest,
    ) -> Result<Value, ConnectorError>;

    /// Plain GET of an absolute URL (report files in Cloud Storage).
    async fn fetch_text(&self, url: &str) -> Result<String, ConnectorError>;
}

/// Follow `nextPageToken` and concatenate the `key` arrays of every page.
pub async fn list_all(
    transport: &dyn ApiTransport,
    service: ApiService,
    request: ApiRequest,
    key: &str,
) -> Result<Vec<Value>, ConnectorError> {
    let mut items = Vec::new();
    let mut page = request.clone();
    for _ in 0..MAX_PAGES {
        let response = transport.execute(service, page).await?;
        if let Some(batch) = response.get(key).and_then(|v| v.as_array()) {
            items.extend(batch.iter().cloned());
        }
        match response
            .get("nextPageToken")
            .and_then(|t| t.as_str())
            .filter(|t| !t.is_empty())
        {
            Some(token) => page = request.with_page_token(token),
            None => return Ok(items),
        }
    }
    warn!(path = %request.path, pages = MAX_PAGES, "Stopped paging at limit");
    Ok(items)
}

/// Turn a Google error envelope (or any body) into an `Api` error.
pub fn api_error(status: u16, body: &str) -> ConnectorError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(|m| m.to_string())
        })
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "no response body".to_string()
            } else {
                trimmed.chars().take(300).collect()
            }
        });
    ConnectorError::Api { status, message }
}

/// reqwest-backed transport with per-API lazy handles and retry/backoff.
pub struct HttpTransport {
    http: reqwest::Client,
    handles: ServiceHandles,
    max_retries: u32,
    permits: Semaphore,
}

impl HttpTransport {
    pub fn new(config: Arc<Config>) -> Result<Self, ConnectorError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("dv360-mcp/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ConnectorError::Other(e.to_string()))?;
        let pool = Arc::new(WorkerPool::new(DEFAULT_WORKERS)?);
        let max_retries = config.max_retries;
        Ok(Self {
            handles: ServiceHandles::new(config, http.clone(), pool),
            http,
            max_retries,
            permits: Semaphore::new(DEFAULT_WORKERS),
        })
    }

    fn build(&self, handle: &ServiceHandle, request: &ApiRequest, token: &str) -> reqwest::RequestBuilder {
        let url = handle.url(&request.path);
        let builder = match request.method {
            HttpMethod::Get => self.http.get(&url),
            HttpMethod::Post => self.http.post(&url),
            HttpMethod::Patch => self.http.patch(&url),
        };
        let builder = builder.bearer_auth(token).query(&request.query);
        match &request.body {
            Some(body) => builder.json(body),
            None => builder,
        }
    }

    async fn send_with_backoff(
        &self,
        handle: &ServiceHandle,
        request: &ApiRequest,
    ) -> Result<Value, ConnectorError> {
        let mut delay_ms = INITIAL_BACKOFF_MS;
        let mut attempt = 0u32;
        let mut refreshed = false;

        loop {
            let token = handle.tokens().access_token().await?;
            debug!(
                service = %handle.service(),
                method = ?request.method,
                path = %request.path,
                attempt,
                "Sending API request"
            );

            match self.build(handle, request, &token).send().await {
                Ok(r) => {
                    let status = r.status().as_u16();
                    match next_step(status, attempt, self.max_retries, refreshed) {
                        Step::Accept => {
                            let body = r.text().await.map_err(ConnectorError::HttpRequest)?;
                            if body.trim().is_empty() {
                                return Ok(json!({}));
                            }
                            return Ok(serde_json::from_str(&body)?);
                        }
                        Step::RefreshToken => {
                            warn!(path = %request.path, "Access token rejected, refreshing");
                            handle.tokens().invalidate().await;
                            refreshed = true;
                        }
                        Step::Retry => {
                            let wait = if status == 429 {
                                r.headers()
                                    .get("Retry-After")
                                    .and_then(|h| h.to_str().ok())
                                    .and_then(|s| s.parse::<u64>().ok())
                                    .map(Duration::from_secs)
                                    .unwrap_or_else(|| Duration::from_millis(delay_ms))
                            } else {
                                Duration::from_millis(delay_ms)
                            };
                            warn!(
                                path = %request.path,
                                status,
                                wait_ms = wait.as_millis() as u64,
                                "Retryable API status"
                            );
                            sleep(wait).await;
                            let factor = if status == 429 { 1.8 } else { 1.6 };
                            delay_ms = (delay_ms as f64 * factor) as u64;
                            attempt += 1;
                        }
                        Step::Fail => {
                            let body = r.text().await.unwrap_or_default();
                            return Err(api_error(status, &body));
                        }
                    }
                }
                Err(e) => {
                    let transient = e.is_timeout() || e.is_connect();
                    if !transient || attempt >= self.max_retries {
                        return Err(ConnectorError::HttpRequest(e));
                    }
                    warn!(path = %request.path, error = %e, "Network error, retrying");
                    sleep(Duration::from_millis(delay_ms)).await;
                    delay_ms = (delay_ms as f64 * 1.6) as u64;
                    attempt += 1;
                }
            }
        }
    }
}

/// What to do with one HTTP response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Accept,
    /// Drop the cached token and resend. Does not use up a retry.
    RefreshToken,
    Retry,
    Fail,
}

fn next_step(status: u16, attempt: u32, max_retries: u32, refreshed: bool) -> Step {
    match status {
        200..=299 => Step::Accept,
        401 if !refreshed => Step::RefreshToken,
        429 | 500..=599 if attempt < max_retries => Step::Retry,
        _ => Step::Fail,
    }
}

#[async_trait]
impl ApiTransport for HttpTransport {
    async fn execute(
        &self,
        service: ApiService,
        request: ApiRequest,
    ) -> Result<Value, ConnectorError> {
        let handle = self.handles.get(service).await?;
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| ConnectorError::Other(e.to_string()))?;
        self.send_with_backoff(&handle, &request).await.map_err(|e| {
            error!(service = %service, path = %request.path, error = %e, "API request failed");
            e
        })
    }

    async fn fetch_text(&self, url: &str) -> Result<String, ConnectorError> {
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(api_error(status.as_u16(), &body));
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    struct PagedStub {
        seen: Mutex<Vec<ApiRequest>>,
    }

    #[async_trait]
    impl ApiTransport for PagedStub {
        async fn execute(
            &self,
            _service: ApiService,
            request: ApiRequest,
        ) -> Result<Value, ConnectorError> {
            self.seen.lock().await.push(request.clone());
            Ok(match request.query_value("pageToken") {
                None => json!({"campaigns": [{"campaignId": "1"}], "nextPageToken": "p2"}),
                Some("p2") => json!({"campaigns": [{"campaignId": "2"}], "nextPageToken": "p3"}),
                Some(_) => json!({"campaigns": [{"campaignId": "3"}]}),
            })
        }

        async fn fetch_text(&self, _url: &str) -> Result<String, ConnectorError> {
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn list_all_follows_page_tokens() {
        let stub = PagedStub {
            seen: Mutex::new(Vec::new()),
        };
        let request = ApiRequest::get("advertisers/7/campaigns").with_query("pageSize", "200");
        let items = list_all(&stub, ApiService::DisplayVideo, request, "campaigns")
            .await
            .unwrap();
        let ids: Vec<&str> = items
            .iter()
            .filter_map(|c| c["campaignId"].as_str())
            .collect();
        assert_eq!(ids, vec!["1", "2", "3"]);

        let seen = stub.seen.lock().await;
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[2].query_value("pageToken"), Some("p3"));
        assert_eq!(seen[2].query_value("pageSize"), Some("200"));
    }

    #[test]
    fn google_error_envelope_is_unwrapped() {
        let body = r#"{"error":{"code":403,"message":"The caller does not have permission","status":"PERMISSION_DENIED"}}"#;
        match api_error(403, body) {
            ConnectorError::Api { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "The caller does not have permission");
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(api_error(502, "").to_string().contains("no response body"));
    }

    #[test]
    fn token_refresh_does_not_use_the_retry_budget() {
        assert_eq!(next_step(401, 0, 0, false), Step::RefreshToken);
        assert_eq!(next_step(401, 0, 0, true), Step::Fail);
        assert_eq!(next_step(401, 3, 3, false), Step::RefreshToken);
        assert_eq!(next_step(200, 0, 0, true), Step::Accept);
    }

    #[test]
    fn throttling_and_server_errors_retry_within_budget() {
        assert_eq!(next_step(429, 0, 2, false), Step::Retry);
        assert_eq!(next_step(503, 1, 2, false), Step::Retry);
        assert_eq!(next_step(503, 2, 2, false), Step::Fail);
        assert_eq!(next_step(429, 0, 0, false), Step::Fail);
        assert_eq!(next_step(404, 0, 3, false), Step::Fail);
        assert_eq!(next_step(403, 0, 3, false), Step::Fail);
    }

    #[test]
    fn path_segments_are_encoded() {
        assert_eq!(segment("123"), "123");
        assert_eq!(segment("a/b c"), "a%2Fb%20c");
    }
}
