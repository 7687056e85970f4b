//! Search backend gateway.
//!
//! [`SearchBackend`] is the only way the service talks to the search cluster.
//! [`OpenSearchGateway`] owns one process-wide HTTP client, retries transport
//! failures with exponential backoff and bounds every call by the smaller of
//! the configured timeout and the caller's remaining deadline.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::config::SearchSettings;
use crate::error::{AppError, AppResult};
use crate::services::context::RequestContext;

/// Base delay before the first retry.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// HTTP connect timeout for the search cluster.
const SEARCH_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// `hits.total` in either of the shapes the backend emits.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum HitsTotal {
    Count(u64),
    Object { value: u64 },
}

impl HitsTotal {
    pub fn value(&self) -> u64 {
        match self {
            Self::Count(n) | Self::Object { value: n } => *n,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hit {
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(rename = "_source", default)]
    pub source: JsonValue,
    #[serde(default)]
    pub sort: Option<Vec<JsonValue>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Hits {
    #[serde(default)]
    pub total: Option<HitsTotal>,
    #[serde(default)]
    pub hits: Vec<Hit>,
}

/// Top-level search response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchEnvelope {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub hits: Hits,
    /// Absent when the query declared no aggregations.
    #[serde(default)]
    pub aggregations: Option<JsonValue>,
}

impl SearchEnvelope {
    pub fn total_hits(&self) -> u64 {
        self.hits
            .total
            .as_ref()
            .map(HitsTotal::value)
            .unwrap_or(self.hits.hits.len() as u64)
    }
}

/// One entry of a multi-search batch.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Key under which the response is returned.
    pub key: String,
    pub alias: String,
    pub body: JsonValue,
}

/// Per-key multi-search outcome.
pub type MultiSearchResult = BTreeMap<String, AppResult<SearchEnvelope>>;

#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Run one query against an index or alias.
    async fn search(
        &self,
        ctx: &RequestContext,
        alias: &str,
        body: &JsonValue,
    ) -> AppResult<SearchEnvelope>;

    /// Run a batch; every request key appears in the result.
    async fn msearch(
        &self,
        ctx: &RequestContext,
        requests: &[SearchRequest],
    ) -> AppResult<MultiSearchResult>;

    /// Number of documents matching `body`'s query.
    async fn count(&self, ctx: &RequestContext, alias: &str, body: &JsonValue) -> AppResult<u64>;

    async fn index_document(
        &self,
        ctx: &RequestContext,
        alias: &str,
        id: &str,
        document: &JsonValue,
    ) -> AppResult<()>;

    async fn get_document(
        &self,
        ctx: &RequestContext,
        alias: &str,
        id: &str,
    ) -> AppResult<Option<JsonValue>>;

    /// Cluster reachability.
    async fn ping(&self, ctx: &RequestContext) -> AppResult<()>;
}

/// Reject batches whose keys collide; results are keyed by them.
pub fn ensure_unique_keys(requests: &[SearchRequest]) -> AppResult<()> {
    let mut seen = HashSet::new();
    for request in requests {
        if !seen.insert(request.key.as_str()) {
            return Err(AppError::Internal(format!(
                "Duplicate multi-search key '{}'",
                request.key
            )));
        }
    }
    Ok(())
}

#[derive(Deserialize)]
struct MultiSearchResponse {
    responses: Vec<JsonValue>,
}

#[derive(Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Deserialize)]
struct GetResponse {
    #[serde(default)]
    found: bool,
    #[serde(rename = "_source", default)]
    source: Option<JsonValue>,
}

/// reqwest-backed gateway to an OpenSearch-compatible cluster.
#[derive(Clone)]
pub struct OpenSearchGateway {
    base_url: String,
    username: String,
    password: SecretString,
    timeout: Duration,
    max_attempts: u32,
    http_client: reqwest::Client,
}

impl OpenSearchGateway {
    pub fn new(settings: &SearchSettings) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(SEARCH_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build search HTTP client: {}", e)))?;

        Ok(Self {
            base_url: settings.url.trim_end_matches('/').to_string(),
            username: settings.username.clone(),
            password: settings.password.clone(),
            timeout: settings.timeout,
            max_attempts: settings.max_retries.max(1),
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn request(&self, ctx: &RequestContext, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http_client
            .request(method, self.url(path))
            .basic_auth(&self.username, Some(self.password.expose_secret()))
            .timeout(ctx.bounded(self.timeout))
            .header(crate::config::REQUEST_ID_HEADER, &ctx.request_id)
    }

    /// Send with retries on transport failures only.
    async fn send_with_retry<F>(&self, ctx: &RequestContext, op: &str, build: F) -> AppResult<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder + Send + Sync,
    {
        let mut attempt = 1;
        loop {
            ctx.check()?;
            let result = ctx
                .run(async {
                    let response = build().send().await?;
                    check_status(response).await
                })
                .await;

            match result {
                Err(e) if e.is_transport() && attempt < self.max_attempts => {
                    let delay = RETRY_BASE_DELAY * 2u32.saturating_pow(attempt - 1);
                    warn!(
                        request_id = %ctx.request_id,
                        "Search {} failed (attempt {}/{}), retrying in {:?}: {}",
                        op, attempt, self.max_attempts, delay, e
                    );
                    tokio::select! {
                        _ = ctx.cancel.cancelled() => return Err(AppError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// Map HTTP status onto the error taxonomy: 5xx and 429 are transport
/// failures worth retrying, other 4xx are semantic.
async fn check_status(response: reqwest::Response) -> AppResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail = format!("status {}: {}", status, truncate(&body, 512));
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(AppError::BackendTransport(detail))
    } else {
        Err(AppError::BackendDecode(detail))
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Decode one `responses[]` item of a multi-search.
fn decode_item(item: JsonValue) -> AppResult<SearchEnvelope> {
    if let Some(error) = item.get("error") {
        let status = item.get("status").and_then(JsonValue::as_u64).unwrap_or(0);
        let reason = error
            .get("reason")
            .and_then(JsonValue::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(if status >= 500 || status == 429 {
            AppError::BackendTransport(reason)
        } else {
            AppError::BackendDecode(reason)
        });
    }
    serde_json::from_value(item).map_err(|e| AppError::BackendDecode(e.to_string()))
}

/// Re-run items the cluster rejected with 429 or 5xx, one at a time, so a
/// busy shard costs one slot a retry instead of failing it outright.
async fn retry_transient_items<'a, F, Fut>(
    ctx: &RequestContext,
    requests: &'a [SearchRequest],
    results: &mut MultiSearchResult,
    retry: F,
) where
    F: Fn(&'a SearchRequest) -> Fut,
    Fut: Future<Output = AppResult<SearchEnvelope>>,
{
    for request in requests {
        let transient = matches!(results.get(&request.key), Some(Err(e)) if e.is_transport());
        if !transient {
            continue;
        }
        warn!(
            request_id = %ctx.request_id,
            key = %request.key,
            alias = %request.alias,
            "Multi-search item rejected, retrying alone"
        );
        results.insert(request.key.clone(), retry(request).await);
    }
}

/// Build the newline-delimited multi-search body.
pub fn msearch_body(requests: &[SearchRequest]) -> AppResult<String> {
    let mut body = String::new();
    for request in requests {
        let header = serde_json::json!({ "index": request.alias });
        body.push_str(&header.to_string());
        body.push('\n');
        body.push_str(
            &serde_json::to_string(&request.body)
                .map_err(|e| AppError::Internal(format!("Failed to encode query: {}", e)))?,
        );
        body.push('\n');
    }
    Ok(body)
}

#[async_trait]
impl SearchBackend for OpenSearchGateway {
    async fn search(
        &self,
        ctx: &RequestContext,
        alias: &str,
        body: &JsonValue,
    ) -> AppResult<SearchEnvelope> {
        debug!(request_id = %ctx.request_id, alias = %alias, "Search");
        let path = format!("{}/_search", urlencoding::encode(alias));
        let response = self
            .send_with_retry(ctx, "search", || {
                self.request(ctx, reqwest::Method::POST, &path).json(body)
            })
            .await?;
        Ok(response.json::<SearchEnvelope>().await?)
    }

    async fn msearch(
        &self,
        ctx: &RequestContext,
        requests: &[SearchRequest],
    ) -> AppResult<MultiSearchResult> {
        ensure_unique_keys(requests)?;
        if requests.is_empty() {
            return Ok(BTreeMap::new());
        }
        debug!(request_id = %ctx.request_id, legs = requests.len(), "Multi-search");
        let payload = msearch_body(requests)?;
        let response = self
            .send_with_retry(ctx, "msearch", || {
                self.request(ctx, reqwest::Method::POST, "_msearch")
                    .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
                    .body(payload.clone())
            })
            .await?;
        let decoded: MultiSearchResponse = response.json().await?;
        if decoded.responses.len() != requests.len() {
            return Err(AppError::BackendDecode(format!(
                "multi-search returned {} responses for {} requests",
                decoded.responses.len(),
                requests.len()
            )));
        }
        let mut results: MultiSearchResult = requests
            .iter()
            .zip(decoded.responses)
            .map(|(request, item)| (request.key.clone(), decode_item(item)))
            .collect();
        retry_transient_items(ctx, requests, &mut results, |request| {
            self.search(ctx, &request.alias, &request.body)
        })
        .await;
        Ok(results)
    }

    async fn count(&self, ctx: &RequestContext, alias: &str, body: &JsonValue) -> AppResult<u64> {
        let path = format!("{}/_count", urlencoding::encode(alias));
        let query = body
            .get("query")
            .cloned()
            .map(|q| serde_json::json!({ "query": q }))
            .unwrap_or_else(|| serde_json::json!({}));
        let response = self
            .send_with_retry(ctx, "count", || {
                self.request(ctx, reqwest::Method::POST, &path).json(&query)
            })
            .await?;
        Ok(response.json::<CountResponse>().await?.count)
    }

    async fn index_document(
        &self,
        ctx: &RequestContext,
        alias: &str,
        id: &str,
        document: &JsonValue,
    ) -> AppResult<()> {
        let path = format!(
            "{}/_doc/{}?refresh=wait_for",
            urlencoding::encode(alias),
            urlencoding::encode(id)
        );
        self.send_with_retry(ctx, "index", || {
            self.request(ctx, reqwest::Method::PUT, &path).json(document)
        })
        .await?;
        Ok(())
    }

    async fn get_document(
        &self,
        ctx: &RequestContext,
        alias: &str,
        id: &str,
    ) -> AppResult<Option<JsonValue>> {
        let path = format!("{}/_doc/{}", urlencoding::encode(alias), urlencoding::encode(id));
        let result = self
            .send_with_retry(ctx, "get", || self.request(ctx, reqwest::Method::GET, &path))
            .await;
        let response = match result {
            Ok(response) => response,
            // A missing document answers 404 with `found: false`.
            Err(AppError::BackendDecode(detail)) if detail.starts_with("status 404") => {
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let decoded: GetResponse = response.json().await?;
        Ok(if decoded.found { decoded.source } else { None })
    }

    async fn ping(&self, ctx: &RequestContext) -> AppResult<()> {
        self.send_with_retry(ctx, "ping", || {
            self.request(ctx, reqwest::Method::GET, "_cluster/health")
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_total_shapes() {
        let a: SearchEnvelope =
            serde_json::from_value(json!({"took": 3, "hits": {"total": {"value": 7}, "hits": []}}))
                .unwrap();
        assert_eq!(a.total_hits(), 7);
        assert!(a.aggregations.is_none());

        let b: SearchEnvelope =
            serde_json::from_value(json!({"hits": {"total": 2, "hits": []}, "aggregations": {}}))
                .unwrap();
        assert_eq!(b.total_hits(), 2);
        assert_eq!(b.aggregations, Some(json!({})));
    }

    #[test]
    fn test_msearch_body_is_ndjson() {
        let body = msearch_body(&[
            SearchRequest {
                key: "runs".into(),
                alias: "automation_run_status".into(),
                body: json!({"size": 0}),
            },
            SearchRequest {
                key: "deployments".into(),
                alias: "deploy_data".into(),
                body: json!({"size": 0}),
            },
        ])
        .unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], r#"{"index":"automation_run_status"}"#);
        assert_eq!(lines[2], r#"{"index":"deploy_data"}"#);
        assert!(body.ends_with('\n'));
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let request = SearchRequest {
            key: "runs".into(),
            alias: "a".into(),
            body: json!({}),
        };
        assert!(ensure_unique_keys(&[request.clone(), request]).is_err());
    }

    #[tokio::test]
    async fn test_only_transient_items_are_retried() {
        let requests: Vec<SearchRequest> = ["busy", "missing", "fine"]
            .iter()
            .map(|key| SearchRequest {
                key: key.to_string(),
                alias: format!("{}_alias", key),
                body: json!({"size": 0}),
            })
            .collect();
        let mut results: MultiSearchResult = BTreeMap::new();
        results.insert(
            "busy".into(),
            decode_item(json!({"error": {"reason": "rejected"}, "status": 429})),
        );
        results.insert(
            "missing".into(),
            decode_item(json!({"error": {"reason": "no such index"}, "status": 404})),
        );
        results.insert("fine".into(), decode_item(json!({"hits": {"total": 1, "hits": []}})));
        let retried = std::sync::Mutex::new(Vec::new());

        retry_transient_items(&RequestContext::new("t"), &requests, &mut results, |request| {
            retried.lock().unwrap().push(request.alias.clone());
            async { Ok(serde_json::from_value(json!({"hits": {"total": 4, "hits": []}})).unwrap()) }
        })
        .await;

        assert_eq!(*retried.lock().unwrap(), vec!["busy_alias".to_string()]);
        assert_eq!(results["busy"].as_ref().unwrap().total_hits(), 4);
        assert!(matches!(results["missing"], Err(AppError::BackendDecode(_))));
        assert_eq!(results["fine"].as_ref().unwrap().total_hits(), 1);
    }

    #[test]
    fn test_item_errors_are_classified() {
        let semantic = decode_item(json!({"error": {"reason": "no such index [x]"}, "status": 404}));
        assert!(matches!(semantic, Err(AppError::BackendDecode(_))));
        let transient = decode_item(json!({"error": {"reason": "rejected"}, "status": 503}));
        assert!(matches!(transient, Err(AppError::BackendTransport(_))));
        let ok = decode_item(json!({"hits": {"hits": []}, "aggregations": {}}));
        assert!(ok.is_ok());
    }
}
