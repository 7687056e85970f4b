//! Paged delivery of completed CI runs.
//!
//! Pages are fetched lazily with `search_after`, so a slow consumer holds
//! back the backend. A failed page ends the stream; consumers reconnect.

use std::sync::Arc;

use futures_util::Stream;
use futures_util::stream;
use serde_json::{Value as JsonValue, json};
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::{CompletedRun, CompletedRunsResponse};
use crate::services::context::RequestContext;
use crate::services::search::SearchBackend;

/// Sort of every page: newest status first, run id as tiebreaker.
fn page_sort() -> JsonValue {
    json!([
        { "status_timestamp": { "order": "desc", "missing": "_last" } },
        { "run_id": { "order": "asc" } }
    ])
}

/// A paged query over completed runs.
#[derive(Debug, Clone)]
pub struct PageQuery {
    pub alias: String,
    /// Interpolated body; size, sort and `search_after` are set per page.
    pub body: JsonValue,
    pub page_size: usize,
}

impl PageQuery {
    fn page_body(&self, search_after: Option<&Vec<JsonValue>>) -> AppResult<JsonValue> {
        let mut body = self.body.clone();
        let object = body
            .as_object_mut()
            .ok_or_else(|| AppError::Internal("completed-run query body is not an object".to_string()))?;
        object.insert("size".to_string(), json!(self.page_size));
        object.insert("sort".to_string(), page_sort());
        object.remove("aggs");
        object.remove("aggregations");
        match search_after {
            Some(after) => {
                object.insert("search_after".to_string(), JsonValue::Array(after.clone()));
            }
            None => {
                object.remove("search_after");
            }
        }
        Ok(body)
    }
}

struct Cursor {
    backend: Arc<dyn SearchBackend>,
    ctx: RequestContext,
    query: PageQuery,
    page: u32,
    search_after: Option<Vec<JsonValue>>,
    done: bool,
}

impl Cursor {
    async fn next_page(&mut self) -> AppResult<CompletedRunsResponse> {
        self.ctx.check()?;
        let body = self.query.page_body(self.search_after.as_ref())?;
        let envelope = self.backend.search(&self.ctx, &self.query.alias, &body).await?;

        let hits = envelope.hits.hits;
        let last = hits.len() < self.query.page_size;
        let next_after = hits.last().and_then(|h| h.sort.clone());
        if !last && next_after.is_none() {
            return Err(AppError::BackendDecode(
                "completed-run page has no sort values".to_string(),
            ));
        }
        let runs = hits
            .into_iter()
            .map(|hit| {
                serde_json::from_value::<CompletedRun>(hit.source)
                    .map_err(|e| AppError::BackendDecode(format!("completed run {}: {}", hit.id, e)))
            })
            .collect::<AppResult<Vec<_>>>()?;

        let page = self.page;
        debug!(request_id = %self.ctx.request_id, page, runs = runs.len(), last, "Completed-run page");
        self.page += 1;
        self.search_after = next_after;
        self.done = last;
        Ok(CompletedRunsResponse { page, runs, last })
    }
}

/// Stream pages until a short page, an error or cancellation.
pub fn completed_runs(
    backend: Arc<dyn SearchBackend>,
    ctx: RequestContext,
    query: PageQuery,
) -> impl Stream<Item = AppResult<CompletedRunsResponse>> {
    let cursor = Cursor {
        backend,
        ctx,
        query,
        page: 0,
        search_after: None,
        done: false,
    };
    stream::unfold(cursor, |mut cursor| async move {
        if cursor.done {
            return None;
        }
        let item = cursor.next_page().await;
        if item.is_err() {
            cursor.done = true;
        }
        Some((item, cursor))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::search::{MultiSearchResult, SearchEnvelope, SearchRequest};
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use std::sync::Mutex;

    /// Serves fixed pages and records the bodies it was sent.
    struct PagedBackend {
        pages: Mutex<Vec<JsonValue>>,
        bodies: Mutex<Vec<JsonValue>>,
    }

    #[async_trait]
    impl SearchBackend for PagedBackend {
        async fn search(&self, _: &RequestContext, _: &str, body: &JsonValue) -> AppResult<SearchEnvelope> {
            self.bodies.lock().unwrap().push(body.clone());
            let mut pages = self.pages.lock().unwrap();
            if pages.is_empty() {
                return Err(AppError::BackendTransport("no more pages".into()));
            }
            Ok(serde_json::from_value(pages.remove(0)).unwrap())
        }

        async fn msearch(&self, _: &RequestContext, _: &[SearchRequest]) -> AppResult<MultiSearchResult> {
            unimplemented!()
        }

        async fn count(&self, _: &RequestContext, _: &str, _: &JsonValue) -> AppResult<u64> {
            unimplemented!()
        }

        async fn index_document(&self, _: &RequestContext, _: &str, _: &str, _: &JsonValue) -> AppResult<()> {
            unimplemented!()
        }

        async fn get_document(&self, _: &RequestContext, _: &str, _: &str) -> AppResult<Option<JsonValue>> {
            unimplemented!()
        }

        async fn ping(&self, _: &RequestContext) -> AppResult<()> {
            Ok(())
        }
    }

    fn hit(run: &str, ts: &str) -> JsonValue {
        json!({
            "_id": run,
            "_source": {"job_id": "j1", "run_id": run, "status": "SUCCESS", "status_timestamp": ts},
            "sort": [ts, run]
        })
    }

    fn query() -> PageQuery {
        PageQuery {
            alias: "cb_ci_job_info".to_string(),
            body: json!({"query": {"match_all": {}}, "aggs": {"x": {}}}),
            page_size: 2,
        }
    }

    #[tokio::test]
    async fn test_pages_follow_search_after() {
        let backend = Arc::new(PagedBackend {
            pages: Mutex::new(vec![
                json!({"hits": {"hits": [hit("r3", "2023-06-03"), hit("r2", "2023-06-02")]}}),
                json!({"hits": {"hits": [hit("r1", "2023-06-01")]}}),
            ]),
            bodies: Mutex::new(Vec::new()),
        });
        let pages: Vec<_> = completed_runs(backend.clone(), RequestContext::new("t"), query())
            .collect()
            .await;
        assert_eq!(pages.len(), 2);
        let first = pages[0].as_ref().unwrap();
        let second = pages[1].as_ref().unwrap();
        assert_eq!(first.runs.len(), 2);
        assert!(!first.last);
        assert_eq!(second.page, 1);
        assert!(second.last);

        let bodies = backend.bodies.lock().unwrap();
        assert!(bodies[0].get("search_after").is_none());
        assert!(bodies[0].get("aggs").is_none());
        assert_eq!(bodies[1]["search_after"], json!(["2023-06-02", "r2"]));
        assert_eq!(bodies[1]["size"], 2);
    }

    #[tokio::test]
    async fn test_error_ends_stream() {
        let backend = Arc::new(PagedBackend {
            pages: Mutex::new(vec![json!({
                "hits": {"hits": [hit("r3", "2023-06-03"), hit("r2", "2023-06-02")]}
            })]),
            bodies: Mutex::new(Vec::new()),
        });
        let pages: Vec<_> = completed_runs(backend, RequestContext::new("t"), query())
            .collect()
            .await;
        assert_eq!(pages.len(), 2);
        assert!(pages[1].is_err());
    }

    #[tokio::test]
    async fn test_cancelled_context_stops_before_first_page() {
        let backend = Arc::new(PagedBackend {
            pages: Mutex::new(vec![]),
            bodies: Mutex::new(Vec::new()),
        });
        let ctx = RequestContext::new("t");
        ctx.cancel.cancel();
        let pages: Vec<_> = completed_runs(backend.clone(), ctx, query()).collect().await;
        assert!(matches!(pages[0], Err(AppError::Cancelled)));
        assert!(backend.bodies.lock().unwrap().is_empty());
    }
}
