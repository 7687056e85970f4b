//! Shared fakes and builders.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{Value as JsonValue, json};

use insights_report_lib::error::{AppError, AppResult};
use insights_report_lib::models::{
    Component, DurationType, Endpoint, EndpointFilter, ReportRequest,
};
use insights_report_lib::models::catalog::{EndpointAudit, EndpointProperties};
use insights_report_lib::services::search::{MultiSearchResult, SearchEnvelope, SearchRequest};
use insights_report_lib::services::{
    AccessControl, Catalog, ComponentService, DurationResolver, EndpointService, FixedClock,
    OrganizationService, Registry, ReportEngine, RequestContext, SearchBackend,
};

pub const ORG: &str = "org-1";
pub const SUB_ORG: &str = "sub-1";
pub const START: &str = "2024-03-01 00:00:00";
pub const END: &str = "2024-03-31 23:59:59";

pub fn definitions_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("definitions")
}

pub fn registry() -> Arc<Registry> {
    Arc::new(Registry::load(&definitions_dir()).expect("shipped definitions load"))
}

/// Search backend answering from fixtures keyed by top-level aggregation name.
#[derive(Default)]
pub struct FakeSearch {
    aggregations: Mutex<HashMap<String, JsonValue>>,
    pages: Mutex<VecDeque<JsonValue>>,
    documents: Mutex<HashMap<(String, String), JsonValue>>,
    counts: Mutex<HashMap<String, u64>>,
    component_counts: Mutex<HashMap<(String, String), u64>>,
    calls: Mutex<Vec<(String, JsonValue)>>,
}

impl FakeSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer queries declaring aggregation `name` with this `aggregations` object.
    pub fn with_aggregations(self, name: &str, aggregations: JsonValue) -> Self {
        self.aggregations
            .lock()
            .unwrap()
            .insert(name.to_string(), aggregations);
        self
    }

    /// Queue a hits page for queries without aggregations.
    pub fn with_page(self, hits: JsonValue) -> Self {
        self.pages.lock().unwrap().push_back(hits);
        self
    }

    pub fn with_count(self, alias: &str, count: u64) -> Self {
        self.counts.lock().unwrap().insert(alias.to_string(), count);
        self
    }

    /// Documents held by one component; counts filtered on `component_id` sum these.
    pub fn with_component_count(self, alias: &str, component: &str, count: u64) -> Self {
        self.component_counts
            .lock()
            .unwrap()
            .insert((alias.to_string(), component.to_string()), count);
        self
    }

    pub fn calls(&self) -> Vec<(String, JsonValue)> {
        self.calls.lock().unwrap().clone()
    }

    fn envelope(value: JsonValue) -> AppResult<SearchEnvelope> {
        serde_json::from_value(value).map_err(|e| AppError::BackendDecode(e.to_string()))
    }

    fn answer(&self, alias: &str, body: &JsonValue) -> AppResult<SearchEnvelope> {
        if let Some(ids) = body.pointer("/query/ids/values").and_then(JsonValue::as_array) {
            let documents = self.documents.lock().unwrap();
            let hits: Vec<JsonValue> = ids
                .iter()
                .filter_map(JsonValue::as_str)
                .filter_map(|id| {
                    documents
                        .get(&(alias.to_string(), id.to_string()))
                        .map(|doc| json!({ "_id": id, "_source": doc }))
                })
                .collect();
            return Self::envelope(json!({ "took": 1, "hits": { "total": hits.len(), "hits": hits } }));
        }
        match body.get("aggs").and_then(JsonValue::as_object) {
            Some(aggs) => {
                let name = aggs.keys().next().cloned().unwrap_or_default();
                match self.aggregations.lock().unwrap().get(&name) {
                    Some(aggregations) => Self::envelope(json!({ "took": 1, "aggregations": aggregations })),
                    None => Err(AppError::BackendTransport(format!("no fixture for '{}'", name))),
                }
            }
            None => {
                let hits = self
                    .pages
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| json!([]));
                Self::envelope(json!({ "took": 1, "hits": { "hits": hits } }))
            }
        }
    }
}

#[async_trait]
impl SearchBackend for FakeSearch {
    async fn search(&self, _ctx: &RequestContext, alias: &str, body: &JsonValue) -> AppResult<SearchEnvelope> {
        self.calls
            .lock()
            .unwrap()
            .push((alias.to_string(), body.clone()));
        self.answer(alias, body)
    }

    async fn msearch(&self, ctx: &RequestContext, requests: &[SearchRequest]) -> AppResult<MultiSearchResult> {
        let mut results = MultiSearchResult::new();
        for request in requests {
            let result = self.search(ctx, &request.alias, &request.body).await;
            results.insert(request.key.clone(), result);
        }
        Ok(results)
    }

    async fn count(&self, _ctx: &RequestContext, alias: &str, body: &JsonValue) -> AppResult<u64> {
        self.calls
            .lock()
            .unwrap()
            .push((alias.to_string(), body.clone()));
        let filters = body.pointer("/query/bool/filter").and_then(JsonValue::as_array);
        let components = filters.and_then(|f| {
            f.iter()
                .find_map(|clause| clause.pointer("/terms/component_id").and_then(JsonValue::as_array))
        });
        match components {
            Some(ids) => {
                let counts = self.component_counts.lock().unwrap();
                Ok(ids
                    .iter()
                    .filter_map(JsonValue::as_str)
                    .filter_map(|id| counts.get(&(alias.to_string(), id.to_string())))
                    .sum())
            }
            None => Ok(self.counts.lock().unwrap().get(alias).copied().unwrap_or(0)),
        }
    }

    async fn index_document(&self, _ctx: &RequestContext, alias: &str, id: &str, document: &JsonValue) -> AppResult<()> {
        self.documents
            .lock()
            .unwrap()
            .insert((alias.to_string(), id.to_string()), document.clone());
        Ok(())
    }

    async fn get_document(&self, _ctx: &RequestContext, alias: &str, id: &str) -> AppResult<Option<JsonValue>> {
        Ok(self
            .documents
            .lock()
            .unwrap()
            .get(&(alias.to_string(), id.to_string()))
            .cloned())
    }

    async fn ping(&self, _ctx: &RequestContext) -> AppResult<()> {
        Ok(())
    }
}

/// Every peer service over static data.
#[derive(Default)]
pub struct FakePeers {
    pub chains: HashMap<String, Vec<String>>,
    pub services: HashMap<String, Vec<Component>>,
    pub endpoints: Vec<Endpoint>,
    pub denied_users: HashSet<String>,
    pub hidden_components: HashSet<String>,
}

impl FakePeers {
    /// `org-1` owning `sub-1`, two components in each.
    pub fn standard() -> Self {
        let mut peers = FakePeers::default();
        peers.chains.insert(ORG.to_string(), vec![ORG.to_string()]);
        peers
            .chains
            .insert(SUB_ORG.to_string(), vec![SUB_ORG.to_string(), ORG.to_string()]);
        peers.services.insert(
            ORG.to_string(),
            vec![component("c1", "checkout", ORG), component("c2", "billing", ORG)],
        );
        peers.services.insert(
            SUB_ORG.to_string(),
            vec![component("c3", "search", SUB_ORG), component("c4", "catalog", SUB_ORG)],
        );
        peers
    }
}

pub fn component(id: &str, name: &str, org_id: &str) -> Component {
    Component {
        id: id.to_string(),
        name: name.to_string(),
        repository_url: Some(format!("https://git.example.com/{}", name)),
        org_id: org_id.to_string(),
        sub_org_id: None,
        disabled: false,
    }
}

pub fn endpoint(id: &str, contribution_id: &str, name: &str, resource_id: &str) -> Endpoint {
    Endpoint {
        id: id.to_string(),
        contribution_id: contribution_id.to_string(),
        name: name.to_string(),
        resource_id: resource_id.to_string(),
        properties: EndpointProperties::default(),
        audit: EndpointAudit::default(),
    }
}

#[async_trait]
impl OrganizationService for FakePeers {
    async fn parent_chain(&self, _ctx: &RequestContext, resource_id: &str) -> AppResult<Vec<String>> {
        Ok(self
            .chains
            .get(resource_id)
            .cloned()
            .unwrap_or_else(|| vec![resource_id.to_string()]))
    }
}

#[async_trait]
impl ComponentService for FakePeers {
    async fn list_services(&self, _ctx: &RequestContext, org_id: &str) -> AppResult<Vec<Component>> {
        Ok(self.services.get(org_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl EndpointService for FakePeers {
    async fn list_endpoints(&self, _ctx: &RequestContext, filter: &EndpointFilter) -> AppResult<Vec<Endpoint>> {
        Ok(self
            .endpoints
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AccessControl for FakePeers {
    async fn authorize(&self, _ctx: &RequestContext, user_id: &str, _resource_id: &str, _permission: &str) -> AppResult<bool> {
        Ok(!self.denied_users.contains(user_id))
    }

    async fn permitted_components(
        &self,
        _ctx: &RequestContext,
        _user_id: &str,
        _org_id: &str,
        component_ids: Vec<String>,
    ) -> AppResult<Vec<String>> {
        Ok(component_ids
            .into_iter()
            .filter(|id| !self.hidden_components.contains(id))
            .collect())
    }
}

pub struct Harness {
    pub engine: ReportEngine,
    pub search: Arc<FakeSearch>,
    pub registry: Arc<Registry>,
}

pub fn harness(search: FakeSearch, peers: FakePeers) -> Harness {
    let search = Arc::new(search);
    let peers = Arc::new(peers);
    let registry = registry();
    let catalog = Arc::new(Catalog::new(
        peers.clone(),
        peers.clone(),
        peers.clone(),
        Duration::from_secs(60),
    ));
    let now = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
    let engine = ReportEngine::new(
        registry.clone(),
        catalog,
        search.clone(),
        peers,
        DurationResolver::new(Arc::new(FixedClock(now))),
        2,
    );
    Harness {
        engine,
        search,
        registry,
    }
}

/// Custom-range request for a widget in `org-1`.
pub fn report(widget_id: &str) -> ReportRequest {
    ReportRequest {
        widget_id: widget_id.to_string(),
        org_id: ORG.to_string(),
        duration_type: DurationType::CustomRange,
        start_date: Some(START.to_string()),
        end_date: Some(END.to_string()),
        time_zone: Some("UTC".to_string()),
        ..ReportRequest::default()
    }
}

pub fn ctx() -> RequestContext {
    RequestContext::new("test-request")
}
