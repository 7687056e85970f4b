//! Report engine: the request pipeline behind every report RPC.
//!
//! validate, resolve the window, scope components, check access, run the
//! slot queries (probe first when one is defined), decode, transform and
//! assemble. Collaborators are injected so tests can swap each of them.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::future::join_all;
use futures_util::stream::BoxStream;
use serde_json::{Value as JsonValue, json};
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::models::catalog::contribution;
use crate::models::{
    Ack, ALL_COMPONENTS, CiControllerInfoRequest, CiInsightIntegrationRequest,
    ComponentComparisonRequest, ComponentComparisonResponse, ComponentComparisonRow,
    CompletedRunsResponse, ComputeUpdateRequest, ControllerInfo, ControllersResponse, Dashboard,
    DataRequest, DataResponse, DrilldownRequest, DrilldownResponse, EnvironmentRequest,
    EnvironmentSummary, Environments, IntegrationResponse, ManageWidgetRequest, MetricSpec,
    QueryLeg, QueryTemplate, ReportDocument, ReportRequest, ReportServiceRequest, TimeFormat,
    TransitionConfig, WidgetSpec, WidgetSummary, WidgetsResponse, compute_key,
};
use crate::services::aggregation;
use crate::services::assembler::{SlotResult, assemble_drilldown, assemble_widget};
use crate::services::catalog::{Catalog, ComponentScope};
use crate::services::context::RequestContext;
use crate::services::duration::{DurationResolver, ResolvedDuration};
use crate::services::interpolate::{ParamBag, Token, interpolate};
use crate::services::layout::parse_dashboard;
use crate::services::peers::AccessControl;
use crate::services::registry::Registry;
use crate::services::search::{SearchBackend, SearchEnvelope, SearchRequest};
use crate::services::stream::{self, PageQuery};
use crate::services::transform::drilldown::{self, DrilldownInput};
use crate::services::transform::format::Formatter;
use crate::services::transform::widget::{self, WidgetInput};
use crate::services::transform::{Legs, PointerFactory};
use crate::services::validator::RequestValidator;

/// Backend aliases the engine addresses directly.
pub mod aliases {
    /// Precomputed widget and drilldown bodies.
    pub const COMPUTE: &str = "compute";
    /// One document per ingested CI tool.
    pub const CI_TOOL_INSIGHT: &str = "cb_ci_tool_insight";
    /// Completed CI job runs.
    pub const CI_JOB_INFO: &str = "cb_ci_job_info";
}

/// Query template behind the completed-run stream.
pub const COMPLETED_RUNS_QUERY: &str = "ci-completed-runs";

/// Permission checked on the sub-organization before a drilldown runs.
pub const VIEW_PERMISSION: &str = "view";

/// Wildcard bound to optional completed-run filters.
const MATCH_ALL: &str = "*";

pub struct ReportEngine {
    registry: Arc<Registry>,
    catalog: Arc<Catalog>,
    search: Arc<dyn SearchBackend>,
    access: Arc<dyn AccessControl>,
    validator: RequestValidator,
    durations: DurationResolver,
    pointers: PointerFactory,
    stream_page_size: usize,
}

impl ReportEngine {
    pub fn new(
        registry: Arc<Registry>,
        catalog: Arc<Catalog>,
        search: Arc<dyn SearchBackend>,
        access: Arc<dyn AccessControl>,
        durations: DurationResolver,
        stream_page_size: usize,
    ) -> Self {
        let pointers = registry.pointer_factory();
        Self {
            validator: RequestValidator::new(catalog.clone()),
            registry,
            catalog,
            search,
            access,
            durations,
            pointers,
            stream_page_size: stream_page_size.max(1),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Build one dashboard widget from live backend data.
    pub async fn build_report(&self, ctx: &RequestContext, request: &ReportRequest) -> AppResult<ReportDocument> {
        self.validator
            .validate(ctx, "widget_id", &request.widget_id, request)
            .await?;
        let spec = self.registry.widget(&request.widget_id)?;
        self.authorize_widget(ctx, spec, request).await?;
        let duration = self.resolve(request)?;
        let scope = self.scope(ctx, request).await?;

        let results: Vec<SlotResult> = if scope.is_empty() {
            debug!(request_id = %ctx.request_id, widget_id = %spec.id, "No components in scope, skipping backend");
            spec
                .slots()
                .map(|slot| Ok(Some(widget::empty_value(slot.transform_id))))
                .collect()
        } else {
            let bag = ParamBag::for_request(request, &duration, &scope);
            let input = WidgetInput { scope: &scope };
            join_all(spec.slots().map(|slot| self.run_slot(ctx, slot, &bag, &input))).await
        };

        let document = assemble_widget(spec, results, self.durations.now())?;
        debug!(
            request_id = %ctx.request_id,
            widget_id = %spec.id,
            status = ?document.status,
            "Widget assembled"
        );
        Ok(document)
    }

    /// Build a drilldown table from live backend data.
    pub async fn build_drilldown(&self, ctx: &RequestContext, request: &DrilldownRequest) -> AppResult<DrilldownResponse> {
        let report = &request.request;
        self.validator
            .validate(ctx, "report_id", &request.report_id, report)
            .await?;
        let (kind, definition, alias) = self.registry.drilldown(&request.report_id)?;
        self.authorize_drilldown(ctx, &request.report_id, report).await?;
        let duration = self.resolve(report)?;
        let scope = self.scope(ctx, report).await?;
        if scope.is_empty() {
            return Ok(DrilldownResponse { reports: Vec::new() });
        }

        let bag = ParamBag::for_request(report, &duration, &scope).with_report_info(&request.report_info);
        let template = &definition.query;
        if let Some(probe) = &template.probe
            && !self.probe(ctx, template, probe, Some(alias), &bag).await?
        {
            return Ok(DrilldownResponse { reports: Vec::new() });
        }
        let legs = self.run_legs(ctx, template, Some(alias), &bag).await?;

        let environments = if kind.needs_environments() {
            self.catalog.environment_names(ctx, &report.org_id).await?
        } else {
            HashMap::new()
        };
        let formatter = Formatter::new(duration.time_zone, time_format(report));
        let input = DrilldownInput {
            ctx,
            scope: &scope,
            formatter: &formatter,
            info: &request.report_info,
            filter_type: report.filter_type.as_deref(),
            environments: &environments,
            pointers: &self.pointers,
        };
        let rows = drilldown::apply(kind, legs, &input)?;
        debug!(request_id = %ctx.request_id, report_id = %kind, rows = rows.len(), "Drilldown assembled");
        assemble_drilldown(rows, &self.registry)
    }

    /// Build a widget from precomputed slot bodies in the compute alias.
    pub async fn build_computed_report(&self, ctx: &RequestContext, request: &ReportRequest) -> AppResult<ReportDocument> {
        self.validator
            .validate(ctx, "widget_id", &request.widget_id, request)
            .await?;
        let spec = self.registry.widget(&request.widget_id)?;
        self.authorize_widget(ctx, spec, request).await?;
        let duration = self.resolve(request)?;
        let component = compute_component(request)?;

        let ids: Vec<String> = spec
            .slots()
            .map(|slot| self.compute_id(request, component, &duration, &slot.query_id))
            .collect();
        let body = json!({
            "size": ids.len(),
            "query": { "ids": { "values": ids } }
        });
        let envelope = self.search.search(ctx, aliases::COMPUTE, &body).await?;
        let stored: HashMap<String, JsonValue> = envelope
            .hits
            .hits
            .into_iter()
            .map(|hit| (hit.id, hit.source))
            .collect();

        let results = spec
            .slots()
            .zip(&ids)
            .map(|(slot, id)| {
                let data = stored
                    .get(id)
                    .and_then(|doc| doc.get("data"))
                    .filter(|d| !d.is_null())
                    .cloned()
                    .unwrap_or_else(|| widget::empty_value(slot.transform_id));
                Ok(Some(data))
            })
            .collect();
        assemble_widget(spec, results, self.durations.now())
    }

    /// Fetch precomputed drilldown rows from the compute alias.
    pub async fn build_computed_drilldown(
        &self,
        ctx: &RequestContext,
        request: &DrilldownRequest,
    ) -> AppResult<DrilldownResponse> {
        let report = &request.request;
        self.validator
            .validate(ctx, "report_id", &request.report_id, report)
            .await?;
        self.registry.drilldown(&request.report_id)?;
        self.authorize_drilldown(ctx, &request.report_id, report).await?;
        let duration = self.resolve(report)?;
        let component = compute_component(report)?;

        let id = self.compute_id(report, component, &duration, &request.report_id);
        let rows = match self.search.get_document(ctx, aliases::COMPUTE, &id).await? {
            Some(doc) => match doc.get("rows").or_else(|| doc.get("data")) {
                Some(JsonValue::Array(rows)) => rows.clone(),
                Some(JsonValue::Null) | None => Vec::new(),
                Some(_) => {
                    return Err(AppError::BackendDecode(format!(
                        "computed drilldown '{}' is not a row list",
                        id
                    )));
                }
            },
            None => Vec::new(),
        };
        assemble_drilldown(rows, &self.registry)
    }

    /// Scalar metrics side by side for each component in scope.
    pub async fn component_comparison(
        &self,
        ctx: &RequestContext,
        request: &ComponentComparisonRequest,
    ) -> AppResult<ComponentComparisonResponse> {
        let report = &request.request;
        self.validator.validate_scope(ctx, report).await?;
        let mut seen = HashSet::new();
        let metric_ids: Vec<&str> = request
            .metric_ids
            .iter()
            .map(String::as_str)
            .filter(|id| seen.insert(*id))
            .collect();
        if metric_ids.is_empty() {
            return Err(AppError::InvalidArgument("metric_ids must not be empty".to_string()));
        }

        let mut metrics: Vec<(&str, &QueryTemplate, &QueryLeg)> = Vec::with_capacity(metric_ids.len());
        for id in metric_ids.iter().copied() {
            let template = self
                .registry
                .query(id)
                .map_err(|_| AppError::InvalidArgument(format!("unknown metric {}", id)))?;
            match template.legs.as_slice() {
                [leg] => metrics.push((id, template, leg)),
                _ => {
                    return Err(AppError::InvalidArgument(format!(
                        "metric {} is not a single-query metric",
                        id
                    )));
                }
            }
        }

        let duration = self.resolve(report)?;
        let scope = self.scope(ctx, report).await?;
        if scope.is_empty() {
            return Ok(ComponentComparisonResponse { rows: Vec::new() });
        }

        let mut requests = Vec::with_capacity(scope.components.len() * metrics.len());
        for component in &scope.components {
            let single = ComponentScope {
                all: false,
                components: vec![component.clone()],
            };
            let bag = ParamBag::for_request(report, &duration, &single);
            for (metric_id, template, leg) in &metrics {
                requests.push(SearchRequest {
                    key: comparison_key(&component.id, metric_id),
                    alias: leg_alias(template, leg, None)?.to_string(),
                    body: interpolate(&leg.body, &bag, &leg.required)?,
                });
            }
        }
        let mut results = self.search.msearch(ctx, &requests).await?;

        let rows = scope
            .components
            .iter()
            .map(|component| {
                let values = metrics
                    .iter()
                    .map(|(metric_id, _, leg)| {
                        let key = comparison_key(&component.id, metric_id);
                        let value = match results.remove(&key) {
                            Some(Ok(envelope)) => aggregation::decode(&envelope, leg_aggregation(leg))
                                .and_then(|a| a.into_scalar()),
                            Some(Err(e)) => Err(e),
                            None => Err(AppError::Internal(format!("no response for '{}'", key))),
                        };
                        let value = value.unwrap_or_else(|e| {
                            warn!(request_id = %ctx.request_id, key = %key, error = %e, "Comparison metric failed");
                            None
                        });
                        (metric_id.to_string(), value)
                    })
                    .collect::<BTreeMap<_, _>>();
                ComponentComparisonRow {
                    component_id: component.id.clone(),
                    component_name: component.name.clone(),
                    metrics: values,
                }
            })
            .collect();
        Ok(ComponentComparisonResponse { rows })
    }

    /// Widgets of a dashboard the caller may see.
    pub async fn get_widgets(&self, ctx: &RequestContext, request: &ManageWidgetRequest) -> AppResult<WidgetsResponse> {
        let dashboard = parse_dashboard(&request.dashboard_id)?;
        let user = request.user_id.as_deref().filter(|u| !u.is_empty());
        let org = request.org_id.as_deref().filter(|o| !o.is_empty());

        let mut widgets = Vec::new();
        for spec in self.registry.dashboard_widgets(dashboard) {
            if let (Some(role), Some(user), Some(org)) = (spec.role_required.as_deref(), user, org)
                && !self.access.authorize(ctx, user, org, role).await?
            {
                debug!(widget_id = %spec.id, user_id = %user, "Widget hidden by role");
                continue;
            }
            widgets.push(WidgetSummary {
                widget_id: spec.id.clone(),
                title: spec.title.clone(),
                w: spec.default_layout.w,
                h: spec.default_layout.h,
                mock_flag: spec.mock,
            });
        }
        Ok(WidgetsResponse {
            dashboard_id: dashboard.as_str().to_string(),
            widgets,
        })
    }

    /// Drilldowns reachable from each widget of a dashboard.
    pub fn transition_config(&self, dashboard: Dashboard) -> TransitionConfig {
        TransitionConfig {
            dashboard_id: dashboard.as_str().to_string(),
            transitions: self.registry.transitions(dashboard),
        }
    }

    /// Platform environments owned by the org chain, optionally filtered by name.
    pub async fn environments(
        &self,
        ctx: &RequestContext,
        request: &EnvironmentRequest,
        name_filter: bool,
    ) -> AppResult<Environments> {
        require_org(&request.org_id)?;
        let needle = request
            .name
            .as_deref()
            .filter(|_| name_filter)
            .map(|n| n.trim().to_lowercase())
            .filter(|n| !n.is_empty());
        let mut environments: Vec<EnvironmentSummary> = self
            .catalog
            .endpoints_in_chain(ctx, &request.org_id, &[contribution::PLATFORM_ENVIRONMENT])
            .await?
            .into_iter()
            .filter(|e| {
                needle
                    .as_deref()
                    .is_none_or(|n| e.name.to_lowercase().contains(n))
            })
            .map(|e| EnvironmentSummary {
                id: e.id,
                name: e.name,
                resource_id: e.resource_id,
            })
            .collect();
        environments.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(Environments { environments })
    }

    /// CI controllers and orchestrators owned by the org chain.
    pub async fn controllers(&self, ctx: &RequestContext, request: &CiControllerInfoRequest) -> AppResult<ControllersResponse> {
        require_org(&request.org_id)?;
        Ok(ControllersResponse {
            controllers: self.ci_tools(ctx, &request.org_id).await?,
        })
    }

    /// Whether CI insight documents exist for the org (and tool).
    pub async fn integration(
        &self,
        ctx: &RequestContext,
        request: &CiInsightIntegrationRequest,
    ) -> AppResult<IntegrationResponse> {
        require_org(&request.org_id)?;
        let mut filters = vec![json!({ "term": { "org_id": request.org_id } })];
        if let Some(tool) = request.ci_tool_id.as_deref().filter(|t| !t.is_empty()) {
            filters.push(json!({ "term": { "ci_tool_id": tool } }));
        }
        let body = json!({ "size": 0, "query": { "bool": { "filter": filters } } });
        let count = self.search.count(ctx, aliases::CI_TOOL_INSIGHT, &body).await?;
        Ok(IntegrationResponse {
            is_integrated: count > 0,
            ci_tools: self.ci_tools(ctx, &request.org_id).await?,
        })
    }

    /// Validate a completed-run request and open its page stream.
    pub async fn completed_runs(
        &self,
        ctx: &RequestContext,
        request: &ReportServiceRequest,
    ) -> AppResult<BoxStream<'static, AppResult<CompletedRunsResponse>>> {
        let report = ReportRequest {
            org_id: request.org_id.clone(),
            sub_org_id: request.sub_org_id.clone(),
            duration_type: request.duration_type,
            start_date: request.start_date.clone(),
            end_date: request.end_date.clone(),
            time_zone: request.time_zone.clone(),
            ci_tool_id: request.ci_tool_id.clone(),
            ..ReportRequest::default()
        };
        self.validator.validate_scope(ctx, &report).await?;
        let duration = self.resolve(&report)?;

        let template = self.registry.query(COMPLETED_RUNS_QUERY)?;
        let [leg] = template.legs.as_slice() else {
            return Err(AppError::Internal(format!(
                "query '{}' must have exactly one leg",
                COMPLETED_RUNS_QUERY
            )));
        };
        let scope = self.scope(ctx, &report).await?;
        if scope.is_empty() {
            debug!(request_id = %ctx.request_id, org_id = %request.org_id, "No components in scope, streaming one empty page");
            let last = CompletedRunsResponse {
                page: 0,
                runs: Vec::new(),
                last: true,
            };
            return Ok(futures_util::stream::once(async move { Ok(last) }).boxed());
        }
        let mut bag = ParamBag::for_request(&report, &duration, &scope);
        // Absent filters match everything through the template's wildcard clauses.
        bag.set_text(Token::JobId, non_blank(request.job_id.as_deref()).unwrap_or(MATCH_ALL))
            .set_text(Token::Status, non_blank(request.status.as_deref()).unwrap_or(MATCH_ALL))
            .set_text(Token::CiToolId, non_blank(request.ci_tool_id.as_deref()).unwrap_or(MATCH_ALL));
        let query = PageQuery {
            alias: leg_alias(template, leg, Some(aliases::CI_JOB_INFO))?.to_string(),
            body: interpolate(&leg.body, &bag, &leg.required)?,
            page_size: self.stream_page_size,
        };
        info!(
            request_id = %ctx.request_id,
            org_id = %request.org_id,
            page_size = query.page_size,
            "Streaming completed runs"
        );
        Ok(stream::completed_runs(self.search.clone(), ctx.clone(), query).boxed())
    }

    pub async fn put_raw_data(&self, ctx: &RequestContext, request: &DataRequest) -> AppResult<Ack> {
        require_document_id(&request.alias, &request.id)?;
        let data = request
            .data
            .as_ref()
            .filter(|d| d.is_object())
            .ok_or_else(|| AppError::InvalidArgument("data must be a JSON object".to_string()))?;
        self.search
            .index_document(ctx, &request.alias, &request.id, data)
            .await?;
        info!(alias = %request.alias, id = %request.id, "Raw document stored");
        Ok(Ack { ok: true })
    }

    pub async fn get_raw_data(&self, ctx: &RequestContext, request: &DataRequest) -> AppResult<DataResponse> {
        require_document_id(&request.alias, &request.id)?;
        let data = self
            .search
            .get_document(ctx, &request.alias, &request.id)
            .await?;
        Ok(DataResponse {
            alias: request.alias.clone(),
            id: request.id.clone(),
            found: data.is_some(),
            data,
        })
    }

    /// Store a precomputed slot body or drilldown row list.
    pub async fn put_compute_data(&self, ctx: &RequestContext, request: &ComputeUpdateRequest) -> AppResult<Ack> {
        require_org(&request.org_id)?;
        for (field, value) in [
            ("component_id", &request.component_id),
            ("start_date", &request.start_date),
            ("end_date", &request.end_date),
            ("metric_key", &request.metric_key),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::InvalidArgument(format!("{} is required", field)));
            }
        }
        let drilldown = self.registry.contains_drilldown(&request.metric_key);
        if drilldown && !request.data.is_array() {
            return Err(AppError::InvalidArgument(format!(
                "data for drilldown {} must be a row list",
                request.metric_key
            )));
        }
        let mut document = json!({
            "org_id": request.org_id,
            "component_id": request.component_id,
            "start_date": request.start_date,
            "end_date": request.end_date,
            "metric_key": request.metric_key,
        });
        let payload_key = if drilldown { "rows" } else { "data" };
        document[payload_key] = request.data.clone();
        let id = request.document_id();
        self.search
            .index_document(ctx, aliases::COMPUTE, &id, &document)
            .await?;
        info!(id = %id, "Computed document stored");
        Ok(Ack { ok: true })
    }

    /// Search backend reachability.
    pub async fn ping_backend(&self, ctx: &RequestContext) -> AppResult<()> {
        self.search.ping(ctx).await
    }

    fn resolve(&self, request: &ReportRequest) -> AppResult<ResolvedDuration> {
        self.durations.resolve(
            request.duration_type,
            request.start_date.as_deref(),
            request.end_date.as_deref(),
            request.time_zone.as_deref(),
        )
    }

    /// Components in scope, narrowed to what the user may see.
    async fn scope(&self, ctx: &RequestContext, request: &ReportRequest) -> AppResult<ComponentScope> {
        let mut scope = self
            .catalog
            .resolve_components(ctx, request.effective_sub_org(), request.component_list.as_deref())
            .await?;
        if let Some(user) = request.user_id.as_deref().filter(|u| !u.is_empty())
            && !scope.is_empty()
        {
            let permitted: HashSet<String> = self
                .access
                .permitted_components(ctx, user, request.effective_sub_org(), scope.ids())
                .await?
                .into_iter()
                .collect();
            let before = scope.components.len();
            scope.components.retain(|c| permitted.contains(&c.id));
            if scope.components.len() != before {
                debug!(
                    request_id = %ctx.request_id,
                    user_id = %user,
                    hidden = before - scope.components.len(),
                    "Components hidden by access control"
                );
            }
        }
        Ok(scope)
    }

    async fn authorize_widget(&self, ctx: &RequestContext, widget: &WidgetSpec, request: &ReportRequest) -> AppResult<()> {
        let (Some(role), Some(user)) = (
            widget.role_required.as_deref(),
            request.user_id.as_deref().filter(|u| !u.is_empty()),
        ) else {
            return Ok(());
        };
        if self.access.authorize(ctx, user, &request.org_id, role).await? {
            Ok(())
        } else {
            Err(AppError::Unauthorized(format!(
                "user {} may not view widget {}",
                user, widget.id
            )))
        }
    }

    async fn authorize_drilldown(&self, ctx: &RequestContext, report_id: &str, request: &ReportRequest) -> AppResult<()> {
        let Some(user) = request.user_id.as_deref().filter(|u| !u.is_empty()) else {
            return Ok(());
        };
        if self
            .access
            .authorize(ctx, user, request.effective_sub_org(), VIEW_PERMISSION)
            .await?
        {
            Ok(())
        } else {
            Err(AppError::Unauthorized(format!(
                "user {} may not view report {}",
                user, report_id
            )))
        }
    }

    async fn run_slot(
        &self,
        ctx: &RequestContext,
        slot: &MetricSpec,
        bag: &ParamBag,
        input: &WidgetInput<'_>,
    ) -> SlotResult {
        let template = self.registry.query(&slot.query_id)?;
        if let Some(probe) = &template.probe
            && !self.probe(ctx, template, probe, None, bag).await?
        {
            debug!(request_id = %ctx.request_id, query_id = %slot.query_id, "Probe found no documents");
            return Ok(Some(widget::empty_value(slot.transform_id)));
        }
        let legs = self.run_legs(ctx, template, None, bag).await?;
        widget::apply(slot.transform_id, legs, input).map(Some)
    }

    /// Whether any document matches the probe leg.
    async fn probe(
        &self,
        ctx: &RequestContext,
        template: &QueryTemplate,
        probe: &QueryLeg,
        default_alias: Option<&str>,
        bag: &ParamBag,
    ) -> AppResult<bool> {
        let alias = leg_alias(template, probe, default_alias)?;
        let body = interpolate(&probe.body, bag, &probe.required)?;
        Ok(self.search.count(ctx, alias, &body).await? > 0)
    }

    /// Run every leg of a template; several legs go out as one batch.
    async fn run_legs(
        &self,
        ctx: &RequestContext,
        template: &QueryTemplate,
        default_alias: Option<&str>,
        bag: &ParamBag,
    ) -> AppResult<Legs> {
        let requests = template
            .legs
            .iter()
            .map(|leg| {
                Ok(SearchRequest {
                    key: leg.name.clone(),
                    alias: leg_alias(template, leg, default_alias)?.to_string(),
                    body: interpolate(&leg.body, bag, &leg.required)?,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        let envelopes: Vec<AppResult<SearchEnvelope>> = match requests.as_slice() {
            [] => return Ok(Legs::default()),
            [single] => vec![self.search.search(ctx, &single.alias, &single.body).await],
            _ => {
                let mut results = self.search.msearch(ctx, &requests).await?;
                requests
                    .iter()
                    .map(|r| {
                        results.remove(&r.key).unwrap_or_else(|| {
                            Err(AppError::Internal(format!("no response for leg '{}'", r.key)))
                        })
                    })
                    .collect()
            }
        };

        let mut decoded = Vec::with_capacity(envelopes.len());
        for (leg, envelope) in template.legs.iter().zip(envelopes) {
            ctx.check()?;
            let aggregation = aggregation::decode(&envelope?, leg_aggregation(leg))?;
            decoded.push((leg.name.clone(), aggregation));
        }
        Ok(Legs::new(decoded))
    }

    fn compute_id(&self, request: &ReportRequest, component: &str, duration: &ResolvedDuration, metric_key: &str) -> String {
        compute_key(
            &request.org_id,
            component,
            &duration.start_local(),
            &duration.end_local(),
            metric_key,
        )
    }

    async fn ci_tools(&self, ctx: &RequestContext, org_id: &str) -> AppResult<Vec<ControllerInfo>> {
        let mut tools: Vec<ControllerInfo> = self
            .catalog
            .endpoints_in_chain(ctx, org_id, &contribution::CI_TOOLS)
            .await?
            .into_iter()
            .map(|e| ControllerInfo {
                tool_type: contribution::ci_tool_type(&e.contribution_id).to_string(),
                id: e.id,
                name: e.name,
                url: e.properties.url,
                status: e.properties.status,
                last_updated: e.audit.when,
            })
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(tools)
    }
}

fn time_format(request: &ReportRequest) -> TimeFormat {
    request
        .time_format
        .as_deref()
        .and_then(TimeFormat::parse)
        .unwrap_or_default()
}

fn leg_alias<'a>(template: &'a QueryTemplate, leg: &'a QueryLeg, default_alias: Option<&'a str>) -> AppResult<&'a str> {
    template
        .alias_for(leg, default_alias)
        .ok_or_else(|| AppError::Internal(format!("leg '{}' has no alias", leg.name)))
}

fn leg_aggregation(leg: &QueryLeg) -> &str {
    leg.aggregation.as_deref().unwrap_or(&leg.name)
}

fn comparison_key(component_id: &str, metric_id: &str) -> String {
    format!("{component_id}|{metric_id}")
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn require_org(org_id: &str) -> AppResult<()> {
    if org_id.trim().is_empty() {
        return Err(AppError::InvalidArgument("org_id is required".to_string()));
    }
    Ok(())
}

fn require_document_id(alias: &str, id: &str) -> AppResult<()> {
    if alias.trim().is_empty() || id.trim().is_empty() {
        return Err(AppError::InvalidArgument("alias and id are required".to_string()));
    }
    Ok(())
}

/// Component part of a compute key: the single explicit component, or the
/// sub-organization for whole-org requests.
fn compute_component(request: &ReportRequest) -> AppResult<&str> {
    let sub_org = request.effective_sub_org();
    let explicit: Vec<&str> = request
        .component_list
        .iter()
        .flatten()
        .map(String::as_str)
        .filter(|id| *id != ALL_COMPONENTS && *id != sub_org)
        .collect();
    let all = request
        .component_list
        .as_ref()
        .is_none_or(|ids| ids.iter().any(|id| id == ALL_COMPONENTS || id == sub_org));
    match explicit.as_slice() {
        _ if all => Ok(sub_org),
        [single] => Ok(*single),
        [] => Ok(sub_org),
        _ => Err(AppError::InvalidArgument(
            "computed reports take a single component".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(components: Option<Vec<&str>>) -> ReportRequest {
        ReportRequest {
            widget_id: "w".to_string(),
            org_id: "org".to_string(),
            sub_org_id: Some("sub".to_string()),
            component_list: components.map(|c| c.into_iter().map(str::to_string).collect()),
            ..ReportRequest::default()
        }
    }

    #[test]
    fn test_compute_component_uses_sub_org_for_all() {
        assert_eq!(compute_component(&request(None)).unwrap(), "sub");
        assert_eq!(compute_component(&request(Some(vec!["ALL"]))).unwrap(), "sub");
        assert_eq!(compute_component(&request(Some(vec!["sub"]))).unwrap(), "sub");
        assert_eq!(compute_component(&request(Some(vec!["c1"]))).unwrap(), "c1");
        assert!(matches!(
            compute_component(&request(Some(vec!["c1", "c2"]))),
            Err(AppError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_leg_aggregation_defaults_to_name() {
        let leg: QueryLeg = serde_json::from_value(json!({"name": "runs", "body": {}})).unwrap();
        assert_eq!(leg_aggregation(&leg), "runs");
        let leg: QueryLeg =
            serde_json::from_value(json!({"name": "runs", "aggregation": "run_map", "body": {}})).unwrap();
        assert_eq!(leg_aggregation(&leg), "run_map");
    }
}
