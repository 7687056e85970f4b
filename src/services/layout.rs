//! Dashboard layouts: registry defaults plus per-user overrides.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::models::{
    Dashboard, DashboardLayout, DashboardLayoutRequest, ReportLayoutResponse, SlotOutline,
    WidgetLayout, WidgetOutline, WidgetSpec,
};
use crate::services::registry::Registry;

/// Persistence for user layout overrides.
#[async_trait]
pub trait LayoutStore: Send + Sync {
    async fn get_layout(&self, user_id: &str, dashboard: Dashboard) -> AppResult<Option<Vec<WidgetLayout>>>;

    async fn put_layout(&self, user_id: &str, dashboard: Dashboard, layout: &[WidgetLayout]) -> AppResult<()>;

    /// Store reachability, for readiness checks.
    async fn ping(&self) -> AppResult<()>;
}

/// Process-local store used by tests and development setups.
#[derive(Debug, Default)]
pub struct InMemoryLayoutStore {
    layouts: RwLock<HashMap<(String, Dashboard), Vec<WidgetLayout>>>,
}

impl InMemoryLayoutStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LayoutStore for InMemoryLayoutStore {
    async fn get_layout(&self, user_id: &str, dashboard: Dashboard) -> AppResult<Option<Vec<WidgetLayout>>> {
        Ok(self
            .layouts
            .read()
            .await
            .get(&(user_id.to_string(), dashboard))
            .cloned())
    }

    async fn put_layout(&self, user_id: &str, dashboard: Dashboard, layout: &[WidgetLayout]) -> AppResult<()> {
        self.layouts
            .write()
            .await
            .insert((user_id.to_string(), dashboard), layout.to_vec());
        Ok(())
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

/// Parse a dashboard id, mapping unknown names to `NotFound`.
pub fn parse_dashboard(id: &str) -> AppResult<Dashboard> {
    Dashboard::parse(id).ok_or_else(|| AppError::NotFound(format!("Dashboard '{}'", id)))
}

fn default_layout(spec: &WidgetSpec) -> WidgetLayout {
    WidgetLayout {
        widget_id: spec.id.clone(),
        w: spec.default_layout.w,
        h: spec.default_layout.h,
        mock_flag: spec.mock,
    }
}

fn outline(spec: &WidgetSpec) -> WidgetOutline {
    let slot = |title: &str, drilldown_id: &Option<String>, chart_type| SlotOutline {
        title: title.to_string(),
        drilldown_id: drilldown_id.clone(),
        chart_type,
    };
    WidgetOutline {
        widget_id: spec.id.clone(),
        title: spec.title.clone(),
        default_layout: spec.default_layout,
        header: spec.header.iter().map(|m| slot(&m.title, &m.drilldown_id, None)).collect(),
        sections: spec
            .sections
            .iter()
            .map(|c| slot(&c.metric.title, &c.metric.drilldown_id, Some(c.chart_type)))
            .collect(),
        footer: spec.footer.iter().map(|m| slot(&m.title, &m.drilldown_id, None)).collect(),
    }
}

pub struct LayoutService {
    registry: Arc<Registry>,
    store: Arc<dyn LayoutStore>,
}

impl LayoutService {
    pub fn new(registry: Arc<Registry>, store: Arc<dyn LayoutStore>) -> Self {
        Self { registry, store }
    }

    pub fn store(&self) -> &Arc<dyn LayoutStore> {
        &self.store
    }

    /// The user's override when one is stored, otherwise the dashboard default.
    pub async fn get(&self, request: &DashboardLayoutRequest) -> AppResult<DashboardLayout> {
        let dashboard = parse_dashboard(&request.dashboard_id)?;
        if let Some(user_id) = request.user_id.as_deref().filter(|u| !u.is_empty())
            && let Some(widgets) = self.store.get_layout(user_id, dashboard).await?
        {
            return Ok(DashboardLayout {
                dashboard_id: dashboard.as_str().to_string(),
                widgets,
                is_custom: true,
            });
        }
        Ok(DashboardLayout {
            dashboard_id: dashboard.as_str().to_string(),
            widgets: self
                .registry
                .dashboard_widgets(dashboard)
                .into_iter()
                .map(default_layout)
                .collect(),
            is_custom: false,
        })
    }

    /// Persist a user override after checking it against the dashboard.
    pub async fn update(&self, request: &DashboardLayoutRequest) -> AppResult<()> {
        let dashboard = parse_dashboard(&request.dashboard_id)?;
        let user_id = request
            .user_id
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| AppError::InvalidArgument("user_id is required".to_string()))?;

        let known: HashSet<&str> = self
            .registry
            .dashboard_widgets(dashboard)
            .into_iter()
            .map(|w| w.id.as_str())
            .collect();
        let mut seen = HashSet::new();
        for entry in &request.layout {
            if !known.contains(entry.widget_id.as_str()) {
                return Err(AppError::InvalidArgument(format!(
                    "widget {} does not belong to dashboard {}",
                    entry.widget_id, dashboard
                )));
            }
            if !seen.insert(entry.widget_id.as_str()) {
                return Err(AppError::InvalidArgument(format!(
                    "widget {} appears more than once",
                    entry.widget_id
                )));
            }
            if entry.w == 0 || entry.h == 0 {
                return Err(AppError::InvalidArgument(format!(
                    "widget {} must have a positive size",
                    entry.widget_id
                )));
            }
        }

        self.store.put_layout(user_id, dashboard, &request.layout).await?;
        info!(user_id = %user_id, dashboard = %dashboard, widgets = request.layout.len(), "Dashboard layout updated");
        Ok(())
    }

    /// Widget outlines of a dashboard, without any data.
    pub fn report_layout(&self, dashboard_id: &str) -> AppResult<ReportLayoutResponse> {
        let dashboard = parse_dashboard(dashboard_id)?;
        Ok(ReportLayoutResponse {
            dashboard_id: dashboard.as_str().to_string(),
            widgets: self
                .registry
                .dashboard_widgets(dashboard)
                .into_iter()
                .map(outline)
                .collect(),
        })
    }
}
