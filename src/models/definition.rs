//! Widget, query and drilldown definitions loaded from disk at startup.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;

/// Default grid size of a widget on its dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LayoutSize {
    pub w: u32,
    pub h: u32,
}

impl Default for LayoutSize {
    fn default() -> Self {
        LayoutSize { w: 4, h: 2 }
    }
}

/// Widget-level transform applied to a slot's decoded aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WidgetTransform {
    /// Numeric `aggregations.<name>.value`.
    Scalar,
    /// Number of keys in a map-valued aggregation.
    MapSize,
    /// `{status: count}` map rendered as a normalized pie series.
    StatusBreakdown,
    /// Date histogram buckets rendered as an x/y series.
    DateHistogram,
    /// Active versus inactive components, joined with the catalog.
    ComponentActivitySummary,
    /// List of `{date, count}` rows rendered as a deployment series.
    DeploymentFrequency,
    /// Mean time to recovery over failure/recovery pairs.
    Mttr,
    /// Scanner coverage per component, unioned with raw scans.
    ScannerCoverage,
    /// Test insights indicator block gated by a document probe.
    TestIndicators,
    /// Per-run pass/fail/skip totals.
    RunStatusSummary,
}

impl WidgetTransform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scalar => "scalar",
            Self::MapSize => "map_size",
            Self::StatusBreakdown => "status_breakdown",
            Self::DateHistogram => "date_histogram",
            Self::ComponentActivitySummary => "component_activity_summary",
            Self::DeploymentFrequency => "deployment_frequency",
            Self::Mttr => "mttr",
            Self::ScannerCoverage => "scanner_coverage",
            Self::TestIndicators => "test_indicators",
            Self::RunStatusSummary => "run_status_summary",
        }
    }
}

/// Chart style hint for a section slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    #[default]
    Bar,
    Line,
    Pie,
    Table,
}

/// Header or footer slot: a single metric.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MetricSpec {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub query_id: String,
    pub transform_id: WidgetTransform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subwidget_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drilldown_id: Option<String>,
}

/// Section slot: a metric rendered as a chart.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChartSpec {
    #[serde(flatten)]
    pub metric: MetricSpec,
    #[serde(default)]
    pub chart_type: ChartType,
}

/// A dashboard widget: header metrics, chart sections and footer metrics.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WidgetSpec {
    pub id: String,
    /// Filled from the definition file name when omitted.
    #[serde(default)]
    pub dashboard_id: String,
    pub title: String,
    #[serde(default)]
    pub header: Vec<MetricSpec>,
    #[serde(default)]
    pub sections: Vec<ChartSpec>,
    #[serde(default)]
    pub footer: Vec<MetricSpec>,
    #[serde(default)]
    pub default_layout: LayoutSize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_required: Option<String>,
    /// Rendered by clients with placeholder data.
    #[serde(default)]
    pub mock: bool,
}

impl WidgetSpec {
    /// Every slot in document order: header, sections, footer.
    pub fn slots(&self) -> impl Iterator<Item = &MetricSpec> {
        self.header
            .iter()
            .chain(self.sections.iter().map(|c| &c.metric))
            .chain(self.footer.iter())
    }
}

/// One backend query of a template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryLeg {
    /// Key under which the leg's response is returned.
    pub name: String,
    /// Overrides the template or drilldown alias.
    #[serde(default)]
    pub alias: Option<String>,
    /// Top-level aggregation name the decoder looks for.
    #[serde(default)]
    pub aggregation: Option<String>,
    /// Query body with `"{{token}}"` placeholders.
    pub body: JsonValue,
    /// Tokens that must be present in the parameter bag.
    #[serde(default)]
    pub required: Vec<String>,
}

/// A named backend query: one or more legs plus an optional existence probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryTemplate {
    #[serde(default)]
    pub alias: Option<String>,
    pub legs: Vec<QueryLeg>,
    #[serde(default)]
    pub probe: Option<QueryLeg>,
}

impl QueryTemplate {
    /// Resolve the alias a leg targets, falling back to `default_alias`.
    pub fn alias_for<'a>(&'a self, leg: &'a QueryLeg, default_alias: Option<&'a str>) -> Option<&'a str> {
        leg.alias
            .as_deref()
            .or(self.alias.as_deref())
            .or(default_alias)
    }
}

/// A drilldown report definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrilldownDefinition {
    pub title: String,
    #[serde(default = "default_report_type")]
    pub report_type: String,
    #[serde(flatten)]
    pub query: QueryTemplate,
}

fn default_report_type() -> String {
    "table".to_string()
}
