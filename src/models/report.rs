//! Report documents and drilldown responses returned to dashboard clients.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;

use super::definition::{ChartType, LayoutSize};

/// Outcome of a widget build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ReportStatus {
    Success,
    NoData,
    Error,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NoData => "no-data",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pointer to a deeper drilldown view embedded in a row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DrillDown {
    pub report_id: String,
    pub report_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_type: Option<String>,
    pub report_info: BTreeMap<String, String>,
}

impl DrillDown {
    pub fn new(report_id: &str, report_title: impl Into<String>) -> Self {
        DrillDown {
            report_id: report_id.to_string(),
            report_title: report_title.into(),
            report_type: None,
            report_info: BTreeMap::new(),
        }
    }

    /// Add a `report_info` entry; empty or missing values are skipped.
    pub fn with(mut self, key: &str, value: Option<&str>) -> Self {
        if let Some(v) = value.filter(|v| !v.is_empty()) {
            self.report_info.insert(key.to_string(), v.to_string());
        }
        self
    }
}

/// A rendered header, section or footer slot.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReportNode {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subwidget_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drilldown_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_type: Option<ChartType>,
    /// `None` marks a slot whose producer returned nothing at all.
    pub data: Option<JsonValue>,
}

impl ReportNode {
    /// Whether the node carries data of length zero.
    pub fn is_empty(&self) -> bool {
        match &self.data {
            None | Some(JsonValue::Null) => true,
            Some(JsonValue::Array(items)) => items.is_empty(),
            Some(JsonValue::Object(map)) => map.is_empty(),
            Some(_) => false,
        }
    }
}

/// One content block of a widget document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ReportContent {
    pub header: Vec<ReportNode>,
    pub sections: Vec<ReportNode>,
    pub footer: Vec<ReportNode>,
}

impl ReportContent {
    pub fn nodes(&self) -> impl Iterator<Item = &ReportNode> {
        self.header
            .iter()
            .chain(self.sections.iter())
            .chain(self.footer.iter())
    }
}

/// The widget document.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReportDocument {
    pub widget_id: String,
    pub content: Vec<ReportContent>,
    pub status: ReportStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Server time the document was produced (RFC-3339).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

impl ReportDocument {
    /// Document for a request that resolved to nothing to query.
    pub fn no_data(widget_id: &str, message: &str) -> Self {
        ReportDocument {
            widget_id: widget_id.to_string(),
            content: Vec::new(),
            status: ReportStatus::NoData,
            message: Some(message.to_string()),
            error: None,
            time: None,
        }
    }
}

/// Drilldown rows in transformer-declared order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct DrilldownResponse {
    pub reports: Vec<JsonValue>,
}

/// Slot outline of a widget, no data.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SlotOutline {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drilldown_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_type: Option<ChartType>,
}

/// Widget outline returned by the layout builder.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WidgetOutline {
    pub widget_id: String,
    pub title: String,
    pub default_layout: LayoutSize,
    pub header: Vec<SlotOutline>,
    pub sections: Vec<SlotOutline>,
    pub footer: Vec<SlotOutline>,
}

/// Report layout response.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReportLayoutResponse {
    pub dashboard_id: String,
    pub widgets: Vec<WidgetOutline>,
}

/// One component's metrics in a comparison.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ComponentComparisonRow {
    pub component_id: String,
    pub component_name: String,
    /// Metric id to value; `None` when the metric had no data.
    pub metrics: BTreeMap<String, Option<f64>>,
}

/// Component comparison response.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ComponentComparisonResponse {
    pub rows: Vec<ComponentComparisonRow>,
}
