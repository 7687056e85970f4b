//! Dashboard layouts, widget listings and transition configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Dashboards this service knows how to lay out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Dashboard {
    SoftwareDeliveryActivity,
    SecurityInsights,
    FlowMetrics,
    DoraMetrics,
    CiInsights,
    TestInsights,
    ComponentSecurity,
    ApplicationSecurity,
    ComponentSummary,
}

impl Dashboard {
    pub const ALL: [Dashboard; 9] = [
        Dashboard::SoftwareDeliveryActivity,
        Dashboard::SecurityInsights,
        Dashboard::FlowMetrics,
        Dashboard::DoraMetrics,
        Dashboard::CiInsights,
        Dashboard::TestInsights,
        Dashboard::ComponentSecurity,
        Dashboard::ApplicationSecurity,
        Dashboard::ComponentSummary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SoftwareDeliveryActivity => "software-delivery-activity",
            Self::SecurityInsights => "security-insights",
            Self::FlowMetrics => "flow-metrics",
            Self::DoraMetrics => "dora-metrics",
            Self::CiInsights => "ci-insights",
            Self::TestInsights => "test-insights",
            Self::ComponentSecurity => "component-security",
            Self::ApplicationSecurity => "application-security",
            Self::ComponentSummary => "component-summary",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.as_str() == s)
    }
}

impl std::fmt::Display for Dashboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Position of one widget in a dashboard layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WidgetLayout {
    pub widget_id: String,
    pub w: u32,
    pub h: u32,
    #[serde(default)]
    pub mock_flag: bool,
}

/// Get or update request for a dashboard layout.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct DashboardLayoutRequest {
    pub dashboard_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Replacement layout; only used by updates.
    #[serde(default)]
    pub layout: Vec<WidgetLayout>,
}

/// Ordered widget layout for one dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DashboardLayout {
    pub dashboard_id: String,
    pub widgets: Vec<WidgetLayout>,
    /// Whether the layout is a persisted user override.
    pub is_custom: bool,
}

/// Widget listing request.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ManageWidgetRequest {
    pub dashboard_id: String,
    #[serde(default)]
    pub org_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Widget entry in a listing.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WidgetSummary {
    pub widget_id: String,
    pub title: String,
    pub w: u32,
    pub h: u32,
    pub mock_flag: bool,
}

/// Widget listing response.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WidgetsResponse {
    pub dashboard_id: String,
    pub widgets: Vec<WidgetSummary>,
}

/// Widgets of a dashboard and the drilldowns each one leads to.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransitionConfig {
    pub dashboard_id: String,
    pub transitions: BTreeMap<String, Vec<String>>,
}

/// Empty acknowledgement.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct Ack {
    pub ok: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dashboard_names_round_trip() {
        for d in Dashboard::ALL {
            assert_eq!(Dashboard::parse(d.as_str()), Some(d));
            let json = serde_json::to_string(&d).unwrap();
            assert_eq!(json, format!("\"{}\"", d.as_str()));
        }
        assert_eq!(Dashboard::parse("unknown-dashboard"), None);
    }
}
