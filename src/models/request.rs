//! Inbound report and drilldown requests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;

use super::lenient::{opt_string_or_number, string_list};

/// Sentinel meaning "every component owned by the sub-organization".
pub const ALL_COMPONENTS: &str = "ALL";

/// Symbolic reporting window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DurationType {
    CurrentWeek,
    PreviousWeek,
    TwoWeeksBack,
    CurrentMonth,
    PreviousMonth,
    TwoMonthsBack,
    #[serde(rename = "LAST_90_DAYS")]
    Last90Days,
    CustomRange,
    #[default]
    #[serde(other)]
    UnknownDurationType,
}

impl DurationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CurrentWeek => "CURRENT_WEEK",
            Self::PreviousWeek => "PREVIOUS_WEEK",
            Self::TwoWeeksBack => "TWO_WEEKS_BACK",
            Self::CurrentMonth => "CURRENT_MONTH",
            Self::PreviousMonth => "PREVIOUS_MONTH",
            Self::TwoMonthsBack => "TWO_MONTHS_BACK",
            Self::Last90Days => "LAST_90_DAYS",
            Self::CustomRange => "CUSTOM_RANGE",
            Self::UnknownDurationType => "UNKNOWN_DURATION_TYPE",
        }
    }

    /// Types whose window is computed from the clock rather than the request.
    pub fn is_symbolic(&self) -> bool {
        !matches!(self, Self::CustomRange | Self::UnknownDurationType)
    }
}

impl std::fmt::Display for DurationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Clock style for user-facing timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum TimeFormat {
    #[serde(rename = "12h")]
    TwelveHour,
    #[default]
    #[serde(rename = "24h")]
    TwentyFourHour,
}

impl TimeFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TwelveHour => "12h",
            Self::TwentyFourHour => "24h",
        }
    }

    /// Parse from string representation; `None` for anything unknown.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "12h" => Some(Self::TwelveHour),
            "24h" | "" => Some(Self::TwentyFourHour),
            _ => None,
        }
    }
}

/// Dashboard widget request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ReportRequest {
    #[serde(default)]
    pub widget_id: String,
    pub org_id: String,
    #[serde(default)]
    pub sub_org_id: Option<String>,
    /// Explicit component ids, or `["ALL"]`. Absent means `["ALL"]`.
    #[serde(default)]
    pub component_list: Option<Vec<String>>,
    #[serde(default)]
    pub duration_type: DurationType,
    /// `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD` in `time_zone`.
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    /// IANA zone name; defaults to UTC.
    #[serde(default)]
    pub time_zone: Option<String>,
    /// `12h` or `24h`; defaults to `24h`.
    #[serde(default)]
    pub time_format: Option<String>,
    #[serde(default)]
    pub environment_id: Option<String>,
    #[serde(default)]
    pub ci_tool_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub view_option: Option<String>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub filter_type: Option<String>,
}

impl ReportRequest {
    /// The sub-organization a request targets (the org itself when unset).
    pub fn effective_sub_org(&self) -> &str {
        self.sub_org_id
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&self.org_id)
    }
}

/// Free-form drilldown parameters carried by an embedded pointer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scanner_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(
        default,
        deserialize_with = "opt_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub run_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_suite_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_case_name: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub scanner_name_list: Vec<String>,
    #[serde(
        default,
        deserialize_with = "string_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub run_id_list: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_env: Option<String>,
    /// Keys this service does not interpret; forwarded to templates verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

/// Drilldown request: a report request plus the drilldown target.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct DrilldownRequest {
    #[serde(flatten)]
    pub request: ReportRequest,
    #[serde(default)]
    pub report_id: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub report_info: ReportInfo,
}

/// Widget skeleton request.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReportLayoutRequest {
    pub dashboard_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Side-by-side comparison of scalar metrics across components.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ComponentComparisonRequest {
    #[serde(flatten)]
    pub request: ReportRequest,
    /// Scalar query ids to evaluate for every component.
    pub metric_ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_type_wire_names() {
        let d: DurationType = serde_json::from_str("\"LAST_90_DAYS\"").unwrap();
        assert_eq!(d, DurationType::Last90Days);
        let d: DurationType = serde_json::from_str("\"TWO_MONTHS_BACK\"").unwrap();
        assert_eq!(d, DurationType::TwoMonthsBack);
        let d: DurationType = serde_json::from_str("\"SOMETHING_ELSE\"").unwrap();
        assert_eq!(d, DurationType::UnknownDurationType);
        assert_eq!(
            serde_json::to_string(&DurationType::CustomRange).unwrap(),
            "\"CUSTOM_RANGE\""
        );
    }

    #[test]
    fn test_time_format_parse() {
        assert_eq!(TimeFormat::parse("12h"), Some(TimeFormat::TwelveHour));
        assert_eq!(TimeFormat::parse("24H"), Some(TimeFormat::TwentyFourHour));
        assert_eq!(TimeFormat::parse("13h"), None);
    }

    #[test]
    fn test_drilldown_request_flattens_report_fields() {
        let req: DrilldownRequest = serde_json::from_str(
            r#"{
                "org_id": "org-1",
                "report_id": "test-case-log",
                "duration_type": "CURRENT_WEEK",
                "report_info": {"run_id": "r1", "run_number": 12, "custom": "x"}
            }"#,
        )
        .unwrap();
        assert_eq!(req.request.org_id, "org-1");
        assert_eq!(req.request.effective_sub_org(), "org-1");
        assert_eq!(req.report_info.run_number.as_deref(), Some("12"));
        assert_eq!(req.report_info.extra["custom"], "x");
    }
}
