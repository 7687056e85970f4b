//! Completed CI run streaming.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::records::CompletedRun;
use super::request::DurationType;

/// Window and filters for streaming completed CI runs.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ReportServiceRequest {
    pub org_id: String,
    #[serde(default)]
    pub sub_org_id: Option<String>,
    #[serde(default)]
    pub duration_type: DurationType,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub ci_tool_id: Option<String>,
    /// Restrict to one job.
    #[serde(default)]
    pub job_id: Option<String>,
    /// Restrict to one terminal status (e.g. `FAILURE`).
    #[serde(default)]
    pub status: Option<String>,
}

/// One page of the completed-run stream.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CompletedRunsResponse {
    /// Zero-based page index.
    pub page: u32,
    pub runs: Vec<CompletedRun>,
    /// Set on the final page.
    pub last: bool,
}
