//! Typed records decoded from search aggregations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::lenient::{f64_lenient, opt_string_or_number, string_list, u64_lenient};

/// `component_activity` entry keyed by component id.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ComponentActivity {
    /// RFC-3339 UTC timestamp of the latest event.
    #[serde(default)]
    pub last_active_time: Option<String>,
    #[serde(default, deserialize_with = "u64_lenient")]
    pub events: u64,
}

/// `automation_activity` entry keyed by automation id.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AutomationActivity {
    pub component_id: String,
    #[serde(default)]
    pub automation_name: Option<String>,
    #[serde(default, deserialize_with = "u64_lenient")]
    pub runs: u64,
    #[serde(default, deserialize_with = "u64_lenient")]
    pub failed_runs: u64,
    #[serde(default)]
    pub last_run_time: Option<String>,
}

/// One execution of an automation workflow.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AutomationRun {
    pub automation_id: String,
    pub run_id: String,
    pub component_id: String,
    #[serde(default)]
    pub component_name: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub run_number: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub status_timestamp: Option<String>,
    #[serde(default)]
    pub commit_sha: Option<String>,
    #[serde(default)]
    pub commit_description: Option<String>,
    #[serde(default)]
    pub org_name: Option<String>,
    #[serde(default)]
    pub target_env: Option<String>,
    #[serde(default)]
    pub step_kind: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub automation_name: Option<String>,
    #[serde(default, deserialize_with = "f64_lenient")]
    pub duration: f64,
}

/// Scanners that ran for one run, keyed by run id.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ScanResult {
    #[serde(default)]
    pub run_id: String,
    #[serde(default)]
    pub component_id: String,
    #[serde(default, deserialize_with = "string_list")]
    pub scanner_names: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub scanner_types: Vec<String>,
    #[serde(default)]
    pub status_by_scanner: BTreeMap<String, String>,
}

/// Scanners seen for one component, keyed by component id.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ComponentScanners {
    #[serde(default, deserialize_with = "string_list")]
    pub scanner_names: Vec<String>,
    #[serde(default, deserialize_with = "u64_lenient")]
    pub critical: u64,
    #[serde(default, deserialize_with = "u64_lenient")]
    pub high: u64,
    #[serde(default, deserialize_with = "u64_lenient")]
    pub medium: u64,
    #[serde(default, deserialize_with = "u64_lenient")]
    pub low: u64,
}

/// A test case execution document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TestArtifact {
    #[serde(default)]
    pub test_suite_name: String,
    #[serde(default)]
    pub test_case_name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub component_id: String,
    #[serde(default)]
    pub run_id: String,
    #[serde(default)]
    pub automation_id: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub run_number: Option<String>,
    #[serde(default)]
    pub run_time: Option<String>,
    #[serde(default, deserialize_with = "f64_lenient")]
    pub duration: f64,
    #[serde(default)]
    pub std_out: Option<String>,
    #[serde(default)]
    pub std_err: Option<String>,
    #[serde(default)]
    pub error_trace: Option<String>,
}

/// Commit entry of a list-valued `commits` aggregation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CommitRecord {
    #[serde(default)]
    pub commit_sha: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub component_id: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Pull request entry of a list-valued `pull_requests` aggregation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PullRequestRecord {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub number: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub component_id: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub merged_at: Option<String>,
}

/// Failure followed by recovery, used for mean time to recovery.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MttrPair {
    #[serde(default)]
    pub component_id: Option<String>,
    pub failed_at: String,
    #[serde(default)]
    pub recovered_at: Option<String>,
}

/// One row of a deployment-frequency list.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeploymentFrequencyRow {
    pub date: String,
    #[serde(default, deserialize_with = "u64_lenient")]
    pub count: u64,
}

/// Pass/fail/skip totals of one run, keyed by run id.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RunStatusTotals {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub run_number: Option<String>,
    #[serde(default, deserialize_with = "u64_lenient")]
    pub passed: u64,
    #[serde(default, deserialize_with = "u64_lenient")]
    pub failed: u64,
    #[serde(default, deserialize_with = "u64_lenient")]
    pub skipped: u64,
}

/// A completed CI job run from the CI insights index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CompletedRun {
    #[serde(default)]
    pub job_id: String,
    #[serde(default)]
    pub job_name: Option<String>,
    #[serde(default)]
    pub run_id: String,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub run_number: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub status_timestamp: Option<String>,
    #[serde(default, deserialize_with = "f64_lenient")]
    pub duration: f64,
    #[serde(default)]
    pub ci_tool_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_automation_run_tolerates_numeric_run_number() {
        let run: AutomationRun = serde_json::from_value(serde_json::json!({
            "automation_id": "a1",
            "run_id": "r1",
            "component_id": "c1",
            "run_number": 3,
            "status": "SUCCEEDED",
            "duration": 12
        }))
        .unwrap();
        assert_eq!(run.run_number.as_deref(), Some("3"));
        assert_eq!(run.duration, 12.0);
        assert_eq!(run.step_kind, None);
    }

    #[test]
    fn test_test_artifact_defaults() {
        let artifact: TestArtifact = serde_json::from_value(serde_json::json!({
            "test_case_name": "login works",
            "status": "PASSED"
        }))
        .unwrap();
        assert_eq!(artifact.test_suite_name, "");
        assert_eq!(artifact.duration, 0.0);
        assert!(artifact.std_out.is_none());
    }
}
