//! Drilldown row transforms.
//!
//! Each report kind reads its named legs, joins them with the catalog where
//! needed and emits camelCase rows in a deterministic order. Rows that lead
//! somewhere deeper embed a `drillDown` pointer built by the
//! [`PointerFactory`].

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::{AppError, AppResult};
use crate::models::lenient::value_as_string;
use crate::models::records::{
    AutomationActivity, AutomationRun, CommitRecord, ComponentActivity, ComponentScanners,
    PullRequestRecord, ScanResult, TestArtifact,
};
use crate::models::{Component, DrillDown, ReportInfo};
use crate::services::aggregation::{
    Aggregation, first_seen, index_first_seen, join_components, union_raw_scans,
};
use crate::services::catalog::ComponentScope;
use crate::services::context::RequestContext;

use super::format::{
    Formatter, failure_rate, log_message, normalize_status, parse_utc, scanner_display_name,
};
use super::{DrilldownKind, Legs, PointerFactory};

/// Inputs a drilldown transform may read besides its legs.
pub struct DrilldownInput<'a> {
    pub ctx: &'a RequestContext,
    pub scope: &'a ComponentScope,
    pub formatter: &'a Formatter,
    pub info: &'a ReportInfo,
    pub filter_type: Option<&'a str>,
    /// Environment endpoint id to name.
    pub environments: &'a HashMap<String, String>,
    pub pointers: &'a PointerFactory,
}

pub fn apply(kind: DrilldownKind, mut legs: Legs, input: &DrilldownInput<'_>) -> AppResult<Vec<JsonValue>> {
    match kind {
        DrilldownKind::ComponentActivity => rows(component_activity(legs.first(), input)?),
        DrilldownKind::AutomationRuns => rows(automation_runs(legs.first(), input)?),
        DrilldownKind::Deployments => {
            let runs = legs.take("runs")?;
            let deployments = legs.take("deployments")?;
            rows(deployments_rows(runs, deployments, input)?)
        }
        DrilldownKind::SecurityScanTypeWorkflows => {
            let runs = legs.take("runs")?;
            let scans = legs.take("scan_results")?;
            rows(scan_type_workflows(runs, scans, input)?)
        }
        DrilldownKind::SecurityComponents => {
            let scanners = legs.take("scanners")?;
            let raw = legs.take("raw")?;
            rows(security_components(scanners, raw, input)?)
        }
        DrilldownKind::RunScanStatus => {
            let runs = legs.take("runs")?;
            let scans = legs.take("scan_results")?;
            rows(run_scan_status(runs, scans, input)?)
        }
        DrilldownKind::Commits => rows(commits(legs.first(), input)?),
        DrilldownKind::PullRequests => rows(pull_requests(legs.first(), input)?),
        DrilldownKind::TestTotalRuns => {
            let runs = legs.take("runs")?;
            let failed = legs.take("test_cases_that_failed_at_least_once")?;
            rows(test_total_runs(runs, failed, input)?)
        }
        DrilldownKind::TestRunDetails => rows(test_run_details(legs.first(), input)?),
        DrilldownKind::TestCaseLog => rows(test_case_log(legs.first())?),
        DrilldownKind::TestRunActivity => rows(test_run_activity(legs.first(), input)?),
    }
}

fn rows<T: Serialize>(items: Vec<T>) -> AppResult<Vec<JsonValue>> {
    items
        .into_iter()
        .map(|row| {
            serde_json::to_value(row)
                .map_err(|e| AppError::Internal(format!("Failed to serialize row: {}", e)))
        })
        .collect()
}

/// Newest first; rows without a parseable time go last.
fn newest_first(a: Option<&str>, b: Option<&str>) -> Ordering {
    let a: Option<DateTime<Utc>> = a.and_then(parse_utc);
    let b: Option<DateTime<Utc>> = b.and_then(parse_utc);
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn component_by_id<'a>(scope: &'a ComponentScope, id: &str) -> Option<&'a Component> {
    scope.components.iter().find(|c| c.id == id)
}

/// Runs from a map keyed by `automation_id_run_id`, first run id wins.
fn decode_runs(runs: Aggregation) -> AppResult<Vec<AutomationRun>> {
    let runs: Vec<(String, AutomationRun)> = runs.into_map()?;
    Ok(first_seen(
        runs.into_iter().map(|(_, run)| run).collect(),
        |run| run.run_id.clone(),
    ))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ComponentActivityRow {
    component_id: String,
    component_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    repository_url: Option<String>,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_active_time: Option<String>,
    events: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    drill_down: Option<DrillDown>,
    #[serde(skip)]
    last_active_raw: Option<String>,
}

fn component_activity(agg: Aggregation, input: &DrilldownInput<'_>) -> AppResult<Vec<ComponentActivityRow>> {
    let activity: Vec<(String, ComponentActivity)> = agg.into_map()?;
    let joined = join_components(activity, &input.scope.components);
    let by_id: HashMap<&str, &ComponentActivity> =
        joined.iter().map(|(c, a)| (c.id.as_str(), a)).collect();

    let mut rows: Vec<ComponentActivityRow> = input
        .scope
        .components
        .iter()
        .map(|component| match by_id.get(component.id.as_str()) {
            Some(activity) => ComponentActivityRow {
                component_id: component.id.clone(),
                component_name: component.name.clone(),
                repository_url: component.repository_url.clone(),
                status: "Active",
                last_active_time: input.formatter.opt_timestamp(activity.last_active_time.as_deref()),
                events: activity.events,
                drill_down: Some(input.pointers.pointer(
                    DrilldownKind::AutomationRuns,
                    &[("component_id", Some(component.id.as_str()))],
                )),
                last_active_raw: activity.last_active_time.clone(),
            },
            None => ComponentActivityRow {
                component_id: component.id.clone(),
                component_name: component.name.clone(),
                repository_url: component.repository_url.clone(),
                status: "Inactive",
                last_active_time: None,
                events: 0,
                drill_down: None,
                last_active_raw: None,
            },
        })
        .collect();

    rows.sort_by(|a, b| match (a.status, b.status) {
        ("Active", "Inactive") => Ordering::Less,
        ("Inactive", "Active") => Ordering::Greater,
        ("Active", _) => newest_first(a.last_active_raw.as_deref(), b.last_active_raw.as_deref())
            .then_with(|| a.component_name.cmp(&b.component_name)),
        _ => a.component_name.cmp(&b.component_name),
    });
    Ok(rows)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AutomationRunsRow {
    automation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    automation_name: Option<String>,
    component_id: String,
    component_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    repository_url: Option<String>,
    runs: u64,
    failed_runs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_run_time: Option<String>,
    drill_down: DrillDown,
    #[serde(skip)]
    last_run_raw: Option<String>,
}

fn automation_runs(agg: Aggregation, input: &DrilldownInput<'_>) -> AppResult<Vec<AutomationRunsRow>> {
    let activity: Vec<(String, AutomationActivity)> = agg.into_map()?;
    let keyed: Vec<(String, (String, AutomationActivity))> = first_seen(activity, |(id, _)| id.clone())
        .into_iter()
        .map(|(automation_id, a)| (a.component_id.clone(), (automation_id, a)))
        .collect();
    // Several automations may share a component; join per record, not per key.
    let mut rows: Vec<AutomationRunsRow> = keyed
        .into_iter()
        .filter_map(|(component_id, (automation_id, a))| {
            let component = component_by_id(input.scope, &component_id)?;
            Some(AutomationRunsRow {
                drill_down: input.pointers.pointer(
                    DrilldownKind::RunScanStatus,
                    &[
                        ("component_id", Some(component.id.as_str())),
                        ("automation_id", Some(automation_id.as_str())),
                    ],
                ),
                automation_id,
                automation_name: a.automation_name,
                component_id: component.id.clone(),
                component_name: component.name.clone(),
                repository_url: component.repository_url.clone(),
                runs: a.runs,
                failed_runs: a.failed_runs,
                last_run_time: input.formatter.opt_timestamp(a.last_run_time.as_deref()),
                last_run_raw: a.last_run_time,
            })
        })
        .collect();
    rows.sort_by(|a, b| {
        newest_first(a.last_run_raw.as_deref(), b.last_run_raw.as_deref())
            .then_with(|| a.automation_id.cmp(&b.automation_id))
    });
    Ok(rows)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentRow {
    run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_number: Option<String>,
    automation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    automation_name: Option<String>,
    component_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    component_name: Option<String>,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    commit_sha: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    commit_description: Option<String>,
    target_environments: Vec<String>,
    duration: f64,
    #[serde(skip)]
    status_timestamp_raw: Option<String>,
}

/// Strings of a JSON array, or the single scalar.
fn string_values(value: &JsonValue) -> Vec<String> {
    match value {
        JsonValue::Array(items) => items.iter().filter_map(value_as_string).collect(),
        JsonValue::Null => Vec::new(),
        other => value_as_string(other).into_iter().collect(),
    }
}

fn deployments_rows(
    runs: Aggregation,
    deployments: Aggregation,
    input: &DrilldownInput<'_>,
) -> AppResult<Vec<DeploymentRow>> {
    let runs = decode_runs(runs)?;
    let deployments: Vec<(String, JsonValue)> = deployments.into_map()?;
    let envs_by_run = index_first_seen(deployments, |(run_id, _)| run_id.clone());
    input.ctx.check()?;

    let mut rows: Vec<DeploymentRow> = runs
        .into_iter()
        .filter_map(|run| {
            let env_ids = envs_by_run
                .get(&run.run_id)
                .map(|(_, envs)| string_values(envs))
                .unwrap_or_default();
            let names: Vec<String> = env_ids
                .iter()
                .map(|id| input.environments.get(id).cloned().unwrap_or_else(|| id.clone()))
                .collect();
            if names.is_empty() {
                return None;
            }
            if let Some(wanted) = input.info.deployment_env.as_deref()
                && !names.iter().any(|n| n == wanted)
            {
                return None;
            }
            let component_name = run.component_name.clone().or_else(|| {
                component_by_id(input.scope, &run.component_id).map(|c| c.name.clone())
            });
            Some(DeploymentRow {
                status: normalize_status(&run.status),
                status_timestamp: input.formatter.opt_timestamp(run.status_timestamp.as_deref()),
                status_timestamp_raw: run.status_timestamp,
                run_id: run.run_id,
                run_number: run.run_number,
                automation_id: run.automation_id,
                automation_name: run.automation_name,
                component_id: run.component_id,
                component_name,
                commit_sha: run.commit_sha,
                commit_description: run.commit_description,
                target_environments: names,
                duration: run.duration,
            })
        })
        .collect();
    rows.sort_by(|a, b| {
        newest_first(a.status_timestamp_raw.as_deref(), b.status_timestamp_raw.as_deref())
            .then_with(|| a.run_id.cmp(&b.run_id))
    });
    Ok(rows)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScanWorkflowRow {
    run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_number: Option<String>,
    automation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    automation_name: Option<String>,
    component_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    component_name: Option<String>,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_time: Option<String>,
    scanner_names: Vec<String>,
    scanner_types: Vec<String>,
    drill_down: DrillDown,
    #[serde(skip)]
    start_time_raw: Option<String>,
}

/// Runs inner-joined with their scan results on run id.
fn join_scans(runs: Aggregation, scans: Aggregation) -> AppResult<Vec<(AutomationRun, ScanResult)>> {
    let runs = decode_runs(runs)?;
    let scans: Vec<(String, ScanResult)> = scans.into_map()?;
    let mut by_run = index_first_seen(scans, |(run_id, _)| run_id.clone());
    Ok(runs
        .into_iter()
        .filter_map(|run| {
            let (_, scan) = by_run.remove(&run.run_id)?;
            Some((run, scan))
        })
        .collect())
}

fn scan_type_workflows(
    runs: Aggregation,
    scans: Aggregation,
    input: &DrilldownInput<'_>,
) -> AppResult<Vec<ScanWorkflowRow>> {
    let joined = join_scans(runs, scans)?;
    input.ctx.check()?;

    let mut wanted: Vec<String> = input
        .info
        .scanner_name_list
        .iter()
        .map(|n| scanner_display_name(n))
        .collect();
    if let Some(name) = input.info.scanner_name.as_deref().filter(|n| !n.is_empty()) {
        wanted.push(scanner_display_name(name));
    }

    let mut rows: Vec<ScanWorkflowRow> = joined
        .into_iter()
        .filter_map(|(run, scan)| {
            let scanner_names: Vec<String> =
                scan.scanner_names.iter().map(|n| scanner_display_name(n)).collect();
            if !wanted.is_empty() && !scanner_names.iter().any(|n| wanted.contains(n)) {
                return None;
            }
            let component_name = run.component_name.clone().or_else(|| {
                component_by_id(input.scope, &run.component_id).map(|c| c.name.clone())
            });
            Some(ScanWorkflowRow {
                drill_down: input.pointers.pointer(
                    DrilldownKind::RunScanStatus,
                    &[
                        ("component_id", Some(run.component_id.as_str())),
                        ("automation_id", Some(run.automation_id.as_str())),
                        ("run_id", Some(run.run_id.as_str())),
                    ],
                ),
                start_time: input.formatter.opt_timestamp(run.start_time.as_deref()),
                start_time_raw: run.start_time,
                status: normalize_status(&run.status),
                run_id: run.run_id,
                run_number: run.run_number,
                automation_id: run.automation_id,
                automation_name: run.automation_name,
                component_id: run.component_id,
                component_name,
                scanner_names,
                scanner_types: scan.scanner_types,
            })
        })
        .collect();
    rows.sort_by(|a, b| {
        newest_first(a.start_time_raw.as_deref(), b.start_time_raw.as_deref())
            .then_with(|| a.run_id.cmp(&b.run_id))
    });
    Ok(rows)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SecurityComponentRow {
    component_id: String,
    component_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    repository_url: Option<String>,
    scanners: Vec<String>,
    critical: u64,
    high: u64,
    medium: u64,
    low: u64,
    drill_down: DrillDown,
}

fn security_components(
    scanners: Aggregation,
    raw: Aggregation,
    input: &DrilldownInput<'_>,
) -> AppResult<Vec<SecurityComponentRow>> {
    let scanners: Vec<(String, ComponentScanners)> = scanners.into_map()?;
    let raw: Vec<String> = raw.into_list()?;
    let merged = union_raw_scans(scanners, raw);
    let mut rows: Vec<SecurityComponentRow> = join_components(merged, &input.scope.components)
        .into_iter()
        .map(|(component, entry)| {
            let mut names: Vec<String> =
                entry.scanner_names.iter().map(|n| scanner_display_name(n)).collect();
            names.sort();
            names.dedup();
            SecurityComponentRow {
                drill_down: input.pointers.pointer(
                    DrilldownKind::SecurityScanTypeWorkflows,
                    &[("component_id", Some(component.id.as_str()))],
                ),
                component_id: component.id.clone(),
                component_name: component.name.clone(),
                repository_url: component.repository_url.clone(),
                scanners: names,
                critical: entry.critical,
                high: entry.high,
                medium: entry.medium,
                low: entry.low,
            }
        })
        .collect();
    rows.sort_by(|a, b| a.component_name.cmp(&b.component_name));
    Ok(rows)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunScanStatusRow {
    run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_number: Option<String>,
    component_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    component_name: Option<String>,
    scanner_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    scanner_type: Option<String>,
    status: String,
}

fn run_scan_status(
    runs: Aggregation,
    scans: Aggregation,
    input: &DrilldownInput<'_>,
) -> AppResult<Vec<RunScanStatusRow>> {
    let mut joined = join_scans(runs, scans)?;
    input.ctx.check()?;
    joined.sort_by(|(a, _), (b, _)| {
        newest_first(a.start_time.as_deref(), b.start_time.as_deref()).then_with(|| a.run_id.cmp(&b.run_id))
    });

    let mut rows = Vec::new();
    for (run, scan) in joined {
        let status_by_name: BTreeMap<String, &String> = scan
            .status_by_scanner
            .iter()
            .map(|(name, status)| (scanner_display_name(name), status))
            .collect();
        let component_name = run
            .component_name
            .clone()
            .or_else(|| component_by_id(input.scope, &run.component_id).map(|c| c.name.clone()));
        for (idx, raw_name) in scan.scanner_names.iter().enumerate() {
            let scanner_name = scanner_display_name(raw_name);
            let status = status_by_name
                .get(&scanner_name)
                .map(|s| normalize_status(s))
                .unwrap_or_else(|| "Unknown".to_string());
            rows.push(RunScanStatusRow {
                run_id: run.run_id.clone(),
                run_number: run.run_number.clone(),
                component_id: run.component_id.clone(),
                component_name: component_name.clone(),
                scanner_name,
                scanner_type: scan.scanner_types.get(idx).cloned(),
                status,
            });
        }
    }
    Ok(rows)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CommitRow {
    commit_sha: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    author: Option<String>,
    component_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    component_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
    #[serde(skip)]
    timestamp_raw: Option<String>,
}

fn commits(agg: Aggregation, input: &DrilldownInput<'_>) -> AppResult<Vec<CommitRow>> {
    let commits: Vec<CommitRecord> = agg.into_list()?;
    let mut rows: Vec<CommitRow> = first_seen(commits, |c| c.commit_sha.clone())
        .into_iter()
        .map(|c| CommitRow {
            component_name: component_by_id(input.scope, &c.component_id).map(|x| x.name.clone()),
            timestamp: input.formatter.opt_timestamp(c.timestamp.as_deref()),
            timestamp_raw: c.timestamp,
            commit_sha: c.commit_sha,
            message: c.message,
            author: c.author,
            component_id: c.component_id,
            branch: c.branch,
        })
        .collect();
    rows.sort_by(|a, b| newest_first(a.timestamp_raw.as_deref(), b.timestamp_raw.as_deref()));
    Ok(rows)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    author: Option<String>,
    component_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    component_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    merged_at: Option<String>,
    #[serde(skip)]
    created_raw: Option<String>,
}

fn pull_requests(agg: Aggregation, input: &DrilldownInput<'_>) -> AppResult<Vec<PullRequestRow>> {
    let prs: Vec<PullRequestRecord> = agg.into_list()?;
    let wanted = input
        .filter_type
        .map(normalize_status)
        .filter(|f| !f.is_empty() && f != "All");
    let mut rows: Vec<PullRequestRow> = prs
        .into_iter()
        .map(|pr| (normalize_status(&pr.state), pr))
        .filter(|(state, _)| wanted.as_ref().is_none_or(|w| w == state))
        .map(|(state, pr)| PullRequestRow {
            component_name: component_by_id(input.scope, &pr.component_id).map(|x| x.name.clone()),
            created_at: input.formatter.opt_timestamp(pr.created_at.as_deref()),
            merged_at: input.formatter.opt_timestamp(pr.merged_at.as_deref()),
            created_raw: pr.created_at,
            number: pr.number,
            title: pr.title,
            state,
            author: pr.author,
            component_id: pr.component_id,
        })
        .collect();
    rows.sort_by(|a, b| newest_first(a.created_raw.as_deref(), b.created_raw.as_deref()));
    Ok(rows)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FailureRate {
    value: String,
    failed: u64,
    total: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FailedCaseRow {
    test_case_name: String,
    test_suite_name: String,
    status: String,
    failure_rate: FailureRate,
    view_run_activity: DrillDown,
    #[serde(skip)]
    rate: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TotalRunRow {
    run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    automation_id: Option<String>,
    component_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    component_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_time: Option<String>,
    total_cases: u64,
    passed: u64,
    failed: u64,
    skipped: u64,
    drill_down: DrillDown,
    sub_rows: Vec<FailedCaseRow>,
    #[serde(skip)]
    run_time_raw: Option<String>,
}

fn is_failed(status: &str) -> bool {
    matches!(normalize_status(status).as_str(), "Failed" | "Fail" | "Failure")
}

fn is_skipped(status: &str) -> bool {
    matches!(normalize_status(status).as_str(), "Skipped" | "Skp")
}

fn is_passed(status: &str) -> bool {
    matches!(normalize_status(status).as_str(), "Passed" | "Pass" | "Succeeded" | "Success")
}

fn test_total_runs(
    runs: Aggregation,
    failed_cases: Aggregation,
    input: &DrilldownInput<'_>,
) -> AppResult<Vec<TotalRunRow>> {
    let runs = first_seen(runs.into_buckets()?, |b| b.key.clone());
    let failed_cases = failed_cases.into_buckets()?;

    // Executions of every case that failed at least once, grouped by run.
    let mut cases_by_run: HashMap<String, Vec<(TestArtifact, u64, u64)>> = HashMap::new();
    for bucket in &failed_cases {
        let executions: Vec<TestArtifact> = bucket.hits("cases")?;
        let total = executions.len() as u64;
        let failed = executions.iter().filter(|e| is_failed(&e.status)).count() as u64;
        for execution in first_seen(executions, |e| e.run_id.clone()) {
            cases_by_run
                .entry(execution.run_id.clone())
                .or_default()
                .push((execution, failed, total));
        }
    }
    input.ctx.check()?;

    let mut rows = Vec::with_capacity(runs.len());
    for bucket in runs {
        let artifacts: Vec<TestArtifact> = bucket.hits("run")?;
        let meta = artifacts.first().cloned().unwrap_or_default();
        let count = |name: &str, pred: fn(&str) -> bool| {
            bucket
                .metric(name)
                .map(|n| n.max(0.0) as u64)
                .unwrap_or_else(|| artifacts.iter().filter(|a| pred(&a.status)).count() as u64)
        };
        let passed = count("passed", is_passed);
        let failed = count("failed", is_failed);
        let skipped = count("skipped", is_skipped);
        let run_id = bucket.key.clone();
        let component_id = meta.component_id.clone();

        let mut sub_rows: Vec<FailedCaseRow> = cases_by_run
            .remove(&run_id)
            .unwrap_or_default()
            .into_iter()
            .map(|(case, case_failed, case_total)| FailedCaseRow {
                view_run_activity: input.pointers.pointer(
                    DrilldownKind::TestRunActivity,
                    &[
                        ("automation_id", case.automation_id.as_deref().or(meta.automation_id.as_deref())),
                        ("branch", case.branch.as_deref().or(meta.branch.as_deref())),
                        ("component_id", Some(case.component_id.as_str()).filter(|s| !s.is_empty()).or(Some(component_id.as_str()))),
                        ("run_id", Some(run_id.as_str())),
                        ("run_number", case.run_number.as_deref().or(meta.run_number.as_deref())),
                        ("test_case_name", Some(case.test_case_name.as_str())),
                        ("test_suite_name", Some(case.test_suite_name.as_str())),
                    ],
                ),
                rate: if case_total == 0 { 0.0 } else { case_failed as f64 / case_total as f64 },
                failure_rate: FailureRate {
                    value: failure_rate(case_failed, case_total),
                    failed: case_failed,
                    total: case_total,
                },
                status: normalize_status(&case.status),
                test_case_name: case.test_case_name,
                test_suite_name: case.test_suite_name,
            })
            .collect();
        sub_rows.sort_by(|a, b| {
            b.rate
                .total_cmp(&a.rate)
                .then_with(|| a.test_case_name.cmp(&b.test_case_name))
        });

        rows.push(TotalRunRow {
            drill_down: input.pointers.pointer(
                DrilldownKind::TestRunDetails,
                &[
                    ("automation_id", meta.automation_id.as_deref()),
                    ("branch", meta.branch.as_deref()),
                    ("component_id", Some(component_id.as_str())),
                    ("run_id", Some(run_id.as_str())),
                    ("run_number", meta.run_number.as_deref()),
                ],
            ),
            component_name: component_by_id(input.scope, &component_id).map(|c| c.name.clone()),
            run_time: input.formatter.opt_timestamp(meta.run_time.as_deref()),
            run_time_raw: meta.run_time,
            run_id,
            run_number: meta.run_number,
            automation_id: meta.automation_id,
            component_id,
            branch: meta.branch,
            total_cases: bucket.doc_count,
            passed,
            failed,
            skipped,
            sub_rows,
        });
    }
    rows.sort_by(|a, b| {
        newest_first(a.run_time_raw.as_deref(), b.run_time_raw.as_deref()).then_with(|| {
            let an = a.run_number.as_deref().and_then(|n| n.parse::<u64>().ok());
            let bn = b.run_number.as_deref().and_then(|n| n.parse::<u64>().ok());
            bn.cmp(&an)
        })
    });
    Ok(rows)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TestCaseRow {
    test_case_name: String,
    status: String,
    duration: f64,
    drill_down: DrillDown,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SuiteRow {
    test_suite_name: String,
    component_id: String,
    run_id: String,
    total: u64,
    passed: u64,
    failed: u64,
    skipped: u64,
    /// Sum of case durations, in seconds.
    run_time: f64,
    test_cases: Vec<TestCaseRow>,
}

/// Sort rank: failed first, then skipped, passed, anything else.
fn status_rank(status: &str) -> u8 {
    if is_failed(status) {
        0
    } else if is_skipped(status) {
        1
    } else if is_passed(status) {
        2
    } else {
        3
    }
}

fn test_run_details(agg: Aggregation, input: &DrilldownInput<'_>) -> AppResult<Vec<SuiteRow>> {
    let buckets = agg.into_buckets()?;
    let mut suites: BTreeMap<(String, String, String), Vec<TestArtifact>> = BTreeMap::new();
    for bucket in &buckets {
        for case in bucket.hits::<TestArtifact>("cases")? {
            let suite = if case.test_suite_name.is_empty() {
                bucket.key.clone()
            } else {
                case.test_suite_name.clone()
            };
            suites
                .entry((case.run_id.clone(), case.component_id.clone(), suite))
                .or_default()
                .push(case);
        }
    }
    input.ctx.check()?;

    let mut rows: Vec<SuiteRow> = suites
        .into_iter()
        .map(|((run_id, component_id, suite), cases)| {
            let cases = first_seen(cases, |c| c.test_case_name.clone());
            let passed = cases.iter().filter(|c| is_passed(&c.status)).count() as u64;
            let failed = cases.iter().filter(|c| is_failed(&c.status)).count() as u64;
            let skipped = cases.iter().filter(|c| is_skipped(&c.status)).count() as u64;
            let run_time = cases.iter().map(|c| c.duration).sum::<f64>();
            let mut test_cases: Vec<TestCaseRow> = cases
                .iter()
                .map(|c| TestCaseRow {
                    test_case_name: c.test_case_name.clone(),
                    status: normalize_status(&c.status),
                    duration: c.duration,
                    drill_down: input.pointers.pointer(
                        DrilldownKind::TestCaseLog,
                        &[
                            ("component_id", Some(component_id.as_str())),
                            ("run_id", Some(run_id.as_str())),
                            ("run_number", c.run_number.as_deref()),
                            ("test_suite_name", Some(suite.as_str())),
                            ("test_case_name", Some(c.test_case_name.as_str())),
                        ],
                    ),
                })
                .collect();
            test_cases.sort_by(|a, b| {
                status_rank(&a.status)
                    .cmp(&status_rank(&b.status))
                    .then_with(|| b.test_case_name.cmp(&a.test_case_name))
            });
            SuiteRow {
                total: cases.len() as u64,
                test_suite_name: suite,
                component_id,
                run_id,
                passed,
                failed,
                skipped,
                run_time,
                test_cases,
            }
        })
        .collect();
    rows.sort_by(|a, b| {
        b.failed
            .cmp(&a.failed)
            .then_with(|| a.test_suite_name.cmp(&b.test_suite_name))
    });
    Ok(rows)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LogRow {
    test_case_name: String,
    test_suite_name: String,
    status: String,
    run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_number: Option<String>,
    message: String,
}

fn test_case_log(agg: Aggregation) -> AppResult<Vec<LogRow>> {
    let entries: Vec<TestArtifact> = agg.into_list()?;
    Ok(entries
        .into_iter()
        .map(|e| LogRow {
            message: log_message(e.std_out.as_deref(), e.std_err.as_deref(), e.error_trace.as_deref()),
            test_case_name: e.test_case_name,
            test_suite_name: e.test_suite_name,
            status: normalize_status(&e.status),
            run_id: e.run_id,
            run_number: e.run_number,
        })
        .collect())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunActivityRow {
    run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<String>,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_time: Option<String>,
    duration: f64,
    drill_down: DrillDown,
    #[serde(skip)]
    run_time_raw: Option<String>,
}

fn test_run_activity(agg: Aggregation, input: &DrilldownInput<'_>) -> AppResult<Vec<RunActivityRow>> {
    let executions: Vec<TestArtifact> = agg.into_list()?;
    let mut rows: Vec<RunActivityRow> = first_seen(executions, |e| e.run_id.clone())
        .into_iter()
        .map(|e| RunActivityRow {
            drill_down: input.pointers.pointer(
                DrilldownKind::TestCaseLog,
                &[
                    ("component_id", Some(e.component_id.as_str())),
                    ("run_id", Some(e.run_id.as_str())),
                    ("run_number", e.run_number.as_deref()),
                    ("test_suite_name", Some(e.test_suite_name.as_str())),
                    ("test_case_name", Some(e.test_case_name.as_str())),
                ],
            ),
            status: normalize_status(&e.status),
            run_time: input.formatter.opt_timestamp(e.run_time.as_deref()),
            run_time_raw: e.run_time,
            run_id: e.run_id,
            run_number: e.run_number,
            branch: e.branch,
            duration: e.duration,
        })
        .collect();
    rows.sort_by(|a, b| newest_first(a.run_time_raw.as_deref(), b.run_time_raw.as_deref()));
    Ok(rows)
}
