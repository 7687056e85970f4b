//! Widget slot transforms.

use std::collections::HashMap;

use serde_json::{Value as JsonValue, json};

use crate::error::{AppError, AppResult};
use crate::models::WidgetTransform;
use crate::models::lenient::value_as_f64;
use crate::models::records::{
    ComponentActivity, ComponentScanners, DeploymentFrequencyRow, MttrPair, RunStatusTotals,
};
use crate::services::aggregation::{Aggregation, join_components, union_raw_scans};
use crate::services::catalog::ComponentScope;

use super::Legs;
use super::format::{normalize_status, parse_utc, scanner_display_name};

/// Inputs a widget transform may read besides its legs.
pub struct WidgetInput<'a> {
    pub scope: &'a ComponentScope,
}

/// Legs a transform reads by name; others take their first leg.
pub fn required_legs(transform: WidgetTransform) -> &'static [&'static str] {
    match transform {
        WidgetTransform::ScannerCoverage => &["scanners", "raw"],
        _ => &[],
    }
}

/// Node data for a slot whose probe found nothing.
pub fn empty_value(transform: WidgetTransform) -> JsonValue {
    match transform {
        WidgetTransform::TestIndicators => json!({
            "isTestInsightsDataFound": false,
            "testCasesPassed": 0,
            "testCasesFailed": 0,
            "testCasesSkipped": 0,
        }),
        WidgetTransform::Scalar
        | WidgetTransform::MapSize
        | WidgetTransform::ComponentActivitySummary
        | WidgetTransform::Mttr => json!({}),
        WidgetTransform::StatusBreakdown
        | WidgetTransform::DateHistogram
        | WidgetTransform::DeploymentFrequency
        | WidgetTransform::ScannerCoverage
        | WidgetTransform::RunStatusSummary => json!([]),
    }
}

pub fn apply(transform: WidgetTransform, mut legs: Legs, input: &WidgetInput<'_>) -> AppResult<JsonValue> {
    match transform {
        WidgetTransform::Scalar => scalar(legs.first()),
        WidgetTransform::MapSize => map_size(legs.first()),
        WidgetTransform::StatusBreakdown => status_breakdown(legs.first()),
        WidgetTransform::DateHistogram => date_histogram(legs.first()),
        WidgetTransform::ComponentActivitySummary => component_activity_summary(legs.first(), input.scope),
        WidgetTransform::DeploymentFrequency => deployment_frequency(legs.first()),
        WidgetTransform::Mttr => mttr(legs.first()),
        WidgetTransform::ScannerCoverage => {
            let scanners = legs.take("scanners")?;
            let raw = legs.take("raw")?;
            scanner_coverage(scanners, raw, input.scope)
        }
        WidgetTransform::TestIndicators => test_indicators(legs.first()),
        WidgetTransform::RunStatusSummary => run_status_summary(legs.first()),
    }
}

fn scalar(agg: Aggregation) -> AppResult<JsonValue> {
    Ok(match agg.into_scalar()? {
        Some(value) => json!({ "value": value }),
        None => json!({}),
    })
}

fn map_size(agg: Aggregation) -> AppResult<JsonValue> {
    let size = match agg {
        Aggregation::Empty => return Ok(json!({})),
        Aggregation::Map(entries) => entries.len(),
        Aggregation::List(items) => items.len(),
        Aggregation::Buckets(buckets) => buckets.len(),
        Aggregation::Scalar(_) => {
            return Err(AppError::BackendDecode(
                "map_size expects a map, list or buckets".to_string(),
            ));
        }
    };
    Ok(json!({ "value": size }))
}

fn status_breakdown(agg: Aggregation) -> AppResult<JsonValue> {
    let counts: Vec<(String, JsonValue)> = agg.into_map()?;
    let mut merged: Vec<(String, f64)> = Vec::new();
    for (status, count) in counts {
        let name = normalize_status(&status);
        let count = value_as_f64(&count).unwrap_or(0.0);
        match merged.iter_mut().find(|(n, _)| *n == name) {
            Some((_, total)) => *total += count,
            None => merged.push((name, count)),
        }
    }
    let total: f64 = merged.iter().map(|(_, c)| c).sum();
    if total <= 0.0 {
        return Ok(json!([]));
    }
    merged.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    Ok(JsonValue::Array(
        merged
            .into_iter()
            .map(|(name, value)| {
                json!({
                    "name": name,
                    "value": value,
                    "percentage": format!("{:.1}%", value * 100.0 / total),
                })
            })
            .collect(),
    ))
}

fn date_histogram(agg: Aggregation) -> AppResult<JsonValue> {
    let buckets = agg.into_buckets()?;
    Ok(JsonValue::Array(
        buckets
            .iter()
            .map(|b| {
                let y = b.metric("value").unwrap_or(b.doc_count as f64);
                json!({ "x": b.key, "y": y })
            })
            .collect(),
    ))
}

fn component_activity_summary(agg: Aggregation, scope: &ComponentScope) -> AppResult<JsonValue> {
    let activity: Vec<(String, ComponentActivity)> = agg.into_map()?;
    if scope.components.is_empty() {
        return Ok(json!({}));
    }
    let active = join_components(activity, &scope.components)
        .into_iter()
        .filter(|(_, a)| a.events > 0)
        .count();
    let total = scope.components.len();
    Ok(json!({
        "active": active,
        "inactive": total.saturating_sub(active),
        "total": total,
    }))
}

fn deployment_frequency(agg: Aggregation) -> AppResult<JsonValue> {
    let rows: Vec<DeploymentFrequencyRow> = agg.into_list()?;
    Ok(JsonValue::Array(
        rows.into_iter()
            .map(|r| json!({ "x": r.date, "y": r.count }))
            .collect(),
    ))
}

fn mttr(agg: Aggregation) -> AppResult<JsonValue> {
    let pairs: Vec<MttrPair> = agg.into_list()?;
    if pairs.is_empty() {
        return Ok(json!({}));
    }
    let mut recovered = Vec::new();
    let mut open = 0usize;
    for pair in &pairs {
        let failed = parse_utc(&pair.failed_at);
        let back = pair.recovered_at.as_deref().and_then(parse_utc);
        match (failed, back) {
            (Some(failed), Some(back)) if back >= failed => {
                recovered.push((back - failed).num_seconds() as f64 / 3600.0);
            }
            _ => open += 1,
        }
    }
    let mean = if recovered.is_empty() {
        0.0
    } else {
        recovered.iter().sum::<f64>() / recovered.len() as f64
    };
    Ok(json!({
        "value": (mean * 100.0).round() / 100.0,
        "unit": "hours",
        "incidents": recovered.len(),
        "open": open,
    }))
}

fn scanner_coverage(scanners: Aggregation, raw: Aggregation, scope: &ComponentScope) -> AppResult<JsonValue> {
    let scanners: Vec<(String, ComponentScanners)> = scanners.into_map()?;
    let raw: Vec<String> = raw.into_list()?;
    let merged = union_raw_scans(scanners, raw);
    let in_scope: Vec<(String, ComponentScanners)> = join_components(merged, &scope.components)
        .into_iter()
        .map(|(c, s)| (c.id.clone(), s))
        .collect();

    let mut counts: HashMap<String, u64> = HashMap::new();
    for (_, entry) in &in_scope {
        let mut names: Vec<String> = entry.scanner_names.iter().map(|n| scanner_display_name(n)).collect();
        names.sort();
        names.dedup();
        for name in names {
            *counts.entry(name).or_default() += 1;
        }
    }
    let mut series: Vec<(String, u64)> = counts.into_iter().collect();
    series.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    Ok(JsonValue::Array(
        series
            .into_iter()
            .map(|(name, value)| json!({ "name": name, "value": value }))
            .collect(),
    ))
}

fn test_indicators(agg: Aggregation) -> AppResult<JsonValue> {
    if agg.is_empty() {
        return Ok(empty_value(WidgetTransform::TestIndicators));
    }
    let counts: Vec<(String, JsonValue)> = agg.into_map()?;
    let (mut passed, mut failed, mut skipped) = (0u64, 0u64, 0u64);
    for (status, count) in counts {
        let n = value_as_f64(&count).unwrap_or(0.0).max(0.0) as u64;
        match normalize_status(&status).as_str() {
            "Passed" | "Success" | "Succeeded" => passed += n,
            "Failed" | "Fail" | "Failure" => failed += n,
            "Skipped" | "Skp" => skipped += n,
            _ => {}
        }
    }
    Ok(json!({
        "isTestInsightsDataFound": true,
        "testCasesPassed": passed,
        "testCasesFailed": failed,
        "testCasesSkipped": skipped,
    }))
}

fn run_status_summary(agg: Aggregation) -> AppResult<JsonValue> {
    let mut runs: Vec<(String, RunStatusTotals)> = agg.into_map()?;
    runs.sort_by(|a, b| {
        let an = a.1.run_number.as_deref().and_then(|n| n.parse::<u64>().ok());
        let bn = b.1.run_number.as_deref().and_then(|n| n.parse::<u64>().ok());
        bn.cmp(&an).then_with(|| a.0.cmp(&b.0))
    });
    Ok(JsonValue::Array(
        runs.into_iter()
            .map(|(run_id, totals)| {
                json!({
                    "runId": run_id,
                    "runNumber": totals.run_number,
                    "passed": totals.passed,
                    "failed": totals.failed,
                    "skipped": totals.skipped,
                })
            })
            .collect(),
    ))
}
