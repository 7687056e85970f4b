//! Report document and drilldown response assembly.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::error::{AppError, AppResult};
use crate::models::{
    DrilldownResponse, MetricSpec, ReportContent, ReportDocument, ReportNode, ReportStatus,
    WidgetSpec,
};
use crate::models::definition::ChartType;
use crate::services::interpolate::Token;
use crate::services::registry::Registry;

pub const NO_DATA_MESSAGE: &str = "No data available for the selected filters";
pub const PARTIAL_DATA_MESSAGE: &str = "Some widget data could not be loaded";

/// What a slot producer returned: `Ok(None)` means it produced nothing at all.
pub type SlotResult = AppResult<Option<JsonValue>>;

fn node(spec: &MetricSpec, chart_type: Option<ChartType>, data: JsonValue) -> ReportNode {
    ReportNode {
        title: spec.title.clone(),
        description: spec.description.clone(),
        subwidget_id: spec.subwidget_id.clone(),
        drilldown_id: spec.drilldown_id.clone(),
        chart_type,
        data: Some(data),
    }
}

/// Assemble a widget document from slot results given in `widget.slots()` order.
pub fn assemble_widget(widget: &WidgetSpec, results: Vec<SlotResult>, now: DateTime<Utc>) -> AppResult<ReportDocument> {
    let expected = widget.slots().count();
    if results.len() != expected {
        return Err(AppError::Internal(format!(
            "widget '{}' produced {} slot results for {} slots",
            widget.id,
            results.len(),
            expected
        )));
    }

    let mut first_error: Option<AppError> = None;
    let mut failed = 0usize;
    let mut data = Vec::with_capacity(expected);
    for (spec, result) in widget.slots().zip(results) {
        match result {
            Ok(Some(JsonValue::Null)) | Ok(None) => {
                return Err(AppError::Internal(format!(
                    "widget '{}' slot '{}' produced no data",
                    widget.id, spec.title
                )));
            }
            Ok(Some(value)) => data.push(value),
            Err(e) if e.is_client_error() => return Err(e),
            Err(e) => {
                warn!(widget_id = %widget.id, slot = %spec.title, error = %e, "Widget slot failed");
                failed += 1;
                first_error.get_or_insert(e);
                data.push(JsonValue::Array(Vec::new()));
            }
        }
    }

    let mut values = data.into_iter();
    let mut content = ReportContent::default();
    for spec in &widget.header {
        content.header.push(node(spec, None, values.next().unwrap_or(JsonValue::Null)));
    }
    for chart in &widget.sections {
        content.sections.push(node(
            &chart.metric,
            Some(chart.chart_type),
            values.next().unwrap_or(JsonValue::Null),
        ));
    }
    for spec in &widget.footer {
        content.footer.push(node(spec, None, values.next().unwrap_or(JsonValue::Null)));
    }

    let presentable = content.nodes().any(|n| !n.is_empty());
    let (status, message) = match first_error {
        Some(e) if failed == expected || !presentable => return Err(e),
        Some(_) => (ReportStatus::NoData, Some(PARTIAL_DATA_MESSAGE.to_string())),
        None if !presentable => (ReportStatus::NoData, Some(NO_DATA_MESSAGE.to_string())),
        None => (ReportStatus::Success, None),
    };

    Ok(ReportDocument {
        widget_id: widget.id.clone(),
        content: vec![content],
        status,
        message,
        error: None,
        time: Some(now.to_rfc3339_opts(SecondsFormat::Secs, true)),
    })
}

/// Wrap rows after checking every embedded pointer against the registry.
pub fn assemble_drilldown(rows: Vec<JsonValue>, registry: &Registry) -> AppResult<DrilldownResponse> {
    for row in &rows {
        check_pointers(row, registry)?;
    }
    Ok(DrilldownResponse { reports: rows })
}

fn check_pointers(value: &JsonValue, registry: &Registry) -> AppResult<()> {
    match value {
        JsonValue::Object(map) => {
            if let Some(JsonValue::String(report_id)) = map.get("report_id")
                && !report_id.is_empty()
            {
                if !registry.contains_drilldown(report_id) {
                    return Err(AppError::Internal(format!(
                        "row points to unknown drilldown '{}'",
                        report_id
                    )));
                }
                if let Some(JsonValue::Object(info)) = map.get("report_info")
                    && let Some(key) = info.keys().find(|k| Token::from_info_key(k).is_none())
                {
                    return Err(AppError::Internal(format!(
                        "pointer to '{}' carries unknown parameter '{}'",
                        report_id, key
                    )));
                }
            }
            map.values().try_for_each(|v| check_pointers(v, registry))
        }
        JsonValue::Array(items) => items.iter().try_for_each(|v| check_pointers(v, registry)),
        _ => Ok(()),
    }
}
