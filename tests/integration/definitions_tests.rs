//! Loading the definitions directory.

use std::fs;
use std::path::Path;

use serde_json::{Value as JsonValue, json};
use tempfile::TempDir;

use insights_report_lib::models::Dashboard;
use insights_report_lib::services::Registry;
use insights_report_lib::services::registry::RegistryError;

use crate::common::{definitions_dir, registry};

/// Copy of the shipped definitions that a test may break.
fn scratch_definitions() -> TempDir {
    let dir = TempDir::new().unwrap();
    copy_dir(&definitions_dir(), dir.path());
    dir
}

fn copy_dir(from: &Path, to: &Path) {
    fs::create_dir_all(to).unwrap();
    for entry in fs::read_dir(from).unwrap() {
        let entry = entry.unwrap();
        let target = to.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            copy_dir(&entry.path(), &target);
        } else {
            fs::copy(entry.path(), target).unwrap();
        }
    }
}

/// Paths of `range` bounds that close on the end of the window.
fn closed_end_bounds(value: &JsonValue, path: &str, found: &mut Vec<String>) {
    match value {
        JsonValue::Object(map) => {
            for (key, child) in map {
                let child_path = format!("{}/{}", path, key);
                if key == "lte" && child.as_str().is_some_and(|v| v.contains("{{endDate}}")) {
                    found.push(child_path.clone());
                }
                closed_end_bounds(child, &child_path, found);
            }
        }
        JsonValue::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                closed_end_bounds(child, &format!("{}/{}", path, i), found);
            }
        }
        _ => {}
    }
}

#[test]
fn test_windows_exclude_their_end_instant() {
    for file in ["queries.json", "drilldown_queries.json"] {
        let raw = fs::read_to_string(definitions_dir().join(file)).unwrap();
        let templates: JsonValue = serde_json::from_str(&raw).unwrap();
        let mut found = Vec::new();
        closed_end_bounds(&templates, "", &mut found);
        assert!(found.is_empty(), "{} closes windows with lte: {:?}", file, found);
        assert!(raw.contains("\"lt\": \"{{endDate}}\""), "{} has no end bound", file);
    }
}

#[test]
fn test_shipped_definitions_load() {
    let summary = registry().summary();
    assert_eq!(summary.dashboards, 9);
    assert_eq!(summary.widgets, 29);
    assert_eq!(summary.queries, 29);
    assert_eq!(summary.drilldowns, 12);
}

#[test]
fn test_transitions_follow_drilldown_links() {
    let transitions = registry().transitions(Dashboard::SoftwareDeliveryActivity);
    let reached = &transitions["sda-automation-runs"];
    assert_eq!(reached[0], "component-activity");
    assert!(reached.iter().any(|id| id == "automation-runs"));
}

#[test]
fn test_widget_with_unknown_query_is_rejected() {
    let dir = scratch_definitions();
    let widgets = json!([{
        "id": "broken",
        "title": "Broken",
        "header": [{ "title": "Nothing", "query_id": "no-such-query", "transform_id": "scalar" }],
        "default_layout": { "w": 2, "h": 2 }
    }]);
    fs::write(
        dir.path().join("widgets/flow-metrics.json"),
        serde_json::to_string(&widgets).unwrap(),
    )
    .unwrap();

    let err = Registry::load(dir.path()).unwrap_err();

    assert!(matches!(err, RegistryError::Invalid(_)), "got {:?}", err);
}

#[test]
fn test_unknown_dashboard_file_is_rejected() {
    let dir = scratch_definitions();
    fs::write(dir.path().join("widgets/mystery.json"), "[]").unwrap();

    let err = Registry::load(dir.path()).unwrap_err();

    assert!(err.to_string().contains("mystery"), "got {}", err);
}

#[test]
fn test_missing_alias_file_is_io_error() {
    let dir = scratch_definitions();
    fs::remove_file(dir.path().join("drilldown_aliases.json")).unwrap();

    let err = Registry::load(dir.path()).unwrap_err();

    assert!(matches!(err, RegistryError::Io { .. }), "got {:?}", err);
}

#[test]
fn test_malformed_queries_file_is_parse_error() {
    let dir = scratch_definitions();
    fs::write(dir.path().join("queries.json"), "{ not json").unwrap();

    let err = Registry::load(dir.path()).unwrap_err();

    assert!(matches!(err, RegistryError::Parse { .. }), "got {:?}", err);
}
