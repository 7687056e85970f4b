//! Drilldown tables, live and precomputed.

use serde_json::json;

use insights_report_lib::error::AppError;
use insights_report_lib::models::{ComputeUpdateRequest, DrilldownRequest};

use crate::common::{FakePeers, FakeSearch, ORG, ctx, harness, report};

fn drilldown(report_id: &str) -> DrilldownRequest {
    DrilldownRequest {
        request: report(""),
        report_id: report_id.to_string(),
        ..DrilldownRequest::default()
    }
}

#[tokio::test]
async fn test_component_activity_rows() {
    let search = FakeSearch::new().with_aggregations(
        "component_activity",
        json!({
            "component_activity": {
                "value": {
                    "c1": { "events": 5, "last_active_time": "2024-03-10T08:00:00Z" }
                }
            }
        }),
    );
    let h = harness(search, FakePeers::standard());

    let response = h
        .engine
        .build_drilldown(&ctx(), &drilldown("component-activity"))
        .await
        .unwrap();

    assert_eq!(response.reports.len(), 2);
    let active = &response.reports[0];
    assert_eq!(active["componentId"], json!("c1"));
    assert_eq!(active["componentName"], json!("checkout"));
    assert_eq!(active["status"], json!("Active"));
    assert_eq!(active["events"], json!(5));
    assert_eq!(active["drillDown"]["report_id"], json!("automation-runs"));

    let inactive = &response.reports[1];
    assert_eq!(inactive["componentId"], json!("c2"));
    assert_eq!(inactive["status"], json!("Inactive"));
    assert_eq!(inactive["events"], json!(0));

    let (alias, _) = &h.search.calls()[0];
    assert_eq!(alias, "automation_run_status");
}

#[tokio::test]
async fn test_drilldown_without_components_is_empty() {
    let h = harness(FakeSearch::new(), FakePeers::standard());
    let mut request = drilldown("component-activity");
    request.request.org_id = "org-without-components".to_string();

    let response = h.engine.build_drilldown(&ctx(), &request).await.unwrap();

    assert!(response.reports.is_empty());
    assert!(h.search.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_drilldown_is_not_found() {
    let h = harness(FakeSearch::new(), FakePeers::standard());

    let err = h
        .engine
        .build_drilldown(&ctx(), &drilldown("no-such-report"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_missing_report_id_is_invalid() {
    let h = harness(FakeSearch::new(), FakePeers::standard());

    let err = h.engine.build_drilldown(&ctx(), &drilldown("  ")).await.unwrap_err();

    assert!(matches!(err, AppError::InvalidArgument(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_denied_user_cannot_drill_down() {
    let mut peers = FakePeers::standard();
    peers.denied_users.insert("outsider".to_string());
    let h = harness(FakeSearch::new(), peers);
    let mut request = drilldown("component-activity");
    request.request.user_id = Some("outsider".to_string());

    let err = h.engine.build_drilldown(&ctx(), &request).await.unwrap_err();

    assert!(matches!(err, AppError::Unauthorized(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_computed_drilldown_returns_stored_rows() {
    let h = harness(FakeSearch::new(), FakePeers::standard());
    let rows = json!([{ "componentId": "c1", "events": 9 }]);
    h.engine
        .put_compute_data(
            &ctx(),
            &ComputeUpdateRequest {
                org_id: ORG.to_string(),
                component_id: ORG.to_string(),
                start_date: "2024-03-01 00:00:00".to_string(),
                end_date: "2024-03-31 23:59:59".to_string(),
                metric_key: "component-activity".to_string(),
                data: rows.clone(),
            },
        )
        .await
        .unwrap();

    let response = h
        .engine
        .build_computed_drilldown(&ctx(), &drilldown("component-activity"))
        .await
        .unwrap();

    assert_eq!(json!(response.reports), rows);
}

#[tokio::test]
async fn test_computed_drilldown_rejects_non_list_rows() {
    let h = harness(FakeSearch::new(), FakePeers::standard());

    let err = h
        .engine
        .put_compute_data(
            &ctx(),
            &ComputeUpdateRequest {
                org_id: ORG.to_string(),
                component_id: "c1".to_string(),
                start_date: "2024-03-01 00:00:00".to_string(),
                end_date: "2024-03-31 23:59:59".to_string(),
                metric_key: "component-activity".to_string(),
                data: json!({ "rows": 1 }),
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidArgument(_)), "got {:?}", err);
}
