//! Completed CI run paging and the catalog listings.

use futures_util::StreamExt;
use serde_json::json;

use insights_report_lib::error::AppError;
use insights_report_lib::models::catalog::contribution;
use insights_report_lib::models::{
    CiInsightIntegrationRequest, DurationType, EnvironmentRequest, ReportServiceRequest,
};

use crate::common::{END, FakePeers, FakeSearch, ORG, START, SUB_ORG, ctx, endpoint, harness};

fn run(id: &str, timestamp: &str) -> serde_json::Value {
    json!({
        "_id": id,
        "_source": {
            "job_id": "build",
            "run_id": id,
            "run_number": 7,
            "status": "SUCCESS",
            "status_timestamp": timestamp,
            "duration": "1200"
        },
        "sort": [timestamp, id]
    })
}

fn runs_request() -> ReportServiceRequest {
    ReportServiceRequest {
        org_id: ORG.to_string(),
        duration_type: DurationType::CustomRange,
        start_date: Some(START.to_string()),
        end_date: Some(END.to_string()),
        time_zone: Some("UTC".to_string()),
        ..ReportServiceRequest::default()
    }
}

#[tokio::test]
async fn test_completed_runs_pages_until_short_page() {
    let search = FakeSearch::new()
        .with_page(json!([run("r3", "2024-03-03"), run("r2", "2024-03-02")]))
        .with_page(json!([run("r1", "2024-03-01")]));
    let h = harness(search, FakePeers::standard());

    let pages: Vec<_> = h
        .engine
        .completed_runs(&ctx(), &runs_request())
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(pages.len(), 2);
    let first = pages[0].as_ref().unwrap();
    assert_eq!(first.page, 0);
    assert!(!first.last);
    assert_eq!(first.runs.len(), 2);
    assert_eq!(first.runs[0].run_number.as_deref(), Some("7"));
    let second = pages[1].as_ref().unwrap();
    assert_eq!(second.page, 1);
    assert!(second.last);

    let calls = h.search.calls();
    assert_eq!(calls.len(), 2);
    let (alias, body) = &calls[0];
    assert_eq!(alias, "cb_ci_job_info");
    assert_eq!(body["size"], json!(2));
    assert!(body.get("aggs").is_none());
    assert!(body.get("search_after").is_none());
    assert_eq!(body["sort"][0]["status_timestamp"]["order"], json!("desc"));
    assert_eq!(body.pointer("/query/bool/filter/2/wildcard/job_id"), Some(&json!("*")));
    assert_eq!(body.pointer("/query/bool/filter/5/terms/component_id"), Some(&json!(["c1", "c2"])));
    assert_eq!(body.pointer("/query/bool/filter/6/wildcard/ci_tool_id"), Some(&json!("*")));
    assert_eq!(calls[1].1["search_after"], json!(["2024-03-02", "r2"]));
}

#[tokio::test]
async fn test_completed_runs_binds_filters() {
    let mut peers = FakePeers::standard();
    peers.endpoints = vec![endpoint("t1", contribution::JENKINS, "jenkins", ORG)];
    let h = harness(FakeSearch::new(), peers);
    let mut request = runs_request();
    request.sub_org_id = Some(SUB_ORG.to_string());
    request.ci_tool_id = Some("t1".to_string());
    request.job_id = Some("deploy".to_string());
    request.status = Some("FAILURE".to_string());

    let pages: Vec<_> = h
        .engine
        .completed_runs(&ctx(), &request)
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(pages.len(), 1);
    assert!(pages[0].as_ref().unwrap().last);
    let (_, body) = &h.search.calls()[0];
    assert_eq!(body.pointer("/query/bool/filter/2/wildcard/job_id"), Some(&json!("deploy")));
    assert_eq!(body.pointer("/query/bool/filter/3/wildcard/status"), Some(&json!("FAILURE")));
    assert_eq!(body.pointer("/query/bool/filter/5/terms/component_id"), Some(&json!(["c3", "c4"])));
    assert_eq!(body.pointer("/query/bool/filter/6/wildcard/ci_tool_id"), Some(&json!("t1")));
}

#[tokio::test]
async fn test_completed_runs_window_excludes_end_instant() {
    let h = harness(FakeSearch::new(), FakePeers::standard());
    let request = ReportServiceRequest {
        duration_type: DurationType::PreviousMonth,
        start_date: None,
        end_date: None,
        ..runs_request()
    };

    let _pages: Vec<_> = h
        .engine
        .completed_runs(&ctx(), &request)
        .await
        .unwrap()
        .collect()
        .await;

    let (_, body) = &h.search.calls()[0];
    let range = body.pointer("/query/bool/filter/1/range/status_timestamp").unwrap();
    assert_eq!(range["gte"], json!("2024-02-01 00:00:00"));
    assert_eq!(range["lt"], json!("2024-03-01 00:00:00"));
    assert!(range.get("lte").is_none());
}

#[tokio::test]
async fn test_completed_runs_without_components_streams_one_empty_page() {
    let h = harness(FakeSearch::new(), FakePeers::standard());
    let mut request = runs_request();
    request.org_id = "org-without-components".to_string();

    let pages: Vec<_> = h
        .engine
        .completed_runs(&ctx(), &request)
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(pages.len(), 1);
    let page = pages[0].as_ref().unwrap();
    assert!(page.last);
    assert!(page.runs.is_empty());
    assert!(h.search.calls().is_empty());
}

#[tokio::test]
async fn test_completed_runs_validates_before_streaming() {
    let h = harness(FakeSearch::new(), FakePeers::standard());
    let mut request = runs_request();
    request.end_date = Some("2024-02-01 00:00:00".to_string());

    let err = match h.engine.completed_runs(&ctx(), &request).await {
        Ok(_) => panic!("expected a validation error"),
        Err(e) => e,
    };

    assert!(matches!(err, AppError::InvalidArgument(_)), "got {:?}", err);
    assert!(h.search.calls().is_empty());
}

#[tokio::test]
async fn test_environments_sorted_and_filtered() {
    let mut peers = FakePeers::standard();
    peers.endpoints = vec![
        endpoint("e2", contribution::PLATFORM_ENVIRONMENT, "staging", ORG),
        endpoint("e1", contribution::PLATFORM_ENVIRONMENT, "production", ORG),
        endpoint("e3", contribution::PLATFORM_ENVIRONMENT, "elsewhere", "another-org"),
        endpoint("t1", contribution::JENKINS, "jenkins", ORG),
    ];
    let h = harness(FakeSearch::new(), peers);
    let request = EnvironmentRequest {
        org_id: ORG.to_string(),
        name: Some("STAG".to_string()),
    };

    let all = h.engine.environments(&ctx(), &request, false).await.unwrap();
    let names: Vec<&str> = all.environments.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["production", "staging"]);

    let filtered = h.engine.environments(&ctx(), &request, true).await.unwrap();
    assert_eq!(filtered.environments.len(), 1);
    assert_eq!(filtered.environments[0].id, "e2");
}

#[tokio::test]
async fn test_integration_counts_ci_insight_documents() {
    let mut peers = FakePeers::standard();
    peers.endpoints = vec![endpoint("t1", contribution::JENKINS, "jenkins", ORG)];
    let search = FakeSearch::new().with_count("cb_ci_tool_insight", 4);
    let h = harness(search, peers);

    let response = h
        .engine
        .integration(
            &ctx(),
            &CiInsightIntegrationRequest {
                org_id: ORG.to_string(),
                ci_tool_id: Some("t1".to_string()),
            },
        )
        .await
        .unwrap();

    assert!(response.is_integrated);
    assert_eq!(response.ci_tools.len(), 1);
    let (alias, body) = &h.search.calls()[0];
    assert_eq!(alias, "cb_ci_tool_insight");
    assert_eq!(body.pointer("/query/bool/filter/1/term/ci_tool_id"), Some(&json!("t1")));
}
