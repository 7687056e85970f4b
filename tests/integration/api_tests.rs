//! HTTP surface through actix test services.

use std::sync::Arc;

use actix_web::dev::{Service, ServiceResponse};
use actix_web::http::StatusCode;
use actix_web::{App, test, web};
use serde_json::{Value as JsonValue, json};

use insights_report_lib::api::{
    configure_admin_routes, configure_dashboard_routes, configure_health_routes,
    configure_report_routes,
};
use insights_report_lib::auth::AdminKey;
use insights_report_lib::middleware::RequestLogger;
use insights_report_lib::services::{InMemoryLayoutStore, LayoutService};

use crate::common::{FakePeers, FakeSearch, harness, report};

const ADMIN_KEY: &str = "test-admin-key";

/// Full API surface over the fakes, with an in-memory layout store.
async fn create_test_app(
    search: FakeSearch,
) -> impl Service<actix_http::Request, Response = ServiceResponse, Error = actix_web::Error> {
    let h = harness(search, FakePeers::standard());
    let layouts = LayoutService::new(h.registry.clone(), Arc::new(InMemoryLayoutStore::new()));
    test::init_service(
        App::new()
            .app_data(web::Data::new(h.engine))
            .app_data(web::Data::new(layouts))
            .app_data(web::Data::new(AdminKey::new(Some(ADMIN_KEY.to_string()))))
            .wrap(RequestLogger)
            .service(
                web::scope("/api/v1")
                    .configure(configure_health_routes)
                    .configure(configure_report_routes)
                    .configure(configure_dashboard_routes)
                    .configure(configure_admin_routes),
            ),
    )
    .await
}

#[actix_rt::test]
async fn test_health_and_readiness() {
    let app = create_test_app(FakeSearch::new()).await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/v1/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/v1/ready").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: JsonValue = test::read_body_json(resp).await;
    assert_eq!(body["status"], json!("ready"));
}

#[actix_rt::test]
async fn test_report_endpoint_returns_document() {
    let search = FakeSearch::new().with_aggregations("lead_time", json!({ "lead_time": { "value": 2.5 } }));
    let app = create_test_app(search).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/reports")
        .insert_header(("X-Request-Id", "req-42"))
        .set_json(&report("dora-lead-time"))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("x-request-id").unwrap(), "req-42");
    let body: JsonValue = test::read_body_json(resp).await;
    assert_eq!(body["status"], json!("success"));
    assert_eq!(body["content"][0]["header"][0]["data"]["value"], json!(2.5));
}

#[actix_rt::test]
async fn test_report_errors_map_to_status_codes() {
    let app = create_test_app(FakeSearch::new()).await;

    let mut bad = report("dora-lead-time");
    bad.org_id = String::new();
    let req = test::TestRequest::post().uri("/api/v1/reports").set_json(&bad).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: JsonValue = test::read_body_json(resp).await;
    assert_eq!(body["error"], json!("INVALID_ARGUMENT"));

    let req = test::TestRequest::post()
        .uri("/api/v1/reports")
        .set_json(&report("no-such-widget"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::post()
        .uri("/api/v1/reports")
        .set_json(&report("dora-lead-time"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: JsonValue = test::read_body_json(resp).await;
    assert_eq!(body["error"], json!("INTERNAL"));
    assert!(body["correlation_id"].is_string());
}

#[actix_rt::test]
async fn test_admin_routes_require_key() {
    let app = create_test_app(FakeSearch::new()).await;
    let document = json!({ "alias": "deploy_data", "id": "d1", "data": { "component_id": "c1" } });

    let req = test::TestRequest::put()
        .uri("/api/v1/admin/raw-data")
        .set_json(&document)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::put()
        .uri("/api/v1/admin/raw-data")
        .insert_header(("X-Admin-Key", "wrong"))
        .set_json(&document)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::put()
        .uri("/api/v1/admin/raw-data")
        .insert_header(("X-Admin-Key", ADMIN_KEY))
        .set_json(&document)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::post()
        .uri("/api/v1/admin/raw-data/get")
        .insert_header(("X-Admin-Key", ADMIN_KEY))
        .set_json(json!({ "alias": "deploy_data", "id": "d1" }))
        .to_request();
    let body: JsonValue = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["found"], json!(true));
    assert_eq!(body["data"]["component_id"], json!("c1"));
}

#[actix_rt::test]
async fn test_layout_round_trip() {
    let app = create_test_app(FakeSearch::new()).await;
    let get = || {
        test::TestRequest::post()
            .uri("/api/v1/dashboards/layout/get")
            .set_json(json!({ "dashboard_id": "dora-metrics", "user_id": "u1" }))
            .to_request()
    };

    let default: JsonValue = test::call_and_read_body_json(&app, get()).await;
    assert_eq!(default["is_custom"], json!(false));
    let first = default["widgets"][0]["widget_id"].as_str().unwrap().to_string();

    let req = test::TestRequest::put()
        .uri("/api/v1/dashboards/layout")
        .set_json(json!({
            "dashboard_id": "dora-metrics",
            "user_id": "u1",
            "layout": [{ "widget_id": first, "w": 12, "h": 4 }]
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let custom: JsonValue = test::call_and_read_body_json(&app, get()).await;
    assert_eq!(custom["is_custom"], json!(true));
    assert_eq!(custom["widgets"], json!([{ "widget_id": first, "w": 12, "h": 4, "mock_flag": false }]));
}

#[actix_rt::test]
async fn test_layout_rejects_foreign_widget() {
    let app = create_test_app(FakeSearch::new()).await;

    let req = test::TestRequest::put()
        .uri("/api/v1/dashboards/layout")
        .set_json(json!({
            "dashboard_id": "dora-metrics",
            "user_id": "u1",
            "layout": [{ "widget_id": "sda-automation-runs", "w": 4, "h": 4 }]
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn test_transition_config_for_unknown_kind() {
    let app = create_test_app(FakeSearch::new()).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/dashboards/unknown/transition-config")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
