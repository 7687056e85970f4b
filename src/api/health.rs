//! Health check endpoints.

use actix_web::{HttpResponse, get, web};
use chrono::Utc;
use serde::Serialize;
use tracing::warn;
use utoipa::ToSchema;

use crate::services::{LayoutService, ReportEngine, RequestContext};

/// Health check response.
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    status: &'static str,
    timestamp: String,
}

/// Readiness check response.
#[derive(Serialize, ToSchema)]
pub struct ReadyResponse {
    status: &'static str,
    database: &'static str,
    search: &'static str,
}

/// Health check endpoint.
///
/// Returns 200 if the service is running.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness check endpoint.
///
/// Returns 200 once both the layout store and the search backend answer.
#[utoipa::path(
    get,
    path = "/api/v1/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = ReadyResponse),
        (status = 503, description = "Service unavailable", body = ReadyResponse)
    )
)]
#[get("/ready")]
pub async fn ready(engine: web::Data<ReportEngine>, layouts: web::Data<LayoutService>) -> HttpResponse {
    let ctx = RequestContext::new("readiness");
    let database = match layouts.store().ping().await {
        Ok(()) => "connected",
        Err(e) => {
            warn!(error = %e, "Layout store not ready");
            "unavailable"
        }
    };
    let search = match engine.ping_backend(&ctx).await {
        Ok(()) => "connected",
        Err(e) => {
            warn!(error = %e, "Search backend not ready");
            "unavailable"
        }
    };

    let ready = database == "connected" && search == "connected";
    let body = ReadyResponse {
        status: if ready { "ready" } else { "not_ready" },
        database,
        search,
    };
    if ready {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}

/// Configure health routes.
pub fn configure_health_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health).service(ready);
}
