//! Deployment environment listings.

use actix_web::{HttpRequest, HttpResponse, web};

use super::request_context;
use crate::error::AppResult;
use crate::models::{EnvironmentRequest, Environments};
use crate::services::ReportEngine;

/// Environments owned by the organization and its ancestors.
#[utoipa::path(
    post,
    path = "/api/v1/environments",
    tag = "Environments",
    request_body = EnvironmentRequest,
    responses(
        (status = 200, description = "Environments sorted by name", body = Environments),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_environments(
    req: HttpRequest,
    engine: web::Data<ReportEngine>,
    body: web::Json<EnvironmentRequest>,
) -> AppResult<HttpResponse> {
    let ctx = request_context(&req);
    let _guard = ctx.cancel.clone().drop_guard();
    let environments = ctx.run(engine.environments(&ctx, &body, false)).await?;
    Ok(HttpResponse::Ok().json(environments))
}

/// Same listing, narrowed by a case-insensitive name filter.
#[utoipa::path(
    post,
    path = "/api/v1/environments/v2",
    tag = "Environments",
    request_body = EnvironmentRequest,
    responses(
        (status = 200, description = "Matching environments sorted by name", body = Environments),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_environments_v2(
    req: HttpRequest,
    engine: web::Data<ReportEngine>,
    body: web::Json<EnvironmentRequest>,
) -> AppResult<HttpResponse> {
    let ctx = request_context(&req);
    let _guard = ctx.cancel.clone().drop_guard();
    let environments = ctx.run(engine.environments(&ctx, &body, true)).await?;
    Ok(HttpResponse::Ok().json(environments))
}

/// Configure environment routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/environments").route(web::post().to(list_environments)))
        .service(web::resource("/environments/v2").route(web::post().to(list_environments_v2)));
}
