//! Widget report, drilldown and comparison endpoints.

use actix_web::{HttpRequest, HttpResponse, web};

use super::request_context;
use crate::error::AppResult;
use crate::models::{
    ComponentComparisonRequest, ComponentComparisonResponse, DrilldownRequest, DrilldownResponse,
    ReportDocument, ReportLayoutRequest, ReportLayoutResponse, ReportRequest,
};
use crate::services::{LayoutService, ReportEngine};

/// Build one widget report from live search data.
///
/// Widgets whose data could not be loaded come back with status `no-data`
/// instead of failing the whole request.
#[utoipa::path(
    post,
    path = "/api/v1/reports",
    tag = "Reports",
    request_body = ReportRequest,
    responses(
        (status = 200, description = "Widget report", body = ReportDocument),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse),
        (status = 403, description = "Access denied", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown widget", body = crate::error::ErrorResponse)
    )
)]
pub async fn build_report(
    req: HttpRequest,
    engine: web::Data<ReportEngine>,
    body: web::Json<ReportRequest>,
) -> AppResult<HttpResponse> {
    let ctx = request_context(&req);
    let _guard = ctx.cancel.clone().drop_guard();
    let document = ctx.run(engine.build_report(&ctx, &body)).await?;
    Ok(HttpResponse::Ok().json(document))
}

/// Row-level detail behind a widget.
#[utoipa::path(
    post,
    path = "/api/v1/reports/drilldown",
    tag = "Reports",
    request_body = DrilldownRequest,
    responses(
        (status = 200, description = "Drilldown rows", body = DrilldownResponse),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse),
        (status = 403, description = "Access denied", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown drilldown", body = crate::error::ErrorResponse)
    )
)]
pub async fn build_drilldown(
    req: HttpRequest,
    engine: web::Data<ReportEngine>,
    body: web::Json<DrilldownRequest>,
) -> AppResult<HttpResponse> {
    let ctx = request_context(&req);
    let _guard = ctx.cancel.clone().drop_guard();
    let response = ctx.run(engine.build_drilldown(&ctx, &body)).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// Widget report served from precomputed documents.
#[utoipa::path(
    post,
    path = "/api/v1/reports/computed",
    tag = "Reports",
    request_body = ReportRequest,
    responses(
        (status = 200, description = "Widget report", body = ReportDocument),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown widget", body = crate::error::ErrorResponse)
    )
)]
pub async fn build_computed_report(
    req: HttpRequest,
    engine: web::Data<ReportEngine>,
    body: web::Json<ReportRequest>,
) -> AppResult<HttpResponse> {
    let ctx = request_context(&req);
    let _guard = ctx.cancel.clone().drop_guard();
    let document = ctx.run(engine.build_computed_report(&ctx, &body)).await?;
    Ok(HttpResponse::Ok().json(document))
}

/// Drilldown rows served from precomputed documents.
#[utoipa::path(
    post,
    path = "/api/v1/reports/computed/drilldown",
    tag = "Reports",
    request_body = DrilldownRequest,
    responses(
        (status = 200, description = "Drilldown rows", body = DrilldownResponse),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse)
    )
)]
pub async fn build_computed_drilldown(
    req: HttpRequest,
    engine: web::Data<ReportEngine>,
    body: web::Json<DrilldownRequest>,
) -> AppResult<HttpResponse> {
    let ctx = request_context(&req);
    let _guard = ctx.cancel.clone().drop_guard();
    let response = ctx.run(engine.build_computed_drilldown(&ctx, &body)).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// Widget skeletons of a dashboard, without data.
#[utoipa::path(
    post,
    path = "/api/v1/reports/layout",
    tag = "Reports",
    request_body = ReportLayoutRequest,
    responses(
        (status = 200, description = "Widget outlines", body = ReportLayoutResponse),
        (status = 404, description = "Unknown dashboard", body = crate::error::ErrorResponse)
    )
)]
pub async fn report_layout(
    layouts: web::Data<LayoutService>,
    body: web::Json<ReportLayoutRequest>,
) -> AppResult<HttpResponse> {
    let response = layouts.report_layout(&body.dashboard_id)?;
    Ok(HttpResponse::Ok().json(response))
}

/// Scalar metrics side by side for every component in scope.
#[utoipa::path(
    post,
    path = "/api/v1/reports/component-comparison",
    tag = "Reports",
    request_body = ComponentComparisonRequest,
    responses(
        (status = 200, description = "Comparison rows", body = ComponentComparisonResponse),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse)
    )
)]
pub async fn component_comparison(
    req: HttpRequest,
    engine: web::Data<ReportEngine>,
    body: web::Json<ComponentComparisonRequest>,
) -> AppResult<HttpResponse> {
    let ctx = request_context(&req);
    let _guard = ctx.cancel.clone().drop_guard();
    let response = ctx.run(engine.component_comparison(&ctx, &body)).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// Configure report routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/reports").route(web::post().to(build_report)))
        .service(web::resource("/reports/drilldown").route(web::post().to(build_drilldown)))
        .service(web::resource("/reports/computed").route(web::post().to(build_computed_report)))
        .service(
            web::resource("/reports/computed/drilldown")
                .route(web::post().to(build_computed_drilldown)),
        )
        .service(web::resource("/reports/layout").route(web::post().to(report_layout)))
        .service(
            web::resource("/reports/component-comparison")
                .route(web::post().to(component_comparison)),
        );
}
