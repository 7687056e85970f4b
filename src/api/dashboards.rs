//! Dashboard layout, widget listing and transition endpoints.

use actix_web::{HttpRequest, HttpResponse, web};

use super::request_context;
use crate::error::{AppError, AppResult};
use crate::models::{
    Ack, Dashboard, DashboardLayout, DashboardLayoutRequest, ManageWidgetRequest,
    TransitionConfig, WidgetsResponse,
};
use crate::services::{LayoutService, ReportEngine};

/// The user's saved layout, or the dashboard default.
#[utoipa::path(
    post,
    path = "/api/v1/dashboards/layout/get",
    tag = "Dashboards",
    request_body = DashboardLayoutRequest,
    responses(
        (status = 200, description = "Dashboard layout", body = DashboardLayout),
        (status = 404, description = "Unknown dashboard", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_layout(
    layouts: web::Data<LayoutService>,
    body: web::Json<DashboardLayoutRequest>,
) -> AppResult<HttpResponse> {
    let layout = layouts.get(&body).await?;
    Ok(HttpResponse::Ok().json(layout))
}

/// Replace the user's layout for a dashboard.
#[utoipa::path(
    put,
    path = "/api/v1/dashboards/layout",
    tag = "Dashboards",
    request_body = DashboardLayoutRequest,
    responses(
        (status = 200, description = "Layout stored", body = Ack),
        (status = 400, description = "Invalid layout", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown dashboard", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_layout(
    layouts: web::Data<LayoutService>,
    body: web::Json<DashboardLayoutRequest>,
) -> AppResult<HttpResponse> {
    layouts.update(&body).await?;
    Ok(HttpResponse::Ok().json(Ack { ok: true }))
}

/// Widgets of a dashboard the caller may see.
#[utoipa::path(
    post,
    path = "/api/v1/dashboards/widgets",
    tag = "Dashboards",
    request_body = ManageWidgetRequest,
    responses(
        (status = 200, description = "Widget listing", body = WidgetsResponse),
        (status = 404, description = "Unknown dashboard", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_widgets(
    req: HttpRequest,
    engine: web::Data<ReportEngine>,
    body: web::Json<ManageWidgetRequest>,
) -> AppResult<HttpResponse> {
    let ctx = request_context(&req);
    let _guard = ctx.cancel.clone().drop_guard();
    let widgets = ctx.run(engine.get_widgets(&ctx, &body)).await?;
    Ok(HttpResponse::Ok().json(widgets))
}

/// Drilldown transitions for the CI, security or test insights dashboard.
#[utoipa::path(
    post,
    path = "/api/v1/dashboards/{kind}/transition-config",
    tag = "Dashboards",
    params(
        ("kind" = String, Path, description = "One of `ci`, `si`, `test-insights`")
    ),
    responses(
        (status = 200, description = "Widget to drilldown transitions", body = TransitionConfig),
        (status = 404, description = "Unknown dashboard", body = crate::error::ErrorResponse)
    )
)]
pub async fn transition_config(
    engine: web::Data<ReportEngine>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let dashboard = transition_dashboard(&path)?;
    Ok(HttpResponse::Ok().json(engine.transition_config(dashboard)))
}

fn transition_dashboard(kind: &str) -> AppResult<Dashboard> {
    match kind {
        "ci" => Ok(Dashboard::CiInsights),
        "si" => Ok(Dashboard::SecurityInsights),
        "test-insights" => Ok(Dashboard::TestInsights),
        other => Err(AppError::NotFound(format!("Transition config '{}'", other))),
    }
}

/// Configure dashboard routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/dashboards/layout/get").route(web::post().to(get_layout)))
        .service(web::resource("/dashboards/layout").route(web::put().to(update_layout)))
        .service(web::resource("/dashboards/widgets").route(web::post().to(list_widgets)))
        .service(
            web::resource("/dashboards/{kind}/transition-config")
                .route(web::post().to(transition_config)),
        );
}
