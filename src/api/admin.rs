//! Raw-data and computed-data administration. All routes require the admin key.

use actix_web::{HttpRequest, HttpResponse, web};

use super::request_context;
use crate::auth::AdminAuth;
use crate::error::AppResult;
use crate::models::{Ack, ComputeUpdateRequest, DataRequest, DataResponse};
use crate::services::ReportEngine;

/// Index a document into an alias under a fixed id.
#[utoipa::path(
    put,
    path = "/api/v1/admin/raw-data",
    tag = "Admin",
    request_body = DataRequest,
    responses(
        (status = 200, description = "Document stored", body = Ack),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or wrong admin key", body = crate::error::ErrorResponse)
    ),
    security(("admin_key" = []))
)]
pub async fn put_raw_data(
    _auth: AdminAuth,
    req: HttpRequest,
    engine: web::Data<ReportEngine>,
    body: web::Json<DataRequest>,
) -> AppResult<HttpResponse> {
    let ctx = request_context(&req);
    let _guard = ctx.cancel.clone().drop_guard();
    let ack = ctx.run(engine.put_raw_data(&ctx, &body)).await?;
    Ok(HttpResponse::Ok().json(ack))
}

/// Fetch a document by alias and id.
#[utoipa::path(
    post,
    path = "/api/v1/admin/raw-data/get",
    tag = "Admin",
    request_body = DataRequest,
    responses(
        (status = 200, description = "Stored document", body = DataResponse),
        (status = 401, description = "Missing or wrong admin key", body = crate::error::ErrorResponse)
    ),
    security(("admin_key" = []))
)]
pub async fn get_raw_data(
    _auth: AdminAuth,
    req: HttpRequest,
    engine: web::Data<ReportEngine>,
    body: web::Json<DataRequest>,
) -> AppResult<HttpResponse> {
    let ctx = request_context(&req);
    let _guard = ctx.cancel.clone().drop_guard();
    let response = ctx.run(engine.get_raw_data(&ctx, &body)).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// Store a precomputed widget slot or drilldown result.
#[utoipa::path(
    put,
    path = "/api/v1/admin/compute-data",
    tag = "Admin",
    request_body = ComputeUpdateRequest,
    responses(
        (status = 200, description = "Computed document stored", body = Ack),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or wrong admin key", body = crate::error::ErrorResponse)
    ),
    security(("admin_key" = []))
)]
pub async fn put_compute_data(
    _auth: AdminAuth,
    req: HttpRequest,
    engine: web::Data<ReportEngine>,
    body: web::Json<ComputeUpdateRequest>,
) -> AppResult<HttpResponse> {
    let ctx = request_context(&req);
    let _guard = ctx.cancel.clone().drop_guard();
    let ack = ctx.run(engine.put_compute_data(&ctx, &body)).await?;
    Ok(HttpResponse::Ok().json(ack))
}

/// Configure admin routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/admin/raw-data").route(web::put().to(put_raw_data)))
        .service(web::resource("/admin/raw-data/get").route(web::post().to(get_raw_data)))
        .service(web::resource("/admin/compute-data").route(web::put().to(put_compute_data)));
}
