//! CI insights endpoints: controllers, integration probe and the run stream.

use actix_web::{HttpRequest, HttpResponse, web};
use futures_util::StreamExt;

use super::request_context;
use crate::error::{AppError, AppResult};
use crate::models::{
    CiControllerInfoRequest, CiInsightIntegrationRequest, CompletedRunsResponse,
    ControllersResponse, IntegrationResponse, ReportServiceRequest,
};
use crate::services::ReportEngine;

const NDJSON: &str = "application/x-ndjson";

/// CI controllers and orchestrators registered for the organization.
#[utoipa::path(
    post,
    path = "/api/v1/ci/controllers",
    tag = "CI Insights",
    request_body = CiControllerInfoRequest,
    responses(
        (status = 200, description = "Controllers sorted by name", body = ControllersResponse),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_controllers(
    req: HttpRequest,
    engine: web::Data<ReportEngine>,
    body: web::Json<CiControllerInfoRequest>,
) -> AppResult<HttpResponse> {
    let ctx = request_context(&req);
    let _guard = ctx.cancel.clone().drop_guard();
    let controllers = ctx.run(engine.controllers(&ctx, &body)).await?;
    Ok(HttpResponse::Ok().json(controllers))
}

/// Whether CI insight data exists for the organization.
#[utoipa::path(
    post,
    path = "/api/v1/ci/integration",
    tag = "CI Insights",
    request_body = CiInsightIntegrationRequest,
    responses(
        (status = 200, description = "Integration state", body = IntegrationResponse),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse)
    )
)]
pub async fn integration(
    req: HttpRequest,
    engine: web::Data<ReportEngine>,
    body: web::Json<CiInsightIntegrationRequest>,
) -> AppResult<HttpResponse> {
    let ctx = request_context(&req);
    let _guard = ctx.cancel.clone().drop_guard();
    let response = ctx.run(engine.integration(&ctx, &body)).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// Completed CI runs, newest first, one JSON page per line.
///
/// A failure after the first page is written as a final error line, since
/// the status code has already been sent.
#[utoipa::path(
    post,
    path = "/api/v1/ci/completed-runs/stream",
    tag = "CI Insights",
    request_body = ReportServiceRequest,
    responses(
        (status = 200, description = "NDJSON stream of pages", body = CompletedRunsResponse, content_type = "application/x-ndjson"),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse)
    )
)]
pub async fn stream_completed_runs(
    req: HttpRequest,
    engine: web::Data<ReportEngine>,
    body: web::Json<ReportServiceRequest>,
) -> AppResult<HttpResponse> {
    let ctx = request_context(&req);
    let guard = ctx.cancel.clone().drop_guard();
    let pages = ctx.run(engine.completed_runs(&ctx, &body)).await?;

    // The guard lives as long as the body, so a disconnect stops paging.
    let lines = pages.map(move |page| {
        let _ = &guard;
        ndjson_line(page)
    });
    Ok(HttpResponse::Ok().content_type(NDJSON).streaming(lines))
}

fn ndjson_line(
    page: AppResult<CompletedRunsResponse>,
) -> Result<web::Bytes, actix_web::Error> {
    let encoded = match page {
        Ok(page) => serde_json::to_vec(&page),
        Err(err) => {
            tracing::warn!(error = %err, "Completed-run stream ended with an error");
            serde_json::to_vec(&err.body())
        }
    };
    let mut line = encoded
        .map_err(|e| AppError::Internal(format!("failed to encode page: {}", e)))?;
    line.push(b'\n');
    Ok(web::Bytes::from(line))
}

/// Configure CI insights routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/ci/controllers").route(web::post().to(list_controllers)))
        .service(web::resource("/ci/integration").route(web::post().to(integration)))
        .service(
            web::resource("/ci/completed-runs/stream")
                .route(web::post().to(stream_completed_runs)),
        );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ndjson_line_for_page() {
        let line = ndjson_line(Ok(CompletedRunsResponse {
            page: 0,
            runs: Vec::new(),
            last: true,
        }))
        .unwrap();
        assert_eq!(&line[..], b"{\"page\":0,\"runs\":[],\"last\":true}\n");
    }

    #[test]
    fn test_ndjson_line_for_error() {
        let line = ndjson_line(Err(AppError::InvalidArgument("bad".into()))).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&line).unwrap();
        assert_eq!(value["error"], "INVALID_ARGUMENT");
        assert_eq!(value["message"], "bad");
    }
}
