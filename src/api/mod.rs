//! API endpoint modules.

pub mod admin;
pub mod ci;
pub mod dashboards;
pub mod environments;
pub mod health;
pub mod openapi;
pub mod reports;

use std::time::Duration;

use actix_web::{HttpMessage, HttpRequest};

use crate::config::REQUEST_TIMEOUT_HEADER;
use crate::middleware::RequestId;
use crate::services::RequestContext;

pub use admin::configure_routes as configure_admin_routes;
pub use ci::configure_routes as configure_ci_routes;
pub use dashboards::configure_routes as configure_dashboard_routes;
pub use environments::configure_routes as configure_environment_routes;
pub use health::configure_health_routes;
pub use openapi::ApiDoc;
pub use reports::configure_routes as configure_report_routes;

/// Context for one inbound request: its id and the caller's deadline.
///
/// Handlers hold `ctx.cancel.clone().drop_guard()` so outbound calls stop
/// when actix drops the handler future on client disconnect.
pub fn request_context(req: &HttpRequest) -> RequestContext {
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_else(|| uuid::Uuid::now_v7().to_string());
    let ctx = RequestContext::new(request_id);
    match req
        .headers()
        .get(REQUEST_TIMEOUT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
    {
        Some(ms) => ctx.with_timeout(Duration::from_millis(ms)),
        None => ctx,
    }
}
