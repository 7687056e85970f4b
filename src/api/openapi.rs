//! OpenAPI documentation configuration.

use utoipa::OpenApi;

use crate::config::ADMIN_KEY_HEADER;
use crate::{api, error, models};

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Insights Report Server",
        version = "0.1.0",
        description = "Dashboard widget reports, drilldowns and CI insights built from DevOps search indices"
    ),
    servers(
        (url = "/", description = "Local server")
    ),
    paths(
        // Health endpoints
        api::health::health,
        api::health::ready,
        // Report endpoints
        api::reports::build_report,
        api::reports::build_drilldown,
        api::reports::build_computed_report,
        api::reports::build_computed_drilldown,
        api::reports::report_layout,
        api::reports::component_comparison,
        // Dashboard endpoints
        api::dashboards::get_layout,
        api::dashboards::update_layout,
        api::dashboards::list_widgets,
        api::dashboards::transition_config,
        // Environment endpoints
        api::environments::list_environments,
        api::environments::list_environments_v2,
        // CI insights endpoints
        api::ci::list_controllers,
        api::ci::integration,
        api::ci::stream_completed_runs,
        // Admin endpoints
        api::admin::put_raw_data,
        api::admin::get_raw_data,
        api::admin::put_compute_data,
    ),
    components(
        schemas(
            // Common
            error::ErrorResponse,
            // Health
            api::health::HealthResponse,
            api::health::ReadyResponse,
            // Reports
            models::DurationType,
            models::TimeFormat,
            models::ReportRequest,
            models::DrilldownRequest,
            models::ReportLayoutRequest,
            models::ComponentComparisonRequest,
            models::ReportStatus,
            models::ChartType,
            models::DrillDown,
            models::ReportNode,
            models::ReportContent,
            models::ReportDocument,
            models::DrilldownResponse,
            models::SlotOutline,
            models::WidgetOutline,
            models::ReportLayoutResponse,
            models::ComponentComparisonRow,
            models::ComponentComparisonResponse,
            // Dashboards
            models::Dashboard,
            models::WidgetLayout,
            models::DashboardLayoutRequest,
            models::DashboardLayout,
            models::ManageWidgetRequest,
            models::WidgetSummary,
            models::WidgetsResponse,
            models::TransitionConfig,
            models::Ack,
            // Environments and CI
            models::EnvironmentRequest,
            models::EnvironmentSummary,
            models::Environments,
            models::CiControllerInfoRequest,
            models::ControllerInfo,
            models::ControllersResponse,
            models::CiInsightIntegrationRequest,
            models::IntegrationResponse,
            models::ReportServiceRequest,
            models::CompletedRun,
            models::CompletedRunsResponse,
            // Admin
            models::DataRequest,
            models::DataResponse,
            models::ComputeUpdateRequest,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Reports", description = "Widget reports, drilldowns and comparisons"),
        (name = "Dashboards", description = "Dashboard layouts and widget listings"),
        (name = "Environments", description = "Deployment environments"),
        (name = "CI Insights", description = "CI controllers, integration state and completed runs"),
        (name = "Admin", description = "Raw and precomputed document administration")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Add admin key security scheme.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "admin_key",
                utoipa::openapi::security::SecurityScheme::ApiKey(
                    utoipa::openapi::security::ApiKey::Header(
                        utoipa::openapi::security::ApiKeyValue::new(ADMIN_KEY_HEADER),
                    ),
                ),
            );
        }
    }
}
