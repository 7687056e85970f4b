//! Domain models for the insights report service.

pub mod admin;
pub mod catalog;
pub mod ci_runs;
pub mod dashboard;
pub mod definition;
pub mod lenient;
pub mod records;
pub mod report;
pub mod request;

// Re-export commonly used types
pub use admin::{ComputeUpdateRequest, DataRequest, DataResponse, compute_key};
pub use catalog::{
    CiControllerInfoRequest, CiInsightIntegrationRequest, Component, ControllerInfo,
    ControllersResponse, Endpoint, EndpointFilter, EnvironmentRequest, EnvironmentSummary,
    Environments, IntegrationResponse,
};
pub use ci_runs::{CompletedRunsResponse, ReportServiceRequest};
pub use dashboard::{
    Ack, Dashboard, DashboardLayout, DashboardLayoutRequest, ManageWidgetRequest,
    TransitionConfig, WidgetLayout, WidgetSummary, WidgetsResponse,
};
pub use definition::{
    ChartSpec, ChartType, DrilldownDefinition, LayoutSize, MetricSpec, QueryLeg, QueryTemplate,
    WidgetSpec, WidgetTransform,
};
pub use records::CompletedRun;
pub use report::{
    ComponentComparisonResponse, ComponentComparisonRow, DrillDown, DrilldownResponse,
    ReportContent, ReportDocument, ReportLayoutResponse, ReportNode, ReportStatus, SlotOutline,
    WidgetOutline,
};
pub use request::{
    ALL_COMPONENTS, ComponentComparisonRequest, DrilldownRequest, DurationType, ReportInfo,
    ReportLayoutRequest, ReportRequest, TimeFormat,
};
