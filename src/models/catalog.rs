//! Component and endpoint catalog models returned by peer services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// Endpoint contribution ids this service cares about.
pub mod contribution {
    pub const CBCI_CONTROLLER: &str = "cb.platform.cbci-controller";
    pub const CJOC: &str = "cb.platform.cjoc";
    pub const JENKINS: &str = "cb.platform.jenkins";
    pub const JAAS: &str = "cb.platform.jaas";
    pub const PLATFORM_ENVIRONMENT: &str = "cb.configuration.basic-environment";

    /// Contribution ids of CI tools (controllers and orchestrators).
    pub const CI_TOOLS: [&str; 4] = [CBCI_CONTROLLER, CJOC, JENKINS, JAAS];

    /// Human-readable tool type for a CI contribution id.
    pub fn ci_tool_type(contribution_id: &str) -> &'static str {
        match contribution_id {
            CBCI_CONTROLLER => "CloudBees CI controller",
            CJOC => "CloudBees CI operations center",
            JENKINS => "Jenkins",
            JAAS => "Jenkins as a service",
            _ => "Unknown",
        }
    }
}

/// A versioned software asset owned by an organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Component {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub repository_url: Option<String>,
    pub org_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_org_id: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

/// Endpoint connection properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EndpointProperties {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub other: BTreeMap<String, JsonValue>,
}

/// Endpoint audit information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EndpointAudit {
    #[serde(default)]
    pub when: Option<DateTime<Utc>>,
}

/// A configured external integration owned by a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Endpoint {
    pub id: String,
    pub contribution_id: String,
    pub name: String,
    pub resource_id: String,
    #[serde(default)]
    pub properties: EndpointProperties,
    #[serde(default)]
    pub audit: EndpointAudit,
}

/// Endpoint lookup filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointFilter {
    /// Only endpoints owned by this resource (organization).
    pub resource_id: Option<String>,
    /// Only endpoints of these contribution ids (empty means any).
    pub contribution_ids: Vec<String>,
}

impl EndpointFilter {
    pub fn contributions(ids: &[&str]) -> Self {
        EndpointFilter {
            resource_id: None,
            contribution_ids: ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn matches(&self, endpoint: &Endpoint) -> bool {
        let resource_ok = self
            .resource_id
            .as_deref()
            .is_none_or(|r| r == endpoint.resource_id);
        let contribution_ok = self.contribution_ids.is_empty()
            || self
                .contribution_ids
                .iter()
                .any(|c| c == &endpoint.contribution_id);
        resource_ok && contribution_ok
    }
}

/// Environment listing request.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct EnvironmentRequest {
    pub org_id: String,
    /// Case-insensitive substring filter (v2 only).
    #[serde(default)]
    pub name: Option<String>,
}

/// A deployment environment.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EnvironmentSummary {
    pub id: String,
    pub name: String,
    pub resource_id: String,
}

/// Environment listing response.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Environments {
    pub environments: Vec<EnvironmentSummary>,
}

/// CI controller listing request.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CiControllerInfoRequest {
    pub org_id: String,
}

/// A CI controller or orchestrator endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ControllerInfo {
    pub id: String,
    pub name: String,
    pub tool_type: String,
    pub url: Option<String>,
    pub status: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// CI controller listing response.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ControllersResponse {
    pub controllers: Vec<ControllerInfo>,
}

/// CI insights integration probe request.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CiInsightIntegrationRequest {
    pub org_id: String,
    #[serde(default)]
    pub ci_tool_id: Option<String>,
}

/// Whether CI insight data has been ingested for an organization.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IntegrationResponse {
    pub is_integrated: bool,
    pub ci_tools: Vec<ControllerInfo>,
}
