//! Peer-service collaborators: organizations, services, endpoints and RBAC.
//!
//! Each peer is consumed through a small trait so the engine can be built
//! against test doubles. [`HttpPeerClient`] implements all four over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PeerSettings;
use crate::error::{AppError, AppResult};
use crate::models::{Component, Endpoint, EndpointFilter};
use crate::services::context::RequestContext;

/// HTTP connect timeout for peer calls.
const PEER_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP total timeout for peer calls.
const PEER_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait OrganizationService: Send + Sync {
    /// `resource_id` followed by its ancestors up to the root.
    async fn parent_chain(&self, ctx: &RequestContext, resource_id: &str) -> AppResult<Vec<String>>;
}

#[async_trait]
pub trait ComponentService: Send + Sync {
    /// Components owned by an organization or sub-organization.
    async fn list_services(&self, ctx: &RequestContext, org_id: &str) -> AppResult<Vec<Component>>;
}

#[async_trait]
pub trait EndpointService: Send + Sync {
    async fn list_endpoints(
        &self,
        ctx: &RequestContext,
        filter: &EndpointFilter,
    ) -> AppResult<Vec<Endpoint>>;
}

#[async_trait]
pub trait AccessControl: Send + Sync {
    /// Whether `user_id` holds `permission` (or role) on `resource_id`.
    async fn authorize(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        resource_id: &str,
        permission: &str,
    ) -> AppResult<bool>;

    /// The subset of `component_ids` the user may see.
    async fn permitted_components(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        org_id: &str,
        component_ids: Vec<String>,
    ) -> AppResult<Vec<String>>;
}

#[derive(Deserialize)]
struct ParentsResponse {
    parents: Vec<String>,
}

#[derive(Deserialize)]
struct ServicesResponse {
    services: Vec<Component>,
}

#[derive(Deserialize)]
struct EndpointsResponse {
    endpoints: Vec<Endpoint>,
}

#[derive(Serialize)]
struct AuthorizeRequest<'a> {
    user_id: &'a str,
    resource_id: &'a str,
    permission: &'a str,
}

#[derive(Deserialize)]
struct AuthorizeResponse {
    allowed: bool,
}

#[derive(Serialize)]
struct FilterRequest<'a> {
    user_id: &'a str,
    resource_id: &'a str,
    resource_ids: &'a [String],
}

#[derive(Deserialize)]
struct FilterResponse {
    allowed: Vec<String>,
}

/// reqwest-backed adapter for every peer service.
#[derive(Clone)]
pub struct HttpPeerClient {
    settings: PeerSettings,
    http_client: reqwest::Client,
}

impl HttpPeerClient {
    pub fn new(settings: &PeerSettings) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(PEER_CONNECT_TIMEOUT)
            .timeout(PEER_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build peer HTTP client: {}", e)))?;

        Ok(Self {
            settings: settings.clone(),
            http_client,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        url: String,
    ) -> AppResult<T> {
        debug!(request_id = %ctx.request_id, url = %url, "Peer GET");
        ctx.run(async {
            let response = self
                .http_client
                .get(&url)
                .header(crate::config::REQUEST_ID_HEADER, &ctx.request_id)
                .send()
                .await?
                .error_for_status()?;
            Ok::<_, AppError>(response.json::<T>().await?)
        })
        .await
    }

    async fn post_json<B: Serialize + Sync, T: serde::de::DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        url: String,
        body: &B,
    ) -> AppResult<T> {
        debug!(request_id = %ctx.request_id, url = %url, "Peer POST");
        ctx.run(async {
            let response = self
                .http_client
                .post(&url)
                .header(crate::config::REQUEST_ID_HEADER, &ctx.request_id)
                .json(body)
                .send()
                .await?
                .error_for_status()?;
            Ok::<_, AppError>(response.json::<T>().await?)
        })
        .await
    }
}

fn join(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path)
}

/// Query string for an endpoint filter.
fn endpoint_query(filter: &EndpointFilter) -> String {
    let mut params: Vec<String> = filter
        .contribution_ids
        .iter()
        .map(|c| format!("contribution_id={}", urlencoding::encode(c)))
        .collect();
    if let Some(resource_id) = &filter.resource_id {
        params.push(format!("resource_id={}", urlencoding::encode(resource_id)));
    }
    if params.is_empty() {
        String::new()
    } else {
        format!("?{}", params.join("&"))
    }
}

#[async_trait]
impl OrganizationService for HttpPeerClient {
    async fn parent_chain(&self, ctx: &RequestContext, resource_id: &str) -> AppResult<Vec<String>> {
        let url = join(
            &self.settings.organizations_url,
            &format!("api/v1/organizations/{}/parents", urlencoding::encode(resource_id)),
        );
        let response: ParentsResponse = self.get_json(ctx, url).await?;
        let mut chain = vec![resource_id.to_string()];
        chain.extend(response.parents.into_iter().filter(|p| p != resource_id));
        Ok(chain)
    }
}

#[async_trait]
impl ComponentService for HttpPeerClient {
    async fn list_services(&self, ctx: &RequestContext, org_id: &str) -> AppResult<Vec<Component>> {
        let url = join(
            &self.settings.services_url,
            &format!("api/v1/organizations/{}/services", urlencoding::encode(org_id)),
        );
        let response: ServicesResponse = self.get_json(ctx, url).await?;
        Ok(response.services)
    }
}

#[async_trait]
impl EndpointService for HttpPeerClient {
    async fn list_endpoints(
        &self,
        ctx: &RequestContext,
        filter: &EndpointFilter,
    ) -> AppResult<Vec<Endpoint>> {
        let url = format!(
            "{}{}",
            join(&self.settings.endpoints_url, "api/v1/endpoints"),
            endpoint_query(filter)
        );
        let response: EndpointsResponse = self.get_json(ctx, url).await?;
        Ok(response.endpoints)
    }
}

#[async_trait]
impl AccessControl for HttpPeerClient {
    async fn authorize(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        resource_id: &str,
        permission: &str,
    ) -> AppResult<bool> {
        let url = join(&self.settings.rbac_url, "api/v1/authorize");
        let body = AuthorizeRequest {
            user_id,
            resource_id,
            permission,
        };
        let response: AuthorizeResponse = self.post_json(ctx, url, &body).await?;
        Ok(response.allowed)
    }

    async fn permitted_components(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        org_id: &str,
        component_ids: Vec<String>,
    ) -> AppResult<Vec<String>> {
        if component_ids.is_empty() {
            return Ok(component_ids);
        }
        let url = join(&self.settings.rbac_url, "api/v1/authorize/filter");
        let body = FilterRequest {
            user_id,
            resource_id: org_id,
            resource_ids: &component_ids,
        };
        let response: FilterResponse = self.post_json(ctx, url, &body).await?;
        Ok(component_ids
            .into_iter()
            .filter(|id| response.allowed.contains(id))
            .collect())
    }
}
