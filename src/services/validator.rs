//! Inbound request validation.
//!
//! Checks run in a fixed order and stop at the first failure: identifiers,
//! sub-organization membership, component membership, ci tool ownership,
//! then the time window. Every failure is an `InvalidArgument`.

use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::models::catalog::contribution;
use crate::models::{ALL_COMPONENTS, DurationType, EndpointFilter, ReportRequest, TimeFormat};
use crate::services::catalog::Catalog;
use crate::services::context::RequestContext;
use crate::services::duration::{explicit_window, parse_time_zone};

pub struct RequestValidator {
    catalog: Arc<Catalog>,
}

impl RequestValidator {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    /// Validate a report request addressed to `target` (a widget or report id).
    pub async fn validate(
        &self,
        ctx: &RequestContext,
        target_field: &str,
        target: &str,
        request: &ReportRequest,
    ) -> AppResult<()> {
        if target.trim().is_empty() {
            return Err(AppError::InvalidArgument(format!("{} is required", target_field)));
        }
        self.validate_scope(ctx, request).await
    }

    /// Organization, component, ci tool and window checks.
    pub async fn validate_scope(&self, ctx: &RequestContext, request: &ReportRequest) -> AppResult<()> {
        if request.org_id.trim().is_empty() {
            return Err(AppError::InvalidArgument("org_id is required".to_string()));
        }
        let org_id = request.org_id.as_str();
        let sub_org_id = request.effective_sub_org();

        if sub_org_id != org_id {
            let chain = self.catalog.parent_chain(ctx, sub_org_id).await?;
            if !chain.iter().any(|id| id == org_id) {
                return Err(AppError::InvalidArgument(format!(
                    "sub organization {} does not belong to the organization {}",
                    sub_org_id, org_id
                )));
            }
        }

        if let Some(ids) = &request.component_list {
            let explicit: Vec<&String> = ids
                .iter()
                .filter(|id| id.as_str() != ALL_COMPONENTS && id.as_str() != sub_org_id)
                .collect();
            if !explicit.is_empty() && !ids.iter().any(|id| id == ALL_COMPONENTS) {
                let known = self.catalog.list_services(ctx, sub_org_id).await?;
                if let Some(missing) = explicit
                    .iter()
                    .find(|id| !known.iter().any(|c| &c.id == **id))
                {
                    return Err(AppError::InvalidArgument(format!(
                        "component {} does not belong to the organization {}",
                        missing, sub_org_id
                    )));
                }
            }
        }

        if let Some(ci_tool_id) = request.ci_tool_id.as_deref().filter(|s| !s.is_empty()) {
            self.validate_ci_tool(ctx, org_id, ci_tool_id).await?;
        }

        if let Some(format) = request.time_format.as_deref()
            && TimeFormat::parse(format).is_none()
        {
            return Err(AppError::InvalidArgument(format!(
                "unsupported time_format {}",
                format
            )));
        }

        validate_window(
            request.duration_type,
            request.start_date.as_deref(),
            request.end_date.as_deref(),
            request.time_zone.as_deref(),
        )
    }

    async fn validate_ci_tool(&self, ctx: &RequestContext, org_id: &str, ci_tool_id: &str) -> AppResult<()> {
        let chain = self.catalog.parent_chain(ctx, org_id).await?;
        let tools = self
            .catalog
            .list_endpoints(ctx, &EndpointFilter::contributions(&contribution::CI_TOOLS))
            .await?;
        let owned = tools
            .iter()
            .find(|e| e.id == ci_tool_id)
            .is_some_and(|e| chain.contains(&e.resource_id));
        if owned {
            Ok(())
        } else {
            Err(AppError::InvalidArgument(format!(
                "ci tool {} does not belong to the organization",
                ci_tool_id
            )))
        }
    }
}

/// Date checks for custom ranges and unknown types.
pub fn validate_window(
    duration_type: DurationType,
    start_date: Option<&str>,
    end_date: Option<&str>,
    time_zone: Option<&str>,
) -> AppResult<()> {
    let tz = parse_time_zone(time_zone)?;
    if duration_type.is_symbolic() {
        return Ok(());
    }
    explicit_window(duration_type, start_date, end_date, &tz).map(|_| ())
}
