//! Administrative raw-data and computed-data requests.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;

/// Index or fetch one document by id in a named alias.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct DataRequest {
    pub alias: String,
    pub id: String,
    /// Document body; required for updates, ignored for reads.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub data: Option<JsonValue>,
}

/// A stored document.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DataResponse {
    pub alias: String,
    pub id: String,
    pub found: bool,
    #[schema(value_type = Object)]
    pub data: Option<JsonValue>,
}

/// Store a precomputed widget or drilldown body.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ComputeUpdateRequest {
    pub org_id: String,
    /// Component id, or the sub-organization id for whole-org results.
    pub component_id: String,
    pub start_date: String,
    pub end_date: String,
    /// Query id of a widget slot or drilldown report id.
    pub metric_key: String,
    #[schema(value_type = Object)]
    pub data: JsonValue,
}

impl ComputeUpdateRequest {
    /// Document id in the compute alias.
    pub fn document_id(&self) -> String {
        compute_key(
            &self.org_id,
            &self.component_id,
            &self.start_date,
            &self.end_date,
            &self.metric_key,
        )
    }
}

/// Key of a precomputed document: `org_component_start_end_metric`.
pub fn compute_key(org_id: &str, component_id: &str, start: &str, end: &str, metric_key: &str) -> String {
    format!("{org_id}_{component_id}_{start}_{end}_{metric_key}")
}
