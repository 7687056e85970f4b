//! Aggregation decoding and canonical joins.
//!
//! Every aggregation the templates declare comes back under
//! `aggregations.<name>` in one of three shapes: a scripted `value` that is a
//! map or a list, a `buckets` array, or a numeric `value`. The decoder picks
//! the variant by inspecting the node and never hands raw trees to the
//! transforms.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::Component;
use crate::models::records::ComponentScanners;
use crate::models::lenient::{value_as_f64, value_as_string};
use crate::services::search::SearchEnvelope;
use crate::services::transform::format::scanner_display_name;

/// Scanner assumed for every component that produced a raw scan.
pub const RAW_SCAN_SCANNER: &str = "sonarqube";

/// One bucket of a bucketed aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub key: String,
    pub doc_count: u64,
    /// Sub-aggregations keyed by name.
    pub sub: Map<String, JsonValue>,
}

impl Bucket {
    fn from_value(value: JsonValue) -> AppResult<Self> {
        let JsonValue::Object(mut fields) = value else {
            return Err(AppError::BackendDecode("bucket is not an object".to_string()));
        };
        let key = fields
            .remove("key_as_string")
            .as_ref()
            .and_then(value_as_string)
            .or_else(|| fields.get("key").and_then(value_as_string))
            .ok_or_else(|| AppError::BackendDecode("bucket without key".to_string()))?;
        fields.remove("key");
        let doc_count = fields
            .remove("doc_count")
            .as_ref()
            .and_then(value_as_f64)
            .map(|n| n.max(0.0) as u64)
            .unwrap_or(0);
        Ok(Self {
            key,
            doc_count,
            sub: fields,
        })
    }

    /// Documents of a `top_hits`-style sub-aggregation.
    ///
    /// Accepts `{hits: [...]}` and `{hits: {hits: [{_source: ...}]}}`.
    pub fn hits<T: DeserializeOwned>(&self, name: &str) -> AppResult<Vec<T>> {
        let Some(node) = self.sub.get(name) else {
            return Ok(Vec::new());
        };
        let items = match node.get("hits") {
            Some(JsonValue::Array(items)) => items.clone(),
            Some(JsonValue::Object(inner)) => match inner.get("hits") {
                Some(JsonValue::Array(items)) => items
                    .iter()
                    .map(|hit| hit.get("_source").cloned().unwrap_or_else(|| hit.clone()))
                    .collect(),
                _ => Vec::new(),
            },
            _ => {
                return Err(AppError::BackendDecode(format!(
                    "sub-aggregation '{}' of bucket '{}' has no hits",
                    name, self.key
                )));
            }
        };
        items
            .into_iter()
            .map(|item| {
                serde_json::from_value(item).map_err(|e| {
                    AppError::BackendDecode(format!("bucket '{}' hit: {}", self.key, e))
                })
            })
            .collect()
    }

    /// Numeric sub-aggregation (`{value: n}` or `{doc_count: n}`).
    pub fn metric(&self, name: &str) -> Option<f64> {
        let node = self.sub.get(name)?;
        node.get("value")
            .or_else(|| node.get("doc_count"))
            .and_then(value_as_f64)
    }
}

/// A decoded aggregation.
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregation {
    Map(Map<String, JsonValue>),
    List(Vec<JsonValue>),
    Buckets(Vec<Bucket>),
    Scalar(f64),
    /// Present but empty: reported as no-data, never as an error.
    Empty,
}

impl Aggregation {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Map-valued entries decoded into `T`, in key order.
    pub fn into_map<T: DeserializeOwned>(self) -> AppResult<Vec<(String, T)>> {
        match self {
            Self::Empty => Ok(Vec::new()),
            Self::Map(entries) => entries
                .into_iter()
                .map(|(key, value)| {
                    serde_json::from_value(value)
                        .map(|record| (key.clone(), record))
                        .map_err(|e| AppError::BackendDecode(format!("entry '{}': {}", key, e)))
                })
                .collect(),
            other => Err(shape_error("map", &other)),
        }
    }

    /// List-valued entries decoded into `T`.
    pub fn into_list<T: DeserializeOwned>(self) -> AppResult<Vec<T>> {
        match self {
            Self::Empty => Ok(Vec::new()),
            Self::List(items) => items
                .into_iter()
                .enumerate()
                .map(|(idx, value)| {
                    serde_json::from_value(value)
                        .map_err(|e| AppError::BackendDecode(format!("item {}: {}", idx, e)))
                })
                .collect(),
            other => Err(shape_error("list", &other)),
        }
    }

    pub fn into_buckets(self) -> AppResult<Vec<Bucket>> {
        match self {
            Self::Empty => Ok(Vec::new()),
            Self::Buckets(buckets) => Ok(buckets),
            other => Err(shape_error("buckets", &other)),
        }
    }

    /// Numeric value; `None` when empty.
    pub fn into_scalar(self) -> AppResult<Option<f64>> {
        match self {
            Self::Empty => Ok(None),
            Self::Scalar(n) => Ok(Some(n)),
            other => Err(shape_error("scalar", &other)),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Map(_) => "map",
            Self::List(_) => "list",
            Self::Buckets(_) => "buckets",
            Self::Scalar(_) => "scalar",
            Self::Empty => "empty",
        }
    }
}

fn shape_error(expected: &str, got: &Aggregation) -> AppError {
    AppError::BackendDecode(format!(
        "expected {} aggregation, got {}",
        expected,
        got.kind()
    ))
}

/// Decode `aggregations.<name>` from an envelope.
///
/// A missing `aggregations` container, or one holding other keys but not
/// `name`, is a decode error. An empty container is [`Aggregation::Empty`].
pub fn decode(envelope: &SearchEnvelope, name: &str) -> AppResult<Aggregation> {
    let Some(container) = envelope.aggregations.as_ref() else {
        return Err(AppError::BackendDecode(
            "response has no aggregations".to_string(),
        ));
    };
    let JsonValue::Object(container) = container else {
        return Err(AppError::BackendDecode(
            "aggregations is not an object".to_string(),
        ));
    };
    if container.is_empty() {
        return Ok(Aggregation::Empty);
    }
    let Some(node) = container.get(name) else {
        let keys: Vec<&str> = container.keys().map(String::as_str).collect();
        return Err(AppError::BackendDecode(format!(
            "aggregation '{}' not found (got: {})",
            name,
            keys.join(", ")
        )));
    };
    decode_node(name, node)
}

fn decode_node(name: &str, node: &JsonValue) -> AppResult<Aggregation> {
    if let Some(value) = node.get("value") {
        return Ok(match value {
            JsonValue::Null => Aggregation::Empty,
            JsonValue::Object(map) if map.is_empty() => Aggregation::Empty,
            JsonValue::Object(map) => Aggregation::Map(map.clone()),
            JsonValue::Array(items) if items.is_empty() => Aggregation::Empty,
            JsonValue::Array(items) => Aggregation::List(items.clone()),
            other => match value_as_f64(other) {
                Some(n) => Aggregation::Scalar(n),
                None => {
                    return Err(AppError::BackendDecode(format!(
                        "aggregation '{}' has a non-numeric scalar value",
                        name
                    )));
                }
            },
        });
    }
    if let Some(buckets) = node.get("buckets") {
        let JsonValue::Array(items) = buckets else {
            return Err(AppError::BackendDecode(format!(
                "aggregation '{}' buckets is not an array",
                name
            )));
        };
        if items.is_empty() {
            return Ok(Aggregation::Empty);
        }
        return items
            .iter()
            .cloned()
            .map(Bucket::from_value)
            .collect::<AppResult<Vec<_>>>()
            .map(Aggregation::Buckets);
    }
    Err(AppError::BackendDecode(format!(
        "aggregation '{}' has neither value nor buckets",
        name
    )))
}

/// Keep the first record per key, dropping later duplicates.
pub fn first_seen<T, K, F>(items: Vec<T>, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(items.len());
    let mut dropped = 0usize;
    for item in items {
        if seen.insert(key(&item)) {
            kept.push(item);
        } else {
            dropped += 1;
        }
    }
    if dropped > 0 {
        debug!("Dropped {} duplicate records at join", dropped);
    }
    kept
}

/// Index records by key, first-seen wins.
pub fn index_first_seen<T, K, F>(items: Vec<T>, key: F) -> HashMap<K, T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut index = HashMap::with_capacity(items.len());
    for item in items {
        let k = key(&item);
        if index.contains_key(&k) {
            debug!("Duplicate join key ignored");
            continue;
        }
        index.insert(k, item);
    }
    index
}

/// Inner join of keyed records with the component catalog.
///
/// Records whose key is not a catalog component are dropped. Output follows
/// record order.
pub fn join_components<'c, T>(
    records: Vec<(String, T)>,
    catalog: &'c [Component],
) -> Vec<(&'c Component, T)> {
    let by_id: HashMap<&str, &Component> = catalog.iter().map(|c| (c.id.as_str(), c)).collect();
    first_seen(records, |(key, _)| key.clone())
        .into_iter()
        .filter_map(|(key, record)| match by_id.get(key.as_str()) {
            Some(component) => Some((*component, record)),
            None => {
                debug!("Record for '{}' has no catalog component, dropped", key);
                None
            }
        })
        .collect()
}

/// Union of per-component scanners with the components seen in raw scans.
///
/// Components listed in `raw` get `sonarqube` added when missing; raw-only
/// components are appended with `sonarqube` as their single scanner.
pub fn union_raw_scans(
    scanners: Vec<(String, ComponentScanners)>,
    raw: Vec<String>,
) -> Vec<(String, ComponentScanners)> {
    let raw = first_seen(raw, Clone::clone);
    let raw_ids: HashSet<&str> = raw.iter().map(String::as_str).collect();
    let mut merged = first_seen(scanners, |(id, _)| id.clone());
    for (id, entry) in merged.iter_mut() {
        let has_default = entry
            .scanner_names
            .iter()
            .any(|name| scanner_display_name(name) == scanner_display_name(RAW_SCAN_SCANNER));
        if raw_ids.contains(id.as_str()) && !has_default {
            entry.scanner_names.push(RAW_SCAN_SCANNER.to_string());
        }
    }
    let known: HashSet<String> = merged.iter().map(|(id, _)| id.clone()).collect();
    for id in raw {
        if !known.contains(&id) {
            merged.push((
                id,
                ComponentScanners {
                    scanner_names: vec![RAW_SCAN_SCANNER.to_string()],
                    ..Default::default()
                },
            ));
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::records::ComponentActivity;
    use serde_json::json;

    fn envelope(aggregations: JsonValue) -> SearchEnvelope {
        serde_json::from_value(json!({"took": 1, "hits": {"hits": []}, "aggregations": aggregations}))
            .unwrap()
    }

    #[test]
    fn test_missing_container_is_decode_error() {
        let env: SearchEnvelope =
            serde_json::from_value(json!({"aggregation": {"x": {"value": 1}}})).unwrap();
        assert!(matches!(decode(&env, "x"), Err(AppError::BackendDecode(_))));
    }

    #[test]
    fn test_empty_container_is_no_data() {
        assert_eq!(decode(&envelope(json!({})), "x").unwrap(), Aggregation::Empty);
    }

    #[test]
    fn test_unexpected_key_is_decode_error() {
        let env = envelope(json!({"other": {"value": {}}}));
        assert!(matches!(decode(&env, "component_activity"), Err(AppError::BackendDecode(_))));
    }

    #[test]
    fn test_map_value_decodes_typed_records() {
        let env = envelope(json!({
            "component_activity": {"value": {
                "c1": {"last_active_time": "2023-06-10T05:00:00Z", "events": 4},
                "c2": {"events": 1.0}
            }}
        }));
        let records: Vec<(String, ComponentActivity)> =
            decode(&env, "component_activity").unwrap().into_map().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].0, "c1");
        assert_eq!(records[0].1.events, 4);
        assert_eq!(records[1].1.events, 1);
    }

    #[test]
    fn test_duplicate_keys_last_write_wins_at_decode() {
        let raw = r#"{"aggregations": {"m": {"value": {"k": {"events": 1}, "k": {"events": 2}}}}}"#;
        let env: SearchEnvelope = serde_json::from_str(raw).unwrap();
        let records: Vec<(String, ComponentActivity)> = decode(&env, "m").unwrap().into_map().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].1.events, 2);
    }

    #[test]
    fn test_scalar_and_empty_values() {
        let env = envelope(json!({"n": {"value": 12.0}, "m": {"value": {}}, "l": {"value": []}}));
        assert_eq!(decode(&env, "n").unwrap(), Aggregation::Scalar(12.0));
        assert_eq!(decode(&env, "m").unwrap(), Aggregation::Empty);
        assert_eq!(decode(&env, "l").unwrap(), Aggregation::Empty);
        assert!(decode(&env, "n").unwrap().into_list::<JsonValue>().is_err());
    }

    #[test]
    fn test_buckets_with_both_hit_shapes() {
        let env = envelope(json!({"runs": {"buckets": [
            {"key": "r1", "doc_count": 2, "cases": {"hits": [{"status": "PASSED"}]}},
            {"key": 42, "key_as_string": "r2", "doc_count": 1,
             "cases": {"hits": {"hits": [{"_source": {"status": "FAILED"}}]}}}
        ]}}));
        let buckets = decode(&env, "runs").unwrap().into_buckets().unwrap();
        assert_eq!(buckets[0].key, "r1");
        assert_eq!(buckets[1].key, "r2");
        assert_eq!(buckets[1].doc_count, 1);
        let a: Vec<JsonValue> = buckets[0].hits("cases").unwrap();
        let b: Vec<JsonValue> = buckets[1].hits("cases").unwrap();
        assert_eq!(a[0]["status"], "PASSED");
        assert_eq!(b[0]["status"], "FAILED");
        assert!(buckets[0].hits::<JsonValue>("missing").unwrap().is_empty());
    }

    #[test]
    fn test_component_join_is_inner_and_first_seen() {
        let catalog = vec![Component {
            id: "c1".into(),
            name: "payments".into(),
            repository_url: Some("https://git/payments".into()),
            org_id: "org".into(),
            sub_org_id: None,
            disabled: false,
        }];
        let joined = join_components(
            vec![("c1".to_string(), 1), ("ghost".to_string(), 2), ("c1".to_string(), 3)],
            &catalog,
        );
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].0.name, "payments");
        assert_eq!(joined[0].1, 1);
    }

    #[test]
    fn test_raw_scans_inject_sonarqube() {
        let scanners = vec![
            (
                "c1".to_string(),
                ComponentScanners {
                    scanner_names: vec!["snyksast".into()],
                    ..Default::default()
                },
            ),
            (
                "c2".to_string(),
                ComponentScanners {
                    scanner_names: vec!["SonarQube".into()],
                    ..Default::default()
                },
            ),
        ];
        let merged = union_raw_scans(scanners, vec!["c1".into(), "c2".into(), "c3".into()]);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].1.scanner_names, vec!["snyksast", "sonarqube"]);
        assert_eq!(merged[1].1.scanner_names, vec!["SonarQube"]);
        assert_eq!(merged[2].0, "c3");
        assert_eq!(merged[2].1.scanner_names, vec!["sonarqube"]);
    }
}
