//! Widget, query and drilldown definitions.
//!
//! Loaded once at startup from the definitions directory and immutable
//! afterwards; every cross-reference is checked before the service accepts
//! traffic.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::error::{AppError, AppResult};
use crate::models::{Dashboard, DrilldownDefinition, QueryLeg, QueryTemplate, WidgetSpec};
use crate::services::interpolate::Token;
use crate::services::transform::{DrilldownKind, PointerFactory, widget};

const WIDGETS_DIR: &str = "widgets";
const QUERIES_FILE: &str = "queries.json";
const DRILLDOWN_QUERIES_FILE: &str = "drilldown_queries.json";
const DRILLDOWN_ALIASES_FILE: &str = "drilldown_aliases.json";

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid definitions: {0}")]
    Invalid(String),
}

fn invalid(msg: impl Into<String>) -> RegistryError {
    RegistryError::Invalid(msg.into())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, RegistryError> {
    let raw = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| RegistryError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Definition counts, logged at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrySummary {
    pub dashboards: usize,
    pub widgets: usize,
    pub queries: usize,
    pub drilldowns: usize,
}

impl fmt::Display for RegistrySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} dashboards, {} widgets, {} queries, {} drilldowns",
            self.dashboards, self.widgets, self.queries, self.drilldowns
        )
    }
}

#[derive(Debug)]
pub struct Registry {
    widgets: HashMap<String, WidgetSpec>,
    /// Widget ids per dashboard, in file order.
    dashboards: BTreeMap<Dashboard, Vec<String>>,
    queries: HashMap<String, QueryTemplate>,
    drilldowns: HashMap<String, DrilldownDefinition>,
    drilldown_aliases: HashMap<String, String>,
}

impl Registry {
    /// Load and validate a definitions directory.
    pub fn load(dir: &Path) -> Result<Self, RegistryError> {
        let widgets_dir = dir.join(WIDGETS_DIR);
        let entries = std::fs::read_dir(&widgets_dir).map_err(|source| RegistryError::Io {
            path: widgets_dir.clone(),
            source,
        })?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();

        let mut widgets = Vec::with_capacity(files.len());
        for path in files {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            let dashboard = Dashboard::parse(&stem)
                .ok_or_else(|| invalid(format!("unknown dashboard file '{}'", path.display())))?;
            let specs: Vec<WidgetSpec> = read_json(&path)?;
            widgets.push((dashboard, specs));
        }

        let queries = read_json(&dir.join(QUERIES_FILE))?;
        let drilldowns = read_json(&dir.join(DRILLDOWN_QUERIES_FILE))?;
        let aliases = read_json(&dir.join(DRILLDOWN_ALIASES_FILE))?;
        Self::from_parts(widgets, queries, drilldowns, aliases)
    }

    /// Build from already-parsed definitions, applying the same checks as [`Registry::load`].
    pub fn from_parts(
        widgets_by_dashboard: Vec<(Dashboard, Vec<WidgetSpec>)>,
        queries: HashMap<String, QueryTemplate>,
        drilldowns: HashMap<String, DrilldownDefinition>,
        drilldown_aliases: HashMap<String, String>,
    ) -> Result<Self, RegistryError> {
        for (id, template) in &queries {
            validate_template(&format!("query '{}'", id), template)?;
        }

        for (id, definition) in &drilldowns {
            let kind = DrilldownKind::parse(id)
                .ok_or_else(|| invalid(format!("unknown drilldown report '{}'", id)))?;
            if !drilldown_aliases.contains_key(id) {
                return Err(invalid(format!("drilldown '{}' has no alias", id)));
            }
            validate_template(&format!("drilldown '{}'", id), &definition.query)?;
            for leg in kind.legs() {
                if !definition.query.legs.iter().any(|l| l.name == *leg) {
                    return Err(invalid(format!("drilldown '{}' is missing leg '{}'", id, leg)));
                }
            }
            for target in kind.links() {
                if !drilldowns.contains_key(target.as_str()) {
                    return Err(invalid(format!(
                        "drilldown '{}' links to undefined drilldown '{}'",
                        id, target
                    )));
                }
            }
        }

        let mut widgets = HashMap::new();
        let mut dashboards: BTreeMap<Dashboard, Vec<String>> = BTreeMap::new();
        for (dashboard, specs) in widgets_by_dashboard {
            let ids = dashboards.entry(dashboard).or_default();
            for mut spec in specs {
                if spec.dashboard_id.is_empty() {
                    spec.dashboard_id = dashboard.as_str().to_string();
                } else if spec.dashboard_id != dashboard.as_str() {
                    return Err(invalid(format!(
                        "widget '{}' declares dashboard '{}' but is listed under '{}'",
                        spec.id, spec.dashboard_id, dashboard
                    )));
                }
                validate_widget(&spec, &queries, &drilldowns)?;
                if widgets.contains_key(&spec.id) {
                    return Err(invalid(format!("duplicate widget id '{}'", spec.id)));
                }
                ids.push(spec.id.clone());
                widgets.insert(spec.id.clone(), spec);
            }
        }

        Ok(Self {
            widgets,
            dashboards,
            queries,
            drilldowns,
            drilldown_aliases,
        })
    }

    pub fn summary(&self) -> RegistrySummary {
        RegistrySummary {
            dashboards: self.dashboards.len(),
            widgets: self.widgets.len(),
            queries: self.queries.len(),
            drilldowns: self.drilldowns.len(),
        }
    }

    pub fn widget(&self, id: &str) -> AppResult<&WidgetSpec> {
        self.widgets
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("Widget '{}'", id)))
    }

    pub fn query(&self, id: &str) -> AppResult<&QueryTemplate> {
        self.queries
            .get(id)
            .ok_or_else(|| AppError::Internal(format!("query '{}' is not defined", id)))
    }

    /// A drilldown definition with its kind and alias.
    pub fn drilldown(&self, id: &str) -> AppResult<(DrilldownKind, &DrilldownDefinition, &str)> {
        let not_found = || AppError::NotFound(format!("Report '{}'", id));
        let kind = DrilldownKind::parse(id).ok_or_else(not_found)?;
        let definition = self.drilldowns.get(id).ok_or_else(not_found)?;
        let alias = self
            .drilldown_aliases
            .get(id)
            .ok_or_else(|| AppError::Internal(format!("drilldown '{}' has no alias", id)))?;
        Ok((kind, definition, alias.as_str()))
    }

    pub fn contains_drilldown(&self, id: &str) -> bool {
        self.drilldowns.contains_key(id)
    }

    /// Widgets of a dashboard in layout order.
    pub fn dashboard_widgets(&self, dashboard: Dashboard) -> Vec<&WidgetSpec> {
        self.dashboards
            .get(&dashboard)
            .map(|ids| ids.iter().filter_map(|id| self.widgets.get(id)).collect())
            .unwrap_or_default()
    }

    /// Widget id to every drilldown reachable from its slots, in discovery order.
    pub fn transitions(&self, dashboard: Dashboard) -> BTreeMap<String, Vec<String>> {
        let mut transitions = BTreeMap::new();
        for widget in self.dashboard_widgets(dashboard) {
            let mut reached: Vec<String> = Vec::new();
            let mut queue: Vec<DrilldownKind> = widget
                .slots()
                .filter_map(|slot| slot.drilldown_id.as_deref())
                .filter_map(DrilldownKind::parse)
                .collect();
            let mut seen: HashSet<DrilldownKind> = HashSet::new();
            let mut idx = 0;
            while idx < queue.len() {
                let kind = queue[idx];
                idx += 1;
                if !seen.insert(kind) {
                    continue;
                }
                reached.push(kind.as_str().to_string());
                queue.extend(kind.links().iter().copied());
            }
            transitions.insert(widget.id.clone(), reached);
        }
        transitions
    }

    /// Pointer factory over the drilldown titles.
    pub fn pointer_factory(&self) -> PointerFactory {
        PointerFactory::new(
            self.drilldowns
                .iter()
                .map(|(id, d)| (id.clone(), (d.title.clone(), d.report_type.clone())))
                .collect(),
        )
    }
}

fn validate_widget(
    spec: &WidgetSpec,
    queries: &HashMap<String, QueryTemplate>,
    drilldowns: &HashMap<String, DrilldownDefinition>,
) -> Result<(), RegistryError> {
    if spec.id.trim().is_empty() {
        return Err(invalid("widget with empty id"));
    }
    for slot in spec.slots() {
        let template = queries.get(&slot.query_id).ok_or_else(|| {
            invalid(format!(
                "widget '{}' slot '{}' references undefined query '{}'",
                spec.id, slot.title, slot.query_id
            ))
        })?;
        for leg in widget::required_legs(slot.transform_id) {
            if !template.legs.iter().any(|l| l.name == *leg) {
                return Err(invalid(format!(
                    "query '{}' lacks leg '{}' required by transform {}",
                    slot.query_id,
                    leg,
                    slot.transform_id.as_str()
                )));
            }
        }
        if let Some(drilldown) = slot.drilldown_id.as_deref()
            && !drilldowns.contains_key(drilldown)
        {
            return Err(invalid(format!(
                "widget '{}' references undefined drilldown '{}'",
                spec.id, drilldown
            )));
        }
    }
    Ok(())
}

fn validate_template(label: &str, template: &QueryTemplate) -> Result<(), RegistryError> {
    if template.legs.is_empty() {
        return Err(invalid(format!("{} has no legs", label)));
    }
    let mut names = HashSet::new();
    for leg in &template.legs {
        if !names.insert(leg.name.as_str()) {
            return Err(invalid(format!("{} has duplicate leg '{}'", label, leg.name)));
        }
        validate_leg(label, leg)?;
    }
    if let Some(probe) = &template.probe {
        validate_leg(label, probe)?;
    }
    Ok(())
}

fn validate_leg(label: &str, leg: &QueryLeg) -> Result<(), RegistryError> {
    if !leg.body.is_object() {
        return Err(invalid(format!("{} leg '{}' body is not a JSON object", label, leg.name)));
    }
    if let Some(unknown) = leg.required.iter().find(|name| Token::parse(name).is_none()) {
        return Err(invalid(format!(
            "{} leg '{}' requires unknown token '{}'",
            label, leg.name, unknown
        )));
    }
    Ok(())
}
