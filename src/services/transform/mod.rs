//! Post-decode transforms.
//!
//! Widget transforms turn the decoded legs of a slot query into the node data
//! of a report document. Drilldown transforms turn them into ordered rows that
//! may embed pointers to deeper drilldowns.

pub mod drilldown;
pub mod format;
pub mod widget;

use std::collections::HashMap;

use crate::error::{AppError, AppResult};
use crate::models::DrillDown;
use crate::services::aggregation::Aggregation;
use crate::services::interpolate::{ParamBag, interpolate_text};
use crate::services::interpolate::Token;

/// Drilldown reports this service can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DrilldownKind {
    ComponentActivity,
    AutomationRuns,
    Deployments,
    SecurityScanTypeWorkflows,
    SecurityComponents,
    RunScanStatus,
    Commits,
    PullRequests,
    TestTotalRuns,
    TestRunDetails,
    TestCaseLog,
    TestRunActivity,
}

impl DrilldownKind {
    pub const ALL: [DrilldownKind; 12] = [
        DrilldownKind::ComponentActivity,
        DrilldownKind::AutomationRuns,
        DrilldownKind::Deployments,
        DrilldownKind::SecurityScanTypeWorkflows,
        DrilldownKind::SecurityComponents,
        DrilldownKind::RunScanStatus,
        DrilldownKind::Commits,
        DrilldownKind::PullRequests,
        DrilldownKind::TestTotalRuns,
        DrilldownKind::TestRunDetails,
        DrilldownKind::TestCaseLog,
        DrilldownKind::TestRunActivity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ComponentActivity => "component-activity",
            Self::AutomationRuns => "automation-runs",
            Self::Deployments => "deployments",
            Self::SecurityScanTypeWorkflows => "security-scan-type-workflows",
            Self::SecurityComponents => "security-components",
            Self::RunScanStatus => "run-scan-status",
            Self::Commits => "commits",
            Self::PullRequests => "pull-requests",
            Self::TestTotalRuns => "test-total-runs",
            Self::TestRunDetails => "test-run-details",
            Self::TestCaseLog => "test-case-log",
            Self::TestRunActivity => "test-run-activity",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    /// Drilldowns that rows of this report point to.
    pub fn links(&self) -> &'static [DrilldownKind] {
        match self {
            Self::ComponentActivity => &[Self::AutomationRuns],
            Self::AutomationRuns => &[Self::RunScanStatus],
            Self::SecurityScanTypeWorkflows => &[Self::RunScanStatus],
            Self::SecurityComponents => &[Self::SecurityScanTypeWorkflows],
            Self::TestTotalRuns => &[Self::TestRunDetails, Self::TestRunActivity],
            Self::TestRunDetails | Self::TestRunActivity => &[Self::TestCaseLog],
            Self::Deployments
            | Self::RunScanStatus
            | Self::Commits
            | Self::PullRequests
            | Self::TestCaseLog => &[],
        }
    }

    /// Query legs the transform reads, by name.
    pub fn legs(&self) -> &'static [&'static str] {
        match self {
            Self::Deployments => &["runs", "deployments"],
            Self::SecurityScanTypeWorkflows => &["runs", "scan_results"],
            Self::SecurityComponents => &["scanners", "raw"],
            Self::RunScanStatus => &["runs", "scan_results"],
            Self::TestTotalRuns => &["runs", "test_cases_that_failed_at_least_once"],
            _ => &[],
        }
    }

    /// Whether rows carry environment names from the endpoint catalog.
    pub fn needs_environments(&self) -> bool {
        matches!(self, Self::Deployments)
    }
}

impl std::fmt::Display for DrilldownKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Decoded legs of one query, in template order.
#[derive(Debug, Default)]
pub struct Legs(Vec<(String, Aggregation)>);

impl Legs {
    pub fn new(legs: Vec<(String, Aggregation)>) -> Self {
        Legs(legs)
    }

    /// Single-leg convenience constructor.
    pub fn single(name: &str, aggregation: Aggregation) -> Self {
        Legs(vec![(name.to_string(), aggregation)])
    }

    /// Remove and return the leg called `name`.
    pub fn take(&mut self, name: &str) -> AppResult<Aggregation> {
        let idx = self
            .0
            .iter()
            .position(|(n, _)| n == name)
            .ok_or_else(|| AppError::Internal(format!("query leg '{}' was not executed", name)))?;
        Ok(self.0.remove(idx).1)
    }

    /// The first leg; `Empty` when the template has none.
    pub fn first(mut self) -> Aggregation {
        if self.0.is_empty() {
            Aggregation::Empty
        } else {
            self.0.remove(0).1
        }
    }

    pub fn all_empty(&self) -> bool {
        self.0.iter().all(|(_, a)| a.is_empty())
    }
}

/// Builds embedded drilldown pointers with templated titles.
#[derive(Debug, Clone, Default)]
pub struct PointerFactory {
    /// report_id to (title template, report type).
    targets: HashMap<String, (String, String)>,
}

impl PointerFactory {
    pub fn new(targets: HashMap<String, (String, String)>) -> Self {
        Self { targets }
    }

    /// Pointer to `target` carrying the non-empty entries of `info`.
    pub fn pointer(&self, target: DrilldownKind, info: &[(&str, Option<&str>)]) -> DrillDown {
        let mut bag = ParamBag::new();
        for (key, value) in info {
            if let Some(token) = Token::from_info_key(key) {
                bag.set_opt(token, *value);
            }
        }
        let (title, report_type) = match self.targets.get(target.as_str()) {
            Some((template, report_type)) => {
                (interpolate_text(template, &bag), Some(report_type.clone()))
            }
            None => (target.as_str().to_string(), None),
        };
        let mut pointer = info
            .iter()
            .fold(DrillDown::new(target.as_str(), title), |p, (k, v)| p.with(k, *v));
        pointer.report_type = report_type;
        pointer
    }
}
