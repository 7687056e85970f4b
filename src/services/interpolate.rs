//! Template token substitution.
//!
//! Query bodies are JSON documents whose string values may carry `{{token}}`
//! placeholders. A string that is exactly one placeholder is replaced by the
//! token's JSON value (quotes included), which is how list tokens become
//! arrays. Placeholders embedded in longer strings are replaced by escaped
//! text. Unknown or unset tokens stay literal.

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use crate::error::{AppError, AppResult};
use crate::models::{ReportInfo, ReportRequest, TimeFormat};
use crate::services::catalog::ComponentScope;
use crate::services::duration::ResolvedDuration;

/// Tokens this service knows how to fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Token {
    OrgId,
    SubOrgId,
    Component,
    StartDate,
    EndDate,
    TimeZone,
    TimeFormat,
    DurationType,
    Environment,
    CiToolId,
    ViewOption,
    SortBy,
    FilterType,
    Branch,
    AutomationId,
    ComponentId,
    RunId,
    ScannerName,
    Code,
    TestSuiteName,
    TestCaseName,
    RunNumber,
    ScannerNameList,
    RunIdList,
    LicenseType,
    JobId,
    DeploymentEnv,
    Status,
    AggrBy,
    CalendarInterval,
    NormalizeMonth,
    Size,
    SearchAfter,
}

impl Token {
    pub const ALL: [Token; 33] = [
        Token::OrgId,
        Token::SubOrgId,
        Token::Component,
        Token::StartDate,
        Token::EndDate,
        Token::TimeZone,
        Token::TimeFormat,
        Token::DurationType,
        Token::Environment,
        Token::CiToolId,
        Token::ViewOption,
        Token::SortBy,
        Token::FilterType,
        Token::Branch,
        Token::AutomationId,
        Token::ComponentId,
        Token::RunId,
        Token::ScannerName,
        Token::Code,
        Token::TestSuiteName,
        Token::TestCaseName,
        Token::RunNumber,
        Token::ScannerNameList,
        Token::RunIdList,
        Token::LicenseType,
        Token::JobId,
        Token::DeploymentEnv,
        Token::Status,
        Token::AggrBy,
        Token::CalendarInterval,
        Token::NormalizeMonth,
        Token::Size,
        Token::SearchAfter,
    ];

    /// Placeholder name used in templates.
    pub fn name(&self) -> &'static str {
        match self {
            Self::OrgId => "orgId",
            Self::SubOrgId => "subOrgId",
            Self::Component => "component",
            Self::StartDate => "startDate",
            Self::EndDate => "endDate",
            Self::TimeZone => "timeZone",
            Self::TimeFormat => "timeFormat",
            Self::DurationType => "durationType",
            Self::Environment => "environment",
            Self::CiToolId => "ciToolId",
            Self::ViewOption => "viewOption",
            Self::SortBy => "sortBy",
            Self::FilterType => "filterType",
            Self::Branch => "branch",
            Self::AutomationId => "automationId",
            Self::ComponentId => "componentId",
            Self::RunId => "runId",
            Self::ScannerName => "scannerName",
            Self::Code => "code",
            Self::TestSuiteName => "testSuiteName",
            Self::TestCaseName => "testCaseName",
            Self::RunNumber => "runNumber",
            Self::ScannerNameList => "scannerNameList",
            Self::RunIdList => "runIdList",
            Self::LicenseType => "licenseType",
            Self::JobId => "jobId",
            Self::DeploymentEnv => "deploymentEnv",
            Self::Status => "status",
            Self::AggrBy => "aggrBy",
            Self::CalendarInterval => "calendarInterval",
            Self::NormalizeMonth => "normalizeMonth",
            Self::Size => "size",
            Self::SearchAfter => "searchAfter",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    /// `report_info` key that feeds this token, for drilldown parameters.
    pub fn info_key(&self) -> Option<&'static str> {
        Some(match self {
            Self::ComponentId => "component_id",
            Self::RunId => "run_id",
            Self::AutomationId => "automation_id",
            Self::Branch => "branch",
            Self::ScannerName => "scanner_name",
            Self::Code => "code",
            Self::RunNumber => "run_number",
            Self::TestSuiteName => "test_suite_name",
            Self::TestCaseName => "test_case_name",
            Self::ScannerNameList => "scanner_name_list",
            Self::RunIdList => "run_id_list",
            Self::LicenseType => "license_type",
            Self::JobId => "job_id",
            Self::DeploymentEnv => "deployment_env",
            _ => return None,
        })
    }

    pub fn from_info_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.info_key() == Some(key))
    }
}

/// Value bound to a token.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    List(Vec<String>),
    /// Already-typed JSON (numbers, booleans, sort keys).
    Raw(JsonValue),
}

impl ParamValue {
    fn is_blank(&self) -> bool {
        match self {
            Self::Text(s) => s.trim().is_empty(),
            Self::List(_) => false,
            Self::Raw(v) => v.is_null(),
        }
    }

    fn to_json(&self) -> JsonValue {
        match self {
            Self::Text(s) => JsonValue::String(s.clone()),
            Self::List(items) => JsonValue::Array(items.iter().cloned().map(JsonValue::String).collect()),
            Self::Raw(v) => v.clone(),
        }
    }

    fn to_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::List(items) => items.join(","),
            Self::Raw(JsonValue::String(s)) => s.clone(),
            Self::Raw(v) => v.to_string(),
        }
    }
}

/// Parameters available to templates: well-known tokens plus free-form keys.
#[derive(Debug, Clone, Default)]
pub struct ParamBag {
    known: BTreeMap<Token, ParamValue>,
    extra: BTreeMap<String, ParamValue>,
}

impl ParamBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, token: Token, value: ParamValue) -> &mut Self {
        if !value.is_blank() {
            self.known.insert(token, value);
        }
        self
    }

    pub fn set_text(&mut self, token: Token, value: impl Into<String>) -> &mut Self {
        self.set(token, ParamValue::Text(value.into()))
    }

    pub fn set_opt(&mut self, token: Token, value: Option<&str>) -> &mut Self {
        if let Some(v) = value {
            self.set_text(token, v);
        }
        self
    }

    pub fn set_extra(&mut self, name: impl Into<String>, value: ParamValue) -> &mut Self {
        if !value.is_blank() {
            self.extra.insert(name.into(), value);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        match Token::parse(name) {
            Some(token) => self.known.get(&token),
            None => self.extra.get(name),
        }
    }

    pub fn get_token(&self, token: Token) -> Option<&ParamValue> {
        self.known.get(&token)
    }

    pub fn text(&self, token: Token) -> Option<String> {
        self.known.get(&token).map(ParamValue::to_text)
    }

    /// Names in `required` that have no value.
    pub fn missing(&self, required: &[String]) -> Vec<String> {
        required
            .iter()
            .filter(|name| self.get(name).is_none())
            .cloned()
            .collect()
    }

    /// Bag for a report request over a resolved window and component scope.
    pub fn for_request(
        request: &ReportRequest,
        duration: &ResolvedDuration,
        scope: &ComponentScope,
    ) -> Self {
        let mut bag = ParamBag::new();
        let time_format = request
            .time_format
            .as_deref()
            .and_then(TimeFormat::parse)
            .unwrap_or_default();
        bag.set_text(Token::OrgId, request.org_id.as_str())
            .set_text(Token::SubOrgId, request.effective_sub_org())
            .set(Token::Component, ParamValue::List(scope.ids()))
            .set_text(Token::StartDate, duration.start_local())
            .set_text(Token::EndDate, duration.end_local())
            .set_text(Token::TimeZone, duration.time_zone.name())
            .set_text(Token::TimeFormat, time_format.as_str())
            .set_text(Token::DurationType, duration.kind.as_str())
            .set_opt(Token::Environment, request.environment_id.as_deref())
            .set_opt(Token::CiToolId, request.ci_tool_id.as_deref())
            .set_opt(Token::ViewOption, request.view_option.as_deref())
            .set_opt(Token::SortBy, request.sort_by.as_deref())
            .set_opt(Token::FilterType, request.filter_type.as_deref())
            .set_text(Token::AggrBy, duration.aggr_by.as_str())
            .set_text(Token::CalendarInterval, duration.aggr_by.as_str())
            .set(
                Token::NormalizeMonth,
                ParamValue::Raw(JsonValue::Bool(duration.normalize_month_marker)),
            );
        bag
    }

    /// Add drilldown parameters from a `report_info` bag.
    pub fn with_report_info(mut self, info: &ReportInfo) -> Self {
        self.set_opt(Token::ComponentId, info.component_id.as_deref())
            .set_opt(Token::RunId, info.run_id.as_deref())
            .set_opt(Token::AutomationId, info.automation_id.as_deref())
            .set_opt(Token::Branch, info.branch.as_deref())
            .set_opt(Token::ScannerName, info.scanner_name.as_deref())
            .set_opt(Token::Code, info.code.as_deref())
            .set_opt(Token::RunNumber, info.run_number.as_deref())
            .set_opt(Token::TestSuiteName, info.test_suite_name.as_deref())
            .set_opt(Token::TestCaseName, info.test_case_name.as_deref())
            .set_opt(Token::LicenseType, info.license_type.as_deref())
            .set_opt(Token::JobId, info.job_id.as_deref())
            .set_opt(Token::DeploymentEnv, info.deployment_env.as_deref());
        if !info.scanner_name_list.is_empty() {
            self.set(Token::ScannerNameList, ParamValue::List(info.scanner_name_list.clone()));
        }
        if !info.run_id_list.is_empty() {
            self.set(Token::RunIdList, ParamValue::List(info.run_id_list.clone()));
        }
        for (key, value) in &info.extra {
            let value = match value {
                JsonValue::String(s) => ParamValue::Text(s.clone()),
                other => ParamValue::Raw(other.clone()),
            };
            match Token::from_info_key(key).or_else(|| Token::parse(key)) {
                Some(token) if !self.known.contains_key(&token) => {
                    self.set(token, value);
                }
                Some(_) => {}
                None => {
                    self.set_extra(key.clone(), value);
                }
            }
        }
        self
    }
}

/// Substitute tokens in a query body.
pub fn interpolate(body: &JsonValue, bag: &ParamBag, required: &[String]) -> AppResult<JsonValue> {
    let missing = bag.missing(required);
    if !missing.is_empty() {
        return Err(AppError::missing_attributes(&missing));
    }
    let text = serde_json::to_string(body)
        .map_err(|e| AppError::Internal(format!("Failed to serialize template: {}", e)))?;
    let substituted = substitute(&text, bag, true);
    serde_json::from_str(&substituted)
        .map_err(|e| AppError::Internal(format!("Template produced invalid JSON: {}", e)))
}

/// Substitute tokens in plain text such as a title template.
pub fn interpolate_text(template: &str, bag: &ParamBag) -> String {
    substitute(template, bag, false)
}

fn is_token_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn substitute(text: &str, bag: &ParamBag, json: bool) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find("{{") {
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else { break };
        let name = after[..close].trim();
        let value = if is_token_name(name) { bag.get(name) } else { None };

        let Some(value) = value else {
            out.push_str(&rest[..open + 2 + close + 2]);
            rest = &after[close + 2..];
            continue;
        };

        let prefix = &rest[..open];
        let tail = &after[close + 2..];
        let quoted = json
            && prefix.ends_with('"')
            && !prefix.ends_with("\\\"")
            && tail.starts_with('"');
        if quoted {
            out.push_str(&prefix[..prefix.len() - 1]);
            out.push_str(&value.to_json().to_string());
            rest = &tail[1..];
        } else {
            out.push_str(prefix);
            if json {
                out.push_str(&escape_json_text(&value.to_text()));
            } else {
                out.push_str(&value.to_text());
            }
            rest = tail;
        }
    }
    out.push_str(rest);
    out
}

fn escape_json_text(text: &str) -> String {
    let quoted = JsonValue::String(text.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}
