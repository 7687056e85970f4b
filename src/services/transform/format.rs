//! Presentation formatting shared by widget and drilldown transforms.

use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;

use crate::models::TimeFormat;

const FORMAT_24H: &str = "%Y/%m/%d %H:%M:%S";
const FORMAT_12H: &str = "%Y/%m/%d %I:%M:%S %p";

/// Renders backend timestamps in the caller's time zone and clock format.
#[derive(Debug, Clone, Copy)]
pub struct Formatter {
    time_zone: Tz,
    time_format: TimeFormat,
}

impl Formatter {
    pub fn new(time_zone: Tz, time_format: TimeFormat) -> Self {
        Self {
            time_zone,
            time_format,
        }
    }

    /// Format an RFC-3339 timestamp; unparseable input is returned unchanged.
    pub fn timestamp(&self, raw: &str) -> String {
        match parse_utc(raw) {
            Some(at) => self.format(at),
            None => raw.to_string(),
        }
    }

    pub fn opt_timestamp(&self, raw: Option<&str>) -> Option<String> {
        raw.filter(|s| !s.is_empty()).map(|s| self.timestamp(s))
    }

    pub fn format(&self, at: DateTime<Utc>) -> String {
        let local = at.with_timezone(&self.time_zone);
        match self.time_format {
            TimeFormat::TwelveHour => local.format(FORMAT_12H).to_string(),
            TimeFormat::TwentyFourHour => local.format(FORMAT_24H).to_string(),
        }
    }
}

/// Parse a backend timestamp (RFC-3339, or naive UTC).
pub fn parse_utc(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .map(|naive| naive.and_utc())
}

/// Title-case a status: `SKIPPED` becomes `Skipped`, `FAIL` becomes `Fail`.
pub fn normalize_status(status: &str) -> String {
    let status = status.trim();
    let mut chars = status.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Canonical display name of a scanner. Unknown names pass through.
pub fn scanner_display_name(name: &str) -> String {
    let key: String = name
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect();
    let canonical = match key.as_str() {
        "snyksast" => "Snyk SAST",
        "snyksca" => "Snyk SCA",
        "snykcontainer" => "Snyk Container",
        "stackhawk" => "StackHawk",
        "trufflehog" | "trufflehogsast" => "TruffleHog",
        "checkmarx" => "Checkmarx",
        "sonarqube" => "SonarQube",
        "mendsast" => "Mend SAST",
        "mendsca" => "Mend SCA",
        "gitleaks" => "Gitleaks",
        "trivy" => "Trivy",
        _ => return name.to_string(),
    };
    canonical.to_string()
}

/// `failed / total` as a one-decimal percentage.
pub fn failure_rate(failed: u64, total: u64) -> String {
    if total == 0 {
        return "0.0%".to_string();
    }
    format!("{:.1}%", failed as f64 * 100.0 / total as f64)
}

/// Test case log: stdout, stderr and the error trace, newline separated.
pub fn log_message(std_out: Option<&str>, std_err: Option<&str>, error_trace: Option<&str>) -> String {
    [std_out, std_err, error_trace]
        .iter()
        .map(|part| part.unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\n")
}
