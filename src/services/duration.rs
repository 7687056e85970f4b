//! Symbolic reporting windows resolved against an injectable clock.
//!
//! Every symbolic duration is a pure function of the current instant in the
//! requested zone. Weeks start on Monday; windows are half-open, so a past
//! period ends at the first instant of the period after it.

use std::sync::Arc;

use chrono::{
    DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc,
};
use chrono_tz::Tz;

use crate::error::{AppError, AppResult};
use crate::models::DurationType;

/// Layout of user-facing and template timestamps.
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Source of "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Histogram bucket width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggrBy {
    Day,
    Week,
    Month,
}

impl AggrBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }

    /// Bucket width for a window length, plus whether a week axis is drawn.
    pub fn for_span(span: TimeDelta) -> (Self, bool) {
        if span <= TimeDelta::days(7) {
            (Self::Day, false)
        } else if span <= TimeDelta::days(35) {
            (Self::Day, true)
        } else if span <= TimeDelta::days(90) {
            (Self::Week, false)
        } else {
            (Self::Month, false)
        }
    }
}

/// A concrete `[start, end)` window.
#[derive(Debug, Clone)]
pub struct ResolvedDuration {
    pub kind: DurationType,
    pub time_zone: Tz,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub aggr_by: AggrBy,
    pub week_axis: bool,
    /// Month buckets should be stretched to whole months.
    pub normalize_month_marker: bool,
}

impl ResolvedDuration {
    fn new(kind: DurationType, time_zone: Tz, start: DateTime<Tz>, end: DateTime<Tz>) -> Self {
        let (aggr_by, week_axis) = AggrBy::for_span(end.signed_duration_since(start));
        let month_kind = matches!(
            kind,
            DurationType::CurrentMonth | DurationType::PreviousMonth | DurationType::TwoMonthsBack
        );
        Self {
            kind,
            time_zone,
            start,
            end,
            aggr_by,
            week_axis,
            normalize_month_marker: month_kind || aggr_by == AggrBy::Month,
        }
    }

    pub fn start_utc(&self) -> DateTime<Utc> {
        self.start.with_timezone(&Utc)
    }

    pub fn end_utc(&self) -> DateTime<Utc> {
        self.end.with_timezone(&Utc)
    }

    /// Start as `YYYY-MM-DD HH:MM:SS` in the requested zone.
    pub fn start_local(&self) -> String {
        self.start.format(DATE_TIME_FORMAT).to_string()
    }

    pub fn end_local(&self) -> String {
        self.end.format(DATE_TIME_FORMAT).to_string()
    }

    pub fn span(&self) -> TimeDelta {
        self.end.signed_duration_since(self.start)
    }
}

type WindowFn = fn(DateTime<Tz>) -> (DateTime<Tz>, DateTime<Tz>);

struct DurationSpec {
    kind: DurationType,
    window: WindowFn,
}

const DURATION_SPECS: [DurationSpec; 7] = [
    DurationSpec { kind: DurationType::CurrentWeek, window: current_week },
    DurationSpec { kind: DurationType::PreviousWeek, window: previous_week },
    DurationSpec { kind: DurationType::TwoWeeksBack, window: two_weeks_back },
    DurationSpec { kind: DurationType::CurrentMonth, window: current_month },
    DurationSpec { kind: DurationType::PreviousMonth, window: previous_month },
    DurationSpec { kind: DurationType::TwoMonthsBack, window: two_months_back },
    DurationSpec { kind: DurationType::Last90Days, window: last_90_days },
];

fn current_week(now: DateTime<Tz>) -> (DateTime<Tz>, DateTime<Tz>) {
    (week_start(now, 0), now)
}

fn previous_week(now: DateTime<Tz>) -> (DateTime<Tz>, DateTime<Tz>) {
    (week_start(now, 1), week_start(now, 0))
}

fn two_weeks_back(now: DateTime<Tz>) -> (DateTime<Tz>, DateTime<Tz>) {
    (week_start(now, 2), week_start(now, 1))
}

fn current_month(now: DateTime<Tz>) -> (DateTime<Tz>, DateTime<Tz>) {
    (month_start(now, 0), now)
}

fn previous_month(now: DateTime<Tz>) -> (DateTime<Tz>, DateTime<Tz>) {
    (month_start(now, 1), month_start(now, 0))
}

fn two_months_back(now: DateTime<Tz>) -> (DateTime<Tz>, DateTime<Tz>) {
    (month_start(now, 2), month_start(now, 1))
}

fn last_90_days(now: DateTime<Tz>) -> (DateTime<Tz>, DateTime<Tz>) {
    (now - TimeDelta::days(90), now)
}

fn week_start(now: DateTime<Tz>, weeks_back: i64) -> DateTime<Tz> {
    let today = now.date_naive();
    let monday = today
        - TimeDelta::days(i64::from(today.weekday().num_days_from_monday()))
        - TimeDelta::weeks(weeks_back);
    local_midnight(&now.timezone(), monday)
}

fn month_start(now: DateTime<Tz>, months_back: i32) -> DateTime<Tz> {
    let total = now.year() * 12 + now.month0() as i32 - months_back;
    let first = NaiveDate::from_ymd_opt(total.div_euclid(12), total.rem_euclid(12) as u32 + 1, 1)
        .unwrap_or_else(|| now.date_naive());
    local_midnight(&now.timezone(), first)
}

/// First instant of `date` in `tz`, skipping forward over a DST gap.
fn local_midnight(tz: &Tz, date: NaiveDate) -> DateTime<Tz> {
    let naive = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + TimeDelta::hours(1))).earliest())
        .unwrap_or_else(|| tz.from_utc_datetime(&naive))
}

/// Parse an IANA zone name; empty means UTC.
pub fn parse_time_zone(name: Option<&str>) -> AppResult<Tz> {
    match name.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(Tz::UTC),
        Some(name) => name
            .parse::<Tz>()
            .map_err(|_| AppError::InvalidArgument(format!("invalid time_zone {name}"))),
    }
}

/// Parse `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD` as local time in `tz`.
fn parse_local(value: &str, tz: &Tz) -> Option<DateTime<Tz>> {
    let value = value.trim();
    let naive = NaiveDateTime::parse_from_str(value, DATE_TIME_FORMAT)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, DATE_FORMAT)
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })?;
    tz.from_local_datetime(&naive).earliest()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Resolves duration types into concrete windows.
#[derive(Clone)]
pub struct DurationResolver {
    clock: Arc<dyn Clock>,
}

impl DurationResolver {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn system() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Resolve a window. Unknown types are accepted only with explicit dates,
    /// which are then treated as a custom range.
    pub fn resolve(
        &self,
        kind: DurationType,
        start_date: Option<&str>,
        end_date: Option<&str>,
        time_zone: Option<&str>,
    ) -> AppResult<ResolvedDuration> {
        let tz = parse_time_zone(time_zone)?;
        let (start, end) = match DURATION_SPECS.iter().find(|spec| spec.kind == kind) {
            Some(spec) => (spec.window)(self.clock.now().with_timezone(&tz)),
            None => explicit_window(kind, start_date, end_date, &tz)?,
        };
        Ok(ResolvedDuration::new(kind, tz, start, end))
    }
}

/// Bounds of an explicitly dated window: both dates present, parseable in
/// `tz` and ordered.
pub fn explicit_window(
    kind: DurationType,
    start_date: Option<&str>,
    end_date: Option<&str>,
    tz: &Tz,
) -> AppResult<(DateTime<Tz>, DateTime<Tz>)> {
    let (Some(raw_start), Some(raw_end)) = (non_empty(start_date), non_empty(end_date)) else {
        return Err(AppError::InvalidArgument(format!(
            "start_date and end_date are required for duration type {kind}"
        )));
    };
    let start = parse_local(raw_start, tz)
        .ok_or_else(|| AppError::InvalidArgument(format!("invalid start_date {raw_start}")))?;
    let end = parse_local(raw_end, tz)
        .ok_or_else(|| AppError::InvalidArgument(format!("invalid end_date {raw_end}")))?;
    if start > end {
        return Err(AppError::InvalidArgument(
            "start_date must not be after end_date".to_string(),
        ));
    }
    Ok((start, end))
}
