//! Typed approval settings.
//!
//! Settings are persisted as loose key/value strings. This module owns the
//! key names and the normalization rules, so submission and the delayed
//! sweep always agree on what a stored value means.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

use super::permit_request::RequestType;
use shared::validation::{parse_school_date, DELAY_MINUTES_RANGE};

/// Delay applied when none is stored or the stored value is unusable.
pub const DEFAULT_DELAY_MINUTES: i64 = 10;

/// How new requests of a type are approved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    #[default]
    Manual,
    InstantAuto,
    DelayedAuto,
}

impl ApprovalMode {
    /// Normalizes a stored mode string. Legacy aliases map onto the
    /// canonical modes; anything unrecognized is `Manual`.
    pub fn resolve(raw: Option<&str>) -> Self {
        match raw.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("instant_auto") | Some("auto") => ApprovalMode::InstantAuto,
            Some("delayed_auto") | Some("delayed_approve") => ApprovalMode::DelayedAuto,
            _ => ApprovalMode::Manual,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalMode::Manual => "manual",
            ApprovalMode::InstantAuto => "instant_auto",
            ApprovalMode::DelayedAuto => "delayed_auto",
        }
    }
}

impl std::fmt::Display for ApprovalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses a stored delay, falling back to the default and clamping into
/// the accepted range.
pub fn resolve_delay_minutes(raw: Option<&str>) -> i64 {
    let minutes = raw
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(DEFAULT_DELAY_MINUTES);
    minutes.clamp(*DELAY_MINUTES_RANGE.start(), *DELAY_MINUTES_RANGE.end())
}

/// Recognized settings keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    ApprovalMode(RequestType),
    ApprovalDelayMinutes(RequestType),
    AcademicYear,
    AcademicYearStart,
}

impl SettingKey {
    /// Storage key string.
    pub fn as_key(&self) -> String {
        match self {
            SettingKey::ApprovalMode(t) => format!("{}_approval_mode", t.as_str()),
            SettingKey::ApprovalDelayMinutes(t) => format!("{}_approval_delay_minutes", t.as_str()),
            SettingKey::AcademicYear => "academic_year".to_string(),
            SettingKey::AcademicYearStart => "academic_year_start".to_string(),
        }
    }
}

impl std::fmt::Display for SettingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_key())
    }
}

/// Resolved approval policy for one request type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ApprovalPolicy {
    #[serde(rename = "type")]
    pub request_type: RequestType,
    pub mode: ApprovalMode,
    /// Only meaningful in `DelayedAuto` mode.
    pub delay_minutes: i64,
}

/// Request body for changing a type's policy.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct UpdatePolicyRequest {
    pub mode: ApprovalMode,
    #[serde(default)]
    #[validate(range(min = 1, max = 1440, message = "Delay must be between 1 and 1440 minutes"))]
    pub delay_minutes: Option<i64>,
}

/// Academic year boundaries used for permit period text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcademicCalendar {
    pub year: i32,
    pub start: NaiveDate,
}

impl AcademicCalendar {
    /// Builds the calendar from stored values. Without a stored year the
    /// year that contains `today` is used (school years begin in March);
    /// without a stored start date the start is March 1st of the year.
    pub fn resolve(year: Option<&str>, start: Option<&str>, today: NaiveDate) -> Self {
        let year = year
            .and_then(|v| v.trim().parse::<i32>().ok())
            .unwrap_or_else(|| {
                if today.month() >= 3 {
                    today.year()
                } else {
                    today.year() - 1
                }
            });
        let start = start
            .and_then(parse_school_date)
            .or_else(|| NaiveDate::from_ymd_opt(year, 3, 1))
            .unwrap_or(today);
        Self { year, start }
    }

    /// Last day of the permit period: February 28th of the following year.
    pub fn end(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year + 1, 2, 28).unwrap_or(self.start)
    }

    /// Period text printed on permits, e.g. `2025.3.1 ~ 2026.2.28`.
    pub fn period_text(&self) -> String {
        let end = self.end();
        format!(
            "{}.{}.{} ~ {}.{}.{}",
            self.start.year(),
            self.start.month(),
            self.start.day(),
            end.year(),
            end.month(),
            end.day()
        )
    }
}

/// Parses an academic year written as exactly four digits.
pub fn parse_academic_year(value: &str) -> Option<i32> {
    let value = value.trim();
    if value.len() != 4 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

/// Parses an academic year start written as `YYYY-MM-DD`.
pub fn parse_academic_year_start(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

/// Request body for changing the academic calendar. Omitted fields keep
/// their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct UpdateCalendarRequest {
    #[serde(default)]
    pub academic_year: Option<String>,
    #[serde(default)]
    pub academic_year_start: Option<String>,
}

/// Academic calendar as shown to admins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct AcademicCalendarView {
    pub academic_year: i32,
    pub academic_year_start: NaiveDate,
    pub period_text: String,
}

impl From<&AcademicCalendar> for AcademicCalendarView {
    fn from(calendar: &AcademicCalendar) -> Self {
        Self {
            academic_year: calendar.year,
            academic_year_start: calendar.start,
            period_text: calendar.period_text(),
        }
    }
}

/// All settings the workflow reads, loaded once per operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalSettings {
    policies: [ApprovalPolicy; 3],
    pub calendar: AcademicCalendar,
}

impl ApprovalSettings {
    /// Resolves every setting from the raw key/value map.
    pub fn from_raw(raw: &HashMap<String, String>, today: NaiveDate) -> Self {
        let get = |key: SettingKey| raw.get(&key.as_key()).map(String::as_str);

        let policies = RequestType::ALL.map(|request_type| ApprovalPolicy {
            request_type,
            mode: ApprovalMode::resolve(get(SettingKey::ApprovalMode(request_type))),
            delay_minutes: resolve_delay_minutes(get(SettingKey::ApprovalDelayMinutes(request_type))),
        });

        let calendar = AcademicCalendar::resolve(
            get(SettingKey::AcademicYear),
            get(SettingKey::AcademicYearStart),
            today,
        );

        Self { policies, calendar }
    }

    pub fn policy(&self, request_type: RequestType) -> ApprovalPolicy {
        self.policies
            .iter()
            .copied()
            .find(|p| p.request_type == request_type)
            .unwrap_or(ApprovalPolicy {
                request_type,
                mode: ApprovalMode::Manual,
                delay_minutes: DEFAULT_DELAY_MINUTES,
            })
    }

    pub fn policies(&self) -> Vec<ApprovalPolicy> {
        self.policies.to_vec()
    }

    /// Policies of every type currently in delayed mode.
    pub fn delayed(&self) -> impl Iterator<Item = &ApprovalPolicy> {
        self.policies
            .iter()
            .filter(|p| p.mode == ApprovalMode::DelayedAuto)
    }
}
