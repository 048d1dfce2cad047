//! Gate-exit attendance schedule.
//!
//! A gate permit records which weekday mornings the student arrives through
//! the front gate and, per weekday, which of the three dismissal slots they
//! leave in. The schedule is stored as JSON in the request's `extra_info`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// School weekdays covered by a gate schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Weekday {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
}

impl Weekday {
    pub const ALL: [Weekday; 5] = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
    ];

    /// Single-character label used in the stored payload and printed forms.
    pub fn label(&self) -> &'static str {
        match self {
            Weekday::Mon => "월",
            Weekday::Tue => "화",
            Weekday::Wed => "수",
            Weekday::Thu => "목",
            Weekday::Fri => "금",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.label() == label.trim())
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// One of the three fixed dismissal slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DismissalSlot {
    First,
    Second,
    Third,
}

impl DismissalSlot {
    pub const ALL: [DismissalSlot; 3] = [
        DismissalSlot::First,
        DismissalSlot::Second,
        DismissalSlot::Third,
    ];

    /// Code stored in the payload (`"1"`, `"2"`, `"3"`).
    pub fn code(&self) -> &'static str {
        match self {
            DismissalSlot::First => "1",
            DismissalSlot::Second => "2",
            DismissalSlot::Third => "3",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DismissalSlot::First => "1하교",
            DismissalSlot::Second => "2하교",
            DismissalSlot::Third => "3하교",
        }
    }

    pub fn time(&self) -> &'static str {
        match self {
            DismissalSlot::First => "14:00",
            DismissalSlot::Second => "14:50",
            DismissalSlot::Third => "15:40",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code.trim())
    }

    /// Accepts a code or anything starting with one (`"2"`, `"2하교"`,
    /// `"2하교(14:50)"`).
    pub fn from_loose(value: &str) -> Option<Self> {
        let first = value.trim().chars().next()?;
        Self::ALL
            .into_iter()
            .find(|s| s.code().starts_with(first))
    }
}

/// Morning attendance days plus per-day dismissal slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredSchedule", into = "StoredSchedule")]
pub struct GateSchedule {
    morning_days: BTreeSet<Weekday>,
    dismissal_by_day: BTreeMap<Weekday, DismissalSlot>,
}

/// Wire form. Accepts both snake_case and camelCase keys and silently drops
/// unknown weekdays or slot codes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredSchedule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<u32>,
    #[serde(default, alias = "morningDays", skip_serializing_if = "Option::is_none")]
    morning_days: Option<Vec<String>>,
    #[serde(default, alias = "dismissalByDay", skip_serializing_if = "Option::is_none")]
    dismissal_by_day: Option<BTreeMap<String, String>>,
}

impl From<StoredSchedule> for GateSchedule {
    fn from(stored: StoredSchedule) -> Self {
        let morning_days = stored
            .morning_days
            .unwrap_or_default()
            .iter()
            .filter_map(|d| Weekday::from_label(d))
            .collect();

        let dismissal_by_day = stored
            .dismissal_by_day
            .unwrap_or_default()
            .iter()
            .filter_map(|(day, code)| Some((Weekday::from_label(day)?, DismissalSlot::from_code(code)?)))
            .collect();

        Self {
            morning_days,
            dismissal_by_day,
        }
    }
}

impl From<GateSchedule> for StoredSchedule {
    fn from(schedule: GateSchedule) -> Self {
        Self {
            version: Some(1),
            morning_days: Some(
                schedule
                    .morning_days
                    .iter()
                    .map(|d| d.label().to_string())
                    .collect(),
            ),
            dismissal_by_day: Some(
                schedule
                    .dismissal_by_day
                    .iter()
                    .map(|(d, s)| (d.label().to_string(), s.code().to_string()))
                    .collect(),
            ),
        }
    }
}

/// Per-weekday view of a schedule, Monday first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleGrid {
    pub morning: [bool; 5],
    pub dismissal: [Option<DismissalSlot>; 5],
}

impl GateSchedule {
    pub fn new(
        morning_days: impl IntoIterator<Item = Weekday>,
        dismissal_by_day: impl IntoIterator<Item = (Weekday, DismissalSlot)>,
    ) -> Self {
        Self {
            morning_days: morning_days.into_iter().collect(),
            dismissal_by_day: dismissal_by_day.into_iter().collect(),
        }
    }

    pub fn morning_days(&self) -> &BTreeSet<Weekday> {
        &self.morning_days
    }

    pub fn dismissal_by_day(&self) -> &BTreeMap<Weekday, DismissalSlot> {
        &self.dismissal_by_day
    }

    /// A schedule must select at least one morning or one dismissal slot.
    pub fn is_empty(&self) -> bool {
        self.morning_days.is_empty() && self.dismissal_by_day.is_empty()
    }

    /// Serializes the schedule into the stored `extra_info` payload.
    pub fn to_extra_info(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parses a stored payload. Returns `None` when the text is not a JSON
    /// object carrying either schedule key.
    pub fn parse(extra_info: &str) -> Option<Self> {
        let stored: StoredSchedule = serde_json::from_str(extra_info).ok()?;
        if stored.morning_days.is_none() && stored.dismissal_by_day.is_none() {
            return None;
        }
        Some(stored.into())
    }

    /// Human-readable summary, e.g. `등교: 월,수 / 하교: 화2하교`.
    pub fn summary(&self) -> String {
        let mornings: Vec<&str> = self.morning_days.iter().map(|d| d.label()).collect();
        let morning_text = if mornings.is_empty() {
            "등교 없음".to_string()
        } else {
            format!("등교: {}", mornings.join(","))
        };

        let dismissals: Vec<String> = self
            .dismissal_by_day
            .iter()
            .map(|(d, s)| format!("{}{}", d.label(), s.label()))
            .collect();
        let dismissal_text = if dismissals.is_empty() {
            "하교 없음".to_string()
        } else {
            format!("하교: {}", dismissals.join(", "))
        };

        format!("{} / {}", morning_text, dismissal_text)
    }

    pub fn grid(&self) -> ScheduleGrid {
        let mut grid = ScheduleGrid::default();
        for day in &self.morning_days {
            grid.morning[day.index()] = true;
        }
        for (day, slot) in &self.dismissal_by_day {
            grid.dismissal[day.index()] = Some(*slot);
        }
        grid
    }
}

/// Summary text for any stored `extra_info`: the schedule summary when it
/// parses, the raw text otherwise.
pub fn describe_extra_info(extra_info: Option<&str>) -> String {
    match extra_info {
        Some(text) => GateSchedule::parse(text)
            .map(|s| s.summary())
            .unwrap_or_else(|| text.to_string()),
        None => String::new(),
    }
}
