//! Gate roster rows published to the attendance sheet.

use serde::Serialize;
use serde_json::Value;

use super::gate_schedule::{describe_extra_info, GateSchedule};

/// An approved gate request joined with its student, as read from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct GateRosterEntry {
    pub student_id: String,
    pub name: String,
    pub grade: i32,
    pub class_num: i32,
    pub reason: String,
    pub extra_info: Option<String>,
}

/// One published roster row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct RosterRow {
    pub student_number: String,
    pub name: String,
    pub morning: [bool; 5],
    /// Dismissal slot label per weekday, empty when none.
    pub dismissal: [String; 5],
    pub reason: String,
}

/// Read-only roster line for the admin screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct GateRosterItem {
    pub student_id: String,
    pub student_number: String,
    pub name: String,
    pub grade: i32,
    pub class_num: i32,
    pub reason: String,
    pub schedule_summary: String,
    pub morning: [bool; 5],
    pub dismissal: [String; 5],
}

impl From<&GateRosterEntry> for GateRosterItem {
    fn from(entry: &GateRosterEntry) -> Self {
        let row = RosterRow::from_entry(entry);
        Self {
            student_id: entry.student_id.clone(),
            student_number: row.student_number,
            name: row.name,
            grade: entry.grade,
            class_num: entry.class_num,
            reason: row.reason,
            schedule_summary: describe_extra_info(entry.extra_info.as_deref()),
            morning: row.morning,
            dismissal: row.dismissal,
        }
    }
}

/// Student number shown on the sheet: the digits of the identifier's local
/// part, or the whole local part when it has no digits.
pub fn student_number(student_id: &str) -> String {
    let local = student_id.split('@').next().unwrap_or_default();
    let digits: String = local.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        local.to_string()
    } else {
        digits
    }
}

impl RosterRow {
    pub fn from_entry(entry: &GateRosterEntry) -> Self {
        let grid = entry
            .extra_info
            .as_deref()
            .and_then(GateSchedule::parse)
            .unwrap_or_default()
            .grid();

        Self {
            student_number: student_number(&entry.student_id),
            name: entry.name.clone(),
            morning: grid.morning,
            dismissal: grid
                .dismissal
                .map(|slot| slot.map(|s| s.label().to_string()).unwrap_or_default()),
            reason: entry.reason.clone(),
        }
    }

    /// Cell values in sheet column order. Morning flags are `true` or an
    /// empty string so unchecked boxes stay blank.
    pub fn to_sheet_values(&self) -> Vec<Value> {
        let mut values = Vec::with_capacity(13);
        values.push(Value::String(self.student_number.clone()));
        values.push(Value::String(self.name.clone()));
        for flag in self.morning {
            values.push(if flag {
                Value::Bool(true)
            } else {
                Value::String(String::new())
            });
        }
        for label in &self.dismissal {
            values.push(Value::String(label.clone()));
        }
        values.push(Value::String(self.reason.clone()));
        values
    }
}
