//! Common validation utilities.

use chrono::NaiveDate;
use validator::ValidationError;

/// Lowest and highest school grade.
pub const GRADE_RANGE: std::ops::RangeInclusive<i32> = 1..=6;

/// Lowest and highest class (section) number within a grade.
pub const CLASS_RANGE: std::ops::RangeInclusive<i32> = 1..=10;

/// Bounds for a configured auto-approval delay, in minutes.
pub const DELAY_MINUTES_RANGE: std::ops::RangeInclusive<i64> = 1..=1440;

/// Validates that a grade is within 1 to 6.
pub fn validate_grade(grade: i32) -> Result<(), ValidationError> {
    if GRADE_RANGE.contains(&grade) {
        Ok(())
    } else {
        let mut err = ValidationError::new("grade_range");
        err.message = Some("Grade must be between 1 and 6".into());
        Err(err)
    }
}

/// Validates that a class number is within 1 to 10.
pub fn validate_class_num(class_num: i32) -> Result<(), ValidationError> {
    if CLASS_RANGE.contains(&class_num) {
        Ok(())
    } else {
        let mut err = ValidationError::new("class_range");
        err.message = Some("Class number must be between 1 and 10".into());
        Err(err)
    }
}

/// Validates that a text field contains something other than whitespace.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value must not be blank".into());
        Err(err)
    } else {
        Ok(())
    }
}

/// Validates an auto-approval delay (1 to 1440 minutes).
pub fn validate_delay_minutes(minutes: i64) -> Result<(), ValidationError> {
    if DELAY_MINUTES_RANGE.contains(&minutes) {
        Ok(())
    } else {
        let mut err = ValidationError::new("delay_range");
        err.message = Some("Delay must be between 1 and 1440 minutes".into());
        Err(err)
    }
}

/// Parses a school calendar date written as `2025-03-01`, `2025.3.1` or an
/// RFC 3339 timestamp. Returns `None` for anything else.
pub fn parse_school_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    for fmt in ["%Y-%m-%d", "%Y.%m.%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, fmt) {
            return Some(date);
        }
    }

    chrono::DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.date_naive())
}
