//! Student roster import.
//!
//! Rows arrive as arrays of cell strings in the column order
//! student id, name, grade, class. A header row is optional and recognized
//! by its aliases; header rows repeated mid-file are skipped too.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::Student;
use shared::validation::{CLASS_RANGE, GRADE_RANGE};

/// Maximum rows accepted in one import.
pub const MAX_IMPORT_ROWS: usize = 5000;

/// Request to import students.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct ImportStudentsRequest {
    #[validate(length(min = 1, max = 5000, message = "rows must contain 1-5000 items"))]
    pub rows: Vec<Vec<String>>,
}

/// Per-row problem found while parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ImportRowError {
    /// Row number (1-indexed, counting the header row if present).
    pub row: usize,
    pub error: String,
}

/// Parsed roster: valid students plus rejected rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedRoster {
    pub students: Vec<Student>,
    pub errors: Vec<ImportRowError>,
}

/// Response from a roster import.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ImportStudentsResponse {
    pub imported: usize,
    pub errors: Vec<ImportRowError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    StudentId,
    Name,
    Grade,
    ClassNum,
}

const EXPECTED_HEADER: [Column; 4] = [
    Column::StudentId,
    Column::Name,
    Column::Grade,
    Column::ClassNum,
];

fn header_alias(cell: &str) -> Option<Column> {
    let normalized: String = cell
        .trim()
        .trim_start_matches('\u{feff}')
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();

    match normalized.as_str() {
        "학번" | "student_id" => Some(Column::StudentId),
        "이름" | "name" => Some(Column::Name),
        "학년" | "grade" => Some(Column::Grade),
        "반" | "class" | "class_num" => Some(Column::ClassNum),
        _ => None,
    }
}

fn is_header_row(row: &[String]) -> bool {
    row.len() >= 4
        && row
            .iter()
            .take(4)
            .map(|cell| header_alias(cell))
            .eq(EXPECTED_HEADER.iter().map(|c| Some(*c)))
}

fn row_error(row: usize, error: impl Into<String>) -> ImportRowError {
    ImportRowError {
        row,
        error: error.into(),
    }
}

/// Parses roster rows. Blank rows are skipped; for duplicate ids the first
/// occurrence wins and later ones are reported.
pub fn parse_roster(rows: &[Vec<String>]) -> ParsedRoster {
    let mut parsed = ParsedRoster::default();
    let mut seen = std::collections::HashSet::new();

    for (idx, row) in rows.iter().enumerate() {
        let row_num = idx + 1;
        let values: Vec<&str> = row.iter().map(|v| v.trim()).collect();

        if values.iter().all(|v| v.is_empty()) || is_header_row(row) {
            continue;
        }

        if values.len() < 4 {
            parsed
                .errors
                .push(row_error(row_num, "At least 4 columns are required"));
            continue;
        }

        let (id, name) = (values[0], values[1]);
        let (grade, class_num) = match (values[2].parse::<i32>(), values[3].parse::<i32>()) {
            (Ok(g), Ok(c)) => (g, c),
            _ => {
                parsed
                    .errors
                    .push(row_error(row_num, "Grade and class must be numbers"));
                continue;
            }
        };

        if id.is_empty() || name.is_empty() {
            parsed
                .errors
                .push(row_error(row_num, "Student id and name are required"));
            continue;
        }
        if !GRADE_RANGE.contains(&grade) {
            parsed
                .errors
                .push(row_error(row_num, "Grade must be between 1 and 6"));
            continue;
        }
        if !CLASS_RANGE.contains(&class_num) {
            parsed
                .errors
                .push(row_error(row_num, "Class must be between 1 and 10"));
            continue;
        }
        if !seen.insert(id.to_string()) {
            parsed
                .errors
                .push(row_error(row_num, format!("Duplicate student id {}", id)));
            continue;
        }

        parsed.students.push(Student::new(id, name, grade, class_num));
    }

    parsed
}
