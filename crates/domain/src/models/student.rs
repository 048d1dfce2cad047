//! Student roster models.

use serde::{Deserialize, Serialize};
use validator::Validate;

use shared::validation::{validate_class_num, validate_grade, validate_not_blank};

/// A student as maintained by the roster import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct Student {
    #[validate(custom(function = "validate_not_blank"))]
    pub id: String,
    #[validate(custom(function = "validate_not_blank"))]
    pub name: String,
    #[validate(custom(function = "validate_grade"))]
    pub grade: i32,
    #[validate(custom(function = "validate_class_num"))]
    pub class_num: i32,
}

impl Student {
    pub fn new(id: impl Into<String>, name: impl Into<String>, grade: i32, class_num: i32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            grade,
            class_num,
        }
    }

    /// Short form used in documents and logs, e.g. `3학년 2반 김민수`.
    pub fn display_label(&self) -> String {
        format!("{}학년 {}반 {}", self.grade, self.class_num, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fake::faker::name::en::Name;
    use fake::Fake;

    #[test]
    fn test_valid_student() {
        let name: String = Name().fake();
        let student = Student::new("s1@school.kr", name, 3, 2);
        assert!(student.validate().is_ok());
    }

    #[test]
    fn test_out_of_range_grade_and_class() {
        assert!(Student::new("s1", "Kim", 7, 2).validate().is_err());
        assert!(Student::new("s1", "Kim", 3, 11).validate().is_err());
        assert!(Student::new("s1", "Kim", 0, 1).validate().is_err());
    }

    #[test]
    fn test_blank_name_rejected() {
        assert!(Student::new("s1", "  ", 1, 1).validate().is_err());
    }

    #[test]
    fn test_display_label() {
        assert_eq!(Student::new("s1", "Kim", 3, 2).display_label(), "3학년 2반 Kim");
    }
}
