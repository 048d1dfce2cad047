//! Student entity (database row mapping).

use sqlx::FromRow;

use domain::models::Student;

/// Database row mapping for the students table.
#[derive(Debug, Clone, FromRow)]
pub struct StudentEntity {
    pub id: String,
    pub name: String,
    pub grade: i32,
    pub class_num: i32,
}

impl From<StudentEntity> for Student {
    fn from(entity: StudentEntity) -> Self {
        Student::new(entity.id, entity.name, entity.grade, entity.class_num)
    }
}
