//! Student repository for database operations.

use sqlx::PgPool;

use domain::models::Student;
use domain::services::{RemovedRows, StoreError, StudentStore};

use crate::entities::StudentEntity;
use crate::error::with_retry;
use crate::metrics::QueryTimer;

/// Repository for the student roster.
#[derive(Clone)]
pub struct StudentRepository {
    pool: PgPool,
}

impl StudentRepository {
    /// Creates a new StudentRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Find a student by identifier.
    pub async fn find_by_id(&self, id: &str) -> Result<Option<StudentEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_student_by_id");
        let result = sqlx::query_as::<_, StudentEntity>(
            r#"
            SELECT id, name, grade, class_num
            FROM students
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// All students ordered by grade, class and name.
    pub async fn find_all(&self) -> Result<Vec<StudentEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_students");
        let result = sqlx::query_as::<_, StudentEntity>(
            r#"
            SELECT id, name, grade, class_num
            FROM students
            ORDER BY grade, class_num, name
            "#,
        )
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Delete one student (or every student when `id` is `None`) together
    /// with their requests, in one transaction.
    pub async fn delete_with_requests(&self, id: Option<&str>) -> Result<RemovedRows, sqlx::Error> {
        let timer = QueryTimer::new("delete_students");
        let mut tx = self.pool.begin().await?;

        let (requests, approved_gate): (i64, i64) = sqlx::query_as(
            r#"
            WITH removed AS (
                DELETE FROM permit_requests
                WHERE $1::TEXT IS NULL OR student_id = $1
                RETURNING request_type, status
            )
            SELECT
                COUNT(*),
                COUNT(*) FILTER (
                    WHERE request_type = 'gate' AND status IN ('approved', 'auto_approved')
                )
            FROM removed
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        let students = sqlx::query("DELETE FROM students WHERE $1::TEXT IS NULL OR id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        timer.record();

        Ok(RemovedRows {
            students: students as usize,
            requests: requests as usize,
            approved_gate: approved_gate as usize,
        })
    }

    /// Insert or update students in one transaction.
    pub async fn upsert_all(&self, students: &[Student]) -> Result<usize, sqlx::Error> {
        let timer = QueryTimer::new("upsert_students");
        let mut tx = self.pool.begin().await?;

        for student in students {
            sqlx::query(
                r#"
                INSERT INTO students (id, name, grade, class_num)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (id) DO UPDATE
                SET name = EXCLUDED.name,
                    grade = EXCLUDED.grade,
                    class_num = EXCLUDED.class_num,
                    updated_at = NOW()
                "#,
            )
            .bind(&student.id)
            .bind(&student.name)
            .bind(student.grade)
            .bind(student.class_num)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        timer.record();
        Ok(students.len())
    }
}

#[async_trait::async_trait]
impl StudentStore for StudentRepository {
    async fn find(&self, id: &str) -> Result<Option<Student>, StoreError> {
        with_retry("find_student_by_id", || self.find_by_id(id))
            .await
            .map(|row| row.map(Into::into))
    }

    async fn list_all(&self) -> Result<Vec<Student>, StoreError> {
        with_retry("list_students", || self.find_all())
            .await
            .map(|rows| rows.into_iter().map(Into::into).collect())
    }

    async fn upsert_many(&self, students: &[Student]) -> Result<usize, StoreError> {
        with_retry("upsert_students", || self.upsert_all(students)).await
    }

    async fn remove(&self, id: &str) -> Result<RemovedRows, StoreError> {
        with_retry("delete_student", || self.delete_with_requests(Some(id))).await
    }

    async fn remove_all(&self) -> Result<RemovedRows, StoreError> {
        with_retry("delete_all_students", || self.delete_with_requests(None)).await
    }
}
