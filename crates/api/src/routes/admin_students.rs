//! Student roster administration.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::AdminIdentity;
use domain::models::Student;
use domain::services::{ImportStudentsRequest, ImportStudentsResponse, RemovalOutcome};

#[derive(Debug, Serialize)]
pub struct StudentsResponse {
    pub students: Vec<Student>,
    pub total: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClearStudentsQuery {
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Serialize)]
pub struct RemovalResponse {
    pub students_removed: usize,
    pub requests_removed: usize,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_notice: Option<String>,
}

impl From<RemovalOutcome> for RemovalResponse {
    fn from(outcome: RemovalOutcome) -> Self {
        Self {
            students_removed: outcome.removed.students,
            requests_removed: outcome.removed.requests,
            message: format!(
                "Removed {} student(s) and {} request(s)",
                outcome.removed.students, outcome.removed.requests
            ),
            sync_notice: outcome.sync.advisory(),
        }
    }
}

/// GET /api/v1/admin/students
pub async fn list_students(
    State(state): State<AppState>,
) -> Result<Json<StudentsResponse>, ApiError> {
    let students = state.engine.list_students().await?;
    Ok(Json(StudentsResponse {
        total: students.len(),
        students,
    }))
}

/// POST /api/v1/admin/students/import
///
/// Accepts spreadsheet rows (`학번, 이름, 학년, 반`, header optional).
/// Rows that fail validation are reported and skipped; the rest are upserted.
pub async fn import_students(
    State(state): State<AppState>,
    Json(body): Json<ImportStudentsRequest>,
) -> Result<Json<ImportStudentsResponse>, ApiError> {
    body.validate()?;
    let response = state.engine.import_students(&body.rows).await?;
    Ok(Json(response))
}

/// DELETE /api/v1/admin/students/:student_id
///
/// Removes the student and every request they filed.
pub async fn delete_student(
    State(state): State<AppState>,
    admin: AdminIdentity,
    Path(student_id): Path<String>,
) -> Result<Json<RemovalResponse>, ApiError> {
    let outcome = state.engine.delete_student(&student_id).await?;
    tracing::info!(admin = %admin.name, student_id = %student_id.trim(), "Student removal served");
    Ok(Json(outcome.into()))
}

/// DELETE /api/v1/admin/students?all=true
///
/// Wipes the roster and all requests. The `all` flag must be explicit.
pub async fn clear_students(
    State(state): State<AppState>,
    admin: AdminIdentity,
    Query(query): Query<ClearStudentsQuery>,
) -> Result<Json<RemovalResponse>, ApiError> {
    if !query.all {
        return Err(ApiError::Validation(
            "Pass all=true to remove every student and request".into(),
        ));
    }
    let outcome = state.engine.clear_students().await?;
    tracing::warn!(admin = %admin.name, "Full roster wipe served");
    Ok(Json(outcome.into()))
}
