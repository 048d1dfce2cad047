//! Academic calendar settings.

use axum::{extract::State, Json};

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::AdminIdentity;
use domain::models::{AcademicCalendarView, UpdateCalendarRequest};

/// GET /api/v1/admin/settings
pub async fn get_calendar(
    State(state): State<AppState>,
) -> Result<Json<AcademicCalendarView>, ApiError> {
    let calendar = state.engine.academic_calendar().await?;
    Ok(Json(AcademicCalendarView::from(&calendar)))
}

/// PATCH /api/v1/admin/settings
///
/// Either field may be omitted; at least one is required.
pub async fn update_calendar(
    State(state): State<AppState>,
    admin: AdminIdentity,
    Json(body): Json<UpdateCalendarRequest>,
) -> Result<Json<AcademicCalendarView>, ApiError> {
    let calendar = state
        .engine
        .update_academic_calendar(
            body.academic_year.as_deref(),
            body.academic_year_start.as_deref(),
        )
        .await?;
    tracing::info!(admin = %admin.name, "Calendar change served");
    Ok(Json(AcademicCalendarView::from(&calendar)))
}
