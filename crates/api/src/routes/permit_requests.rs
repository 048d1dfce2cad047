//! Student-facing permit request endpoints.
//!
//! The caller is always the student named in `X-Student-Id`; requests of
//! other students are reported as not found.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::StudentIdentity;
use domain::models::{
    ListPermitRequestsResponse, PermitDocumentContext, PermitRequest, SubmitPermitRequestRequest,
    SubmitPermitRequestResponse, TransitionResponse,
};

/// POST /api/v1/requests
pub async fn submit_request(
    State(state): State<AppState>,
    StudentIdentity(student_id): StudentIdentity,
    Json(request): Json<SubmitPermitRequestRequest>,
) -> Result<(StatusCode, Json<SubmitPermitRequestResponse>), ApiError> {
    request.validate()?;
    let extra_info = request.stored_extra_info().map_err(ApiError::Validation)?;

    let outcome = state
        .engine
        .submit(&student_id, request.request_type, &request.reason, extra_info)
        .await?;

    let message = outcome.message();
    Ok((
        StatusCode::CREATED,
        Json(SubmitPermitRequestResponse {
            request: outcome.request,
            message,
            sync_notice: outcome.sync.advisory(),
        }),
    ))
}

/// GET /api/v1/requests
pub async fn list_my_requests(
    State(state): State<AppState>,
    StudentIdentity(student_id): StudentIdentity,
) -> Result<Json<ListPermitRequestsResponse<PermitRequest>>, ApiError> {
    let data = state.engine.list_student_requests(&student_id).await?;
    let total = data.len();
    Ok(Json(ListPermitRequestsResponse { data, total }))
}

/// GET /api/v1/requests/:id
pub async fn get_my_request(
    State(state): State<AppState>,
    StudentIdentity(student_id): StudentIdentity,
    Path(id): Path<i64>,
) -> Result<Json<PermitRequest>, ApiError> {
    let request = state.engine.get_student_request(id, &student_id).await?;
    Ok(Json(request))
}

/// DELETE /api/v1/requests/:id
///
/// Only the owner may cancel, and only while the request is pending or
/// approved.
pub async fn cancel_request(
    State(state): State<AppState>,
    StudentIdentity(student_id): StudentIdentity,
    Path(id): Path<i64>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let outcome = state.engine.cancel(id, &student_id).await?;

    info!(request_id = id, student_id = %student_id, "Cancellation served");

    Ok(Json(TransitionResponse {
        message: format!(
            "{} request cancelled",
            outcome.request.request_type.display_name()
        ),
        request: Some(outcome.request),
        changed: true,
        sync_notice: outcome.sync.advisory(),
    }))
}

/// GET /api/v1/requests/:id/permit
pub async fn get_permit_document(
    State(state): State<AppState>,
    StudentIdentity(student_id): StudentIdentity,
    Path(id): Path<i64>,
) -> Result<Json<PermitDocumentContext>, ApiError> {
    let document = state.engine.permit_document(id, &student_id).await?;
    Ok(Json(document))
}
