//! Administrative review of permit requests.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use tracing::info;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::AdminIdentity;
use domain::models::{
    ListPermitRequestsResponse, PermitRequestWithStudent, PermitStatistics,
    RejectPermitRequestRequest, RequestFilter, TransitionResponse,
};
use domain::services::TransitionOutcome;

/// GET /api/v1/admin/requests?status=&type=&student_id=
pub async fn list_requests(
    State(state): State<AppState>,
    Query(filter): Query<RequestFilter>,
) -> Result<Json<ListPermitRequestsResponse<PermitRequestWithStudent>>, ApiError> {
    let data = state.engine.list_requests(&filter).await?;
    let total = data.len();
    Ok(Json(ListPermitRequestsResponse { data, total }))
}

/// GET /api/v1/admin/requests/pending
pub async fn pending_queue(
    State(state): State<AppState>,
) -> Result<Json<ListPermitRequestsResponse<PermitRequestWithStudent>>, ApiError> {
    let data = state.engine.pending_queue().await?;
    let total = data.len();
    Ok(Json(ListPermitRequestsResponse { data, total }))
}

/// POST /api/v1/admin/requests/:id/approve
pub async fn approve_request(
    State(state): State<AppState>,
    admin: AdminIdentity,
    Path(id): Path<i64>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let outcome = state.engine.approve(id, &admin.name).await?;

    info!(request_id = id, approver = %admin.name, changed = outcome.changed, "Approval served");

    Ok(Json(transition_response(outcome, "approved")))
}

/// POST /api/v1/admin/requests/:id/reject
pub async fn reject_request(
    State(state): State<AppState>,
    admin: AdminIdentity,
    Path(id): Path<i64>,
    Json(body): Json<RejectPermitRequestRequest>,
) -> Result<Json<TransitionResponse>, ApiError> {
    body.validate()?;
    let outcome = state.engine.reject(id, &body.reason).await?;

    info!(request_id = id, admin = %admin.name, changed = outcome.changed, "Rejection served");

    Ok(Json(transition_response(outcome, "rejected")))
}

/// GET /api/v1/admin/stats
pub async fn statistics(
    State(state): State<AppState>,
) -> Result<Json<PermitStatistics>, ApiError> {
    Ok(Json(state.engine.statistics().await?))
}

fn transition_response(outcome: TransitionOutcome, verb: &str) -> TransitionResponse {
    let message = if outcome.changed {
        format!("Request {} {}", outcome.request.id, verb)
    } else {
        format!("Request {} was already {}", outcome.request.id, verb)
    };
    TransitionResponse {
        sync_notice: outcome.sync.advisory(),
        request: Some(outcome.request),
        changed: outcome.changed,
        message,
    }
}
