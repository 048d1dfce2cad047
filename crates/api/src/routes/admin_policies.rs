//! Approval policy administration.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::AdminIdentity;
use domain::models::{ApprovalPolicy, RequestType, UpdatePolicyRequest};

#[derive(Debug, Serialize)]
pub struct PoliciesResponse {
    pub policies: Vec<ApprovalPolicy>,
}

/// GET /api/v1/admin/policies
pub async fn list_policies(
    State(state): State<AppState>,
) -> Result<Json<PoliciesResponse>, ApiError> {
    let policies = state.engine.policies().await?;
    Ok(Json(PoliciesResponse { policies }))
}

/// PUT /api/v1/admin/policies/:type
pub async fn update_policy(
    State(state): State<AppState>,
    admin: AdminIdentity,
    Path(request_type): Path<String>,
    Json(body): Json<UpdatePolicyRequest>,
) -> Result<Json<ApprovalPolicy>, ApiError> {
    let request_type: RequestType = request_type
        .parse()
        .map_err(|e: domain::models::ParseEnumError| ApiError::Validation(e.to_string()))?;
    body.validate()?;

    let policy = state
        .engine
        .update_policy(request_type, body.mode, body.delay_minutes)
        .await?;

    tracing::info!(admin = %admin.name, request_type = %request_type, "Policy change served");
    Ok(Json(policy))
}
