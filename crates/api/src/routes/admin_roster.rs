//! Gate roster view and manual publication.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::app::AppState;
use crate::error::ApiError;
use domain::models::GateRosterItem;

#[derive(Debug, Serialize)]
pub struct RosterSyncResponse {
    pub rows: usize,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct GateRosterResponse {
    pub roster: Vec<GateRosterItem>,
    pub total: usize,
}

/// GET /api/v1/admin/roster
///
/// Read-only view of the approved gate roster. Publishes nothing.
pub async fn view_roster(
    State(state): State<AppState>,
) -> Result<Json<GateRosterResponse>, ApiError> {
    let roster = state.engine.gate_roster().await?;
    Ok(Json(GateRosterResponse {
        total: roster.len(),
        roster,
    }))
}

/// POST /api/v1/admin/roster/sync
pub async fn sync_roster(
    State(state): State<AppState>,
) -> Result<Json<RosterSyncResponse>, ApiError> {
    let rows = state.engine.sync_roster().await?;
    Ok(Json(RosterSyncResponse {
        rows,
        message: format!("Gate roster synced ({} rows)", rows),
    }))
}
