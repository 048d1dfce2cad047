//! Health endpoints.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use sqlx::PgPool;
use std::time::Instant;

use crate::app::AppState;
use crate::config::RosterSyncConfig;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: DatabaseHealth,
    pub roster_sync: RosterSyncHealth,
    pub school_utc_offset_hours: i32,
}

#[derive(Debug, Serialize)]
pub struct DatabaseHealth {
    pub connected: bool,
    pub latency_ms: Option<u64>,
    pub pool_size: u32,
    pub pool_idle: usize,
}

/// `configured` is false when sync is enabled but has no endpoint, which
/// config validation normally prevents.
#[derive(Debug, Serialize)]
pub struct RosterSyncHealth {
    pub enabled: bool,
    pub configured: bool,
}

impl From<&RosterSyncConfig> for RosterSyncHealth {
    fn from(config: &RosterSyncConfig) -> Self {
        Self {
            enabled: config.enabled,
            configured: !config.webapp_url.trim().is_empty(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

async fn check_database(pool: &PgPool) -> DatabaseHealth {
    let start = Instant::now();
    let result = persistence::db::ping(pool).await;
    if let Err(e) = &result {
        tracing::warn!(error = %e, "Database ping failed");
    }

    DatabaseHealth {
        connected: result.is_ok(),
        latency_ms: result.is_ok().then(|| start.elapsed().as_millis() as u64),
        pool_size: pool.size(),
        pool_idle: pool.num_idle(),
    }
}

/// Full status report. Answers 503 with the same body while the database
/// is unreachable.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = check_database(&state.pool).await;
    let status = if database.connected {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if database.connected { "healthy" } else { "unhealthy" },
        version: env!("CARGO_PKG_VERSION"),
        database,
        roster_sync: RosterSyncHealth::from(&state.config.roster_sync),
        school_utc_offset_hours: state.config.workflow.school_utc_offset_hours,
    };

    (status, Json(response))
}

pub async fn live() -> Json<StatusResponse> {
    Json(StatusResponse { status: "alive" })
}

/// Ready once the database answers.
pub async fn ready(State(state): State<AppState>) -> Result<Json<StatusResponse>, StatusCode> {
    if check_database(&state.pool).await.connected {
        Ok(Json(StatusResponse { status: "ready" }))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}
