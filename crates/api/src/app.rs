use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::middleware::{
    metrics_handler, metrics_middleware, require_admin, security_headers_middleware, trace_id,
};
use crate::routes::{
    admin_policies, admin_requests, admin_roster, admin_settings, admin_students, health,
    permit_requests,
};
use crate::services::HttpRosterSync;
use domain::services::{DisabledRosterSync, NotifierError, RosterSyncNotifier, WorkflowEngine};
use persistence::repositories::{PermitRequestRepository, SettingRepository, StudentRepository};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub engine: Arc<WorkflowEngine>,
}

/// Wires the workflow engine to the Postgres repositories and the
/// configured roster notifier.
pub fn build_engine(config: &Config, pool: &PgPool) -> Result<Arc<WorkflowEngine>, NotifierError> {
    let requests = Arc::new(PermitRequestRepository::new(pool.clone()));
    let settings = Arc::new(SettingRepository::new(pool.clone()));
    let students = Arc::new(StudentRepository::new(pool.clone()));

    let notifier: Arc<dyn RosterSyncNotifier> = if config.roster_sync.enabled {
        Arc::new(HttpRosterSync::new(
            config.roster_sync.clone(),
            requests.clone(),
        )?)
    } else {
        tracing::info!("Roster sync disabled; gate roster changes are not published");
        Arc::new(DisabledRosterSync)
    };

    Ok(Arc::new(WorkflowEngine::new(
        requests,
        settings,
        students,
        notifier,
        &config.workflow.engine_config(),
    )))
}

pub fn create_app(config: Config, pool: PgPool, engine: Arc<WorkflowEngine>) -> Router {
    let config = Arc::new(config);

    let state = AppState {
        pool,
        config: config.clone(),
        engine,
    };

    let cors = if config.security.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .security
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // Student identity comes from X-Student-Id, checked per handler.
    let student_routes = Router::new()
        .route(
            "/api/v1/requests",
            post(permit_requests::submit_request).get(permit_requests::list_my_requests),
        )
        .route(
            "/api/v1/requests/:id",
            get(permit_requests::get_my_request).delete(permit_requests::cancel_request),
        )
        .route(
            "/api/v1/requests/:id/permit",
            get(permit_requests::get_permit_document),
        );

    let admin_routes = Router::new()
        .route("/api/v1/admin/requests", get(admin_requests::list_requests))
        .route(
            "/api/v1/admin/requests/pending",
            get(admin_requests::pending_queue),
        )
        .route(
            "/api/v1/admin/requests/:id/approve",
            post(admin_requests::approve_request),
        )
        .route(
            "/api/v1/admin/requests/:id/reject",
            post(admin_requests::reject_request),
        )
        .route("/api/v1/admin/stats", get(admin_requests::statistics))
        .route("/api/v1/admin/policies", get(admin_policies::list_policies))
        .route(
            "/api/v1/admin/policies/:type",
            put(admin_policies::update_policy),
        )
        .route(
            "/api/v1/admin/settings",
            get(admin_settings::get_calendar).patch(admin_settings::update_calendar),
        )
        .route(
            "/api/v1/admin/students",
            get(admin_students::list_students).delete(admin_students::clear_students),
        )
        .route(
            "/api/v1/admin/students/import",
            post(admin_students::import_students),
        )
        .route(
            "/api/v1/admin/students/:student_id",
            delete(admin_students::delete_student),
        )
        .route("/api/v1/admin/roster", get(admin_roster::view_roster))
        .route("/api/v1/admin/roster/sync", post(admin_roster::sync_roster))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    Router::new()
        .merge(public_routes)
        .merge(student_routes)
        .merge(admin_routes)
        // Global middleware (order matters: bottom layers run first)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            security_headers_middleware,
        ))
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors)
        .with_state(state)
}
