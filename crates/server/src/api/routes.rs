use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use super::{audit, cases, handlers, jobs, middleware::metrics_middleware};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let cases_dir = state.orchestrator().artifacts().cases_dir().to_path_buf();

    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Audit
        .route("/audit", get(audit::query_audit))
        // Cases
        .route("/cases", post(cases::acquire_case).get(cases::list_cases))
        .route("/cases/{case_number}", get(cases::get_case))
        .route("/cases/{case_number}/audit", get(audit::case_timeline))
        // Dispatcher
        .route("/jobs", get(jobs::get_status))
        .route("/jobs/{case_number}", get(jobs::get_job));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .nest_service("/static", ServeDir::new(cases_dir))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
