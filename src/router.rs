use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::AppState;

/// Build the application router with all routes
pub fn build(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(handlers::healthcheck))
        // Inventory routes
        .route("/api/clients", get(handlers::clients::list_clients))
        .route("/api/clients/:mac", get(handlers::clients::get_client))
        // Reconciliation routes
        .route("/api/runs", get(handlers::reconcile::list_runs))
        .route("/api/reconcile", post(handlers::reconcile::trigger_reconcile))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
