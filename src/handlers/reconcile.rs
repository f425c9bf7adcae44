use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;

use crate::models::*;
use crate::AppState;

use super::{ApiError, PaginationQuery};

/// Run a reconciliation pass now and return its summary
pub async fn trigger_reconcile(State(state): State<Arc<AppState>>) -> Result<Json<PassSummary>, ApiError> {
    let settings = state.config.pass_settings()?;
    let summary = state.reconciler.run_pass(&settings).await?;
    Ok(Json(summary))
}

/// List recent passes, newest first
pub async fn list_runs(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<Vec<ReconcileRun>>, ApiError> {
    let (limit, _) = page.sanitize();
    let runs = state.store.list_runs(limit).await?;
    Ok(Json(runs))
}
