use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::models::*;
use crate::utils::normalize_mac;
use crate::AppState;

use super::{ApiError, PaginationQuery};

#[derive(Debug, Deserialize)]
pub struct ClientFilter {
    #[serde(default)]
    pub include_retired: bool,
}

/// List known clients, active only unless `include_retired` is set
pub async fn list_clients(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ClientFilter>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<Vec<StoredClient>>, ApiError> {
    let (limit, offset) = page.sanitize();
    let clients = state
        .store
        .list_clients(filter.include_retired, limit, offset)
        .await?;
    Ok(Json(clients))
}

/// Get a single client by MAC, in any of the accepted notations
pub async fn get_client(
    State(state): State<Arc<AppState>>,
    Path(mac): Path<String>,
) -> Result<Json<StoredClient>, ApiError> {
    let mac = normalize_mac(&mac).ok_or_else(|| ApiError::bad_request("invalid MAC address"))?;
    let client = state.store.get_client(&mac).await?;
    Ok(Json(client))
}
