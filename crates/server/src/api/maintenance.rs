//! Maintenance window endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use spindle_core::{MaintenanceFilter, MaintenanceRecord};
use std::sync::Arc;

use super::middleware::AuthCaller;
use super::{page, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListMaintenanceParams {
    /// Only windows that are still open
    #[serde(default)]
    pub open: bool,
    pub machine_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct OpenMaintenanceBody {
    pub machine_id: String,
    pub reason: String,
}

pub async fn list_maintenance(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListMaintenanceParams>,
) -> ApiResult<Json<Vec<MaintenanceRecord>>> {
    let (limit, offset) = page(params.limit, params.offset);
    let mut filter = MaintenanceFilter::new().with_limit(limit).with_offset(offset);
    if params.open {
        filter = filter.open_only();
    }
    if let Some(ref machine_id) = params.machine_id {
        filter = filter.with_machine(machine_id);
    }
    Ok(Json(state.plant().maintenance().list(&filter)?))
}

pub async fn get_maintenance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<MaintenanceRecord>> {
    Ok(Json(state.plant().maintenance().get(&id)?))
}

pub async fn open_maintenance(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    Json(body): Json<OpenMaintenanceBody>,
) -> ApiResult<(StatusCode, Json<MaintenanceRecord>)> {
    let record = state
        .plant()
        .maintenance()
        .open(&caller, &body.machine_id, &body.reason)?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn close_maintenance(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<String>,
) -> ApiResult<Json<MaintenanceRecord>> {
    Ok(Json(state.plant().maintenance().close(&caller, &id)?))
}
