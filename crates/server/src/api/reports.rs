//! Read-only reporting endpoints. All of them need the `reports` permission.
//! Bulk lists answer `{rows, truncated}`.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use spindle_core::reports::{LayoutReport, ReportRows, TicketProduction};
use spindle_core::{LayoutFamily, MaintenanceRecord, ProductionOrder, WindingTicket};
use std::sync::Arc;

use super::middleware::AuthCaller;
use super::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MaintenanceReportParams {
    pub machine_id: Option<String>,
}

/// Fan-in of a ticket: its allocations and the entries created from them.
pub async fn ticket_production(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<String>,
) -> ApiResult<Json<TicketProduction>> {
    Ok(Json(state.plant().reports().ticket_production(&caller, &id)?))
}

pub async fn layout_report(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    Path(layout): Path<String>,
) -> ApiResult<Json<LayoutReport>> {
    let layout = layout
        .parse::<LayoutFamily>()
        .map_err(ApiError::bad_parameter)?;
    Ok(Json(state.plant().reports().layout_report(&caller, layout)?))
}

pub async fn finished_tickets(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
) -> ApiResult<Json<ReportRows<WindingTicket>>> {
    Ok(Json(state.plant().reports().finished_tickets(&caller)?))
}

pub async fn finished_orders(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
) -> ApiResult<Json<ReportRows<ProductionOrder>>> {
    Ok(Json(state.plant().reports().finished_orders(&caller)?))
}

pub async fn maintenance_history(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    Query(params): Query<MaintenanceReportParams>,
) -> ApiResult<Json<ReportRows<MaintenanceRecord>>> {
    let history = state
        .plant()
        .reports()
        .maintenance_history(&caller, params.machine_id.as_deref())?;
    Ok(Json(history))
}
