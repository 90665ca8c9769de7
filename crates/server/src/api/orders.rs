//! Production order endpoints, including the shared ticket draft and
//! launching a winding ticket from an order.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use spindle_core::production::DraftAllocation;
use spindle_core::{OrderFields, OrderFilter, OrderState, ProductionOrder, TicketDetails, WindingTicket};
use std::sync::Arc;

use super::middleware::AuthCaller;
use super::{page, parse_param, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListOrdersParams {
    /// `pending`, `in_production` or `finished`
    pub state: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Request body for saving the ticket draft of an order
#[derive(Debug, Deserialize)]
pub struct SaveDraftBody {
    #[serde(flatten)]
    pub details: TicketDetails,
    #[serde(default)]
    pub allocations: Vec<DraftAllocation>,
}

pub async fn create_order(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    Json(fields): Json<OrderFields>,
) -> ApiResult<(StatusCode, Json<ProductionOrder>)> {
    let order = state.plant().orders().create(&caller, fields)?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListOrdersParams>,
) -> ApiResult<Json<Vec<ProductionOrder>>> {
    let (limit, offset) = page(params.limit, params.offset);
    let mut filter = OrderFilter::new().with_limit(limit).with_offset(offset);
    if let Some(order_state) = parse_param::<OrderState>(params.state.as_deref())? {
        filter = filter.with_state(order_state);
    }
    Ok(Json(state.plant().orders().list(&filter)?))
}

/// Orders still waiting for a winding ticket.
pub async fn list_pending_orders(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<ProductionOrder>>> {
    Ok(Json(state.plant().orders().list_pending()?))
}

/// Look an order up by id, or by OS number when the path is numeric.
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ProductionOrder>> {
    let orders = state.plant().orders();
    let order = match id.parse::<u64>() {
        Ok(number) => orders.get_by_number(number)?,
        Err(_) => orders.get(&id)?,
    };
    Ok(Json(order))
}

pub async fn save_draft(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<String>,
    Json(body): Json<SaveDraftBody>,
) -> ApiResult<Json<ProductionOrder>> {
    let order = state
        .plant()
        .orders()
        .save_draft(&caller, &id, body.details, body.allocations)?;
    Ok(Json(order))
}

pub async fn finish_order(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<String>,
) -> ApiResult<Json<ProductionOrder>> {
    Ok(Json(state.plant().orders().mark_finished(&caller, &id)?))
}

/// Open a winding ticket from an order, seeded from its draft.
pub async fn launch_ticket(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<WindingTicket>)> {
    let ticket = state.plant().winding().launch_from_order(&caller, &id)?;
    Ok((StatusCode::CREATED, Json(ticket)))
}
