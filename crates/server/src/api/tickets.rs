//! Winding ticket endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use spindle_core::{
    AllocationRequest, FinalizeOutcome, StandaloneTicket, TicketFilter, TicketState,
    WindingTicket,
};
use std::sync::Arc;

use super::middleware::AuthCaller;
use super::{page, parse_param, ApiResult};
use crate::state::AppState;

/// Query parameters for listing tickets
#[derive(Debug, Deserialize)]
pub struct ListTicketsParams {
    /// Filter by state
    pub state: Option<String>,
    /// Tickets launched from this order
    pub order_id: Option<String>,
    /// Finished tickets are hidden unless asked for
    #[serde(default)]
    pub include_finished: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SetAllocationsBody {
    pub allocations: Vec<AllocationRequest>,
}

#[derive(Debug, Deserialize)]
pub struct AdvanceBody {
    pub target: TicketState,
}

#[derive(Debug, Serialize)]
pub struct ListTicketsResponse {
    pub tickets: Vec<WindingTicket>,
    pub limit: i64,
    pub offset: i64,
}

/// Open a ticket that is not tied to a production order.
pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    Json(body): Json<StandaloneTicket>,
) -> ApiResult<(StatusCode, Json<WindingTicket>)> {
    let ticket = state.plant().winding().launch_standalone(&caller, body)?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

/// List tickets, ordered by due date like the production board.
pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListTicketsParams>,
) -> ApiResult<Json<ListTicketsResponse>> {
    let (limit, offset) = page(params.limit, params.offset);

    let mut filter = TicketFilter::new().with_limit(limit).with_offset(offset);
    if params.include_finished {
        filter = filter.including_finished();
    }
    if let Some(ticket_state) = parse_param::<TicketState>(params.state.as_deref())? {
        filter = filter.with_state(ticket_state);
    }
    if let Some(ref order_id) = params.order_id {
        filter = filter.with_order(order_id);
    }

    let tickets = state.plant().winding().list(&filter)?;
    Ok(Json(ListTicketsResponse {
        tickets,
        limit,
        offset,
    }))
}

pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<WindingTicket>> {
    Ok(Json(state.plant().winding().get(&id)?))
}

/// Delete a ticket that is still pending. The order it came from is left
/// untouched.
pub async fn delete_ticket(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<String>,
) -> ApiResult<Json<WindingTicket>> {
    Ok(Json(state.plant().winding().delete(&caller, &id)?))
}

pub async fn set_allocations(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<String>,
    Json(body): Json<SetAllocationsBody>,
) -> ApiResult<Json<WindingTicket>> {
    let ticket = state
        .plant()
        .winding()
        .set_allocations(&caller, &id, body.allocations)?;
    Ok(Json(ticket))
}

pub async fn advance_ticket(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<String>,
    Json(body): Json<AdvanceBody>,
) -> ApiResult<Json<WindingTicket>> {
    let ticket = state
        .plant()
        .winding()
        .advance(&caller, &id, body.target)?;
    Ok(Json(ticket))
}

/// Send the ticket to its machines: one dispatch entry per allocation.
pub async fn finalize_ticket(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<String>,
) -> ApiResult<Json<FinalizeOutcome>> {
    let outcome = state
        .plant()
        .winding()
        .finalize_with_machines(&caller, &id)?;
    Ok(Json(outcome))
}

/// Legacy finish for tickets that were never allocated to machines.
pub async fn finish_ticket(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<String>,
) -> ApiResult<Json<WindingTicket>> {
    let ticket = state
        .plant()
        .winding()
        .finish_without_machines(&caller, &id)?;
    Ok(Json(ticket))
}
