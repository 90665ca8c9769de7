//! Dispatch entry endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use spindle_core::{DispatchEntry, EntryFilter, EntryState, LayoutFamily};
use std::sync::Arc;

use super::middleware::AuthCaller;
use super::{page, parse_param, ApiResult};
use crate::state::AppState;

/// Query parameters for listing entries
#[derive(Debug, Deserialize)]
pub struct ListEntriesParams {
    pub machine_id: Option<String>,
    pub layout: Option<String>,
    /// `pending`, `active` or `finished`
    pub state: Option<String>,
    /// Entries fanned out from this winding ticket
    pub ticket_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Request body for finishing an entry
#[derive(Debug, Deserialize)]
pub struct FinishEntryBody {
    pub release_note: Option<String>,
    pub final_report: String,
}

#[derive(Debug, Serialize)]
pub struct ListEntriesResponse {
    pub entries: Vec<DispatchEntry>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

pub async fn list_entries(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListEntriesParams>,
) -> ApiResult<Json<ListEntriesResponse>> {
    let (limit, offset) = page(params.limit, params.offset);

    let mut filter = EntryFilter::new().with_limit(limit).with_offset(offset);
    if let Some(ref machine_id) = params.machine_id {
        filter = filter.with_machine(machine_id);
    }
    if let Some(layout) = parse_param::<LayoutFamily>(params.layout.as_deref())? {
        filter = filter.with_layout(layout);
    }
    if let Some(entry_state) = parse_param::<EntryState>(params.state.as_deref())? {
        filter = filter.with_state(entry_state);
    }
    if let Some(ref ticket_id) = params.ticket_id {
        filter = filter.with_ticket(ticket_id);
    }

    let queue = state.plant().queue();
    let entries = queue.list_entries(&filter)?;
    let total = queue.count_entries(&filter)?;

    Ok(Json(ListEntriesResponse {
        entries,
        total,
        limit,
        offset,
    }))
}

pub async fn get_entry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<DispatchEntry>> {
    Ok(Json(state.plant().queue().get_entry(&id)?))
}

pub async fn start_entry(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<String>,
) -> ApiResult<Json<DispatchEntry>> {
    Ok(Json(state.plant().queue().start(&caller, &id)?))
}

pub async fn finish_entry(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<String>,
    Json(body): Json<FinishEntryBody>,
) -> ApiResult<Json<DispatchEntry>> {
    let entry = state
        .plant()
        .queue()
        .finish(&caller, &id, body.release_note, &body.final_report)?;
    Ok(Json(entry))
}
