//! Machine registry and per-machine queue endpoints.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use spindle_core::{DispatchEntry, EntryFields, LayoutFamily, Machine, MachineListing};
use std::sync::Arc;

use super::middleware::AuthCaller;
use super::{parse_param, ApiResult};
use crate::state::AppState;

/// Query parameters for listing machines
#[derive(Debug, Deserialize)]
pub struct ListMachinesParams {
    /// `a` or `b`; the whole fleet when absent
    pub layout: Option<String>,
}

/// Request body for toggling activation
#[derive(Debug, Deserialize)]
pub struct SetActiveBody {
    pub active: bool,
}

/// Strong validator for a listing. The version only grows, so a matching
/// tag means nothing in the layout changed.
fn listing_etag(listing: &MachineListing) -> String {
    let scope = listing.layout.map(|l| l.as_str()).unwrap_or("all");
    format!("\"{}-{}\"", scope, listing.version)
}

/// List machines with their derived status.
///
/// Answers 304 when `If-None-Match` carries the current ETag.
pub async fn list_machines(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListMachinesParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let layout = parse_param::<LayoutFamily>(params.layout.as_deref())?;
    let listing = state.plant().registry().list_machines(layout)?;
    let etag = listing_etag(&listing);

    let fresh = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').any(|tag| tag.trim() == etag))
        .unwrap_or(false);

    let mut response = if fresh {
        StatusCode::NOT_MODIFIED.into_response()
    } else {
        Json(listing).into_response()
    };
    if let Ok(value) = HeaderValue::from_str(&etag) {
        response.headers_mut().insert(header::ETAG, value);
    }
    Ok(response)
}

pub async fn get_machine(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Machine>> {
    Ok(Json(state.plant().registry().get_machine(&id)?))
}

pub async fn set_active(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<String>,
    Json(body): Json<SetActiveBody>,
) -> ApiResult<Json<Machine>> {
    let machine = state
        .plant()
        .registry()
        .set_active(&caller, &id, body.active)?;
    Ok(Json(machine))
}

/// Pending and active entries of one machine, oldest first.
pub async fn get_queue(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<DispatchEntry>>> {
    Ok(Json(state.plant().queue().list_queue(&id)?))
}

pub async fn enqueue(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<String>,
    Json(fields): Json<EntryFields>,
) -> ApiResult<(StatusCode, Json<DispatchEntry>)> {
    let entry = state.plant().queue().enqueue(&caller, &id, fields)?;
    Ok((StatusCode::CREATED, Json(entry)))
}
