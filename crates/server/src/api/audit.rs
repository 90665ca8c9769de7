//! Audit trail endpoint.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spindle_core::{AuditFilter, AuditRecord, DispatchError, MachineRef, SubjectKind};
use std::sync::Arc;

use super::{page, parse_param, ApiError, ApiResult};
use crate::state::AppState;

/// Query parameters for `GET /audit`
#[derive(Debug, Deserialize)]
pub struct AuditQueryParams {
    /// Floor trail of one machine: a full id (`b-U3`) or an unambiguous code (`CD1`)
    pub machine: Option<String>,
    /// `machine`, `maintenance`, `entry`, `order` or `ticket`
    pub subject: Option<String>,
    pub subject_id: Option<String>,
    /// `entry_started`, `ticket_finalized`, ...
    pub event_type: Option<String>,
    pub user_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct AuditQueryResponse {
    pub events: Vec<AuditRecord>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

impl AuditQueryParams {
    fn into_filter(self, state: &AppState) -> ApiResult<AuditFilter> {
        let mut filter = AuditFilter::new().between(self.from, self.to);
        if let Some(kind) = parse_param::<SubjectKind>(self.subject.as_deref())? {
            filter = filter.of_kind(kind);
        }
        if let Some(reference) = self.machine {
            let machine = state.plant().registry().resolve(&MachineRef::new(reference))?;
            filter = filter.on_machine(machine.id);
        }
        if let Some(subject_id) = self.subject_id {
            filter = filter.about(subject_id);
        }
        if let Some(event_type) = self.event_type {
            filter = filter.event(event_type);
        }
        if let Some(user_id) = self.user_id {
            filter = filter.by_user(user_id);
        }
        Ok(filter)
    }
}

fn storage(e: impl std::fmt::Display) -> ApiError {
    ApiError(DispatchError::Storage(format!("audit trail: {}", e)))
}

pub async fn query_audit(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuditQueryParams>,
) -> ApiResult<Json<AuditQueryResponse>> {
    let (limit, offset) = page(params.limit, params.offset);
    let filter = params.into_filter(&state)?;

    let store = state.audit_store();
    let total = store.count(&filter).map_err(storage)?;
    let events = store
        .query(&filter.page(limit, offset))
        .map_err(storage)?;

    Ok(Json(AuditQueryResponse {
        events,
        total,
        limit,
        offset,
    }))
}
