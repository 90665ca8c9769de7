//! SQLite implementation of [`DispatchStore`].

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::{
    is_unique_violation, param_refs, parse_column, parse_optional_timestamp, parse_timestamp,
    where_clause, BoxedParams, SqliteStore,
};
use crate::error::{storage, DispatchError, DispatchResult};
use crate::fleet::sqlite_store::require_machine;
use crate::history::{touch_machine, ChangeCause};

use super::{DispatchEntry, DispatchStore, EntryFilter, EntryState, MachineStatus, NewEntry};

const ENTRY_COLUMNS: &str = "id, machine_id, client, article, color, quantity, note, state, \
     created_at, created_by, started_at, finished_at, release_note, final_report, ticket_id, os_number";

fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<DispatchEntry> {
    let state: String = row.get(7)?;
    let created_at: String = row.get(8)?;
    let os_number: Option<i64> = row.get(15)?;

    Ok(DispatchEntry {
        id: row.get(0)?,
        machine_id: row.get(1)?,
        client: row.get(2)?,
        article: row.get(3)?,
        color: row.get(4)?,
        quantity: row.get(5)?,
        note: row.get(6)?,
        state: parse_column(7, &state)?,
        created_at: parse_timestamp(8, &created_at)?,
        created_by: row.get(9)?,
        started_at: parse_optional_timestamp(10, row.get(10)?)?,
        finished_at: parse_optional_timestamp(11, row.get(11)?)?,
        release_note: row.get(12)?,
        final_report: row.get(13)?,
        ticket_id: row.get(14)?,
        os_number: os_number.map(|n| n as u64),
    })
}

fn load_entry(conn: &Connection, id: &str) -> rusqlite::Result<Option<DispatchEntry>> {
    let sql = format!("SELECT {} FROM dispatch_entries WHERE id = ?", ENTRY_COLUMNS);
    conn.query_row(&sql, params![id], row_to_entry).optional()
}

fn require_entry(conn: &Connection, id: &str) -> DispatchResult<DispatchEntry> {
    load_entry(conn, id)
        .map_err(storage)?
        .ok_or_else(|| DispatchError::not_found("dispatch entry", id))
}

/// Append an entry inside an open transaction. The machine must accept
/// entries (not disabled, not in maintenance). An entry asking to start
/// immediately only does so when the machine was free; otherwise it is
/// queued as pending.
pub(crate) fn insert_entry_tx(conn: &Connection, entry: NewEntry) -> DispatchResult<DispatchEntry> {
    let before = require_machine(conn, &entry.machine_id)?;
    if !before.status.accepts_entries() {
        return Err(DispatchError::InvalidState(format!(
            "machine {} is {} and does not accept entries",
            before.code, before.status
        )));
    }

    let mut entry = entry;
    entry.start_immediately = entry.start_immediately && before.status == MachineStatus::Free;
    let entry = entry.into_entry();

    conn.execute(
        &format!(
            "INSERT INTO dispatch_entries ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            ENTRY_COLUMNS
        ),
        params![
            entry.id,
            entry.machine_id,
            entry.client,
            entry.article,
            entry.color,
            entry.quantity,
            entry.note,
            entry.state.as_str(),
            entry.created_at.to_rfc3339(),
            entry.created_by,
            entry.started_at.map(|t| t.to_rfc3339()),
            Option::<String>::None,
            Option::<String>::None,
            Option::<String>::None,
            entry.ticket_id,
            entry.os_number.map(|n| n as i64),
        ],
    )
    .map_err(storage)?;

    let cause = ChangeCause::by(entry.created_by.clone()).with_entry(entry.id.clone());
    touch_machine(conn, &before, &cause).map_err(storage)?;

    Ok(entry)
}

fn filter_conditions(filter: &EntryFilter) -> (Vec<String>, BoxedParams) {
    let mut conditions = Vec::new();
    let mut params: BoxedParams = Vec::new();

    if let Some(ref machine_id) = filter.machine_id {
        conditions.push("machine_id = ?".to_string());
        params.push(Box::new(machine_id.clone()));
    }

    if let Some(layout) = filter.layout {
        conditions.push("machine_id IN (SELECT id FROM machines WHERE layout = ?)".to_string());
        params.push(Box::new(layout.as_str()));
    }

    if !filter.states.is_empty() {
        let placeholders = vec!["?"; filter.states.len()].join(", ");
        conditions.push(format!("state IN ({})", placeholders));
        for state in &filter.states {
            params.push(Box::new(state.as_str()));
        }
    }

    if let Some(ref ticket_id) = filter.ticket_id {
        conditions.push("ticket_id = ?".to_string());
        params.push(Box::new(ticket_id.clone()));
    }

    (conditions, params)
}

impl DispatchStore for SqliteStore {
    fn insert_entry(&self, entry: NewEntry) -> DispatchResult<DispatchEntry> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage)?;
        let entry = insert_entry_tx(&tx, entry)?;
        tx.commit().map_err(storage)?;
        Ok(entry)
    }

    fn get_entry(&self, id: &str) -> DispatchResult<Option<DispatchEntry>> {
        let conn = self.conn()?;
        load_entry(&conn, id).map_err(storage)
    }

    fn list_entries(&self, filter: &EntryFilter) -> DispatchResult<Vec<DispatchEntry>> {
        let conn = self.conn()?;
        let (conditions, mut params) = filter_conditions(filter);
        let conditions: Vec<&str> = conditions.iter().map(String::as_str).collect();

        let sql = format!(
            "SELECT {} FROM dispatch_entries {} ORDER BY created_at ASC, rowid ASC LIMIT ? OFFSET ?",
            ENTRY_COLUMNS,
            where_clause(&conditions)
        );
        params.push(Box::new(filter.limit));
        params.push(Box::new(filter.offset));

        let mut stmt = conn.prepare(&sql).map_err(storage)?;
        let rows = stmt
            .query_map(param_refs(&params).as_slice(), row_to_entry)
            .map_err(storage)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(storage)
    }

    fn count_entries(&self, filter: &EntryFilter) -> DispatchResult<i64> {
        let conn = self.conn()?;
        let (conditions, params) = filter_conditions(filter);
        let conditions: Vec<&str> = conditions.iter().map(String::as_str).collect();

        let sql = format!(
            "SELECT COUNT(*) FROM dispatch_entries {}",
            where_clause(&conditions)
        );
        conn.query_row(&sql, param_refs(&params).as_slice(), |row| row.get(0))
            .map_err(storage)
    }

    fn start_entry(&self, id: &str, started_by: &str) -> DispatchResult<DispatchEntry> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage)?;

        let entry = load_entry(&tx, id)
            .map_err(storage)?
            .filter(|e| e.state == EntryState::Pending)
            .ok_or_else(|| DispatchError::not_found("pending dispatch entry", id))?;

        let before = require_machine(&tx, &entry.machine_id)?;
        if !before.status.can_start_entries() {
            return Err(DispatchError::InvalidState(format!(
                "machine {} is {}",
                before.code, before.status
            )));
        }
        if before.status == MachineStatus::InProduction {
            return Err(DispatchError::Conflict(format!(
                "machine {} already has an active entry",
                before.code
            )));
        }

        let updated = tx
            .execute(
                "UPDATE dispatch_entries SET state = 'active', started_at = ? \
                 WHERE id = ? AND state = 'pending'",
                params![Utc::now().to_rfc3339(), id],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    DispatchError::Conflict(format!(
                        "machine {} already has an active entry",
                        before.code
                    ))
                } else {
                    storage(e)
                }
            })?;
        if updated == 0 {
            return Err(DispatchError::not_found("pending dispatch entry", id));
        }

        let cause = ChangeCause::by(started_by).with_entry(id);
        touch_machine(&tx, &before, &cause).map_err(storage)?;
        let entry = require_entry(&tx, id)?;

        tx.commit().map_err(storage)?;
        Ok(entry)
    }

    fn finish_entry(
        &self,
        id: &str,
        release_note: Option<String>,
        final_report: String,
        finished_by: &str,
    ) -> DispatchResult<DispatchEntry> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage)?;

        let entry = require_entry(&tx, id)?;
        if entry.state != EntryState::Active {
            return Err(DispatchError::Conflict(format!(
                "entry {} is {}, not active",
                id, entry.state
            )));
        }

        let before = require_machine(&tx, &entry.machine_id)?;
        tx.execute(
            "UPDATE dispatch_entries SET state = 'finished', finished_at = ?, release_note = ?, \
             final_report = ? WHERE id = ? AND state = 'active'",
            params![Utc::now().to_rfc3339(), release_note, final_report, id],
        )
        .map_err(storage)?;

        let cause = ChangeCause::by(finished_by).with_entry(id);
        touch_machine(&tx, &before, &cause).map_err(storage)?;
        let entry = require_entry(&tx, id)?;

        tx.commit().map_err(storage)?;
        Ok(entry)
    }
}
