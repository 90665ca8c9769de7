use chrono::Utc;
use rusqlite::{params, Connection};

use crate::db::{
    param_refs, parse_column, parse_timestamp, where_clause, BoxedParams, SqliteStore,
};
use crate::error::{storage, DispatchResult};
use crate::fleet::sqlite_store::load_machine;
use crate::fleet::Machine;

use super::{ChangeCause, HistoryFilter, HistoryStore, StatusChange};

/// Finish a machine mutation inside its transaction: stamp a fresh
/// revision from the fleet-wide series, re-derive status, and append a
/// history row when the status moved. Returns the machine as it is now.
pub(crate) fn touch_machine(
    conn: &Connection,
    before: &Machine,
    cause: &ChangeCause,
) -> rusqlite::Result<Machine> {
    conn.execute(
        "INSERT INTO counters (name, value) VALUES ('fleet_revision', 1) \
         ON CONFLICT(name) DO UPDATE SET value = value + 1",
        [],
    )?;
    conn.execute(
        "UPDATE machines SET revision = (SELECT value FROM counters WHERE name = 'fleet_revision') \
         WHERE id = ?",
        params![before.id],
    )?;

    let after = load_machine(conn, &before.id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;

    if after.status != before.status {
        conn.execute(
            "INSERT INTO status_history (machine_id, machine_code, layout, old_status, new_status, \
             changed_by, changed_at, entry_id, maintenance_id) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                after.id,
                after.code,
                after.layout.as_str(),
                before.status.as_str(),
                after.status.as_str(),
                cause.changed_by,
                Utc::now().to_rfc3339(),
                cause.entry_id,
                cause.maintenance_id,
            ],
        )?;
        tracing::debug!(
            machine_id = %after.id,
            from = %before.status,
            to = %after.status,
            "Machine status changed"
        );
    }

    Ok(after)
}

fn row_to_change(row: &rusqlite::Row) -> rusqlite::Result<StatusChange> {
    let layout: String = row.get(3)?;
    let old_status: String = row.get(4)?;
    let new_status: String = row.get(5)?;
    let changed_at: String = row.get(7)?;

    Ok(StatusChange {
        id: row.get(0)?,
        machine_id: row.get(1)?,
        machine_code: row.get(2)?,
        layout: parse_column(3, &layout)?,
        old_status: parse_column(4, &old_status)?,
        new_status: parse_column(5, &new_status)?,
        changed_by: row.get(6)?,
        changed_at: parse_timestamp(7, &changed_at)?,
        entry_id: row.get(8)?,
        maintenance_id: row.get(9)?,
    })
}

impl HistoryStore for SqliteStore {
    fn list_history(&self, filter: &HistoryFilter) -> DispatchResult<Vec<StatusChange>> {
        let conn = self.conn()?;

        let mut conditions = Vec::new();
        let mut params: BoxedParams = Vec::new();

        if let Some(ref machine_id) = filter.machine_id {
            conditions.push("machine_id = ?");
            params.push(Box::new(machine_id.clone()));
        }

        if let Some(layout) = filter.layout {
            conditions.push("layout = ?");
            params.push(Box::new(layout.as_str()));
        }

        let sql = format!(
            "SELECT id, machine_id, machine_code, layout, old_status, new_status, changed_by, \
             changed_at, entry_id, maintenance_id FROM status_history {} \
             ORDER BY id DESC LIMIT ? OFFSET ?",
            where_clause(&conditions)
        );
        params.push(Box::new(filter.limit));
        params.push(Box::new(filter.offset));

        let mut stmt = conn.prepare(&sql).map_err(storage)?;
        let rows = stmt
            .query_map(param_refs(&params).as_slice(), row_to_change)
            .map_err(storage)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(storage)
    }
}
