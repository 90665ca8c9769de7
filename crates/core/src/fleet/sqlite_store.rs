//! SQLite implementation of [`MachineStore`].

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::{parse_column, parse_timestamp, SqliteStore};
use crate::dispatch::{derive_status, StatusInputs};
use crate::error::{storage, DispatchError, DispatchResult};
use crate::history::{touch_machine, ChangeCause};

use super::{LayoutFamily, Machine, MachineStore, NewMachine};

/// Columns plus the three status inputs derived from related tables.
const MACHINE_SELECT: &str = r#"
    SELECT m.id, m.code, m.layout, m.position, m.active, m.revision, m.created_at,
        EXISTS (SELECT 1 FROM maintenance_records r
                WHERE r.machine_id = m.id AND r.state = 'open'),
        (SELECT COUNT(*) FROM dispatch_entries e
                WHERE e.machine_id = m.id AND e.state = 'active'),
        (SELECT COUNT(*) FROM dispatch_entries e
                WHERE e.machine_id = m.id AND e.state = 'pending')
    FROM machines m
"#;

fn row_to_machine(row: &rusqlite::Row) -> rusqlite::Result<Machine> {
    let layout_str: String = row.get(2)?;
    let created_at_str: String = row.get(6)?;
    let active: bool = row.get(4)?;

    let inputs = StatusInputs {
        active,
        open_maintenance: row.get(7)?,
        active_entries: row.get(8)?,
        pending_entries: row.get(9)?,
    };

    Ok(Machine {
        id: row.get(0)?,
        code: row.get(1)?,
        layout: parse_column(2, &layout_str)?,
        position: row.get(3)?,
        active,
        status: derive_status(&inputs),
        revision: row.get(5)?,
        created_at: parse_timestamp(6, &created_at_str)?,
    })
}

/// Load one machine with its derived status. Works on a plain connection
/// or inside a transaction.
pub(crate) fn load_machine(conn: &Connection, id: &str) -> rusqlite::Result<Option<Machine>> {
    let sql = format!("{} WHERE m.id = ?", MACHINE_SELECT);
    conn.query_row(&sql, params![id], row_to_machine).optional()
}

/// Like [`load_machine`] but a missing machine is a `NotFound` error.
pub(crate) fn require_machine(conn: &Connection, id: &str) -> DispatchResult<Machine> {
    load_machine(conn, id)
        .map_err(storage)?
        .ok_or_else(|| DispatchError::not_found("machine", id))
}

impl MachineStore for SqliteStore {
    fn provision_machines(&self, machines: &[NewMachine]) -> DispatchResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage)?;
        let now = Utc::now().to_rfc3339();

        let mut inserted = 0;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR IGNORE INTO machines (id, code, layout, position, active, revision, created_at) \
                     VALUES (?, ?, ?, ?, 1, 0, ?)",
                )
                .map_err(storage)?;
            for machine in machines {
                inserted += stmt
                    .execute(params![
                        machine.id(),
                        machine.code,
                        machine.layout.as_str(),
                        machine.position,
                        now,
                    ])
                    .map_err(storage)?;
            }
        }

        tx.commit().map_err(storage)?;
        Ok(inserted)
    }

    fn count_machines(&self) -> DispatchResult<i64> {
        let conn = self.conn()?;
        conn.query_row("SELECT COUNT(*) FROM machines", [], |row| row.get(0))
            .map_err(storage)
    }

    fn get_machine(&self, id: &str) -> DispatchResult<Option<Machine>> {
        let conn = self.conn()?;
        load_machine(&conn, id).map_err(storage)
    }

    fn find_machines_by_code(
        &self,
        code: &str,
        layout: Option<LayoutFamily>,
    ) -> DispatchResult<Vec<Machine>> {
        let conn = self.conn()?;
        let sql = format!(
            "{} WHERE m.code = ? COLLATE NOCASE AND (?2 IS NULL OR m.layout = ?2) ORDER BY m.layout",
            MACHINE_SELECT
        );
        let mut stmt = conn.prepare(&sql).map_err(storage)?;
        let rows = stmt
            .query_map(params![code.trim(), layout.map(|l| l.as_str())], row_to_machine)
            .map_err(storage)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(storage)
    }

    fn list_machines(&self, layout: Option<LayoutFamily>) -> DispatchResult<Vec<Machine>> {
        let conn = self.conn()?;
        let sql = format!(
            "{} WHERE (?1 IS NULL OR m.layout = ?1) ORDER BY m.layout, m.position",
            MACHINE_SELECT
        );
        let mut stmt = conn.prepare(&sql).map_err(storage)?;
        let rows = stmt
            .query_map(params![layout.map(|l| l.as_str())], row_to_machine)
            .map_err(storage)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(storage)
    }

    fn set_machine_active(
        &self,
        id: &str,
        active: bool,
        changed_by: &str,
    ) -> DispatchResult<Machine> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage)?;

        let before = require_machine(&tx, id)?;
        tx.execute(
            "UPDATE machines SET active = ? WHERE id = ?",
            params![active, id],
        )
        .map_err(storage)?;
        let after = touch_machine(&tx, &before, &ChangeCause::by(changed_by)).map_err(storage)?;

        tx.commit().map_err(storage)?;
        Ok(after)
    }
}
