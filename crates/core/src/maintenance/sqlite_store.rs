use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::{
    is_unique_violation, param_refs, parse_column, parse_optional_timestamp, parse_timestamp,
    where_clause, BoxedParams, SqliteStore,
};
use crate::dispatch::MachineStatus;
use crate::error::{storage, DispatchError, DispatchResult};
use crate::fleet::sqlite_store::require_machine;
use crate::history::{touch_machine, ChangeCause};

use super::{MaintenanceFilter, MaintenanceRecord, MaintenanceState, MaintenanceStore};

const RECORD_COLUMNS: &str =
    "id, machine_id, reason, state, created_at, created_by, finished_at, finished_by";

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<MaintenanceRecord> {
    let state: String = row.get(3)?;
    let created_at: String = row.get(4)?;

    Ok(MaintenanceRecord {
        id: row.get(0)?,
        machine_id: row.get(1)?,
        reason: row.get(2)?,
        state: parse_column(3, &state)?,
        created_at: parse_timestamp(4, &created_at)?,
        created_by: row.get(5)?,
        finished_at: parse_optional_timestamp(6, row.get(6)?)?,
        finished_by: row.get(7)?,
    })
}

fn load_record(conn: &Connection, id: &str) -> rusqlite::Result<Option<MaintenanceRecord>> {
    let sql = format!("SELECT {} FROM maintenance_records WHERE id = ?", RECORD_COLUMNS);
    conn.query_row(&sql, params![id], row_to_record).optional()
}

impl MaintenanceStore for SqliteStore {
    fn open_maintenance(
        &self,
        machine_id: &str,
        reason: &str,
        opened_by: &str,
    ) -> DispatchResult<MaintenanceRecord> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage)?;

        let before = require_machine(&tx, machine_id)?;
        if before.status != MachineStatus::Free {
            return Err(DispatchError::InvalidState(format!(
                "machine {} is {}; maintenance can only start on a free machine",
                before.code, before.status
            )));
        }

        let record = MaintenanceRecord {
            id: uuid::Uuid::new_v4().to_string(),
            machine_id: machine_id.to_string(),
            reason: reason.to_string(),
            state: MaintenanceState::Open,
            created_at: Utc::now(),
            created_by: opened_by.to_string(),
            finished_at: None,
            finished_by: None,
        };

        tx.execute(
            &format!(
                "INSERT INTO maintenance_records ({}) VALUES (?, ?, ?, ?, ?, ?, NULL, NULL)",
                RECORD_COLUMNS
            ),
            params![
                record.id,
                record.machine_id,
                record.reason,
                record.state.as_str(),
                record.created_at.to_rfc3339(),
                record.created_by,
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                DispatchError::Conflict(format!(
                    "machine {} already has an open maintenance record",
                    before.code
                ))
            } else {
                storage(e)
            }
        })?;

        let cause = ChangeCause::by(opened_by).with_maintenance(record.id.clone());
        touch_machine(&tx, &before, &cause).map_err(storage)?;

        tx.commit().map_err(storage)?;
        Ok(record)
    }

    fn close_maintenance(&self, id: &str, closed_by: &str) -> DispatchResult<MaintenanceRecord> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage)?;

        let record = load_record(&tx, id)
            .map_err(storage)?
            .ok_or_else(|| DispatchError::not_found("maintenance record", id))?;
        if !record.is_open() {
            return Err(DispatchError::InvalidState(format!(
                "maintenance record {} is already closed",
                id
            )));
        }

        let before = require_machine(&tx, &record.machine_id)?;
        tx.execute(
            "UPDATE maintenance_records SET state = 'closed', finished_at = ?, finished_by = ? \
             WHERE id = ?",
            params![Utc::now().to_rfc3339(), closed_by, id],
        )
        .map_err(storage)?;

        let cause = ChangeCause::by(closed_by).with_maintenance(id);
        touch_machine(&tx, &before, &cause).map_err(storage)?;

        let record = load_record(&tx, id)
            .map_err(storage)?
            .ok_or_else(|| DispatchError::not_found("maintenance record", id))?;
        tx.commit().map_err(storage)?;
        Ok(record)
    }

    fn get_maintenance(&self, id: &str) -> DispatchResult<Option<MaintenanceRecord>> {
        let conn = self.conn()?;
        load_record(&conn, id).map_err(storage)
    }

    fn list_maintenance(&self, filter: &MaintenanceFilter) -> DispatchResult<Vec<MaintenanceRecord>> {
        let conn = self.conn()?;

        let mut conditions = Vec::new();
        let mut params: BoxedParams = Vec::new();

        if let Some(ref machine_id) = filter.machine_id {
            conditions.push("machine_id = ?");
            params.push(Box::new(machine_id.clone()));
        }
        if filter.open_only {
            conditions.push("state = 'open'");
        }

        let sql = format!(
            "SELECT {} FROM maintenance_records {} ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
            RECORD_COLUMNS,
            where_clause(&conditions)
        );
        params.push(Box::new(filter.limit));
        params.push(Box::new(filter.offset));

        let mut stmt = conn.prepare(&sql).map_err(storage)?;
        let rows = stmt
            .query_map(param_refs(&params).as_slice(), row_to_record)
            .map_err(storage)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(storage)
    }
}
