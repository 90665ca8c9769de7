use rusqlite::{params, Connection, OptionalExtension};

use crate::db::SqliteStore;
use crate::error::{storage, DispatchResult};

use super::{NumberingStore, DEFAULT_START_AFTER};

/// Advance `series` by one and return the new value, creating the series
/// at [`DEFAULT_START_AFTER`] + 1 if it does not exist yet.
pub(crate) fn draw_number(conn: &Connection, series: &str) -> rusqlite::Result<u64> {
    let value: i64 = conn.query_row(
        "INSERT INTO counters (name, value) VALUES (?1, ?2) \
         ON CONFLICT(name) DO UPDATE SET value = value + 1 \
         RETURNING value",
        params![series, DEFAULT_START_AFTER as i64 + 1],
        |row| row.get(0),
    )?;
    Ok(value as u64)
}

impl NumberingStore for SqliteStore {
    fn seed_series(&self, series: &str, start_after: u64) -> DispatchResult<bool> {
        let conn = self.conn()?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO counters (name, value) VALUES (?, ?)",
                params![series, start_after as i64],
            )
            .map_err(storage)?;
        Ok(inserted == 1)
    }

    fn next_number(&self, series: &str) -> DispatchResult<u64> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage)?;
        let number = draw_number(&tx, series).map_err(storage)?;
        tx.commit().map_err(storage)?;
        Ok(number)
    }

    fn current_number(&self, series: &str) -> DispatchResult<Option<u64>> {
        let conn = self.conn()?;
        let value: Option<i64> = conn
            .query_row(
                "SELECT value FROM counters WHERE name = ?",
                params![series],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage)?;
        Ok(value.map(|v| v as u64))
    }
}
