use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::{
    param_refs, parse_column, parse_date, parse_json, parse_optional_timestamp, parse_timestamp,
    where_clause, BoxedParams, SqliteStore,
};
use crate::error::{storage, DispatchError, DispatchResult};
use crate::numbering::{draw_number, DOCUMENT_SERIES};
use crate::quantity::Quantity;

use super::{OrderFields, OrderFilter, OrderState, OrderStore, ProductionOrder, TicketDraft};

const ORDER_COLUMNS: &str = "id, number, client, article, color, meters, due_date, note, state, \
     created_at, created_by, started_at, finished_at, draft";

fn row_to_order(row: &rusqlite::Row) -> rusqlite::Result<ProductionOrder> {
    let number: i64 = row.get(1)?;
    let meters: i64 = row.get(5)?;
    let due_date: String = row.get(6)?;
    let state: String = row.get(8)?;
    let created_at: String = row.get(9)?;
    let draft: Option<String> = row.get(13)?;

    Ok(ProductionOrder {
        id: row.get(0)?,
        number: number as u64,
        client: row.get(2)?,
        article: row.get(3)?,
        color: row.get(4)?,
        meters: Quantity::new(meters as u64),
        due_date: parse_date(6, &due_date)?,
        note: row.get(7)?,
        state: parse_column(8, &state)?,
        created_at: parse_timestamp(9, &created_at)?,
        created_by: row.get(10)?,
        started_at: parse_optional_timestamp(11, row.get(11)?)?,
        finished_at: parse_optional_timestamp(12, row.get(12)?)?,
        draft: draft.map(|raw| parse_json(13, &raw)).transpose()?,
    })
}

pub(crate) fn load_order(conn: &Connection, id: &str) -> rusqlite::Result<Option<ProductionOrder>> {
    let sql = format!("SELECT {} FROM production_orders WHERE id = ?", ORDER_COLUMNS);
    conn.query_row(&sql, params![id], row_to_order).optional()
}

pub(crate) fn require_order(conn: &Connection, id: &str) -> DispatchResult<ProductionOrder> {
    load_order(conn, id)
        .map_err(storage)?
        .ok_or_else(|| DispatchError::not_found("production order", id))
}

/// Move a pending order to in_production inside an open transaction.
/// Returns whether the order changed. Orders already past pending are left
/// alone.
pub(crate) fn mark_in_production_tx(conn: &Connection, id: &str) -> DispatchResult<bool> {
    let updated = conn
        .execute(
            "UPDATE production_orders SET state = 'in_production', started_at = ? \
             WHERE id = ? AND state = 'pending'",
            params![Utc::now().to_rfc3339(), id],
        )
        .map_err(storage)?;
    Ok(updated == 1)
}

fn query_orders(
    conn: &Connection,
    sql: &str,
    params: &BoxedParams,
) -> DispatchResult<Vec<ProductionOrder>> {
    let mut stmt = conn.prepare(sql).map_err(storage)?;
    let rows = stmt
        .query_map(param_refs(params).as_slice(), row_to_order)
        .map_err(storage)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(storage)
}

impl OrderStore for SqliteStore {
    fn create_order(&self, fields: &OrderFields, created_by: &str) -> DispatchResult<ProductionOrder> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage)?;

        let number = draw_number(&tx, DOCUMENT_SERIES).map_err(storage)?;
        let order = ProductionOrder {
            id: uuid::Uuid::new_v4().to_string(),
            number,
            client: fields.client.trim().to_string(),
            article: fields.article.trim().to_string(),
            color: fields.color.trim().to_string(),
            meters: fields.meters,
            due_date: fields.due_date,
            note: fields.note.clone(),
            state: OrderState::Pending,
            created_at: Utc::now(),
            created_by: created_by.to_string(),
            started_at: None,
            finished_at: None,
            draft: None,
        };

        tx.execute(
            &format!(
                "INSERT INTO production_orders ({}) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, NULL, NULL)",
                ORDER_COLUMNS
            ),
            params![
                order.id,
                order.number as i64,
                order.client,
                order.article,
                order.color,
                order.meters.value() as i64,
                order.due_date.format("%Y-%m-%d").to_string(),
                order.note,
                order.state.as_str(),
                order.created_at.to_rfc3339(),
                order.created_by,
            ],
        )
        .map_err(storage)?;

        tx.commit().map_err(storage)?;
        Ok(order)
    }

    fn get_order(&self, id: &str) -> DispatchResult<Option<ProductionOrder>> {
        let conn = self.conn()?;
        load_order(&conn, id).map_err(storage)
    }

    fn get_order_by_number(&self, number: u64) -> DispatchResult<Option<ProductionOrder>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM production_orders WHERE number = ?", ORDER_COLUMNS);
        conn.query_row(&sql, params![number as i64], row_to_order)
            .optional()
            .map_err(storage)
    }

    fn list_orders(&self, filter: &OrderFilter) -> DispatchResult<Vec<ProductionOrder>> {
        let conn = self.conn()?;

        let mut params: BoxedParams = Vec::new();
        let mut condition = String::new();
        if !filter.states.is_empty() {
            condition = format!("state IN ({})", vec!["?"; filter.states.len()].join(", "));
            for state in &filter.states {
                params.push(Box::new(state.as_str()));
            }
        }
        let conditions: Vec<&str> = if condition.is_empty() {
            Vec::new()
        } else {
            vec![condition.as_str()]
        };

        let sql = format!(
            "SELECT {} FROM production_orders {} ORDER BY number ASC LIMIT ? OFFSET ?",
            ORDER_COLUMNS,
            where_clause(&conditions)
        );
        params.push(Box::new(filter.limit));
        params.push(Box::new(filter.offset));

        query_orders(&conn, &sql, &params)
    }

    fn list_pending_orders(&self) -> DispatchResult<Vec<ProductionOrder>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM production_orders WHERE state = 'pending' \
             ORDER BY due_date ASC, number ASC",
            ORDER_COLUMNS
        );
        query_orders(&conn, &sql, &Vec::new())
    }

    fn mark_order_in_production(&self, id: &str) -> DispatchResult<(ProductionOrder, bool)> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage)?;

        let order = require_order(&tx, id)?;
        if order.state == OrderState::Finished {
            return Err(DispatchError::InvalidState(format!(
                "order #{} is already finished",
                order.number
            )));
        }
        let changed = mark_in_production_tx(&tx, id)?;
        let order = require_order(&tx, id)?;

        tx.commit().map_err(storage)?;
        Ok((order, changed))
    }

    fn mark_order_finished(&self, id: &str) -> DispatchResult<(ProductionOrder, bool)> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage)?;

        let order = require_order(&tx, id)?;
        let changed = match order.state {
            OrderState::Finished => false,
            OrderState::Pending => {
                return Err(DispatchError::InvalidState(format!(
                    "order #{} has not gone into production",
                    order.number
                )))
            }
            OrderState::InProduction => {
                tx.execute(
                    "UPDATE production_orders SET state = 'finished', finished_at = ? \
                     WHERE id = ? AND state = 'in_production'",
                    params![Utc::now().to_rfc3339(), id],
                )
                .map_err(storage)?;
                true
            }
        };
        let order = require_order(&tx, id)?;

        tx.commit().map_err(storage)?;
        Ok((order, changed))
    }

    fn save_order_draft(&self, id: &str, draft: &TicketDraft) -> DispatchResult<ProductionOrder> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage)?;

        let order = require_order(&tx, id)?;
        if order.state == OrderState::Finished {
            return Err(DispatchError::InvalidState(format!(
                "order #{} is finished; its draft can no longer change",
                order.number
            )));
        }

        let raw = serde_json::to_string(draft).map_err(storage)?;
        tx.execute(
            "UPDATE production_orders SET draft = ? WHERE id = ?",
            params![raw, id],
        )
        .map_err(storage)?;
        let order = require_order(&tx, id)?;

        tx.commit().map_err(storage)?;
        Ok(order)
    }
}
