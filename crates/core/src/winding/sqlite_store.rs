use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::{
    param_refs, parse_column, parse_date, parse_json, parse_optional_timestamp, parse_timestamp,
    where_clause, BoxedParams, SqliteStore,
};
use crate::dispatch::{insert_entry_tx, NewEntry};
use crate::error::{storage, DispatchError, DispatchResult};
use crate::numbering::{draw_number, DOCUMENT_SERIES};
use crate::production::sqlite_store::{mark_in_production_tx, require_order};
use crate::production::OrderState;
use crate::quantity::Quantity;

use super::{
    FinalizeOutcome, FinalizeRecord, MachineAllocation, StandaloneTicket, TicketDetails,
    TicketFilter, TicketSeed, TicketState, WindingStore, WindingTicket,
};

const TICKET_COLUMNS: &str = "id, os_number, order_id, client, article, color, machine_label, \
     raw_material, thread_count, meters, load, load_fractions, note, due_date, state, \
     allocations, created_at, created_by, started_at, finished_at";

fn row_to_ticket(row: &rusqlite::Row) -> rusqlite::Result<WindingTicket> {
    let os_number: i64 = row.get(1)?;
    let meters: i64 = row.get(9)?;
    let load_fractions: String = row.get(11)?;
    let due_date: Option<String> = row.get(13)?;
    let state: String = row.get(14)?;
    let allocations: String = row.get(15)?;
    let created_at: String = row.get(16)?;

    Ok(WindingTicket {
        id: row.get(0)?,
        os_number: os_number as u64,
        order_id: row.get(2)?,
        client: row.get(3)?,
        article: row.get(4)?,
        color: row.get(5)?,
        meters: Quantity::new(meters as u64),
        due_date: due_date.map(|raw| parse_date(13, &raw)).transpose()?,
        details: TicketDetails {
            machine_label: row.get(6)?,
            raw_material: row.get(7)?,
            thread_count: row.get(8)?,
            load: row.get(10)?,
            load_fractions: parse_json(11, &load_fractions)?,
            note: row.get(12)?,
        },
        state: parse_column(14, &state)?,
        allocations: parse_json(15, &allocations)?,
        created_at: parse_timestamp(16, &created_at)?,
        created_by: row.get(17)?,
        started_at: parse_optional_timestamp(18, row.get(18)?)?,
        finished_at: parse_optional_timestamp(19, row.get(19)?)?,
    })
}

fn load_ticket(conn: &Connection, id: &str) -> rusqlite::Result<Option<WindingTicket>> {
    let sql = format!("SELECT {} FROM winding_tickets WHERE id = ?", TICKET_COLUMNS);
    conn.query_row(&sql, params![id], row_to_ticket).optional()
}

fn require_ticket(conn: &Connection, id: &str) -> DispatchResult<WindingTicket> {
    load_ticket(conn, id)
        .map_err(storage)?
        .ok_or_else(|| DispatchError::not_found("winding ticket", id))
}

fn insert_ticket(conn: &Connection, ticket: &WindingTicket) -> DispatchResult<()> {
    let load_fractions = serde_json::to_string(&ticket.details.load_fractions).map_err(storage)?;
    let allocations = serde_json::to_string(&ticket.allocations).map_err(storage)?;

    conn.execute(
        &format!(
            "INSERT INTO winding_tickets ({}) VALUES \
             (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, NULL)",
            TICKET_COLUMNS
        ),
        params![
            ticket.id,
            ticket.os_number as i64,
            ticket.order_id,
            ticket.client,
            ticket.article,
            ticket.color,
            ticket.details.machine_label,
            ticket.details.raw_material,
            ticket.details.thread_count,
            ticket.meters.value() as i64,
            ticket.details.load,
            load_fractions,
            ticket.details.note,
            ticket.due_date.map(|d| d.format("%Y-%m-%d").to_string()),
            ticket.state.as_str(),
            allocations,
            ticket.created_at.to_rfc3339(),
            ticket.created_by,
        ],
    )
    .map_err(storage)?;
    Ok(())
}

fn set_state(
    conn: &Connection,
    id: &str,
    from: TicketState,
    to: TicketState,
) -> DispatchResult<()> {
    let now = Utc::now().to_rfc3339();
    let updated = match to {
        TicketState::InProduction => conn.execute(
            "UPDATE winding_tickets SET state = ?, started_at = ? WHERE id = ? AND state = ?",
            params![to.as_str(), now, id, from.as_str()],
        ),
        TicketState::Finished => conn.execute(
            "UPDATE winding_tickets SET state = ?, finished_at = ? WHERE id = ? AND state = ?",
            params![to.as_str(), now, id, from.as_str()],
        ),
        _ => conn.execute(
            "UPDATE winding_tickets SET state = ? WHERE id = ? AND state = ?",
            params![to.as_str(), id, from.as_str()],
        ),
    }
    .map_err(storage)?;
    if updated != 1 {
        return Err(DispatchError::Conflict(format!(
            "ticket {} changed state concurrently",
            id
        )));
    }
    Ok(())
}

impl WindingStore for SqliteStore {
    fn launch_from_order(
        &self,
        order_id: &str,
        seed: TicketSeed,
        created_by: &str,
    ) -> DispatchResult<(WindingTicket, bool)> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage)?;

        let order = require_order(&tx, order_id)?;
        if order.state == OrderState::Finished {
            return Err(DispatchError::InvalidState(format!(
                "order #{} is finished",
                order.number
            )));
        }

        let ticket = WindingTicket {
            id: uuid::Uuid::new_v4().to_string(),
            os_number: order.number,
            order_id: Some(order.id.clone()),
            client: order.client,
            article: order.article,
            color: order.color,
            meters: order.meters,
            due_date: Some(order.due_date),
            details: seed.details,
            state: TicketState::Pending,
            allocations: seed.allocations,
            created_at: Utc::now(),
            created_by: created_by.to_string(),
            started_at: None,
            finished_at: None,
        };
        insert_ticket(&tx, &ticket)?;
        let order_marked = mark_in_production_tx(&tx, order_id)?;

        tx.commit().map_err(storage)?;
        Ok((ticket, order_marked))
    }

    fn launch_standalone(
        &self,
        input: &StandaloneTicket,
        created_by: &str,
    ) -> DispatchResult<WindingTicket> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage)?;

        let os_number = draw_number(&tx, DOCUMENT_SERIES).map_err(storage)?;
        let ticket = WindingTicket {
            id: uuid::Uuid::new_v4().to_string(),
            os_number,
            order_id: None,
            client: input.client.trim().to_string(),
            article: input.article.trim().to_string(),
            color: input.color.trim().to_string(),
            meters: input.meters,
            due_date: input.due_date,
            details: input.details.clone(),
            state: TicketState::Pending,
            allocations: Vec::new(),
            created_at: Utc::now(),
            created_by: created_by.to_string(),
            started_at: None,
            finished_at: None,
        };
        insert_ticket(&tx, &ticket)?;

        tx.commit().map_err(storage)?;
        Ok(ticket)
    }

    fn get_ticket(&self, id: &str) -> DispatchResult<Option<WindingTicket>> {
        let conn = self.conn()?;
        load_ticket(&conn, id).map_err(storage)
    }

    fn list_tickets(&self, filter: &TicketFilter) -> DispatchResult<Vec<WindingTicket>> {
        let conn = self.conn()?;

        let mut conditions = Vec::new();
        let mut params: BoxedParams = Vec::new();

        let states: Vec<TicketState> = if filter.states.is_empty() {
            TicketState::ALL
                .into_iter()
                .filter(|s| filter.include_finished || *s != TicketState::Finished)
                .collect()
        } else {
            filter.states.clone()
        };
        let state_condition = format!("state IN ({})", vec!["?"; states.len()].join(", "));
        conditions.push(state_condition.as_str());
        for state in &states {
            params.push(Box::new(state.as_str()));
        }

        if let Some(ref order_id) = filter.order_id {
            conditions.push("order_id = ?");
            params.push(Box::new(order_id.clone()));
        }

        let sql = format!(
            "SELECT {} FROM winding_tickets {} \
             ORDER BY due_date IS NULL, due_date ASC, os_number ASC, created_at ASC \
             LIMIT ? OFFSET ?",
            TICKET_COLUMNS,
            where_clause(&conditions)
        );
        params.push(Box::new(filter.limit));
        params.push(Box::new(filter.offset));

        let mut stmt = conn.prepare(&sql).map_err(storage)?;
        let rows = stmt
            .query_map(param_refs(&params).as_slice(), row_to_ticket)
            .map_err(storage)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(storage)
    }

    fn set_ticket_allocations(
        &self,
        id: &str,
        allocations: &[MachineAllocation],
    ) -> DispatchResult<WindingTicket> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage)?;

        let ticket = require_ticket(&tx, id)?;
        if ticket.state != TicketState::Pending {
            return Err(DispatchError::InvalidState(format!(
                "ticket {} is {}; allocations are frozen once it leaves pending",
                ticket.os_number, ticket.state
            )));
        }

        let raw = serde_json::to_string(allocations).map_err(storage)?;
        tx.execute(
            "UPDATE winding_tickets SET allocations = ? WHERE id = ?",
            params![raw, id],
        )
        .map_err(storage)?;
        let ticket = require_ticket(&tx, id)?;

        tx.commit().map_err(storage)?;
        Ok(ticket)
    }

    fn advance_ticket(
        &self,
        id: &str,
        target: TicketState,
    ) -> DispatchResult<(WindingTicket, TicketState)> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage)?;

        let ticket = require_ticket(&tx, id)?;
        ticket.state.check_advance(target)?;
        set_state(&tx, id, ticket.state, target)?;
        let advanced = require_ticket(&tx, id)?;

        tx.commit().map_err(storage)?;
        Ok((advanced, ticket.state))
    }

    fn finalize_ticket(
        &self,
        id: &str,
        finalized_by: &str,
        auto_start_idle: bool,
    ) -> DispatchResult<FinalizeRecord> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage)?;

        let ticket = require_ticket(&tx, id)?;
        ticket.check_finalizable()?;

        let mut created_entries = Vec::with_capacity(ticket.allocations.len());
        for allocation in &ticket.allocations {
            let entry = NewEntry {
                id: uuid::Uuid::new_v4().to_string(),
                machine_id: allocation.machine_id.clone(),
                fields: ticket.entry_fields(allocation),
                created_by: finalized_by.to_string(),
                created_at: Utc::now(),
                ticket_id: Some(ticket.id.clone()),
                os_number: Some(ticket.os_number),
                start_immediately: auto_start_idle,
            };
            created_entries.push(insert_entry_tx(&tx, entry)?);
        }

        set_state(&tx, id, TicketState::InProduction, TicketState::Finished)?;
        let order_marked = match ticket.order_id {
            Some(ref order_id) => mark_in_production_tx(&tx, order_id)?,
            None => false,
        };
        let ticket = require_ticket(&tx, id)?;

        tx.commit().map_err(storage)?;
        Ok(FinalizeRecord {
            outcome: FinalizeOutcome {
                ticket,
                created_entries,
            },
            order_marked,
        })
    }

    fn finish_ticket_without_machines(&self, id: &str) -> DispatchResult<WindingTicket> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage)?;

        let ticket = require_ticket(&tx, id)?;
        if ticket.state != TicketState::InProduction {
            return Err(DispatchError::InvalidState(format!(
                "ticket {} is {}; only in_production tickets can be finished",
                ticket.os_number, ticket.state
            )));
        }
        if !ticket.allocations.is_empty() {
            return Err(DispatchError::PreconditionFailed(format!(
                "ticket {} has {} allocations; send it to its machines instead",
                ticket.os_number,
                ticket.allocations.len()
            )));
        }

        set_state(&tx, id, TicketState::InProduction, TicketState::Finished)?;
        let ticket = require_ticket(&tx, id)?;

        tx.commit().map_err(storage)?;
        Ok(ticket)
    }

    fn delete_ticket(&self, id: &str) -> DispatchResult<WindingTicket> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage)?;

        let ticket = require_ticket(&tx, id)?;
        if ticket.state != TicketState::Pending {
            return Err(DispatchError::InvalidState(format!(
                "ticket {} is {}; only pending tickets can be deleted",
                ticket.os_number, ticket.state
            )));
        }
        tx.execute("DELETE FROM winding_tickets WHERE id = ?", params![id])
            .map_err(storage)?;

        tx.commit().map_err(storage)?;
        Ok(ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{DispatchStore, EntryFilter, EntryState, MachineStatus};
    use crate::fleet::{FleetCatalog, LayoutFamily, MachineStore};
    use crate::numbering::NumberingStore;
    use crate::production::{OrderFields, OrderStore};
    use chrono::NaiveDate;

    fn store() -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        store
            .provision_machines(&FleetCatalog::default().machines())
            .unwrap();
        store.seed_series(DOCUMENT_SERIES, 1000).unwrap();
        store
    }

    fn allocation(id: &str, quantity: u64) -> MachineAllocation {
        let code = id.split_once('-').map(|(_, c)| c).unwrap_or(id);
        MachineAllocation {
            machine_id: id.to_string(),
            machine_code: code.to_string(),
            layout: LayoutFamily::A,
            quantity: Some(Quantity::new(quantity)),
        }
    }

    fn standalone(store: &SqliteStore) -> WindingTicket {
        let input = StandaloneTicket {
            client: " Alfa ".into(),
            article: "Fio 30/1".into(),
            color: "Cru".into(),
            meters: Quantity::new(150),
            due_date: None,
            details: TicketDetails {
                machine_label: "CD7".into(),
                ..Default::default()
            },
        };
        store.launch_standalone(&input, "ines").unwrap()
    }

    fn in_production(store: &SqliteStore, allocations: &[MachineAllocation]) -> WindingTicket {
        let ticket = standalone(store);
        store.set_ticket_allocations(&ticket.id, allocations).unwrap();
        store
            .advance_ticket(&ticket.id, TicketState::AwaitingProduction)
            .unwrap();
        store
            .advance_ticket(&ticket.id, TicketState::InProduction)
            .unwrap()
            .0
    }

    #[test]
    fn test_standalone_draws_a_number() {
        let store = store();
        let first = standalone(&store);
        let second = standalone(&store);
        assert_eq!(first.os_number, 1001);
        assert_eq!(second.os_number, 1002);
        assert_eq!(first.client, "Alfa");
        assert!(first.order_id.is_none());

        let loaded = store.get_ticket(&first.id).unwrap().unwrap();
        assert_eq!(loaded, first);
    }

    #[test]
    fn test_launch_from_order_marks_order() {
        let store = store();
        let order = store
            .create_order(
                &OrderFields {
                    client: "Beta".into(),
                    article: "Fio 20/1".into(),
                    color: "Azul".into(),
                    meters: Quantity::new(3_000),
                    due_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
                    note: String::new(),
                },
                "ines",
            )
            .unwrap();

        let (ticket, marked) = store
            .launch_from_order(&order.id, TicketSeed::default(), "ines")
            .unwrap();
        assert!(marked);
        assert_eq!(ticket.os_number, order.number);
        assert_eq!(ticket.meters, Quantity::new(3_000));
        assert_eq!(ticket.due_date, Some(order.due_date));

        let order = store.get_order(&order.id).unwrap().unwrap();
        assert_eq!(order.state, OrderState::InProduction);

        let (_, marked_again) = store
            .launch_from_order(&order.id, TicketSeed::default(), "ines")
            .unwrap();
        assert!(!marked_again);
    }

    #[test]
    fn test_advance_sets_started_at_once() {
        let store = store();
        let ticket = standalone(&store);

        let (awaiting, from) = store
            .advance_ticket(&ticket.id, TicketState::AwaitingProduction)
            .unwrap();
        assert_eq!(from, TicketState::Pending);
        assert!(awaiting.started_at.is_none());

        let err = store
            .advance_ticket(&ticket.id, TicketState::AwaitingProduction)
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidTransition { .. }));

        let (producing, _) = store
            .advance_ticket(&ticket.id, TicketState::InProduction)
            .unwrap();
        assert!(producing.started_at.is_some());
    }

    #[test]
    fn test_allocations_frozen_after_pending() {
        let store = store();
        let ticket = in_production(&store, &[allocation("a-CD1", 10)]);
        let err = store
            .set_ticket_allocations(&ticket.id, &[allocation("a-CD2", 10)])
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidState(_)));
    }

    #[test]
    fn test_finalize_fans_out() {
        let store = store();
        let ticket = in_production(&store, &[allocation("a-CD1", 100), allocation("a-CD2", 50)]);

        let record = store.finalize_ticket(&ticket.id, "ines", false).unwrap();
        let entries = &record.outcome.created_entries;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].machine_id, "a-CD1");
        assert_eq!(entries[0].quantity, "100");
        assert_eq!(entries[1].machine_id, "a-CD2");
        assert_eq!(entries[1].quantity, "50");
        assert!(entries.iter().all(|e| e.state == EntryState::Pending));
        assert!(entries.iter().all(|e| e.os_number == Some(ticket.os_number)));
        assert_eq!(record.outcome.ticket.state, TicketState::Finished);
        assert!(record.outcome.ticket.finished_at.is_some());
        assert!(!record.order_marked);
    }

    #[test]
    fn test_finalize_is_all_or_nothing() {
        let store = store();
        let ticket = in_production(&store, &[allocation("a-CD1", 100), allocation("a-NOPE", 50)]);

        let err = store.finalize_ticket(&ticket.id, "ines", true).unwrap_err();
        assert!(matches!(err, DispatchError::NotFound { .. }));

        let after = store.get_ticket(&ticket.id).unwrap().unwrap();
        assert_eq!(after.state, TicketState::InProduction);
        assert_eq!(
            store
                .count_entries(&EntryFilter::new().with_ticket(&ticket.id))
                .unwrap(),
            0
        );
        let cd1 = store.get_machine("a-CD1").unwrap().unwrap();
        assert_eq!(cd1.status, MachineStatus::Free);
    }

    #[test]
    fn test_legacy_finish_needs_zero_allocations() {
        let store = store();
        let bare = in_production(&store, &[]);
        let finished = store.finish_ticket_without_machines(&bare.id).unwrap();
        assert_eq!(finished.state, TicketState::Finished);

        let allocated = in_production(&store, &[allocation("a-F1", 5)]);
        let err = store
            .finish_ticket_without_machines(&allocated.id)
            .unwrap_err();
        assert!(matches!(err, DispatchError::PreconditionFailed(_)));
    }

    #[test]
    fn test_delete_only_pending() {
        let store = store();
        let pending = standalone(&store);
        store.delete_ticket(&pending.id).unwrap();
        assert!(store.get_ticket(&pending.id).unwrap().is_none());

        let running = in_production(&store, &[]);
        assert!(matches!(
            store.delete_ticket(&running.id).unwrap_err(),
            DispatchError::InvalidState(_)
        ));
    }

    #[test]
    fn test_list_hides_finished_and_sorts_by_due_date() {
        let store = store();
        let undated = standalone(&store);
        let dated = store
            .launch_standalone(
                &StandaloneTicket {
                    client: "Gama".into(),
                    article: String::new(),
                    color: String::new(),
                    meters: Quantity::new(10),
                    due_date: NaiveDate::from_ymd_opt(2025, 2, 1),
                    details: TicketDetails::default(),
                },
                "ines",
            )
            .unwrap();
        let done = in_production(&store, &[]);
        store.finish_ticket_without_machines(&done.id).unwrap();

        let open = store.list_tickets(&TicketFilter::new()).unwrap();
        let ids: Vec<&str> = open.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec![dated.id.as_str(), undated.id.as_str()]);

        let all = store
            .list_tickets(&TicketFilter::new().including_finished())
            .unwrap();
        assert_eq!(all.len(), 3);

        let finished = store
            .list_tickets(&TicketFilter::new().with_state(TicketState::Finished))
            .unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].id, done.id);
    }
}
