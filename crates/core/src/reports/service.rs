use std::sync::Arc;

use crate::auth::{Caller, Permission};
use crate::dispatch::EntryFilter;
use crate::error::{DispatchError, DispatchResult};
use crate::fleet::LayoutFamily;
use crate::history::HistoryFilter;
use crate::maintenance::{MaintenanceFilter, MaintenanceRecord};
use crate::metrics::record_rejection;
use crate::plant::Shared;
use crate::production::{OrderFilter, OrderState, ProductionOrder};
use crate::winding::{TicketFilter, TicketState, WindingTicket, MAX_ALLOCATIONS};

use super::{EntryCounts, LayoutReport, ReportRows, TicketProduction};

/// Default row cap for bulk report reads.
pub const REPORT_LIMIT: usize = 10_000;

#[derive(Clone)]
pub struct Reports {
    shared: Arc<Shared>,
    row_cap: usize,
}

impl Reports {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            row_cap: REPORT_LIMIT,
        }
    }

    /// Override the per-report row cap.
    pub fn with_row_cap(mut self, row_cap: usize) -> Self {
        self.row_cap = row_cap.max(1);
        self
    }

    /// Store limit that reveals whether the cap was exceeded.
    fn fetch_limit(&self) -> i64 {
        i64::try_from(self.row_cap).unwrap_or(i64::MAX - 1) + 1
    }

    fn authorize(&self, caller: &Caller) -> DispatchResult<()> {
        caller
            .require(Permission::Reports)
            .inspect_err(record_rejection)
    }

    /// A ticket with the dispatch entries it fanned out to.
    pub fn ticket_production(
        &self,
        caller: &Caller,
        ticket_id: &str,
    ) -> DispatchResult<TicketProduction> {
        self.authorize(caller)?;

        let ticket = self
            .shared
            .store
            .get_ticket(ticket_id)?
            .ok_or_else(|| DispatchError::not_found("winding ticket", ticket_id))?;
        let entries = self
            .shared
            .store
            .list_entries(
                &EntryFilter::new()
                    .with_ticket(ticket_id)
                    .with_limit(MAX_ALLOCATIONS as i64),
            )?;

        Ok(TicketProduction::gather(ticket, entries))
    }

    pub fn layout_report(
        &self,
        caller: &Caller,
        layout: LayoutFamily,
    ) -> DispatchResult<LayoutReport> {
        self.authorize(caller)?;

        let store = &self.shared.store;
        let machines = store.list_machines(Some(layout))?;
        let entries = ReportRows::capped(
            store.list_entries(
                &EntryFilter::new()
                    .with_layout(layout)
                    .with_limit(self.fetch_limit()),
            )?,
            self.row_cap,
        );
        let history = ReportRows::capped(
            store.list_history(
                &HistoryFilter::new()
                    .with_layout(layout)
                    .with_limit(self.fetch_limit()),
            )?,
            self.row_cap,
        );
        let truncated = entries.truncated || history.truncated;

        if truncated {
            tracing::warn!(layout = %layout, cap = self.row_cap, "Layout report truncated");
        }
        tracing::debug!(
            layout = %layout,
            entries = entries.len(),
            changes = history.len(),
            "Layout report built"
        );
        Ok(LayoutReport {
            layout,
            counts: EntryCounts::tally(&entries.rows),
            machines,
            entries: entries.rows,
            history: history.rows,
            truncated,
        })
    }

    pub fn finished_tickets(&self, caller: &Caller) -> DispatchResult<ReportRows<WindingTicket>> {
        self.authorize(caller)?;
        let rows = self.shared.store.list_tickets(
            &TicketFilter::new()
                .with_state(TicketState::Finished)
                .with_limit(self.fetch_limit()),
        )?;
        Ok(ReportRows::capped(rows, self.row_cap))
    }

    pub fn finished_orders(&self, caller: &Caller) -> DispatchResult<ReportRows<ProductionOrder>> {
        self.authorize(caller)?;
        let rows = self.shared.store.list_orders(
            &OrderFilter::new()
                .with_state(OrderState::Finished)
                .with_limit(self.fetch_limit()),
        )?;
        Ok(ReportRows::capped(rows, self.row_cap))
    }

    /// Every maintenance window, newest first, optionally for one machine.
    pub fn maintenance_history(
        &self,
        caller: &Caller,
        machine_id: Option<&str>,
    ) -> DispatchResult<ReportRows<MaintenanceRecord>> {
        self.authorize(caller)?;
        let mut filter = MaintenanceFilter::new().with_limit(self.fetch_limit());
        if let Some(machine_id) = machine_id {
            filter = filter.with_machine(machine_id);
        }
        let rows = self.shared.store.list_maintenance(&filter)?;
        Ok(ReportRows::capped(rows, self.row_cap))
    }
}
