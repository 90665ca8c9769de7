use std::sync::Arc;

use chrono::Utc;

use crate::audit::AuditEvent;
use crate::auth::{Caller, Permission};
use crate::error::{DispatchError, DispatchResult};
use crate::metrics::{record_rejection, NUMBERS_ISSUED};
use crate::plant::Shared;
use crate::winding::{TicketDetails, MAX_ALLOCATIONS};

use super::{DraftAllocation, OrderFields, OrderFilter, ProductionOrder, TicketDraft};

/// Production Order Ledger.
#[derive(Clone)]
pub struct ProductionLedger {
    shared: Arc<Shared>,
}

impl ProductionLedger {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Open a pending order with the next document number.
    pub fn create(&self, caller: &Caller, fields: OrderFields) -> DispatchResult<ProductionOrder> {
        self.create_inner(caller, fields)
            .inspect_err(record_rejection)
    }

    fn create_inner(&self, caller: &Caller, fields: OrderFields) -> DispatchResult<ProductionOrder> {
        caller.require(Permission::ProductionOrders)?;
        if fields.client.trim().is_empty() {
            return Err(DispatchError::PreconditionFailed(
                "client is required".to_string(),
            ));
        }

        let order = self.shared.store.create_order(&fields, &caller.username)?;

        NUMBERS_ISSUED.inc();
        tracing::info!(
            order_id = %order.id,
            number = order.number,
            due_date = %order.due_date,
            by = %caller.username,
            "Production order created"
        );
        self.shared.emit(AuditEvent::OrderCreated {
            order_id: order.id.clone(),
            number: order.number,
            client: order.client.clone(),
            created_by: caller.username.clone(),
        });

        Ok(order)
    }

    pub fn get(&self, id: &str) -> DispatchResult<ProductionOrder> {
        self.shared
            .store
            .get_order(id)?
            .ok_or_else(|| DispatchError::not_found("production order", id))
    }

    pub fn get_by_number(&self, number: u64) -> DispatchResult<ProductionOrder> {
        self.shared
            .store
            .get_order_by_number(number)?
            .ok_or_else(|| DispatchError::not_found("production order", number.to_string()))
    }

    pub fn list(&self, filter: &OrderFilter) -> DispatchResult<Vec<ProductionOrder>> {
        self.shared.store.list_orders(filter)
    }

    /// Pending orders, earliest due date first.
    pub fn list_pending(&self) -> DispatchResult<Vec<ProductionOrder>> {
        self.shared.store.list_pending_orders()
    }

    /// pending -> in_production. Repeating the call is a no-op.
    pub fn mark_in_production(
        &self,
        caller: &Caller,
        order_id: &str,
    ) -> DispatchResult<ProductionOrder> {
        caller
            .require(Permission::ProductionOrders)
            .and_then(|_| self.shared.store.mark_order_in_production(order_id))
            .inspect_err(record_rejection)
            .map(|(order, changed)| {
                if changed {
                    tracing::info!(order_id = %order.id, number = order.number, "Order in production");
                    self.shared.emit(AuditEvent::OrderMarkedInProduction {
                        order_id: order.id.clone(),
                        number: order.number,
                    });
                }
                order
            })
    }

    /// in_production -> finished. Repeating the call is a no-op.
    pub fn mark_finished(&self, caller: &Caller, order_id: &str) -> DispatchResult<ProductionOrder> {
        caller
            .require(Permission::ProductionOrders)
            .and_then(|_| self.shared.store.mark_order_finished(order_id))
            .inspect_err(record_rejection)
            .map(|(order, changed)| {
                if changed {
                    tracing::info!(order_id = %order.id, number = order.number, "Order finished");
                    self.shared.emit(AuditEvent::OrderFinished {
                        order_id: order.id.clone(),
                        number: order.number,
                        finished_by: caller.username.clone(),
                    });
                }
                order
            })
    }

    /// Save the shared ticket draft on an order. Any operator may edit it.
    pub fn save_draft(
        &self,
        caller: &Caller,
        order_id: &str,
        details: TicketDetails,
        allocations: Vec<DraftAllocation>,
    ) -> DispatchResult<ProductionOrder> {
        self.save_draft_inner(caller, order_id, details, allocations)
            .inspect_err(record_rejection)
    }

    fn save_draft_inner(
        &self,
        caller: &Caller,
        order_id: &str,
        details: TicketDetails,
        allocations: Vec<DraftAllocation>,
    ) -> DispatchResult<ProductionOrder> {
        if allocations.len() > MAX_ALLOCATIONS {
            return Err(DispatchError::PreconditionFailed(format!(
                "at most {} allocations per ticket, got {}",
                MAX_ALLOCATIONS,
                allocations.len()
            )));
        }
        details.validate()?;

        let draft = TicketDraft {
            details,
            allocations,
            edited_by: caller.username.clone(),
            edited_at: Utc::now(),
        };
        let order = self.shared.store.save_order_draft(order_id, &draft)?;

        tracing::debug!(order_id = %order_id, by = %caller.username, "Order draft saved");
        self.shared.emit(AuditEvent::OrderDraftSaved {
            order_id: order_id.to_string(),
            allocations: draft.allocations.len(),
            edited_by: caller.username.clone(),
        });

        Ok(order)
    }
}
