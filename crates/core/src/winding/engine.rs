use std::sync::Arc;

use crate::audit::AuditEvent;
use crate::auth::{Caller, Permission};
use crate::dispatch::EntryState;
use crate::error::{DispatchError, DispatchResult};
use crate::fleet::MachineRegistry;
use crate::locks::acquire;
use crate::metrics::{
    record_rejection, ENTRIES_ENQUEUED, ENTRIES_STARTED, FANOUT_ENTRIES, NUMBERS_ISSUED,
    TICKETS_FINALIZED,
};
use crate::plant::Shared;
use crate::production::{DraftAllocation, OrderState};
use crate::quantity::{Quantity, QuantityError};

use super::{
    AllocationRequest, FinalizeOutcome, MachineAllocation, StandaloneTicket, TicketFilter,
    TicketSeed, TicketState, WindingTicket, MAX_ALLOCATIONS,
};

/// Winding Ticket Engine.
///
/// Ticket mutations are serialized per ticket. Finalize additionally holds
/// the lock of every allocated machine (in sorted order) while the fan-out
/// transaction runs.
#[derive(Clone)]
pub struct WindingEngine {
    shared: Arc<Shared>,
}

impl WindingEngine {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    fn registry(&self) -> MachineRegistry {
        MachineRegistry::new(Arc::clone(&self.shared))
    }

    /// Open a pending ticket against an order. Client, article, color, due
    /// date and meters come from the order; fields and allocations come
    /// from the order's draft when one was saved. The order moves to
    /// in_production in the same transaction.
    pub fn launch_from_order(&self, caller: &Caller, order_id: &str) -> DispatchResult<WindingTicket> {
        self.launch_from_order_inner(caller, order_id)
            .inspect_err(record_rejection)
    }

    fn launch_from_order_inner(
        &self,
        caller: &Caller,
        order_id: &str,
    ) -> DispatchResult<WindingTicket> {
        caller.require(Permission::WindingTickets)?;

        let order = self
            .shared
            .store
            .get_order(order_id)?
            .ok_or_else(|| DispatchError::not_found("production order", order_id))?;
        if order.state == OrderState::Finished {
            return Err(DispatchError::InvalidState(format!(
                "order #{} is finished",
                order.number
            )));
        }

        let seed = match order.draft {
            Some(draft) => TicketSeed {
                allocations: self.seed_allocations(&draft.allocations)?,
                details: draft.details,
            },
            None => TicketSeed::default(),
        };

        let (ticket, order_marked) =
            self.shared
                .store
                .launch_from_order(order_id, seed, &caller.username)?;

        tracing::info!(
            ticket_id = %ticket.id,
            os_number = ticket.os_number,
            order_id = %order_id,
            allocations = ticket.allocations.len(),
            by = %caller.username,
            "Winding ticket launched from order"
        );
        self.shared.emit(AuditEvent::TicketLaunched {
            ticket_id: ticket.id.clone(),
            os_number: ticket.os_number,
            order_id: Some(order_id.to_string()),
            launched_by: caller.username.clone(),
        });
        if order_marked {
            self.shared.emit(AuditEvent::OrderMarkedInProduction {
                order_id: order_id.to_string(),
                number: ticket.os_number,
            });
        }

        Ok(ticket)
    }

    /// Resolve the machines saved on a draft. A machine that no longer
    /// resolves is dropped; a quantity that does not parse is left unset
    /// for the operator to retype.
    fn seed_allocations(
        &self,
        drafts: &[DraftAllocation],
    ) -> DispatchResult<Vec<MachineAllocation>> {
        let registry = self.registry();
        let mut allocations = Vec::with_capacity(drafts.len());

        for draft in drafts.iter().take(MAX_ALLOCATIONS) {
            let machine = match registry.resolve(&draft.machine) {
                Ok(machine) => machine,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        machine = %draft.machine.machine,
                        error = %e,
                        "Dropping draft allocation"
                    );
                    continue;
                }
            };

            let quantity = match Quantity::parse(&draft.quantity) {
                Ok(quantity) => Some(quantity),
                Err(QuantityError::Empty) => None,
                Err(e) => {
                    tracing::warn!(
                        machine_id = %machine.id,
                        error = %e,
                        "Draft allocation quantity ignored"
                    );
                    None
                }
            };
            allocations.push(MachineAllocation::new(&machine, quantity));
        }

        Ok(allocations)
    }

    /// Open a pending ticket without an order. Draws its own number.
    pub fn launch_standalone(
        &self,
        caller: &Caller,
        input: StandaloneTicket,
    ) -> DispatchResult<WindingTicket> {
        self.launch_standalone_inner(caller, input)
            .inspect_err(record_rejection)
    }

    fn launch_standalone_inner(
        &self,
        caller: &Caller,
        input: StandaloneTicket,
    ) -> DispatchResult<WindingTicket> {
        caller.require(Permission::WindingTickets)?;
        if input.client.trim().is_empty() {
            return Err(DispatchError::PreconditionFailed(
                "client is required".to_string(),
            ));
        }
        if input.details.machine_label.trim().is_empty() {
            return Err(DispatchError::PreconditionFailed(
                "machine label is required for a standalone ticket".to_string(),
            ));
        }
        input.details.validate()?;

        let ticket = self
            .shared
            .store
            .launch_standalone(&input, &caller.username)?;

        NUMBERS_ISSUED.inc();
        tracing::info!(
            ticket_id = %ticket.id,
            os_number = ticket.os_number,
            machine_label = %ticket.details.machine_label,
            by = %caller.username,
            "Standalone winding ticket launched"
        );
        self.shared.emit(AuditEvent::TicketLaunched {
            ticket_id: ticket.id.clone(),
            os_number: ticket.os_number,
            order_id: None,
            launched_by: caller.username.clone(),
        });

        Ok(ticket)
    }

    pub fn get(&self, ticket_id: &str) -> DispatchResult<WindingTicket> {
        self.shared
            .store
            .get_ticket(ticket_id)?
            .ok_or_else(|| DispatchError::not_found("winding ticket", ticket_id))
    }

    pub fn list(&self, filter: &TicketFilter) -> DispatchResult<Vec<WindingTicket>> {
        self.shared.store.list_tickets(filter)
    }

    /// Replace the allocations of a pending ticket. Every machine reference
    /// must resolve in the registry.
    pub fn set_allocations(
        &self,
        caller: &Caller,
        ticket_id: &str,
        requests: Vec<AllocationRequest>,
    ) -> DispatchResult<WindingTicket> {
        self.set_allocations_inner(caller, ticket_id, requests)
            .inspect_err(record_rejection)
    }

    fn set_allocations_inner(
        &self,
        caller: &Caller,
        ticket_id: &str,
        requests: Vec<AllocationRequest>,
    ) -> DispatchResult<WindingTicket> {
        caller.require(Permission::WindingTickets)?;
        if requests.len() > MAX_ALLOCATIONS {
            return Err(DispatchError::PreconditionFailed(format!(
                "at most {} allocations per ticket, got {}",
                MAX_ALLOCATIONS,
                requests.len()
            )));
        }

        let registry = self.registry();
        let allocations = requests
            .iter()
            .map(|request| {
                registry
                    .resolve(&request.machine)
                    .map(|machine| MachineAllocation::new(&machine, request.quantity))
            })
            .collect::<DispatchResult<Vec<_>>>()?;

        let lock = self.shared.ticket_locks.get(ticket_id);
        let _guard = acquire(&lock);

        let ticket = self
            .shared
            .store
            .set_ticket_allocations(ticket_id, &allocations)?;

        let machine_ids: Vec<String> = allocations.iter().map(|a| a.machine_id.clone()).collect();
        tracing::info!(
            ticket_id = %ticket_id,
            machines = ?machine_ids,
            allocated = %ticket.allocated_total(),
            meters = %ticket.meters,
            by = %caller.username,
            "Ticket allocations set"
        );
        self.shared.emit(AuditEvent::TicketAllocationsSet {
            ticket_id: ticket_id.to_string(),
            machine_ids,
            set_by: caller.username.clone(),
        });

        Ok(ticket)
    }

    /// Take one step: pending -> awaiting_production or
    /// awaiting_production -> in_production.
    pub fn advance(
        &self,
        caller: &Caller,
        ticket_id: &str,
        target: TicketState,
    ) -> DispatchResult<WindingTicket> {
        self.advance_inner(caller, ticket_id, target)
            .inspect_err(record_rejection)
    }

    fn advance_inner(
        &self,
        caller: &Caller,
        ticket_id: &str,
        target: TicketState,
    ) -> DispatchResult<WindingTicket> {
        caller.require(Permission::WindingTickets)?;

        let lock = self.shared.ticket_locks.get(ticket_id);
        let _guard = acquire(&lock);

        let (ticket, from) = self.shared.store.advance_ticket(ticket_id, target)?;

        tracing::info!(
            ticket_id = %ticket_id,
            from = %from,
            to = %ticket.state,
            by = %caller.username,
            "Ticket advanced"
        );
        self.shared.emit(AuditEvent::TicketAdvanced {
            ticket_id: ticket_id.to_string(),
            from_state: from.to_string(),
            to_state: ticket.state.to_string(),
            advanced_by: caller.username.clone(),
        });

        Ok(ticket)
    }

    /// Send an in-production ticket to its machines: one dispatch entry per
    /// allocation, the ticket finished and its order in production, or
    /// nothing at all.
    pub fn finalize_with_machines(
        &self,
        caller: &Caller,
        ticket_id: &str,
    ) -> DispatchResult<FinalizeOutcome> {
        self.finalize_inner(caller, ticket_id)
            .inspect_err(record_rejection)
    }

    fn finalize_inner(&self, caller: &Caller, ticket_id: &str) -> DispatchResult<FinalizeOutcome> {
        caller.require(Permission::WindingTickets)?;

        let ticket_lock = self.shared.ticket_locks.get(ticket_id);
        let _ticket_guard = acquire(&ticket_lock);

        // Allocations are frozen past pending, so the machine set read here
        // is the one the store will fan out to.
        let ticket = self.get(ticket_id)?;
        ticket.check_finalizable()?;

        let machine_locks = self
            .shared
            .machine_locks
            .get_many(ticket.allocations.iter().map(|a| a.machine_id.as_str()));
        let _machine_guards: Vec<_> = machine_locks.iter().map(|l| acquire(l)).collect();

        let record = self.shared.store.finalize_ticket(
            ticket_id,
            &caller.username,
            self.shared.options.auto_start_idle,
        )?;
        let outcome = record.outcome;
        let count = outcome.created_entries.len();

        TICKETS_FINALIZED.with_label_values(&["machines"]).inc();
        FANOUT_ENTRIES.observe(count as f64);
        ENTRIES_ENQUEUED
            .with_label_values(&["ticket"])
            .inc_by(count as u64);
        tracing::info!(
            ticket_id = %ticket_id,
            os_number = outcome.ticket.os_number,
            entries = count,
            by = %caller.username,
            "Ticket sent to machines"
        );

        for entry in &outcome.created_entries {
            self.shared.emit(AuditEvent::EntryEnqueued {
                entry_id: entry.id.clone(),
                machine_id: entry.machine_id.clone(),
                created_by: caller.username.clone(),
                ticket_id: Some(ticket_id.to_string()),
            });
            if entry.state == EntryState::Active {
                ENTRIES_STARTED.inc();
                self.shared.emit(AuditEvent::EntryStarted {
                    entry_id: entry.id.clone(),
                    machine_id: entry.machine_id.clone(),
                    started_by: caller.username.clone(),
                });
            }
        }
        self.shared.emit(AuditEvent::TicketFinalized {
            ticket_id: ticket_id.to_string(),
            entry_ids: outcome.created_entries.iter().map(|e| e.id.clone()).collect(),
            finalized_by: caller.username.clone(),
        });
        if record.order_marked {
            if let Some(ref order_id) = outcome.ticket.order_id {
                self.shared.emit(AuditEvent::OrderMarkedInProduction {
                    order_id: order_id.clone(),
                    number: outcome.ticket.os_number,
                });
            }
        }

        Ok(outcome)
    }

    /// Finish an in-production ticket that was never split across machines.
    /// No dispatch entries are created.
    pub fn finish_without_machines(
        &self,
        caller: &Caller,
        ticket_id: &str,
    ) -> DispatchResult<WindingTicket> {
        self.finish_without_machines_inner(caller, ticket_id)
            .inspect_err(record_rejection)
    }

    fn finish_without_machines_inner(
        &self,
        caller: &Caller,
        ticket_id: &str,
    ) -> DispatchResult<WindingTicket> {
        caller.require(Permission::WindingTickets)?;

        let lock = self.shared.ticket_locks.get(ticket_id);
        let _guard = acquire(&lock);

        let ticket = self.shared.store.finish_ticket_without_machines(ticket_id)?;

        TICKETS_FINALIZED.with_label_values(&["legacy"]).inc();
        tracing::info!(
            ticket_id = %ticket_id,
            os_number = ticket.os_number,
            by = %caller.username,
            "Ticket finished without machines"
        );
        self.shared.emit(AuditEvent::TicketFinalized {
            ticket_id: ticket_id.to_string(),
            entry_ids: Vec::new(),
            finalized_by: caller.username.clone(),
        });

        Ok(ticket)
    }

    /// Delete a pending ticket. Its order, if any, is not touched.
    pub fn delete(&self, caller: &Caller, ticket_id: &str) -> DispatchResult<WindingTicket> {
        caller
            .require(Permission::WindingTickets)
            .inspect_err(record_rejection)?;

        let lock = self.shared.ticket_locks.get(ticket_id);
        let _guard = acquire(&lock);

        let ticket = self
            .shared
            .store
            .delete_ticket(ticket_id)
            .inspect_err(record_rejection)?;

        tracing::info!(
            ticket_id = %ticket_id,
            os_number = ticket.os_number,
            by = %caller.username,
            "Ticket deleted"
        );
        self.shared.emit(AuditEvent::TicketDeleted {
            ticket_id: ticket_id.to_string(),
            deleted_by: caller.username.clone(),
        });

        Ok(ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::dispatch::{EntryFields, MachineStatus};
    use crate::fleet::MachineRef;
    use crate::plant::testing::{drain_audit, plant, plant_with, plant_with_audit};
    use crate::plant::{Plant, PlantOptions};
    use crate::production::{OrderFields, ProductionOrder};
    use crate::winding::TicketDetails;
    use chrono::NaiveDate;

    fn internal() -> Caller {
        Caller::new("ines", Role::InternalOperator)
    }

    fn order(plant: &Plant) -> ProductionOrder {
        plant
            .orders()
            .create(
                &internal(),
                OrderFields {
                    client: "Malharia Sul".into(),
                    article: "Fio 30/1".into(),
                    color: "Cru".into(),
                    meters: Quantity::new(150),
                    due_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
                    note: String::new(),
                },
            )
            .unwrap()
    }

    fn request(machine: &str, quantity: u64) -> AllocationRequest {
        AllocationRequest {
            machine: MachineRef::new(machine),
            quantity: Some(Quantity::new(quantity)),
        }
    }

    fn to_production(plant: &Plant, ticket_id: &str) {
        let winding = plant.winding();
        winding
            .advance(&internal(), ticket_id, TicketState::AwaitingProduction)
            .unwrap();
        winding
            .advance(&internal(), ticket_id, TicketState::InProduction)
            .unwrap();
    }

    #[test]
    fn test_launch_marks_order_and_copies_fields() {
        let plant = plant();
        let order = order(&plant);
        let ticket = plant
            .winding()
            .launch_from_order(&internal(), &order.id)
            .unwrap();

        assert_eq!(ticket.state, TicketState::Pending);
        assert_eq!(ticket.os_number, order.number);
        assert_eq!(ticket.meters, order.meters);
        assert_eq!(ticket.client, "Malharia Sul");
        assert_eq!(
            plant.orders().get(&order.id).unwrap().state,
            OrderState::InProduction
        );
    }

    #[test]
    fn test_launch_seeds_from_draft() {
        let plant = plant();
        let order = order(&plant);
        plant
            .orders()
            .save_draft(
                &internal(),
                &order.id,
                TicketDetails {
                    raw_material: "Algodao".into(),
                    ..Default::default()
                },
                vec![
                    DraftAllocation {
                        machine: MachineRef::new("cd3"),
                        quantity: "1.000".into(),
                    },
                    DraftAllocation {
                        machine: MachineRef::new("XX99"),
                        quantity: "5".into(),
                    },
                    DraftAllocation {
                        machine: MachineRef::new("F2"),
                        quantity: "12,5".into(),
                    },
                ],
            )
            .unwrap();

        let ticket = plant
            .winding()
            .launch_from_order(&internal(), &order.id)
            .unwrap();
        assert_eq!(ticket.details.raw_material, "Algodao");
        assert_eq!(ticket.allocations.len(), 2);
        assert_eq!(ticket.allocations[0].machine_id, "a-CD3");
        assert_eq!(ticket.allocations[0].quantity, Some(Quantity::new(1_000)));
        assert_eq!(ticket.allocations[1].machine_id, "a-F2");
        assert_eq!(ticket.allocations[1].quantity, None);
    }

    #[test]
    fn test_standalone_requires_machine_label() {
        let plant = plant();
        let input = StandaloneTicket {
            client: "Alfa".into(),
            article: String::new(),
            color: String::new(),
            meters: Quantity::new(10),
            due_date: None,
            details: TicketDetails::default(),
        };
        let err = plant
            .winding()
            .launch_standalone(&internal(), input.clone())
            .unwrap_err();
        assert!(matches!(err, DispatchError::PreconditionFailed(_)));

        let mut labelled = input;
        labelled.details.machine_label = "CD7".into();
        let ticket = plant
            .winding()
            .launch_standalone(&internal(), labelled)
            .unwrap();
        assert_eq!(ticket.os_number, 1001);
        assert_eq!(plant.numbering().current().unwrap(), Some(1001));
    }

    #[test]
    fn test_external_operator_cannot_touch_tickets() {
        let plant = plant();
        let order = order(&plant);
        let err = plant
            .winding()
            .launch_from_order(&Caller::new("edu", Role::ExternalOperator), &order.id)
            .unwrap_err();
        assert!(matches!(err, DispatchError::PermissionDenied(_)));
    }

    #[test]
    fn test_set_allocations_resolves_or_fails() {
        let plant = plant();
        let ticket = plant
            .winding()
            .launch_from_order(&internal(), &order(&plant).id)
            .unwrap();

        let unknown = plant
            .winding()
            .set_allocations(&internal(), &ticket.id, vec![request("ZZ1", 10)])
            .unwrap_err();
        assert!(matches!(unknown, DispatchError::NotFound { .. }));

        let six = (1..=6).map(|n| request(&format!("F{}", n), 10)).collect();
        let too_many = plant
            .winding()
            .set_allocations(&internal(), &ticket.id, six)
            .unwrap_err();
        assert!(matches!(too_many, DispatchError::PreconditionFailed(_)));

        let set = plant
            .winding()
            .set_allocations(&internal(), &ticket.id, vec![request("CD1", 100), request("U4", 50)])
            .unwrap();
        assert_eq!(set.allocations[1].machine_id, "b-U4");
    }

    #[test]
    fn test_finalize_auto_starts_only_idle_machines() {
        let (plant, mut audit_rx) = plant_with_audit();
        let admin = Caller::admin("root");
        plant
            .queue()
            .enqueue(
                &admin,
                "a-CD2",
                EntryFields {
                    client: "Outro".into(),
                    article: "x".into(),
                    color: "y".into(),
                    quantity: "1".into(),
                    note: String::new(),
                },
            )
            .unwrap();

        let ticket = plant
            .winding()
            .launch_from_order(&internal(), &order(&plant).id)
            .unwrap();
        plant
            .winding()
            .set_allocations(
                &internal(),
                &ticket.id,
                vec![request("CD1", 100), request("CD2", 50), request("CD1", 20)],
            )
            .unwrap();
        to_production(&plant, &ticket.id);

        let outcome = plant
            .winding()
            .finalize_with_machines(&internal(), &ticket.id)
            .unwrap();
        let states: Vec<EntryState> = outcome.created_entries.iter().map(|e| e.state).collect();
        assert_eq!(
            states,
            vec![EntryState::Active, EntryState::Pending, EntryState::Pending]
        );
        assert_eq!(
            plant.registry().get_machine("a-CD1").unwrap().status,
            MachineStatus::InProduction
        );
        assert_eq!(
            plant.registry().get_machine("a-CD2").unwrap().status,
            MachineStatus::Queued
        );

        let started: Vec<AuditEvent> = drain_audit(&mut audit_rx)
            .into_iter()
            .filter(|e| e.event_type() == "entry_started")
            .collect();
        assert_eq!(started.len(), 1);
        match &started[0] {
            AuditEvent::EntryStarted {
                entry_id,
                machine_id,
                started_by,
            } => {
                assert_eq!(entry_id, &outcome.created_entries[0].id);
                assert_eq!(machine_id, "a-CD1");
                assert_eq!(started_by, "ines");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_finalize_without_auto_start_leaves_entries_pending() {
        let plant = plant_with(PlantOptions {
            auto_start_idle: false,
            ..Default::default()
        });
        let ticket = plant
            .winding()
            .launch_from_order(&internal(), &order(&plant).id)
            .unwrap();
        plant
            .winding()
            .set_allocations(&internal(), &ticket.id, vec![request("CD1", 100)])
            .unwrap();
        to_production(&plant, &ticket.id);

        let outcome = plant
            .winding()
            .finalize_with_machines(&internal(), &ticket.id)
            .unwrap();
        assert_eq!(outcome.created_entries[0].state, EntryState::Pending);
        assert_eq!(
            plant.registry().get_machine("a-CD1").unwrap().status,
            MachineStatus::Queued
        );
    }

    #[test]
    fn test_finalize_refused_on_machine_in_maintenance() {
        let plant = plant();
        let ticket = plant
            .winding()
            .launch_from_order(&internal(), &order(&plant).id)
            .unwrap();
        plant
            .winding()
            .set_allocations(&internal(), &ticket.id, vec![request("CD1", 100), request("F9", 5)])
            .unwrap();
        to_production(&plant, &ticket.id);
        plant
            .maintenance()
            .open(&internal(), "a-F9", "belt")
            .unwrap();

        let err = plant
            .winding()
            .finalize_with_machines(&internal(), &ticket.id)
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidState(_)));
        assert_eq!(plant.winding().get(&ticket.id).unwrap().state, TicketState::InProduction);
        assert_eq!(
            plant.registry().get_machine("a-CD1").unwrap().status,
            MachineStatus::Free
        );
    }

    #[test]
    fn test_finalize_twice_is_invalid_state() {
        let plant = plant();
        let ticket = plant
            .winding()
            .launch_from_order(&internal(), &order(&plant).id)
            .unwrap();
        plant
            .winding()
            .set_allocations(&internal(), &ticket.id, vec![request("CD1", 100)])
            .unwrap();
        to_production(&plant, &ticket.id);

        plant
            .winding()
            .finalize_with_machines(&internal(), &ticket.id)
            .unwrap();
        let err = plant
            .winding()
            .finalize_with_machines(&internal(), &ticket.id)
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidState(_)));
    }

    #[test]
    fn test_delete_leaves_order_alone() {
        let plant = plant();
        let order = order(&plant);
        let ticket = plant
            .winding()
            .launch_from_order(&internal(), &order.id)
            .unwrap();

        plant.winding().delete(&internal(), &ticket.id).unwrap();
        assert!(matches!(
            plant.winding().get(&ticket.id).unwrap_err(),
            DispatchError::NotFound { .. }
        ));
        assert_eq!(
            plant.orders().get(&order.id).unwrap().state,
            OrderState::InProduction
        );
    }
}
