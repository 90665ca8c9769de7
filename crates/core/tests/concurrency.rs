//! Concurrency tests: numbering under contention, one active entry per
//! machine, and parallel fan-outs onto shared machines.

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

use spindle_core::{
    dispatch::EntryFilter, AllocationRequest, Caller, DispatchError, EntryFields, EntryState,
    FleetCatalog, MachineRef, Plant, PlantOptions, Quantity, Role, SqliteStore, StandaloneTicket,
    TicketDetails, TicketState,
};

fn plant() -> Plant {
    let store = Arc::new(SqliteStore::in_memory().expect("Failed to open store"));
    let plant = Plant::new(store, PlantOptions::default(), None);
    plant
        .initialize(&FleetCatalog::default())
        .expect("Failed to initialize plant");
    plant
}

fn fields(n: usize) -> EntryFields {
    EntryFields {
        client: format!("Cliente {}", n),
        article: "Fio 30/1".into(),
        color: "Cru".into(),
        quantity: "100".into(),
        note: String::new(),
    }
}

#[test]
fn test_concurrent_numbers_are_contiguous() {
    let plant = plant();
    let threads = 16;
    let per_thread = 25;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let numbering = plant.numbering();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                (0..per_thread)
                    .map(|_| numbering.next().unwrap())
                    .collect::<Vec<u64>>()
            })
        })
        .collect();

    let mut numbers: Vec<u64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    numbers.sort_unstable();

    let expected: Vec<u64> = (1001..=1000 + (threads * per_thread) as u64).collect();
    assert_eq!(numbers, expected);
    assert_eq!(
        plant.numbering().current().unwrap(),
        Some(1000 + (threads * per_thread) as u64)
    );
}

#[test]
fn test_concurrent_starts_leave_one_active() {
    let plant = plant();
    let internal = Caller::new("ines", Role::InternalOperator);
    let entries: Vec<String> = (0..8)
        .map(|n| {
            plant
                .queue()
                .enqueue(&internal, "b-N4", fields(n))
                .unwrap()
                .id
        })
        .collect();

    let barrier = Arc::new(Barrier::new(entries.len()));
    let handles: Vec<_> = entries
        .iter()
        .cloned()
        .map(|id| {
            let queue = plant.queue();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                queue.start(&Caller::new("edu", Role::ExternalOperator), &id)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let started = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(started, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, DispatchError::Conflict(_))));

    let active = plant
        .queue()
        .count_entries(
            &EntryFilter::new()
                .with_machine("b-N4")
                .with_state(EntryState::Active),
        )
        .unwrap();
    assert_eq!(active, 1);
}

#[test]
fn test_parallel_fan_outs_onto_shared_machines() {
    let plant = plant();
    let caller = Caller::new("ines", Role::InternalOperator);
    let winding = plant.winding();

    let tickets: Vec<String> = (0..6)
        .map(|n| {
            let ticket = winding
                .launch_standalone(
                    &caller,
                    StandaloneTicket {
                        client: format!("Cliente {}", n),
                        article: "Fio 20/1".into(),
                        color: "Azul".into(),
                        meters: Quantity::new(300),
                        due_date: None,
                        details: TicketDetails {
                            machine_label: "CT1".into(),
                            ..Default::default()
                        },
                    },
                )
                .unwrap();
            let requests = ["CT1", "CT2", "CT3"]
                .iter()
                .map(|code| AllocationRequest {
                    machine: MachineRef::new(*code),
                    quantity: Some(Quantity::new(100)),
                })
                .collect();
            winding.set_allocations(&caller, &ticket.id, requests).unwrap();
            winding
                .advance(&caller, &ticket.id, TicketState::AwaitingProduction)
                .unwrap();
            winding
                .advance(&caller, &ticket.id, TicketState::InProduction)
                .unwrap();
            ticket.id
        })
        .collect();

    let barrier = Arc::new(Barrier::new(tickets.len()));
    let handles: Vec<_> = tickets
        .iter()
        .cloned()
        .map(|id| {
            let winding = plant.winding();
            let caller = caller.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                winding.finalize_with_machines(&caller, &id).unwrap()
            })
        })
        .collect();

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let entry_ids: HashSet<String> = outcomes
        .iter()
        .flat_map(|o| o.created_entries.iter().map(|e| e.id.clone()))
        .collect();
    assert_eq!(entry_ids.len(), 18);

    for machine in ["b-CT1", "b-CT2", "b-CT3"] {
        let queue = plant.queue().list_queue(machine).unwrap();
        assert_eq!(queue.len(), 6);
        let active = queue
            .iter()
            .filter(|e| e.state == EntryState::Active)
            .count();
        assert_eq!(active, 1, "machine {} should run exactly one entry", machine);
    }
}

#[tokio::test]
async fn test_concurrent_enqueues_from_tasks() {
    let plant = plant();
    let handles: Vec<_> = (0..20)
        .map(|n| {
            let queue = plant.queue();
            tokio::task::spawn_blocking(move || {
                let machine = if n % 2 == 0 { "a-F10" } else { "a-F11" };
                queue.enqueue(&Caller::admin("root"), machine, fields(n))
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for machine in ["a-F10", "a-F11"] {
        let queue = plant.queue().list_queue(machine).unwrap();
        assert_eq!(queue.len(), 10);
        assert!(queue
            .windows(2)
            .all(|pair| pair[0].created_at <= pair[1].created_at));
    }
}
