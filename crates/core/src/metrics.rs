//! Prometheus metrics for the dispatch core.
//!
//! Queue traffic, the ticket fan-out, document numbering and rejected
//! operations. Machine status gauges are collected by the server on scrape.

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts};

use crate::error::DispatchError;

// =============================================================================
// Dispatch queue
// =============================================================================

/// Entries appended to machine queues, by source.
pub static ENTRIES_ENQUEUED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "spindle_entries_enqueued_total",
            "Dispatch entries appended to machine queues",
        ),
        &["source"], // "manual", "ticket"
    )
    .unwrap()
});

pub static ENTRIES_STARTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("spindle_entries_started_total", "Dispatch entries started").unwrap()
});

pub static ENTRIES_FINISHED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("spindle_entries_finished_total", "Dispatch entries finished").unwrap()
});

// =============================================================================
// Winding tickets
// =============================================================================

/// Tickets that reached finished, by path.
pub static TICKETS_FINALIZED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("spindle_tickets_finalized_total", "Winding tickets finished"),
        &["path"], // "machines", "legacy"
    )
    .unwrap()
});

/// Entries created per finalized ticket.
pub static FANOUT_ENTRIES: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "spindle_fanout_entries",
            "Dispatch entries created per finalized ticket",
        )
        .buckets(vec![1.0, 2.0, 3.0, 4.0, 5.0]),
    )
    .unwrap()
});

// =============================================================================
// Numbering and rejections
// =============================================================================

pub static NUMBERS_ISSUED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("spindle_numbers_issued_total", "Document numbers issued").unwrap()
});

/// Operations refused with a recoverable error, by error kind.
pub static OPERATIONS_REJECTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "spindle_operations_rejected_total",
            "Plant operations rejected, by error kind",
        ),
        &["kind"],
    )
    .unwrap()
});

/// Count a failed operation under its error kind.
pub fn record_rejection(error: &DispatchError) {
    OPERATIONS_REJECTED.with_label_values(&[error.kind()]).inc();
}

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(ENTRIES_ENQUEUED.clone()),
        Box::new(ENTRIES_STARTED.clone()),
        Box::new(ENTRIES_FINISHED.clone()),
        Box::new(TICKETS_FINALIZED.clone()),
        Box::new(FANOUT_ENTRIES.clone()),
        Box::new(NUMBERS_ISSUED.clone()),
        Box::new(OPERATIONS_REJECTED.clone()),
    ]
}
