use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::middleware::{auth_middleware, metrics_middleware};
use super::{audit, entries, handlers, machines, maintenance, orders, reports, tickets};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Everything except the health probe requires an authenticated operator
    let protected = Router::new()
        // Config, metrics and audit
        .route("/config", get(handlers::get_config))
        .route("/metrics", get(handlers::get_metrics))
        .route("/audit", get(audit::query_audit))
        // Machines
        .route("/machines", get(machines::list_machines))
        .route("/machines/{id}", get(machines::get_machine))
        .route("/machines/{id}/active", put(machines::set_active))
        .route(
            "/machines/{id}/queue",
            get(machines::get_queue).post(machines::enqueue),
        )
        // Dispatch entries
        .route("/entries", get(entries::list_entries))
        .route("/entries/{id}", get(entries::get_entry))
        .route("/entries/{id}/start", post(entries::start_entry))
        .route("/entries/{id}/finish", post(entries::finish_entry))
        // Maintenance
        .route(
            "/maintenance",
            get(maintenance::list_maintenance).post(maintenance::open_maintenance),
        )
        .route("/maintenance/{id}", get(maintenance::get_maintenance))
        .route("/maintenance/{id}/close", post(maintenance::close_maintenance))
        // Production orders
        .route(
            "/orders",
            get(orders::list_orders).post(orders::create_order),
        )
        .route("/orders/pending", get(orders::list_pending_orders))
        .route("/orders/{id}", get(orders::get_order))
        .route("/orders/{id}/draft", put(orders::save_draft))
        .route("/orders/{id}/finish", post(orders::finish_order))
        .route("/orders/{id}/tickets", post(orders::launch_ticket))
        // Winding tickets
        .route(
            "/tickets",
            get(tickets::list_tickets).post(tickets::create_ticket),
        )
        .route(
            "/tickets/{id}",
            get(tickets::get_ticket).delete(tickets::delete_ticket),
        )
        .route("/tickets/{id}/allocations", put(tickets::set_allocations))
        .route("/tickets/{id}/advance", post(tickets::advance_ticket))
        .route("/tickets/{id}/finalize", post(tickets::finalize_ticket))
        .route("/tickets/{id}/finish", post(tickets::finish_ticket))
        // Reports
        .route("/reports/tickets", get(reports::finished_tickets))
        .route("/reports/tickets/{id}", get(reports::ticket_production))
        .route("/reports/orders", get(reports::finished_orders))
        .route("/reports/layouts/{layout}", get(reports::layout_report))
        .route("/reports/maintenance", get(reports::maintenance_history))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected)
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(metrics_middleware)),
        )
}
