//! Production order to machine queue, driven entirely over HTTP.

mod common;

use axum::http::StatusCode;
use serde_json::{json, Value};
use spindle_core::{AuditFilter, SubjectKind};

use common::{TestConfig, TestFixture, EXTERNAL, INTERNAL};

fn order_body() -> Value {
    json!({
        "client": "Malharia Sul",
        "article": "Fio 30/1",
        "color": "Cru",
        "meters": "1.000",
        "due_date": "2025-03-01"
    })
}

async fn advance(fixture: &TestFixture, ticket_id: &str, target: &str) -> common::TestResponse {
    fixture
        .post(
            &format!("/api/v1/tickets/{}/advance", ticket_id),
            json!({ "target": target }),
        )
        .await
}

async fn standalone_ticket(fixture: &TestFixture) -> String {
    let response = fixture
        .post(
            "/api/v1/tickets",
            json!({ "client": "Beta", "meters": 150, "machine_label": "CD9" }),
        )
        .await;
    assert_status!(response, StatusCode::CREATED);
    response.body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_order_to_machines() {
    let fixture = TestFixture::new().await;

    let order = fixture
        .send(
            Some(INTERNAL),
            "POST",
            "/api/v1/orders",
            Some(order_body()),
            &[],
        )
        .await;
    assert_status!(order, StatusCode::CREATED);
    assert_json_path!(order.body, "number", json!(1001));
    assert_json_path!(order.body, "state", json!("pending"));
    let order_id = order.body["id"].as_str().unwrap().to_string();

    let pending = fixture.get("/api/v1/orders/pending").await;
    assert_eq!(pending.body.as_array().unwrap().len(), 1);

    let by_number = fixture.get("/api/v1/orders/1001").await;
    assert_json_path!(by_number.body, "id", json!(order_id));

    let draft = fixture
        .put(
            &format!("/api/v1/orders/{}/draft", order_id),
            json!({
                "machine_label": "CD1",
                "raw_material": "Algodao",
                "allocations": [
                    { "machine": "CD1", "quantity": "600" },
                    { "machine": "CD2", "quantity": "400" }
                ]
            }),
        )
        .await;
    assert_status!(draft, StatusCode::OK);
    assert_json_path!(draft.body["draft"], "edited_by", json!("ana"));

    let launched = fixture
        .send(
            Some(INTERNAL),
            "POST",
            &format!("/api/v1/orders/{}/tickets", order_id),
            None,
            &[],
        )
        .await;
    assert_status!(launched, StatusCode::CREATED);
    assert_json_path!(launched.body, "os_number", json!(1001));
    assert_json_path!(launched.body, "raw_material", json!("Algodao"));
    assert_eq!(launched.body["allocations"].as_array().unwrap().len(), 2);
    let ticket_id = launched.body["id"].as_str().unwrap().to_string();

    let order = fixture.get(&format!("/api/v1/orders/{}", order_id)).await;
    assert_json_path!(order.body, "state", json!("in_production"));

    assert_status!(
        advance(&fixture, &ticket_id, "awaiting_production").await,
        StatusCode::OK
    );
    // Allocations are frozen once the ticket leaves pending
    let frozen = fixture
        .put(
            &format!("/api/v1/tickets/{}/allocations", ticket_id),
            json!({ "allocations": [] }),
        )
        .await;
    assert_status!(frozen, StatusCode::CONFLICT);
    assert_status!(
        advance(&fixture, &ticket_id, "in_production").await,
        StatusCode::OK
    );

    let finalized = fixture
        .post(&format!("/api/v1/tickets/{}/finalize", ticket_id), json!({}))
        .await;
    assert_status!(finalized, StatusCode::OK);
    assert_json_path!(finalized.body["ticket"], "state", json!("finished"));
    let entries = finalized.body["created_entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    for entry in entries {
        assert_eq!(entry["ticket_id"], json!(ticket_id));
        assert_eq!(entry["os_number"], json!(1001));
        assert_eq!(entry["state"], json!("active"));
    }

    let cd1 = fixture.get("/api/v1/machines/a-CD1").await;
    assert_json_path!(cd1.body, "status", json!("in_production"));

    let again = fixture
        .post(&format!("/api/v1/tickets/{}/finalize", ticket_id), json!({}))
        .await;
    assert_status!(again, StatusCode::CONFLICT);

    let report = fixture
        .get(&format!("/api/v1/reports/tickets/{}", ticket_id))
        .await;
    assert_status!(report, StatusCode::OK);
    assert_json_path!(report.body, "allocated_total", json!(1000));
    assert_json_path!(report.body["counts"], "active", json!(2));
    assert_json_path!(report.body, "complete", json!(false));

    let denied = fixture
        .send(
            Some(INTERNAL),
            "GET",
            &format!("/api/v1/reports/tickets/{}", ticket_id),
            None,
            &[],
        )
        .await;
    assert_status!(denied, StatusCode::FORBIDDEN);

    let filter = AuditFilter::for_subject(SubjectKind::Ticket, &ticket_id);
    let records = fixture.wait_for_audit(&filter, 4).await;
    let types: Vec<&str> = records.iter().map(|r| r.event_type.as_str()).collect();
    assert!(types.contains(&"ticket_launched"));
    assert!(types.contains(&"ticket_finalized"));

    let audit = fixture
        .get(&format!(
            "/api/v1/audit?subject=ticket&subject_id={}&event_type=ticket_advanced",
            ticket_id
        ))
        .await;
    assert_status!(audit, StatusCode::OK);
    assert_json_path!(audit.body, "total", json!(2));
}

#[tokio::test]
async fn test_fan_out_without_auto_start() {
    let fixture = TestFixture::with_config(TestConfig {
        auto_start_idle: false,
    })
    .await;
    let ticket_id = standalone_ticket(&fixture).await;

    let allocated = fixture
        .put(
            &format!("/api/v1/tickets/{}/allocations", ticket_id),
            json!({ "allocations": [
                { "machine": "U4", "quantity": 100 },
                { "machine": "CT1", "layout": "b", "quantity": "50" }
            ]}),
        )
        .await;
    assert_status!(allocated, StatusCode::OK);
    assert_eq!(allocated.body["allocations"][0]["machine_id"], json!("b-U4"));

    advance(&fixture, &ticket_id, "awaiting_production").await;
    advance(&fixture, &ticket_id, "in_production").await;
    let finalized = fixture
        .post(&format!("/api/v1/tickets/{}/finalize", ticket_id), json!({}))
        .await;
    assert_status!(finalized, StatusCode::OK);

    let u4 = fixture.get("/api/v1/machines/b-U4").await;
    assert_json_path!(u4.body, "status", json!("queued"));

    let listed = fixture
        .get(&format!("/api/v1/entries?ticket_id={}", ticket_id))
        .await;
    assert_json_path!(listed.body, "total", json!(2));
}

#[tokio::test]
async fn test_ticket_transitions_are_linear() {
    let fixture = TestFixture::new().await;
    let ticket_id = standalone_ticket(&fixture).await;

    let skipped = advance(&fixture, &ticket_id, "in_production").await;
    assert_status!(skipped, StatusCode::CONFLICT);
    assert_json_path!(skipped.body, "kind", json!("invalid_transition"));

    let unknown_machine = fixture
        .put(
            &format!("/api/v1/tickets/{}/allocations", ticket_id),
            json!({ "allocations": [{ "machine": "ZZ1", "quantity": 5 }] }),
        )
        .await;
    assert_status!(unknown_machine, StatusCode::NOT_FOUND);

    let denied = fixture
        .send(
            Some(EXTERNAL),
            "POST",
            &format!("/api/v1/tickets/{}/advance", ticket_id),
            Some(json!({ "target": "awaiting_production" })),
            &[],
        )
        .await;
    assert_status!(denied, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_legacy_finish_without_machines() {
    let fixture = TestFixture::new().await;
    let ticket_id = standalone_ticket(&fixture).await;
    advance(&fixture, &ticket_id, "awaiting_production").await;
    advance(&fixture, &ticket_id, "in_production").await;

    let no_allocations = fixture
        .post(&format!("/api/v1/tickets/{}/finalize", ticket_id), json!({}))
        .await;
    assert_status!(no_allocations, StatusCode::UNPROCESSABLE_ENTITY);

    let finished = fixture
        .post(&format!("/api/v1/tickets/{}/finish", ticket_id), json!({}))
        .await;
    assert_status!(finished, StatusCode::OK);
    assert_json_path!(finished.body, "state", json!("finished"));

    let board = fixture.get("/api/v1/tickets").await;
    assert!(board.body["tickets"].as_array().unwrap().is_empty());
    let everything = fixture.get("/api/v1/tickets?include_finished=true").await;
    assert_eq!(everything.body["tickets"].as_array().unwrap().len(), 1);

    let report = fixture.get("/api/v1/reports/tickets").await;
    assert_eq!(report.body["rows"].as_array().unwrap().len(), 1);
    assert_json_path!(report.body, "truncated", json!(false));
}

#[tokio::test]
async fn test_delete_pending_ticket_keeps_order() {
    let fixture = TestFixture::new().await;
    let order = fixture.post("/api/v1/orders", order_body()).await;
    let order_id = order.body["id"].as_str().unwrap().to_string();
    let ticket = fixture
        .post(&format!("/api/v1/orders/{}/tickets", order_id), json!({}))
        .await;
    let ticket_id = ticket.body["id"].as_str().unwrap().to_string();

    let deleted = fixture
        .delete(&format!("/api/v1/tickets/{}", ticket_id))
        .await;
    assert_status!(deleted, StatusCode::OK);

    let gone = fixture.get(&format!("/api/v1/tickets/{}", ticket_id)).await;
    assert_status!(gone, StatusCode::NOT_FOUND);

    let order = fixture.get(&format!("/api/v1/orders/{}", order_id)).await;
    assert_json_path!(order.body, "state", json!("in_production"));

    let other = standalone_ticket(&fixture).await;
    advance(&fixture, &other, "awaiting_production").await;
    let not_pending = fixture.delete(&format!("/api/v1/tickets/{}", other)).await;
    assert_status!(not_pending, StatusCode::CONFLICT);
}
