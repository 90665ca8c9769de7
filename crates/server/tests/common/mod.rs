//! Common test utilities for in-process API testing.
//!
//! The fixture builds the real router over a temporary SQLite database with
//! token auth and three operators, one per role.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use spindle_core::{
    create_audit_system, create_authenticator, load_config_from_str, AuditFilter, AuditRecord,
    AuditStore, Authenticator, FleetCatalog, Plant, PlantOptions, SqliteAuditStore, SqliteStore,
};
use spindle_server::{create_router, AppState};

pub const ADMIN: &str = "t-ana";
pub const INTERNAL: &str = "t-ines";
pub const EXTERNAL: &str = "t-edu";

/// Test fixture owning the router and its database.
pub struct TestFixture {
    pub router: Router,
    pub audit_store: Arc<dyn AuditStore>,
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

/// Configuration for test fixture.
#[derive(Debug, Clone)]
pub struct TestConfig {
    pub auto_start_idle: bool,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            auto_start_idle: true,
        }
    }
}

fn config_toml(test_config: &TestConfig) -> String {
    format!(
        r#"
[auth]
method = "token"

[[auth.tokens]]
token = "{ADMIN}"
username = "ana"
role = "admin"

[[auth.tokens]]
token = "{INTERNAL}"
username = "ines"
role = "internal_operator"

[[auth.tokens]]
token = "{EXTERNAL}"
username = "edu"
role = "external_operator"

[dispatch]
auto_start_idle = {}
"#,
        test_config.auto_start_idle
    )
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let config =
            load_config_from_str(&config_toml(&test_config)).expect("Failed to parse config");
        let authenticator: Arc<dyn Authenticator> = Arc::from(
            create_authenticator(&config.auth).expect("Failed to create authenticator"),
        );

        let audit_store: Arc<dyn AuditStore> =
            Arc::new(SqliteAuditStore::new(&db_path).expect("Failed to create audit store"));
        let (audit_handle, audit_writer) = create_audit_system(Arc::clone(&audit_store), 100);
        tokio::spawn(audit_writer.run());

        let store = Arc::new(SqliteStore::new(&db_path).expect("Failed to open plant store"));
        let plant = Plant::new(store, PlantOptions::from(&config), Some(audit_handle));
        plant
            .initialize(&FleetCatalog::from_config(&config.fleet))
            .expect("Failed to initialize plant");

        let state = Arc::new(AppState::new(
            config,
            authenticator,
            plant,
            Arc::clone(&audit_store),
        ));

        Self {
            router: create_router(state),
            audit_store,
            temp_dir,
        }
    }

    /// GET as the admin operator.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.send(Some(ADMIN), "GET", path, None, &[]).await
    }

    /// POST as the admin operator.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.send(Some(ADMIN), "POST", path, Some(body), &[]).await
    }

    /// PUT as the admin operator.
    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.send(Some(ADMIN), "PUT", path, Some(body), &[]).await
    }

    /// DELETE as the admin operator.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.send(Some(ADMIN), "DELETE", path, None, &[]).await
    }

    /// Send a request with an explicit token (or none) and extra headers.
    pub async fn send(
        &self,
        token: Option<&str>,
        method: &str,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            request_builder = request_builder.header("Authorization", format!("Bearer {}", token));
        }
        for (name, value) in headers {
            request_builder = request_builder.header(*name, *value);
        }

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body_bytes).into()))
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Poll the audit store until `count` events match, since the writer
    /// runs in the background.
    pub async fn wait_for_audit(&self, filter: &AuditFilter, count: usize) -> Vec<AuditRecord> {
        for _ in 0..40 {
            let records = self.audit_store.query(filter).expect("audit query");
            if records.len() >= count {
                return records;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        self.audit_store.query(filter).expect("audit query")
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}

/// Helper to assert a JSON path equals expected value.
#[macro_export]
macro_rules! assert_json_path {
    ($json:expr, $path:expr, $expected:expr) => {
        let actual = &$json[$path];
        assert_eq!(
            actual, &$expected,
            "Path '{}' expected {:?}, got {:?}",
            $path, $expected, actual
        );
    };
}
