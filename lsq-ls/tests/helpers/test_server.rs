//! Test server wrapper for integration tests
//!
//! Provides an in-memory-database service instance whose router is driven
//! directly through tower, no socket binding required.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use lsq_common::events::LsqEvent;
use lsq_ls::api::{build_router, AppContext};
use lsq_ls::notify::NotificationDispatcher;
use lsq_ls::state::SharedState;
use lsq_ls::store::ProfileStore;

/// Test server instance with full API over an in-memory database
pub struct TestServer {
    router: Router,
    pub store: Arc<ProfileStore>,
    pub state: Arc<SharedState>,
    pub db_pool: SqlitePool,
}

impl TestServer {
    /// Start a new test server with an in-memory database
    pub async fn start() -> Self {
        let (store, state, db_pool) = test_store().await;

        let ctx = AppContext {
            store: Arc::clone(&store),
            state: Arc::clone(&state),
            db_pool: db_pool.clone(),
        };

        TestServer {
            router: build_router(ctx),
            store,
            state,
            db_pool,
        }
    }

    /// Subscribe to the event bus for assertions on emitted events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<LsqEvent> {
        self.state.subscribe_events()
    }

    /// Send a request with an optional JSON body, returning status + JSON body
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).expect("request construction"))
            .await
            .expect("router call");

        let status = response.status();
        let bytes = http_body_util::BodyExt::collect(response.into_body())
            .await
            .expect("body collect")
            .to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        (status, json)
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request("POST", uri, Some(body)).await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request("GET", uri, None).await
    }

    pub async fn patch(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request("PATCH", uri, Some(body)).await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.request("DELETE", uri, None).await
    }
}

/// Store + shared state over an in-memory database, for non-HTTP tests
///
/// A single pooled connection keeps every query on the same in-memory
/// database.
pub async fn test_store() -> (Arc<ProfileStore>, Arc<SharedState>, SqlitePool) {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory database");
    lsq_common::db::create_tables(&db_pool)
        .await
        .expect("schema creation");

    let state = Arc::new(SharedState::new());
    let dispatcher = Arc::new(NotificationDispatcher::new(None));
    let store = Arc::new(ProfileStore::new(
        db_pool.clone(),
        state.event_bus.clone(),
        dispatcher,
        Duration::from_secs(5),
    ));

    (store, state, db_pool)
}

/// Raw ingest body in the canonical camelCase spelling
pub fn raw_event(event_id: &str, identity_key: &str, event_type: &str) -> Value {
    serde_json::json!({
        "eventId": event_id,
        "identityKey": identity_key,
        "type": event_type,
        "timestamp": "2026-03-01T10:00:00Z",
    })
}
