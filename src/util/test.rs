//! In-tree test helpers: in-memory database setup and a scripted transport.
//!
//! Integration tests use the `muninn-test-utils` crate; these helpers exist
//! for unit tests inside the library, where the external harness would link
//! a second copy of the crate.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbBackend, Schema};

use crate::adapter::transport::{Transport, TransportError, TransportRequest, TransportResponse};
use crate::conflict::ConflictResolver;
use crate::engine::events::EventBus;
use crate::queue::config::SyncQueueConfig;
use crate::queue::SyncQueue;

/// Fresh in-memory SQLite database with the engine schema.
pub async fn test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Should connect to in-memory sqlite");

    let schema = Schema::new(DbBackend::Sqlite);
    let stmts = vec![
        schema.create_table_from_entity(entity::prelude::SyncOperation),
        schema.create_table_from_entity(entity::prelude::SyncKv),
    ];

    for stmt in stmts {
        db.execute(&stmt).await.expect("Should create table");
    }

    db
}

/// Queue over a fresh database with test-friendly intervals.
pub async fn test_queue() -> Arc<SyncQueue> {
    let db = test_db().await;
    let config = SyncQueueConfig {
        batch_size: 20,
        poll_interval: std::time::Duration::from_millis(10),
        cleanup_interval: std::time::Duration::from_millis(50),
        completed_max_age: std::time::Duration::from_secs(60),
    };

    Arc::new(SyncQueue::new(
        db,
        config,
        Arc::new(ConflictResolver::default()),
        Arc::new(EventBus::new()),
    ))
}

/// Transport double that replays scripted responses per op type.
///
/// Unscripted op types answer 200 with an empty body. Every request is
/// recorded for assertions.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Result<TransportResponse, TransportError>>>>,
    calls: Mutex<Vec<TransportRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues the next response for an op type.
    pub fn script(&self, op_type: &str, result: Result<TransportResponse, TransportError>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(op_type.to_string())
            .or_default()
            .push_back(result);
    }

    /// Queues `count` copies of the same response.
    pub fn script_many(&self, op_type: &str, count: usize, response: TransportResponse) {
        for _ in 0..count {
            self.script(op_type, Ok(response.clone()));
        }
    }

    pub fn calls(&self) -> Vec<TransportRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, op_type: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.op_type == op_type)
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        self.calls.lock().unwrap().push(request.clone());

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.op_type)
            .and_then(|queue| queue.pop_front());

        scripted.unwrap_or_else(|| Ok(TransportResponse::new(200)))
    }
}
