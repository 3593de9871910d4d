//! Mock transport with scripted responses.
//!
//! Responses are scripted per op type as a FIFO of results; when a script
//! queue is empty the per-type default answers, and when no default is set
//! the transport answers 200 with an empty body. Every request is recorded
//! for assertions, and an optional per-type delay simulates slow backends
//! for cancellation tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use muninn::adapter::transport::{
    Transport, TransportError, TransportRequest, TransportResponse, OP_PRODUCT_CATALOG_FETCH,
    OP_STAND_LIST_FETCH, OP_WALLET_FETCH,
};

/// Scripted transport double.
#[derive(Default)]
pub struct MockTransport {
    scripts: Mutex<HashMap<String, VecDeque<Result<TransportResponse, TransportError>>>>,
    defaults: Mutex<HashMap<String, TransportResponse>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<TransportRequest>>,
}

impl MockTransport {
    /// Creates a transport answering 200 to everything.
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

    /// Sets the fallback response for an op type.
    pub fn set_default(&self, op_type: &str, response: TransportResponse) {
        self.defaults
            .lock()
            .unwrap()
            .insert(op_type.to_string(), response);
    }

    /// Delays every response for an op type; for cancellation timing tests.
    pub fn set_delay(&self, op_type: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(op_type.to_string(), delay);
    }

    /// Stubs the three pull endpoints with well-formed bodies: the given
    /// wallet balance, an empty catalog, and an empty stand list.
    pub fn stub_pulls(&self, balance_cents: i64) {
        self.set_default(
            OP_WALLET_FETCH,
            TransportResponse::new(200)
                .with_body(json!({"balance": balance_cents, "qr": "qr-payload-1"})),
        );
        self.set_default(
            OP_PRODUCT_CATALOG_FETCH,
            TransportResponse::new(200).with_body(json!({"products": []})),
        );
        self.set_default(
            OP_STAND_LIST_FETCH,
            TransportResponse::new(200).with_body(json!({"stands": []})),
        );
    }

    /// Every request seen so far.
    pub fn calls(&self) -> Vec<TransportRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// How many requests carried this op type.
    pub fn call_count(&self, op_type: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.op_type == op_type)
            .count()
    }

    /// Total number of requests.
    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        // Recorded before the delay: a request aborted mid-delay (timeout or
        // cancellation dropped the future) still shows up in the call log.
        self.calls.lock().unwrap().push(request.clone());

        let delay = self.delays.lock().unwrap().get(&request.op_type).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.op_type)
            .and_then(|queue| queue.pop_front());
        if let Some(result) = scripted {
            return result;
        }

        let fallback = self.defaults.lock().unwrap().get(&request.op_type).cloned();
        Ok(fallback.unwrap_or_else(|| TransportResponse::new(200)))
    }
}
