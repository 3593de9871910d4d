//! Operation handlers and the per-type registry.
//!
//! A handler executes a single operation type against the transport and
//! reports success, a conflict (carrying the server's representation when
//! the response embeds one), or a classified failure the retry policy then
//! evaluates. Handlers are plain boxed-future closures; there is no dynamic
//! dispatch beyond this one lookup.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use serde_json::Value;

use crate::adapter::transport::{Transport, TransportRequest};
use crate::model::operation::{Operation, OperationType, Priority};
use crate::retry::classify::{ErrorCategory, SyncFailure};
use crate::retry::RetryPolicy;
use crate::util::cancel::CancelToken;

/// What a handler reports back to the queue.
#[derive(Debug, Clone)]
pub enum HandlerOutcome {
    /// The server accepted the operation.
    Success,
    /// The server reported a conflict (409); the body's embedded server
    /// representation travels along for the resolver.
    Conflict { server_version: Option<Value> },
}

/// Handler result; failures carry their classification.
pub type HandlerResult = Result<HandlerOutcome, SyncFailure>;

/// Executes one operation; receives a cancellation token derived from the
/// sync's timeout and should abort transport I/O on it.
pub type OperationHandler =
    Arc<dyn Fn(Operation, CancelToken) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Per-type handler and retry-policy registry.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<OperationType, OperationHandler>>,
    policies: RwLock<HashMap<OperationType, RetryPolicy>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_handler(&self, op_type: OperationType, handler: OperationHandler) {
        self.handlers
            .write()
            .expect("handler registry lock poisoned")
            .insert(op_type, handler);
    }

    pub fn handler_for(&self, op_type: OperationType) -> Option<OperationHandler> {
        self.handlers
            .read()
            .expect("handler registry lock poisoned")
            .get(&op_type)
            .cloned()
    }

    pub fn register_policy(&self, op_type: OperationType, policy: RetryPolicy) {
        self.policies
            .write()
            .expect("handler registry lock poisoned")
            .insert(op_type, policy);
    }

    /// Policy for an operation: the registered one, else the critical preset
    /// for critical-priority operations, else the standard preset.
    pub fn policy_for(&self, op_type: OperationType, priority: Priority) -> RetryPolicy {
        if let Some(policy) = self
            .policies
            .read()
            .expect("handler registry lock poisoned")
            .get(&op_type)
        {
            return policy.clone();
        }

        if priority == Priority::Critical {
            RetryPolicy::critical()
        } else {
            RetryPolicy::standard()
        }
    }
}

/// The default push handler: sends the operation through the transport and
/// classifies the response.
///
/// Registered for every operation type at engine initialize; domain code can
/// override individual types afterwards.
pub fn transport_push_handler(transport: Arc<dyn Transport>) -> OperationHandler {
    Arc::new(move |operation: Operation, cancel: CancelToken| {
        let transport = Arc::clone(&transport);

        Box::pin(async move {
            let request = TransportRequest::for_operation(&operation);

            let sent = tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    // Aborted transport I/O counts as a timeout: retryable,
                    // so the operation stays pending for the next run.
                    tracing::debug!(operation = %operation, "push aborted by cancellation");
                    return Err(SyncFailure::new(
                        ErrorCategory::Timeout,
                        "push aborted by sync cancellation",
                    ));
                }

                sent = transport.send(request) => sent,
            };

            match sent {
                Ok(response) if response.is_success() => Ok(HandlerOutcome::Success),
                Ok(response) if response.is_conflict() => {
                    let server_version = response
                        .body
                        .as_ref()
                        .and_then(|body| body.get("server_version").cloned())
                        .or(response.body);
                    Ok(HandlerOutcome::Conflict { server_version })
                }
                Ok(response) => Err(SyncFailure::from_response(&response)
                    .unwrap_or_else(|| SyncFailure::new(ErrorCategory::Unknown, "unclassified response"))),
                Err(error) => Err(SyncFailure::from_transport(&error)),
            }
        })
    })
}
