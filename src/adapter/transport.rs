//! Transport contract consumed by the engine.
//!
//! The transport owns auth headers, request ids, and socket timeouts; the
//! engine treats the response shape as opaque and only inspects the status
//! code, the error category, and (for conflicts) the embedded server
//! representation in the body. Signatures are opaque bytes supplied by the
//! caller; the engine never signs payloads itself.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::model::operation::{Operation, OperationMetadata};

/// Reserved op-type for pulling the authoritative wallet snapshot.
pub const OP_WALLET_FETCH: &str = "wallet_fetch";
/// Reserved op-type for pulling the product catalog.
pub const OP_PRODUCT_CATALOG_FETCH: &str = "product_catalog_fetch";
/// Reserved op-type for pulling the stand list.
pub const OP_STAND_LIST_FETCH: &str = "stand_list_fetch";

/// One request handed to the transport.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub op_type: String,
    pub payload: Value,
    pub metadata: OperationMetadata,
    pub signature: Option<Vec<u8>>,
}

impl TransportRequest {
    /// A bare request with empty metadata, used by pull strategies.
    pub fn pull(op_type: &str) -> Self {
        Self {
            op_type: op_type.to_string(),
            payload: Value::Null,
            metadata: OperationMetadata::default(),
            signature: None,
        }
    }

    /// The push request for a stored operation.
    ///
    /// The offline signature travels as opaque bytes decoded from the
    /// metadata slot the caller filled at enqueue time.
    pub fn for_operation(operation: &Operation) -> Self {
        let signature = operation
            .metadata
            .offline_signature
            .as_ref()
            .map(|s| s.as_bytes().to_vec());

        Self {
            op_type: operation.op_type.as_str().to_string(),
            payload: operation.payload.clone(),
            metadata: operation.metadata.clone(),
            signature,
        }
    }
}

/// Response surface the engine inspects.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Option<Value>,
    /// Server-provided `Retry-After`, in seconds, when rate limited.
    pub retry_after: Option<u64>,
}

impl TransportResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            body: None,
            retry_after: None,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_conflict(&self) -> bool {
        self.status == 409
    }
}

/// Failures the transport reports without an HTTP status.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// The request never reached the server.
    #[error("network unreachable: {0}")]
    Network(String),
    /// The request timed out at the socket level.
    #[error("transport request timed out")]
    Timeout,
    /// Anything else (TLS, serialization inside the transport, ...).
    #[error("transport failure: {0}")]
    Other(String),
}

/// Performs signed requests against the festival backend.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}
