//! JSON-RPC 1.0 wire types and frame classification
//!
//! OVSDB uses JSON-RPC 1.0: a request carries `method`, `params` and `id`;
//! a notification is a request with `id: null`; a response carries `result`,
//! `error` and the originating `id`, all three keys always present.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

/// Frame field names shared by the classifier and both engines
pub mod field {
    pub const ID: &str = "id";
    pub const METHOD: &str = "method";
    pub const PARAMS: &str = "params";
    pub const RESULT: &str = "result";
    pub const ERROR: &str = "error";
}

/// JSON-RPC 1.0 request, or notification when `id` is null
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub method: String,
    pub params: Vec<Value>,
    pub id: Value,
}

impl JsonRpcRequest {
    /// Create a request with a non-null string id
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            params,
            id: Value::String(id.into()),
        }
    }
}

/// JSON-RPC 1.0 response. Exactly one of `result`/`error` is non-null;
/// both keys are serialized regardless so the peer can classify the frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub result: Value,
    pub error: Value,
    pub id: Value,
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            result,
            error: Value::Null,
            id,
        }
    }

    /// Create an error response
    pub fn error(id: Value, error: impl Into<String>) -> Self {
        Self {
            result: Value::Null,
            error: Value::String(error.into()),
            id,
        }
    }
}

/// How an inbound frame should be routed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    RequestOrNotification,
    Response,
    Invalid,
}

/// Classify a parsed frame by shape alone.
///
/// The presence of the keys decides, not their values: the id spaces of
/// outbound calls and inbound requests are independent, so routing must
/// never consult the pending-call table. A frame carrying all five keys
/// classifies as a request.
pub fn classify(frame: &Value) -> FrameKind {
    let Some(obj) = frame.as_object() else {
        return FrameKind::Invalid;
    };
    if obj.contains_key(field::ID)
        && obj.contains_key(field::METHOD)
        && obj.contains_key(field::PARAMS)
    {
        FrameKind::RequestOrNotification
    } else if obj.contains_key(field::ID)
        && obj.contains_key(field::RESULT)
        && obj.contains_key(field::ERROR)
    {
        FrameKind::Response
    } else {
        FrameKind::Invalid
    }
}

static CALL_ID: AtomicU64 = AtomicU64::new(0);

/// Next outbound call id: the decimal form of a counter that is never
/// reused for the lifetime of the process.
pub fn next_call_id() -> String {
    CALL_ID.fetch_add(1, Ordering::Relaxed).to_string()
}
