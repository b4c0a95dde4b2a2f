//! JSON-RPC server engine
//!
//! Dispatches inbound requests and notifications to registered handlers.
//! A request (non-null `id`) gets a reply shaped by the handler's declared
//! result shape; a notification (`id: null`) never gets one, whatever the
//! outcome.

use crate::error::RpcError;
use crate::protocol::{field, JsonRpcResponse};
use crate::transport::Transporter;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, warn};

/// Reply shape a handler declares at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    /// Reply with the handler's return value
    Value,
    /// Reply with a null result
    Void,
    /// Never reply, even to a request
    NoReply,
}

/// Inbound method handler. Params arrive positionally as they appeared on
/// the wire; the handler decodes its own arguments.
#[async_trait::async_trait]
pub trait RpcHandler: Send + Sync {
    async fn handle(&self, params: Vec<Value>) -> Result<Value, RpcError>;
}

struct HandlerEntry {
    shape: ResultShape,
    handler: Arc<dyn RpcHandler>,
}

/// Server half of the duplex engine
pub struct JsonRpcServer {
    transporter: Arc<dyn Transporter>,
    handlers: RwLock<HashMap<String, HandlerEntry>>,
}

impl JsonRpcServer {
    pub fn new(transporter: Arc<dyn Transporter>) -> Self {
        Self {
            transporter,
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Bind a handler to a method name
    pub async fn register(
        &self,
        method: impl Into<String>,
        shape: ResultShape,
        handler: Arc<dyn RpcHandler>,
    ) {
        self.handlers
            .write()
            .await
            .insert(method.into(), HandlerEntry { shape, handler });
    }

    /// Dispatch one inbound request or notification frame
    pub async fn handle_request(&self, frame: Value) {
        let id = frame.get(field::ID).cloned().unwrap_or(Value::Null);
        let method = match frame.get(field::METHOD).and_then(Value::as_str) {
            Some(method) => method.to_string(),
            None => {
                warn!(%frame, "request without a string method dropped");
                return;
            }
        };
        let params = match frame.get(field::PARAMS) {
            Some(Value::Array(params)) => params.clone(),
            Some(Value::Null) | None => Vec::new(),
            Some(_) => {
                if id.is_null() {
                    warn!(method = %method, "notification with non-array params dropped");
                } else {
                    self.reply(JsonRpcResponse::error(id, "params must be an array"))
                        .await;
                }
                return;
            }
        };

        let entry = {
            let handlers = self.handlers.read().await;
            handlers
                .get(&method)
                .map(|e| (e.shape, Arc::clone(&e.handler)))
        };
        let Some((shape, handler)) = entry else {
            if id.is_null() {
                warn!(method = %method, "notification for unknown method dropped");
            } else {
                self.reply(JsonRpcResponse::error(id, format!("unknown method: {method}")))
                    .await;
            }
            return;
        };

        match handler.handle(params).await {
            Ok(result) => match shape {
                ResultShape::Value if !id.is_null() => {
                    self.reply(JsonRpcResponse::success(id, result)).await;
                }
                ResultShape::Void if !id.is_null() => {
                    self.reply(JsonRpcResponse::success(id, Value::Null)).await;
                }
                _ => {}
            },
            Err(e) => {
                if id.is_null() {
                    error!(method = %method, error = %e, "notification handler failed");
                } else {
                    self.reply(JsonRpcResponse::error(id, e.to_string())).await;
                }
            }
        }
    }

    /// Drop the handler registry. Idempotent.
    pub async fn shutdown(&self) {
        self.handlers.write().await.clear();
    }

    async fn reply(&self, response: JsonRpcResponse) {
        let frame = match serde_json::to_value(&response) {
            Ok(frame) => frame,
            Err(e) => {
                error!(error = %e, "failed to serialize response");
                return;
            }
        };
        if let Err(e) = self.transporter.send(&frame).await {
            error!(error = %e, "failed to send response");
        }
    }
}
