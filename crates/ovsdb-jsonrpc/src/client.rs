//! JSON-RPC client engine
//!
//! Emits requests, correlates responses by call id, enforces the per-call
//! timeout and cancels everything on shutdown. Exactly one of response,
//! timeout or shutdown resolves each call; whichever removes the pending
//! entry wins the race.

use crate::error::RpcError;
use crate::protocol::{field, JsonRpcRequest};
use crate::transport::Transporter;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

struct PendingCall {
    slot: oneshot::Sender<Result<Value, RpcError>>,
    timer: JoinHandle<()>,
}

/// Client half of the duplex engine
pub struct JsonRpcClient {
    transporter: Arc<dyn Transporter>,
    pending: Arc<Mutex<HashMap<String, PendingCall>>>,
    timeout: Duration,
    shut: AtomicBool,
}

impl JsonRpcClient {
    pub fn new(transporter: Arc<dyn Transporter>, timeout: Duration) -> Self {
        Self {
            transporter,
            pending: Arc::new(Mutex::new(HashMap::new())),
            timeout,
            shut: AtomicBool::new(false),
        }
    }

    /// Issue a call and wait for its correlated response, decoded into `T`.
    ///
    /// The deadline timer is armed when the request is enqueued, so the
    /// timeout covers transport latency as well as server time.
    pub async fn call<T: DeserializeOwned>(
        &self,
        id: &str,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, RpcError> {
        if self.shut.load(Ordering::SeqCst) {
            return Err(RpcError::Shutdown);
        }

        let request = JsonRpcRequest::new(id, method, params);
        let frame = serde_json::to_value(&request).map_err(|e| RpcError::decode(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        {
            // arming the timer under the table lock keeps it from firing
            // before the entry it is meant to remove exists
            let mut pending = self.pending.lock().await;
            let timer = self.arm_timer(id);
            pending.insert(id.to_string(), PendingCall { slot: tx, timer });
        }

        // shutdown may have raced the insert; make sure no entry survives
        if self.shut.load(Ordering::SeqCst) {
            if let Some(call) = self.pending.lock().await.remove(id) {
                call.timer.abort();
                drop(call.slot);
            }
            return Err(RpcError::Shutdown);
        }

        if let Err(e) = self.transporter.send(&frame).await {
            // the entry comes out before the transport error propagates
            if let Some(call) = self.pending.lock().await.remove(id) {
                call.timer.abort();
                drop(call.slot);
            }
            return Err(e);
        }
        debug!(id, method, "request sent");

        let raw = match rx.await {
            Ok(outcome) => outcome?,
            // the slot was dropped without a verdict; only teardown does that
            Err(_) => return Err(RpcError::Shutdown),
        };
        serde_json::from_value(raw).map_err(|e| RpcError::decode(e.to_string()))
    }

    /// Deliver an inbound response frame to its waiting call.
    ///
    /// A response for an unknown id is dropped: the call already timed out,
    /// was cancelled, or the peer answered twice.
    pub async fn handle_response(&self, frame: Value) {
        let id = match frame.get(field::ID).and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                warn!(%frame, "response without a string id dropped");
                return;
            }
        };
        let Some(call) = self.pending.lock().await.remove(&id) else {
            debug!(id = %id, "response for unknown call dropped");
            return;
        };
        call.timer.abort();

        let error = frame.get(field::ERROR).cloned().unwrap_or(Value::Null);
        let outcome = if error.is_null() {
            Ok(frame.get(field::RESULT).cloned().unwrap_or(Value::Null))
        } else {
            // a frame carrying both result and error is a failure: error wins
            Err(RpcError::Application(error))
        };
        let _ = call.slot.send(outcome);
    }

    /// Cancel every pending call with a shutdown error. Idempotent.
    pub async fn shutdown(&self) {
        if self.shut.swap(true, Ordering::SeqCst) {
            return;
        }
        let drained: Vec<(String, PendingCall)> = self.pending.lock().await.drain().collect();
        for (id, call) in drained {
            debug!(id = %id, "cancelling pending call on shutdown");
            call.timer.abort();
            let _ = call.slot.send(Err(RpcError::Shutdown));
        }
    }

    fn arm_timer(&self, id: &str) -> JoinHandle<()> {
        let id = id.to_string();
        let pending = Arc::clone(&self.pending);
        let timeout = self.timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(call) = pending.lock().await.remove(&id) {
                warn!(id = %id, timeout_sec = timeout.as_secs(), "call timed out");
                let _ = call.slot.send(Err(RpcError::Timeout {
                    id,
                    timeout_sec: timeout.as_secs(),
                }));
            }
        })
    }
}
