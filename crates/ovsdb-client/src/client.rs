//! OVSDB client surface
//!
//! Typed wrappers over the duplex engine for the RFC 7047 methods, plus
//! the callback registries that tie asynchronous server notifications back
//! to the caller that armed them. A registry entry is installed strictly
//! after its RPC succeeds, so a callback can never fire for a monitor or
//! lock the server refused.

use crate::callback::{LockCallback, MonitorCallback};
use crate::connection::ConnectionInfo;
use crate::error::{OvsdbError, Result};
use crate::methods::{LockResult, MonitorRequests, TableUpdates};
use crate::operation::{Operation, OperationResult};
use crate::schema::DatabaseSchema;
use ovsdb_jsonrpc::{next_call_id, JsonRpcClient, JsonRpcServer, RpcError, RpcHandler, Transporter};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex, RwLock};
use tracing::{debug, info};

/// OVSDB method names (RFC 7047 §4.1)
pub(crate) mod method {
    pub const LIST_DBS: &str = "list_dbs";
    pub const GET_SCHEMA: &str = "get_schema";
    pub const TRANSACT: &str = "transact";
    pub const MONITOR: &str = "monitor";
    pub const MONITOR_CANCEL: &str = "monitor_cancel";
    pub const LOCK: &str = "lock";
    pub const STEAL: &str = "steal";
    pub const UNLOCK: &str = "unlock";
    pub const ECHO: &str = "echo";
    pub const UPDATE: &str = "update";
    pub const LOCKED: &str = "locked";
    pub const STOLEN: &str = "stolen";
}

pub(crate) type MonitorRegistry = Arc<RwLock<HashMap<String, Arc<dyn MonitorCallback>>>>;
pub(crate) type LockRegistry = Arc<RwLock<HashMap<String, Arc<dyn LockCallback>>>>;

/// Handle to one OVSDB connection
pub struct OvsdbClient {
    rpc: Arc<JsonRpcClient>,
    server: Arc<JsonRpcServer>,
    transporter: Arc<dyn Transporter>,
    monitors: MonitorRegistry,
    locks: LockRegistry,
    info: ConnectionInfo,
    active: AtomicBool,
    closed_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl OvsdbClient {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        rpc: Arc<JsonRpcClient>,
        server: Arc<JsonRpcServer>,
        transporter: Arc<dyn Transporter>,
        monitors: MonitorRegistry,
        locks: LockRegistry,
        info: ConnectionInfo,
        closed_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            rpc,
            server,
            transporter,
            monitors,
            locks,
            info,
            active: AtomicBool::new(true),
            closed_tx: Mutex::new(Some(closed_tx)),
        }
    }

    /// List the databases the server hosts
    pub async fn list_databases(&self) -> Result<Vec<String>> {
        self.call(method::LIST_DBS, vec![]).await
    }

    /// Fetch the schema of one database
    pub async fn get_schema(&self, db_name: &str) -> Result<DatabaseSchema> {
        self.call(method::GET_SCHEMA, vec![Value::String(db_name.into())])
            .await
    }

    /// Run a transaction; results arrive positionally, one per operation
    pub async fn transact(
        &self,
        db_name: &str,
        operations: Vec<Operation>,
    ) -> Result<Vec<OperationResult>> {
        let mut params = Vec::with_capacity(operations.len() + 1);
        params.push(Value::String(db_name.into()));
        for op in &operations {
            params.push(serde_json::to_value(op).map_err(|e| OvsdbError::decode(e.to_string()))?);
        }
        self.call(method::TRANSACT, params).await
    }

    /// Start monitoring tables. The callback is armed only once the server
    /// has accepted the monitor; the reply carries the initial state.
    pub async fn monitor(
        &self,
        db_name: &str,
        monitor_id: &str,
        requests: MonitorRequests,
        callback: Arc<dyn MonitorCallback>,
    ) -> Result<TableUpdates> {
        let params = vec![
            Value::String(db_name.into()),
            Value::String(monitor_id.into()),
            serde_json::to_value(&requests).map_err(|e| OvsdbError::decode(e.to_string()))?,
        ];
        let updates: TableUpdates = self.call(method::MONITOR, params).await?;
        self.monitors
            .write()
            .await
            .insert(monitor_id.to_string(), callback);
        debug!(monitor_id, db_name, "monitor installed");
        Ok(updates)
    }

    /// Cancel a monitor; later `update` notifications for it are dropped
    pub async fn cancel_monitor(&self, monitor_id: &str) -> Result<()> {
        let _: Value = self
            .call(method::MONITOR_CANCEL, vec![Value::String(monitor_id.into())])
            .await?;
        self.monitors.write().await.remove(monitor_id);
        debug!(monitor_id, "monitor cancelled");
        Ok(())
    }

    /// Request the named lock. The callback is armed only on success; the
    /// server sends `locked` once the lock is actually held.
    pub async fn lock(
        &self,
        lock_id: &str,
        callback: Arc<dyn LockCallback>,
    ) -> Result<LockResult> {
        let result: LockResult = self
            .call(method::LOCK, vec![Value::String(lock_id.into())])
            .await?;
        self.locks.write().await.insert(lock_id.to_string(), callback);
        Ok(result)
    }

    /// Take the named lock away from its current owner. No callback is
    /// installed; the caller armed one with a prior `lock`.
    pub async fn steal(&self, lock_id: &str) -> Result<LockResult> {
        self.call(method::STEAL, vec![Value::String(lock_id.into())])
            .await
    }

    /// Release the named lock and disarm its callback
    pub async fn unlock(&self, lock_id: &str) -> Result<()> {
        let _: Value = self
            .call(method::UNLOCK, vec![Value::String(lock_id.into())])
            .await?;
        self.locks.write().await.remove(lock_id);
        Ok(())
    }

    /// Metadata captured when the connection became ready
    pub fn connection_info(&self) -> &ConnectionInfo {
        &self.info
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Tear the client down: cancel every pending call with a shutdown
    /// error, clear both registries and close the transport. Idempotent
    /// and safe under concurrent callers.
    pub async fn shutdown(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        info!(remote = %self.info.remote_addr(), "shutting down OVSDB client");
        self.rpc.shutdown().await;
        self.server.shutdown().await;
        self.monitors.write().await.clear();
        self.locks.write().await.clear();
        self.transporter.close().await;
        if let Some(tx) = self.closed_tx.lock().await.take() {
            let _ = tx.send(());
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T> {
        if !self.active.load(Ordering::SeqCst) {
            return Err(OvsdbError::InactiveClient);
        }
        let id = next_call_id();
        Ok(self.rpc.call(&id, method, params).await?)
    }
}

/// `echo` keeps the connection alive; the reply is the argument vector
/// verbatim.
pub(crate) struct EchoHandler;

#[async_trait::async_trait]
impl RpcHandler for EchoHandler {
    async fn handle(&self, params: Vec<Value>) -> std::result::Result<Value, RpcError> {
        Ok(Value::Array(params))
    }
}

/// `update` notifications carry `[monitor-id, table-updates]`
pub(crate) struct UpdateHandler {
    pub monitors: MonitorRegistry,
}

#[async_trait::async_trait]
impl RpcHandler for UpdateHandler {
    async fn handle(&self, params: Vec<Value>) -> std::result::Result<Value, RpcError> {
        let mut params = params.into_iter();
        let (Some(id_value), Some(updates_value)) = (params.next(), params.next()) else {
            return Err(RpcError::decode("update expects [monitor-id, table-updates]"));
        };
        let monitor_id = id_value
            .as_str()
            .ok_or_else(|| RpcError::decode("monitor id must be a string"))?
            .to_string();

        let callback = self.monitors.read().await.get(&monitor_id).cloned();
        match callback {
            Some(callback) => {
                let updates: TableUpdates = serde_json::from_value(updates_value)
                    .map_err(|e| RpcError::decode(format!("bad table updates: {e}")))?;
                callback.update(updates).await;
            }
            None => debug!(monitor_id = %monitor_id, "update for unknown monitor dropped"),
        }
        Ok(Value::Null)
    }
}

pub(crate) enum LockEvent {
    Locked,
    Stolen,
}

/// `locked`/`stolen` notifications carry `[lock-id]`
pub(crate) struct LockNotificationHandler {
    pub locks: LockRegistry,
    pub event: LockEvent,
}

#[async_trait::async_trait]
impl RpcHandler for LockNotificationHandler {
    async fn handle(&self, params: Vec<Value>) -> std::result::Result<Value, RpcError> {
        let Some(id_value) = params.into_iter().next() else {
            return Err(RpcError::decode("lock notification expects [lock-id]"));
        };
        let lock_id = id_value
            .as_str()
            .ok_or_else(|| RpcError::decode("lock id must be a string"))?
            .to_string();

        let callback = self.locks.read().await.get(&lock_id).cloned();
        match callback {
            Some(callback) => match self.event {
                LockEvent::Locked => callback.locked().await,
                LockEvent::Stolen => callback.stolen().await,
            },
            None => debug!(lock_id = %lock_id, "lock notification for unknown lock dropped"),
        }
        Ok(Value::Null)
    }
}
