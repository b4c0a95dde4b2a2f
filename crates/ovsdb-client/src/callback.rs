//! Caller-facing callback capabilities
//!
//! All callbacks run on the runtime, never on the connection's reader task.
//! A slow callback delays later notifications on the same connection but
//! never response correlation.

use crate::client::OvsdbClient;
use crate::methods::TableUpdates;
use std::sync::Arc;

/// Connection lifecycle callback
#[async_trait::async_trait]
pub trait ConnectionCallback: Send + Sync {
    /// Invoked exactly once per client, before any other callback
    async fn connected(&self, client: Arc<OvsdbClient>);

    /// Invoked at most once, after every other callback
    async fn disconnected(&self, client: Arc<OvsdbClient>);
}

/// Monitor update callback, armed by a successful `monitor` call
#[async_trait::async_trait]
pub trait MonitorCallback: Send + Sync {
    async fn update(&self, updates: TableUpdates);
}

/// Lock state callback, armed by a successful `lock` call
#[async_trait::async_trait]
pub trait LockCallback: Send + Sync {
    /// The lock was acquired
    async fn locked(&self);

    /// The lock was revoked by another client's `steal`
    async fn stolen(&self);
}
