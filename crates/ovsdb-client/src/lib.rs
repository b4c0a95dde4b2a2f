//! Open vSwitch database (RFC 7047) client
//!
//! Connects to an OVSDB server over plain TCP or TLS (or accepts inbound
//! connections from switches in active mode), drives the duplex JSON-RPC
//! conversation, and exposes the typed method surface. Monitor updates and
//! lock notifications are delivered to caller-armed callbacks; a
//! disconnected client is terminal and the caller reconnects.

pub mod callback;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod methods;
pub mod operation;
pub mod schema;
pub mod tls;

pub use callback::{ConnectionCallback, LockCallback, MonitorCallback};
pub use client::OvsdbClient;
pub use connection::{ConnectionInfo, OvsdbConnector, OvsdbListener};
pub use error::{OvsdbError, Result};
pub use methods::{
    LockResult, MonitorRequest, MonitorRequests, MonitorSelect, RowUpdate, TableUpdate,
    TableUpdates,
};
pub use operation::{Condition, Function, Mutation, Mutator, Operation, OperationResult, Row};
pub use schema::{ColumnSchema, DatabaseSchema, TableSchema};
pub use tls::{TlsClientConfig, TlsServerConfig};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::callback::{ConnectionCallback, LockCallback, MonitorCallback};
    pub use super::client::OvsdbClient;
    pub use super::connection::{OvsdbConnector, OvsdbListener};
    pub use super::error::{OvsdbError, Result};
}
