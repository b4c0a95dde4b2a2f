//! Error types for the OVSDB client

use ovsdb_jsonrpc::RpcError;
use serde_json::Value;
use thiserror::Error;

/// Errors surfaced to OVSDB callers
#[derive(Error, Debug)]
pub enum OvsdbError {
    /// Operation issued after shutdown or before the connection was bound
    #[error("client is not active")]
    InactiveClient,

    #[error("transport error: {message}")]
    Transport { message: String },

    /// The database answered with a non-null `error` field
    #[error("database error: {0}")]
    RpcApplication(Value),

    #[error("call {id} timed out after {timeout_sec} s")]
    RpcTimeout { id: String, timeout_sec: u64 },

    #[error("client was shut down with the call pending")]
    RpcShutdown,

    #[error("decode error: {message}")]
    Decode { message: String },

    #[error("TLS error: {message}")]
    Tls { message: String },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl OvsdbError {
    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a TLS error
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls {
            message: message.into(),
        }
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }
}

impl From<RpcError> for OvsdbError {
    fn from(e: RpcError) -> Self {
        match e {
            RpcError::Transport { message } => Self::Transport { message },
            RpcError::Application(payload) => Self::RpcApplication(payload),
            RpcError::Timeout { id, timeout_sec } => Self::RpcTimeout { id, timeout_sec },
            RpcError::Shutdown => Self::RpcShutdown,
            RpcError::Decode { message } => Self::Decode { message },
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, OvsdbError>;
