//! Engine error types

use thiserror::Error;

/// Errors surfaced by the JSON-RPC engines
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The peer answered with a non-null `error` field
    #[error("peer returned an error: {0}")]
    Application(serde_json::Value),

    #[error("no response to call {id} within {timeout_sec} s")]
    Timeout { id: String, timeout_sec: u64 },

    #[error("engine was shut down with the call pending")]
    Shutdown,

    #[error("decode error: {message}")]
    Decode { message: String },
}

impl RpcError {
    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
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
