//! Transport capability

use crate::error::RpcError;
use serde_json::Value;

/// Opaque send/close capability over the underlying byte stream.
///
/// `send` serializes the frame to UTF-8 JSON and writes it as one logical
/// unit. It must be safe to invoke from any task; implementations serialize
/// concurrent writers internally. The engines never inspect the medium.
#[async_trait::async_trait]
pub trait Transporter: Send + Sync {
    async fn send(&self, frame: &Value) -> Result<(), RpcError>;

    async fn close(&self);
}
