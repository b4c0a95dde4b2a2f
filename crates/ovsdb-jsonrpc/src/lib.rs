//! JSON-RPC 1.0 duplex engine for OVSDB connections
//!
//! OVSDB carries a bidirectional JSON-RPC 1.0 conversation over a single
//! byte stream: both peers issue requests and both send replies. This crate
//! provides the two engine halves (client and server), the frame decoder
//! and classifier that route inbound traffic between them, and the
//! transport capability they share.

pub mod client;
pub mod codec;
pub mod error;
pub mod protocol;
pub mod server;
pub mod transport;

pub use client::JsonRpcClient;
pub use codec::FrameDecoder;
pub use error::RpcError;
pub use protocol::{classify, next_call_id, FrameKind, JsonRpcRequest, JsonRpcResponse};
pub use server::{JsonRpcServer, ResultShape, RpcHandler};
pub use transport::Transporter;
