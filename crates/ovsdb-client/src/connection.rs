//! Connection lifecycle
//!
//! Binds the two engine halves to a live byte stream once it is ready
//! (after the TLS handshake when TLS is configured), runs the reader and
//! dispatcher tasks, and tears everything down on disconnect. A connection
//! is pending until the stream is ready, active while the engines run, and
//! closed once either side ends it; a closed client never comes back.

use crate::callback::ConnectionCallback;
use crate::client::{
    method, EchoHandler, LockEvent, LockNotificationHandler, LockRegistry, MonitorRegistry,
    OvsdbClient, UpdateHandler,
};
use crate::config;
use crate::error::{OvsdbError, Result};
use crate::tls::{TlsClientConfig, TlsServerConfig};
use ovsdb_jsonrpc::{
    classify, FrameDecoder, FrameKind, JsonRpcClient, JsonRpcServer, ResultShape, RpcError,
    Transporter,
};
use rustls::pki_types::CertificateDer;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

/// Connection metadata captured once, when the stream becomes ready
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    peer_certificate: Option<CertificateDer<'static>>,
}

impl ConnectionInfo {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Present iff TLS is in use and the peer presented a certificate chain
    pub fn peer_certificate(&self) -> Option<&CertificateDer<'static>> {
        self.peer_certificate.as_ref()
    }
}

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Transporter over the write half of the connection. Concurrent sends
/// serialize on the writer lock so every frame goes out contiguous.
struct StreamTransporter {
    writer: Mutex<BoxedWriter>,
}

#[async_trait::async_trait]
impl Transporter for StreamTransporter {
    async fn send(&self, frame: &Value) -> std::result::Result<(), RpcError> {
        let bytes = serde_json::to_vec(frame).map_err(|e| RpcError::decode(e.to_string()))?;
        let mut writer = self.writer.lock().await;
        writer
            .write_all(&bytes)
            .await
            .map_err(|e| RpcError::transport(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| RpcError::transport(e.to_string()))
    }

    async fn close(&self) {
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!(error = %e, "error closing writer");
        }
    }
}

/// Establishes outbound OVSDB connections
pub struct OvsdbConnector {
    tls: Option<TlsClientConfig>,
    rpc_timeout: Duration,
}

impl OvsdbConnector {
    pub fn new() -> Self {
        Self {
            tls: None,
            rpc_timeout: config::rpc_timeout(),
        }
    }

    /// Wrap the connection in TLS after the TCP stream opens
    pub fn with_tls(mut self, tls: TlsClientConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Override the RPC timeout taken from the environment
    pub fn with_rpc_timeout(mut self, rpc_timeout: Duration) -> Self {
        self.rpc_timeout = rpc_timeout;
        self
    }

    /// Connect to an OVSDB server and bind a client to the stream.
    ///
    /// With TLS configured the client exists only after the handshake
    /// completes; the peer certificate is captured at that moment. The
    /// `connected` callback fires before any other callback.
    pub async fn connect(
        &self,
        addr: &str,
        callback: Arc<dyn ConnectionCallback>,
    ) -> Result<Arc<OvsdbClient>> {
        let stream = TcpStream::connect(addr).await?;
        let local_addr = stream.local_addr()?;
        let remote_addr = stream.peer_addr()?;
        info!(%remote_addr, "connected to OVSDB server");

        match &self.tls {
            Some(tls) => {
                let connector = tls.build_connector()?;
                let server_name = tls.resolved_server_name(addr)?;
                let tls_stream = connector
                    .connect(server_name, stream)
                    .await
                    .map_err(|e| OvsdbError::tls(format!("handshake failed: {e}")))?;
                let peer_certificate = tls_stream
                    .get_ref()
                    .1
                    .peer_certificates()
                    .and_then(|certs| certs.first())
                    .cloned();
                let info = ConnectionInfo {
                    local_addr,
                    remote_addr,
                    peer_certificate,
                };
                let (reader, writer) = tokio::io::split(tls_stream);
                Ok(bind(Box::new(reader), Box::new(writer), info, self.rpc_timeout, callback).await)
            }
            None => {
                let info = ConnectionInfo {
                    local_addr,
                    remote_addr,
                    peer_certificate: None,
                };
                let (reader, writer) = stream.into_split();
                Ok(bind(Box::new(reader), Box::new(writer), info, self.rpc_timeout, callback).await)
            }
        }
    }
}

impl Default for OvsdbConnector {
    fn default() -> Self {
        Self::new()
    }
}

/// Accepts inbound OVSDB connections. Switches configured for active mode
/// dial the controller; every accepted stream is bound exactly like an
/// outbound one.
pub struct OvsdbListener {
    tls: Option<TlsServerConfig>,
    rpc_timeout: Duration,
}

impl OvsdbListener {
    pub fn new() -> Self {
        Self {
            tls: None,
            rpc_timeout: config::rpc_timeout(),
        }
    }

    /// Terminate TLS on accepted connections
    pub fn with_tls(mut self, tls: TlsServerConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Override the RPC timeout taken from the environment
    pub fn with_rpc_timeout(mut self, rpc_timeout: Duration) -> Self {
        self.rpc_timeout = rpc_timeout;
        self
    }

    /// Listen on `addr`, invoking `callback.connected` for every peer.
    /// Runs until the listener socket itself fails.
    pub async fn listen(&self, addr: &str, callback: Arc<dyn ConnectionCallback>) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "listening for OVSDB connections");
        let acceptor = match &self.tls {
            Some(tls) => Some(tls.build_acceptor()?),
            None => None,
        };

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            debug!(%remote_addr, "inbound OVSDB connection");
            let acceptor = acceptor.clone();
            let callback = Arc::clone(&callback);
            let rpc_timeout = self.rpc_timeout;
            tokio::spawn(async move {
                if let Err(e) = accept_connection(stream, acceptor, rpc_timeout, callback).await {
                    warn!(%remote_addr, error = %e, "failed to bind inbound connection");
                }
            });
        }
    }
}

impl Default for OvsdbListener {
    fn default() -> Self {
        Self::new()
    }
}

async fn accept_connection(
    stream: TcpStream,
    acceptor: Option<TlsAcceptor>,
    rpc_timeout: Duration,
    callback: Arc<dyn ConnectionCallback>,
) -> Result<()> {
    let local_addr = stream.local_addr()?;
    let remote_addr = stream.peer_addr()?;
    match acceptor {
        Some(acceptor) => {
            let tls_stream = acceptor
                .accept(stream)
                .await
                .map_err(|e| OvsdbError::tls(format!("handshake failed: {e}")))?;
            let peer_certificate = tls_stream
                .get_ref()
                .1
                .peer_certificates()
                .and_then(|certs| certs.first())
                .cloned();
            let info = ConnectionInfo {
                local_addr,
                remote_addr,
                peer_certificate,
            };
            let (reader, writer) = tokio::io::split(tls_stream);
            bind(Box::new(reader), Box::new(writer), info, rpc_timeout, callback).await;
        }
        None => {
            let info = ConnectionInfo {
                local_addr,
                remote_addr,
                peer_certificate: None,
            };
            let (reader, writer) = stream.into_split();
            bind(Box::new(reader), Box::new(writer), info, rpc_timeout, callback).await;
        }
    }
    Ok(())
}

/// Bind both engines to a ready stream and start its tasks
async fn bind(
    reader: BoxedReader,
    writer: BoxedWriter,
    info: ConnectionInfo,
    rpc_timeout: Duration,
    callback: Arc<dyn ConnectionCallback>,
) -> Arc<OvsdbClient> {
    let transporter: Arc<dyn Transporter> = Arc::new(StreamTransporter {
        writer: Mutex::new(writer),
    });
    let rpc = Arc::new(JsonRpcClient::new(Arc::clone(&transporter), rpc_timeout));
    let server = Arc::new(JsonRpcServer::new(Arc::clone(&transporter)));
    let monitors: MonitorRegistry = Arc::new(RwLock::new(HashMap::new()));
    let locks: LockRegistry = Arc::new(RwLock::new(HashMap::new()));

    server
        .register(method::ECHO, ResultShape::Value, Arc::new(EchoHandler))
        .await;
    server
        .register(
            method::UPDATE,
            ResultShape::Void,
            Arc::new(UpdateHandler {
                monitors: Arc::clone(&monitors),
            }),
        )
        .await;
    server
        .register(
            method::LOCKED,
            ResultShape::Void,
            Arc::new(LockNotificationHandler {
                locks: Arc::clone(&locks),
                event: LockEvent::Locked,
            }),
        )
        .await;
    server
        .register(
            method::STOLEN,
            ResultShape::Void,
            Arc::new(LockNotificationHandler {
                locks: Arc::clone(&locks),
                event: LockEvent::Stolen,
            }),
        )
        .await;

    let (closed_tx, closed_rx) = oneshot::channel();
    let client = Arc::new(OvsdbClient::new(
        Arc::clone(&rpc),
        Arc::clone(&server),
        transporter,
        monitors,
        locks,
        info,
        closed_tx,
    ));

    // dispatcher: runs handlers and user callbacks off the reader, in
    // arrival order, so per-monitor delivery stays ordered and a slow
    // callback never stalls response correlation
    let (dispatch_tx, mut dispatch_rx) = mpsc::unbounded_channel::<Value>();
    {
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            while let Some(frame) = dispatch_rx.recv().await {
                server.handle_request(frame).await;
            }
        });
    }

    // lifecycle: connected strictly first, disconnected strictly last
    {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            callback.connected(Arc::clone(&client)).await;
            if closed_rx.await.is_ok() {
                callback.disconnected(client).await;
            }
        });
    }

    // reader: parses and classifies, never runs user code
    {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            read_loop(reader, rpc, dispatch_tx).await;
            client.shutdown().await;
        });
    }

    client
}

async fn read_loop(
    mut reader: BoxedReader,
    rpc: Arc<JsonRpcClient>,
    dispatch_tx: mpsc::UnboundedSender<Value>,
) {
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                info!("peer closed the connection");
                return;
            }
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "read failed");
                return;
            }
        };
        decoder.extend(&buf[..n]);
        loop {
            match decoder.next_frame() {
                Ok(Some(frame)) => route_frame(frame, &rpc, &dispatch_tx).await,
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "undecodable data on connection");
                    return;
                }
            }
        }
    }
}

async fn route_frame(
    frame: Value,
    rpc: &JsonRpcClient,
    dispatch_tx: &mpsc::UnboundedSender<Value>,
) {
    match classify(&frame) {
        FrameKind::RequestOrNotification => {
            if dispatch_tx.send(frame).is_err() {
                debug!("dispatcher gone, inbound frame dropped");
            }
        }
        FrameKind::Response => rpc.handle_response(frame).await,
        FrameKind::Invalid => warn!(%frame, "unclassifiable frame dropped"),
    }
}
