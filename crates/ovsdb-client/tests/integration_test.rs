//! Integration tests driving a real connection against a scripted OVSDB
//! peer on loopback TCP.

use anyhow::Result;
use ovsdb_client::{
    Condition, ConnectionCallback, LockCallback, LockResult, MonitorCallback, MonitorRequest,
    MonitorRequests, Operation, OvsdbClient, OvsdbConnector, OvsdbError, OvsdbListener,
    TableUpdates,
};
use ovsdb_jsonrpc::FrameDecoder;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// The fake OVSDB server end of a connection
struct Peer {
    stream: TcpStream,
    decoder: FrameDecoder,
}

impl Peer {
    async fn read_frame(&mut self) -> Value {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(frame) = self.decoder.next_frame().expect("peer received bad JSON") {
                return frame;
            }
            let n = self.stream.read(&mut buf).await.expect("peer read failed");
            assert!(n > 0, "connection closed while the peer expected a frame");
            self.decoder.extend(&buf[..n]);
        }
    }

    async fn send(&mut self, frame: Value) {
        self.stream
            .write_all(frame.to_string().as_bytes())
            .await
            .expect("peer write failed");
        self.stream.flush().await.expect("peer flush failed");
    }

    async fn reply_success(&mut self, id: Value, result: Value) {
        self.send(json!({"id": id, "result": result, "error": null}))
            .await;
    }

    /// Round-trip an echo request; because inbound dispatch is ordered,
    /// the reply proves every earlier notification has been delivered.
    async fn sync(&mut self) {
        self.send(json!({"id": "sync", "method": "echo", "params": ["sync"]}))
            .await;
        let reply = self.read_frame().await;
        assert_eq!(reply["id"], json!("sync"));
    }
}

/// Start a one-connection fake peer; returns its address and the accepted
/// connection once the client dials in.
async fn start_peer() -> (String, JoinHandle<Peer>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let accept = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        Peer {
            stream,
            decoder: FrameDecoder::new(),
        }
    });
    (addr, accept)
}

struct NoopConnection;

#[async_trait::async_trait]
impl ConnectionCallback for NoopConnection {
    async fn connected(&self, _client: Arc<OvsdbClient>) {}
    async fn disconnected(&self, _client: Arc<OvsdbClient>) {}
}

struct RecordingConnection {
    events: mpsc::UnboundedSender<&'static str>,
}

#[async_trait::async_trait]
impl ConnectionCallback for RecordingConnection {
    async fn connected(&self, _client: Arc<OvsdbClient>) {
        let _ = self.events.send("connected");
    }
    async fn disconnected(&self, _client: Arc<OvsdbClient>) {
        let _ = self.events.send("disconnected");
    }
}

struct RecordingMonitor {
    updates: mpsc::UnboundedSender<TableUpdates>,
}

#[async_trait::async_trait]
impl MonitorCallback for RecordingMonitor {
    async fn update(&self, updates: TableUpdates) {
        let _ = self.updates.send(updates);
    }
}

struct RecordingLock {
    events: mpsc::UnboundedSender<&'static str>,
}

#[async_trait::async_trait]
impl LockCallback for RecordingLock {
    async fn locked(&self) {
        let _ = self.events.send("locked");
    }
    async fn stolen(&self) {
        let _ = self.events.send("stolen");
    }
}

#[tokio::test]
async fn test_list_databases_roundtrip() -> Result<()> {
    init_tracing();
    let (addr, accept) = start_peer().await;
    let client = OvsdbConnector::new()
        .connect(&addr, Arc::new(NoopConnection))
        .await?;
    let mut peer = accept.await?;

    assert_eq!(client.connection_info().remote_addr().to_string(), addr);
    assert!(client.connection_info().peer_certificate().is_none());

    let call = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.list_databases().await })
    };
    let frame = peer.read_frame().await;
    assert_eq!(frame["method"], json!("list_dbs"));
    assert_eq!(frame["params"], json!([]));
    assert!(frame["id"].is_string());

    peer.reply_success(frame["id"].clone(), json!(["Open_vSwitch"]))
        .await;
    assert_eq!(call.await??, vec!["Open_vSwitch".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_transact_error_surfaces() -> Result<()> {
    init_tracing();
    let (addr, accept) = start_peer().await;
    let client = OvsdbConnector::new()
        .connect(&addr, Arc::new(NoopConnection))
        .await?;
    let mut peer = accept.await?;

    let call = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            client
                .transact(
                    "nope",
                    vec![Operation::select("Bridge", vec![Condition::equals("name", "br0")])],
                )
                .await
        })
    };
    let frame = peer.read_frame().await;
    assert_eq!(frame["method"], json!("transact"));
    assert_eq!(frame["params"][0], json!("nope"));
    assert_eq!(frame["params"][1]["op"], json!("select"));

    peer.send(json!({"id": frame["id"], "result": null, "error": "no such database"}))
        .await;
    match call.await? {
        Err(OvsdbError::RpcApplication(payload)) => {
            assert_eq!(payload, json!("no such database"));
        }
        other => panic!("expected application error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_echo_request_is_answered() -> Result<()> {
    init_tracing();
    let (addr, accept) = start_peer().await;
    let _client = OvsdbConnector::new()
        .connect(&addr, Arc::new(NoopConnection))
        .await?;
    let mut peer = accept.await?;

    peer.send(json!({"id": "x", "method": "echo", "params": [1, "two"]}))
        .await;
    let reply = peer.read_frame().await;
    assert_eq!(reply, json!({"id": "x", "result": [1, "two"], "error": null}));

    // an unclassifiable frame is dropped without harming the connection
    peer.send(json!({"id": "z", "something": "else"})).await;
    peer.sync().await;
    Ok(())
}

#[tokio::test]
async fn test_monitor_updates_and_cancel() -> Result<()> {
    init_tracing();
    let (addr, accept) = start_peer().await;
    let client = OvsdbConnector::new()
        .connect(&addr, Arc::new(NoopConnection))
        .await?;
    let mut peer = accept.await?;

    let (updates_tx, mut updates_rx) = mpsc::unbounded_channel();
    let call = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            client
                .monitor(
                    "Open_vSwitch",
                    "m1",
                    MonitorRequests::default().table("Bridge", MonitorRequest::default()),
                    Arc::new(RecordingMonitor { updates: updates_tx }),
                )
                .await
        })
    };
    let frame = peer.read_frame().await;
    assert_eq!(frame["method"], json!("monitor"));
    assert_eq!(frame["params"], json!(["Open_vSwitch", "m1", {"Bridge": {}}]));
    peer.reply_success(frame["id"].clone(), json!({})).await;
    call.await??;

    // one update reaches the armed callback
    peer.send(json!({
        "id": null,
        "method": "update",
        "params": ["m1", {"Bridge": {"uuid-1": {"new": {"name": "br0"}}}}]
    }))
    .await;
    let delivered = timeout(Duration::from_secs(5), updates_rx.recv())
        .await?
        .expect("update not delivered");
    assert!(delivered.0.contains_key("Bridge"));

    // after a successful cancel, further updates are dropped silently
    let cancel = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.cancel_monitor("m1").await })
    };
    let frame = peer.read_frame().await;
    assert_eq!(frame["method"], json!("monitor_cancel"));
    assert_eq!(frame["params"], json!(["m1"]));
    peer.reply_success(frame["id"].clone(), json!({})).await;
    cancel.await??;

    peer.send(json!({
        "id": null,
        "method": "update",
        "params": ["m1", {"Bridge": {"uuid-2": {"new": {"name": "br1"}}}}]
    }))
    .await;
    peer.sync().await;
    assert!(updates_rx.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn test_timeout_then_late_reply_dropped() -> Result<()> {
    init_tracing();
    let (addr, accept) = start_peer().await;
    let client = OvsdbConnector::new()
        .with_rpc_timeout(Duration::from_millis(200))
        .connect(&addr, Arc::new(NoopConnection))
        .await?;
    let mut peer = accept.await?;

    let call = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.get_schema("Open_vSwitch").await })
    };
    let frame = peer.read_frame().await;
    assert_eq!(frame["method"], json!("get_schema"));
    assert!(matches!(call.await?, Err(OvsdbError::RpcTimeout { .. })));

    // the late reply falls on the floor; the connection stays usable
    peer.reply_success(frame["id"].clone(), json!({"name": "x", "version": "1", "tables": {}}))
        .await;

    let call = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.list_databases().await })
    };
    let frame = peer.read_frame().await;
    peer.reply_success(frame["id"].clone(), json!(["Open_vSwitch"]))
        .await;
    assert_eq!(call.await??, vec!["Open_vSwitch".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_shutdown_cancels_inflight_calls() -> Result<()> {
    init_tracing();
    let (addr, accept) = start_peer().await;
    let client = OvsdbConnector::new()
        .connect(&addr, Arc::new(NoopConnection))
        .await?;
    let mut peer = accept.await?;

    let first = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.list_databases().await })
    };
    let second = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.get_schema("Open_vSwitch").await })
    };
    // both calls are on the wire before the shutdown
    peer.read_frame().await;
    peer.read_frame().await;

    client.shutdown().await;
    client.shutdown().await; // second shutdown is a no-op

    assert!(matches!(first.await?, Err(OvsdbError::RpcShutdown)));
    assert!(matches!(second.await?, Err(OvsdbError::RpcShutdown)));
    assert!(!client.is_active());
    assert!(matches!(
        client.list_databases().await,
        Err(OvsdbError::InactiveClient)
    ));
    Ok(())
}

#[tokio::test]
async fn test_steal_sends_steal_method() -> Result<()> {
    init_tracing();
    let (addr, accept) = start_peer().await;
    let client = OvsdbConnector::new()
        .connect(&addr, Arc::new(NoopConnection))
        .await?;
    let mut peer = accept.await?;

    let call = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.steal("prio-lock").await })
    };
    let frame = peer.read_frame().await;
    assert_eq!(frame["method"], json!("steal"));
    assert_eq!(frame["params"], json!(["prio-lock"]));
    peer.reply_success(frame["id"].clone(), json!({"locked": true}))
        .await;
    assert_eq!(call.await??, LockResult { locked: true });
    Ok(())
}

#[tokio::test]
async fn test_lock_lifecycle_notifications() -> Result<()> {
    init_tracing();
    let (addr, accept) = start_peer().await;
    let client = OvsdbConnector::new()
        .connect(&addr, Arc::new(NoopConnection))
        .await?;
    let mut peer = accept.await?;

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let call = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            client
                .lock("the-lock", Arc::new(RecordingLock { events: events_tx }))
                .await
        })
    };
    let frame = peer.read_frame().await;
    assert_eq!(frame["method"], json!("lock"));
    peer.reply_success(frame["id"].clone(), json!({"locked": false}))
        .await;
    assert_eq!(call.await??, LockResult { locked: false });

    peer.send(json!({"id": null, "method": "locked", "params": ["the-lock"]}))
        .await;
    peer.send(json!({"id": null, "method": "stolen", "params": ["the-lock"]}))
        .await;
    assert_eq!(timeout(Duration::from_secs(5), events_rx.recv()).await?, Some("locked"));
    assert_eq!(timeout(Duration::from_secs(5), events_rx.recv()).await?, Some("stolen"));

    // after unlock, lock notifications no longer reach the callback
    let unlock = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.unlock("the-lock").await })
    };
    let frame = peer.read_frame().await;
    assert_eq!(frame["method"], json!("unlock"));
    peer.reply_success(frame["id"].clone(), json!({})).await;
    unlock.await??;

    peer.send(json!({"id": null, "method": "locked", "params": ["the-lock"]}))
        .await;
    peer.sync().await;
    assert!(events_rx.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn test_connected_then_disconnected_ordering() -> Result<()> {
    init_tracing();
    let (addr, accept) = start_peer().await;
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let client = OvsdbConnector::new()
        .connect(&addr, Arc::new(RecordingConnection { events: events_tx }))
        .await?;
    let peer = accept.await?;

    assert_eq!(
        timeout(Duration::from_secs(5), events_rx.recv()).await?,
        Some("connected")
    );

    drop(peer); // peer hangs up
    assert_eq!(
        timeout(Duration::from_secs(5), events_rx.recv()).await?,
        Some("disconnected")
    );
    assert!(!client.is_active());
    assert!(events_rx.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn test_listener_binds_inbound_connections() -> Result<()> {
    init_tracing();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();

    // pick a free port first, then listen on it
    let probe = TcpListener::bind("127.0.0.1:0").await?;
    let addr = probe.local_addr()?.to_string();
    drop(probe);

    let serve = {
        let addr = addr.clone();
        tokio::spawn(async move {
            let _ = OvsdbListener::new()
                .listen(&addr, Arc::new(RecordingConnection { events: events_tx }))
                .await;
        })
    };

    // a switch dials the controller and pings it with echo
    let mut switch = loop {
        match TcpStream::connect(&addr).await {
            Ok(stream) => {
                break Peer {
                    stream,
                    decoder: FrameDecoder::new(),
                }
            }
            Err(_) => tokio::time::sleep(Duration::from_millis(10)).await,
        }
    };
    assert_eq!(
        timeout(Duration::from_secs(5), events_rx.recv()).await?,
        Some("connected")
    );

    switch
        .send(json!({"id": "ping", "method": "echo", "params": []}))
        .await;
    let reply = switch.read_frame().await;
    assert_eq!(reply, json!({"id": "ping", "result": [], "error": null}));

    serve.abort();
    Ok(())
}
