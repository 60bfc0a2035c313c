// ============================================
// File: crates/riffle-portal/src/rpc/connection.rs
// ============================================
//! # Connection Broker
//!
//! ## Creation Reason
//! Owns one authenticated stream and everything bound to it: the objects
//! this side exported, the calls still waiting for an answer, and the
//! hooks that must run once when the stream goes away.
//!
//! ## Main Functionality
//! - `Connection::spawn`: Start reader/writer tasks over a `SecureStream`
//! - `call` / `release`: Outbound calls and handle drops
//! - `export` / `export_root`: Make local objects invocable by the peer
//! - `on_release` / `on_disconnect`: One-shot cleanup hooks
//! - `close`: Tear down, failing every pending call
//!
//! ## Task Layout
//! ```text
//!            ┌───────────────┐  Bytes (mpsc)   ┌──────────────┐
//!  call() ──►│  Connection   │ ───────────────►│ write task   │──► stream
//!            │  pending[id]  │                 └──────────────┘
//!            │  exports[id]  │◄── dispatch ────┌──────────────┐
//!            └───────────────┘                 │ read task    │◄── stream
//!                    ▲                         └──────┬───────┘
//!                    │      one task per inbound Call │
//!                    └────────────────────────────────┘
//! ```
//!
//! ## Close Order
//! 1. Mark closed and wake both I/O tasks
//! 2. Fail every pending call with `ConnectionClosed`
//! 3. Run disconnect hooks (exactly once)
//! 4. Drop all exports and release hooks
//!
//! When the stream itself fails, the error is kept as a `StreamFailure`
//! so a caller that only saw `ConnectionClosed` can ask why.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Frames are encoded on the caller's task so size errors reach the
//!   caller instead of killing the writer
//! - Never hold a table guard while running a hook; hooks re-enter
//! - Exported objects may hold `RemoteRef`s back into this connection;
//!   `close` clearing the table is what breaks that cycle
//!
//! ## Last Modified
//! v0.1.0 - Initial broker implementation

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, trace, warn};

use riffle_common::{ConnectionId, Identity, ObjectId};
use riffle_core::protocol::Codec;
use riffle_core::{FaultKind, Frame, FrameCodec, RemoteFault, Value};
use riffle_transport::{SecureIo, SecureStream};

use crate::error::{PortalError, Result};
use crate::rpc::object::{CallContext, Referenceable};
use crate::rpc::proxy::RemoteRef;

// ============================================
// Constants
// ============================================

/// Initial capacity of the read buffer.
const READ_BUFFER_SIZE: usize = 8 * 1024;

type Hook = Box<dyn FnOnce() + Send + 'static>;
type PendingReply = oneshot::Sender<Result<Value>>;

// ============================================
// StreamFailure
// ============================================

/// I/O error that closed a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFailure {
    /// Kind of the underlying I/O error.
    pub kind: io::ErrorKind,
    /// Error text, including any TLS alert.
    pub message: String,
}

impl StreamFailure {
    fn from_io(err: &io::Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Returns `true` if the peer's TLS layer refused us.
    ///
    /// A TLS 1.3 server checks the client certificate after the client
    /// considers the handshake done, so the rejection arrives as a fatal
    /// alert (`InvalidData`) or a reset on the first read.
    #[must_use]
    pub fn is_tls_rejection(&self) -> bool {
        matches!(
            self.kind,
            io::ErrorKind::InvalidData | io::ErrorKind::ConnectionReset
        )
    }
}

impl fmt::Display for StreamFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

// ============================================
// Connection
// ============================================

/// Cheap, cloneable handle to one live peer connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

struct Inner {
    id: ConnectionId,
    peer_identity: Identity,
    peer_addr: Option<SocketAddr>,
    codec: FrameCodec,

    outbound: mpsc::UnboundedSender<Bytes>,

    pending: DashMap<u64, PendingReply>,
    next_call: AtomicU64,

    exports: DashMap<ObjectId, Arc<dyn Referenceable>>,
    next_export: AtomicU64,
    release_hooks: Mutex<HashMap<ObjectId, Vec<Hook>>>,

    disconnect_hooks: Mutex<Vec<Hook>>,
    failure: Mutex<Option<StreamFailure>>,
    closed: AtomicBool,
    closed_tx: watch::Sender<bool>,
    closed_rx: watch::Receiver<bool>,
}

impl Connection {
    /// Takes ownership of `stream` and starts its I/O tasks.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn(stream: SecureStream, codec: FrameCodec) -> Self {
        let (io, peer_identity, peer_addr) = stream.into_parts();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = watch::channel(false);

        let connection = Self {
            inner: Arc::new(Inner {
                id: ConnectionId::next(),
                peer_identity,
                peer_addr,
                codec,
                outbound,
                pending: DashMap::new(),
                next_call: AtomicU64::new(1),
                exports: DashMap::new(),
                next_export: AtomicU64::new(1),
                release_hooks: Mutex::new(HashMap::new()),
                disconnect_hooks: Mutex::new(Vec::new()),
                failure: Mutex::new(None),
                closed: AtomicBool::new(false),
                closed_tx,
                closed_rx,
            }),
        };

        debug!(
            connection = %connection.id(),
            peer = %connection.peer_identity(),
            addr = ?connection.peer_addr(),
            "Connection started"
        );

        let (reader, writer) = tokio::io::split(io);
        tokio::spawn(read_loop(connection.clone(), reader));
        tokio::spawn(write_loop(connection.clone(), writer, outbound_rx));

        connection
    }

    // ========================================
    // Accessors
    // ========================================

    /// Process-unique id, for logging.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Verified identity of the peer.
    #[must_use]
    pub fn peer_identity(&self) -> &Identity {
        &self.inner.peer_identity
    }

    /// Network address of the peer, if any.
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.inner.peer_addr
    }

    /// Returns `true` once `close` has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// The I/O error that closed the connection, if the stream failed.
    #[must_use]
    pub fn stream_failure(&self) -> Option<StreamFailure> {
        self.inner.failure.lock().clone()
    }

    /// Number of objects currently exported to the peer.
    #[must_use]
    pub fn export_count(&self) -> usize {
        self.inner.exports.len()
    }

    /// Completes when the connection closes.
    pub async fn closed(&self) {
        let mut rx = self.inner.closed_rx.clone();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    // ========================================
    // Exports
    // ========================================

    /// Exports `object` under a fresh id.
    pub fn export(&self, object: Arc<dyn Referenceable>) -> ObjectId {
        let id = ObjectId::new(self.inner.next_export.fetch_add(1, Ordering::Relaxed));
        self.inner.exports.insert(id, object);
        trace!(connection = %self.id(), object = %id, "Exported object");
        id
    }

    /// Exports `object` as the handshake root.
    pub fn export_root(&self, object: Arc<dyn Referenceable>) {
        self.inner.exports.insert(ObjectId::ROOT, object);
    }

    /// Runs `hook` once when the peer releases `id`.
    pub fn on_release(&self, id: ObjectId, hook: impl FnOnce() + Send + 'static) {
        self.inner
            .release_hooks
            .lock()
            .entry(id)
            .or_default()
            .push(Box::new(hook));
    }

    /// Runs `hook` once when the connection closes, or right away if it
    /// already has.
    pub fn on_disconnect(&self, hook: impl FnOnce() + Send + 'static) {
        {
            let mut hooks = self.inner.disconnect_hooks.lock();
            if !self.is_closed() {
                hooks.push(Box::new(hook));
                return;
            }
        }
        hook();
    }

    // ========================================
    // Outbound
    // ========================================

    /// Handle to an object exported by the peer.
    #[must_use]
    pub fn remote_ref(&self, target: ObjectId) -> RemoteRef {
        RemoteRef::new(self.clone(), target)
    }

    /// Handle to the peer's handshake root.
    #[must_use]
    pub fn root(&self) -> RemoteRef {
        self.remote_ref(ObjectId::ROOT)
    }

    /// Invokes `method` on the peer's object `target`.
    ///
    /// # Errors
    /// - `RemoteCall` if the peer answered with a fault
    /// - `ConnectionClosed` if the connection closed first
    /// - `Protocol` if the call could not be encoded
    pub async fn call(&self, target: ObjectId, method: &str, args: Vec<Value>) -> Result<Value> {
        if self.is_closed() {
            return Err(PortalError::ConnectionClosed);
        }

        let id = self.inner.next_call.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.inner.pending.insert(id, tx);

        // close() may have drained the table between the check and the insert
        if self.is_closed() {
            self.inner.pending.remove(&id);
            return Err(PortalError::ConnectionClosed);
        }

        let frame = Frame::Call {
            id,
            target,
            method: method.to_owned(),
            args,
        };
        if let Err(e) = self.send(&frame) {
            self.inner.pending.remove(&id);
            return Err(e);
        }

        rx.await.unwrap_or(Err(PortalError::ConnectionClosed))
    }

    /// Tells the peer we dropped our handle to its object `target`.
    ///
    /// # Errors
    /// Returns `ConnectionClosed` if the connection is gone.
    pub fn release(&self, target: ObjectId) -> Result<()> {
        self.send(&Frame::Release { target })
    }

    fn send(&self, frame: &Frame) -> Result<()> {
        if self.is_closed() {
            return Err(PortalError::ConnectionClosed);
        }
        let mut buf = BytesMut::new();
        self.inner.codec.encode(frame, &mut buf)?;
        trace!(connection = %self.id(), frame = frame.kind(), bytes = buf.len(), "Queued frame");
        self.inner
            .outbound
            .send(buf.freeze())
            .map_err(|_| PortalError::ConnectionClosed)
    }

    // ========================================
    // Close
    // ========================================

    /// Closes the connection. Idempotent.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.inner.closed_tx.send(true);

        let ids: Vec<u64> = self.inner.pending.iter().map(|entry| *entry.key()).collect();
        let failed = ids.len();
        for id in ids {
            if let Some((_, tx)) = self.inner.pending.remove(&id) {
                let _ = tx.send(Err(PortalError::ConnectionClosed));
            }
        }

        let hooks = std::mem::take(&mut *self.inner.disconnect_hooks.lock());
        for hook in hooks {
            hook();
        }

        self.inner.exports.clear();
        self.inner.release_hooks.lock().clear();

        info!(
            connection = %self.id(),
            peer = %self.peer_identity(),
            failed_calls = failed,
            "Connection closed"
        );
    }

    /// Closes after a stream error, keeping the error for `stream_failure`.
    fn fail(&self, err: &io::Error) {
        if self.is_closed() {
            return;
        }
        self.inner.failure.lock().get_or_insert_with(|| StreamFailure::from_io(err));
        self.close();
    }

    // ========================================
    // Inbound
    // ========================================

    fn dispatch(&self, frame: Frame) {
        trace!(connection = %self.id(), frame = frame.kind(), "Received frame");
        match frame {
            Frame::Call {
                id,
                target,
                method,
                args,
            } => self.handle_call(id, target, method, args),
            Frame::Reply { id, value } => self.complete(id, Ok(value)),
            Frame::Fault { id, fault } => self.complete(id, Err(PortalError::RemoteCall(fault))),
            Frame::Release { target } => self.handle_release(target),
        }
    }

    fn handle_call(&self, id: u64, target: ObjectId, method: String, args: Vec<Value>) {
        let object = self.inner.exports.get(&target).map(|entry| Arc::clone(entry.value()));
        let Some(object) = object else {
            debug!(connection = %self.id(), object = %target, method = %method, "Call to unknown object");
            let fault = RemoteFault::new(FaultKind::NoSuchObject, format!("{target} is not exported"));
            let _ = self.send(&Frame::Fault { id, fault });
            return;
        };

        let connection = self.clone();
        tokio::spawn(async move {
            let ctx = CallContext::new(connection.clone());
            let frame = match object.invoke(&ctx, &method, args).await {
                Ok(value) => Frame::Reply { id, value },
                Err(fault) => Frame::Fault { id, fault },
            };
            if let Err(PortalError::Protocol(e)) = connection.send(&frame) {
                warn!(connection = %connection.id(), method = %method, error = %e, "Reply not sendable");
                let fault = RemoteFault::new(FaultKind::Internal, e.to_string());
                let _ = connection.send(&Frame::Fault { id, fault });
            }
        });
    }

    fn complete(&self, id: u64, outcome: Result<Value>) {
        match self.inner.pending.remove(&id) {
            Some((_, tx)) => {
                let _ = tx.send(outcome);
            }
            None => debug!(connection = %self.id(), call = id, "Answer for unknown call"),
        }
    }

    fn handle_release(&self, target: ObjectId) {
        let removed = self.inner.exports.remove(&target).is_some();
        let hooks = self.inner.release_hooks.lock().remove(&target).unwrap_or_default();
        debug!(
            connection = %self.id(),
            object = %target,
            removed,
            hooks = hooks.len(),
            "Peer released object"
        );
        for hook in hooks {
            hook();
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("peer_identity", &self.inner.peer_identity)
            .field("peer_addr", &self.inner.peer_addr)
            .field("exports", &self.inner.exports.len())
            .field("pending", &self.inner.pending.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ============================================
// I/O Tasks
// ============================================

async fn read_loop(connection: Connection, mut reader: ReadHalf<Box<dyn SecureIo>>) {
    let codec = connection.inner.codec;
    let mut closed = connection.inner.closed_rx.clone();
    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);

    loop {
        loop {
            match FrameCodec::check_complete(&buf, codec.max_frame_size()) {
                Ok(Some(len)) => {
                    let mut record = buf.split_to(len).freeze();
                    match codec.decode(&mut record) {
                        Ok(frame) => connection.dispatch(frame),
                        Err(e) => {
                            warn!(connection = %connection.id(), error = %e, "Bad frame, closing");
                            connection.close();
                            return;
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(connection = %connection.id(), error = %e, "Bad frame header, closing");
                    connection.close();
                    return;
                }
            }
        }

        tokio::select! {
            _ = closed.changed() => return,
            result = reader.read_buf(&mut buf) => match result {
                Ok(0) => {
                    debug!(connection = %connection.id(), "Peer closed the stream");
                    connection.close();
                    return;
                }
                Ok(n) => trace!(connection = %connection.id(), bytes = n, "Read"),
                Err(e) => {
                    debug!(connection = %connection.id(), error = %e, "Read failed");
                    connection.fail(&e);
                    return;
                }
            }
        }
    }
}

async fn write_loop(
    connection: Connection,
    mut writer: WriteHalf<Box<dyn SecureIo>>,
    mut outbound: mpsc::UnboundedReceiver<Bytes>,
) {
    let mut closed = connection.inner.closed_rx.clone();

    loop {
        tokio::select! {
            _ = closed.changed() => break,
            next = outbound.recv() => {
                let Some(bytes) = next else { break };
                if let Err(e) = write_record(&mut writer, &bytes).await {
                    debug!(connection = %connection.id(), error = %e, "Write failed");
                    connection.fail(&e);
                    break;
                }
            }
        }
    }

    // Flush whatever was queued before the close
    while let Ok(bytes) = outbound.try_recv() {
        if write_record(&mut writer, &bytes).await.is_err() {
            break;
        }
    }
    let _ = writer.shutdown().await;
    trace!(connection = %connection.id(), "Writer stopped");
}

async fn write_record(writer: &mut WriteHalf<Box<dyn SecureIo>>, bytes: &[u8]) -> std::io::Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await
}

// ============================================
// Test Support
// ============================================

/// Stream whose every read fails the way tokio-rustls reports a fatal
/// alert; writes are swallowed.
#[cfg(test)]
pub(crate) fn refused_stream(peer: &Identity, alert: &str) -> SecureStream {
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

    struct Refused(String);

    impl AsyncRead for Refused {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::InvalidData, self.0.clone())))
        }
    }

    impl AsyncWrite for Refused {
        fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    SecureStream::new(Box::new(Refused(alert.to_owned())), peer.clone(), None)
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use riffle_transport::secure_pair;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct Echo;

    #[async_trait]
    impl Referenceable for Echo {
        async fn invoke(
            &self,
            ctx: &CallContext,
            method: &str,
            args: Vec<Value>,
        ) -> std::result::Result<Value, RemoteFault> {
            match method {
                "echo" => Ok(Value::List(args)),
                "whoami" => Ok(ctx.peer_identity().as_str().into()),
                "stall" => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(Value::Null)
                }
                other => Err(RemoteFault::no_such_method(other)),
            }
        }
    }

    fn pair() -> (Connection, Connection) {
        let a = Identity::new("device-1").unwrap();
        let b = Identity::new("pdserver").unwrap();
        let (left, right) = secure_pair(&a, &b);
        (
            Connection::spawn(left, FrameCodec::default()),
            Connection::spawn(right, FrameCodec::default()),
        )
    }

    #[tokio::test]
    async fn test_call_round_trip() {
        let (client, server) = pair();
        server.export_root(Arc::new(Echo));

        let value = client
            .call(ObjectId::ROOT, "echo", vec!["hi".into(), Value::Int(2)])
            .await
            .unwrap();
        assert_eq!(value, Value::List(vec!["hi".into(), Value::Int(2)]));

        // The server end sees the caller's identity
        let who = client.call(ObjectId::ROOT, "whoami", vec![]).await.unwrap();
        assert_eq!(who.as_str(), Some("device-1"));
    }

    #[tokio::test]
    async fn test_faults_reach_the_caller() {
        let (client, server) = pair();
        server.export_root(Arc::new(Echo));

        let err = client.call(ObjectId::ROOT, "reboot", vec![]).await.unwrap_err();
        assert!(matches!(
            err,
            PortalError::RemoteCall(RemoteFault { kind: FaultKind::NoSuchMethod, .. })
        ));

        let err = client.call(ObjectId::new(42), "echo", vec![]).await.unwrap_err();
        assert!(matches!(
            err,
            PortalError::RemoteCall(RemoteFault { kind: FaultKind::NoSuchObject, .. })
        ));
    }

    #[tokio::test]
    async fn test_release_removes_export_and_fires_hook() {
        let (client, server) = pair();
        let id = server.export(Arc::new(Echo));
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        server.on_release(id, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        client.release(id).unwrap();
        // A call queued after the release is answered after it
        let err = client.call(id, "echo", vec![]).await.unwrap_err();
        assert!(matches!(err, PortalError::RemoteCall(_)));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(server.export_count(), 0);
    }

    #[tokio::test]
    async fn test_close_fails_pending_calls_and_runs_hooks_once() {
        let (client, server) = pair();
        server.export_root(Arc::new(Echo));

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        client.on_disconnect(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let caller = client.clone();
        let stalled =
            tokio::spawn(async move { caller.call(ObjectId::ROOT, "stall", vec![]).await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        client.close();
        client.close();

        let result = stalled.await.unwrap();
        assert!(matches!(result, Err(PortalError::ConnectionClosed)));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(client.is_closed());

        let err = client.call(ObjectId::ROOT, "echo", vec![]).await.unwrap_err();
        assert!(matches!(err, PortalError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_peer_close_is_observed() {
        let (client, server) = pair();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        server.on_disconnect(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        client.close();
        tokio::time::timeout(Duration::from_secs(5), server.closed())
            .await
            .unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        // A clean EOF is not a stream failure
        assert!(server.stream_failure().is_none());
        assert!(client.stream_failure().is_none());
    }

    #[tokio::test]
    async fn test_read_error_is_kept_as_stream_failure() {
        let peer = Identity::new("pdserver").unwrap();
        let connection = Connection::spawn(
            refused_stream(&peer, "received fatal alert: BadCertificate"),
            FrameCodec::default(),
        );
        tokio::time::timeout(Duration::from_secs(5), connection.closed())
            .await
            .unwrap();

        let failure = connection.stream_failure().unwrap();
        assert_eq!(failure.kind, io::ErrorKind::InvalidData);
        assert!(failure.is_tls_rejection());
        assert!(failure.to_string().contains("BadCertificate"));

        let err = connection.call(ObjectId::ROOT, "echo", vec![]).await.unwrap_err();
        assert!(matches!(err, PortalError::ConnectionClosed));
    }

    #[test]
    fn test_only_alert_like_failures_count_as_tls_rejection() {
        let reset = StreamFailure {
            kind: io::ErrorKind::ConnectionReset,
            message: "connection reset by peer".into(),
        };
        let broken = StreamFailure {
            kind: io::ErrorKind::BrokenPipe,
            message: "broken pipe".into(),
        };
        assert!(reset.is_tls_rejection());
        assert!(!broken.is_tls_rejection());
    }

    #[tokio::test]
    async fn test_on_disconnect_after_close_runs_immediately() {
        let (client, _server) = pair();
        client.close();

        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        client.on_disconnect(move || flag.store(true, Ordering::SeqCst));
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_oversize_call_is_rejected_locally() {
        let a = Identity::new("device-1").unwrap();
        let b = Identity::new("pdserver").unwrap();
        let (left, right) = secure_pair(&a, &b);
        let client = Connection::spawn(left, FrameCodec::new(64));
        let _server = Connection::spawn(right, FrameCodec::new(64));

        let err = client
            .call(ObjectId::ROOT, "echo", vec![Value::Str("x".repeat(256))])
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Protocol(_)));
        assert!(!client.is_closed());
    }
}
