// ============================================
// File: crates/riffle-transport/src/mock.rs
// ============================================
//! # In-Memory Transport
//!
//! ## Creation Reason
//! Lets the RPC and login layers be tested without sockets or
//! certificates: streams are `tokio::io::duplex` pipes and the peer
//! identities are simply declared by the test.
//!
//! ## Main Functionality
//! - `secure_pair`: Two connected `SecureStream` ends
//! - `MockListener`: `SecureListener` fed by `connect()` calls
//!
//! ## Usage in Tests
//! ```
//! use riffle_common::Identity;
//! use riffle_transport::mock::secure_pair;
//!
//! let server = Identity::new("pdserver").unwrap();
//! let device = Identity::new("device-1").unwrap();
//! let (at_server, at_device) = secure_pair(&server, &device);
//! assert_eq!(at_server.peer_identity(), &device);
//! assert_eq!(at_device.peer_identity(), &server);
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - This is for testing only - it skips authentication entirely
//! - Queued connections are bounded to prevent memory issues
//!
//! ## Last Modified
//! v0.1.0 - Initial mock implementation

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use riffle_common::Identity;

use crate::error::{Result, TransportError};
use crate::traits::{PendingStream, SecureListener, SecureStream};

// ============================================
// Constants
// ============================================

/// Buffer size of each in-memory pipe direction.
const PIPE_CAPACITY: usize = 64 * 1024;

/// Maximum number of connections waiting in a `MockListener`.
const MAX_QUEUE_SIZE: usize = 128;

// ============================================
// secure_pair
// ============================================

/// Creates two connected stream ends.
///
/// The first end belongs to `local`: its peer identity is `remote`.
/// The second end belongs to `remote`: its peer identity is `local`.
#[must_use]
pub fn secure_pair(local: &Identity, remote: &Identity) -> (SecureStream, SecureStream) {
    let (a, b) = tokio::io::duplex(PIPE_CAPACITY);
    (
        SecureStream::new(Box::new(a), remote.clone(), None),
        SecureStream::new(Box::new(b), local.clone(), None),
    )
}

// ============================================
// MockListener
// ============================================

/// Listener whose inbound connections are created by [`MockListener::connect`].
pub struct MockListener {
    identity: Identity,
    local_addr: SocketAddr,
    queue: Mutex<VecDeque<SecureStream>>,
    notify: Notify,
    shutdown: AtomicBool,
}

impl MockListener {
    /// Creates a listener that authenticates as `identity`.
    #[must_use]
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            local_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Opens a connection from a client named `client`.
    ///
    /// Returns the client's end; the listener's end is queued for `accept`.
    ///
    /// # Errors
    /// Returns `ShuttingDown` after shutdown, or `Io` if the queue is full.
    pub fn connect(&self, client: &Identity) -> Result<SecureStream> {
        if !self.is_active() {
            return Err(TransportError::ShuttingDown);
        }

        let (client_end, server_end) = secure_pair(client, &self.identity);
        {
            let mut queue = self.queue.lock();
            if queue.len() >= MAX_QUEUE_SIZE {
                return Err(TransportError::io(
                    "queueing mock connection",
                    std::io::Error::new(std::io::ErrorKind::WouldBlock, "accept queue full"),
                ));
            }
            queue.push_back(server_end);
        }
        self.notify.notify_one();
        Ok(client_end)
    }

    /// Returns the number of connections waiting to be accepted.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.queue.lock().len()
    }
}

#[async_trait]
impl SecureListener for MockListener {
    async fn accept(&self) -> Result<PendingStream> {
        loop {
            if !self.is_active() {
                return Err(TransportError::ShuttingDown);
            }
            let next = self.queue.lock().pop_front();
            if let Some(stream) = next {
                return Ok(Box::pin(async move { Ok(stream) }));
            }
            self.notify.notified().await;
        }
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.local_addr)
    }

    fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    fn is_active(&self) -> bool {
        !self.shutdown.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for MockListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockListener")
            .field("identity", &self.identity)
            .field("pending", &self.pending_count())
            .field("active", &self.is_active())
            .finish()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn id(name: &str) -> Identity {
        Identity::new(name).unwrap()
    }

    #[tokio::test]
    async fn test_pair_carries_bytes() {
        let (left, right) = secure_pair(&id("a"), &id("b"));
        let (mut l, _, _) = left.into_parts();
        let (mut r, _, _) = right.into_parts();

        l.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        r.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[tokio::test]
    async fn test_listener_accepts_in_order() {
        let listener = MockListener::new(id("pdserver"));
        let c1 = listener.connect(&id("device-1")).unwrap();
        let _c2 = listener.connect(&id("device-2")).unwrap();
        assert_eq!(listener.pending_count(), 2);
        assert_eq!(c1.peer_identity().as_str(), "pdserver");

        let first = listener.accept().await.unwrap().await.unwrap();
        let second = listener.accept().await.unwrap().await.unwrap();
        assert_eq!(first.peer_identity().as_str(), "device-1");
        assert_eq!(second.peer_identity().as_str(), "device-2");
        assert_eq!(listener.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown() {
        let listener = MockListener::new(id("pdserver"));
        assert!(listener.is_active());

        listener.shutdown();

        assert!(!listener.is_active());
        assert!(matches!(
            listener.accept().await,
            Err(TransportError::ShuttingDown)
        ));
        assert!(matches!(
            listener.connect(&id("device-1")),
            Err(TransportError::ShuttingDown)
        ));
    }
}
