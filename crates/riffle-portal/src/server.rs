// ============================================
// File: crates/riffle-portal/src/server.rs
// ============================================
//! # Portal Listener
//!
//! ## Creation Reason
//! Runs the accept loop behind `Portal::open` and gives the host a
//! handle to stop it.
//!
//! ## Main Functionality
//! - `PortalListener`: Bound address, shutdown, join
//! - Accept loop: every accepted peer finishes its TLS handshake on its
//!   own task, then enters the responder side of the login
//!
//! ## Accept Loop
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ loop                                                     │
//! │   select!                                                │
//! │     shutdown_rx.recv()  ──► break                        │
//! │     listener.accept()   ──► spawn {                      │
//! │                               pending.await (TLS)        │
//! │                               portal.accept_stream(..)   │
//! │                             }                            │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Shutdown stops accepting only; established connections keep running
//! - Handshake failures are logged at `warn` and never stop the loop
//!
//! ## Last Modified
//! v0.1.0 - Initial listener implementation

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use riffle_transport::{SecureListener, TransportError};

use crate::error::Result;
use crate::services::Portal;

/// How long `join` waits for the accept task.
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================
// PortalListener
// ============================================

/// Handle to a running accept loop.
///
/// # Lifecycle
/// 1. Created by `Portal::open` or `Portal::serve`
/// 2. Accepts until `shutdown`
/// 3. `join` waits for the loop to exit
pub struct PortalListener {
    /// Bound address.
    local_addr: SocketAddr,
    /// Shutdown flag.
    shutdown: Arc<AtomicBool>,
    /// Shutdown signal sender.
    shutdown_tx: broadcast::Sender<()>,
    /// Underlying listener.
    listener: Arc<dyn SecureListener>,
    /// Accept task.
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PortalListener {
    pub(crate) fn spawn(portal: Portal, listener: Arc<dyn SecureListener>) -> Result<Self> {
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, _) = broadcast::channel(1);
        let shutdown = Arc::new(AtomicBool::new(false));

        let task = spawn_accept_task(
            portal,
            Arc::clone(&listener),
            Arc::clone(&shutdown),
            shutdown_tx.subscribe(),
        );
        info!(addr = %local_addr, "Portal listening");

        Ok(Self {
            local_addr,
            shutdown,
            shutdown_tx,
            listener,
            task: Mutex::new(Some(task)),
        })
    }

    /// Address the listener is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns `true` until `shutdown` is called.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.shutdown.load(Ordering::SeqCst)
    }

    /// Stops accepting new peers.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
        self.listener.shutdown();
    }

    /// Waits for the accept loop to exit after `shutdown`.
    pub async fn join(&self) {
        let task = self.task.lock().take();
        let Some(task) = task else { return };
        match tokio::time::timeout(JOIN_TIMEOUT, task).await {
            Ok(Ok(())) => debug!("Task 'accept' completed"),
            Ok(Err(e)) => warn!("Task 'accept' failed: {}", e),
            Err(_) => warn!("Task 'accept' timed out during shutdown"),
        }
        info!(addr = %self.local_addr, "Portal listener stopped");
    }
}

impl Drop for PortalListener {
    fn drop(&mut self) {
        if self.is_running() {
            self.shutdown();
        }
    }
}

impl std::fmt::Debug for PortalListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalListener")
            .field("local_addr", &self.local_addr)
            .field("running", &self.is_running())
            .finish()
    }
}

// ============================================
// Accept Task
// ============================================

fn spawn_accept_task(
    portal: Portal,
    listener: Arc<dyn SecureListener>,
    shutdown: Arc<AtomicBool>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("Accept task received shutdown signal");
                    break;
                }
                result = listener.accept() => {
                    match result {
                        Ok(pending) => {
                            let portal = portal.clone();
                            tokio::spawn(async move {
                                match pending.await {
                                    Ok(stream) => {
                                        debug!(peer = %stream.peer_identity(), "Peer authenticated");
                                        let _connection = portal.accept_stream(stream);
                                    }
                                    Err(e) => warn!(error = %e, "Inbound handshake failed"),
                                }
                            });
                        }
                        Err(TransportError::ShuttingDown) => break,
                        Err(e) => {
                            if shutdown.load(Ordering::SeqCst) {
                                break;
                            }
                            error!(error = %e, "Accept failed");
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        }
                    }
                }
            }
        }

        debug!("Accept task exiting");
    })
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{Avatar, AvatarHandler, Matcher, PortalSettings};
    use async_trait::async_trait;
    use riffle_common::Identity;
    use riffle_core::{RemoteFault, Value};
    use riffle_transport::MockListener;

    struct Pong;

    #[async_trait]
    impl AvatarHandler for Pong {
        async fn invoke(
            &self,
            _avatar: &Avatar,
            _method: &str,
            _args: Vec<Value>,
        ) -> std::result::Result<Value, RemoteFault> {
            Ok("pong".into())
        }
    }

    fn portal(pattern: &str) -> Portal {
        let portal = Portal::new(PortalSettings::default());
        portal.add_realm(Matcher::pattern(pattern).unwrap(), |_: &Identity| {
            Arc::new(Pong) as Arc<dyn AvatarHandler>
        });
        portal
    }

    #[tokio::test]
    async fn test_accept_loop_serves_mock_peers() {
        let server = portal("device");
        let mock = Arc::new(MockListener::new(Identity::new("pdserver").unwrap()));
        let accepting: Arc<dyn SecureListener> = mock.clone();
        let listener = server.serve(accepting).unwrap();
        assert!(listener.is_running());

        let device = portal("pd");
        let stream = mock.connect(&Identity::new("device-1").unwrap()).unwrap();
        let proxy = device.connect_stream(stream).await.unwrap();
        assert_eq!(proxy.call("ping", vec![]).await.unwrap().as_str(), Some("pong"));
        assert_eq!(server.realms()[0].connection_count(), 1);

        listener.shutdown();
        listener.join().await;
        assert!(!listener.is_running());
        assert!(!mock.is_active());

        // Established sessions outlive the listener
        assert_eq!(proxy.call("ping", vec![]).await.unwrap().as_str(), Some("pong"));
    }
}
