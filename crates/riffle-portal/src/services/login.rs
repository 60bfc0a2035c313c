// ============================================
// File: crates/riffle-portal/src/services/login.rs
// ============================================
//! # Login Handshake
//!
//! ## Creation Reason
//! Turns a freshly authenticated stream into a pair of linked avatars:
//! each side ends up with a registered avatar for the other and a
//! `CapabilityProxy` to the other's avatar of itself.
//!
//! ## Protocol Flow
//! ```text
//! Initiator                                           Responder
//!     │ ═══════════════ mutual TLS ══════════════════════ │
//!     │ identity(peer cert)               identity(peer cert)
//!     │                                                   │
//!     │ partial_login(peer) ─► avatar A (Created)         │
//!     │ export A as #n                                    │
//!     │ ── Call{target=ROOT, "login", [Remote(#n)]} ────► │
//!     │                          Portal::login(peer, #n)  │
//!     │                          ─► avatar B (Initialized)│
//!     │                          export B as #m           │
//!     │ ◄────────────────────── Reply{Remote(#m)} ─────── │
//!     │ complete_login(A, #m)                             │
//!     │ ─► avatar A (Initialized)                         │
//!     ▼ CapabilityProxy(#m)                               ▼
//! ```
//!
//! ## Cleanup Binding
//! On both sides the avatar's `LogoutHandle` fires on whichever comes
//! first: the peer releasing the exported avatar, or the connection
//! closing.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Identities come from the verified transport, never from arguments
//! - Any initiator failure closes the connection
//! - The responder closes connections that have not logged in within
//!   the handshake timeout, and accepts one `login` per connection
//!
//! ## Last Modified
//! v0.1.0 - Initial handshake implementation

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use riffle_common::{ConnectionId, ObjectId};
use riffle_core::{CoreError, RemoteFault, Value};
use riffle_transport::SecureStream;

use crate::error::{PortalError, Result};
use crate::rpc::{CallContext, CapabilityProxy, Connection, Referenceable};
use crate::services::avatar::Avatar;
use crate::services::logout::LogoutHandle;
use crate::services::portal::Portal;

/// Method name of the responder root's login entry point.
pub const LOGIN_METHOD: &str = "login";

// ============================================
// Handshake State
// ============================================

/// Progress of one login handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Mutual TLS finished.
    TransportEstablished,
    /// Peer identity derived from its certificate.
    IdentityResolved,
    /// Initiator built (but did not register) its avatar for the peer.
    PartialSelfBuilt,
    /// `login` sent (initiator) or received (responder).
    LoginInvoked,
    /// The responder's avatar passed `initialize`.
    RemoteInitialized,
    /// Both avatars registered.
    HandshakeComplete,
    /// Gave up; nothing stays registered.
    Aborted,
}

impl HandshakeState {
    /// Returns `true` for `HandshakeComplete` and `Aborted`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::HandshakeComplete | Self::Aborted)
    }
}

#[derive(Debug, Clone, Copy)]
enum Role {
    Initiator,
    Responder,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Initiator => "initiator",
            Self::Responder => "responder",
        })
    }
}

/// Logged state machine of one handshake.
#[derive(Debug)]
pub(crate) struct HandshakeTracker {
    connection: ConnectionId,
    role: Role,
    state: HandshakeState,
}

impl HandshakeTracker {
    fn new(connection: ConnectionId, role: Role) -> Self {
        debug!(connection = %connection, role = %role, "Handshake started");
        Self {
            connection,
            role,
            state: HandshakeState::TransportEstablished,
        }
    }

    pub(crate) fn state(&self) -> HandshakeState {
        self.state
    }

    fn advance(&mut self, next: HandshakeState) {
        if self.state.is_terminal() {
            return;
        }
        debug!(
            connection = %self.connection,
            role = %self.role,
            from = ?self.state,
            to = ?next,
            "Handshake state"
        );
        self.state = next;
    }

    fn abort(&mut self, error: &PortalError) {
        if self.state.is_terminal() {
            return;
        }
        warn!(
            connection = %self.connection,
            role = %self.role,
            state = ?self.state,
            error = %error,
            "Handshake aborted"
        );
        self.state = HandshakeState::Aborted;
    }
}

// ============================================
// Initiator
// ============================================

/// Runs the initiator side; the login exchange must finish within `budget`.
pub(crate) async fn initiate(
    portal: &Portal,
    stream: SecureStream,
    budget: Duration,
) -> Result<CapabilityProxy> {
    let connection = Connection::spawn(stream, portal.codec());
    let mut tracker = HandshakeTracker::new(connection.id(), Role::Initiator);
    let mut partial = None;

    let outcome = tokio::time::timeout(
        budget,
        run_initiator(portal, &connection, &mut tracker, &mut partial),
    )
    .await
    .unwrap_or_else(|_| Err(PortalError::HandshakeTimeout { timeout_ms: millis(budget) }))
    .map_err(|e| surface_tls_rejection(&connection, e));

    match outcome {
        Ok(proxy) => {
            tracker.advance(HandshakeState::HandshakeComplete);
            info!(
                connection = %connection.id(),
                peer = %connection.peer_identity(),
                "Logged in to peer"
            );
            Ok(proxy)
        }
        Err(e) => {
            tracker.abort(&e);
            if let Some(avatar) = partial {
                avatar.detach();
            }
            connection.close();
            Err(e)
        }
    }
}

async fn run_initiator(
    portal: &Portal,
    connection: &Connection,
    tracker: &mut HandshakeTracker,
    partial: &mut Option<Arc<Avatar>>,
) -> Result<CapabilityProxy> {
    let peer = connection.peer_identity().clone();
    tracker.advance(HandshakeState::IdentityResolved);

    let avatar = portal.partial_login(&peer)?;
    *partial = Some(Arc::clone(&avatar));
    let exported = connection.export(avatar.clone());
    tracker.advance(HandshakeState::PartialSelfBuilt);

    tracker.advance(HandshakeState::LoginInvoked);
    let reply = connection
        .root()
        .call(LOGIN_METHOD, vec![Value::Remote(exported)])
        .await
        .map_err(|e| match e {
            PortalError::RemoteCall(fault) => PortalError::from_fault(&peer, fault),
            other => other,
        })?;
    let target = reply.as_remote().ok_or_else(|| {
        CoreError::malformed(format!("login returned {}, expected remote", reply.type_name()))
    })?;
    let remote = connection.remote_ref(target);
    tracker.advance(HandshakeState::RemoteInitialized);

    let (_, logout) = portal.complete_login(avatar, remote.clone()).await?;
    bind_logout(connection, exported, &logout);

    Ok(CapabilityProxy::new(remote))
}

// ============================================
// Responder
// ============================================

pub(crate) fn respond(portal: &Portal, stream: SecureStream) -> Connection {
    let connection = Connection::spawn(stream, portal.codec());
    let mut tracker = HandshakeTracker::new(connection.id(), Role::Responder);
    tracker.advance(HandshakeState::IdentityResolved);

    let root = Arc::new(PortalRoot {
        portal: portal.clone(),
        tracker: Mutex::new(tracker),
        login_seen: AtomicBool::new(false),
    });
    connection.export_root(root.clone());

    let limit = portal.settings().handshake_timeout;
    let watched = connection.clone();
    tokio::spawn(async move {
        tokio::select! {
            () = watched.closed() => {
                root.abort_unless_complete(&PortalError::ConnectionClosed);
            }
            () = tokio::time::sleep(limit) => {
                let timeout = PortalError::HandshakeTimeout { timeout_ms: millis(limit) };
                if root.abort_unless_complete(&timeout) {
                    watched.close();
                }
            }
        }
    });

    connection
}

/// Object exported at `ObjectId::ROOT` on every accepted connection.
struct PortalRoot {
    portal: Portal,
    tracker: Mutex<HandshakeTracker>,
    login_seen: AtomicBool,
}

impl PortalRoot {
    /// Returns `true` if the handshake was still open and is now aborted.
    fn abort_unless_complete(&self, error: &PortalError) -> bool {
        let mut tracker = self.tracker.lock();
        if tracker.state() == HandshakeState::HandshakeComplete {
            return false;
        }
        tracker.abort(error);
        true
    }

    async fn login(&self, ctx: &CallContext, args: Vec<Value>) -> Result<Value> {
        let client = match args.as_slice() {
            [handle] => ctx.remote_arg(handle).map_err(PortalError::RemoteCall)?,
            _ => {
                return Err(PortalError::RemoteCall(RemoteFault::invalid_arguments(
                    "login takes exactly one remote argument",
                )))
            }
        };

        let identity = ctx.peer_identity().clone();
        let (avatar, logout) = self.portal.login(&identity, client).await?;
        self.tracker.lock().advance(HandshakeState::RemoteInitialized);

        let connection = ctx.connection();
        let exported = connection.export(avatar);
        bind_logout(connection, exported, &logout);
        Ok(Value::Remote(exported))
    }
}

#[async_trait]
impl Referenceable for PortalRoot {
    async fn invoke(
        &self,
        ctx: &CallContext,
        method: &str,
        args: Vec<Value>,
    ) -> std::result::Result<Value, RemoteFault> {
        if method != LOGIN_METHOD {
            return Err(RemoteFault::no_such_method(method));
        }
        if self.login_seen.swap(true, Ordering::SeqCst) {
            return Err(RemoteFault::invalid_state("login already attempted on this connection"));
        }
        self.tracker.lock().advance(HandshakeState::LoginInvoked);

        match self.login(ctx, args).await {
            Ok(value) => {
                self.tracker.lock().advance(HandshakeState::HandshakeComplete);
                info!(
                    connection = %ctx.connection().id(),
                    peer = %ctx.peer_identity(),
                    "Peer logged in"
                );
                Ok(value)
            }
            Err(e) => {
                self.tracker.lock().abort(&e);
                Err(e.to_fault())
            }
        }
    }
}

// ============================================
// Helpers
// ============================================

/// Fires `logout` on the first of: peer releases `exported`, or the
/// connection closes.
fn bind_logout(connection: &Connection, exported: ObjectId, logout: &LogoutHandle) {
    let on_release = logout.clone();
    connection.on_release(exported, move || {
        on_release.logout();
    });
    let on_close = logout.clone();
    connection.on_disconnect(move || {
        on_close.logout();
    });
}

/// A TLS 1.3 server rejects our certificate only after we sent `login`,
/// so the refusal shows up as the connection closing under the call.
fn surface_tls_rejection(connection: &Connection, err: PortalError) -> PortalError {
    if !matches!(err, PortalError::ConnectionClosed) {
        return err;
    }
    match connection.stream_failure() {
        Some(failure) if failure.is_tls_rejection() => PortalError::tls_handshake(failure.message),
        _ => err,
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::avatar::{AvatarHandler, AvatarState};
    use crate::services::matcher::Matcher;
    use crate::services::portal::PortalSettings;
    use riffle_common::Identity;
    use riffle_core::FaultKind;
    use riffle_transport::secure_pair;

    // ========================================
    // Fixtures
    // ========================================

    struct Echo {
        fail_init: bool,
    }

    #[async_trait]
    impl AvatarHandler for Echo {
        async fn initialize(&self, _avatar: &Avatar) -> anyhow::Result<()> {
            if self.fail_init {
                anyhow::bail!("refusing this peer");
            }
            Ok(())
        }

        async fn invoke(
            &self,
            avatar: &Avatar,
            method: &str,
            args: Vec<Value>,
        ) -> std::result::Result<Value, RemoteFault> {
            match method {
                "ping" => Ok("pong".into()),
                "echo" => Ok(Value::List(args)),
                "whoami" => Ok(avatar.identity().as_str().into()),
                other => Err(RemoteFault::no_such_method(other)),
            }
        }
    }

    fn echo(fail_init: bool) -> impl Fn(&Identity) -> Arc<dyn AvatarHandler> + Send + Sync {
        move |_| Arc::new(Echo { fail_init }) as Arc<dyn AvatarHandler>
    }

    fn settings() -> PortalSettings {
        PortalSettings {
            handshake_timeout: Duration::from_secs(5),
            initialize_timeout: Duration::from_secs(2),
            ..PortalSettings::default()
        }
    }

    fn id(name: &str) -> Identity {
        Identity::new(name).unwrap()
    }

    /// Device side dials, server side accepts, both over an in-memory pipe.
    async fn handshake(
        device: &Portal,
        server: &Portal,
    ) -> (Result<CapabilityProxy>, Connection) {
        let (device_end, server_end) = secure_pair(&id("device-1"), &id("pdserver"));
        let accepted = server.accept_stream(server_end);
        let proxy = device.connect_stream(device_end).await;
        (proxy, accepted)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    // ========================================
    // Scenarios
    // ========================================

    #[tokio::test]
    async fn test_device_login_links_both_sides() {
        let server = Portal::new(settings());
        server.add_realm(Matcher::pattern("device").unwrap(), echo(false));
        let device = Portal::new(settings());
        device.add_realm(Matcher::pattern("pd").unwrap(), echo(false));

        let (proxy, _accepted) = handshake(&device, &server).await;
        let proxy = proxy.unwrap();

        assert_eq!(proxy.peer_identity().as_str(), "pdserver");
        assert_eq!(proxy.call("ping", vec![]).await.unwrap().as_str(), Some("pong"));
        assert_eq!(
            proxy.call("whoami", vec![]).await.unwrap().as_str(),
            Some("device-1")
        );

        let on_server = server.connection_for_name(&id("device-1")).unwrap();
        let on_device = device.connection_for_name(&id("pdserver")).unwrap();
        assert_eq!(on_server.state(), AvatarState::Initialized);
        assert_eq!(on_device.state(), AvatarState::Initialized);

        // The server can call back through its avatar
        let back = on_server.call_peer("whoami", vec![]).await.unwrap();
        assert_eq!(back.as_str(), Some("pdserver"));
    }

    #[tokio::test]
    async fn test_unmatched_identity_is_rejected() {
        let server = Portal::new(settings());
        server.add_realm(Matcher::pattern("device").unwrap(), echo(false));
        let rogue = Portal::new(settings());
        rogue.add_realm(Matcher::any(), echo(false));

        let (rogue_end, server_end) = secure_pair(&id("rogue-x"), &id("pdserver"));
        let accepted = server.accept_stream(server_end);
        let err = rogue.connect_stream(rogue_end).await.unwrap_err();

        assert!(matches!(err, PortalError::NoMatchingRealm(ref who) if who.as_str() == "rogue-x"));
        tokio::time::timeout(Duration::from_secs(5), accepted.closed())
            .await
            .unwrap();
        assert!(server.realms().iter().all(|realm| realm.connection_count() == 0));
        assert!(rogue.realms().iter().all(|realm| realm.connection_count() == 0));
    }

    #[tokio::test]
    async fn test_initiator_without_realm_for_responder() {
        let server = Portal::new(settings());
        server.add_realm(Matcher::pattern("device").unwrap(), echo(false));
        let device = Portal::new(settings());

        let (proxy, accepted) = handshake(&device, &server).await;
        assert!(matches!(proxy, Err(PortalError::NoMatchingRealm(_))));
        tokio::time::timeout(Duration::from_secs(5), accepted.closed())
            .await
            .unwrap();
        assert_eq!(server.realms()[0].connection_count(), 0);
    }

    #[tokio::test]
    async fn test_responder_initialize_failure_leaves_nothing() {
        let server = Portal::new(settings());
        server.add_realm(Matcher::pattern("device").unwrap(), echo(true));
        let device = Portal::new(settings());
        device.add_realm(Matcher::pattern("pd").unwrap(), echo(false));

        let (proxy, _accepted) = handshake(&device, &server).await;
        assert!(matches!(
            proxy,
            Err(PortalError::Initialization { ref reason, .. }) if reason.contains("refusing")
        ));
        assert!(server.connection_for_name(&id("device-1")).is_none());
        assert!(device.connection_for_name(&id("pdserver")).is_none());
    }

    #[tokio::test]
    async fn test_initiator_initialize_failure_closes_connection() {
        let server = Portal::new(settings());
        server.add_realm(Matcher::pattern("device").unwrap(), echo(false));
        let device = Portal::new(settings());
        device.add_realm(Matcher::pattern("pd").unwrap(), echo(true));

        let (proxy, accepted) = handshake(&device, &server).await;
        assert!(matches!(proxy, Err(PortalError::Initialization { .. })));

        // The server registered first; the close must remove it again
        tokio::time::timeout(Duration::from_secs(5), accepted.closed())
            .await
            .unwrap();
        assert!(server.connection_for_name(&id("device-1")).is_none());
        assert!(device.connection_for_name(&id("pdserver")).is_none());
    }

    #[tokio::test]
    async fn test_explicit_logout_tears_down_both_sides() {
        let server = Portal::new(settings());
        server.add_realm(Matcher::pattern("device").unwrap(), echo(false));
        let device = Portal::new(settings());
        device.add_realm(Matcher::pattern("pd").unwrap(), echo(false));

        let (proxy, accepted) = handshake(&device, &server).await;
        let proxy = proxy.unwrap();
        let server_avatar = server.connection_for_name(&id("device-1")).unwrap();

        proxy.logout().unwrap();
        settle().await;

        assert!(server_avatar.is_detached());
        assert!(server.connection_for_name(&id("device-1")).is_none());
        assert!(device.connection_for_name(&id("pdserver")).is_none());
        assert!(!accepted.is_closed());

        let fault = proxy.call("ping", vec![]).await.unwrap_err();
        assert!(matches!(
            fault,
            PortalError::RemoteCall(RemoteFault { kind: FaultKind::NoSuchObject, .. })
        ));
    }

    #[tokio::test]
    async fn test_disconnect_cleans_up_once_and_fails_pending_calls() {
        let server = Portal::new(settings());
        server.add_realm(Matcher::pattern("device").unwrap(), echo(false));
        let device = Portal::new(settings());
        device.add_realm(Matcher::pattern("pd").unwrap(), echo(false));

        let (proxy, accepted) = handshake(&device, &server).await;
        let proxy = proxy.unwrap();
        let server_avatar = server.connection_for_name(&id("device-1")).unwrap();

        accepted.close();
        proxy.closed().await;
        settle().await;

        assert!(server_avatar.is_detached());
        assert!(server.connection_for_name(&id("device-1")).is_none());
        assert!(device.connection_for_name(&id("pdserver")).is_none());
        assert!(matches!(
            proxy.call("ping", vec![]).await,
            Err(PortalError::ConnectionClosed)
        ));
        assert!(matches!(proxy.logout(), Err(PortalError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_second_login_on_same_connection_is_rejected() {
        let server = Portal::new(settings());
        server.add_realm(Matcher::pattern("device").unwrap(), echo(false));
        let device = Portal::new(settings());
        device.add_realm(Matcher::pattern("pd").unwrap(), echo(false));

        let (proxy, _accepted) = handshake(&device, &server).await;
        let proxy = proxy.unwrap();
        let connection = proxy.remote().connection();

        let err = connection
            .call(ObjectId::ROOT, LOGIN_METHOD, vec![Value::Remote(ObjectId::new(1))])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PortalError::RemoteCall(RemoteFault { kind: FaultKind::InvalidState, .. })
        ));
        assert_eq!(server.realms()[0].connection_count(), 1);
    }

    #[tokio::test]
    async fn test_responder_closes_idle_connections() {
        let server = Portal::new(PortalSettings {
            handshake_timeout: Duration::from_millis(100),
            ..settings()
        });
        server.add_realm(Matcher::any(), echo(false));

        let (_silent_end, server_end) = secure_pair(&id("device-1"), &id("pdserver"));
        let accepted = server.accept_stream(server_end);
        tokio::time::timeout(Duration::from_secs(5), accepted.closed())
            .await
            .unwrap();
        assert_eq!(server.realms()[0].connection_count(), 0);
    }

    #[tokio::test]
    async fn test_rejected_certificate_surfaces_as_tls_error() {
        let device = Portal::new(settings());
        device.add_realm(Matcher::pattern("pd").unwrap(), echo(false));

        let stream = crate::rpc::connection::refused_stream(
            &id("pdserver"),
            "received fatal alert: BadCertificate",
        );
        let err = device.connect_stream(stream).await.unwrap_err();

        assert!(
            matches!(err, PortalError::TlsHandshake { ref reason } if reason.contains("BadCertificate")),
            "unexpected error: {err}"
        );
        assert!(err.is_handshake_error());
        assert!(device.connection_for_name(&id("pdserver")).is_none());
    }

    #[tokio::test]
    async fn test_login_budget_bounds_the_exchange() {
        let device = Portal::new(PortalSettings {
            handshake_timeout: Duration::from_secs(30),
            ..settings()
        });
        device.add_realm(Matcher::pattern("pd").unwrap(), echo(false));

        // Nobody answers on the other end
        let (device_end, _silent_end) = secure_pair(&id("device-1"), &id("pdserver"));
        let started = std::time::Instant::now();
        let err = initiate(&device, device_end, Duration::from_millis(100))
            .await
            .unwrap_err();

        assert!(matches!(err, PortalError::HandshakeTimeout { timeout_ms: 100 }));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(device.connection_for_name(&id("pdserver")).is_none());
    }

    #[test]
    fn test_tracker_ignores_moves_after_terminal_state() {
        let mut tracker = HandshakeTracker::new(ConnectionId::next(), Role::Initiator);
        tracker.advance(HandshakeState::IdentityResolved);
        tracker.abort(&PortalError::ConnectionClosed);
        tracker.advance(HandshakeState::HandshakeComplete);
        assert_eq!(tracker.state(), HandshakeState::Aborted);
        assert!(HandshakeState::HandshakeComplete.is_terminal());
    }
}
