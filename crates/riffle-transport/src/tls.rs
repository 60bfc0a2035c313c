// ============================================
// File: crates/riffle-transport/src/tls.rs
// ============================================
//! # Mutual TLS Transport
//!
//! ## Creation Reason
//! Carries Riffle connections over TCP + rustls, with both sides
//! presenting certificates signed by the shared CA.
//!
//! ## Main Functionality
//! - `server_config` / `client_config`: rustls configs from `TlsMaterial`
//! - `TlsListener`: Accept loop source, handshake deferred to the caller
//! - `TlsDialer`: Outbound connect + handshake under a timeout
//!
//! ## Handshake Flow
//! ```text
//! Dialer                                       Listener
//!   │ ── TCP connect ─────────────────────────────► │
//!   │ ◄─────────────── ServerHello + server cert ── │  verified against CA
//!   │ ── client cert ─────────────────────────────► │  verified against CA
//!   │                                               │
//!   ▼ identity(server leaf)         identity(client leaf) ▼
//! ```
//!
//! ## Design Choices
//! - Uses SO_REUSEADDR for quick rebinding after restart
//! - ring crypto provider, safe default protocol versions
//! - The dialer checks the server certificate against a fixed server
//!   name (`riffle.local` by default) rather than the peer's address
//!
//! ## ⚠️ Important Note for Next Developer
//! - Clients without a certificate are rejected by the verifier, never
//!   downgraded to anonymous
//! - Under TLS 1.3 a client whose certificate is refused may only learn
//!   it on its first read
//!
//! ## Last Modified
//! v0.1.0 - Initial TLS transport implementation

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustls::crypto::CryptoProvider;
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use rustls_pki_types::{CertificateDer, ServerName};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::{debug, info, trace};

use riffle_common::Identity;
use riffle_core::{CommonNameExtractor, IdentityExtractor, TlsMaterial};

use crate::error::{Result, TransportError};
use crate::traits::{PendingStream, SecureListener, SecureStream};

// ============================================
// Constants
// ============================================

/// Default bound on a TLS handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Pending-connection backlog passed to `listen(2)`.
const LISTEN_BACKLOG: i32 = 1024;

// ============================================
// Config Builders
// ============================================

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn root_store(material: &TlsMaterial) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    for ca in material.roots() {
        roots
            .add(ca.clone())
            .map_err(|e| TransportError::tls_config(format!("CA certificate rejected: {e}")))?;
    }
    Ok(roots)
}

/// Builds a server config that requires a CA-signed client certificate.
///
/// # Errors
/// Returns `TlsConfig` if rustls rejects the material.
pub fn server_config(material: &TlsMaterial) -> Result<Arc<ServerConfig>> {
    let provider = provider();
    let verifier =
        WebPkiClientVerifier::builder_with_provider(Arc::new(root_store(material)?), provider.clone())
            .build()
            .map_err(|e| TransportError::tls_config(e.to_string()))?;

    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| TransportError::tls_config(e.to_string()))?
        .with_client_cert_verifier(verifier)
        .with_single_cert(material.chain().to_vec(), material.key())
        .map_err(|e| TransportError::tls_config(e.to_string()))?;
    Ok(Arc::new(config))
}

/// Builds a client config that presents our certificate and trusts only
/// the shared CA.
///
/// # Errors
/// Returns `TlsConfig` if rustls rejects the material.
pub fn client_config(material: &TlsMaterial) -> Result<Arc<ClientConfig>> {
    let config = ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| TransportError::tls_config(e.to_string()))?
        .with_root_certificates(root_store(material)?)
        .with_client_auth_cert(material.chain().to_vec(), material.key())
        .map_err(|e| TransportError::tls_config(e.to_string()))?;
    Ok(Arc::new(config))
}

fn identify(
    certs: Option<&[CertificateDer<'static>]>,
    extractor: &dyn IdentityExtractor,
    peer: &str,
) -> Result<Identity> {
    let leaf = certs
        .and_then(|chain| chain.first())
        .ok_or_else(|| TransportError::peer_identity(peer, "no certificate presented"))?;
    extractor
        .extract(leaf)
        .map_err(|e| TransportError::peer_identity(peer, e.to_string()))
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ============================================
// TlsListener
// ============================================

/// TCP listener that upgrades every accepted socket to mutual TLS.
///
/// # Example
/// ```ignore
/// let listener = TlsListener::bind("0.0.0.0:8016".parse()?, &material).await?;
/// let pending = listener.accept().await?;
/// let stream = pending.await?;
/// println!("peer is {}", stream.peer_identity());
/// ```
pub struct TlsListener {
    listener: TcpListener,
    acceptor: TlsAcceptor,
    local_addr: SocketAddr,
    extractor: Arc<dyn IdentityExtractor>,
    handshake_timeout: Duration,
    shutdown: AtomicBool,
    shutdown_notify: Notify,
}

impl TlsListener {
    /// Binds a listener on `addr`.
    ///
    /// # Socket Options
    /// - `SO_REUSEADDR`: Enabled for quick rebinding
    /// - Non-blocking: Required for async operations
    ///
    /// # Errors
    /// - `TlsConfig`: If the material is unusable
    /// - `AddressInUse` / `BindFailed`: If binding fails
    pub async fn bind(addr: SocketAddr, material: &TlsMaterial) -> Result<Self> {
        info!(addr = %addr, "Binding TLS listener");

        let acceptor = TlsAcceptor::from(server_config(material)?);

        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| TransportError::io("creating TCP socket", e))?;
        socket
            .set_reuse_address(true)
            .map_err(|e| TransportError::io("setting SO_REUSEADDR", e))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| TransportError::io("setting non-blocking", e))?;
        socket.bind(&addr.into()).map_err(|e| {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                TransportError::AddressInUse { addr }
            } else {
                TransportError::bind_failed(addr, e.to_string())
            }
        })?;
        socket
            .listen(LISTEN_BACKLOG)
            .map_err(|e| TransportError::bind_failed(addr, e.to_string()))?;

        let std_listener: std::net::TcpListener = socket.into();
        let listener = TcpListener::from_std(std_listener)
            .map_err(|e| TransportError::io("converting to Tokio listener", e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| TransportError::io("getting local address", e))?;

        info!(addr = %local_addr, "TLS listener bound");

        Ok(Self {
            listener,
            acceptor,
            local_addr,
            extractor: Arc::new(CommonNameExtractor),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            shutdown: AtomicBool::new(false),
            shutdown_notify: Notify::new(),
        })
    }

    /// Replaces the identity extractor.
    #[must_use]
    pub fn with_extractor(mut self, extractor: Arc<dyn IdentityExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Sets the per-connection handshake bound.
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

#[async_trait]
impl SecureListener for TlsListener {
    async fn accept(&self) -> Result<PendingStream> {
        if !self.is_active() {
            return Err(TransportError::ShuttingDown);
        }

        let (tcp, peer_addr) = tokio::select! {
            res = self.listener.accept() => {
                res.map_err(|e| TransportError::io("accepting TCP connection", e))?
            }
            () = self.shutdown_notify.notified() => return Err(TransportError::ShuttingDown),
        };
        trace!(peer = %peer_addr, "TCP connection accepted");
        if let Err(e) = tcp.set_nodelay(true) {
            debug!(peer = %peer_addr, error = %e, "Failed to set TCP_NODELAY");
        }

        let acceptor = self.acceptor.clone();
        let extractor = Arc::clone(&self.extractor);
        let timeout = self.handshake_timeout;

        Ok(Box::pin(async move {
            let tls = match tokio::time::timeout(timeout, acceptor.accept(tcp)).await {
                Ok(Ok(tls)) => tls,
                Ok(Err(e)) => return Err(TransportError::tls_handshake(peer_addr, e.to_string())),
                Err(_) => {
                    return Err(TransportError::HandshakeTimeout {
                        peer: peer_addr.to_string(),
                        timeout_ms: millis(timeout),
                    })
                }
            };

            let identity = identify(
                tls.get_ref().1.peer_certificates(),
                extractor.as_ref(),
                &peer_addr.to_string(),
            )?;
            debug!(peer = %peer_addr, identity = %identity, "Inbound TLS handshake complete");

            Ok(SecureStream::new(Box::new(tls), identity, Some(peer_addr)))
        }))
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.local_addr)
    }

    fn shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            debug!(addr = %self.local_addr, "Shutting down TLS listener");
            self.shutdown_notify.notify_one();
        }
    }

    fn is_active(&self) -> bool {
        !self.shutdown.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for TlsListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsListener")
            .field("local_addr", &self.local_addr)
            .field("handshake_timeout", &self.handshake_timeout)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

// ============================================
// TlsDialer
// ============================================

/// Outbound side of the mutual TLS transport.
#[derive(Clone)]
pub struct TlsDialer {
    connector: TlsConnector,
    server_name: ServerName<'static>,
    extractor: Arc<dyn IdentityExtractor>,
    handshake_timeout: Duration,
}

impl TlsDialer {
    /// Creates a dialer that expects servers to present `server_name`.
    ///
    /// # Errors
    /// Returns `TlsConfig` if the material or the name is unusable.
    pub fn new(material: &TlsMaterial, server_name: &str) -> Result<Self> {
        let name = ServerName::try_from(server_name.to_owned()).map_err(|e| {
            TransportError::tls_config(format!("invalid server name '{server_name}': {e}"))
        })?;

        Ok(Self {
            connector: TlsConnector::from(client_config(material)?),
            server_name: name,
            extractor: Arc::new(CommonNameExtractor),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        })
    }

    /// Replaces the identity extractor.
    #[must_use]
    pub fn with_extractor(mut self, extractor: Arc<dyn IdentityExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Sets the connect + handshake bound.
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Connects to `addr` and completes mutual TLS.
    ///
    /// # Errors
    /// - `ConnectFailed`: TCP connect failed
    /// - `TlsHandshake`: Server certificate rejected or negotiation failed
    /// - `HandshakeTimeout`: Bound exceeded
    /// - `PeerIdentity`: Server leaf has no usable commonName
    pub async fn dial(&self, addr: SocketAddr) -> Result<SecureStream> {
        debug!(peer = %addr, "Dialing TLS peer");

        let connect = async {
            let tcp = TcpStream::connect(addr)
                .await
                .map_err(|e| TransportError::ConnectFailed {
                    addr,
                    reason: e.to_string(),
                })?;
            if let Err(e) = tcp.set_nodelay(true) {
                debug!(peer = %addr, error = %e, "Failed to set TCP_NODELAY");
            }
            self.connector
                .connect(self.server_name.clone(), tcp)
                .await
                .map_err(|e| TransportError::tls_handshake(addr, e.to_string()))
        };

        let tls = tokio::time::timeout(self.handshake_timeout, connect)
            .await
            .map_err(|_| TransportError::HandshakeTimeout {
                peer: addr.to_string(),
                timeout_ms: millis(self.handshake_timeout),
            })??;

        let identity = identify(
            tls.get_ref().1.peer_certificates(),
            self.extractor.as_ref(),
            &addr.to_string(),
        )?;
        debug!(peer = %addr, identity = %identity, "Outbound TLS handshake complete");

        Ok(SecureStream::new(Box::new(tls), identity, Some(addr)))
    }
}

impl std::fmt::Debug for TlsDialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsDialer")
            .field("server_name", &self.server_name)
            .field("handshake_timeout", &self.handshake_timeout)
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================
