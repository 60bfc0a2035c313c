// ============================================
// File: crates/riffle-portal/src/services/portal.rs
// ============================================
//! # Portal
//!
//! ## Creation Reason
//! The host-facing entry point. A portal owns an ordered table of
//! (matcher, realm) pairs, accepts and initiates connections, and routes
//! each authenticated peer to the first realm whose matcher accepts its
//! identity.
//!
//! ## Main Functionality
//! - `open` / `serve`: Accept peers (responder side of the login)
//! - `connect` / `connect_stream`: Dial a peer (initiator side)
//! - `add_realm` / `find_realm`: Routing table
//! - `login` / `partial_login` / `complete_login`: Realm delegation
//! - `connection_for_name` / `dump_realms`: Live session lookup
//!
//! ## Routing
//! ```text
//! identity ──► [ (/pd/, pd realm), (/device/, device realm), (*, fallback) ]
//!                  first match in insertion order wins
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Realms may be added after `open`; lookups always see the table as
//!   it is at that moment
//! - There is no process-wide portal; pass `Portal` values explicitly
//!
//! ## Last Modified
//! v0.1.0 - Initial portal implementation

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::info;

use riffle_common::Identity;
use riffle_core::{
    protocol::DEFAULT_MAX_FRAME_SIZE, CommonNameExtractor, FrameCodec, IdentityExtractor,
    TlsMaterial,
};
use riffle_transport::{SecureListener, SecureStream, TlsDialer, TlsListener};

use crate::error::{PortalError, Result};
use crate::rpc::{CapabilityProxy, Connection, RemoteRef};
use crate::server::PortalListener;
use crate::services::avatar::{Avatar, AvatarHandler};
use crate::services::login;
use crate::services::logout::LogoutHandle;
use crate::services::matcher::Matcher;
use crate::services::realm::{AvatarFactory, Realm};

// ============================================
// PortalSettings
// ============================================

/// Default server name checked against the peer's certificate on dial.
pub const DEFAULT_SERVER_NAME: &str = "riffle.local";

/// Runtime knobs of a portal.
#[derive(Debug, Clone)]
pub struct PortalSettings {
    /// Bound on TLS plus the login exchange.
    pub handshake_timeout: Duration,
    /// Bound on each avatar's `initialize` hook.
    pub initialize_timeout: Duration,
    /// Largest accepted frame body.
    pub max_frame_size: usize,
    /// Name the dialer expects in the peer's certificate.
    pub server_name: String,
}

impl Default for PortalSettings {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(30),
            initialize_timeout: Duration::from_secs(30),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            server_name: DEFAULT_SERVER_NAME.to_owned(),
        }
    }
}

// ============================================
// Portal
// ============================================

/// Routes authenticated peers to realms. Cheap to clone.
#[derive(Clone)]
pub struct Portal {
    inner: Arc<PortalInner>,
}

struct PortalInner {
    settings: PortalSettings,
    extractor: Arc<dyn IdentityExtractor>,
    realms: RwLock<Vec<(Matcher, Arc<Realm>)>>,
}

impl Portal {
    /// Creates a portal that names peers by certificate commonName.
    #[must_use]
    pub fn new(settings: PortalSettings) -> Self {
        Self::with_extractor(settings, Arc::new(CommonNameExtractor))
    }

    /// Creates a portal with a custom identity extractor.
    #[must_use]
    pub fn with_extractor(settings: PortalSettings, extractor: Arc<dyn IdentityExtractor>) -> Self {
        Self {
            inner: Arc::new(PortalInner {
                settings,
                extractor,
                realms: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Runtime settings.
    #[must_use]
    pub fn settings(&self) -> &PortalSettings {
        &self.inner.settings
    }

    pub(crate) fn codec(&self) -> FrameCodec {
        FrameCodec::new(self.inner.settings.max_frame_size)
    }

    // ========================================
    // Realm Table
    // ========================================

    /// Appends a realm. Safe before or after `open`.
    pub fn add_realm<F>(&self, matcher: Matcher, factory: F) -> Arc<Realm>
    where
        F: Fn(&Identity) -> Arc<dyn AvatarHandler> + Send + Sync + 'static,
    {
        let factory: AvatarFactory = Arc::new(factory);
        let realm = Realm::new(matcher.describe(), factory, self.inner.settings.initialize_timeout);
        info!(realm = %realm.name(), "Realm added");
        self.inner.realms.write().push((matcher, Arc::clone(&realm)));
        realm
    }

    /// First realm whose matcher accepts `identity`.
    ///
    /// # Errors
    /// Returns `NoMatchingRealm` if none does.
    pub fn find_realm(&self, identity: &Identity) -> Result<Arc<Realm>> {
        self.inner
            .realms
            .read()
            .iter()
            .find(|(matcher, _)| matcher.matches(identity))
            .map(|(_, realm)| Arc::clone(realm))
            .ok_or_else(|| PortalError::NoMatchingRealm(identity.clone()))
    }

    /// All registered realms in routing order.
    #[must_use]
    pub fn realms(&self) -> Vec<Arc<Realm>> {
        self.inner
            .realms
            .read()
            .iter()
            .map(|(_, realm)| Arc::clone(realm))
            .collect()
    }

    // ========================================
    // Login Delegation
    // ========================================

    /// Full registration of a session for `identity`.
    ///
    /// # Errors
    /// `NoMatchingRealm` or `Initialization`.
    pub async fn login(
        &self,
        identity: &Identity,
        remote: RemoteRef,
    ) -> Result<(Arc<Avatar>, LogoutHandle)> {
        let realm = self.find_realm(identity)?;
        realm.request_avatar(identity, remote).await
    }

    /// Builds an avatar for `identity` without registering anything.
    ///
    /// # Errors
    /// `NoMatchingRealm`.
    pub fn partial_login(&self, identity: &Identity) -> Result<Arc<Avatar>> {
        let realm = self.find_realm(identity)?;
        Ok(realm.request_partial_avatar(identity))
    }

    /// Registers an avatar built by `partial_login`.
    ///
    /// # Errors
    /// `NoMatchingRealm` if its realm is gone and no other matches, or
    /// `Initialization`.
    pub async fn complete_login(
        &self,
        avatar: Arc<Avatar>,
        remote: RemoteRef,
    ) -> Result<(Arc<Avatar>, LogoutHandle)> {
        let realm = match avatar.realm() {
            Some(realm) => realm,
            None => self.find_realm(avatar.identity())?,
        };
        realm.register_avatar(avatar, remote).await
    }

    /// Live avatar for `identity` in the realm that routes it.
    #[must_use]
    pub fn connection_for_name(&self, identity: &Identity) -> Option<Arc<Avatar>> {
        self.find_realm(identity)
            .ok()
            .and_then(|realm| realm.connection_for_name(identity))
    }

    /// Logs every realm and its live sessions.
    pub fn dump_realms(&self) {
        for realm in self.realms() {
            info!(realm = %realm.name(), sessions = realm.connection_count(), "Realm");
            for avatar in realm.connections() {
                info!(
                    realm = %realm.name(),
                    identity = %avatar.identity(),
                    serial = avatar.serial(),
                    state = ?avatar.state(),
                    age_secs = avatar.age().as_secs(),
                    "  session"
                );
            }
        }
    }

    // ========================================
    // Networking
    // ========================================

    /// Listens for mutually authenticated peers on `addr`.
    ///
    /// # Errors
    /// Transport errors from binding or from the TLS configuration.
    pub async fn open(&self, addr: SocketAddr, material: &TlsMaterial) -> Result<PortalListener> {
        let listener = TlsListener::bind(addr, material)
            .await?
            .with_extractor(Arc::clone(&self.inner.extractor))
            .with_handshake_timeout(self.inner.settings.handshake_timeout);
        self.serve(Arc::new(listener))
    }

    /// Runs the accept loop over any `SecureListener`.
    ///
    /// # Errors
    /// Returns the listener's error if it has no local address.
    pub fn serve(&self, listener: Arc<dyn SecureListener>) -> Result<PortalListener> {
        PortalListener::spawn(self.clone(), listener)
    }

    /// Dials `addr` and runs the initiator side of the login.
    ///
    /// `handshake_timeout` bounds TLS and login together; login gets
    /// whatever the TLS handshake left over.
    ///
    /// # Errors
    /// `TlsHandshake`, `NoMatchingRealm`, `Initialization`,
    /// `HandshakeTimeout` or a transport error.
    pub async fn connect(&self, addr: SocketAddr, material: &TlsMaterial) -> Result<CapabilityProxy> {
        let limit = self.inner.settings.handshake_timeout;
        let started = Instant::now();
        let dialer = TlsDialer::new(material, &self.inner.settings.server_name)?
            .with_extractor(Arc::clone(&self.inner.extractor))
            .with_handshake_timeout(limit);
        let stream = dialer.dial(addr).await?;
        login::initiate(self, stream, limit.saturating_sub(started.elapsed())).await
    }

    /// Runs the initiator side over an established stream, bounded by
    /// the full `handshake_timeout`.
    ///
    /// # Errors
    /// See [`Portal::connect`].
    pub async fn connect_stream(&self, stream: SecureStream) -> Result<CapabilityProxy> {
        login::initiate(self, stream, self.inner.settings.handshake_timeout).await
    }

    /// Runs the responder side over an established stream.
    #[must_use]
    pub fn accept_stream(&self, stream: SecureStream) -> Connection {
        login::respond(self, stream)
    }
}

impl fmt::Debug for Portal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let realms: Vec<String> = self.realms().iter().map(|r| r.name().to_owned()).collect();
        f.debug_struct("Portal")
            .field("settings", &self.inner.settings)
            .field("extractor", &self.inner.extractor)
            .field("realms", &realms)
            .finish()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use riffle_core::{RemoteFault, Value};

    struct Named(&'static str);

    #[async_trait]
    impl AvatarHandler for Named {
        async fn invoke(
            &self,
            _avatar: &Avatar,
            _method: &str,
            _args: Vec<Value>,
        ) -> std::result::Result<Value, RemoteFault> {
            Ok(self.0.into())
        }
    }

    fn factory(tag: &'static str) -> impl Fn(&Identity) -> Arc<dyn AvatarHandler> + Send + Sync {
        move |_| Arc::new(Named(tag)) as Arc<dyn AvatarHandler>
    }

    fn id(name: &str) -> Identity {
        Identity::new(name).unwrap()
    }

    #[test]
    fn test_find_realm_first_match_wins() {
        let portal = Portal::new(PortalSettings::default());
        let pd = portal.add_realm(Matcher::pattern("pd").unwrap(), factory("pd"));
        let device = portal.add_realm(Matcher::pattern("device").unwrap(), factory("device"));
        let fallback = portal.add_realm(Matcher::any(), factory("any"));
        let _shadowed = portal.add_realm(Matcher::pattern("device-1").unwrap(), factory("never"));

        assert!(Arc::ptr_eq(&portal.find_realm(&id("pdserver")).unwrap(), &pd));
        assert!(Arc::ptr_eq(&portal.find_realm(&id("device-1")).unwrap(), &device));
        assert!(Arc::ptr_eq(&portal.find_realm(&id("laptop")).unwrap(), &fallback));
        assert_eq!(portal.realms().len(), 4);
    }

    #[test]
    fn test_no_matching_realm() {
        let portal = Portal::new(PortalSettings::default());
        portal.add_realm(Matcher::pattern("device").unwrap(), factory("device"));

        let err = portal.find_realm(&id("rogue-x")).unwrap_err();
        assert!(matches!(err, PortalError::NoMatchingRealm(ref who) if who.as_str() == "rogue-x"));
        assert!(matches!(
            portal.partial_login(&id("rogue-x")),
            Err(PortalError::NoMatchingRealm(_))
        ));
        assert!(portal.connection_for_name(&id("rogue-x")).is_none());
    }

    #[test]
    fn test_partial_login_does_not_mutate() {
        let portal = Portal::new(PortalSettings::default());
        let realm = portal.add_realm(Matcher::pattern("pd").unwrap(), factory("pd"));

        let avatar = portal.partial_login(&id("pdserver")).unwrap();
        assert_eq!(avatar.identity().as_str(), "pdserver");
        assert_eq!(realm.connection_count(), 0);
        assert!(portal.connection_for_name(&id("pdserver")).is_none());
    }

    #[test]
    fn test_settings_defaults() {
        let settings = PortalSettings::default();
        assert_eq!(settings.handshake_timeout, Duration::from_secs(30));
        assert_eq!(settings.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
        assert_eq!(settings.server_name, "riffle.local");
        assert_eq!(Portal::new(settings).codec().max_frame_size(), DEFAULT_MAX_FRAME_SIZE);
    }

    // ========================================
    // Over TLS
    // ========================================

    use rcgen::{
        BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose,
        IsCa, KeyPair, KeyUsagePurpose,
    };

    struct TestCa {
        cert: rcgen::Certificate,
        key: KeyPair,
    }

    impl TestCa {
        fn new(name: &str) -> Self {
            let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
            params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
            params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::DigitalSignature];
            params.distinguished_name = DistinguishedName::new();
            params.distinguished_name.push(DnType::CommonName, name);
            let key = KeyPair::generate().unwrap();
            let cert = params.self_signed(&key).unwrap();
            Self { cert, key }
        }

        fn issue(&self, cn: &str) -> TlsMaterial {
            let mut params = CertificateParams::new(vec![DEFAULT_SERVER_NAME.to_owned()]).unwrap();
            params.distinguished_name = DistinguishedName::new();
            params.distinguished_name.push(DnType::CommonName, cn);
            params.extended_key_usages = vec![
                ExtendedKeyUsagePurpose::ServerAuth,
                ExtendedKeyUsagePurpose::ClientAuth,
            ];
            let key = KeyPair::generate().unwrap();
            let cert = params.signed_by(&key, &self.cert, &self.key).unwrap();
            TlsMaterial::from_pem(
                self.cert.pem().as_bytes(),
                cert.pem().as_bytes(),
                key.serialize_pem().as_bytes(),
            )
            .unwrap()
        }
    }

    async fn pd_server(ca: &TestCa) -> (Portal, PortalListener) {
        let portal = Portal::new(PortalSettings::default());
        portal.add_realm(Matcher::pattern("device").unwrap(), factory("server-side"));
        let listener = portal
            .open("127.0.0.1:0".parse().unwrap(), &ca.issue("pdserver"))
            .await
            .unwrap();
        (portal, listener)
    }

    fn client() -> Portal {
        let portal = Portal::new(PortalSettings::default());
        portal.add_realm(Matcher::pattern("pd").unwrap(), factory("device-side"));
        portal
    }

    #[tokio::test]
    async fn test_device_logs_in_over_tls() {
        let ca = TestCa::new("Riffle Test CA");
        let (server, listener) = pd_server(&ca).await;
        let device = client();

        let proxy = device
            .connect(listener.local_addr(), &ca.issue("device-1"))
            .await
            .unwrap();
        assert_eq!(proxy.peer_identity().as_str(), "pdserver");
        assert_eq!(proxy.call("anything", vec![]).await.unwrap().as_str(), Some("server-side"));

        let avatar = server.connection_for_name(&id("device-1")).unwrap();
        assert_eq!(
            avatar.call_peer("anything", vec![]).await.unwrap().as_str(),
            Some("device-side")
        );
        assert!(device.connection_for_name(&id("pdserver")).is_some());

        listener.shutdown();
        listener.join().await;
    }

    #[tokio::test]
    async fn test_unrouted_identity_rejected_over_tls() {
        let ca = TestCa::new("Riffle Test CA");
        let (server, listener) = pd_server(&ca).await;
        let rogue = client();

        let err = rogue
            .connect(listener.local_addr(), &ca.issue("rogue-x"))
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::NoMatchingRealm(ref who) if who.as_str() == "rogue-x"));
        assert!(server.connection_for_name(&id("rogue-x")).is_none());
        assert!(rogue.connection_for_name(&id("pdserver")).is_none());
    }

    #[tokio::test]
    async fn test_rejected_client_certificate_is_a_tls_error() {
        let ca = TestCa::new("Riffle Test CA");
        let (server, listener) = pd_server(&ca).await;

        // Trusts the server, but presents a leaf the server cannot verify
        let trusted = ca.issue("device-1");
        let forged = TestCa::new("Other CA").issue("device-1");
        let material = TlsMaterial::new(
            trusted.roots().to_vec(),
            forged.chain().to_vec(),
            forged.key(),
        )
        .unwrap();

        let err = client()
            .connect(listener.local_addr(), &material)
            .await
            .unwrap_err();
        assert!(
            matches!(err, PortalError::TlsHandshake { .. }),
            "unexpected error: {err}"
        );
        assert!(server.connection_for_name(&id("device-1")).is_none());
    }

    #[tokio::test]
    async fn test_foreign_ca_fails_tls() {
        let ca = TestCa::new("Riffle Test CA");
        let (server, listener) = pd_server(&ca).await;
        let stranger = TestCa::new("Other CA");

        let err = client()
            .connect(listener.local_addr(), &stranger.issue("device-1"))
            .await
            .unwrap_err();
        assert!(err.is_handshake_error(), "unexpected error: {err}");
        assert!(server.connection_for_name(&id("device-1")).is_none());
    }
}
