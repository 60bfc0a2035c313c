// ============================================
// File: crates/riffle-core/src/pki/material.rs
// ============================================
//! # TLS Material
//!
//! ## Creation Reason
//! Bundles what a node needs to take part in mutual TLS: the shared CA
//! roots it trusts, its own certificate chain, and its private key.
//!
//! ## Main Functionality
//! - `TlsMaterial::from_pem`: Parse in-memory PEM blobs
//! - `TlsMaterial::load`: Read PEM files (key optionally inside the cert file)
//! - `TlsMaterial::local_identity`: Identity named by our own leaf
//!
//! ## ⚠️ Important Note for Next Developer
//! - `Debug` redacts the key; keep it that way
//! - PKCS#1, PKCS#8 and SEC1 keys are accepted (whatever rustls-pemfile finds first)
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

use std::fmt;
use std::path::Path;

use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use tracing::debug;

use riffle_common::Identity;

use crate::error::{CoreError, Result};
use crate::pki::extract::IdentityExtractor;

// ============================================
// TlsMaterial
// ============================================

/// CA roots, certificate chain and private key of one node.
pub struct TlsMaterial {
    roots: Vec<CertificateDer<'static>>,
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl TlsMaterial {
    /// Creates material from already parsed parts.
    ///
    /// # Errors
    /// Returns `CoreError::PemLoad` if `roots` or `chain` is empty.
    pub fn new(
        roots: Vec<CertificateDer<'static>>,
        chain: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
    ) -> Result<Self> {
        if roots.is_empty() {
            return Err(CoreError::pem("CA roots", "no certificates"));
        }
        if chain.is_empty() {
            return Err(CoreError::pem("certificate chain", "no certificates"));
        }
        Ok(Self { roots, chain, key })
    }

    /// Parses PEM blobs. `key_pem` may be the same blob as `cert_pem`.
    ///
    /// # Errors
    /// Returns `CoreError::PemLoad` if any blob is unreadable or empty.
    pub fn from_pem(ca_pem: &[u8], cert_pem: &[u8], key_pem: &[u8]) -> Result<Self> {
        let roots = parse_certs("CA bundle", ca_pem)?;
        let chain = parse_certs("certificate", cert_pem)?;
        let key = parse_key("private key", key_pem)?;
        Self::new(roots, chain, key)
    }

    /// Reads PEM files from disk.
    ///
    /// When `key_file` is `None` the key is looked up in `cert_file`.
    ///
    /// # Errors
    /// Returns `CoreError::PemLoad` naming the offending file.
    pub async fn load(ca_file: &Path, cert_file: &Path, key_file: Option<&Path>) -> Result<Self> {
        let ca_pem = read_file(ca_file).await?;
        let cert_pem = read_file(cert_file).await?;
        let key_pem = match key_file {
            Some(path) => read_file(path).await?,
            None => cert_pem.clone(),
        };

        let key_source = key_file.unwrap_or(cert_file).display().to_string();
        let roots = parse_certs(&ca_file.display().to_string(), &ca_pem)?;
        let chain = parse_certs(&cert_file.display().to_string(), &cert_pem)?;
        let key = parse_key(&key_source, &key_pem)?;

        debug!(
            ca_file = %ca_file.display(),
            cert_file = %cert_file.display(),
            roots = roots.len(),
            chain = chain.len(),
            "TLS material loaded"
        );
        Self::new(roots, chain, key)
    }

    /// Trusted CA certificates.
    #[must_use]
    pub fn roots(&self) -> &[CertificateDer<'static>] {
        &self.roots
    }

    /// Our certificate chain, leaf first.
    #[must_use]
    pub fn chain(&self) -> &[CertificateDer<'static>] {
        &self.chain
    }

    /// A fresh copy of the private key for handing to rustls.
    #[must_use]
    pub fn key(&self) -> PrivateKeyDer<'static> {
        self.key.clone_key()
    }

    /// Identity carried by our own leaf certificate.
    ///
    /// # Errors
    /// Propagates extractor failures.
    pub fn local_identity(&self, extractor: &dyn IdentityExtractor) -> Result<Identity> {
        let leaf = self
            .chain
            .first()
            .ok_or_else(|| CoreError::pem("certificate chain", "no certificates"))?;
        extractor.extract(leaf)
    }
}

impl Clone for TlsMaterial {
    fn clone(&self) -> Self {
        Self {
            roots: self.roots.clone(),
            chain: self.chain.clone(),
            key: self.key.clone_key(),
        }
    }
}

impl fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("roots", &self.roots.len())
            .field("chain", &self.chain.len())
            .field("key", &"<redacted>")
            .finish()
    }
}

// ============================================
// Helpers
// ============================================

async fn read_file(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| CoreError::pem(path.display().to_string(), e.to_string()))
}

fn parse_certs(what: &str, pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = pem;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| CoreError::pem(what, e.to_string()))?;
    if certs.is_empty() {
        return Err(CoreError::pem(what, "no certificates"));
    }
    Ok(certs)
}

fn parse_key(what: &str, pem: &[u8]) -> Result<PrivateKeyDer<'static>> {
    let mut reader = pem;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| CoreError::pem(what, e.to_string()))?
        .ok_or_else(|| CoreError::pem(what, "no private key"))
}

// ============================================
// Tests
// ============================================
