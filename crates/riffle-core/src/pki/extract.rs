// ============================================
// File: crates/riffle-core/src/pki/extract.rs
// ============================================
//! # Identity Extraction
//!
//! ## Creation Reason
//! Maps a verified peer certificate to the `Identity` used for realm
//! routing. Each endpoint runs this locally on what its own TLS stack
//! verified; the result is never exchanged over the wire.
//!
//! ## Main Functionality
//! - `IdentityExtractor`: Pluggable certificate → identity mapping
//! - `CommonNameExtractor`: Subject commonName, verbatim
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

use std::fmt;

use x509_parser::parse_x509_certificate;

use riffle_common::Identity;

use crate::error::{CoreError, Result};

// ============================================
// IdentityExtractor
// ============================================

/// Derives the authenticated identity from a DER-encoded certificate.
pub trait IdentityExtractor: Send + Sync + fmt::Debug {
    /// Extracts the identity.
    ///
    /// # Errors
    /// Returns `CoreError::Certificate` if the certificate cannot be parsed
    /// and `CoreError::MissingIdentity` if it carries no usable name.
    fn extract(&self, cert_der: &[u8]) -> Result<Identity>;
}

/// Default extractor: the first subject commonName, byte for byte.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommonNameExtractor;

impl IdentityExtractor for CommonNameExtractor {
    fn extract(&self, cert_der: &[u8]) -> Result<Identity> {
        identity_from_der(cert_der)
    }
}

/// Reads the subject commonName of `cert_der`.
///
/// # Errors
/// See [`IdentityExtractor::extract`].
pub fn identity_from_der(cert_der: &[u8]) -> Result<Identity> {
    let (_, cert) =
        parse_x509_certificate(cert_der).map_err(|e| CoreError::certificate(e.to_string()))?;

    let cn = cert
        .subject()
        .iter_common_name()
        .next()
        .ok_or(CoreError::MissingIdentity)?;
    let name = cn
        .as_str()
        .map_err(|e| CoreError::certificate(format!("commonName is not a string: {e}")))?;

    Identity::new(name).map_err(|_| CoreError::MissingIdentity)
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};

    fn cert_with_cn(cn: Option<&str>) -> Vec<u8> {
        let mut params = CertificateParams::new(vec!["riffle.local".to_owned()]).unwrap();
        params.distinguished_name = DistinguishedName::new();
        if let Some(cn) = cn {
            params.distinguished_name.push(DnType::CommonName, cn);
        }
        params.distinguished_name.push(DnType::OrganizationName, "Riffle Test");
        let key = KeyPair::generate().unwrap();
        params.self_signed(&key).unwrap().der().to_vec()
    }

    #[test]
    fn test_extracts_common_name_verbatim() {
        let der = cert_with_cn(Some("device-1"));
        let identity = CommonNameExtractor.extract(&der).unwrap();
        assert_eq!(identity.as_str(), "device-1");

        let der = cert_with_cn(Some("Pd Server"));
        assert_eq!(identity_from_der(&der).unwrap().as_str(), "Pd Server");
    }

    #[test]
    fn test_missing_common_name() {
        let der = cert_with_cn(None);
        assert!(matches!(
            identity_from_der(&der),
            Err(CoreError::MissingIdentity)
        ));
    }

    #[test]
    fn test_garbage_certificate() {
        assert!(matches!(
            identity_from_der(b"not a certificate"),
            Err(CoreError::Certificate { .. })
        ));
    }
}
