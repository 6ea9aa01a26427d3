//! TLS verification and client certificate normalization.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::error::NormalizeError;

const PEM_CERT_MARKER: &[u8] = b"-----BEGIN CERTIFICATE-----";

/// Accepted shapes for the `verify` request parameter.
#[derive(Debug, Clone)]
pub enum VerifyInput {
    /// `true` uses the system trust store, `false` disables verification.
    Flag(bool),
    /// Path to a CA bundle file or directory.
    Path(PathBuf),
    /// Raw PEM bundle content.
    Pem(Vec<u8>),
}

impl From<bool> for VerifyInput {
    fn from(flag: bool) -> Self {
        Self::Flag(flag)
    }
}

impl From<&str> for VerifyInput {
    fn from(path: &str) -> Self {
        Self::Path(PathBuf::from(path))
    }
}

impl From<PathBuf> for VerifyInput {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<Vec<u8>> for VerifyInput {
    fn from(pem: Vec<u8>) -> Self {
        Self::Pem(pem)
    }
}

/// Resolved TLS verification mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TrustAnchor {
    /// Certificates are not verified.
    Disabled,
    /// The platform trust store.
    #[default]
    SystemDefault,
    /// A CA bundle on disk.
    BundlePath(PathBuf),
    /// An in-memory PEM bundle.
    BundlePem(Vec<u8>),
}

impl TrustAnchor {
    #[must_use]
    pub fn verifies(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

impl fmt::Display for TrustAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("disabled"),
            Self::SystemDefault => f.write_str("system"),
            Self::BundlePath(path) => write!(f, "bundle:{}", path.display()),
            Self::BundlePem(pem) => write!(f, "bundle:<{} bytes of PEM>", pem.len()),
        }
    }
}

/// Normalizes a `verify` value into a [`TrustAnchor`].
///
/// # Errors
///
/// Returns [`NormalizeError::TypeMismatch`] for an empty path, or for PEM
/// content that holds no certificate.
#[instrument(level = "debug", skip(input))]
pub fn normalize_verify(input: VerifyInput) -> Result<TrustAnchor, NormalizeError> {
    let anchor = match input {
        VerifyInput::Flag(true) => TrustAnchor::SystemDefault,
        VerifyInput::Flag(false) => {
            warn!("TLS certificate verification disabled");
            TrustAnchor::Disabled
        }
        VerifyInput::Path(path) => {
            if path.as_os_str().is_empty() {
                return Err(NormalizeError::mismatch("verify", "non-empty CA bundle path", "empty path"));
            }
            TrustAnchor::BundlePath(path)
        }
        VerifyInput::Pem(pem) => {
            if !contains(&pem, PEM_CERT_MARKER) {
                return Err(NormalizeError::mismatch(
                    "verify",
                    "PEM bundle with at least one certificate",
                    format!("{} bytes without a certificate block", pem.len()),
                ));
            }
            TrustAnchor::BundlePem(pem)
        }
    };
    debug!(verifies = anchor.verifies(), "normalized TLS verification");
    Ok(anchor)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

/// Accepted shapes for the `cert` request parameter.
#[derive(Clone)]
pub enum ClientCertInput {
    /// A single PEM file holding both certificate and key.
    Pem(PathBuf),
    /// (certificate, key)
    Pair(PathBuf, PathBuf),
    /// (certificate, key, key password)
    WithPassword(PathBuf, PathBuf, String),
}

impl fmt::Debug for ClientCertInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pem(cert) => f.debug_tuple("Pem").field(cert).finish(),
            Self::Pair(cert, key) => f.debug_tuple("Pair").field(cert).field(key).finish(),
            Self::WithPassword(cert, key, _) => f
                .debug_tuple("WithPassword")
                .field(cert)
                .field(key)
                .field(&"[REDACTED]")
                .finish(),
        }
    }
}

impl From<&str> for ClientCertInput {
    fn from(pem: &str) -> Self {
        Self::Pem(PathBuf::from(pem))
    }
}

impl From<(&str, &str)> for ClientCertInput {
    fn from((cert, key): (&str, &str)) -> Self {
        Self::Pair(PathBuf::from(cert), PathBuf::from(key))
    }
}

impl From<(&str, &str, &str)> for ClientCertInput {
    fn from((cert, key, password): (&str, &str, &str)) -> Self {
        Self::WithPassword(PathBuf::from(cert), PathBuf::from(key), password.to_string())
    }
}

/// Resolved client certificate.
///
/// `key` is `None` when the certificate file bundles its key.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct ClientCert {
    pub cert: PathBuf,
    pub key: Option<PathBuf>,
    #[serde(skip)]
    password: Option<String>,
}

impl ClientCert {
    /// Key password (sensitive; never log).
    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    #[must_use]
    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }
}

impl fmt::Debug for ClientCert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCert")
            .field("cert", &self.cert)
            .field("key", &self.key)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Normalizes a `cert` value into a [`ClientCert`].
///
/// # Errors
///
/// Returns [`NormalizeError::ShapeIncomplete`] when any element of the
/// recognised shape is empty.
#[instrument(level = "debug")]
pub fn normalize_client_cert(input: ClientCertInput) -> Result<ClientCert, NormalizeError> {
    let cert = match input {
        ClientCertInput::Pem(cert) => ClientCert {
            cert: required(cert, "PEM path", "certificate")?,
            key: None,
            password: None,
        },
        ClientCertInput::Pair(cert, key) => ClientCert {
            cert: required(cert, "(cert, key) pair", "certificate")?,
            key: Some(required(key, "(cert, key) pair", "key")?),
            password: None,
        },
        ClientCertInput::WithPassword(cert, key, password) => {
            const SHAPE: &str = "(cert, key, password) triple";
            if password.is_empty() {
                return Err(NormalizeError::incomplete("cert", SHAPE, "password"));
            }
            ClientCert {
                cert: required(cert, SHAPE, "certificate")?,
                key: Some(required(key, SHAPE, "key")?),
                password: Some(password),
            }
        }
    };
    debug!(
        embedded_key = cert.key.is_none(),
        has_password = cert.has_password(),
        "normalized client certificate"
    );
    Ok(cert)
}

fn required(path: PathBuf, shape: &'static str, element: &'static str) -> Result<PathBuf, NormalizeError> {
    if path.as_os_str().is_empty() {
        return Err(NormalizeError::incomplete("cert", shape, element));
    }
    Ok(path)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const PEM: &[u8] = b"-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n";

    #[test]
    fn test_flags_map_to_trust_anchors() {
        assert_eq!(normalize_verify(true.into()).unwrap(), TrustAnchor::SystemDefault);
        let disabled = normalize_verify(false.into()).unwrap();
        assert_eq!(disabled, TrustAnchor::Disabled);
        assert!(!disabled.verifies());
    }

    #[test]
    fn test_path_and_pem_become_bundles() {
        assert_eq!(
            normalize_verify("/etc/ssl/ca.pem".into()).unwrap(),
            TrustAnchor::BundlePath(PathBuf::from("/etc/ssl/ca.pem"))
        );
        assert_eq!(
            normalize_verify(PEM.to_vec().into()).unwrap(),
            TrustAnchor::BundlePem(PEM.to_vec())
        );
    }

    #[test]
    fn test_display_labels() {
        assert_eq!(TrustAnchor::Disabled.to_string(), "disabled");
        assert_eq!(TrustAnchor::default().to_string(), "system");
        assert_eq!(
            TrustAnchor::BundlePem(PEM.to_vec()).to_string(),
            format!("bundle:<{} bytes of PEM>", PEM.len())
        );
    }

    #[test]
    fn test_pem_without_certificate_is_type_mismatch() {
        let err = normalize_verify(b"not a bundle".to_vec().into()).unwrap_err();
        assert!(matches!(err, NormalizeError::TypeMismatch { param: "verify", .. }));
    }

    #[test]
    fn test_empty_path_is_type_mismatch() {
        let err = normalize_verify("".into()).unwrap_err();
        assert!(matches!(err, NormalizeError::TypeMismatch { .. }));
    }

    #[test]
    fn test_single_pem_embeds_key() {
        let cert = normalize_client_cert("client.pem".into()).unwrap();
        assert_eq!(cert.cert, PathBuf::from("client.pem"));
        assert!(cert.key.is_none());
        assert!(!cert.has_password());
    }

    #[test]
    fn test_pair_and_triple() {
        let pair = normalize_client_cert(("c.pem", "k.pem").into()).unwrap();
        assert_eq!(pair.key, Some(PathBuf::from("k.pem")));

        let triple = normalize_client_cert(("c.pem", "k.pem", "hunter2").into()).unwrap();
        assert_eq!(triple.password(), Some("hunter2"));
    }

    #[test]
    fn test_pair_missing_key_is_shape_incomplete() {
        let err = normalize_client_cert(("c.pem", "").into()).unwrap_err();
        assert_eq!(
            err,
            NormalizeError::incomplete("cert", "(cert, key) pair", "key")
        );
    }

    #[test]
    fn test_triple_missing_password_is_shape_incomplete() {
        let err = normalize_client_cert(("c.pem", "k.pem", "").into()).unwrap_err();
        assert!(matches!(
            err,
            NormalizeError::ShapeIncomplete { missing: "password", .. }
        ));
    }

    #[test]
    fn test_password_is_redacted() {
        let input: ClientCertInput = ("c.pem", "k.pem", "hunter2").into();
        assert!(!format!("{input:?}").contains("hunter2"));
        let cert = normalize_client_cert(input).unwrap();
        let debug = format!("{cert:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }
}
