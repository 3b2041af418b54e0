//! Certificate bootstrap for the webhook's TLS endpoint.
//!
//! The webhook needs a serving certificate the API server trusts. At startup
//! we mint a throwaway self-signed CA, issue a leaf for the service's DNS
//! names, and hand the CA's PEM to the `MutatingWebhookConfiguration` as its
//! `caBundle`. Nothing is rotated; every `certificates` run starts fresh.
//!
//! Keys are 4096-bit RSA. `ring` can sign with RSA but not generate RSA keys,
//! so generation goes through the `rsa` crate and the PKCS#8 encoding is
//! loaded into `rcgen` for signing.

mod authority;
mod files;
mod leaf;

pub use authority::{CA_SERIAL, CertificateAuthority};
pub use files::{CA_CERT_FILE, TLS_CERT_FILE, TLS_KEY_FILE, write_bundle};
pub use leaf::{LEAF_SERIAL, ServerCertificate, issue, issue_with_key_size};

use rand::rngs::OsRng;
use rcgen::{KeyPair, PKCS_RSA_SHA256};
use rsa::RsaPrivateKey;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use thiserror::Error;
use time::{Duration, OffsetDateTime};

/// Organization written into the subject of every certificate we mint
pub const ORGANIZATION: &str = "muting.io";

/// RSA modulus size for both the CA and the serving key
pub const RSA_KEY_BITS: usize = 4096;

/// PKI errors
#[derive(Debug, Error)]
pub enum PkiError {
    /// Key generation failed
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// Certificate generation or signing failed
    #[error("certificate generation failed: {0}")]
    CertificateGeneration(String),

    /// Certificate or key encoding failed
    #[error("encoding failed: {0}")]
    Encoding(String),

    /// Certificate parsing error
    #[error("certificate parsing error: {0}")]
    Parse(String),

    /// Signature verification failed
    #[error("certificate verification failed: {0}")]
    Verification(String),

    /// IO error
    #[error("IO error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for PKI operations
pub type Result<T> = std::result::Result<T, PkiError>;

/// A freshly generated RSA key, loaded for signing and encoded for disk.
pub(crate) struct RsaKey {
    /// Signing handle used by rcgen
    pub key_pair: KeyPair,
    /// `RSA PRIVATE KEY` (PKCS#1) PEM block
    pub pkcs1_pem: String,
}

/// Generate an RSA key of `bits` size.
pub(crate) fn generate_rsa_key(bits: usize) -> Result<RsaKey> {
    let private_key = RsaPrivateKey::new(&mut OsRng, bits)
        .map_err(|e| PkiError::KeyGeneration(format!("failed to generate RSA key: {}", e)))?;

    let pkcs8_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| PkiError::Encoding(format!("failed to encode PKCS#8 key: {}", e)))?;
    let key_pair = KeyPair::from_pkcs8_pem_and_sign_algo(&pkcs8_pem, &PKCS_RSA_SHA256)
        .map_err(|e| PkiError::KeyGeneration(format!("failed to load RSA key: {}", e)))?;

    let pkcs1_pem = private_key
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| PkiError::Encoding(format!("failed to encode PKCS#1 key: {}", e)))?;

    Ok(RsaKey {
        key_pair,
        pkcs1_pem: pkcs1_pem.to_string(),
    })
}

/// Validity window starting now and ending one calendar year later.
///
/// On Feb 29 the next year has no such day, so fall back to 365 days.
pub(crate) fn one_year_validity() -> (OffsetDateTime, OffsetDateTime) {
    let now = OffsetDateTime::now_utc();
    let not_after = now
        .replace_year(now.year() + 1)
        .unwrap_or_else(|_| now + Duration::days(365));
    (now, not_after)
}

/// Parse PEM-encoded data and return the DER bytes
pub(crate) fn parse_pem(pem_data: &str) -> Result<Vec<u8>> {
    let pem_obj = ::pem::parse(pem_data.as_bytes())
        .map_err(|e| PkiError::Parse(format!("failed to parse PEM: {}", e)))?;
    Ok(pem_obj.contents().to_vec())
}
