//! Self-signed certificate authority.

use rcgen::{
    BasicConstraints, CertificateParams, CertifiedIssuer, DistinguishedName, DnType, DnValue,
    ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair, KeyUsagePurpose, SerialNumber,
};
use tracing::debug;
use x509_parser::prelude::*;

use super::{
    ORGANIZATION, PkiError, RSA_KEY_BITS, Result, generate_rsa_key, one_year_validity, parse_pem,
};

/// Serial number of the CA certificate
pub const CA_SERIAL: u64 = 2020;

/// In-memory certificate authority.
///
/// Lives for one `certificates` run. Only its PEM certificate ever leaves the
/// process; the private key is dropped with it.
pub struct CertificateAuthority {
    issuer: CertifiedIssuer<'static, KeyPair>,
    cert_pem: String,
}

impl CertificateAuthority {
    /// Generate a CA with a fresh 4096-bit RSA key, valid for one year.
    pub fn generate() -> Result<Self> {
        Self::generate_with_key_size(RSA_KEY_BITS)
    }

    /// Generate a CA with a key of the given modulus size.
    pub fn generate_with_key_size(bits: usize) -> Result<Self> {
        let mut params = CertificateParams::default();

        let mut dn = DistinguishedName::new();
        dn.push(
            DnType::OrganizationName,
            DnValue::Utf8String(ORGANIZATION.to_string()),
        );
        params.distinguished_name = dn;
        params.serial_number = Some(SerialNumber::from(CA_SERIAL));

        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyCertSign,
        ];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ClientAuth,
            ExtendedKeyUsagePurpose::ServerAuth,
        ];

        let (not_before, not_after) = one_year_validity();
        params.not_before = not_before;
        params.not_after = not_after;

        debug!(bits, "Generating CA key");
        let key = generate_rsa_key(bits)?;

        let issuer = CertifiedIssuer::self_signed(params, key.key_pair).map_err(|e| {
            PkiError::CertificateGeneration(format!("failed to create CA cert: {}", e))
        })?;
        let cert_pem = issuer.pem();

        Ok(Self { issuer, cert_pem })
    }

    /// PEM-encoded CA certificate, used as trust bundle and `caBundle`
    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    pub(crate) fn issuer(&self) -> &Issuer<'static, KeyPair> {
        &self.issuer
    }

    /// Check that a PEM certificate carries a valid signature from this CA.
    pub fn verify(&self, cert_pem: &str) -> Result<()> {
        let ca_der = parse_pem(&self.cert_pem)?;
        let (_, ca_cert) = X509Certificate::from_der(&ca_der)
            .map_err(|e| PkiError::Parse(format!("failed to parse CA certificate: {}", e)))?;

        let der = parse_pem(cert_pem)?;
        let (_, cert) = X509Certificate::from_der(&der)
            .map_err(|e| PkiError::Parse(format!("failed to parse certificate: {}", e)))?;

        cert.verify_signature(Some(ca_cert.public_key()))
            .map_err(|e| PkiError::Verification(e.to_string()))
    }
}

impl std::fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateAuthority")
            .field("cert_pem", &self.cert_pem)
            .finish_non_exhaustive()
    }
}
