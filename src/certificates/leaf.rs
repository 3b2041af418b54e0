//! Serving certificate signed by the bootstrap CA.

use rcgen::{
    CertificateParams, DistinguishedName, DnType, DnValue, ExtendedKeyUsagePurpose, IsCa,
    KeyUsagePurpose, SanType, SerialNumber, string::Ia5String,
};
use tracing::debug;

use super::{
    CertificateAuthority, ORGANIZATION, PkiError, RSA_KEY_BITS, Result, generate_rsa_key,
    one_year_validity,
};

/// Serial number of the serving certificate
pub const LEAF_SERIAL: u64 = 1658;

/// PEM output of [`issue`].
#[derive(Clone)]
pub struct ServerCertificate {
    /// `CERTIFICATE` PEM block
    pub cert_pem: String,
    /// `RSA PRIVATE KEY` PEM block
    pub key_pem: String,
}

impl std::fmt::Debug for ServerCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerCertificate")
            .field("cert_pem", &self.cert_pem)
            .field("key_pem", &"<redacted>")
            .finish()
    }
}

/// Issue a serving certificate for `common_name` and `dns_names`, signed by `ca`.
///
/// The DNS names are used as given.
pub fn issue(
    ca: &CertificateAuthority,
    common_name: &str,
    dns_names: &[String],
) -> Result<ServerCertificate> {
    issue_with_key_size(ca, common_name, dns_names, RSA_KEY_BITS)
}

/// [`issue`] with a key of the given modulus size.
pub fn issue_with_key_size(
    ca: &CertificateAuthority,
    common_name: &str,
    dns_names: &[String],
    bits: usize,
) -> Result<ServerCertificate> {
    let mut params = CertificateParams::default();

    let mut dn = DistinguishedName::new();
    dn.push(
        DnType::CommonName,
        DnValue::Utf8String(common_name.to_string()),
    );
    dn.push(
        DnType::OrganizationName,
        DnValue::Utf8String(ORGANIZATION.to_string()),
    );
    params.distinguished_name = dn;
    params.serial_number = Some(SerialNumber::from(LEAF_SERIAL));

    params.is_ca = IsCa::NoCa;
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ClientAuth,
        ExtendedKeyUsagePurpose::ServerAuth,
    ];

    let (not_before, not_after) = one_year_validity();
    params.not_before = not_before;
    params.not_after = not_after;

    params.subject_alt_names = dns_names
        .iter()
        .map(|name| {
            Ia5String::try_from(name.as_str())
                .map(SanType::DnsName)
                .map_err(|e| {
                    PkiError::CertificateGeneration(format!("invalid DNS name '{}': {}", name, e))
                })
        })
        .collect::<Result<Vec<_>>>()?;

    debug!(common_name, bits, "Generating serving key");
    let key = generate_rsa_key(bits)?;

    let cert = params.signed_by(&key.key_pair, ca.issuer()).map_err(|e| {
        PkiError::CertificateGeneration(format!("failed to sign server cert: {}", e))
    })?;

    Ok(ServerCertificate {
        cert_pem: cert.pem(),
        key_pem: key.pkcs1_pem,
    })
}
