//! muting library crate
//!
//! A Kubernetes mutating admission webhook that rewrites Ingress hosts from a
//! set of source domains onto a target domain. The `certificates` phase
//! bootstraps TLS material and registers the webhook; the `server` phase
//! answers admission reviews.

pub mod certificates;
pub mod config;
pub mod error;
pub mod health;
pub mod mutator;
pub mod registration;
pub mod webhooks;

pub use error::{Error, Result};
pub use webhooks::{WebhookError, run_webhook_server};

use tracing::info;

use certificates::{CertificateAuthority, RSA_KEY_BITS};
use config::CertificatesConfig;
use registration::{ReconcileOutcome, WebhookConfigApi};

/// Run the bootstrap phase against `api`.
///
/// Generates a CA and a serving certificate for the configured service,
/// writes `ca.crt`, `tls.crt` and `tls.key` to the output directory, then
/// registers the webhook with the CA as its trust bundle. Nothing is written
/// to the cluster if any certificate step fails.
pub async fn run_certificates<A: WebhookConfigApi>(
    config: &CertificatesConfig,
    api: &A,
) -> Result<ReconcileOutcome> {
    run_certificates_with_key_size(config, api, RSA_KEY_BITS).await
}

/// [`run_certificates`] with keys of the given modulus size.
pub async fn run_certificates_with_key_size<A: WebhookConfigApi>(
    config: &CertificatesConfig,
    api: &A,
    bits: usize,
) -> Result<ReconcileOutcome> {
    info!(bits, "Generating certificate authority");
    let ca = CertificateAuthority::generate_with_key_size(bits)?;

    let common_name = config.common_name();
    info!(common_name = %common_name, "Issuing server certificate");
    let server = certificates::issue_with_key_size(&ca, &common_name, &config.dns_names(), bits)?;
    ca.verify(&server.cert_pem)?;

    certificates::write_bundle(&config.output, ca.cert_pem(), &server)?;

    let desired = registration::desired_configuration(
        &config.name,
        &config.namespace,
        &config.service,
        ca.cert_pem().as_bytes(),
    );
    let outcome = registration::reconcile(api, desired).await?;
    info!(name = %config.name, outcome = %outcome, "Mutating webhook configuration reconciled");

    Ok(outcome)
}
