//! The complete `certificates` phase against the in-memory API server.

use std::sync::atomic::Ordering;

use muting::certificates::{CA_CERT_FILE, TLS_CERT_FILE, TLS_KEY_FILE};
use muting::config::CertificatesConfig;
use muting::registration::ReconcileOutcome;
use muting::run_certificates_with_key_size;

use crate::fake_api::FakeWebhookConfigApi;

const TEST_KEY_BITS: usize = 2048;

fn config(output: &std::path::Path) -> CertificatesConfig {
    CertificatesConfig {
        name: "muting".to_string(),
        namespace: "default".to_string(),
        service: "muting".to_string(),
        output: output.to_path_buf(),
    }
}

#[tokio::test]
async fn test_bootstrap_writes_bundle_and_registers() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir.path().join("tls"));
    let api = FakeWebhookConfigApi::new();

    let outcome = run_certificates_with_key_size(&cfg, &api, TEST_KEY_BITS)
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Created);

    let ca_pem = std::fs::read(cfg.output.join(CA_CERT_FILE)).unwrap();
    assert!(cfg.output.join(TLS_CERT_FILE).is_file());
    assert!(cfg.output.join(TLS_KEY_FILE).is_file());

    let live = api.get("muting").unwrap();
    let webhook = &live.webhooks.as_ref().unwrap()[0];
    assert_eq!(webhook.client_config.ca_bundle.as_ref().unwrap().0, ca_pem);
}

#[tokio::test]
async fn test_rerun_rotates_ca_bundle() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let api = FakeWebhookConfigApi::new();

    run_certificates_with_key_size(&cfg, &api, TEST_KEY_BITS)
        .await
        .unwrap();
    let outcome = run_certificates_with_key_size(&cfg, &api, TEST_KEY_BITS)
        .await
        .unwrap();

    // Every run mints a fresh CA, so the bundle always differs
    assert_eq!(outcome, ReconcileOutcome::Updated);
    assert_eq!(api.replaces.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unwritable_output_skips_registration() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("file");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let cfg = config(&blocker);
    let api = FakeWebhookConfigApi::new();

    let result = run_certificates_with_key_size(&cfg, &api, TEST_KEY_BITS).await;

    assert!(matches!(result, Err(muting::Error::Pki(_))));
    assert_eq!(api.fetches.load(Ordering::SeqCst), 0);
}
