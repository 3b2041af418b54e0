//! Registration reconcile flows against the in-memory API server.

use std::sync::atomic::Ordering;

use k8s_openapi::ByteString;
use muting::registration::{ReconcileOutcome, desired_configuration, is_up_to_date, reconcile};

use crate::fake_api::FakeWebhookConfigApi;

const CA: &[u8] = b"-----BEGIN CERTIFICATE-----\nfirst\n-----END CERTIFICATE-----\n";
const ROTATED_CA: &[u8] = b"-----BEGIN CERTIFICATE-----\nsecond\n-----END CERTIFICATE-----\n";

#[tokio::test]
async fn test_missing_configuration_is_created() {
    let api = FakeWebhookConfigApi::new();
    let desired = desired_configuration("muting", "default", "muting", CA);

    let outcome = reconcile(&api, desired.clone()).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Created);
    assert_eq!(api.creates.load(Ordering::SeqCst), 1);
    assert_eq!(api.replaces.load(Ordering::SeqCst), 0);
    assert!(is_up_to_date(&desired, &api.get("muting").unwrap()));
}

#[tokio::test]
async fn test_second_run_is_unchanged() {
    let api = FakeWebhookConfigApi::new();
    let desired = desired_configuration("muting", "default", "muting", CA);

    reconcile(&api, desired.clone()).await.unwrap();
    let outcome = reconcile(&api, desired).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Unchanged);
    assert_eq!(api.writes(), 1);
    assert_eq!(api.fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_rotated_ca_updates_configuration() {
    let api = FakeWebhookConfigApi::new();
    let seeded = api.seed(desired_configuration("muting", "default", "muting", CA));

    let outcome = reconcile(&api, desired_configuration("muting", "default", "muting", ROTATED_CA))
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::Updated);
    assert_eq!(api.creates.load(Ordering::SeqCst), 0);
    assert_eq!(api.replaces.load(Ordering::SeqCst), 1);

    let live = api.get("muting").unwrap();
    let webhook = &live.webhooks.as_ref().unwrap()[0];
    assert_eq!(
        webhook.client_config.ca_bundle,
        Some(ByteString(ROTATED_CA.to_vec()))
    );
    assert_eq!(live.metadata.uid, seeded.metadata.uid);
    assert_ne!(live.metadata.resource_version, seeded.metadata.resource_version);
}

#[tokio::test]
async fn test_changed_service_updates_configuration() {
    let api = FakeWebhookConfigApi::new();
    api.seed(desired_configuration("muting", "default", "muting", CA));

    let outcome = reconcile(&api, desired_configuration("muting", "web", "muting", CA))
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::Updated);
    let live = api.get("muting").unwrap();
    let webhook = &live.webhooks.as_ref().unwrap()[0];
    assert_eq!(webhook.name, "muting.web.svc.cluster.local");
}

#[tokio::test]
async fn test_update_then_unchanged() {
    let api = FakeWebhookConfigApi::new();
    api.seed(desired_configuration("muting", "default", "muting", CA));

    let rotated = desired_configuration("muting", "default", "muting", ROTATED_CA);
    assert_eq!(
        reconcile(&api, rotated.clone()).await.unwrap(),
        ReconcileOutcome::Updated
    );
    assert_eq!(
        reconcile(&api, rotated).await.unwrap(),
        ReconcileOutcome::Unchanged
    );
    assert_eq!(api.replaces.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_manual_edit_is_reverted() {
    let api = FakeWebhookConfigApi::new();
    let mut edited = desired_configuration("muting", "default", "muting", CA);
    edited.webhooks.as_mut().unwrap()[0].failure_policy = Some("Ignore".to_string());
    api.seed(edited);

    let outcome = reconcile(&api, desired_configuration("muting", "default", "muting", CA))
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::Updated);
    let live = api.get("muting").unwrap();
    assert_eq!(
        live.webhooks.as_ref().unwrap()[0].failure_policy.as_deref(),
        Some("Fail")
    );
}

#[tokio::test]
async fn test_api_failure_is_fatal() {
    let api = FakeWebhookConfigApi::failing(500);

    let err = reconcile(&api, desired_configuration("muting", "default", "muting", CA))
        .await
        .unwrap_err();

    assert!(!err.is_not_found());
    assert_eq!(api.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(api.writes(), 0);
}

#[tokio::test]
async fn test_forbidden_is_not_treated_as_missing() {
    let api = FakeWebhookConfigApi::failing(403);

    let result = reconcile(&api, desired_configuration("muting", "default", "muting", CA)).await;

    assert!(result.is_err());
    assert_eq!(api.creates.load(Ordering::SeqCst), 0);
}
