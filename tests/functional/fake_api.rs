//! In-memory stand-in for the MutatingWebhookConfiguration API.
//!
//! Mimics the parts of the API server the reconciler relies on: 404 for
//! missing objects, defaulting of optional fields on write, resource version
//! bumps, and optimistic concurrency on replace.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use k8s_openapi::api::admissionregistration::v1::MutatingWebhookConfiguration;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::core::ErrorResponse;
use muting::registration::{RegistrationError, WebhookConfigApi};

/// Build an API error the way kube surfaces a failed request.
pub fn api_error(code: u16, reason: &str) -> RegistrationError {
    RegistrationError::Kube(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("fake API server: {}", reason),
        reason: reason.to_string(),
        code,
    }))
}

#[derive(Default)]
pub struct FakeWebhookConfigApi {
    objects: Mutex<BTreeMap<String, MutatingWebhookConfiguration>>,
    next_version: AtomicUsize,
    /// Status code every call fails with, if set
    fail_with: Option<u16>,
    pub fetches: AtomicUsize,
    pub creates: AtomicUsize,
    pub replaces: AtomicUsize,
}

impl FakeWebhookConfigApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// An API server that answers every call with `code`.
    pub fn failing(code: u16) -> Self {
        Self {
            fail_with: Some(code),
            ..Self::default()
        }
    }

    /// Store `config` as if it had been created earlier.
    pub fn seed(&self, config: MutatingWebhookConfiguration) -> MutatingWebhookConfiguration {
        let stored = self.admit(config);
        let name = stored.metadata.name.clone().unwrap_or_default();
        self.objects.lock().unwrap().insert(name, stored.clone());
        stored
    }

    pub fn get(&self, name: &str) -> Option<MutatingWebhookConfiguration> {
        self.objects.lock().unwrap().get(name).cloned()
    }

    pub fn writes(&self) -> usize {
        self.creates.load(Ordering::SeqCst) + self.replaces.load(Ordering::SeqCst)
    }

    /// Apply server-side defaulting and stamp a fresh resource version.
    fn admit(&self, mut config: MutatingWebhookConfiguration) -> MutatingWebhookConfiguration {
        let version = self.next_version.fetch_add(1, Ordering::SeqCst) + 1;
        config.metadata.resource_version = Some(version.to_string());
        config.metadata.uid.get_or_insert_with(|| "5f9e2c1a".to_string());

        for webhook in config.webhooks.iter_mut().flatten() {
            webhook.match_policy.get_or_insert_with(|| "Equivalent".to_string());
            webhook.reinvocation_policy.get_or_insert_with(|| "Never".to_string());
            webhook.timeout_seconds.get_or_insert(10);
            webhook.object_selector.get_or_insert_with(LabelSelector::default);
            if let Some(service) = webhook.client_config.service.as_mut() {
                service.port.get_or_insert(443);
            }
            for rule in webhook.rules.iter_mut().flatten() {
                rule.scope.get_or_insert_with(|| "*".to_string());
            }
        }
        config
    }

    fn check_failure(&self) -> Result<(), RegistrationError> {
        match self.fail_with {
            Some(code) => Err(api_error(code, "InternalError")),
            None => Ok(()),
        }
    }
}

impl WebhookConfigApi for FakeWebhookConfigApi {
    async fn fetch(&self, name: &str) -> Result<MutatingWebhookConfiguration, RegistrationError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        self.get(name).ok_or_else(|| api_error(404, "NotFound"))
    }

    async fn create(
        &self,
        config: &MutatingWebhookConfiguration,
    ) -> Result<MutatingWebhookConfiguration, RegistrationError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;

        let name = config.metadata.name.clone().unwrap_or_default();
        if self.get(&name).is_some() {
            return Err(api_error(409, "AlreadyExists"));
        }
        if config.metadata.resource_version.is_some() {
            return Err(api_error(400, "BadRequest"));
        }

        let stored = self.admit(config.clone());
        self.objects.lock().unwrap().insert(name, stored.clone());
        Ok(stored)
    }

    async fn replace(
        &self,
        name: &str,
        config: &MutatingWebhookConfiguration,
    ) -> Result<MutatingWebhookConfiguration, RegistrationError> {
        self.replaces.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;

        let live = self.get(name).ok_or_else(|| api_error(404, "NotFound"))?;
        if config.metadata.resource_version != live.metadata.resource_version {
            return Err(api_error(409, "Conflict"));
        }

        let mut incoming = config.clone();
        incoming.metadata.uid = live.metadata.uid;
        let stored = self.admit(incoming);
        self.objects
            .lock()
            .unwrap()
            .insert(name.to_string(), stored.clone());
        Ok(stored)
    }
}
