//! One-shot create-or-update of the webhook configuration.

use std::fmt;

use k8s_openapi::api::admissionregistration::v1::MutatingWebhookConfiguration;
use kube::Api;
use kube::api::PostParams;
use tracing::{debug, info};

use super::{Result, is_up_to_date};

/// Cluster operations the reconciler needs.
///
/// Implemented for `Api<MutatingWebhookConfiguration>`; tests substitute an
/// in-memory store.
pub trait WebhookConfigApi {
    /// Fetch the configuration called `name`. A missing object is a 404 error.
    fn fetch(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<MutatingWebhookConfiguration>> + Send;

    /// Create a new configuration.
    fn create(
        &self,
        config: &MutatingWebhookConfiguration,
    ) -> impl std::future::Future<Output = Result<MutatingWebhookConfiguration>> + Send;

    /// Replace the configuration called `name`. `config` must carry the live
    /// resource version.
    fn replace(
        &self,
        name: &str,
        config: &MutatingWebhookConfiguration,
    ) -> impl std::future::Future<Output = Result<MutatingWebhookConfiguration>> + Send;
}

impl WebhookConfigApi for Api<MutatingWebhookConfiguration> {
    async fn fetch(&self, name: &str) -> Result<MutatingWebhookConfiguration> {
        Ok(self.get(name).await?)
    }

    async fn create(
        &self,
        config: &MutatingWebhookConfiguration,
    ) -> Result<MutatingWebhookConfiguration> {
        Ok(Api::create(self, &PostParams::default(), config).await?)
    }

    async fn replace(
        &self,
        name: &str,
        config: &MutatingWebhookConfiguration,
    ) -> Result<MutatingWebhookConfiguration> {
        Ok(Api::replace(self, name, &PostParams::default(), config).await?)
    }
}

/// How the registration ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No configuration existed; it was created
    Created,
    /// A managed field differed; the configuration was replaced
    Updated,
    /// The live configuration already matched; nothing was written
    Unchanged,
}

impl ReconcileOutcome {
    /// Whether the cluster now routes admission requests to us because of
    /// this run's write.
    pub fn is_registered(&self) -> bool {
        matches!(self, ReconcileOutcome::Created | ReconcileOutcome::Updated)
    }
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileOutcome::Created => write!(f, "Created"),
            ReconcileOutcome::Updated => write!(f, "Updated"),
            ReconcileOutcome::Unchanged => write!(f, "Unchanged"),
        }
    }
}

/// Bring the cluster's configuration in line with `desired`.
///
/// Runs exactly once; errors are returned to the caller without retrying.
pub async fn reconcile<A: WebhookConfigApi>(
    api: &A,
    mut desired: MutatingWebhookConfiguration,
) -> Result<ReconcileOutcome> {
    let name = desired.metadata.name.clone().unwrap_or_default();

    let live = match api.fetch(&name).await {
        Ok(live) => live,
        Err(e) if e.is_not_found() => {
            info!(name = %name, "Creating mutating webhook configuration");
            api.create(&desired).await?;
            return Ok(ReconcileOutcome::Created);
        }
        Err(e) => return Err(e),
    };

    if is_up_to_date(&desired, &live) {
        debug!(name = %name, "Mutating webhook configuration is up to date");
        return Ok(ReconcileOutcome::Unchanged);
    }

    info!(
        name = %name,
        resource_version = ?live.metadata.resource_version,
        "Updating mutating webhook configuration"
    );
    desired.metadata.resource_version = live.metadata.resource_version;
    api.replace(&name, &desired).await?;
    Ok(ReconcileOutcome::Updated)
}
