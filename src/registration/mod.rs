//! Registration of the webhook with the API server.
//!
//! Builds the desired `MutatingWebhookConfiguration` and syncs it against the
//! cluster once at startup: create when missing, replace when a managed field
//! drifted, otherwise leave the object alone.

mod desired;
mod reconcile;

pub use desired::{
    ADMISSION_REVIEW_VERSION, FAILURE_POLICY, INGRESS_API_GROUP, INGRESS_API_VERSION,
    INGRESS_RESOURCE, SIDE_EFFECTS, WEBHOOK_PATH, desired_configuration, is_up_to_date,
    webhook_name,
};
pub use reconcile::{ReconcileOutcome, WebhookConfigApi, reconcile};

use thiserror::Error;

/// Error type for webhook registration
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

impl RegistrationError {
    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistrationError::Kube(kube::Error::Api(e)) if e.code == 404)
    }
}

/// Result type alias for registration operations
pub type Result<T> = std::result::Result<T, RegistrationError>;
