//! Error types for the muting binary.

use thiserror::Error;

use crate::certificates::PkiError;
use crate::registration::RegistrationError;
use crate::webhooks::WebhookError;

/// Error type for a bootstrap or serving run
#[derive(Error, Debug)]
pub enum Error {
    /// Certificate generation or output failed
    #[error("PKI error: {0}")]
    Pki(#[from] PkiError),

    /// Webhook registration failed
    #[error("Registration error: {0}")]
    Registration(#[from] RegistrationError),

    /// Webhook server failed
    #[error("Webhook error: {0}")]
    Webhook(#[from] WebhookError),

    /// Kubernetes client construction failed
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

/// Result type alias for top-level operations
pub type Result<T> = std::result::Result<T, Error>;
