//! Admission webhook server.
//!
//! Serves the mutating endpoint over TLS next to a liveness probe and the
//! metrics scrape endpoint. The certificate and key are the files written by
//! the `certificates` phase.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::health::{Metrics, Outcome, health, metrics_response};
use crate::mutator::{MutateError, mutate_review};
use crate::registration::WEBHOOK_PATH;

/// Time given to in-flight requests once shutdown starts
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Shared state for webhook handlers
pub struct WebhookState {
    sources: String,
    target: String,
    pub metrics: Metrics,
}

impl WebhookState {
    pub fn new(sources: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            sources: sources.into(),
            target: target.into(),
            metrics: Metrics::new(),
        }
    }
}

/// Create the webhook router
pub fn create_webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route(WEBHOOK_PATH, post(mutate_handler))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn mutate_handler(State(state): State<Arc<WebhookState>>, body: Bytes) -> Response {
    let started = Instant::now();
    let result = mutate_review(&body, &state.sources, &state.target);
    let elapsed = started.elapsed().as_secs_f64();

    match result {
        Ok(mutation) => {
            state.metrics.record_request(Outcome::Mutated, elapsed);
            state.metrics.record_rewrites(mutation.rewritten);
            info!(
                uid = %mutation.uid,
                rules = mutation.rules,
                rewritten = mutation.rewritten,
                "Admission request mutated"
            );
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/json")],
                mutation.body,
            )
                .into_response()
        }
        Err(e @ MutateError::BadRequest(_)) => {
            state.metrics.record_request(Outcome::BadRequest, elapsed);
            warn!(error = %e, "Rejected admission request");
            (e.status_code(), "bad request").into_response()
        }
        Err(e @ MutateError::Internal(_)) => {
            state.metrics.record_request(Outcome::Internal, elapsed);
            error!(error = %e, "Failed to build admission response");
            (e.status_code(), "internal server error").into_response()
        }
    }
}

async fn metrics_handler(State(state): State<Arc<WebhookState>>) -> Response {
    metrics_response(&state.metrics)
}

/// Errors that can occur when running the webhook server
#[derive(Error, Debug)]
pub enum WebhookError {
    /// TLS configuration error
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    /// Server error
    #[error("Webhook server error: {0}")]
    Server(String),
}

/// Run the webhook server with TLS until `shutdown` resolves.
///
/// In-flight requests get a short grace period to finish once shutdown
/// starts.
pub async fn run_webhook_server<F>(config: ServerConfig, shutdown: F) -> Result<(), WebhookError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let state = Arc::new(WebhookState::new(config.sources, config.target));
    let app = create_webhook_router(state);

    let tls = RustlsConfig::from_pem_file(&config.certificate, &config.key)
        .await
        .map_err(|e| WebhookError::TlsConfig(e.to_string()))?;

    let handle = Handle::new();
    tokio::spawn({
        let handle = handle.clone();
        async move {
            shutdown.await;
            debug!("Draining webhook server");
            handle.graceful_shutdown(Some(SHUTDOWN_GRACE_PERIOD));
        }
    });

    info!(addr = %config.bind, "Webhook server listening with TLS");

    axum_server::bind_rustls(config.bind, tls)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .map_err(|e| WebhookError::Server(e.to_string()))?;

    info!("Webhook server stopped");
    Ok(())
}
