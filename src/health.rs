//! Health probe and Prometheus metrics for the webhook server.
//!
//! Provides:
//! - `/health` - Liveness probe (always returns 200 if the server is running)
//! - `/metrics` - Prometheus metrics endpoint

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;

/// How an admission request ended
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Outcome {
    Mutated,
    BadRequest,
    Internal,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Mutated => "mutated",
            Outcome::BadRequest => "bad_request",
            Outcome::Internal => "internal",
        }
    }
}

/// Labels for admission request metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct OutcomeLabels {
    pub outcome: Outcome,
}

impl EncodeLabelSet for OutcomeLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("outcome", self.outcome.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Shared metrics for the webhook server
pub struct Metrics {
    /// Admission requests by outcome
    pub admission_requests_total: Family<OutcomeLabels, Counter>,
    /// Ingress rules whose host was changed
    pub host_rewrites_total: Counter,
    /// Time spent mutating a single review
    pub admission_duration_seconds: Histogram,
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics instance with registered metrics
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let admission_requests_total = Family::<OutcomeLabels, Counter>::default();
        registry.register(
            "muting_admission_requests",
            "Total number of admission requests by outcome",
            admission_requests_total.clone(),
        );

        let host_rewrites_total = Counter::default();
        registry.register(
            "muting_host_rewrites",
            "Total number of Ingress rule hosts rewritten",
            host_rewrites_total.clone(),
        );

        let admission_duration_seconds = Histogram::new(exponential_buckets(0.0001, 2.0, 15));
        registry.register(
            "muting_admission_duration_seconds",
            "Duration of admission request mutation in seconds",
            admission_duration_seconds.clone(),
        );

        Self {
            admission_requests_total,
            host_rewrites_total,
            admission_duration_seconds,
            registry,
        }
    }

    /// Record a finished admission request
    pub fn record_request(&self, outcome: Outcome, duration_secs: f64) {
        self.admission_requests_total
            .get_or_create(&OutcomeLabels { outcome })
            .inc();
        self.admission_duration_seconds.observe(duration_secs);
    }

    /// Record rewritten hosts of a mutated review
    pub fn record_rewrites(&self, count: usize) {
        self.host_rewrites_total.inc_by(count as u64);
    }

    /// Encode metrics to Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("Failed to encode metrics");
            return "# Error encoding metrics".to_string();
        }
        buffer
    }
}

/// Liveness probe handler
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "success")
}

/// Render `metrics` as a Prometheus scrape response
pub fn metrics_response(metrics: &Metrics) -> Response {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        metrics.encode(),
    )
        .into_response()
}
