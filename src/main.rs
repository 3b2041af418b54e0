//! muting - Ingress host rewriting admission webhook.
//!
//! This is the main entry point that:
//! - Initializes structured logging
//! - Parses the `certificates` or `server` subcommand
//! - Runs the bootstrap phase once, or serves the webhook until shutdown

use clap::Parser;
use k8s_openapi::api::admissionregistration::v1::MutatingWebhookConfiguration;
use kube::{Api, Client};
use tokio::signal;
use tracing::info;

use muting::config::{Cli, Command};
use muting::{run_certificates, run_webhook_server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("muting=info".parse()?)
                .add_directive("kube=info".parse()?),
        )
        .json()
        .init();

    // kube and axum-server each enable a rustls provider; pick one explicitly
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    match Cli::parse().command {
        Command::Certificates(config) => {
            info!(config = %config, "Starting muting certificates");

            let client = Client::try_default().await?;
            let api: Api<MutatingWebhookConfiguration> = Api::all(client);
            let outcome = run_certificates(&config, &api).await?;

            info!(outcome = %outcome, "Certificates ready");
        }
        Command::Server(config) => {
            info!(config = %config, "Starting muting server");
            run_webhook_server(config, shutdown_signal()).await?;
        }
    }

    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal. The server cannot drain
/// gracefully without them.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal");
}
