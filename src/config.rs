//! Command line and environment configuration.
//!
//! Every flag can also be set through the environment: `CERT_*` for the
//! `certificates` phase and `SERVER_*` for the `server` phase. The resolved
//! structs are passed by value into each component.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Kubernetes mutating webhook redirecting Ingress hosts to a target domain
#[derive(Parser, Debug)]
#[command(name = "muting", version)]
#[command(about = "Kubernetes mutating webhook redirecting Ingress hosts to a target domain")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate webhook certificates and register the mutating webhook
    Certificates(CertificatesConfig),
    /// Serve the mutating webhook
    Server(ServerConfig),
}

/// Settings for the bootstrap phase.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct CertificatesConfig {
    /// Mutation configuration name
    #[arg(short = 'n', long, env = "CERT_NAME", default_value = "muting")]
    pub name: String,

    /// Webhook namespace
    #[arg(long, env = "CERT_NAMESPACE", default_value = "default")]
    pub namespace: String,

    /// Webhook service
    #[arg(short = 's', long, env = "CERT_SERVICE", default_value = "muting")]
    pub service: String,

    /// Output directory
    #[arg(short = 'o', long, env = "CERT_OUTPUT", default_value = "/tmp/tls")]
    pub output: PathBuf,
}

impl CertificatesConfig {
    /// Subject common name of the serving certificate: `<service>.<namespace>.svc`
    pub fn common_name(&self) -> String {
        format!("{}.{}.svc", self.service, self.namespace)
    }

    /// DNS names the API server may use to reach the service
    pub fn dns_names(&self) -> Vec<String> {
        vec![
            self.service.clone(),
            format!("{}.{}", self.service, self.namespace),
            self.common_name(),
        ]
    }
}

impl fmt::Display for CertificatesConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "name={} namespace={} service={} output={}",
            self.name,
            self.namespace,
            self.service,
            self.output.display()
        )
    }
}

/// Settings for the serving phase.
///
/// Sources and target may be left empty here; the mutation endpoint then
/// answers every request with a client error.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Bind address
    #[arg(short = 'b', long, env = "SERVER_BIND", default_value = "0.0.0.0:6883")]
    pub bind: SocketAddr,

    /// Comma separated source domains
    #[arg(short = 's', long, env = "SERVER_SOURCES", default_value = "")]
    pub sources: String,

    /// Target domain
    #[arg(short = 't', long, env = "SERVER_TARGET", default_value = "")]
    pub target: String,

    /// Certificate file
    #[arg(short = 'c', long, env = "SERVER_CERTIFICATE", default_value = "/tmp/tls/tls.crt")]
    pub certificate: PathBuf,

    /// Key file
    #[arg(short = 'k', long, env = "SERVER_KEY", default_value = "/tmp/tls/tls.key")]
    pub key: PathBuf,
}

impl fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bind={} sources={} target={} certificate={} key={}",
            self.bind,
            self.sources,
            self.target,
            self.certificate.display(),
            self.key.display()
        )
    }
}
