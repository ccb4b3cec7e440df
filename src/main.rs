//! OPNsense Exporter
//!
//! Serves pf interface statistics of an OPNsense appliance in
//! Prometheus format, optionally over HTTPS with a certificate managed
//! by OPNsense itself.

use clap::Parser;
use opnsense_exporter::{
    certs::{tls, CertResolver},
    config::{OpnsenseConfig, Settings, SettingsError, TlsSettings},
    metrics::{MetricsRegistry, MetricsServer, MetricsServerConfig},
    pfstats::PfStatsCollector,
};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Grace period for in-flight scrapes on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Prometheus exporter for OPNsense packet filter statistics.
#[derive(Debug, Parser)]
#[command(name = "opnsense-exporter", version, about)]
struct Cli {
    /// Exporter settings file (TOML); flags override its values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Path to OPNsense's config.xml
    #[arg(long = "opnsense.config", value_name = "PATH")]
    opnsense_config: Option<PathBuf>,

    /// Address and port on which to bind
    #[arg(long = "http.bind", value_name = "ADDR")]
    http_bind: Option<String>,

    /// HTTP path on which to serve
    #[arg(long = "http.path", value_name = "PATH")]
    http_path: Option<String>,

    /// TLS server certificate (/opnsense/cert/refid in the OPNsense config)
    #[arg(long = "tls.server-cert", value_name = "REFID")]
    tls_server_cert: Option<String>,

    /// Trusted CA of client certificates (/opnsense/ca/refid in the OPNsense config)
    #[arg(long = "tls.client-ca", value_name = "REFID")]
    tls_client_ca: Option<String>,
}

impl Cli {
    /// Loads the settings file, if any, and applies the flags on top.
    fn into_settings(self) -> Result<Settings, SettingsError> {
        let mut settings = match &self.config {
            Some(path) => Settings::from_file(path)?,
            None => Settings::default(),
        };

        if let Some(path) = self.opnsense_config {
            settings.opnsense_config = path;
        }
        if let Some(bind) = self.http_bind {
            settings.http.bind = bind;
        }
        if let Some(path) = self.http_path {
            settings.http.path = path;
        }
        // An empty reference disables the setting, as in the file.
        if let Some(cert) = self.tls_server_cert {
            settings.tls.server_cert = Some(cert).filter(|c| !c.is_empty());
        }
        if let Some(ca) = self.tls_client_ca {
            settings.tls.client_ca = Some(ca).filter(|c| !c.is_empty());
        }

        settings.validate()?;
        Ok(settings)
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("OPNsense Exporter v{}", opnsense_exporter::VERSION);

    let settings = match cli.into_settings() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Invalid settings: {}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = run(settings).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(settings: Settings) -> Result<(), Box<dyn Error>> {
    let config_path = &settings.opnsense_config;
    let config = OpnsenseConfig::from_file(config_path)
        .map_err(|e| format!("Failed to parse {}: {}", config_path.display(), e))?;

    let registry = MetricsRegistry::new()?;
    let filter = registry.register_interfaces(config.interfaces());
    let collector = PfStatsCollector::new(filter, settings.pfctl.clone().into())?;
    registry.register_collector(Box::new(collector))?;

    let server_config = MetricsServerConfig {
        bind_addr: settings.http.bind_addr()?,
        path: settings.http.path.clone(),
        tls: tls_config(&settings.tls, &config)?,
    };

    let server = MetricsServer::new(server_config, registry);
    let handle = server.handle();
    ctrlc::set_handler(move || {
        info!("Shutting down");
        handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
    })?;

    server.run().await?;
    Ok(())
}

/// Resolves the server certificate and client CA named in the settings.
fn tls_config(
    settings: &TlsSettings,
    config: &OpnsenseConfig,
) -> Result<Option<Arc<rustls::ServerConfig>>, Box<dyn Error>> {
    let Some(cert_ref) = settings.server_cert.as_deref() else {
        return Ok(None);
    };
    let resolver = CertResolver::new(config);

    let chain = resolver
        .certificate_chain(cert_ref)
        .map_err(|e| format!("Failed to load server certificate '{}': {}", cert_ref, e))?;

    let client_ca = match settings.client_ca.as_deref() {
        Some(ca_ref) => {
            let ca = resolver
                .authority(ca_ref)
                .map_err(|e| format!("Failed to load client CA '{}': {}", ca_ref, e))?;
            info!(desc = %ca.description, refid = ca_ref, "Verifying client certificates");
            Some(ca)
        }
        None => None,
    };

    let server_config = tls::server_config(&chain, client_ca.as_ref())
        .map_err(|e| format!("Failed to load server certificate '{}': {}", cert_ref, e))?;

    let fingerprint = tls::fingerprint(&chain.certificate_pem)?;
    info!(
        desc = %chain.description,
        refid = cert_ref,
        sha256 = %fingerprint,
        "Using server certificate"
    );

    Ok(Some(Arc::new(server_config)))
}
