//! Exporter settings.
//!
//! Settings come from an optional TOML file; command-line flags are
//! applied on top by the binary. Every field has a default so that an
//! empty file (or no file at all) yields a working exporter.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Settings validation and loading errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SettingsError {
    /// No appliance configuration path.
    #[error("OPNsense config file not specified")]
    MissingConfigPath,
    /// Bind address is neither `host:port` nor `:port`.
    #[error("invalid bind address {0:?}")]
    InvalidBind(String),
    /// Metrics path does not start with `/`.
    #[error("http path must start with '/': {0:?}")]
    InvalidPath(String),
    /// Client CA given without a server certificate.
    #[error("server certificate not specified for client authentication")]
    ClientCaWithoutServerCert,
    /// Empty stats command.
    #[error("pf command not specified")]
    MissingCommand,
    /// Settings file could not be read.
    #[error("failed to read settings file: {0}")]
    FileReadError(String),
    /// Settings file is not valid TOML.
    #[error("failed to parse settings file: {0}")]
    ParseError(String),
}

/// Full settings file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Path to OPNsense's `config.xml`.
    pub opnsense_config: PathBuf,
    /// HTTP listener settings.
    pub http: HttpSettings,
    /// TLS settings.
    pub tls: TlsSettings,
    /// Packet filter status command.
    pub pfctl: PfctlSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            opnsense_config: PathBuf::from("/conf/config.xml"),
            http: HttpSettings::default(),
            tls: TlsSettings::default(),
            pfctl: PfctlSettings::default(),
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Address and port on which to bind; `:port` binds all interfaces.
    pub bind: String,
    /// HTTP path on which to serve metrics.
    pub path: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            bind: ":8080".to_string(),
            path: "/metrics".to_string(),
        }
    }
}

impl HttpSettings {
    /// Resolves the bind string into a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, SettingsError> {
        parse_bind(&self.bind)
    }
}

/// TLS settings, both referring to entries in `config.xml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsSettings {
    /// Server certificate (`/opnsense/cert/refid`).
    pub server_cert: Option<String>,
    /// Trusted CA of client certificates (`/opnsense/ca/refid`).
    pub client_ca: Option<String>,
}

/// External packet filter status command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PfctlSettings {
    /// Program to run.
    pub command: PathBuf,
    /// Arguments passed to the program.
    pub args: Vec<String>,
}

impl Default for PfctlSettings {
    fn default() -> Self {
        Self {
            command: PathBuf::from("pfctl"),
            args: vec!["-vvsInterface".to_string()],
        }
    }
}

impl Settings {
    /// Loads settings from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| SettingsError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        toml::from_str(content).map_err(|e| SettingsError::ParseError(e.to_string()))
    }

    /// Validates the settings combination.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.opnsense_config.as_os_str().is_empty() {
            return Err(SettingsError::MissingConfigPath);
        }
        self.http.bind_addr()?;
        if !self.http.path.starts_with('/') {
            return Err(SettingsError::InvalidPath(self.http.path.clone()));
        }
        if self.tls.client_ca.is_some() && self.tls.server_cert.is_none() {
            return Err(SettingsError::ClientCaWithoutServerCert);
        }
        if self.pfctl.command.as_os_str().is_empty() {
            return Err(SettingsError::MissingCommand);
        }
        Ok(())
    }
}

fn parse_bind(bind: &str) -> Result<SocketAddr, SettingsError> {
    let candidate = match bind.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => bind.to_string(),
    };
    candidate
        .parse()
        .map_err(|_| SettingsError::InvalidBind(bind.to_string()))
}
