//! Configuration sources.
//!
//! Two inputs configure the exporter: the appliance's own `config.xml`,
//! parsed once at startup and read-only afterwards, and the exporter's
//! settings (TOML file plus command-line overrides).

mod opnsense;
mod settings;

pub use opnsense::{Certificate, CertificateAuthority, ConfigError, Interface, OpnsenseConfig};
pub use settings::{HttpSettings, PfctlSettings, Settings, SettingsError, TlsSettings};
