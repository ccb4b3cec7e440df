//! OPNsense Exporter Library
//!
//! Exposes packet filter statistics of an OPNsense appliance as
//! Prometheus metrics. Interface names, descriptions and TLS material
//! come from the appliance's `config.xml`; per-interface counters come
//! from `pfctl -vvsInterface`, run once per scrape.
//!
//! # Architecture
//!
//! ```text
//! config.xml → config ─┬─→ certs (TLS chain) ──────→ metrics::server
//!                      └─→ interface allow-list ─┐         ↑
//! pfctl output ───────────→ pfstats::parser ─────┴→ pfstats::collector
//! ```
//!
//! # Example
//!
//! ```no_run
//! use opnsense_exporter::{
//!     config::OpnsenseConfig,
//!     metrics::MetricsRegistry,
//!     pfstats::{PfStatsCollector, StatsCommand},
//! };
//!
//! let config = OpnsenseConfig::from_file("/conf/config.xml").unwrap();
//! let registry = MetricsRegistry::new().unwrap();
//!
//! let filter = registry.register_interfaces(config.interfaces());
//! let collector = PfStatsCollector::new(filter, StatsCommand::default()).unwrap();
//! registry.register_collector(Box::new(collector)).unwrap();
//!
//! println!("{}", registry.encode().unwrap());
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod certs;
pub mod config;
pub mod metrics;
pub mod pfstats;

// Re-export commonly used types at crate root
pub use certs::{CertError, CertResolver, ResolvedCa, ResolvedChain};
pub use config::{ConfigError, Interface, OpnsenseConfig, Settings};
pub use metrics::{wrap_u64, MetricsRegistry, PROM_NAMESPACE};
pub use pfstats::{InterfaceFilter, PfStatsCollector, StatField, StatsCommand, StatsParser};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
