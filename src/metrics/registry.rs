//! Metrics collection and registry.

use super::PROM_NAMESPACE;
use crate::config::Interface;
use crate::pfstats::InterfaceFilter;
use prometheus::core::Collector;
use prometheus::{Encoder, IntGaugeVec, Opts, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Registration or encoding failed.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
    /// A stats line pattern failed to compile.
    #[error("invalid stats pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Prometheus metrics registry for the exporter.
///
/// Holds the interface enable gauges, set once from the configuration,
/// and any registered collectors, which produce values on each scrape.
pub struct MetricsRegistry {
    registry: Registry,

    // Interface metrics
    interface_enable: IntGaugeVec,
}

impl MetricsRegistry {
    /// Creates a new registry with the interface gauges registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let interface_enable = IntGaugeVec::new(
            Opts::new("enable", "Whether an interface is enabled or not")
                .namespace(PROM_NAMESPACE)
                .subsystem("interface"),
            &["interface", "desc"],
        )?;
        registry.register(Box::new(interface_enable.clone()))?;

        Ok(Self {
            registry,
            interface_enable,
        })
    }

    /// Sets the enable gauge of every interface and returns the
    /// allow-list of enabled ones for the stats collector.
    pub fn register_interfaces(&self, interfaces: &[Interface]) -> InterfaceFilter {
        for iface in interfaces {
            let gauge = self
                .interface_enable
                .with_label_values(&[iface.name.as_str(), iface.description.as_str()]);
            if iface.enabled {
                gauge.set(1);
                tracing::info!(interface = %iface.name, desc = %iface.description, "Interface");
            } else {
                gauge.set(0);
                tracing::info!(interface = %iface.name, desc = %iface.description, "Interface (disabled)");
            }
        }

        InterfaceFilter::from_interfaces(interfaces)
    }

    /// Registers a collector that is asked for values on every scrape.
    pub fn register_collector(&self, collector: Box<dyn Collector>) -> Result<(), MetricsError> {
        self.registry.register(collector)?;
        Ok(())
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    ///
    /// Runs every registered collector, so this may block on the stats
    /// command.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pfstats::{PfStatsCollector, StatsCommand};
    use std::io::Write;
    use std::path::PathBuf;

    fn interfaces() -> Vec<Interface> {
        vec![
            Interface {
                name: "em0".into(),
                description: "WAN".into(),
                enabled: true,
            },
            Interface {
                name: "em2".into(),
                description: "DMZ".into(),
                enabled: false,
            },
        ]
    }

    #[test]
    fn test_registry_creation() {
        let registry = MetricsRegistry::new();
        assert!(registry.is_ok());
    }

    #[test]
    fn test_interface_enable_gauges() {
        let registry = MetricsRegistry::new().unwrap();
        let filter = registry.register_interfaces(&interfaces());

        let output = registry.encode().unwrap();
        assert!(output.contains(r#"opnsense_interface_enable{desc="WAN",interface="em0"} 1"#));
        assert!(output.contains(r#"opnsense_interface_enable{desc="DMZ",interface="em2"} 0"#));

        assert_eq!(filter.description("em0"), Some("WAN"));
        assert_eq!(filter.description("em2"), None);
    }

    #[test]
    fn test_pf_stats_exposition() {
        let mut fixture = tempfile::NamedTempFile::new().unwrap();
        fixture
            .write_all(
                b"em0\n  In4/Pass: [ Packets: 42 Bytes: 1000 ]\n\
                  em2\n  In4/Pass: [ Packets: 5 Bytes: 6 ]\n",
            )
            .unwrap();

        let registry = MetricsRegistry::new().unwrap();
        let filter = registry.register_interfaces(&interfaces());
        let collector = PfStatsCollector::new(
            filter,
            StatsCommand {
                program: PathBuf::from("cat"),
                args: vec![fixture.path().display().to_string()],
            },
        )
        .unwrap();
        registry.register_collector(Box::new(collector)).unwrap();

        let output = registry.encode().unwrap();
        assert!(output.contains(
            r#"opnsense_pfstats_packets{action="Pass",af="IPv4",desc="WAN",dir="In",interface="em0"} 42"#
        ));
        assert!(output.contains(
            r#"opnsense_pfstats_bytes{action="Pass",af="IPv4",desc="WAN",dir="In",interface="em0"} 1000"#
        ));
        assert!(!output.contains(r#"interface="em2"} 5"#));
    }

    #[test]
    fn test_failed_command_keeps_gauges() {
        let registry = MetricsRegistry::new().unwrap();
        let filter = registry.register_interfaces(&interfaces());
        let collector = PfStatsCollector::new(
            filter,
            StatsCommand {
                program: PathBuf::from("/nonexistent/pfctl"),
                args: Vec::new(),
            },
        )
        .unwrap();
        registry.register_collector(Box::new(collector)).unwrap();

        let output = registry.encode().unwrap();
        assert!(output.contains("opnsense_interface_enable"));
        assert!(!output.contains("opnsense_pfstats_packets{"));
    }
}
