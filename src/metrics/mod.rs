//! Prometheus metrics exporter for pf statistics.
//!
//! This module owns the metrics registry and the HTTP endpoint that
//! serves it.
//!
//! # Metrics Exposed
//!
//! - `opnsense_interface_enable` - Whether an interface is enabled (1) or not (0)
//! - `opnsense_pfstats_packets` - Packets processed by pf
//! - `opnsense_pfstats_bytes` - Bytes processed by pf
//!
//! The pf counters carry the labels `interface`, `desc`, `dir`
//! (`In`/`Out`), `af` (`IPv4`/`IPv6`) and `action` (`Pass`/`Block`).
//!
//! # Example
//!
//! ```no_run
//! use opnsense_exporter::metrics::MetricsRegistry;
//! use opnsense_exporter::config::Interface;
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//!
//! let filter = registry.register_interfaces(&[Interface {
//!     name: "em0".into(),
//!     description: "WAN".into(),
//!     enabled: true,
//! }]);
//! assert_eq!(filter.description("em0"), Some("WAN"));
//! ```

mod registry;
mod server;

pub use registry::{MetricsError, MetricsRegistry};
pub use server::{MetricsServer, MetricsServerConfig, ServerError};

/// Namespace of all exported metrics.
pub const PROM_NAMESPACE: &str = "opnsense";

/// Largest integer an `f64` holds exactly, used as a mask.
const F64_INT_MASK: u64 = (1 << 53) - 1;

/// Converts a raw counter to a sample value, keeping only its low 53 bits.
///
/// Counters above 2^53 wrap around instead of losing precision.
#[inline]
pub fn wrap_u64(value: u64) -> f64 {
    (value & F64_INT_MASK) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_wrap_small_values_unchanged() {
        assert_eq!(wrap_u64(0), 0.0);
        assert_eq!(wrap_u64(42), 42.0);
        assert_eq!(wrap_u64(F64_INT_MASK), 9_007_199_254_740_991.0);
    }

    #[test]
    fn test_wrap_at_boundary() {
        assert_eq!(wrap_u64(1 << 53), 0.0);
        assert_eq!(wrap_u64((1 << 53) + 7), 7.0);
        assert_eq!(wrap_u64(u64::MAX), F64_INT_MASK as f64);
    }

    proptest! {
        #[test]
        fn prop_wrap_is_mod_2_53(v in any::<u64>()) {
            let wrapped = wrap_u64(v);
            prop_assert!(wrapped >= 0.0);
            prop_assert_eq!(wrapped as u64, v % (1u64 << 53));
            prop_assert_eq!(wrapped.fract(), 0.0);
        }
    }
}
