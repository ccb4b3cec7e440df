//! Certificate material from the appliance configuration.
//!
//! The exporter serves HTTPS with a certificate managed by OPNsense
//! itself, so both the server chain and the client CA are looked up in
//! `config.xml` by reference id rather than read from PEM files.

mod chain;
pub mod tls;

pub use chain::{CertError, CertResolver, ResolvedCa, ResolvedChain};
pub use tls::TlsError;
