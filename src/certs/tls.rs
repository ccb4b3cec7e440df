//! TLS server configuration from resolved certificate material.

use super::{ResolvedCa, ResolvedChain};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while building the TLS configuration.
#[derive(Debug, Error)]
pub enum TlsError {
    /// PEM data could not be read.
    #[error("failed to read PEM data: {0}")]
    Pem(#[from] std::io::Error),
    /// PEM data held no certificate.
    #[error("no certificates found in {0}")]
    NoCertificates(&'static str),
    /// PEM data held no private key.
    #[error("no private key found")]
    NoPrivateKey,
    /// rustls rejected the configuration.
    #[error("TLS error: {0}")]
    Rustls(#[from] rustls::Error),
    /// The client CA could not be turned into a verifier.
    #[error("failed to create client verifier: {0}")]
    Verifier(#[from] rustls::server::VerifierBuilderError),
}

/// Builds the server configuration for the given chain.
///
/// With a client CA, every client must present a certificate issued by
/// it; without one, client certificates are not requested.
pub fn server_config(
    chain: &ResolvedChain,
    client_ca: Option<&ResolvedCa>,
) -> Result<ServerConfig, TlsError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let certs = parse_certificates(&chain.certificate_pem, "server certificate")?;
    let key: PrivateKeyDer<'static> =
        rustls_pemfile::private_key(&mut chain.key_pem.as_slice())?.ok_or(TlsError::NoPrivateKey)?;

    let builder = ServerConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()?;

    let mut config = match client_ca {
        Some(ca) => {
            let roots = root_store(ca)?;
            let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider)
                .build()?;
            builder
                .with_client_cert_verifier(verifier)
                .with_single_cert(certs, key)?
        }
        None => builder.with_no_client_auth().with_single_cert(certs, key)?,
    };

    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(config)
}

/// SHA-256 fingerprint of the first certificate in `pem`, as colon-separated hex.
pub fn fingerprint(pem: &[u8]) -> Result<String, TlsError> {
    let certs = parse_certificates(pem, "fingerprint input")?;
    let der: &[u8] = &certs[0];
    let digest = Sha256::digest(der);
    Ok(digest
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":"))
}

fn root_store(ca: &ResolvedCa) -> Result<RootCertStore, TlsError> {
    let mut roots = RootCertStore::empty();
    for cert in parse_certificates(&ca.certificate_pem, "client CA")? {
        roots.add(cert)?;
    }
    Ok(roots)
}

fn parse_certificates(
    pem: &[u8],
    what: &'static str,
) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let certs = rustls_pemfile::certs(&mut &pem[..]).collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(what));
    }
    Ok(certs)
}
