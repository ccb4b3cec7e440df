//! Certificate chain resolution.
//!
//! Certificates in `config.xml` reference their issuer by `caref`, and
//! each CA may reference its own parent the same way. Resolution walks
//! those references root-ward and concatenates the decoded PEM blocks.

use crate::config::OpnsenseConfig;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::collections::HashSet;
use thiserror::Error;

/// Errors that can occur while resolving certificate material.
#[derive(Debug, Error)]
pub enum CertError {
    /// No certificate has the requested reference id.
    #[error("certificate '{0}' not found")]
    CertificateNotFound(String),
    /// A referenced CA does not exist.
    #[error("CA '{0}' not found")]
    AuthorityNotFound(String),
    /// Certificate or key data is not valid base64.
    #[error("failed to decode {what}: {source}")]
    Decode {
        /// Which item failed to decode.
        what: String,
        /// Underlying decode error.
        #[source]
        source: base64::DecodeError,
    },
    /// The issuer chain loops back on itself.
    #[error("CA '{0}' appears twice in the issuer chain")]
    CycleDetected(String),
}

/// A server certificate chain and its private key, PEM encoded.
#[derive(Clone)]
pub struct ResolvedChain {
    /// Leaf certificate followed by each issuing CA, root-ward.
    pub certificate_pem: Vec<u8>,
    /// Private key of the leaf certificate.
    pub key_pem: Vec<u8>,
    /// Description of the leaf certificate.
    pub description: String,
}

impl std::fmt::Debug for ResolvedChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedChain")
            .field("certificate_pem_len", &self.certificate_pem.len())
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// A single CA certificate, PEM encoded.
#[derive(Debug, Clone)]
pub struct ResolvedCa {
    /// CA certificate.
    pub certificate_pem: Vec<u8>,
    /// Description of the CA.
    pub description: String,
}

/// Resolves certificate material from a loaded configuration.
///
/// Pure reads; the resolver holds no state besides the borrowed config.
#[derive(Debug, Clone, Copy)]
pub struct CertResolver<'a> {
    config: &'a OpnsenseConfig,
}

impl<'a> CertResolver<'a> {
    /// Creates a resolver over `config`.
    pub fn new(config: &'a OpnsenseConfig) -> Self {
        Self { config }
    }

    /// Builds the full chain and key for the certificate `ref_id`.
    ///
    /// Fails with [`CertError::CycleDetected`] if a CA is reached twice
    /// while following parent references.
    pub fn certificate_chain(&self, ref_id: &str) -> Result<ResolvedChain, CertError> {
        let cert = self
            .config
            .find_certificate(ref_id)
            .ok_or_else(|| CertError::CertificateNotFound(ref_id.to_string()))?;

        let mut chain = decode(&cert.cert_data, || "the certificate".to_string())?;

        let mut visited = HashSet::new();
        let mut current = cert.ca_ref.as_deref();
        while let Some(ca_ref) = current.filter(|r| !r.is_empty()) {
            if !visited.insert(ca_ref) {
                return Err(CertError::CycleDetected(ca_ref.to_string()));
            }
            let ca = self
                .config
                .find_authority(ca_ref)
                .ok_or_else(|| CertError::AuthorityNotFound(ca_ref.to_string()))?;
            let ca_pem = decode(&ca.cert_data, || format!("CA '{ca_ref}'"))?;
            chain.extend_from_slice(&ca_pem);
            current = ca.parent_ref.as_deref();
        }

        tracing::debug!(
            refid = ref_id,
            authorities = visited.len(),
            "Resolved certificate chain"
        );

        let key_pem = decode(&cert.key_data, || "the private key".to_string())?;

        Ok(ResolvedChain {
            certificate_pem: chain,
            key_pem,
            description: cert.description.clone(),
        })
    }

    /// Decodes the single CA `ref_id`, without walking its parents.
    pub fn authority(&self, ref_id: &str) -> Result<ResolvedCa, CertError> {
        let ca = self
            .config
            .find_authority(ref_id)
            .ok_or_else(|| CertError::AuthorityNotFound(ref_id.to_string()))?;

        Ok(ResolvedCa {
            certificate_pem: decode(&ca.cert_data, || format!("CA '{ref_id}'"))?,
            description: ca.description.clone(),
        })
    }
}

/// Standard padded base64; line breaks inside the value are ignored.
fn decode(data: &str, what: impl FnOnce() -> String) -> Result<Vec<u8>, CertError> {
    let compact: String = data.chars().filter(|c| !matches!(c, '\r' | '\n')).collect();
    STANDARD.decode(compact).map_err(|source| CertError::Decode {
        what: what(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b64(text: &str) -> String {
        STANDARD.encode(text)
    }

    fn config_with(cas: &[(&str, &str, &str)], certs: &[(&str, &str, &str)]) -> OpnsenseConfig {
        let mut xml = String::from("<opnsense>");
        for (refid, crt, caref) in cas {
            xml.push_str(&format!(
                "<ca><refid>{refid}</refid><descr>CA {refid}</descr><crt>{crt}</crt><caref>{caref}</caref></ca>"
            ));
        }
        for (refid, crt, caref) in certs {
            xml.push_str(&format!(
                "<cert><refid>{refid}</refid><descr>Cert {refid}</descr><crt>{crt}</crt><prv>{}</prv><caref>{caref}</caref></cert>",
                b64("KEY\n")
            ));
        }
        xml.push_str("</opnsense>");
        OpnsenseConfig::from_xml(&xml).unwrap()
    }

    #[test]
    fn test_chain_with_single_ca() {
        let config = config_with(
            &[("root", b64("ROOT\n").as_str(), "")],
            &[("web", b64("LEAF\n").as_str(), "root")],
        );
        let chain = CertResolver::new(&config).certificate_chain("web").unwrap();

        assert_eq!(chain.certificate_pem, b"LEAF\nROOT\n");
        assert_eq!(chain.key_pem, b"KEY\n");
        assert_eq!(chain.description, "Cert web");
    }

    #[test]
    fn test_chain_is_ordered_root_ward() {
        let config = config_with(
            &[
                ("root", b64("ROOT\n").as_str(), ""),
                ("inter", b64("INTER\n").as_str(), "root"),
            ],
            &[("web", b64("LEAF\n").as_str(), "inter")],
        );
        let chain = CertResolver::new(&config).certificate_chain("web").unwrap();
        assert_eq!(chain.certificate_pem, b"LEAF\nINTER\nROOT\n");
    }

    #[test]
    fn test_self_signed_certificate() {
        let config = config_with(&[], &[("web", b64("LEAF\n").as_str(), "")]);
        let chain = CertResolver::new(&config).certificate_chain("web").unwrap();
        assert_eq!(chain.certificate_pem, b"LEAF\n");
    }

    #[test]
    fn test_certificate_not_found() {
        let config = config_with(&[], &[("web", b64("LEAF\n").as_str(), "")]);
        let result = CertResolver::new(&config).certificate_chain("other");
        assert!(matches!(result, Err(CertError::CertificateNotFound(ref r)) if r == "other"));
    }

    #[test]
    fn test_missing_authority() {
        let config = config_with(&[], &[("web", b64("LEAF\n").as_str(), "gone")]);
        let result = CertResolver::new(&config).certificate_chain("web");
        assert!(matches!(result, Err(CertError::AuthorityNotFound(ref r)) if r == "gone"));
    }

    #[test]
    fn test_malformed_base64() {
        let config = config_with(
            &[("root", "not*base64", "")],
            &[("web", b64("LEAF\n").as_str(), "root")],
        );
        let resolver = CertResolver::new(&config);
        assert!(matches!(
            resolver.certificate_chain("web"),
            Err(CertError::Decode { .. })
        ));
        assert!(matches!(
            resolver.authority("root"),
            Err(CertError::Decode { .. })
        ));
    }

    #[test]
    fn test_cycle_detected() {
        let config = config_with(
            &[
                ("a", b64("A\n").as_str(), "b"),
                ("b", b64("B\n").as_str(), "a"),
            ],
            &[("web", b64("LEAF\n").as_str(), "a")],
        );
        let result = CertResolver::new(&config).certificate_chain("web");
        assert!(matches!(result, Err(CertError::CycleDetected(ref r)) if r == "a"));
    }

    #[test]
    fn test_self_referencing_ca() {
        let config = config_with(
            &[("loop", b64("LOOP\n").as_str(), "loop")],
            &[("web", b64("LEAF\n").as_str(), "loop")],
        );
        assert!(matches!(
            CertResolver::new(&config).certificate_chain("web"),
            Err(CertError::CycleDetected(_))
        ));
    }

    #[test]
    fn test_authority_does_not_walk_parents() {
        let config = config_with(
            &[
                ("root", b64("ROOT\n").as_str(), ""),
                ("inter", b64("INTER\n").as_str(), "root"),
            ],
            &[],
        );
        let ca = CertResolver::new(&config).authority("inter").unwrap();
        assert_eq!(ca.certificate_pem, b"INTER\n");
        assert_eq!(ca.description, "CA inter");

        assert!(matches!(
            CertResolver::new(&config).authority("nope"),
            Err(CertError::AuthorityNotFound(_))
        ));
    }

    #[test]
    fn test_decode_ignores_line_breaks() {
        let encoded = b64("a somewhat longer certificate body\n");
        let (head, tail) = encoded.split_at(10);
        let wrapped = format!("{head}\r\n{tail}");
        assert_eq!(
            decode(&wrapped, String::new).unwrap(),
            b"a somewhat longer certificate body\n"
        );
    }
}
