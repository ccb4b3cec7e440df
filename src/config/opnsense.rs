//! OPNsense `config.xml` access.
//!
//! Only the parts the exporter needs are mapped: the `<interfaces>`
//! section, the certificate authorities (`<ca>`) and the certificates
//! (`<cert>`). Everything else in the document is ignored.

use roxmltree::{Document, Node};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while loading the appliance configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path of the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The document is not well-formed XML.
    #[error("failed to parse configuration: {0}")]
    Xml(#[from] roxmltree::Error),
    /// The root element is not `<opnsense>`.
    #[error("expected element type <opnsense> but have <{0}>")]
    UnexpectedRoot(String),
    /// A boolean element holds an unknown literal.
    #[error("invalid boolean {value:?} in <{element}>")]
    InvalidBool {
        /// Element name.
        element: String,
        /// Offending value.
        value: String,
    },
}

/// A network interface declared in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    /// Device identifier (`<if>`), e.g. `em0`.
    pub name: String,
    /// Human label (`<descr>`), or the upper-cased tag name when blank.
    pub description: String,
    /// Whether the interface is enabled.
    pub enabled: bool,
}

/// A certificate authority (`<ca>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateAuthority {
    /// Unique reference id.
    pub ref_id: String,
    /// Human label.
    pub description: String,
    /// Base64-encoded PEM certificate.
    pub cert_data: String,
    /// Reference id of the issuing CA, if any.
    pub parent_ref: Option<String>,
}

/// A certificate with its private key (`<cert>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// Unique reference id.
    pub ref_id: String,
    /// Human label.
    pub description: String,
    /// Base64-encoded PEM certificate.
    pub cert_data: String,
    /// Base64-encoded PEM private key.
    pub key_data: String,
    /// Reference id of the issuing CA, if any.
    pub ca_ref: Option<String>,
}

/// In-memory view of an OPNsense configuration.
///
/// Immutable after load; safe to share between threads.
#[derive(Debug, Clone, Default)]
pub struct OpnsenseConfig {
    interfaces: Vec<Interface>,
    authorities: Vec<CertificateAuthority>,
    certificates: Vec<Certificate>,
}

impl OpnsenseConfig {
    /// Loads and parses the configuration file at `path`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_xml(&content)
    }

    /// Parses a configuration document.
    pub fn from_xml(xml: &str) -> Result<Self, ConfigError> {
        let doc = Document::parse(xml)?;
        let root = doc.root_element();
        if root.tag_name().name() != "opnsense" {
            return Err(ConfigError::UnexpectedRoot(
                root.tag_name().name().to_string(),
            ));
        }

        let mut config = Self::default();
        for node in root.children().filter(|n| n.is_element()) {
            match node.tag_name().name() {
                "interfaces" => {
                    for iface in node.children().filter(|n| n.is_element()) {
                        config.interfaces.push(parse_interface(iface)?);
                    }
                }
                "ca" => config.authorities.push(CertificateAuthority {
                    ref_id: child_text(node, "refid"),
                    description: child_text(node, "descr"),
                    cert_data: child_text(node, "crt"),
                    parent_ref: non_empty(child_text(node, "caref")),
                }),
                "cert" => config.certificates.push(Certificate {
                    ref_id: child_text(node, "refid"),
                    description: child_text(node, "descr"),
                    cert_data: child_text(node, "crt"),
                    key_data: child_text(node, "prv"),
                    ca_ref: non_empty(child_text(node, "caref")),
                }),
                _ => {}
            }
        }

        tracing::debug!(
            interfaces = config.interfaces.len(),
            authorities = config.authorities.len(),
            certificates = config.certificates.len(),
            "Parsed OPNsense configuration"
        );

        Ok(config)
    }

    /// Returns all interfaces in document order.
    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    /// Returns all certificate authorities in document order.
    pub fn authorities(&self) -> &[CertificateAuthority] {
        &self.authorities
    }

    /// Returns all certificates in document order.
    pub fn certificates(&self) -> &[Certificate] {
        &self.certificates
    }

    /// Finds the first CA with the given reference id.
    pub fn find_authority(&self, ref_id: &str) -> Option<&CertificateAuthority> {
        self.authorities.iter().find(|ca| ca.ref_id == ref_id)
    }

    /// Finds the first certificate with the given reference id.
    pub fn find_certificate(&self, ref_id: &str) -> Option<&Certificate> {
        self.certificates.iter().find(|cert| cert.ref_id == ref_id)
    }
}

fn parse_interface(node: Node<'_, '_>) -> Result<Interface, ConfigError> {
    let mut description = child_text(node, "descr");
    if description.is_empty() {
        description = node.tag_name().name().to_uppercase();
    }

    let enable = child_text(node, "enable");
    let enabled = parse_bool(&enable).ok_or_else(|| ConfigError::InvalidBool {
        element: "enable".to_string(),
        value: enable.clone(),
    })?;

    Ok(Interface {
        name: child_text(node, "if"),
        description,
        enabled,
    })
}

/// Concatenated character data of the first child element named `name`.
fn child_text(node: Node<'_, '_>, name: &str) -> String {
    node.children()
        .find(|child| child.is_element() && child.tag_name().name() == name)
        .map(|child| {
            child
                .children()
                .filter(|n| n.is_text())
                .filter_map(|text| text.text())
                .collect()
        })
        .unwrap_or_default()
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Boolean literals as accepted by the appliance; an empty value is false.
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "" => Some(false),
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<opnsense>
  <system><hostname>fw</hostname></system>
  <interfaces>
    <wan>
      <if>em0</if>
      <descr>WAN</descr>
      <enable>1</enable>
    </wan>
    <lan>
      <if>em1</if>
      <enable>1</enable>
    </lan>
    <opt1>
      <if>em2</if>
      <descr>DMZ</descr>
    </opt1>
  </interfaces>
  <ca>
    <refid>ca-root</refid>
    <descr>Root CA</descr>
    <crt>Uk9PVA==</crt>
    <caref/>
  </ca>
  <cert>
    <refid>web</refid>
    <descr>Web GUI</descr>
    <crt>TEVBRg==</crt>
    <prv>S0VZ</prv>
    <caref>ca-root</caref>
  </cert>
</opnsense>
"#;

    #[test]
    fn test_parse_interfaces() {
        let config = OpnsenseConfig::from_xml(SAMPLE).unwrap();
        let interfaces = config.interfaces();

        assert_eq!(interfaces.len(), 3);
        assert_eq!(
            interfaces[0],
            Interface {
                name: "em0".into(),
                description: "WAN".into(),
                enabled: true,
            }
        );
        assert!(!interfaces[2].enabled);
    }

    #[test]
    fn test_description_falls_back_to_tag_name() {
        let config = OpnsenseConfig::from_xml(SAMPLE).unwrap();
        assert_eq!(config.interfaces()[1].description, "LAN");
    }

    #[test]
    fn test_parse_certificates() {
        let config = OpnsenseConfig::from_xml(SAMPLE).unwrap();

        let ca = config.find_authority("ca-root").unwrap();
        assert_eq!(ca.description, "Root CA");
        assert_eq!(ca.parent_ref, None);

        let cert = config.find_certificate("web").unwrap();
        assert_eq!(cert.key_data, "S0VZ");
        assert_eq!(cert.ca_ref.as_deref(), Some("ca-root"));

        assert!(config.find_certificate("missing").is_none());
    }

    #[test]
    fn test_unexpected_root() {
        let result = OpnsenseConfig::from_xml("<pfsense></pfsense>");
        assert!(matches!(result, Err(ConfigError::UnexpectedRoot(ref name)) if name == "pfsense"));
    }

    #[test]
    fn test_invalid_enable_value() {
        let xml = "<opnsense><interfaces><wan><if>em0</if><enable>yes</enable></wan></interfaces></opnsense>";
        assert!(matches!(
            OpnsenseConfig::from_xml(xml),
            Err(ConfigError::InvalidBool { .. })
        ));
    }

    #[test]
    fn test_malformed_xml() {
        assert!(matches!(
            OpnsenseConfig::from_xml("<opnsense><interfaces>"),
            Err(ConfigError::Xml(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.xml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = OpnsenseConfig::from_file(&path).unwrap();
        assert_eq!(config.certificates().len(), 1);

        let missing = OpnsenseConfig::from_file(dir.path().join("absent.xml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_parse_bool_literals() {
        assert_eq!(parse_bool(""), Some(false));
        assert_eq!(parse_bool(" 1 "), Some(true));
        assert_eq!(parse_bool("False"), Some(false));
        assert_eq!(parse_bool("on"), None);
    }
}
