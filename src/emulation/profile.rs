//! Declarative browser profile data.
//!
//! A [`Profile`] is plain data: the literal ClientHello template plus the
//! HTTP/2 connection preamble a browser sends. Profiles are usually loaded
//! from JSON (see `profiles/*.json`).

use crate::base::neterror::NetError;
use crate::http::h2settings::{H2Settings, PseudoHeader};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Placeholder code point used where GREASE values are drawn per connection.
pub const GREASE_PLACEHOLDER: u16 = 0x0a0a;

/// Check whether a 16-bit value is one of the sixteen GREASE values
/// (`0x0A0A`, `0x1A1A`, ... `0xFAFA`).
pub fn is_grease(value: u16) -> bool {
    let hi = (value >> 8) as u8;
    let lo = value as u8;
    hi == lo && (lo & 0x0f) == 0x0a
}

/// A 16-bit code point that may be a GREASE slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "CodePointRepr", into = "CodePointRepr")]
pub enum CodePoint {
    Grease,
    Value(u16),
}

impl CodePoint {
    pub fn value(&self) -> Option<u16> {
        match self {
            CodePoint::Grease => None,
            CodePoint::Value(v) => Some(*v),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum CodePointRepr {
    Value(u16),
    Marker(Marker),
}

#[derive(Serialize, Deserialize)]
enum Marker {
    #[serde(rename = "GREASE")]
    Grease,
}

impl From<CodePointRepr> for CodePoint {
    fn from(repr: CodePointRepr) -> Self {
        match repr {
            CodePointRepr::Value(v) if is_grease(v) => CodePoint::Grease,
            CodePointRepr::Value(v) => CodePoint::Value(v),
            CodePointRepr::Marker(Marker::Grease) => CodePoint::Grease,
        }
    }
}

impl From<CodePoint> for CodePointRepr {
    fn from(cp: CodePoint) -> Self {
        match cp {
            CodePoint::Grease => CodePointRepr::Marker(Marker::Grease),
            CodePoint::Value(v) => CodePointRepr::Value(v),
        }
    }
}

fn default_padding_target() -> usize {
    512
}

/// One ClientHello extension with its payload shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtensionSpec {
    Grease,
    ServerName,
    ExtendedMasterSecret,
    RenegotiationInfo,
    SupportedGroups {
        groups: Vec<CodePoint>,
    },
    EcPointFormats {
        formats: Vec<u8>,
    },
    SessionTicket,
    Alpn {
        protocols: Vec<String>,
    },
    StatusRequest,
    SignatureAlgorithms {
        algorithms: Vec<u16>,
    },
    SignedCertificateTimestamp,
    KeyShare {
        groups: Vec<CodePoint>,
    },
    PskKeyExchangeModes {
        modes: Vec<u8>,
    },
    SupportedVersions {
        versions: Vec<CodePoint>,
    },
    CompressCertificate {
        algorithms: Vec<u16>,
    },
    ApplicationSettings {
        protocols: Vec<String>,
    },
    RecordSizeLimit {
        limit: u16,
    },
    DelegatedCredentials {
        algorithms: Vec<u16>,
    },
    Padding {
        #[serde(default = "default_padding_target")]
        target: usize,
    },
    Raw {
        id: u16,
        #[serde(default)]
        data: Vec<u8>,
    },
}

impl ExtensionSpec {
    /// Extension type on the wire. `None` for GREASE, whose type is drawn per connection.
    pub fn id(&self) -> Option<u16> {
        let id = match self {
            ExtensionSpec::Grease => return None,
            ExtensionSpec::ServerName => 0,
            ExtensionSpec::StatusRequest => 5,
            ExtensionSpec::SupportedGroups { .. } => 10,
            ExtensionSpec::EcPointFormats { .. } => 11,
            ExtensionSpec::SignatureAlgorithms { .. } => 13,
            ExtensionSpec::Alpn { .. } => 16,
            ExtensionSpec::SignedCertificateTimestamp => 18,
            ExtensionSpec::Padding { .. } => 21,
            ExtensionSpec::ExtendedMasterSecret => 23,
            ExtensionSpec::CompressCertificate { .. } => 27,
            ExtensionSpec::RecordSizeLimit { .. } => 28,
            ExtensionSpec::DelegatedCredentials { .. } => 34,
            ExtensionSpec::SessionTicket => 35,
            ExtensionSpec::SupportedVersions { .. } => 43,
            ExtensionSpec::PskKeyExchangeModes { .. } => 45,
            ExtensionSpec::KeyShare { .. } => 51,
            ExtensionSpec::ApplicationSettings { .. } => 17513,
            ExtensionSpec::RenegotiationInfo => 65281,
            ExtensionSpec::Raw { id, .. } => *id,
        };
        Some(id)
    }
}

fn default_record_version() -> u16 {
    0x0301
}

fn default_legacy_version() -> u16 {
    0x0303
}

fn default_min_version() -> u16 {
    0x0303
}

fn default_max_version() -> u16 {
    0x0304
}

fn default_compression() -> Vec<u8> {
    vec![0]
}

fn default_session_id_len() -> usize {
    32
}

/// The ClientHello template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsProfile {
    #[serde(default = "default_record_version")]
    pub record_version: u16,
    #[serde(default = "default_legacy_version")]
    pub legacy_version: u16,
    #[serde(default = "default_min_version")]
    pub min_version: u16,
    #[serde(default = "default_max_version")]
    pub max_version: u16,
    pub cipher_suites: Vec<CodePoint>,
    #[serde(default = "default_compression")]
    pub compression_methods: Vec<u8>,
    #[serde(default = "default_session_id_len")]
    pub session_id_len: usize,
    pub extensions: Vec<ExtensionSpec>,
}

fn default_encoder_table_size() -> u32 {
    4096
}

fn default_never_index() -> Vec<String> {
    vec![
        "authorization".to_string(),
        "cookie".to_string(),
        "proxy-authorization".to_string(),
    ]
}

/// HTTP/2 connection preamble and header emission policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Http2Profile {
    pub settings: H2Settings,
    /// Connection-level WINDOW_UPDATE increment sent after SETTINGS. 0 sends none.
    #[serde(default)]
    pub window_update: u32,
    #[serde(default = "PseudoHeader::default_order")]
    pub pseudo_order: Vec<PseudoHeader>,
    /// Upper bound for the HPACK encoder dynamic table.
    #[serde(default = "default_encoder_table_size")]
    pub encoder_table_size: u32,
    /// Header names always sent as never-indexed literals.
    #[serde(default = "default_never_index")]
    pub never_index: Vec<String>,
}

impl Default for Http2Profile {
    fn default() -> Self {
        Self {
            settings: H2Settings::default(),
            window_update: 0,
            pseudo_order: PseudoHeader::default_order(),
            encoder_table_size: default_encoder_table_size(),
            never_index: default_never_index(),
        }
    }
}

/// A named bundle of TLS and HTTP/2 parameters imitating a browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub tls: TlsProfile,
    pub http2: Http2Profile,
    /// Regular header order used when neither client nor request sets one.
    #[serde(default)]
    pub header_order: Vec<String>,
}

impl Profile {
    /// Parse a profile from its JSON form and validate it.
    pub fn from_json(json: &str) -> Result<Self, NetError> {
        let profile: Profile = serde_json::from_str(json)
            .map_err(|e| NetError::ProfileEncodeError(format!("invalid profile JSON: {}", e)))?;
        profile.validate()?;
        Ok(profile)
    }

    /// ALPN protocols in preference order (empty if the template has no ALPN).
    pub fn alpn(&self) -> &[String] {
        self.tls
            .extensions
            .iter()
            .find_map(|ext| match ext {
                ExtensionSpec::Alpn { protocols } => Some(protocols.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    pub fn uses_grease(&self) -> bool {
        let in_list = |list: &[CodePoint]| list.contains(&CodePoint::Grease);
        in_list(&self.tls.cipher_suites)
            || self.tls.extensions.iter().any(|ext| match ext {
                ExtensionSpec::Grease => true,
                ExtensionSpec::SupportedGroups { groups } => in_list(groups),
                ExtensionSpec::KeyShare { groups } => in_list(groups),
                ExtensionSpec::SupportedVersions { versions } => in_list(versions),
                _ => false,
            })
    }

    pub fn has_extension(&self, id: u16) -> bool {
        self.tls.extensions.iter().any(|e| e.id() == Some(id))
    }

    pub fn supported_groups(&self) -> &[CodePoint] {
        self.tls
            .extensions
            .iter()
            .find_map(|ext| match ext {
                ExtensionSpec::SupportedGroups { groups } => Some(groups.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    pub fn signature_algorithms(&self) -> &[u16] {
        self.tls
            .extensions
            .iter()
            .find_map(|ext| match ext {
                ExtensionSpec::SignatureAlgorithms { algorithms } => Some(algorithms.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    pub fn key_share_groups(&self) -> &[CodePoint] {
        self.tls
            .extensions
            .iter()
            .find_map(|ext| match ext {
                ExtensionSpec::KeyShare { groups } => Some(groups.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    /// Check that the template is internally consistent.
    pub fn validate(&self) -> Result<(), NetError> {
        let fail = |msg: String| Err(NetError::ProfileEncodeError(format!("{}: {}", self.id, msg)));

        if self.id.is_empty() {
            return Err(NetError::ProfileEncodeError("profile id is empty".into()));
        }
        if self.tls.cipher_suites.is_empty() {
            return fail("no cipher suites".into());
        }
        if self.tls.compression_methods.is_empty() {
            return fail("no compression methods".into());
        }
        if self.tls.session_id_len > 32 {
            return fail("session id longer than 32 bytes".into());
        }
        if self.tls.min_version > self.tls.max_version {
            return fail("min_version above max_version".into());
        }

        let mut seen = HashSet::new();
        let mut grease_exts = 0;
        for ext in &self.tls.extensions {
            match ext.id() {
                Some(id) => {
                    if !seen.insert(id) {
                        return fail(format!("extension {} listed twice", id));
                    }
                }
                None => grease_exts += 1,
            }
        }
        if grease_exts > 2 {
            return fail("at most two GREASE extensions are supported".into());
        }

        for ext in &self.tls.extensions {
            match ext {
                ExtensionSpec::Alpn { protocols } | ExtensionSpec::ApplicationSettings { protocols } => {
                    if protocols.is_empty() {
                        return fail("empty protocol list".into());
                    }
                    if protocols.iter().any(|p| p.is_empty() || p.len() > 255) {
                        return fail("protocol name must be 1..=255 bytes".into());
                    }
                }
                ExtensionSpec::SupportedGroups { groups } if groups.is_empty() => {
                    return fail("empty supported_groups".into());
                }
                ExtensionSpec::SignatureAlgorithms { algorithms } if algorithms.is_empty() => {
                    return fail("empty signature_algorithms".into());
                }
                ExtensionSpec::SupportedVersions { versions } if versions.is_empty() => {
                    return fail("empty supported_versions".into());
                }
                _ => {}
            }
        }

        if self.alpn().is_empty() {
            return fail("template carries no ALPN extension".into());
        }

        let groups = self.supported_groups();
        for share in self.key_share_groups() {
            if !groups.contains(share) {
                return fail(format!(
                    "key share group {:?} is not in supported_groups",
                    share
                ));
            }
        }

        Ok(())
    }
}
