//! Projection of a profile onto BoringSSL connector settings.
//!
//! BoringSSL writes the ClientHello itself. [`TlsOptions::from_profile`]
//! maps every field of the template onto a connector knob so the stack
//! lays the hello out exactly as [`super::synthesize`] does, and refuses
//! templates the stack cannot reproduce.

use crate::base::neterror::NetError;
use crate::emulation::profile::{CodePoint, ExtensionSpec, Profile};
use boring::ssl::{
    CertificateCompressionAlgorithm, CertificateCompressor, ExtensionType, SslConnectorBuilder,
    SslCurve, SslOptions, SslVerifyMode, SslVersion,
};
use std::io::{self, Read, Write};

/// Padding target BoringSSL pads ClientHellos to.
pub const STACK_PADDING_TARGET: usize = 512;

/// IANA name of a cipher suite, TLS 1.3 suites included.
pub fn cipher_name(code: u16) -> Option<&'static str> {
    let name = match code {
        0x1301 => "TLS_AES_128_GCM_SHA256",
        0x1302 => "TLS_AES_256_GCM_SHA384",
        0x1303 => "TLS_CHACHA20_POLY1305_SHA256",
        0xc02b => "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
        0xc02f => "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
        0xc02c => "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
        0xc030 => "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
        0xcca9 => "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
        0xcca8 => "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
        0xc009 => "TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA",
        0xc00a => "TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA",
        0xc013 => "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA",
        0xc014 => "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA",
        0xc008 => "TLS_ECDHE_ECDSA_WITH_3DES_EDE_CBC_SHA",
        0xc012 => "TLS_ECDHE_RSA_WITH_3DES_EDE_CBC_SHA",
        0x009c => "TLS_RSA_WITH_AES_128_GCM_SHA256",
        0x009d => "TLS_RSA_WITH_AES_256_GCM_SHA384",
        0x002f => "TLS_RSA_WITH_AES_128_CBC_SHA",
        0x0035 => "TLS_RSA_WITH_AES_256_CBC_SHA",
        0x000a => "TLS_RSA_WITH_3DES_EDE_CBC_SHA",
        _ => return None,
    };
    Some(name)
}

pub fn ssl_curve(group: u16) -> Option<SslCurve> {
    let curve = match group {
        29 => SslCurve::X25519,
        23 => SslCurve::SECP256R1,
        24 => SslCurve::SECP384R1,
        25 => SslCurve::SECP521R1,
        256 => SslCurve::FFDHE2048,
        257 => SslCurve::FFDHE3072,
        0x6399 => SslCurve::X25519_KYBER768_DRAFT00,
        0x11ec => SslCurve::X25519_MLKEM768,
        _ => return None,
    };
    Some(curve)
}

/// IANA name of a signature scheme.
pub fn sigalg_name(alg: u16) -> Option<&'static str> {
    let name = match alg {
        0x0403 => "ecdsa_secp256r1_sha256",
        0x0503 => "ecdsa_secp384r1_sha384",
        0x0603 => "ecdsa_secp521r1_sha512",
        0x0203 => "ecdsa_sha1",
        0x0804 => "rsa_pss_rsae_sha256",
        0x0805 => "rsa_pss_rsae_sha384",
        0x0806 => "rsa_pss_rsae_sha512",
        0x0401 => "rsa_pkcs1_sha256",
        0x0501 => "rsa_pkcs1_sha384",
        0x0601 => "rsa_pkcs1_sha512",
        0x0201 => "rsa_pkcs1_sha1",
        0x0807 => "ed25519",
        _ => return None,
    };
    Some(name)
}

fn extension_type(id: u16) -> Option<ExtensionType> {
    let ext = match id {
        0 => ExtensionType::SERVER_NAME,
        5 => ExtensionType::STATUS_REQUEST,
        10 => ExtensionType::SUPPORTED_GROUPS,
        11 => ExtensionType::EC_POINT_FORMATS,
        13 => ExtensionType::SIGNATURE_ALGORITHMS,
        16 => ExtensionType::APPLICATION_LAYER_PROTOCOL_NEGOTIATION,
        18 => ExtensionType::CERTIFICATE_TIMESTAMP,
        23 => ExtensionType::EXTENDED_MASTER_SECRET,
        27 => ExtensionType::CERT_COMPRESSION,
        28 => ExtensionType::RECORD_SIZE_LIMIT,
        34 => ExtensionType::DELEGATED_CREDENTIAL,
        35 => ExtensionType::SESSION_TICKET,
        43 => ExtensionType::SUPPORTED_VERSIONS,
        45 => ExtensionType::PSK_KEY_EXCHANGE_MODES,
        51 => ExtensionType::KEY_SHARE,
        17513 => ExtensionType::APPLICATION_SETTINGS,
        65281 => ExtensionType::RENEGOTIATE,
        _ => return None,
    };
    Some(ext)
}

fn ssl_version(v: u16) -> Option<SslVersion> {
    match v {
        0x0301 => Some(SslVersion::TLS1),
        0x0302 => Some(SslVersion::TLS1_1),
        0x0303 => Some(SslVersion::TLS1_2),
        0x0304 => Some(SslVersion::TLS1_3),
        _ => None,
    }
}

fn names<F>(values: &[u16], what: &str, name: F) -> Result<String, String>
where
    F: Fn(u16) -> Option<&'static str>,
{
    values
        .iter()
        .map(|v| name(*v).ok_or_else(|| format!("{} {:#06x} has no TLS stack equivalent", what, v)))
        .collect::<Result<Vec<_>, _>>()
        .map(|list| list.join(":"))
}

/// ALPN protocol list in wire format (length-prefixed names).
pub fn alpn_wire(protocols: &[String]) -> Result<Vec<u8>, NetError> {
    let mut wire = Vec::new();
    for proto in protocols {
        if proto.is_empty() || proto.len() > 255 {
            return Err(NetError::ProfileEncodeError(format!(
                "ALPN protocol {:?} must be 1..=255 bytes",
                proto
            )));
        }
        wire.push(proto.len() as u8);
        wire.extend_from_slice(proto.as_bytes());
    }
    Ok(wire)
}

struct BrotliCertDecompressor;

impl CertificateCompressor for BrotliCertDecompressor {
    const ALGORITHM: CertificateCompressionAlgorithm = CertificateCompressionAlgorithm::BROTLI;
    const CAN_COMPRESS: bool = false;
    const CAN_DECOMPRESS: bool = true;

    fn decompress<W>(&self, input: &[u8], output: &mut W) -> io::Result<()>
    where
        W: Write,
    {
        let mut reader = brotli::Decompressor::new(input, 4096);
        io::copy(&mut reader, output)?;
        Ok(())
    }
}

struct ZlibCertDecompressor;

impl CertificateCompressor for ZlibCertDecompressor {
    const ALGORITHM: CertificateCompressionAlgorithm = CertificateCompressionAlgorithm::ZLIB;
    const CAN_COMPRESS: bool = false;
    const CAN_DECOMPRESS: bool = true;

    fn decompress<W>(&self, input: &[u8], output: &mut W) -> io::Result<()>
    where
        W: Write,
    {
        let mut decoded = Vec::new();
        flate2::read::ZlibDecoder::new(input).read_to_end(&mut decoded)?;
        output.write_all(&decoded)
    }
}

/// Builder for `TlsOptions`.
#[must_use]
#[derive(Debug, Clone)]
pub struct TlsOptionsBuilder {
    config: TlsOptions,
}

/// TLS connector configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsOptions {
    /// ALPN protocols in preference order.
    pub alpn_protocols: Vec<String>,
    /// Protocols announced in application_settings (ALPS).
    pub alps_protocols: Vec<String>,
    pub min_tls_version: Option<SslVersion>,
    pub max_tls_version: Option<SslVersion>,
    /// Colon-separated IANA cipher names, TLS 1.3 suites included, in wire order.
    pub cipher_list: Option<String>,
    /// Named group ids for supported_groups, in wire order.
    pub curves: Vec<u16>,
    /// Duplicates are kept.
    pub sigalgs_list: Option<String>,
    pub delegated_credentials: Option<String>,
    pub record_size_limit: Option<u16>,
    /// Number of supported_groups entries that get a key share, when above one.
    pub key_shares_limit: Option<u8>,
    /// BoringSSL extension table indices in wire order.
    pub extension_permutation: Vec<u8>,
    pub send_sni: bool,
    pub grease_enabled: bool,
    pub enable_ocsp_stapling: bool,
    pub enable_signed_cert_timestamps: bool,
    pub session_ticket: bool,
    /// RFC 8879 algorithm ids.
    pub cert_compression: Vec<u16>,
    /// Verify the peer chain and hostname against the system trust store.
    pub verify_peer: bool,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            alpn_protocols: vec!["h2".to_string(), "http/1.1".to_string()],
            alps_protocols: Vec::new(),
            min_tls_version: Some(SslVersion::TLS1_2),
            max_tls_version: Some(SslVersion::TLS1_3),
            cipher_list: None,
            curves: Vec::new(),
            sigalgs_list: None,
            delegated_credentials: None,
            record_size_limit: None,
            key_shares_limit: None,
            extension_permutation: Vec::new(),
            send_sni: true,
            grease_enabled: false,
            enable_ocsp_stapling: false,
            enable_signed_cert_timestamps: false,
            session_ticket: true,
            cert_compression: Vec::new(),
            verify_peer: true,
        }
    }
}

impl TlsOptionsBuilder {
    pub fn new() -> Self {
        Self {
            config: TlsOptions::default(),
        }
    }

    pub fn alpn_protocols(mut self, alpn: &[&str]) -> Self {
        self.config.alpn_protocols = alpn.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn min_tls_version(mut self, version: SslVersion) -> Self {
        self.config.min_tls_version = Some(version);
        self
    }

    pub fn max_tls_version(mut self, version: SslVersion) -> Self {
        self.config.max_tls_version = Some(version);
        self
    }

    pub fn verify_peer(mut self, verify: bool) -> Self {
        self.config.verify_peer = verify;
        self
    }

    pub fn build(self) -> TlsOptions {
        self.config
    }
}

impl Default for TlsOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Checks the parts of a template BoringSSL lays out on its own: GREASE
/// placement, padding, the record preamble and what always gets sent.
fn check_layout(profile: &Profile) -> Result<(), String> {
    let tls = &profile.tls;
    if tls.record_version != 0x0301 || tls.legacy_version != 0x0303 {
        return Err("record version must be 0x0301 and legacy version 0x0303".into());
    }
    if tls.compression_methods != [0] {
        return Err("compression methods must be [0]".into());
    }
    let tls13 = tls.max_version >= 0x0304;
    let session_id_len = if tls13 { 32 } else { 0 };
    if tls.session_id_len != session_id_len {
        return Err(format!("session id must be {} bytes", session_id_len));
    }

    let grease = profile.uses_grease();
    let leading = |list: &[CodePoint], what: &str| -> Result<(), String> {
        let at: Vec<usize> = list
            .iter()
            .enumerate()
            .filter(|(_, c)| **c == CodePoint::Grease)
            .map(|(i, _)| i)
            .collect();
        let expected: &[usize] = if grease && !list.is_empty() { &[0] } else { &[] };
        if at != expected {
            return Err(format!("GREASE in {} must lead the list in every GREASE slot", what));
        }
        Ok(())
    };
    leading(&tls.cipher_suites, "cipher_suites")?;

    let exts = &tls.extensions;
    let padding_at = exts.iter().position(|e| matches!(e, ExtensionSpec::Padding { .. }));
    match (padding_at, exts.last()) {
        (Some(at), Some(ExtensionSpec::Padding { target }))
            if at + 1 == exts.len() && *target == STACK_PADDING_TARGET => {}
        _ => {
            return Err(format!(
                "padding with target {} must be the last extension",
                STACK_PADDING_TARGET
            ))
        }
    }
    let body = &exts[..exts.len() - 1];
    let grease_at: Vec<usize> = body
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, ExtensionSpec::Grease))
        .map(|(i, _)| i)
        .collect();
    let expected: Vec<usize> = if grease { vec![0, body.len() - 1] } else { Vec::new() };
    if grease_at != expected {
        return Err("GREASE extensions must come first and last before padding".into());
    }

    let mut required = vec![23, 65281, 10, 11, 13];
    if tls13 {
        required.extend([51, 45, 43]);
    }
    if let Some(missing) = required.iter().find(|id| !profile.has_extension(**id)) {
        return Err(format!("extension {} is always sent by the TLS stack", missing));
    }

    let groups = profile.supported_groups();
    leading(groups, "supported_groups")?;
    for ext in body {
        match ext {
            ExtensionSpec::EcPointFormats { formats } if formats.as_slice() != [0] => {
                return Err("ec_point_formats must be [0]".into())
            }
            ExtensionSpec::PskKeyExchangeModes { modes } if modes.as_slice() != [1] => {
                return Err("psk_key_exchange_modes must be [1]".into())
            }
            ExtensionSpec::KeyShare { groups: shares } => {
                leading(shares, "key_share")?;
                if shares.is_empty() || shares.len() > groups.len() || shares[..] != groups[..shares.len()] {
                    return Err("key_share groups must be a prefix of supported_groups".into());
                }
            }
            ExtensionSpec::SupportedVersions { versions } => {
                leading(versions, "supported_versions")?;
                let listed: Vec<u16> = versions.iter().filter_map(CodePoint::value).collect();
                let expected: Vec<u16> = (tls.min_version..=tls.max_version).rev().collect();
                if listed != expected {
                    return Err("supported_versions must run from max_version down to min_version".into());
                }
            }
            ExtensionSpec::ApplicationSettings { protocols } => {
                if let Some(p) = protocols.iter().find(|p| !profile.alpn().contains(p)) {
                    return Err(format!("application_settings protocol {:?} is not offered in ALPN", p));
                }
            }
            ExtensionSpec::CompressCertificate { algorithms } => {
                if let Some(alg) = algorithms.iter().find(|a| !matches!(**a, 1 | 2)) {
                    return Err(format!("certificate compression algorithm {} is not supported", alg));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

impl TlsOptions {
    pub fn builder() -> TlsOptionsBuilder {
        TlsOptionsBuilder::new()
    }

    /// Derive connector settings from a profile's ClientHello template.
    ///
    /// Fails with [`NetError::ProfileEncodeError`] when the template carries
    /// a code point or layout the TLS stack cannot put on the wire.
    pub fn from_profile(profile: &Profile) -> Result<Self, NetError> {
        let encode_err = |msg: String| NetError::ProfileEncodeError(format!("{}: {}", profile.id, msg));
        check_layout(profile).map_err(encode_err)?;

        let tls = &profile.tls;
        let values = |list: &[CodePoint]| -> Vec<u16> { list.iter().filter_map(CodePoint::value).collect() };

        let mut options = Self {
            alpn_protocols: profile.alpn().to_vec(),
            min_tls_version: ssl_version(tls.min_version),
            max_tls_version: ssl_version(tls.max_version),
            cipher_list: Some(names(&values(&tls.cipher_suites), "cipher suite", cipher_name).map_err(encode_err)?),
            curves: values(profile.supported_groups()),
            grease_enabled: profile.uses_grease(),
            send_sni: profile.has_extension(0),
            session_ticket: profile.has_extension(35),
            ..Self::default()
        };
        if options.min_tls_version.is_none() || options.max_tls_version.is_none() {
            return Err(encode_err("unknown protocol version bounds".into()));
        }
        if let Some(group) = options.curves.iter().find(|g| ssl_curve(**g).is_none()) {
            return Err(encode_err(format!("named group {:#06x} has no TLS stack equivalent", group)));
        }

        for ext in &tls.extensions {
            match ext {
                ExtensionSpec::Grease | ExtensionSpec::Padding { .. } => continue,
                ExtensionSpec::Raw { id, .. } => {
                    return Err(encode_err(format!("extension {} has no TLS stack equivalent", id)))
                }
                ExtensionSpec::StatusRequest => options.enable_ocsp_stapling = true,
                ExtensionSpec::SignedCertificateTimestamp => options.enable_signed_cert_timestamps = true,
                ExtensionSpec::SignatureAlgorithms { algorithms } => {
                    options.sigalgs_list =
                        Some(names(algorithms, "signature algorithm", sigalg_name).map_err(encode_err)?);
                }
                ExtensionSpec::DelegatedCredentials { algorithms } => {
                    options.delegated_credentials =
                        Some(names(algorithms, "signature algorithm", sigalg_name).map_err(encode_err)?);
                }
                ExtensionSpec::RecordSizeLimit { limit } => options.record_size_limit = Some(*limit),
                ExtensionSpec::KeyShare { groups } => {
                    let shares = values(groups).len();
                    if shares > 1 {
                        options.key_shares_limit = u8::try_from(shares).ok();
                    }
                }
                ExtensionSpec::CompressCertificate { algorithms } => {
                    options.cert_compression = algorithms.clone();
                }
                ExtensionSpec::ApplicationSettings { protocols } => {
                    options.alps_protocols = protocols.clone();
                }
                _ => {}
            }

            let id = ext.id().unwrap_or_default();
            let index = extension_type(id)
                .and_then(ExtensionType::index_of)
                .and_then(|i| u8::try_from(i).ok())
                .ok_or_else(|| encode_err(format!("extension {} has no TLS stack equivalent", id)))?;
            options.extension_permutation.push(index);
        }

        Ok(options)
    }

    /// Apply this configuration to an SSL connector builder.
    pub fn apply_to_builder(&self, builder: &mut SslConnectorBuilder) -> Result<(), NetError> {
        let tls_err = |what: &str, e: boring::error::ErrorStack| {
            NetError::TlsHandshakeFailed(format!("{}: {}", what, e))
        };

        builder
            .set_min_proto_version(self.min_tls_version)
            .map_err(|e| tls_err("min version", e))?;
        builder
            .set_max_proto_version(self.max_tls_version)
            .map_err(|e| tls_err("max version", e))?;

        if let Some(ciphers) = &self.cipher_list {
            builder
                .set_cipher_list(ciphers)
                .map_err(|e| tls_err("cipher list", e))?;
        }

        if !self.alpn_protocols.is_empty() {
            builder
                .set_alpn_protos(&alpn_wire(&self.alpn_protocols)?)
                .map_err(|e| tls_err("ALPN", e))?;
        }

        if let Some(sigalgs) = &self.sigalgs_list {
            builder
                .set_sigalgs_list(sigalgs)
                .map_err(|e| tls_err("signature algorithms", e))?;
        }

        if let Some(creds) = &self.delegated_credentials {
            builder
                .set_delegated_credentials(creds)
                .map_err(|e| tls_err("delegated credentials", e))?;
        }

        if !self.curves.is_empty() {
            let curves: Vec<SslCurve> = self.curves.iter().filter_map(|g| ssl_curve(*g)).collect();
            builder
                .set_curves(&curves)
                .map_err(|e| tls_err("curves", e))?;
        }
        if let Some(limit) = self.key_shares_limit {
            builder.set_key_shares_limit(limit);
        }
        if let Some(limit) = self.record_size_limit {
            builder.set_record_size_limit(limit);
        }

        builder.set_grease_enabled(self.grease_enabled);
        if self.enable_ocsp_stapling {
            builder.enable_ocsp_stapling();
        }
        if self.enable_signed_cert_timestamps {
            builder.enable_signed_cert_timestamps();
        }
        if !self.session_ticket {
            builder.set_options(SslOptions::NO_TICKET);
        }

        for alg in &self.cert_compression {
            match *alg {
                1 => builder.add_certificate_compression_algorithm(ZlibCertDecompressor),
                2 => builder.add_certificate_compression_algorithm(BrotliCertDecompressor),
                _ => Ok(()),
            }
            .map_err(|e| tls_err("certificate compression", e))?;
        }

        if !self.extension_permutation.is_empty() {
            builder
                .set_extension_permutation_indices(&self.extension_permutation)
                .map_err(|e| tls_err("extension order", e))?;
        }

        if self.verify_peer {
            builder.set_verify(SslVerifyMode::PEER);
        } else {
            builder.set_verify(SslVerifyMode::NONE);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulation::registry::ProfileRegistry;

    fn builtin(id: &str) -> std::sync::Arc<Profile> {
        ProfileRegistry::builtin().unwrap().get(id).unwrap()
    }

    #[test]
    fn test_chrome_projection() {
        let opts = TlsOptions::from_profile(&builtin("chrome-120")).unwrap();
        assert_eq!(opts.curves, vec![29, 23, 24]);
        assert!(opts.cipher_list.as_deref().unwrap().starts_with(
            "TLS_AES_128_GCM_SHA256:TLS_AES_256_GCM_SHA384:TLS_CHACHA20_POLY1305_SHA256:TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256"
        ));
        assert!(opts.grease_enabled);
        assert!(opts.enable_ocsp_stapling);
        assert!(opts.enable_signed_cert_timestamps);
        assert_eq!(opts.cert_compression, vec![2]);
        assert_eq!(opts.alps_protocols, vec!["h2".to_string()]);
        assert_eq!(opts.key_shares_limit, None);
        assert_eq!(opts.min_tls_version, Some(SslVersion::TLS1_2));
        // Every extension except the two GREASE slots and padding.
        assert_eq!(opts.extension_permutation.len(), 15);
        assert_eq!(
            opts.extension_permutation[0],
            ExtensionType::index_of(ExtensionType::SERVER_NAME).unwrap() as u8
        );
    }

    #[test]
    fn test_firefox_projection_keeps_tls13_order_and_ffdhe() {
        let opts = TlsOptions::from_profile(&builtin("firefox-110")).unwrap();
        assert!(opts.cipher_list.as_deref().unwrap().starts_with(
            "TLS_AES_128_GCM_SHA256:TLS_CHACHA20_POLY1305_SHA256:TLS_AES_256_GCM_SHA384:"
        ));
        assert_eq!(opts.curves, vec![29, 23, 24, 25, 256, 257]);
        assert_eq!(
            opts.delegated_credentials.as_deref(),
            Some("ecdsa_secp256r1_sha256:ecdsa_secp384r1_sha384:ecdsa_secp521r1_sha512:ecdsa_sha1")
        );
        assert_eq!(opts.record_size_limit, Some(16385));
        assert_eq!(opts.key_shares_limit, Some(2));
        assert!(!opts.grease_enabled);
        assert!(opts.alps_protocols.is_empty());
    }

    #[test]
    fn test_duplicate_sigalgs_kept() {
        let opts = TlsOptions::from_profile(&builtin("safari-17")).unwrap();
        let sigalgs = opts.sigalgs_list.unwrap();
        assert_eq!(sigalgs.matches("rsa_pss_rsae_sha384").count(), 2);
        assert!(!opts.session_ticket);
        assert_eq!(opts.min_tls_version, Some(SslVersion::TLS1));
    }

    #[test]
    fn test_unencodable_templates_rejected() {
        let reject = |edit: &dyn Fn(&mut Profile), needle: &str| {
            let mut profile = (*builtin("chrome-120")).clone();
            edit(&mut profile);
            match TlsOptions::from_profile(&profile) {
                Err(NetError::ProfileEncodeError(m)) => assert!(m.contains(needle), "{}", m),
                other => panic!("expected encode error, got {:?}", other.map(|_| ())),
            }
        };

        reject(&|p| p.tls.cipher_suites.push(CodePoint::Value(0x0016)), "cipher suite 0x0016");
        reject(
            &|p| p.tls.extensions.insert(3, ExtensionSpec::Raw { id: 0x4469, data: vec![] }),
            "extension 17513",
        );
        reject(
            &|p| {
                p.tls.extensions.pop();
            },
            "padding",
        );
        reject(&|p| p.tls.extensions.swap(0, 1), "GREASE extensions");
        reject(&|p| p.tls.session_id_len = 0, "session id");
    }

    #[test]
    fn test_alpn_wire_format() {
        let wire = alpn_wire(&["h2".to_string(), "http/1.1".to_string()]).unwrap();
        assert_eq!(wire, b"\x02h2\x08http/1.1");
        assert!(alpn_wire(&[String::new()]).is_err());
    }
}
