//! ClientHello parsing and JA3/JA4 fingerprints.
//!
//! JA3: `MD5(SSLVersion,Ciphers,Extensions,EllipticCurves,EcPointFormats)`,
//! decimal values joined by `-`, GREASE removed from every field.
//!
//! JA4: `{a}_{b}_{c}` where `a` summarizes protocol, version, SNI, counts
//! and ALPN, `b` hashes the sorted cipher suites and `c` the sorted
//! extensions followed by signature algorithms.

use crate::base::neterror::NetError;
use crate::emulation::profile::{is_grease, GREASE_PLACEHOLDER};
use md5::{Digest as _, Md5};
use sha2::Sha256;

/// Fields of a parsed ClientHello, in wire order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientHelloInfo {
    pub record_version: u16,
    pub tls_version: u16,
    pub random: Vec<u8>,
    pub session_id: Vec<u8>,
    pub cipher_suites: Vec<u16>,
    pub compression_methods: Vec<u8>,
    /// Extension type codes, GREASE included.
    pub extensions: Vec<u16>,
    pub server_name: Option<String>,
    pub elliptic_curves: Vec<u16>,
    pub ec_point_formats: Vec<u8>,
    pub signature_algorithms: Vec<u16>,
    pub alpn_protocols: Vec<String>,
    pub supported_versions: Vec<u16>,
    pub key_share_groups: Vec<u16>,
    /// Key share entries as sent: group and public key bytes.
    pub key_shares: Vec<(u16, Vec<u8>)>,
    pub psk_key_exchange_modes: Vec<u8>,
    pub cert_compression: Vec<u16>,
    pub padding_len: Option<usize>,
}

/// GREASE-normalized layout of a ClientHello. Two hellos with equal shapes
/// differ only in random, session id, key-share material and GREASE picks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloShape {
    pub record_version: u16,
    pub tls_version: u16,
    pub session_id_len: usize,
    pub cipher_suites: Vec<u16>,
    pub compression_methods: Vec<u8>,
    pub extensions: Vec<u16>,
    pub elliptic_curves: Vec<u16>,
    pub ec_point_formats: Vec<u8>,
    pub signature_algorithms: Vec<u16>,
    pub alpn_protocols: Vec<String>,
    pub supported_versions: Vec<u16>,
    pub key_share_groups: Vec<u16>,
    pub psk_key_exchange_modes: Vec<u8>,
    pub cert_compression: Vec<u16>,
}

impl HelloShape {
    /// Names of the fields that differ from `other`.
    pub fn diff(&self, other: &HelloShape) -> Vec<&'static str> {
        let mut fields = Vec::new();
        macro_rules! cmp {
            ($($field:ident),*) => {
                $(if self.$field != other.$field { fields.push(stringify!($field)); })*
            };
        }
        cmp!(
            record_version,
            tls_version,
            session_id_len,
            cipher_suites,
            compression_methods,
            extensions,
            elliptic_curves,
            ec_point_formats,
            signature_algorithms,
            alpn_protocols,
            supported_versions,
            key_share_groups,
            psk_key_exchange_modes,
            cert_compression
        );
        fields
    }
}

fn normalize(values: &[u16]) -> Vec<u16> {
    values
        .iter()
        .map(|v| if is_grease(*v) { GREASE_PLACEHOLDER } else { *v })
        .collect()
}

fn filter_grease(values: &[u16]) -> Vec<u16> {
    values.iter().copied().filter(|v| !is_grease(*v)).collect()
}

fn join<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("-")
}

impl ClientHelloInfo {
    pub fn ja3_string(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.tls_version,
            join(&filter_grease(&self.cipher_suites)),
            join(&filter_grease(&self.extensions)),
            join(&filter_grease(&self.elliptic_curves)),
            join(&self.ec_point_formats)
        )
    }

    /// Lowercase hex MD5 of [`ja3_string`](Self::ja3_string).
    pub fn ja3_hash(&self) -> String {
        let mut hasher = Md5::new();
        hasher.update(self.ja3_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn ja4(&self) -> String {
        let version = filter_grease(&self.supported_versions)
            .into_iter()
            .max()
            .unwrap_or(self.tls_version);
        let version = match version {
            0x0304 => "13",
            0x0303 => "12",
            0x0302 => "11",
            0x0301 => "10",
            _ => "00",
        };
        let sni = if self.server_name.is_some() { 'd' } else { 'i' };
        let alpn = self
            .alpn_protocols
            .first()
            .map(|p| p.chars().filter(char::is_ascii_alphanumeric).collect::<Vec<_>>())
            .filter(|c| !c.is_empty())
            .map(|c| format!("{}{}", c[0], c[c.len() - 1]))
            .unwrap_or_else(|| "00".to_string());

        let a = format!(
            "t{}{}{:02}{:02}{}",
            version,
            sni,
            filter_grease(&self.cipher_suites).len().min(99),
            filter_grease(&self.extensions).len().min(99),
            alpn
        );

        let mut ciphers = filter_grease(&self.cipher_suites);
        ciphers.sort_unstable();
        let b = hex_list(&ciphers);

        let mut exts: Vec<u16> = filter_grease(&self.extensions)
            .into_iter()
            .filter(|e| *e != 0x0000 && *e != 0x0010)
            .collect();
        exts.sort_unstable();
        let mut c = hex_list(&exts);
        if !self.signature_algorithms.is_empty() {
            c = format!("{}_{}", c, hex_list(&self.signature_algorithms));
        }

        format!("{}_{}_{}", a, truncated_sha256(&b), truncated_sha256(&c))
    }

    pub fn shape(&self) -> HelloShape {
        HelloShape {
            record_version: self.record_version,
            tls_version: self.tls_version,
            session_id_len: self.session_id.len(),
            cipher_suites: normalize(&self.cipher_suites),
            compression_methods: self.compression_methods.clone(),
            extensions: normalize(&self.extensions),
            elliptic_curves: normalize(&self.elliptic_curves),
            ec_point_formats: self.ec_point_formats.clone(),
            signature_algorithms: self.signature_algorithms.clone(),
            alpn_protocols: self.alpn_protocols.clone(),
            supported_versions: normalize(&self.supported_versions),
            key_share_groups: normalize(&self.key_share_groups),
            psk_key_exchange_modes: self.psk_key_exchange_modes.clone(),
            cert_compression: self.cert_compression.clone(),
        }
    }
}

fn hex_list(values: &[u16]) -> String {
    values
        .iter()
        .map(|v| format!("{:04x}", v))
        .collect::<Vec<_>>()
        .join(",")
}

fn truncated_sha256(input: &str) -> String {
    if input.is_empty() {
        return "000000000000".to_string();
    }
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let full = format!("{:x}", hasher.finalize());
    full[..12].to_string()
}

/// Minimal big-endian cursor over a borrowed buffer.
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], NetError> {
        if self.buf.len() < n {
            return Err(NetError::TlsHandshakeFailed(
                "truncated ClientHello".to_string(),
            ));
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8, NetError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, NetError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u24(&mut self) -> Result<usize, NetError> {
        let b = self.take(3)?;
        Ok(((b[0] as usize) << 16) | ((b[1] as usize) << 8) | b[2] as usize)
    }

    fn vec8(&mut self) -> Result<Reader<'a>, NetError> {
        let n = self.u8()? as usize;
        Ok(Reader::new(self.take(n)?))
    }

    fn vec16(&mut self) -> Result<Reader<'a>, NetError> {
        let n = self.u16()? as usize;
        Ok(Reader::new(self.take(n)?))
    }

    fn u16s(mut self) -> Result<Vec<u16>, NetError> {
        let mut out = Vec::with_capacity(self.buf.len() / 2);
        while !self.is_empty() {
            out.push(self.u16()?);
        }
        Ok(out)
    }
}

/// Length of the TLS record at the start of `buf`, header included, once
/// the header is available.
pub fn record_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < 5 {
        return None;
    }
    Some(5 + u16::from_be_bytes([buf[3], buf[4]]) as usize)
}

/// Parse a TLS plaintext record holding a ClientHello.
pub fn parse_client_hello(record: &[u8]) -> Result<ClientHelloInfo, NetError> {
    let mut r = Reader::new(record);
    if r.u8()? != 0x16 {
        return Err(NetError::TlsHandshakeFailed(
            "not a handshake record".to_string(),
        ));
    }
    let record_version = r.u16()?;
    let mut fragment = r.vec16()?;
    if fragment.u8()? != 0x01 {
        return Err(NetError::TlsHandshakeFailed(
            "not a ClientHello message".to_string(),
        ));
    }
    let len = fragment.u24()?;
    let mut hello = Reader::new(fragment.take(len)?);

    let mut info = ClientHelloInfo {
        record_version,
        tls_version: hello.u16()?,
        random: hello.take(32)?.to_vec(),
        ..Default::default()
    };
    info.session_id = hello.vec8()?.buf.to_vec();
    info.cipher_suites = hello.vec16()?.u16s()?;
    info.compression_methods = hello.vec8()?.buf.to_vec();

    if hello.is_empty() {
        return Ok(info);
    }

    let mut exts = hello.vec16()?;
    while !exts.is_empty() {
        let id = exts.u16()?;
        let mut data = exts.vec16()?;
        info.extensions.push(id);
        match id {
            0 => {
                let mut list = data.vec16()?;
                while !list.is_empty() {
                    let kind = list.u8()?;
                    let name = list.vec16()?;
                    if kind == 0 {
                        info.server_name = Some(String::from_utf8_lossy(name.buf).into_owned());
                    }
                }
            }
            10 => info.elliptic_curves = data.vec16()?.u16s()?,
            11 => info.ec_point_formats = data.vec8()?.buf.to_vec(),
            13 => info.signature_algorithms = data.vec16()?.u16s()?,
            16 => {
                let mut list = data.vec16()?;
                while !list.is_empty() {
                    let proto = list.vec8()?;
                    info.alpn_protocols
                        .push(String::from_utf8_lossy(proto.buf).into_owned());
                }
            }
            21 => info.padding_len = Some(data.buf.len()),
            27 => info.cert_compression = data.vec8()?.u16s()?,
            43 => info.supported_versions = data.vec8()?.u16s()?,
            45 => info.psk_key_exchange_modes = data.vec8()?.buf.to_vec(),
            51 => {
                let mut shares = data.vec16()?;
                while !shares.is_empty() {
                    let group = shares.u16()?;
                    let key = shares.vec16()?;
                    info.key_share_groups.push(group);
                    info.key_shares.push((group, key.buf.to_vec()));
                }
            }
            _ => {}
        }
    }

    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ClientHelloInfo {
        ClientHelloInfo {
            tls_version: 0x0303,
            cipher_suites: vec![0x0a0a, 0x1301, 0x1302, 0x1303, 0xc02b, 0xc02f],
            extensions: vec![0x2a2a, 0x0000, 0x0017, 0x000a, 0x000b, 0x000d, 0x0010, 0x002b],
            elliptic_curves: vec![0x4a4a, 0x001d, 0x0017, 0x0018],
            ec_point_formats: vec![0],
            signature_algorithms: vec![0x0403, 0x0503, 0x0603],
            server_name: Some("example.com".into()),
            alpn_protocols: vec!["h2".into(), "http/1.1".into()],
            supported_versions: vec![0x0304, 0x0303],
            ..Default::default()
        }
    }

    #[test]
    fn test_ja3_filters_grease() {
        assert_eq!(
            sample().ja3_string(),
            "771,4865-4866-4867-49195-49199,0-23-10-11-13-16-43,29-23-24,0"
        );
        let hash = sample().ja3_hash();
        assert_eq!(hash.len(), 32);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_ja4_part_a() {
        let ja4 = sample().ja4();
        assert!(ja4.starts_with("t13d0507h2_"), "{}", ja4);
        assert_eq!(ja4.split('_').count(), 3);
    }

    #[test]
    fn test_shape_normalizes_grease() {
        let a = sample();
        let mut b = sample();
        b.cipher_suites[0] = 0xdada;
        b.extensions[0] = 0x7a7a;
        b.random = vec![1; 32];
        assert_eq!(a.shape(), b.shape());

        b.cipher_suites.swap(1, 2);
        assert_eq!(a.shape().diff(&b.shape()), vec!["cipher_suites"]);
    }

    #[test]
    fn test_parse_rejects_non_handshake() {
        assert!(parse_client_hello(&[0x17, 3, 3, 0, 0]).is_err());
        assert!(parse_client_hello(&[0x16, 3, 1]).is_err());
    }

    #[test]
    fn test_record_len() {
        assert_eq!(record_len(&[0x16, 3, 1, 0x02, 0x00]), Some(517));
        assert_eq!(record_len(&[0x16, 3]), None);
    }
}
