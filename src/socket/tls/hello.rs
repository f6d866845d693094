//! ClientHello synthesis from a profile template.
//!
//! [`synthesize`] lays out a TLS plaintext record holding a ClientHello
//! whose cipher suites, extensions and extension payloads follow the
//! profile exactly. Only the per-connection fields vary between calls:
//! random, session id, key-share material and GREASE values.

use crate::base::neterror::NetError;
use crate::emulation::profile::{is_grease, CodePoint, ExtensionSpec, Profile};
use crate::socket::tls::ja3::ClientHelloInfo;
use rand::{Rng, RngCore};
use std::collections::BTreeMap;
use std::net::IpAddr;

const CONTENT_TYPE_HANDSHAKE: u8 = 0x16;
const HANDSHAKE_CLIENT_HELLO: u8 = 0x01;

/// Named groups with a known key-share length.
pub mod group {
    pub const SECP256R1: u16 = 23;
    pub const SECP384R1: u16 = 24;
    pub const SECP521R1: u16 = 25;
    pub const X25519: u16 = 29;
    pub const FFDHE2048: u16 = 256;
    pub const FFDHE3072: u16 = 257;
    pub const X25519_KYBER768_DRAFT: u16 = 0x6399;
    pub const X25519_MLKEM768: u16 = 0x11ec;
}

/// Public key length a browser sends for `group`.
pub fn key_share_len(group_id: u16) -> usize {
    match group_id {
        group::X25519 => 32,
        group::SECP256R1 => 65,
        group::SECP384R1 => 97,
        group::SECP521R1 => 133,
        group::X25519_KYBER768_DRAFT | group::X25519_MLKEM768 => 1216,
        group::FFDHE2048 => 256,
        group::FFDHE3072 => 384,
        _ => 32,
    }
}

/// Position of a GREASE value in the hello.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GreaseSlot {
    Cipher = 0,
    Group = 1,
    Extension1 = 2,
    Extension2 = 3,
    Version = 4,
}

/// Per-connection GREASE draw. One byte per slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GreaseSeed([u8; 5]);

impl GreaseSeed {
    pub fn new(bytes: [u8; 5]) -> Self {
        Self(bytes)
    }

    pub fn random() -> Self {
        let mut bytes = [0u8; 5];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// The `0x?A?A` value for a slot. The second extension value never
    /// equals the first.
    pub fn value(&self, slot: GreaseSlot) -> u16 {
        let v = Self::expand(self.0[slot as usize]);
        if slot == GreaseSlot::Extension2 && v == self.value(GreaseSlot::Extension1) {
            return v ^ 0x1010;
        }
        v
    }

    fn expand(byte: u8) -> u16 {
        let b = (byte & 0xf0) | 0x0a;
        u16::from_be_bytes([b, b])
    }
}

/// Per-connection inputs to [`synthesize`].
#[derive(Debug, Clone)]
pub struct HelloParams {
    pub sni: String,
    pub random: [u8; 32],
    pub session_id: Vec<u8>,
    pub grease: GreaseSeed,
    /// Public key bytes per named group.
    pub key_shares: BTreeMap<u16, Vec<u8>>,
}

impl HelloParams {
    /// Draw fresh random, session id, GREASE and key shares for `profile`.
    pub fn generate(profile: &Profile, sni: &str) -> Self {
        let mut rng = rand::thread_rng();

        let mut random = [0u8; 32];
        rng.fill_bytes(&mut random);

        let mut session_id = vec![0u8; profile.tls.session_id_len.min(32)];
        rng.fill_bytes(&mut session_id);

        let mut key_shares = BTreeMap::new();
        for id in profile.key_share_groups().iter().filter_map(CodePoint::value) {
            let mut key = vec![0u8; key_share_len(id)];
            rng.fill_bytes(&mut key);
            if matches!(id, group::SECP256R1 | group::SECP384R1 | group::SECP521R1) {
                key[0] = 0x04;
            }
            key_shares.insert(id, key);
        }

        Self {
            sni: sni.to_string(),
            random,
            session_id,
            grease: GreaseSeed::new(rng.gen()),
            key_shares,
        }
    }

    /// Recover the per-connection inputs from a parsed hello, so that
    /// `synthesize` with the same profile reproduces it byte for byte.
    pub fn from_client_hello(info: &ClientHelloInfo, sni: &str) -> Result<Self, NetError> {
        let random: [u8; 32] = info
            .random
            .as_slice()
            .try_into()
            .map_err(|_| NetError::TlsHandshakeFailed("ClientHello random is not 32 bytes".into()))?;

        let seed = |value: Option<&u16>| value.map(|v| (v >> 8) as u8).unwrap_or(0);
        let first_grease = |list: &[u16]| seed(list.iter().find(|v| is_grease(**v)));
        let mut grease_exts = info.extensions.iter().filter(|v| is_grease(**v));
        let grease = GreaseSeed::new([
            first_grease(&info.cipher_suites),
            first_grease(&info.elliptic_curves),
            seed(grease_exts.next()),
            seed(grease_exts.next()),
            first_grease(&info.supported_versions),
        ]);

        let key_shares = info
            .key_shares
            .iter()
            .filter(|(group, _)| !is_grease(*group))
            .cloned()
            .collect();

        Ok(Self {
            sni: if sni_applicable(sni) { sni.to_string() } else { String::new() },
            random,
            session_id: info.session_id.clone(),
            grease,
            key_shares,
        })
    }
}

/// Whether a host gets a server_name extension. Empty hosts and IP
/// literals do not.
pub fn sni_applicable(host: &str) -> bool {
    let trimmed = host.trim_start_matches('[').trim_end_matches(']');
    !trimmed.is_empty() && trimmed.parse::<IpAddr>().is_err()
}

/// Build the ClientHello record for `profile`.
pub fn synthesize(profile: &Profile, params: &HelloParams) -> Result<Vec<u8>, NetError> {
    let tls = &profile.tls;
    let encode_err = |msg: &str| NetError::ProfileEncodeError(format!("{}: {}", profile.id, msg));

    if params.session_id.len() > 32 {
        return Err(encode_err("session id longer than 32 bytes"));
    }

    // Body of the ClientHello up to, not including, the extensions block.
    let mut body = Vec::with_capacity(512);
    body.extend_from_slice(&tls.legacy_version.to_be_bytes());
    body.extend_from_slice(&params.random);
    body.push(params.session_id.len() as u8);
    body.extend_from_slice(&params.session_id);

    let ciphers = resolve(&tls.cipher_suites, params.grease.value(GreaseSlot::Cipher));
    put_u16_len(&mut body, ciphers.len() * 2).map_err(|_| encode_err("cipher list too long"))?;
    for c in &ciphers {
        body.extend_from_slice(&c.to_be_bytes());
    }

    if tls.compression_methods.len() > 255 {
        return Err(encode_err("too many compression methods"));
    }
    body.push(tls.compression_methods.len() as u8);
    body.extend_from_slice(&tls.compression_methods);

    let mut extensions = Vec::with_capacity(512);
    let mut padding_target = None;
    let mut grease_index = 0;
    let mut last_was_empty = false;
    for ext in &tls.extensions {
        match ext {
            ExtensionSpec::Padding { target } => {
                // Sized once everything else is known.
                padding_target = Some((*target, extensions.len()));
            }
            ExtensionSpec::Grease => {
                let slot = if grease_index == 0 {
                    GreaseSlot::Extension1
                } else {
                    GreaseSlot::Extension2
                };
                let payload: &[u8] = if grease_index == 0 { &[] } else { &[0] };
                put_extension(&mut extensions, params.grease.value(slot), payload)?;
                last_was_empty = payload.is_empty();
                grease_index += 1;
            }
            ExtensionSpec::ServerName if !sni_applicable(&params.sni) => {}
            other => {
                let id = other.id().unwrap_or_default();
                let payload = extension_payload(profile, other, params)?;
                put_extension(&mut extensions, id, &payload)?;
                last_was_empty = payload.is_empty();
            }
        }
    }

    if let Some((target, at)) = padding_target {
        // Handshake header (4) + body + extensions length (2) + extensions.
        let unpadded = 4 + body.len() + 2 + extensions.len();
        if let Some(data_len) = padding_len(unpadded, target, last_was_empty) {
            let mut padding = Vec::with_capacity(4 + data_len);
            put_extension(&mut padding, 21, &vec![0u8; data_len])?;
            extensions.splice(at..at, padding);
        }
    }

    put_u16_len(&mut body, extensions.len()).map_err(|_| encode_err("extensions too long"))?;
    body.extend_from_slice(&extensions);

    if body.len() > 0x00ff_ffff || body.len() + 4 > 0xffff {
        return Err(encode_err("ClientHello exceeds one record"));
    }

    let mut record = Vec::with_capacity(body.len() + 9);
    record.push(CONTENT_TYPE_HANDSHAKE);
    record.extend_from_slice(&tls.record_version.to_be_bytes());
    record.extend_from_slice(&((body.len() + 4) as u16).to_be_bytes());
    record.push(HANDSHAKE_CLIENT_HELLO);
    let len = body.len() as u32;
    record.extend_from_slice(&len.to_be_bytes()[1..]);
    record.extend_from_slice(&body);
    Ok(record)
}

/// RFC 7685 padding data length for a hello of `unpadded` bytes, or `None`
/// when no padding extension is sent. Hellos between 256 and `target`
/// bytes are padded up to `target`. A hello whose last extension is empty
/// gets at least one padding byte.
fn padding_len(unpadded: usize, target: usize, last_was_empty: bool) -> Option<usize> {
    let mut len = unpadded;
    let mut padding = None;
    if last_was_empty {
        padding = Some(1);
        len += 4 + 1;
    }
    if len > 0xff && len < target {
        if padding.is_some() {
            len -= 4 + 1;
        }
        let remaining = target - len;
        padding = Some(if remaining >= 4 + 1 { remaining - 4 } else { 1 });
    }
    padding
}

fn resolve(list: &[CodePoint], grease: u16) -> Vec<u16> {
    list.iter()
        .map(|cp| cp.value().unwrap_or(grease))
        .collect()
}

fn put_u16_len(out: &mut Vec<u8>, len: usize) -> Result<(), ()> {
    let len = u16::try_from(len).map_err(|_| ())?;
    out.extend_from_slice(&len.to_be_bytes());
    Ok(())
}

fn put_u8_len(out: &mut Vec<u8>, len: usize) -> Result<(), ()> {
    let len = u8::try_from(len).map_err(|_| ())?;
    out.push(len);
    Ok(())
}

fn put_extension(out: &mut Vec<u8>, id: u16, payload: &[u8]) -> Result<(), NetError> {
    out.extend_from_slice(&id.to_be_bytes());
    put_u16_len(out, payload.len())
        .map_err(|_| NetError::ProfileEncodeError(format!("extension {} payload too long", id)))?;
    out.extend_from_slice(payload);
    Ok(())
}

fn protocol_list(protocols: &[String]) -> Result<Vec<u8>, ()> {
    let mut list = Vec::new();
    for p in protocols {
        put_u8_len(&mut list, p.len())?;
        list.extend_from_slice(p.as_bytes());
    }
    let mut out = Vec::with_capacity(list.len() + 2);
    put_u16_len(&mut out, list.len())?;
    out.extend_from_slice(&list);
    Ok(out)
}

fn u16_list(values: &[u16], wide_len: bool) -> Result<Vec<u8>, ()> {
    let mut out = Vec::with_capacity(values.len() * 2 + 2);
    if wide_len {
        put_u16_len(&mut out, values.len() * 2)?;
    } else {
        put_u8_len(&mut out, values.len() * 2)?;
    }
    for v in values {
        out.extend_from_slice(&v.to_be_bytes());
    }
    Ok(out)
}

fn u8_list(values: &[u8]) -> Result<Vec<u8>, ()> {
    let mut out = Vec::with_capacity(values.len() + 1);
    put_u8_len(&mut out, values.len())?;
    out.extend_from_slice(values);
    Ok(out)
}

fn extension_payload(
    profile: &Profile,
    ext: &ExtensionSpec,
    params: &HelloParams,
) -> Result<Vec<u8>, NetError> {
    let id = ext.id().unwrap_or_default();
    let too_long = |_| NetError::ProfileEncodeError(format!("{}: extension {} too long", profile.id, id));
    let grease_group = params.grease.value(GreaseSlot::Group);

    let payload = match ext {
        ExtensionSpec::ServerName => {
            let host = params.sni.as_bytes();
            let mut entry = vec![0u8];
            put_u16_len(&mut entry, host.len()).map_err(too_long)?;
            entry.extend_from_slice(host);
            let mut out = Vec::with_capacity(entry.len() + 2);
            put_u16_len(&mut out, entry.len()).map_err(too_long)?;
            out.extend_from_slice(&entry);
            out
        }
        ExtensionSpec::ExtendedMasterSecret
        | ExtensionSpec::SessionTicket
        | ExtensionSpec::SignedCertificateTimestamp => Vec::new(),
        ExtensionSpec::RenegotiationInfo => vec![0],
        ExtensionSpec::StatusRequest => vec![1, 0, 0, 0, 0],
        ExtensionSpec::SupportedGroups { groups } => {
            u16_list(&resolve(groups, grease_group), true).map_err(too_long)?
        }
        ExtensionSpec::EcPointFormats { formats } => u8_list(formats).map_err(too_long)?,
        ExtensionSpec::Alpn { protocols } | ExtensionSpec::ApplicationSettings { protocols } => {
            protocol_list(protocols).map_err(too_long)?
        }
        ExtensionSpec::SignatureAlgorithms { algorithms }
        | ExtensionSpec::DelegatedCredentials { algorithms } => {
            u16_list(algorithms, true).map_err(too_long)?
        }
        ExtensionSpec::KeyShare { groups } => {
            let mut shares = Vec::new();
            for g in groups {
                match g {
                    CodePoint::Grease => {
                        shares.extend_from_slice(&grease_group.to_be_bytes());
                        shares.extend_from_slice(&[0, 1, 0]);
                    }
                    CodePoint::Value(id) => {
                        let key = params.key_shares.get(id).ok_or_else(|| {
                            NetError::ProfileEncodeError(format!(
                                "{}: no key share material for group {}",
                                profile.id, id
                            ))
                        })?;
                        shares.extend_from_slice(&id.to_be_bytes());
                        put_u16_len(&mut shares, key.len()).map_err(too_long)?;
                        shares.extend_from_slice(key);
                    }
                }
            }
            let mut out = Vec::with_capacity(shares.len() + 2);
            put_u16_len(&mut out, shares.len()).map_err(too_long)?;
            out.extend_from_slice(&shares);
            out
        }
        ExtensionSpec::PskKeyExchangeModes { modes } => u8_list(modes).map_err(too_long)?,
        ExtensionSpec::SupportedVersions { versions } => {
            let grease = params.grease.value(GreaseSlot::Version);
            u16_list(&resolve(versions, grease), false).map_err(too_long)?
        }
        ExtensionSpec::CompressCertificate { algorithms } => {
            u16_list(algorithms, false).map_err(too_long)?
        }
        ExtensionSpec::RecordSizeLimit { limit } => limit.to_be_bytes().to_vec(),
        ExtensionSpec::Raw { data, .. } => data.clone(),
        ExtensionSpec::Grease | ExtensionSpec::Padding { .. } => Vec::new(),
    };
    Ok(payload)
}
