//! HTTP/2 SETTINGS configuration for browser fingerprinting.
//!
//! Anti-bot systems fingerprint the SETTINGS frame as an ordered list of
//! (identifier, value) pairs, so the list is kept exactly as configured:
//! order is preserved and duplicates are allowed.

use serde::{Deserialize, Serialize};

/// SETTINGS_HEADER_TABLE_SIZE (0x1)
pub const HEADER_TABLE_SIZE: u16 = 0x1;
/// SETTINGS_ENABLE_PUSH (0x2)
pub const ENABLE_PUSH: u16 = 0x2;
/// SETTINGS_MAX_CONCURRENT_STREAMS (0x3)
pub const MAX_CONCURRENT_STREAMS: u16 = 0x3;
/// SETTINGS_INITIAL_WINDOW_SIZE (0x4)
pub const INITIAL_WINDOW_SIZE: u16 = 0x4;
/// SETTINGS_MAX_FRAME_SIZE (0x5)
pub const MAX_FRAME_SIZE: u16 = 0x5;
/// SETTINGS_MAX_HEADER_LIST_SIZE (0x6)
pub const MAX_HEADER_LIST_SIZE: u16 = 0x6;

/// RFC 7540 defaults.
pub const DEFAULT_HEADER_TABLE_SIZE: u32 = 4096;
pub const DEFAULT_INITIAL_WINDOW_SIZE: u32 = 65_535;
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16_384;
pub const MAX_ALLOWED_FRAME_SIZE: u32 = 16_777_215;
pub const MAX_WINDOW_SIZE: u32 = 0x7fff_ffff;

/// An HTTP/2 pseudo-header. The order in which these are emitted is part
/// of the fingerprint (Chrome `m,a,s,p`, Firefox `m,p,a,s`, Safari `m,s,p,a`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PseudoHeader {
    #[serde(rename = ":method")]
    Method,
    #[serde(rename = ":authority")]
    Authority,
    #[serde(rename = ":scheme")]
    Scheme,
    #[serde(rename = ":path")]
    Path,
}

impl PseudoHeader {
    pub fn as_str(&self) -> &'static str {
        match self {
            PseudoHeader::Method => ":method",
            PseudoHeader::Authority => ":authority",
            PseudoHeader::Scheme => ":scheme",
            PseudoHeader::Path => ":path",
        }
    }

    /// `:method, :authority, :scheme, :path`
    pub fn default_order() -> Vec<PseudoHeader> {
        vec![
            PseudoHeader::Method,
            PseudoHeader::Authority,
            PseudoHeader::Scheme,
            PseudoHeader::Path,
        ]
    }
}

/// Ordered HTTP/2 SETTINGS list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct H2Settings {
    entries: Vec<(u16, u32)>,
}

impl H2Settings {
    pub fn new(entries: Vec<(u16, u32)>) -> Self {
        Self { entries }
    }

    /// Entries in emission order.
    pub fn entries(&self) -> &[(u16, u32)] {
        &self.entries
    }

    /// The effective value of a setting: the last occurrence wins, as a
    /// receiver processes the list in order.
    pub fn get(&self, id: u16) -> Option<u32> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| *k == id)
            .map(|(_, v)| *v)
    }

    pub fn initial_window_size(&self) -> u32 {
        self.get(INITIAL_WINDOW_SIZE)
            .unwrap_or(DEFAULT_INITIAL_WINDOW_SIZE)
    }

    pub fn header_table_size(&self) -> u32 {
        self.get(HEADER_TABLE_SIZE).unwrap_or(DEFAULT_HEADER_TABLE_SIZE)
    }

    pub fn max_frame_size(&self) -> u32 {
        self.get(MAX_FRAME_SIZE).unwrap_or(DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// SETTINGS frame payload: six bytes per entry, big-endian.
    pub fn payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.entries.len() * 6);
        for (id, value) in &self.entries {
            out.extend_from_slice(&id.to_be_bytes());
            out.extend_from_slice(&value.to_be_bytes());
        }
        out
    }
}

impl From<Vec<(u16, u32)>> for H2Settings {
    fn from(entries: Vec<(u16, u32)>) -> Self {
        Self::new(entries)
    }
}
