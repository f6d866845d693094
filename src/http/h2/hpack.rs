//! HPACK header compression (RFC 7541).
//!
//! The encoder is deterministic: the same header list fed to encoders in
//! the same state yields identical bytes, which keeps the on-the-wire
//! header block stable across connections.

use crate::base::neterror::NetError;
use crate::http::h2::huffman;
use std::collections::{HashSet, VecDeque};

/// RFC 7541 Appendix A.
pub const STATIC_TABLE: [(&str, &str); 61] = [
    (":authority", ""),
    (":method", "GET"),
    (":method", "POST"),
    (":path", "/"),
    (":path", "/index.html"),
    (":scheme", "http"),
    (":scheme", "https"),
    (":status", "200"),
    (":status", "204"),
    (":status", "206"),
    (":status", "304"),
    (":status", "400"),
    (":status", "404"),
    (":status", "500"),
    ("accept-charset", ""),
    ("accept-encoding", "gzip, deflate"),
    ("accept-language", ""),
    ("accept-ranges", ""),
    ("accept", ""),
    ("access-control-allow-origin", ""),
    ("age", ""),
    ("allow", ""),
    ("authorization", ""),
    ("cache-control", ""),
    ("content-disposition", ""),
    ("content-encoding", ""),
    ("content-language", ""),
    ("content-length", ""),
    ("content-location", ""),
    ("content-range", ""),
    ("content-type", ""),
    ("cookie", ""),
    ("date", ""),
    ("etag", ""),
    ("expect", ""),
    ("expires", ""),
    ("from", ""),
    ("host", ""),
    ("if-match", ""),
    ("if-modified-since", ""),
    ("if-none-match", ""),
    ("if-range", ""),
    ("if-unmodified-since", ""),
    ("last-modified", ""),
    ("link", ""),
    ("location", ""),
    ("max-forwards", ""),
    ("proxy-authenticate", ""),
    ("proxy-authorization", ""),
    ("range", ""),
    ("referer", ""),
    ("refresh", ""),
    ("retry-after", ""),
    ("server", ""),
    ("set-cookie", ""),
    ("strict-transport-security", ""),
    ("transfer-encoding", ""),
    ("user-agent", ""),
    ("vary", ""),
    ("via", ""),
    ("www-authenticate", ""),
];

/// Per-entry overhead in the table size accounting.
pub const ENTRY_OVERHEAD: usize = 32;

/// Append `value` as an HPACK integer with an `n`-bit prefix. `flags` holds
/// the high bits of the first octet.
pub fn encode_integer(value: usize, n: u8, flags: u8, out: &mut Vec<u8>) {
    let max = (1usize << n) - 1;
    if value < max {
        out.push(flags | value as u8);
        return;
    }
    out.push(flags | max as u8);
    let mut rest = value - max;
    while rest >= 128 {
        out.push((rest % 128) as u8 | 0x80);
        rest /= 128;
    }
    out.push(rest as u8);
}

/// Decode an `n`-bit prefix integer at `buf[*pos]`.
pub fn decode_integer(buf: &[u8], pos: &mut usize, n: u8) -> Result<usize, NetError> {
    let truncated = || NetError::CompressionError("truncated integer".to_string());
    let max = (1usize << n) - 1;
    let first = *buf.get(*pos).ok_or_else(truncated)?;
    *pos += 1;
    let mut value = (first as usize) & max;
    if value < max {
        return Ok(value);
    }
    let mut shift = 0u32;
    loop {
        let byte = *buf.get(*pos).ok_or_else(truncated)?;
        *pos += 1;
        let add = ((byte & 0x7f) as usize)
            .checked_shl(shift)
            .filter(|_| shift <= 28)
            .ok_or_else(|| NetError::CompressionError("integer overflow".to_string()))?;
        value = value
            .checked_add(add)
            .ok_or_else(|| NetError::CompressionError("integer overflow".to_string()))?;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}

fn encode_string(s: &[u8], out: &mut Vec<u8>) {
    let huff_len = huffman::encoded_len(s);
    if huff_len < s.len() {
        encode_integer(huff_len, 7, 0x80, out);
        huffman::encode(s, out);
    } else {
        encode_integer(s.len(), 7, 0, out);
        out.extend_from_slice(s);
    }
}

fn decode_string(buf: &[u8], pos: &mut usize) -> Result<String, NetError> {
    let huffman_coded = buf
        .get(*pos)
        .map(|b| b & 0x80 != 0)
        .ok_or_else(|| NetError::CompressionError("truncated string".to_string()))?;
    let len = decode_integer(buf, pos, 7)?;
    let end = pos
        .checked_add(len)
        .filter(|end| *end <= buf.len())
        .ok_or_else(|| NetError::CompressionError("truncated string".to_string()))?;
    let raw = &buf[*pos..end];
    *pos = end;
    let bytes = if huffman_coded {
        huffman::decode(raw)?
    } else {
        raw.to_vec()
    };
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// FIFO table of recently indexed fields; newest at index 62.
#[derive(Debug, Clone)]
pub struct DynamicTable {
    entries: VecDeque<(String, String)>,
    size: usize,
    max_size: usize,
}

impl DynamicTable {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            size: 0,
            max_size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
        self.evict(0);
    }

    fn evict(&mut self, incoming: usize) {
        while self.size + incoming > self.max_size {
            match self.entries.pop_back() {
                Some((n, v)) => self.size -= n.len() + v.len() + ENTRY_OVERHEAD,
                None => break,
            }
        }
    }

    pub fn insert(&mut self, name: String, value: String) {
        let entry_size = name.len() + value.len() + ENTRY_OVERHEAD;
        if entry_size > self.max_size {
            self.entries.clear();
            self.size = 0;
            return;
        }
        self.evict(entry_size);
        self.size += entry_size;
        self.entries.push_front((name, value));
    }

    /// Entry at a zero-based dynamic position.
    pub fn get(&self, idx: usize) -> Option<(&str, &str)> {
        self.entries.get(idx).map(|(n, v)| (n.as_str(), v.as_str()))
    }

    fn iter(&self) -> impl Iterator<Item = &(String, String)> {
        self.entries.iter()
    }
}

fn lookup(table: &DynamicTable, idx: usize) -> Result<(String, String), NetError> {
    if idx == 0 {
        return Err(NetError::CompressionError("index 0".to_string()));
    }
    if idx <= STATIC_TABLE.len() {
        let (n, v) = STATIC_TABLE[idx - 1];
        return Ok((n.to_string(), v.to_string()));
    }
    table
        .get(idx - STATIC_TABLE.len() - 1)
        .map(|(n, v)| (n.to_string(), v.to_string()))
        .ok_or_else(|| NetError::CompressionError(format!("index {} out of range", idx)))
}

/// Header block encoder.
#[derive(Debug, Clone)]
pub struct Encoder {
    table: DynamicTable,
    never_index: HashSet<String>,
    /// Ceiling from our own configuration.
    limit: usize,
    pending_size_update: Option<usize>,
}

impl Encoder {
    pub fn new(table_size: usize, never_index: &[String]) -> Self {
        Self {
            table: DynamicTable::new(table_size),
            never_index: never_index.iter().map(|n| n.to_ascii_lowercase()).collect(),
            limit: table_size,
            pending_size_update: None,
        }
    }

    /// Apply the peer's SETTINGS_HEADER_TABLE_SIZE.
    pub fn set_peer_table_size(&mut self, peer: usize) {
        let size = peer.min(self.limit);
        if size != self.table.max_size() {
            self.table.set_max_size(size);
            self.pending_size_update = Some(size);
        }
    }

    pub fn table(&self) -> &DynamicTable {
        &self.table
    }

    fn find(&self, name: &str, value: &str) -> (Option<usize>, Option<usize>) {
        let mut name_idx = None;
        for (i, (n, v)) in STATIC_TABLE.iter().enumerate() {
            if *n == name {
                if *v == value {
                    return (Some(i + 1), Some(i + 1));
                }
                name_idx.get_or_insert(i + 1);
            }
        }
        for (i, (n, v)) in self.table.iter().enumerate() {
            if n == name {
                let idx = STATIC_TABLE.len() + 1 + i;
                if v == value {
                    return (Some(idx), Some(idx));
                }
                name_idx.get_or_insert(idx);
            }
        }
        (None, name_idx)
    }

    /// Encode a header list, in order, into one header block.
    pub fn encode<'a, I>(&mut self, headers: I) -> Vec<u8>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut out = Vec::with_capacity(256);
        if let Some(size) = self.pending_size_update.take() {
            encode_integer(size, 5, 0x20, &mut out);
        }

        for (name, value) in headers {
            let (full, name_idx) = self.find(name, value);

            if self.never_index.contains(name) {
                match name_idx {
                    Some(idx) => encode_integer(idx, 4, 0x10, &mut out),
                    None => {
                        out.push(0x10);
                        encode_string(name.as_bytes(), &mut out);
                    }
                }
                encode_string(value.as_bytes(), &mut out);
                continue;
            }

            if let Some(idx) = full {
                encode_integer(idx, 7, 0x80, &mut out);
                continue;
            }

            match name_idx {
                Some(idx) => encode_integer(idx, 6, 0x40, &mut out),
                None => {
                    out.push(0x40);
                    encode_string(name.as_bytes(), &mut out);
                }
            }
            encode_string(value.as_bytes(), &mut out);
            self.table.insert(name.to_string(), value.to_string());
        }
        out
    }
}

/// Header block decoder.
#[derive(Debug, Clone)]
pub struct Decoder {
    table: DynamicTable,
    /// SETTINGS_HEADER_TABLE_SIZE we advertised.
    max_allowed: usize,
}

impl Decoder {
    pub fn new(max_allowed: usize) -> Self {
        Self {
            table: DynamicTable::new(max_allowed),
            max_allowed,
        }
    }

    pub fn table(&self) -> &DynamicTable {
        &self.table
    }

    /// Decode a complete header block.
    pub fn decode(&mut self, block: &[u8]) -> Result<Vec<(String, String)>, NetError> {
        let mut headers = Vec::new();
        let mut pos = 0;

        while pos < block.len() {
            let b = block[pos];
            if b & 0x80 != 0 {
                let idx = decode_integer(block, &mut pos, 7)?;
                headers.push(lookup(&self.table, idx)?);
            } else if b & 0x40 != 0 {
                let (name, value) = self.literal(block, &mut pos, 6)?;
                self.table.insert(name.clone(), value.clone());
                headers.push((name, value));
            } else if b & 0x20 != 0 {
                if !headers.is_empty() {
                    return Err(NetError::CompressionError(
                        "table size update after a header field".to_string(),
                    ));
                }
                let size = decode_integer(block, &mut pos, 5)?;
                if size > self.max_allowed {
                    return Err(NetError::CompressionError(format!(
                        "table size update {} above limit {}",
                        size, self.max_allowed
                    )));
                }
                self.table.set_max_size(size);
            } else {
                // Without indexing (0000) and never indexed (0001).
                headers.push(self.literal(block, &mut pos, 4)?);
            }
        }

        Ok(headers)
    }

    fn literal(
        &self,
        block: &[u8],
        pos: &mut usize,
        prefix: u8,
    ) -> Result<(String, String), NetError> {
        let idx = decode_integer(block, pos, prefix)?;
        let name = if idx == 0 {
            decode_string(block, pos)?
        } else {
            lookup(&self.table, idx)?.0
        };
        let value = decode_string(block, pos)?;
        Ok((name, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    #[test]
    fn test_integer_examples() {
        // RFC 7541 C.1
        let mut out = Vec::new();
        encode_integer(10, 5, 0, &mut out);
        assert_eq!(out, [0x0a]);
        out.clear();
        encode_integer(1337, 5, 0, &mut out);
        assert_eq!(out, [0x1f, 0x9a, 0x0a]);
        let mut pos = 0;
        assert_eq!(decode_integer(&out, &mut pos, 5).unwrap(), 1337);
        assert_eq!(pos, 3);
    }

    #[test]
    fn test_decode_rfc_request_sequence() {
        // RFC 7541 C.4: requests with Huffman coding, sharing one table.
        let mut dec = Decoder::new(4096);
        let first = dec
            .decode(&hex("828684418cf1e3c2e5f23a6ba0ab90f4ff"))
            .unwrap();
        assert_eq!(
            first,
            vec![
                (":method".into(), "GET".into()),
                (":scheme".into(), "http".into()),
                (":path".into(), "/".into()),
                (":authority".into(), "www.example.com".into()),
            ]
        );
        assert_eq!(dec.table().size(), 57);

        let second = dec.decode(&hex("828684be5886a8eb10649cbf")).unwrap();
        assert_eq!(second[3], (":authority".into(), "www.example.com".into()));
        assert_eq!(second[4], ("cache-control".into(), "no-cache".into()));
        assert_eq!(dec.table().size(), 110);
    }

    #[test]
    fn test_encoder_matches_rfc_bytes() {
        let mut enc = Encoder::new(4096, &[]);
        let block = enc.encode([
            (":method", "GET"),
            (":scheme", "http"),
            (":path", "/"),
            (":authority", "www.example.com"),
        ]);
        assert_eq!(block, hex("828684418cf1e3c2e5f23a6ba0ab90f4ff"));
    }

    #[test]
    fn test_encoder_is_deterministic() {
        let headers = [
            (":method", "GET"),
            (":authority", "example.com"),
            ("user-agent", "mimic/1.0"),
            ("x-custom", "1"),
        ];
        let mut a = Encoder::new(4096, &[]);
        let mut b = Encoder::new(4096, &[]);
        assert_eq!(a.encode(headers), b.encode(headers));
        // Second block reuses the table: everything is indexed now.
        let again = a.encode(headers);
        assert!(again.iter().all(|byte| byte & 0x80 != 0));
    }

    #[test]
    fn test_never_indexed_cookie() {
        let mut enc = Encoder::new(4096, &["cookie".to_string()]);
        let block = enc.encode([("cookie", "a=b")]);
        // Never-indexed literal with static name index 32.
        assert_eq!(block[0], 0x1f);
        assert_eq!(block[1], 32 - 15);
        assert!(enc.table().is_empty());

        let mut dec = Decoder::new(4096);
        assert_eq!(dec.decode(&block).unwrap(), vec![("cookie".into(), "a=b".into())]);
    }

    #[test]
    fn test_eviction_accounting() {
        let mut table = DynamicTable::new(100);
        table.insert("a".into(), "1".into()); // 34
        table.insert("b".into(), "2".into()); // 68
        table.insert("c".into(), "3".into()); // evicts "a"
        assert_eq!(table.len(), 2);
        assert_eq!(table.size(), 68);
        assert_eq!(table.get(0), Some(("c", "3")));
        table.insert("x".repeat(100), String::new());
        assert!(table.is_empty());
    }

    #[test]
    fn test_size_update_limits() {
        let mut dec = Decoder::new(4096);
        let mut block = Vec::new();
        encode_integer(8192, 5, 0x20, &mut block);
        assert!(dec.decode(&block).is_err());

        let mut enc = Encoder::new(4096, &[]);
        enc.set_peer_table_size(1024);
        let block = enc.encode([(":method", "GET")]);
        let mut expect = Vec::new();
        encode_integer(1024, 5, 0x20, &mut expect);
        expect.push(0x82);
        assert_eq!(block, expect);
    }

    #[test]
    fn test_invalid_index() {
        let mut dec = Decoder::new(4096);
        assert!(dec.decode(&[0x80]).is_err());
        assert!(dec.decode(&[0xff, 0x00]).is_err());
    }
}
