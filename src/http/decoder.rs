//! Content-Encoding decoding.

use crate::base::neterror::NetError;
use bytes::Bytes;
use std::io::Read;

/// Value sent when the caller did not set `Accept-Encoding`.
pub const DEFAULT_ACCEPT_ENCODING: &str = "gzip, deflate, br";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coding {
    Gzip,
    Deflate,
    Brotli,
    Identity,
}

impl Coding {
    pub fn parse(name: &str) -> Result<Self, NetError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => Ok(Coding::Gzip),
            "deflate" => Ok(Coding::Deflate),
            "br" => Ok(Coding::Brotli),
            "identity" | "" => Ok(Coding::Identity),
            other => Err(NetError::UnknownContentEncoding(other.to_string())),
        }
    }

    fn decode(self, data: &[u8]) -> Result<Vec<u8>, NetError> {
        let failed = |e: std::io::Error| NetError::ContentDecodingFailed(format!("{:?}: {}", self, e));
        let mut out = Vec::with_capacity(data.len() * 3);
        match self {
            Coding::Identity => out.extend_from_slice(data),
            Coding::Gzip => {
                flate2::read::MultiGzDecoder::new(data)
                    .read_to_end(&mut out)
                    .map_err(failed)?;
            }
            Coding::Deflate => {
                // Servers send both zlib-wrapped and raw deflate.
                if flate2::read::ZlibDecoder::new(data)
                    .read_to_end(&mut out)
                    .is_err()
                {
                    out.clear();
                    flate2::read::DeflateDecoder::new(data)
                        .read_to_end(&mut out)
                        .map_err(failed)?;
                }
            }
            Coding::Brotli => {
                brotli::Decompressor::new(data, 4096)
                    .read_to_end(&mut out)
                    .map_err(failed)?;
            }
        }
        Ok(out)
    }
}

/// Decode `raw` according to a `Content-Encoding` header value. Codings are
/// undone from the last applied to the first.
pub fn decode(encoding: &str, raw: &Bytes) -> Result<Bytes, NetError> {
    if raw.is_empty() {
        return Ok(raw.clone());
    }
    let codings = encoding
        .split(',')
        .map(Coding::parse)
        .collect::<Result<Vec<_>, _>>()?;
    if codings.iter().all(|c| *c == Coding::Identity) {
        return Ok(raw.clone());
    }

    let mut data = raw.to_vec();
    for coding in codings.into_iter().rev() {
        data = coding.decode(&data)?;
    }
    Ok(Bytes::from(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    fn brotli(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut enc = brotli::CompressorWriter::new(&mut out, 4096, 5, 22);
            enc.write_all(data).unwrap();
        }
        out
    }

    #[test]
    fn test_gzip() {
        let raw = Bytes::from(gzip(br#"{"ok":true}"#));
        assert_eq!(&decode("gzip", &raw).unwrap()[..], br#"{"ok":true}"#);
        assert_eq!(&decode("X-Gzip", &raw).unwrap()[..], br#"{"ok":true}"#);
    }

    #[test]
    fn test_deflate_zlib_and_raw() {
        let mut z = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        z.write_all(b"zlib body").unwrap();
        let zlib = Bytes::from(z.finish().unwrap());
        assert_eq!(&decode("deflate", &zlib).unwrap()[..], b"zlib body");

        let mut d = flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
        d.write_all(b"raw body").unwrap();
        let raw = Bytes::from(d.finish().unwrap());
        assert_eq!(&decode("deflate", &raw).unwrap()[..], b"raw body");
    }

    #[test]
    fn test_brotli() {
        let raw = Bytes::from(brotli(b"brotli body"));
        assert_eq!(&decode("br", &raw).unwrap()[..], b"brotli body");
    }

    #[test]
    fn test_chain_applied_in_reverse() {
        // Content-Encoding: gzip, br means gzip first, then br.
        let raw = Bytes::from(brotli(&gzip(b"layered")));
        assert_eq!(&decode("gzip, br", &raw).unwrap()[..], b"layered");
    }

    #[test]
    fn test_identity_and_empty_pass_through() {
        let raw = Bytes::from_static(b"plain");
        assert_eq!(decode("identity", &raw).unwrap(), raw);
        assert_eq!(decode("", &raw).unwrap(), raw);
        assert!(decode("gzip", &Bytes::new()).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_and_corrupt() {
        let raw = Bytes::from_static(b"data");
        assert_eq!(
            decode("zstd", &raw).unwrap_err(),
            NetError::UnknownContentEncoding("zstd".into())
        );
        assert!(matches!(
            decode("gzip", &raw).unwrap_err(),
            NetError::ContentDecodingFailed(_)
        ));
    }
}
