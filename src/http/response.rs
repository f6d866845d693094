//! HTTP responses: the raw engine output and the user-facing wrapper.

use crate::base::neterror::NetError;
use crate::cookies::canonical_cookie::CanonicalCookie;
use crate::http::decoder;
use bytes::Bytes;
use http::{StatusCode, Version};
use std::sync::OnceLock;
use url::Url;

/// A complete response as produced by the H1 or H2 engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub reason: String,
    pub version: Version,
    /// Headers in server order.
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(status: u16, version: Version, headers: Vec<(String, String)>, body: Bytes) -> Self {
        let reason = StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or_default()
            .to_string();
        Self {
            status,
            reason,
            version,
            headers,
            body,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// HTTP response with lazily decoded body.
#[derive(Debug)]
pub struct Response {
    raw: RawResponse,
    url: Url,
    method: String,
    request_cookies: String,
    cookies: Vec<CanonicalCookie>,
    decoded: OnceLock<Result<Bytes, NetError>>,
}

impl Response {
    pub fn new(
        raw: RawResponse,
        url: Url,
        method: String,
        request_cookies: String,
        cookies: Vec<CanonicalCookie>,
    ) -> Self {
        Self {
            raw,
            url,
            method,
            request_cookies,
            cookies,
            decoded: OnceLock::new(),
        }
    }

    pub fn status(&self) -> u16 {
        self.raw.status
    }

    /// Status line text, e.g. `200 OK`.
    pub fn status_text(&self) -> String {
        if self.raw.reason.is_empty() {
            self.raw.status.to_string()
        } else {
            format!("{} {}", self.raw.status, self.raw.reason)
        }
    }

    pub fn version(&self) -> Version {
        self.raw.version
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.raw.headers
    }

    /// First value of `name`, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.raw.header(name)
    }

    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.raw
            .headers
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Cookies parsed from `Set-Cookie`.
    pub fn cookies(&self) -> &[CanonicalCookie] {
        &self.cookies
    }

    /// The `Cookie` header that was sent, empty if none.
    pub fn request_cookies(&self) -> &str {
        &self.request_cookies
    }

    /// The request URL. Redirects are not followed, so this is also the
    /// final URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Body bytes as received.
    pub fn raw_body(&self) -> &Bytes {
        &self.raw.body
    }

    /// Body decoded per `Content-Encoding`, computed once.
    pub fn body_decoded(&self) -> Result<Bytes, NetError> {
        self.decoded
            .get_or_init(|| {
                let encoding = self.header("content-encoding").unwrap_or("identity");
                decoder::decode(encoding, &self.raw.body)
            })
            .clone()
    }

    /// Body decoded with an explicit coding, ignoring the header.
    pub fn body_with_encoding(&self, encoding: &str) -> Result<Bytes, NetError> {
        decoder::decode(encoding, &self.raw.body)
    }

    /// Decoded body as UTF-8, lossily.
    pub fn text(&self) -> Result<String, NetError> {
        let body = self.body_decoded()?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    #[cfg(feature = "json")]
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, NetError> {
        let body = self.body_decoded()?;
        serde_json::from_slice(&body).map_err(|e| NetError::ContentDecodingFailed(e.to_string()))
    }

    pub fn into_raw(self) -> RawResponse {
        self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn response(headers: Vec<(String, String)>, body: Bytes) -> Response {
        Response::new(
            RawResponse::new(200, Version::HTTP_11, headers, body),
            Url::parse("https://example.com/a").unwrap(),
            "GET".into(),
            "a=1".into(),
            Vec::new(),
        )
    }

    #[test]
    fn test_status_text() {
        let r = response(Vec::new(), Bytes::new());
        assert_eq!(r.status_text(), "200 OK");
        assert_eq!(r.request_cookies(), "a=1");
        assert_eq!(r.url().as_str(), "https://example.com/a");
    }

    #[test]
    fn test_gzip_body_decoded_lazily() {
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
        enc.write_all(br#"{"ok":true}"#).unwrap();
        let raw = Bytes::from(enc.finish().unwrap());
        let r = response(
            vec![("Content-Encoding".into(), "gzip".into())],
            raw.clone(),
        );
        assert_eq!(r.raw_body(), &raw);
        assert_eq!(r.text().unwrap(), r#"{"ok":true}"#);
        assert_eq!(r.body_decoded().unwrap(), Bytes::from_static(br#"{"ok":true}"#));
    }

    #[test]
    fn test_decode_error_on_access() {
        let r = response(
            vec![("content-encoding".into(), "zstd".into())],
            Bytes::from_static(b"xx"),
        );
        assert_eq!(r.status(), 200);
        assert!(matches!(r.text(), Err(NetError::UnknownContentEncoding(_))));
        assert_eq!(&r.body_with_encoding("identity").unwrap()[..], b"xx");
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_json() {
        #[derive(serde::Deserialize)]
        struct Ok_ {
            ok: bool,
        }
        let r = response(Vec::new(), Bytes::from_static(br#"{"ok":true}"#));
        assert!(r.json::<Ok_>().unwrap().ok);
    }

    #[test]
    fn test_header_values() {
        let r = response(
            vec![
                ("Set-Cookie".into(), "a=1".into()),
                ("set-cookie".into(), "b=2".into()),
            ],
            Bytes::new(),
        );
        assert_eq!(r.header_values("SET-COOKIE").collect::<Vec<_>>(), vec!["a=1", "b=2"]);
    }
}
