use crate::base::neterror::NetError;
use crate::http::orderedheaders::HeaderList;
use crate::http::requestbody::RequestBody;
use tokio_util::sync::CancellationToken;
use url::Url;

/// A request ready for the round tripper.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    pub method: String,
    pub headers: HeaderList,
    /// Overrides the `Host` header and `:authority`, not the dialed host or SNI.
    pub host: Option<String>,
    pub body: RequestBody,
    /// Per-request header order, taking precedence over client and profile.
    pub header_order: Option<Vec<String>>,
    /// Extra `name=value` pairs sent after the jar's cookies.
    pub cookies: Vec<(String, String)>,
    pub cancel: Option<CancellationToken>,
}

impl Request {
    /// Validate the method token and URL.
    pub fn new(method: &str, url: Url) -> Result<Self, NetError> {
        let method = http::Method::from_bytes(method.as_bytes())
            .map_err(|_| NetError::InvalidOptions(format!("bad method {:?}", method)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(NetError::InvalidUrl(format!(
                "unsupported scheme {:?}",
                url.scheme()
            )));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(NetError::InvalidUrl(format!("{} has no host", url)));
        }
        Ok(Self {
            url,
            method: method.as_str().to_string(),
            headers: HeaderList::new(),
            host: None,
            body: RequestBody::Empty,
            header_order: None,
            cookies: Vec::new(),
            cancel: None,
        })
    }

    pub fn parse(method: &str, url: &str) -> Result<Self, NetError> {
        let url = Url::parse(url).map_err(|e| NetError::InvalidUrl(format!("{}: {}", url, e)))?;
        Self::new(method, url)
    }

    pub fn is_https(&self) -> bool {
        self.url.scheme() == "https"
    }

    /// Dialed host, without IPv6 brackets.
    pub fn host_str(&self) -> &str {
        self.url
            .host_str()
            .unwrap_or_default()
            .trim_start_matches('[')
            .trim_end_matches(']')
    }

    pub fn port(&self) -> u16 {
        self.url
            .port_or_known_default()
            .unwrap_or(if self.is_https() { 443 } else { 80 })
    }

    /// `host[:port]`, the port omitted when it is the scheme default.
    pub fn authority(&self) -> String {
        if let Some(host) = &self.host {
            return host.clone();
        }
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    /// Origin-form request target.
    pub fn target(&self) -> String {
        match self.url.query() {
            Some(q) => format!("{}?{}", self.url.path(), q),
            None => self.url.path().to_string(),
        }
    }

    /// The request's token, or a fresh one that is never cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authority_and_target() {
        let req = Request::parse("get", "https://example.com:8443/a/b?q=1").unwrap();
        assert_eq!(req.method, "get");
        assert_eq!(req.authority(), "example.com:8443");
        assert_eq!(req.target(), "/a/b?q=1");
        assert_eq!(req.port(), 8443);

        let req = Request::parse("GET", "http://[::1]/").unwrap();
        assert_eq!(req.host_str(), "::1");
        assert_eq!(req.authority(), "[::1]");
        assert_eq!(req.port(), 80);
    }

    #[test]
    fn test_host_override() {
        let mut req = Request::parse("GET", "https://10.0.0.1/").unwrap();
        req.host = Some("www.example.com".into());
        assert_eq!(req.authority(), "www.example.com");
        assert_eq!(req.host_str(), "10.0.0.1");
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(
            Request::parse("GET", "ftp://example.com/"),
            Err(NetError::InvalidUrl(_))
        ));
        assert!(matches!(
            Request::parse("BAD METHOD", "https://example.com/"),
            Err(NetError::InvalidOptions(_))
        ));
        assert!(matches!(Request::parse("GET", "nope"), Err(NetError::InvalidUrl(_))));
    }
}
