use crate::base::neterror::NetError;
use base64::{engine::general_purpose, Engine as _};
use percent_encoding::percent_decode_str;
use url::Url;
use zeroize::Zeroizing;

/// Proxy protocol type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyType {
    /// HTTP proxy, tunnelled with CONNECT.
    Http,
    /// CONNECT over TLS to the proxy.
    Https,
    /// SOCKS5. `remote_dns` is set for `socks5h`.
    Socks5 { remote_dns: bool },
}

/// Upstream proxy with optional credentials.
#[derive(Clone)]
pub struct ProxySettings {
    pub kind: ProxyType,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    /// Zeroized on drop.
    pub password: Option<Zeroizing<String>>,
}

impl std::fmt::Debug for ProxySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxySettings")
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl PartialEq for ProxySettings {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.host == other.host
            && self.port == other.port
            && self.username == other.username
            && self.password.as_deref() == other.password.as_deref()
    }
}

impl Eq for ProxySettings {}

impl ProxySettings {
    /// Parse `scheme://[user[:password]@]host[:port]` where scheme is
    /// `http`, `https`, `socks5` or `socks5h`.
    pub fn parse(proxy_url: &str) -> Result<Self, NetError> {
        let bad = |why: &str| NetError::BadProxyUrl(format!("{}: {}", redact(proxy_url), why));
        let url = Url::parse(proxy_url).map_err(|e| bad(&e.to_string()))?;

        let kind = match url.scheme() {
            "http" => ProxyType::Http,
            "https" => ProxyType::Https,
            "socks5" => ProxyType::Socks5 { remote_dns: false },
            "socks5h" => ProxyType::Socks5 { remote_dns: true },
            other => return Err(bad(&format!("unsupported scheme {:?}", other))),
        };
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| bad("missing host"))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = url.port().unwrap_or(match kind {
            ProxyType::Http => 80,
            ProxyType::Https => 443,
            ProxyType::Socks5 { .. } => 1080,
        });

        let username = Some(url.username())
            .filter(|u| !u.is_empty())
            .map(|u| percent_decode_str(u).decode_utf8_lossy().into_owned());
        let password = url
            .password()
            .map(|p| Zeroizing::new(percent_decode_str(p).decode_utf8_lossy().into_owned()));

        Ok(Self {
            kind,
            host,
            port,
            username,
            password,
        })
    }

    /// Add authentication credentials.
    pub fn with_auth(mut self, user: &str, pass: &str) -> Self {
        self.username = Some(user.to_string());
        self.password = Some(Zeroizing::new(pass.to_string()));
        self
    }

    /// `Proxy-Authorization` header value for HTTP proxies.
    pub fn basic_auth(&self) -> Option<Zeroizing<String>> {
        let user = self.username.as_deref()?;
        let pass = self.password.as_deref().map(String::as_str).unwrap_or("");
        let creds = Zeroizing::new(format!("{}:{}", user, pass));
        Some(Zeroizing::new(format!(
            "Basic {}",
            general_purpose::STANDARD.encode(creds.as_bytes())
        )))
    }

    /// Username/password pair for SOCKS5 (RFC 1929).
    pub fn socks5_auth(&self) -> Option<(&str, &str)> {
        let user = self.username.as_deref()?;
        Some((user, self.password.as_deref().map(String::as_str).unwrap_or("")))
    }

    /// A credential-free identity used in pool keys and logs.
    pub fn key(&self) -> String {
        let scheme = match self.kind {
            ProxyType::Http => "http",
            ProxyType::Https => "https",
            ProxyType::Socks5 { remote_dns: false } => "socks5",
            ProxyType::Socks5 { remote_dns: true } => "socks5h",
        };
        match &self.username {
            Some(user) => format!("{}://{}@{}:{}", scheme, user, self.host, self.port),
            None => format!("{}://{}:{}", scheme, self.host, self.port),
        }
    }
}

/// Strip any password from a proxy URL for error messages.
fn redact(proxy_url: &str) -> String {
    match Url::parse(proxy_url) {
        Ok(mut url) if url.password().is_some() => {
            let _ = url.set_password(Some("***"));
            url.to_string()
        }
        Ok(url) => url.to_string(),
        Err(_) => "<unparsable>".to_string(),
    }
}
