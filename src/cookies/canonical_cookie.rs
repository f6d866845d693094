use crate::cookies::psl;
use std::net::IpAddr;
use thiserror::Error;
use time::OffsetDateTime;
use url::Url;

/// Represents a cookie as stored in the jar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalCookie {
    pub name: String,
    pub value: String,
    /// Lowercase, without a leading dot.
    pub domain: String,
    pub path: String,
    pub creation_time: OffsetDateTime,
    /// Absolute expiry; `None` for session cookies.
    pub expiration_time: Option<OffsetDateTime>,
    /// Max-Age in seconds as sent by the server.
    pub max_age: Option<i64>,
    pub last_access_time: OffsetDateTime,
    pub secure: bool,
    pub http_only: bool,
    pub host_only: bool,
    pub same_site: SameSite,
    /// The `Set-Cookie` value this cookie came from, or its serialization.
    pub raw: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Unspecified,
    NoRestriction,
    Lax,
    Strict,
}

/// Why a `Set-Cookie` line was not stored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CookieRejected {
    #[error("malformed Set-Cookie")]
    Malformed,
    #[error("URL has no host")]
    NoHost,
    #[error("Domain attribute is a public suffix")]
    PublicSuffix,
    #[error("Domain attribute does not match the host")]
    DomainMismatch,
    #[error("cookie prefix requirements not met")]
    InvalidPrefix,
}

/// RFC 6265 §5.1.3.
pub fn domain_matches(host: &str, domain: &str) -> bool {
    if host.eq_ignore_ascii_case(domain) {
        return true;
    }
    if host.parse::<IpAddr>().is_ok() || host.len() <= domain.len() {
        return false;
    }
    let split = host.len() - domain.len();
    host.is_char_boundary(split)
        && host[split..].eq_ignore_ascii_case(domain)
        && host.as_bytes()[split - 1] == b'.'
}

/// RFC 6265 §5.1.4 path matching.
pub fn path_matches(cookie_path: &str, request_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    if let Some(rest) = request_path.strip_prefix(cookie_path) {
        return cookie_path.ends_with('/') || rest.starts_with('/');
    }
    false
}

/// RFC 6265 §5.1.4 default-path.
pub fn default_path(request_path: &str) -> String {
    if !request_path.starts_with('/') {
        return "/".to_string();
    }
    match request_path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => request_path[..i].to_string(),
    }
}

impl CanonicalCookie {
    pub fn new(
        name: String,
        value: String,
        domain: String,
        path: String,
        creation_time: OffsetDateTime,
        expiration_time: Option<OffsetDateTime>,
    ) -> Self {
        let raw = format!("{}={}", name, value);
        Self {
            name,
            value,
            domain,
            path,
            creation_time,
            expiration_time,
            max_age: None,
            last_access_time: creation_time,
            secure: false,
            http_only: false,
            host_only: true,
            same_site: SameSite::Unspecified,
            raw,
        }
    }

    /// Parse a `Set-Cookie` value received from `url`.
    pub fn parse(url: &Url, line: &str, now: OffsetDateTime) -> Result<Self, CookieRejected> {
        let parsed = cookie::Cookie::parse(line.trim()).map_err(|_| CookieRejected::Malformed)?;
        if parsed.name().is_empty() {
            return Err(CookieRejected::Malformed);
        }
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or(CookieRejected::NoHost)?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_ascii_lowercase();

        let attr = parsed
            .domain()
            .map(|d| d.trim_start_matches('.').to_ascii_lowercase())
            .filter(|d| !d.is_empty());
        let (domain, host_only) = match attr {
            None => (host.clone(), true),
            Some(d) if psl::is_public_suffix(&d) => {
                // A public suffix is only acceptable as the exact host.
                if d == host {
                    (host.clone(), true)
                } else {
                    return Err(CookieRejected::PublicSuffix);
                }
            }
            Some(d) => {
                if !domain_matches(&host, &d) {
                    return Err(CookieRejected::DomainMismatch);
                }
                (d, false)
            }
        };

        let path = match parsed.path() {
            Some(p) if p.starts_with('/') => p.to_string(),
            _ => default_path(url.path()),
        };

        let max_age = parsed.max_age().map(|d| d.whole_seconds());
        let expiration_time = match max_age {
            Some(secs) if secs <= 0 => Some(OffsetDateTime::UNIX_EPOCH),
            Some(secs) => Some(now + time::Duration::seconds(secs)),
            None => parsed.expires().and_then(|e| e.datetime()),
        };

        let same_site = match parsed.same_site() {
            Some(cookie::SameSite::Lax) => SameSite::Lax,
            Some(cookie::SameSite::Strict) => SameSite::Strict,
            Some(cookie::SameSite::None) => SameSite::NoRestriction,
            None => SameSite::Unspecified,
        };

        let cookie = CanonicalCookie {
            name: parsed.name().to_string(),
            value: parsed.value().to_string(),
            domain,
            path,
            creation_time: now,
            expiration_time,
            max_age,
            last_access_time: now,
            secure: parsed.secure().unwrap_or(false),
            http_only: parsed.http_only().unwrap_or(false),
            host_only,
            same_site,
            raw: line.trim().to_string(),
        };
        cookie.validate_prefix(url.scheme() == "https")?;
        Ok(cookie)
    }

    pub fn is_expired(&self, current_time: OffsetDateTime) -> bool {
        self.expiration_time.is_some_and(|expiry| expiry <= current_time)
    }

    /// Whether this cookie is sent on a request to `url`.
    pub fn matches_url(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let domain_ok = if self.host_only {
            host.eq_ignore_ascii_case(&self.domain)
        } else {
            domain_matches(host, &self.domain)
        };
        domain_ok && path_matches(&self.path, url.path()) && (!self.secure || url.scheme() == "https")
    }

    /// `__Secure-` and `__Host-` prefix rules.
    pub fn validate_prefix(&self, secure_origin: bool) -> Result<(), CookieRejected> {
        if self.name.starts_with("__Secure-") && (!self.secure || !secure_origin) {
            return Err(CookieRejected::InvalidPrefix);
        }
        if self.name.starts_with("__Host-")
            && (!self.secure || self.path != "/" || !self.host_only || !secure_origin)
        {
            return Err(CookieRejected::InvalidPrefix);
        }
        Ok(())
    }
}
