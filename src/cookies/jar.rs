use crate::cookies::canonical_cookie::{CanonicalCookie, CookieRejected};
use dashmap::DashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::warn;
use url::Url;

/// Maximum cookies per domain.
const MAX_COOKIES_PER_DOMAIN: usize = 50;

/// Per-client RFC 6265 cookie store, keyed by cookie domain.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    store: Arc<DashMap<String, Vec<CanonicalCookie>>>,
}

/// Every suffix of `host` at a label boundary, the host itself first.
fn candidate_domains(host: &str) -> Vec<String> {
    let host = host.to_ascii_lowercase();
    let mut out = vec![host.clone()];
    if host.parse::<std::net::IpAddr>().is_ok() {
        return out;
    }
    let mut rest = host.as_str();
    while let Some(dot) = rest.find('.') {
        rest = &rest[dot + 1..];
        if !rest.is_empty() {
            out.push(rest.to_string());
        }
    }
    out
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `Set-Cookie` values received from `url`. Returns the cookies
    /// that were accepted.
    pub fn set_cookies<I, S>(&self, url: &Url, lines: I) -> Vec<CanonicalCookie>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let now = OffsetDateTime::now_utc();
        let mut accepted = Vec::new();
        for line in lines {
            match CanonicalCookie::parse(url, line.as_ref(), now) {
                Ok(cookie) => {
                    self.insert(cookie.clone(), now);
                    accepted.push(cookie);
                }
                Err(reason) => self.log_rejected(url, line.as_ref(), &reason),
            }
        }
        accepted
    }

    fn log_rejected(&self, url: &Url, line: &str, reason: &CookieRejected) {
        // The name only: values may carry credentials.
        let name = line.split('=').next().unwrap_or_default().trim();
        warn!(host = url.host_str().unwrap_or_default(), cookie = name, reason = %reason, "dropped Set-Cookie");
    }

    /// Store a prepared cookie.
    pub fn set_cookie(&self, cookie: CanonicalCookie) {
        self.insert(cookie, OffsetDateTime::now_utc());
    }

    fn insert(&self, mut cookie: CanonicalCookie, now: OffsetDateTime) {
        let mut entry = self.store.entry(cookie.domain.clone()).or_default();
        let existing = entry
            .iter()
            .position(|c| c.name == cookie.name && c.path == cookie.path);

        if cookie.is_expired(now) {
            if let Some(idx) = existing {
                entry.remove(idx);
            }
            return;
        }

        match existing {
            Some(idx) => {
                cookie.creation_time = entry[idx].creation_time;
                entry[idx] = cookie;
            }
            None => {
                if entry.len() >= MAX_COOKIES_PER_DOMAIN {
                    if let Some(oldest) = entry
                        .iter()
                        .enumerate()
                        .min_by_key(|(_, c)| c.last_access_time)
                        .map(|(i, _)| i)
                    {
                        entry.remove(oldest);
                    }
                }
                entry.push(cookie);
            }
        }
    }

    /// Cookies to send to `url`, most specific path first. Expired
    /// cookies found along the way are removed.
    pub fn cookies_for(&self, url: &Url) -> Vec<CanonicalCookie> {
        let Some(host) = url.host_str() else {
            return Vec::new();
        };
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let now = OffsetDateTime::now_utc();

        let mut result = Vec::new();
        for domain in candidate_domains(host) {
            let Some(mut entry) = self.store.get_mut(&domain) else {
                continue;
            };
            entry.retain(|c| !c.is_expired(now));
            for cookie in entry.iter_mut() {
                if cookie.matches_url(url) {
                    cookie.last_access_time = now;
                    result.push(cookie.clone());
                }
            }
        }

        result.sort_by(|a, b| {
            b.path
                .len()
                .cmp(&a.path.len())
                .then_with(|| a.creation_time.cmp(&b.creation_time))
        });
        result
    }

    /// `Cookie` header value for `url`, empty when nothing matches.
    pub fn header_value(&self, url: &Url) -> String {
        self.cookies_for(url)
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Remove every cookie named `name` visible from `url`'s host.
    pub fn remove(&self, url: &Url, name: &str) -> usize {
        let Some(host) = url.host_str() else {
            return 0;
        };
        let mut removed = 0;
        for domain in candidate_domains(host) {
            if let Some(mut entry) = self.store.get_mut(&domain) {
                let before = entry.len();
                entry.retain(|c| c.name != name);
                removed += before - entry.len();
            }
        }
        removed
    }

    pub fn reset(&self) {
        self.store.clear();
    }

    /// Every live cookie in the jar.
    pub fn all(&self) -> Vec<CanonicalCookie> {
        let now = OffsetDateTime::now_utc();
        self.store
            .iter()
            .flat_map(|entry| entry.value().clone())
            .filter(|c| !c.is_expired(now))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.store.iter().map(|e| e.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_candidate_domains() {
        assert_eq!(
            candidate_domains("a.b.example.com"),
            vec!["a.b.example.com", "b.example.com", "example.com", "com"]
        );
        assert_eq!(candidate_domains("127.0.0.1"), vec!["127.0.0.1"]);
    }

    #[test]
    fn test_set_and_get() {
        let jar = CookieJar::new();
        let accepted = jar.set_cookies(&url("https://example.com/"), ["a=1", "b=2; Path=/"]);
        assert_eq!(accepted.len(), 2);
        assert_eq!(jar.header_value(&url("https://example.com/x")), "a=1; b=2");
    }

    #[test]
    fn test_domain_cookie_visible_on_subdomain() {
        let jar = CookieJar::new();
        jar.set_cookies(&url("https://example.com/"), ["d=1; Domain=example.com", "h=1"]);
        let names: Vec<String> = jar
            .cookies_for(&url("https://www.example.com/"))
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["d"]);
    }

    #[test]
    fn test_replace_keeps_creation_time() {
        let jar = CookieJar::new();
        let u = url("https://example.com/");
        jar.set_cookies(&u, ["a=1"]);
        let first = jar.cookies_for(&u)[0].creation_time;
        jar.set_cookies(&u, ["a=2"]);
        let cookies = jar.cookies_for(&u);
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].value, "2");
        assert_eq!(cookies[0].creation_time, first);
    }

    #[test]
    fn test_sorted_by_path_length() {
        let jar = CookieJar::new();
        let u = url("https://example.com/a/b/c");
        jar.set_cookies(&u, ["root=1; Path=/", "deep=1; Path=/a/b", "mid=1; Path=/a"]);
        let names: Vec<String> = jar.cookies_for(&u).into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["deep", "mid", "root"]);
    }

    #[test]
    fn test_max_age_zero_deletes() {
        let jar = CookieJar::new();
        let u = url("https://example.com/");
        jar.set_cookies(&u, ["a=1"]);
        jar.set_cookies(&u, ["a=1; Max-Age=0"]);
        assert!(jar.cookies_for(&u).is_empty());
        assert!(jar.is_empty());
    }

    #[test]
    fn test_public_suffix_rejected() {
        let jar = CookieJar::new();
        let accepted = jar.set_cookies(&url("https://example.com/"), ["a=1; Domain=com"]);
        assert!(accepted.is_empty());
        assert!(jar.is_empty());
    }

    #[test]
    fn test_remove_and_reset() {
        let jar = CookieJar::new();
        let u = url("https://example.com/");
        jar.set_cookies(&u, ["a=1", "b=1; Path=/x"]);
        assert_eq!(jar.remove(&u, "b"), 1);
        assert_eq!(jar.all().len(), 1);
        jar.reset();
        assert!(jar.all().is_empty());
    }
}
