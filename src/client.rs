//! HTTP Client with builder pattern.
//!
//! # Example
//!
//! ```rust,ignore
//! use mimicnet::Client;
//!
//! let client = Client::builder()
//!     .use_tls(true)
//!     .profile("chrome-120")
//!     .timeout(std::time::Duration::from_secs(10))
//!     .build()?;
//!
//! let resp = client.get("https://example.com")
//!     .sec_headers(None)
//!     .send()
//!     .await?;
//! println!("{}", resp.status_text());
//! ```

use crate::base::neterror::NetError;
use crate::cookies::canonical_cookie::CanonicalCookie;
use crate::cookies::jar::CookieJar;
use crate::cookies::psl;
use crate::emulation::registry::ProfileRegistry;
use crate::http::decoder::DEFAULT_ACCEPT_ENCODING;
use crate::http::orderedheaders::{sec_ch_ua, HeaderFilter};
use crate::http::request::Request;
use crate::http::requestbody::RequestBody;
use crate::http::response::Response;
use crate::http::roundtripper::RoundTripper;
use crate::http::transport::{Connector, Transport};
use crate::socket::pool::{ConnectionPool, DEFAULT_MAX_IDLE_PER_HOST};
use crate::socket::proxy::ProxySettings;
use crate::socket::tls::FingerprintCheck;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

/// Chrome major version used by [`RequestBuilder::sec_headers`] when none is given.
pub const DEFAULT_SEC_CH_UA_VERSION: &str = "99";

/// Everything a [`Client`] is configured with, validated by [`Client::new`].
#[derive(Clone)]
pub struct ClientOptions {
    /// `http`, `https`, `socks5` or `socks5h`; may embed credentials.
    pub proxy_url: Option<String>,
    /// Bound on each request. Zero means none.
    pub timeout: Duration,
    /// Fingerprinted TLS with `profile_id`. When false the transport is
    /// plain HTTP/1.1, or h2c with `http2_prior_knowledge`.
    pub use_tls: bool,
    pub http2_prior_knowledge: bool,
    pub profile_id: Option<String>,
    /// Replaces the profile's SETTINGS list, order kept.
    pub h2_settings_overrides: Option<Vec<(u16, u32)>>,
    pub insecure_skip_verify: bool,
    /// Client-level header order.
    pub header_order: Option<Vec<String>>,
    pub header_filter: Option<Arc<dyn HeaderFilter>>,
    pub fingerprint_check: FingerprintCheck,
    pub max_idle_per_host: usize,
    /// Send `Accept-Encoding: gzip, deflate, br` when the request has none.
    pub auto_accept_encoding: bool,
    /// Profiles to resolve `profile_id` against; the builtin set when absent.
    pub registry: Option<Arc<ProfileRegistry>>,
    /// Parent of every request's token. Cancelling it fails every pending
    /// request with [`NetError::Cancelled`].
    pub cancel_token: Option<CancellationToken>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            proxy_url: None,
            timeout: Duration::ZERO,
            use_tls: false,
            http2_prior_knowledge: false,
            profile_id: None,
            h2_settings_overrides: None,
            insecure_skip_verify: false,
            header_order: None,
            header_filter: None,
            fingerprint_check: FingerprintCheck::default(),
            max_idle_per_host: DEFAULT_MAX_IDLE_PER_HOST,
            auto_accept_encoding: true,
            registry: None,
            cancel_token: None,
        }
    }
}

impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let proxy = self
            .proxy_url
            .as_deref()
            .map(|p| ProxySettings::parse(p).map(|s| s.key()).unwrap_or_else(|_| "<invalid>".into()));
        f.debug_struct("ClientOptions")
            .field("proxy", &proxy)
            .field("timeout", &self.timeout)
            .field("use_tls", &self.use_tls)
            .field("http2_prior_knowledge", &self.http2_prior_knowledge)
            .field("profile_id", &self.profile_id)
            .field("h2_settings_overrides", &self.h2_settings_overrides)
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .field("header_order", &self.header_order)
            .field("header_filter", &self.header_filter.is_some())
            .field("fingerprint_check", &self.fingerprint_check)
            .field("max_idle_per_host", &self.max_idle_per_host)
            .field("auto_accept_encoding", &self.auto_accept_encoding)
            .field("cancel_token", &self.cancel_token.as_ref().map(|t| t.is_cancelled()))
            .finish_non_exhaustive()
    }
}

/// Attributes for [`Client::set_custom_cookie`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieSpec {
    pub name: String,
    pub value: String,
    /// Host-only when absent.
    pub domain: Option<String>,
    /// Defaults to `/`.
    pub path: Option<String>,
    pub expires: Option<OffsetDateTime>,
    /// Seconds; takes precedence over `expires`.
    pub max_age: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
}

impl CookieSpec {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            ..Default::default()
        }
    }

    fn to_set_cookie(&self) -> String {
        let mut builder = cookie::Cookie::build((self.name.clone(), self.value.clone()))
            .path(self.path.clone().unwrap_or_else(|| "/".to_string()))
            .secure(self.secure)
            .http_only(self.http_only);
        if let Some(domain) = &self.domain {
            builder = builder.domain(domain.clone());
        }
        if let Some(expires) = self.expires {
            builder = builder.expires(expires);
        }
        if let Some(max_age) = self.max_age {
            builder = builder.max_age(time::Duration::seconds(max_age));
        }
        builder.build().to_string()
    }
}

struct ClientInner {
    round_tripper: RoundTripper,
    jar: CookieJar,
    header_filter: Option<Arc<dyn HeaderFilter>>,
    auto_accept_encoding: bool,
}

/// HTTP Client for making requests.
///
/// Cheap to clone; clones share the pool and the cookie jar.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("transport", self.transport())
            .field("proxy", &self.inner.round_tripper.proxy().map(|p| p.key()))
            .field("pool", self.pool())
            .field("cookies", &self.inner.jar.len())
            .finish()
    }
}

fn parse_url(url: &str) -> Result<Url, NetError> {
    Url::parse(url).map_err(|e| NetError::InvalidUrl(format!("{}: {}", url, e)))
}

impl Client {
    /// Validate `options` and build the client.
    pub fn new(options: ClientOptions) -> Result<Self, NetError> {
        let registry = match options.registry.clone() {
            Some(registry) => registry,
            None => Arc::new(ProfileRegistry::builtin()?),
        };
        let profile = options
            .profile_id
            .as_deref()
            .map(|id| registry.get(id))
            .transpose()?;

        let transport = if options.use_tls {
            Transport::Fingerprinted(profile.ok_or(NetError::MissingProfile)?)
        } else if options.http2_prior_knowledge {
            Transport::PlainH2
        } else {
            Transport::PlainH1
        };

        let proxy = options
            .proxy_url
            .as_deref()
            .map(ProxySettings::parse)
            .transpose()?;

        let connector = Connector::new(
            transport,
            options.insecure_skip_verify,
            options.fingerprint_check,
            options.h2_settings_overrides.as_deref(),
        )?;
        let round_tripper =
            RoundTripper::new(connector, ConnectionPool::new(options.max_idle_per_host), proxy)
                .with_timeout(options.timeout)
                .with_header_order(options.header_order.clone())
                .with_cancel_token(options.cancel_token.clone().unwrap_or_default());

        debug!(options = ?options, "client created");
        Ok(Self {
            inner: Arc::new(ClientInner {
                round_tripper,
                jar: CookieJar::new(),
                header_filter: options.header_filter,
                auto_accept_encoding: options.auto_accept_encoding,
            }),
        })
    }

    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn transport(&self) -> &Transport {
        self.inner.round_tripper.connector().transport()
    }

    pub fn pool(&self) -> &ConnectionPool {
        self.inner.round_tripper.pool()
    }

    pub fn cookie_jar(&self) -> &CookieJar {
        &self.inner.jar
    }

    /// The client-wide token. Cancelling it fails every pending request.
    pub fn cancel_token(&self) -> &CancellationToken {
        self.inner.round_tripper.cancel_token()
    }

    /// Route later requests through `proxy_url`, or directly when `None`.
    /// Pooled connections are closed.
    pub fn set_proxy(&self, proxy_url: Option<&str>) -> Result<(), NetError> {
        let proxy = proxy_url.map(ProxySettings::parse).transpose()?;
        self.inner.round_tripper.set_proxy(proxy);
        Ok(())
    }

    /// Start building a GET request.
    pub fn get<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request("GET", url)
    }

    /// Start building a POST request.
    pub fn post<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request("POST", url)
    }

    /// Start building a PUT request.
    pub fn put<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request("PUT", url)
    }

    /// Start building a DELETE request.
    pub fn delete<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request("DELETE", url)
    }

    /// Start building a HEAD request.
    pub fn head<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request("HEAD", url)
    }

    /// Start building a PATCH request.
    pub fn patch<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request("PATCH", url)
    }

    /// Start building a request with custom method.
    pub fn request<U: AsRef<str>>(&self, method: &str, url: U) -> RequestBuilder {
        RequestBuilder {
            client: self.clone(),
            request: Request::parse(method, url.as_ref()),
        }
    }

    /// Send a prepared request. Adds `Host`, `Content-Type`,
    /// `Accept-Encoding` and `Cookie` where missing, runs the header filter
    /// and stores any `Set-Cookie` from the response.
    pub async fn execute(&self, mut request: Request) -> Result<Response, NetError> {
        if request.host.is_some() || !request.headers.contains("host") {
            request.headers.set("Host", &request.authority())?;
        }
        if let Some(content_type) = request.body.content_type() {
            if !request.headers.contains("content-type") {
                request.headers.add("Content-Type", content_type)?;
            }
        }
        if self.inner.auto_accept_encoding && !request.headers.contains("accept-encoding") {
            request.headers.add("Accept-Encoding", DEFAULT_ACCEPT_ENCODING)?;
        }

        let cookie_header = self.cookie_header(&request);
        request.headers.set("Cookie", &cookie_header)?;

        if let Some(filter) = &self.inner.header_filter {
            request.headers.retain_with(filter.as_ref());
        }
        let sent_cookies = request.headers.get("cookie").unwrap_or_default().to_string();

        let raw = self.inner.round_tripper.round_trip(&request).await?;

        let set_cookies = raw
            .headers
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case("set-cookie"))
            .map(|(_, value)| value.as_str());
        let cookies = self.inner.jar.set_cookies(&request.url, set_cookies);

        Ok(Response::new(
            raw,
            request.url,
            request.method,
            sent_cookies,
            cookies,
        ))
    }

    /// Existing `Cookie` header, then the jar's cookies, then the request's own.
    fn cookie_header(&self, request: &Request) -> String {
        let mut parts: Vec<String> = request.headers.get_all("cookie").map(str::to_string).collect();
        let from_jar = self.inner.jar.header_value(&request.url);
        if !from_jar.is_empty() {
            parts.push(from_jar);
        }
        parts.extend(request.cookies.iter().map(|(n, v)| format!("{}={}", n, v)));
        parts.join("; ")
    }

    /// Cookies the jar would send to `url`.
    pub fn cookies(&self, url: &str) -> Result<Vec<CanonicalCookie>, NetError> {
        Ok(self.inner.jar.cookies_for(&parse_url(url)?))
    }

    /// Name to value for the cookies sent to `url`. The most specific path
    /// wins for repeated names.
    pub fn cookies_map(&self, url: &str) -> Result<HashMap<String, String>, NetError> {
        let mut map = HashMap::new();
        for cookie in self.cookies(url)? {
            map.entry(cookie.name).or_insert(cookie.value);
        }
        Ok(map)
    }

    pub fn cookie_value(&self, url: &str, name: &str) -> Result<String, NetError> {
        self.cookies(url)?
            .into_iter()
            .find(|c| c.name == name)
            .map(|c| c.value)
            .ok_or_else(|| NetError::CookieNotFound(name.to_string()))
    }

    /// Store `name=value` for the registrable domain of `url`'s host
    /// (host-only for IPs and single labels). `path` defaults to `/`.
    pub fn set_cookie_value(
        &self,
        url: &str,
        name: &str,
        value: &str,
        path: Option<&str>,
    ) -> Result<(), NetError> {
        let url = parse_url(url)?;
        let host = url
            .host_str()
            .ok_or_else(|| NetError::InvalidUrl(format!("{} has no host", url)))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_ascii_lowercase();
        let path = path.unwrap_or("/").to_string();
        let now = OffsetDateTime::now_utc();

        let registrable = psl::registrable_domain(&host);
        let mut cookie = CanonicalCookie::new(
            name.to_string(),
            value.to_string(),
            registrable.clone().unwrap_or(host),
            path,
            now,
            None,
        );
        cookie.host_only = registrable.is_none();
        cookie.raw = match &registrable {
            Some(domain) => format!("{}={}; Domain={}; Path={}", name, value, domain, cookie.path),
            None => format!("{}={}; Path={}", name, value, cookie.path),
        };
        self.inner.jar.set_cookie(cookie);
        Ok(())
    }

    /// Store a cookie with explicit attributes, subject to the same checks
    /// as a `Set-Cookie` from `url`.
    pub fn set_custom_cookie(&self, url: &str, cookie: CookieSpec) -> Result<(), NetError> {
        let url = parse_url(url)?;
        let line = cookie.to_set_cookie();
        let cookie = CanonicalCookie::parse(&url, &line, OffsetDateTime::now_utc()).map_err(|e| {
            NetError::InvalidOptions(format!("cookie {} rejected: {}", cookie.name, e))
        })?;
        self.inner.jar.set_cookie(cookie);
        Ok(())
    }

    /// Remove every cookie named `name` visible from `url`.
    pub fn remove_cookie(&self, url: &str, name: &str) -> Result<usize, NetError> {
        Ok(self.inner.jar.remove(&parse_url(url)?, name))
    }

    pub fn reset_cookies(&self) {
        self.inner.jar.reset();
    }
}

/// Builder for creating a [`Client`].
#[derive(Debug, Default)]
pub struct ClientBuilder {
    options: ClientOptions,
}

impl ClientBuilder {
    /// Set proxy.
    pub fn proxy(mut self, proxy_url: &str) -> Self {
        self.options.proxy_url = Some(proxy_url.to_string());
        self
    }

    /// Set request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    pub fn use_tls(mut self, enabled: bool) -> Self {
        self.options.use_tls = enabled;
        self
    }

    pub fn http2_prior_knowledge(mut self, enabled: bool) -> Self {
        self.options.http2_prior_knowledge = enabled;
        self
    }

    /// Browser profile to imitate.
    pub fn profile(mut self, id: &str) -> Self {
        self.options.profile_id = Some(id.to_string());
        self
    }

    pub fn h2_settings(mut self, settings: Vec<(u16, u32)>) -> Self {
        self.options.h2_settings_overrides = Some(settings);
        self
    }

    pub fn insecure_skip_verify(mut self, insecure: bool) -> Self {
        self.options.insecure_skip_verify = insecure;
        self
    }

    pub fn header_order<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.options.header_order = Some(order.into_iter().map(|s| s.as_ref().to_string()).collect());
        self
    }

    /// Drop headers for which `filter` returns false.
    pub fn header_filter<F: HeaderFilter + 'static>(mut self, filter: F) -> Self {
        self.options.header_filter = Some(Arc::new(filter));
        self
    }

    pub fn fingerprint_check(mut self, check: FingerprintCheck) -> Self {
        self.options.fingerprint_check = check;
        self
    }

    pub fn max_idle_per_host(mut self, max: usize) -> Self {
        self.options.max_idle_per_host = max;
        self
    }

    pub fn auto_accept_encoding(mut self, enabled: bool) -> Self {
        self.options.auto_accept_encoding = enabled;
        self
    }

    pub fn registry(mut self, registry: ProfileRegistry) -> Self {
        self.options.registry = Some(Arc::new(registry));
        self
    }

    /// Parent token for every request the client sends.
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.options.cancel_token = Some(token);
        self
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Build the client.
    pub fn build(self) -> Result<Client, NetError> {
        Client::new(self.options)
    }
}

/// Builder for a single request. Invalid input is reported by
/// [`send`](Self::send).
#[derive(Debug)]
pub struct RequestBuilder {
    client: Client,
    request: Result<Request, NetError>,
}

impl RequestBuilder {
    fn with(mut self, f: impl FnOnce(&mut Request) -> Result<(), NetError>) -> Self {
        if let Ok(request) = &mut self.request {
            if let Err(e) = f(request) {
                self.request = Err(e);
            }
        }
        self
    }

    /// Append a header. Empty values are ignored.
    pub fn header(self, name: &str, value: &str) -> Self {
        self.with(|r| r.headers.add(name, value))
    }

    /// Replace every value of a header. Empty values are ignored.
    pub fn set_header(self, name: &str, value: &str) -> Self {
        self.with(|r| r.headers.set(name, value))
    }

    /// Append several headers in iteration order.
    pub fn headers<I, K, V>(self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.with(|r| {
            for (name, value) in headers {
                r.headers.add(name.as_ref(), value.as_ref())?;
            }
            Ok(())
        })
    }

    /// Header order for this request only.
    pub fn header_order<I, S>(self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let order: Vec<String> = order.into_iter().map(|s| s.as_ref().to_string()).collect();
        self.with(|r| {
            r.header_order = Some(order);
            Ok(())
        })
    }

    /// Send `host` as `Host` / `:authority` while dialing the URL's host.
    pub fn host(self, host: &str) -> Self {
        self.with(|r| {
            r.host = Some(host.to_string()).filter(|h| !h.is_empty());
            Ok(())
        })
    }

    pub fn body<B: Into<RequestBody>>(self, body: B) -> Self {
        let body = body.into();
        self.with(|r| {
            r.body = body;
            Ok(())
        })
    }

    /// URL-encoded form body.
    pub fn form<I, K, V>(self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.body(RequestBody::form(pairs))
    }

    /// Set JSON body.
    #[cfg(feature = "json")]
    pub fn json<T: serde::Serialize + ?Sized>(self, json: &T) -> Self {
        let body = RequestBody::json(json);
        self.with(|r| {
            r.body = body?;
            Ok(())
        })
    }

    /// Send an extra cookie with this request.
    pub fn cookie(self, name: &str, value: &str) -> Self {
        self.with(|r| {
            r.cookies.push((name.to_string(), value.to_string()));
            Ok(())
        })
    }

    pub fn cancel_token(self, token: CancellationToken) -> Self {
        self.with(|r| {
            r.cancel = Some(token);
            Ok(())
        })
    }

    pub fn user_agent(self, user_agent: &str) -> Self {
        self.set_header("User-Agent", user_agent)
    }

    /// Chrome client hints and fetch metadata for a top-level navigation.
    pub fn sec_headers(self, version: Option<&str>) -> Self {
        let ua = sec_ch_ua(version.unwrap_or(DEFAULT_SEC_CH_UA_VERSION));
        self.set_header("sec-ch-ua", &ua)
            .set_header("sec-ch-ua-mobile", "?0")
            .set_header("sec-ch-ua-platform", "\"Windows\"")
            .set_header("sec-fetch-dest", "document")
            .set_header("sec-fetch-mode", "navigate")
            .set_header("sec-fetch-site", "none")
    }

    /// The request as it stands.
    pub fn build(self) -> Result<Request, NetError> {
        self.request
    }

    /// Send the request.
    pub async fn send(self) -> Result<Response, NetError> {
        let request = self.request?;
        self.client.execute(request).await
    }
}
