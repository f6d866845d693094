use crate::base::neterror::NetError;
use crate::http::h1::Progress;
use crate::http::orderedheaders::resolve_order;
use crate::http::request::Request;
use crate::http::response::RawResponse;
use crate::http::retry::RetryConfig;
use crate::http::transport::{Connection, Connector, WireRequest};
use crate::socket::pool::{ConnectionPool, PoolKey};
use crate::socket::proxy::ProxySettings;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Sends requests over pooled connections, dialing on a miss.
#[derive(Debug, Clone)]
pub struct RoundTripper {
    connector: Arc<Connector>,
    pool: ConnectionPool,
    proxy: Arc<RwLock<Option<ProxySettings>>>,
    retry: RetryConfig,
    timeout: Option<Duration>,
    header_order: Option<Vec<String>>,
    cancel: CancellationToken,
}

impl RoundTripper {
    pub fn new(connector: Connector, pool: ConnectionPool, proxy: Option<ProxySettings>) -> Self {
        Self {
            connector: Arc::new(connector),
            pool,
            proxy: Arc::new(RwLock::new(proxy)),
            retry: RetryConfig::default(),
            timeout: None,
            header_order: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Bound on each whole call. Zero means none.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout).filter(|t| !t.is_zero());
        self
    }

    /// Client-level header order.
    pub fn with_header_order(mut self, order: Option<Vec<String>>) -> Self {
        self.header_order = order.filter(|o| !o.is_empty());
        self
    }

    /// Parent of every call's token. Cancelling it fails all pending calls.
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn connector(&self) -> &Connector {
        &self.connector
    }

    pub fn proxy(&self) -> Option<ProxySettings> {
        self.proxy.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Swap the upstream proxy. Pooled connections went through the old
    /// one, so the pool is flushed.
    pub fn set_proxy(&self, proxy: Option<ProxySettings>) {
        *self.proxy.write().unwrap_or_else(|e| e.into_inner()) = proxy;
        self.pool.clear();
    }

    pub fn pool_key(&self, request: &Request) -> PoolKey {
        PoolKey {
            scheme: request.url.scheme().to_string(),
            host: request.host_str().to_ascii_lowercase(),
            port: request.port(),
            proxy: self.proxy().map(|p| p.key()),
            profile: self.connector.transport().profile().map(|p| p.id.clone()),
        }
    }

    /// The effective header order for `request`.
    pub fn header_order(&self, request: &Request) -> Vec<String> {
        let profile = self
            .connector
            .transport()
            .profile()
            .map(|p| p.header_order.as_slice());
        resolve_order(
            request.header_order.as_deref(),
            self.header_order.as_deref(),
            profile,
        )
    }

    fn wire_request(&self, request: &Request) -> WireRequest {
        WireRequest {
            method: request.method.clone(),
            scheme: request.url.scheme().to_string(),
            authority: request.authority(),
            target: request.target(),
            headers: request.headers.ordered(&self.header_order(request)),
            body: request.body.to_bytes(),
        }
    }

    /// Send `request`, bounded by the client timeout, the request's
    /// cancellation token and the client token.
    pub async fn round_trip(&self, request: &Request) -> Result<RawResponse, NetError> {
        let key = self.pool_key(request);
        let cancel = self.cancel.child_token();
        let requested = request.cancel_token();
        let wire = self.wire_request(request);

        let attempts = self.attempts(&key, request, &wire, &cancel);
        let bounded = async {
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, attempts)
                    .await
                    .map_err(|_| NetError::Timeout)?,
                None => attempts.await,
            }
        };

        let result = tokio::select! {
            result = bounded => result,
            _ = cancel.cancelled() => Err(NetError::Cancelled),
            _ = requested.cancelled() => Err(NetError::Cancelled),
        };
        if matches!(result, Err(NetError::Cancelled) | Err(NetError::Timeout)) {
            // The abandoned attempt dropped its connection; an H2 stream was
            // reset on the way out.
            debug!(host = %key.host, "request abandoned, evicting connection");
            self.pool.evict_h2(&key);
        }
        result
    }

    async fn attempts(
        &self,
        key: &PoolKey,
        request: &Request,
        wire: &WireRequest,
        cancel: &CancellationToken,
    ) -> Result<RawResponse, NetError> {
        let mut attempt = 0;
        loop {
            // A retry always goes out on a fresh connection.
            let pooled = if attempt == 0 { self.pool.checkout(key) } else { None };
            let mut conn = match pooled {
                Some(conn) => conn,
                None => self.dial(key, request).await?,
            };

            let mut progress = Progress::default();
            let result = self
                .connector
                .round_trip(&mut conn, wire, &mut progress, cancel)
                .await;

            match result {
                Ok(response) => {
                    self.release(key, conn);
                    return Ok(response);
                }
                Err(err) => {
                    if let Connection::H2(handle) = &conn {
                        if !handle.is_open() {
                            self.pool.evict_h2(key);
                        }
                    }
                    match self.retry.should_retry(&err, progress, &wire.method, attempt) {
                        Some(reason) => {
                            debug!(host = %key.host, ?reason, error = %err, "retrying on a fresh connection");
                            attempt += 1;
                        }
                        None => return Err(err),
                    }
                }
            }
        }
    }

    async fn dial(&self, key: &PoolKey, request: &Request) -> Result<Connection, NetError> {
        debug!(host = %key.host, port = key.port, scheme = %key.scheme, "pool miss, dialing");
        let proxy = self.proxy();
        let conn = self
            .connector
            .dial(
                request.host_str(),
                key.port,
                &key.scheme,
                proxy.as_ref(),
                self.timeout,
            )
            .await?;
        Ok(match conn {
            Connection::H2(handle) => Connection::H2(self.pool.insert_h2(key.clone(), handle)),
            conn => conn,
        })
    }

    fn release(&self, key: &PoolKey, conn: Connection) {
        match conn {
            Connection::H1(h1) => self.pool.release_h1(key.clone(), h1),
            Connection::H2(handle) => {
                if !handle.is_open() {
                    self.pool.evict_h2(key);
                }
            }
        }
    }
}
