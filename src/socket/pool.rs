use crate::http::h1::H1Connection;
use crate::http::h2::H2Handle;
use crate::http::transport::Connection;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Idle H1 connections kept per key by default.
pub const DEFAULT_MAX_IDLE_PER_HOST: usize = 6;

/// Idle connections older than this are not handed out again.
const IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Identifies the connections that may serve a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    /// Credential-free proxy identity, see [`ProxySettings::key`](crate::socket::proxy::ProxySettings::key).
    pub proxy: Option<String>,
    pub profile: Option<String>,
}

struct IdleConnection {
    conn: H1Connection,
    /// When this connection was returned to the pool
    start_time: Instant,
}

#[derive(Default)]
struct Group {
    /// Shared by every request to the key until GOAWAY or error.
    h2: Option<H2Handle>,
    /// Most recently idled at the back.
    idle: VecDeque<IdleConnection>,
}

impl Group {
    fn is_empty(&self) -> bool {
        self.h2.is_none() && self.idle.is_empty()
    }
}

/// Connection cache keyed by [`PoolKey`].
#[derive(Clone)]
pub struct ConnectionPool {
    max_idle_per_host: usize,
    groups: Arc<DashMap<PoolKey, Group>>,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("max_idle_per_host", &self.max_idle_per_host)
            .field("groups", &self.groups.len())
            .field("idle", &self.idle_count())
            .finish()
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IDLE_PER_HOST)
    }
}

impl ConnectionPool {
    pub fn new(max_idle_per_host: usize) -> Self {
        Self {
            max_idle_per_host,
            groups: Arc::new(DashMap::new()),
        }
    }

    /// Prefer a live shared H2 handle, then the most recently idled H1
    /// connection.
    pub fn checkout(&self, key: &PoolKey) -> Option<Connection> {
        let mut group = self.groups.get_mut(key)?;

        match group.h2.clone() {
            Some(handle) if handle.is_open() => {
                debug!(host = %key.host, port = key.port, "pool hit (h2)");
                return Some(Connection::H2(handle));
            }
            Some(_) => group.h2 = None,
            None => {}
        }

        let now = Instant::now();
        while let Some(idle) = group.idle.pop_back() {
            if now.duration_since(idle.start_time) < IDLE_TIMEOUT && idle.conn.is_reusable() {
                debug!(host = %key.host, port = key.port, "pool hit (h1)");
                return Some(Connection::H1(idle.conn));
            }
        }

        let empty = group.is_empty();
        drop(group);
        if empty {
            self.groups.remove_if(key, |_, g| g.is_empty());
        }
        None
    }

    /// Offer an H2 handle for sharing. An existing live handle wins.
    pub fn insert_h2(&self, key: PoolKey, handle: H2Handle) -> H2Handle {
        let mut group = self.groups.entry(key).or_default();
        match &group.h2 {
            Some(existing) if existing.is_open() => existing.clone(),
            _ => {
                group.h2 = Some(handle.clone());
                handle
            }
        }
    }

    /// Return an H1 connection after a successful request. Unreusable
    /// connections are dropped; a full group drops its oldest entry.
    pub fn release_h1(&self, key: PoolKey, conn: H1Connection) {
        if !conn.is_reusable() || self.max_idle_per_host == 0 {
            return;
        }
        let mut group = self.groups.entry(key).or_default();
        while group.idle.len() >= self.max_idle_per_host {
            group.idle.pop_front();
        }
        group.idle.push_back(IdleConnection {
            conn,
            start_time: Instant::now(),
        });
    }

    /// Forget the shared H2 handle for `key`.
    pub fn evict_h2(&self, key: &PoolKey) {
        if let Some(mut group) = self.groups.get_mut(key) {
            group.h2 = None;
        }
        self.groups.remove_if(key, |_, g| g.is_empty());
    }

    /// Drop every pooled connection.
    pub fn clear(&self) {
        self.groups.clear();
    }

    /// Remove idle connections past their timeout and closed H2 handles.
    pub fn cleanup_idle(&self) {
        let now = Instant::now();
        self.groups.retain(|_, group| {
            group
                .idle
                .retain(|idle| now.duration_since(idle.start_time) < IDLE_TIMEOUT);
            if group.h2.as_ref().is_some_and(|h| h.is_closed()) {
                group.h2 = None;
            }
            !group.is_empty()
        });
    }

    pub fn idle_count(&self) -> usize {
        self.groups.iter().map(|g| g.idle.len()).sum()
    }

    pub fn shared_count(&self) -> usize {
        self.groups.iter().filter(|g| g.h2.is_some()).count()
    }

    /// Whether nothing at all is pooled.
    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::stream::BoxedSocket;

    fn key(host: &str) -> PoolKey {
        PoolKey {
            scheme: "http".into(),
            host: host.into(),
            port: 80,
            proxy: None,
            profile: None,
        }
    }

    fn conn() -> (H1Connection, tokio::io::DuplexStream) {
        let (a, b) = tokio::io::duplex(64);
        (H1Connection::new(BoxedSocket::new(a)), b)
    }

    #[tokio::test]
    async fn test_release_and_checkout_lifo() {
        let pool = ConnectionPool::new(4);
        let (c1, _p1) = conn();
        let (c2, _p2) = conn();
        pool.release_h1(key("a"), c1);
        pool.release_h1(key("a"), c2);
        assert_eq!(pool.idle_count(), 2);

        assert!(matches!(pool.checkout(&key("a")), Some(Connection::H1(_))));
        assert_eq!(pool.idle_count(), 1);
        assert!(pool.checkout(&key("b")).is_none());
    }

    #[tokio::test]
    async fn test_bounded_per_key() {
        let pool = ConnectionPool::new(2);
        let mut peers = Vec::new();
        for _ in 0..5 {
            let (c, p) = conn();
            peers.push(p);
            pool.release_h1(key("a"), c);
        }
        assert_eq!(pool.idle_count(), 2);
    }

    #[tokio::test]
    async fn test_keys_are_distinct_per_profile_and_proxy() {
        let pool = ConnectionPool::default();
        let (c, _p) = conn();
        pool.release_h1(key("a"), c);

        let mut other = key("a");
        other.profile = Some("chrome-120".into());
        assert!(pool.checkout(&other).is_none());
        other.profile = None;
        other.proxy = Some("http://proxy.test:8080".into());
        assert!(pool.checkout(&other).is_none());
        assert!(pool.checkout(&key("a")).is_some());
    }

    #[tokio::test]
    async fn test_clear_empties_pool() {
        let pool = ConnectionPool::default();
        let (c, _p) = conn();
        pool.release_h1(key("a"), c);
        assert!(!pool.is_empty());
        pool.clear();
        assert!(pool.is_empty());
        assert_eq!(pool.idle_count(), 0);
    }
}
