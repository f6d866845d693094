//! Sockets, proxies, TLS and connection pooling.
//!
//! - [`connectjob`]: DNS -> TCP -> proxy tunnel
//! - [`socks`]: SOCKS5 client handshake
//! - [`proxy`]: HTTP/HTTPS/SOCKS5 proxy settings
//! - [`tls`]: fingerprinted TLS handshakes with BoringSSL
//! - [`pool`]: connection cache keyed by origin, proxy and profile
//! - [`stream`]: the boxed byte stream every layer hands upward

pub mod connectjob;
pub mod pool;
pub mod proxy;
pub mod socks;
pub mod stream;
pub mod tls;
