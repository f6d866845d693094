//! # mimicnet
//!
//! An HTTP/1.1 and HTTP/2 client whose wire behavior follows a browser
//! profile.
//!
//! A profile is data: the TLS ClientHello layout (versions, cipher suites,
//! extension order, groups, key shares, GREASE), the HTTP/2 connection
//! preface (SETTINGS, window update, pseudo-header order, priorities) and
//! the default header order. `mimicnet` reproduces that shape on every
//! connection so servers see a consistent fingerprint.
//!
//! ## Features
//!
//! - **Profiles**: bundled chrome-120, firefox-110 and safari-17, plus JSON
//!   profiles registered at runtime
//! - **TLS**: BoringSSL with a ClientHello synthesized from the profile
//! - **HTTP/1.1 & HTTP/2**: ordered headers, h2c prior knowledge, pooling
//! - **Proxies**: HTTP and HTTPS CONNECT, SOCKS5 with optional remote DNS
//! - **Cookies**: RFC 6265 jar with Public Suffix List checks
//! - **Decoding**: gzip, deflate and br, chained
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mimicnet::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), mimicnet::NetError> {
//!     let client = Client::builder()
//!         .use_tls(true)
//!         .profile("chrome-120")
//!         .build()?;
//!     let response = client.get("https://example.com").send().await?;
//!     println!("Status: {}", response.status());
//!     println!("{}", response.text()?);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error definitions
//! - [`emulation`] - Browser profiles and the profile registry
//! - [`socket`] - Dialing, proxies, TLS and the connection pool
//! - [`http`] - HTTP/1.1 and HTTP/2 engines, headers, bodies and decoding
//! - [`cookies`] - The cookie jar
//! - [`client`] - The high-level client

pub mod base;
pub mod client;
pub mod cookies;
pub mod emulation;
pub mod http;
pub mod socket;

pub use base::neterror::{ErrorCategory, NetError};
pub use client::{Client, ClientBuilder, ClientOptions, CookieSpec, RequestBuilder};
pub use cookies::{CanonicalCookie, CookieJar};
pub use emulation::{Profile, ProfileRegistry};
pub use http::{HeaderFilter, HeaderList, RawResponse, Request, RequestBody, Response};
pub use socket::proxy::ProxySettings;
pub use socket::tls::FingerprintCheck;
