//! Per-client cookie storage.
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`jar`] | [`CookieJar`](jar::CookieJar): RFC 6265 store with domain and path matching |
//! | [`canonical_cookie`] | [`CanonicalCookie`](canonical_cookie::CanonicalCookie): one parsed cookie |
//! | [`psl`] | Public Suffix List checks for Domain attributes |

pub mod canonical_cookie;
pub mod jar;
pub mod psl;

pub use canonical_cookie::{CanonicalCookie, CookieRejected, SameSite};
pub use jar::CookieJar;
