//! Browser emulation profiles.
//!
//! A profile bundles everything a fingerprinting server observes:
//! - TLS ClientHello template (cipher suites, extensions, groups)
//! - HTTP/2 SETTINGS, WINDOW_UPDATE and pseudo-header order
//! - Default regular header order
//!
//! Profiles are data. The bundled ones live in `profiles/*.json`;
//! custom ones are registered through [`ProfileRegistry::builder`].

pub mod profile;
pub mod registry;

pub use profile::{CodePoint, ExtensionSpec, Http2Profile, Profile, TlsProfile};
pub use registry::{ProfileRegistry, ProfileRegistryBuilder};
