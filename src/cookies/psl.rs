//! Public Suffix List lookups for cookie domains.
//!
//! Cookies whose Domain attribute names a public suffix (`com`, `co.uk`,
//! `github.io`) would be sent to every site under it, so the jar refuses
//! them. Backed by the `psl` crate's compiled list.

use psl::{List, Psl};
use std::net::IpAddr;

fn normalize(domain: &str) -> String {
    domain.trim_start_matches('.').trim_end_matches('.').to_ascii_lowercase()
}

/// Whether `domain` is itself a public suffix.
pub fn is_public_suffix(domain: &str) -> bool {
    let domain = normalize(domain);
    if domain.is_empty() || domain.parse::<IpAddr>().is_ok() {
        return false;
    }
    List.suffix(domain.as_bytes())
        .is_some_and(|suffix| suffix.is_known() && suffix.as_bytes() == domain.as_bytes())
}

/// The registrable domain (eTLD+1): `a.b.example.co.uk` gives `example.co.uk`.
/// `None` for public suffixes, IP literals and single unknown labels.
pub fn registrable_domain(host: &str) -> Option<String> {
    let host = normalize(host);
    if host.parse::<IpAddr>().is_ok() {
        return None;
    }
    let domain = List.domain(host.as_bytes())?;
    if !domain.suffix().is_known() {
        return None;
    }
    std::str::from_utf8(domain.as_bytes()).ok().map(str::to_string)
}
