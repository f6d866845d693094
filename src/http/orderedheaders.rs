use crate::base::neterror::NetError;
use http::header::{HeaderName, HeaderValue};

/// Browser-like header order used when nothing more specific is configured.
pub const DEFAULT_HEADER_ORDER: &[&str] = &[
    "host",
    "connection",
    "cache-control",
    "device-memory",
    "viewport-width",
    "rtt",
    "downlink",
    "ect",
    "sec-ch-ua",
    "sec-ch-ua-mobile",
    "sec-ch-ua-full-version",
    "sec-ch-ua-arch",
    "sec-ch-ua-platform",
    "sec-ch-ua-platform-version",
    "sec-ch-ua-model",
    "upgrade-insecure-requests",
    "user-agent",
    "accept",
    "sec-fetch-site",
    "sec-fetch-mode",
    "sec-fetch-user",
    "sec-fetch-dest",
    "referer",
    "accept-encoding",
    "accept-language",
    "cookie",
    "content-type",
    "authorization",
];

fn validate(name: &str, value: &str) -> Result<(), NetError> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| NetError::InvalidHeader(format!("bad name {:?}", name)))?;
    HeaderValue::from_str(value)
        .map_err(|_| NetError::InvalidHeader(format!("bad value for {}", name)))?;
    Ok(())
}

/// A header multimap that strictly preserves insertion order and the
/// caller's name casing. Lookups are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList {
    entries: Vec<(String, String)>,
}

impl HeaderList {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append a value. Empty values are ignored.
    pub fn add(&mut self, name: &str, value: &str) -> Result<(), NetError> {
        if value.is_empty() {
            return Ok(());
        }
        validate(name, value)?;
        self.entries.push((name.to_string(), value.to_string()));
        Ok(())
    }

    /// Replace every value of `name` with `value`, keeping the position of
    /// the first occurrence. Empty values are ignored.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), NetError> {
        if value.is_empty() {
            return Ok(());
        }
        validate(name, value)?;
        match self
            .entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some(first) => {
                self.entries[first] = (name.to_string(), value.to_string());
                let mut idx = 0;
                self.entries.retain(|(n, _)| {
                    let keep = idx <= first || !n.eq_ignore_ascii_case(name);
                    idx += 1;
                    keep
                });
            }
            None => self.entries.push((name.to_string(), value.to_string())),
        }
        Ok(())
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// First value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry the filter rejects.
    pub fn retain_with(&mut self, filter: &dyn HeaderFilter) {
        self.entries.retain(|(n, v)| filter.keep(n, v));
    }

    /// Entries rearranged so names listed in `order` come first, in list
    /// order, followed by the rest in insertion order. Values of a repeated
    /// name keep their relative order.
    pub fn ordered<S: AsRef<str>>(&self, order: &[S]) -> Vec<(String, String)> {
        let mut out = Vec::with_capacity(self.entries.len());
        let mut taken = vec![false; self.entries.len()];

        for name in order {
            let name = name.as_ref();
            for (i, (n, v)) in self.entries.iter().enumerate() {
                if !taken[i] && n.eq_ignore_ascii_case(name) {
                    taken[i] = true;
                    out.push((n.clone(), v.clone()));
                }
            }
        }
        for (i, entry) in self.entries.iter().enumerate() {
            if !taken[i] {
                out.push(entry.clone());
            }
        }
        out
    }
}

impl<'a> IntoIterator for &'a HeaderList {
    type Item = (&'a str, &'a str);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a str)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

/// Pick the effective order: the first non-empty of request, client and
/// profile orders, else [`DEFAULT_HEADER_ORDER`].
pub fn resolve_order(
    request: Option<&[String]>,
    client: Option<&[String]>,
    profile: Option<&[String]>,
) -> Vec<String> {
    [request, client, profile]
        .into_iter()
        .flatten()
        .find(|order| !order.is_empty())
        .map(<[String]>::to_vec)
        .unwrap_or_else(|| DEFAULT_HEADER_ORDER.iter().map(|s| s.to_string()).collect())
}

/// Decides whether a header goes on the wire.
pub trait HeaderFilter: Send + Sync {
    fn keep(&self, name: &str, value: &str) -> bool;
}

impl<F> HeaderFilter for F
where
    F: Fn(&str, &str) -> bool + Send + Sync,
{
    fn keep(&self, name: &str, value: &str) -> bool {
        self(name, value)
    }
}

/// `sec-ch-ua` value for a Chrome major version.
pub fn sec_ch_ua(version: &str) -> String {
    format!(
        "\" Not A;Brand\";v=\"{v}\", \"Chromium\";v=\"{v}\", \"Google Chrome\";v=\"{v}\"",
        v = version
    )
}
