//! Proxy map normalization and per-URL proxy selection.
//!
//! Keys are a scheme (`http`, `https`), the wildcard `all`, or a
//! `scheme://host` / `all://host` pair for host-specific proxies.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, instrument};
use url::Url;

use crate::error::NormalizeError;

const PARAM: &str = "proxies";

/// Schemes a proxy URL itself may use.
const PROXY_SCHEMES: [&str; 5] = ["http", "https", "socks4", "socks5", "socks5h"];

/// Validated scheme→proxy mapping with lower-cased keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ProxyMap {
    entries: BTreeMap<String, Url>,
}

impl ProxyMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Proxy registered under an exact key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Url> {
        self.entries.get(&key.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Url)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Applies `overrides` on top of this map, key by key.
    pub fn merge(&mut self, overrides: &ProxyMap) {
        for (key, url) in &overrides.entries {
            self.entries.insert(key.clone(), url.clone());
        }
    }

    /// Picks the proxy for `target`.
    ///
    /// Most specific first: `scheme://host`, `scheme`, `all://host`, `all`.
    #[must_use]
    pub fn select(&self, target: &Url) -> Option<&Url> {
        let scheme = target.scheme();
        let candidates: Vec<String> = match target.host_str() {
            Some(host) => {
                let host = host.to_ascii_lowercase();
                vec![
                    format!("{scheme}://{host}"),
                    scheme.to_string(),
                    format!("all://{host}"),
                    "all".to_string(),
                ]
            }
            None => vec![scheme.to_string(), "all".to_string()],
        };
        candidates.iter().find_map(|key| self.entries.get(key))
    }
}

/// Normalizes a scheme→proxy URL mapping into a [`ProxyMap`].
///
/// Proxy URLs without a scheme are taken as `http://`.
///
/// # Errors
///
/// - [`NormalizeError::ShapeIncomplete`] for an empty proxy URL
/// - [`NormalizeError::TypeMismatch`] for malformed keys or URLs, or
///   unsupported proxy schemes
/// - [`NormalizeError::ShapeConflict`] when two keys differ only by case
#[instrument(level = "debug", skip(input))]
pub fn normalize_proxies(input: BTreeMap<String, String>) -> Result<ProxyMap, NormalizeError> {
    let mut entries = BTreeMap::new();
    let mut raw_keys: BTreeMap<String, String> = BTreeMap::new();
    for (raw_key, raw_url) in input {
        let key = normalize_key(&raw_key)?;
        if let Some(previous) = raw_keys.get(&key) {
            return Err(NormalizeError::conflict(
                format!("{PARAM}[{previous:?}]"),
                format!("{PARAM}[{raw_key:?}]"),
            ));
        }
        let url = parse_proxy_url(&raw_url)?;
        raw_keys.insert(key.clone(), raw_key);
        entries.insert(key, url);
    }
    debug!(count = entries.len(), "normalized proxies");
    Ok(ProxyMap { entries })
}

fn normalize_key(raw: &str) -> Result<String, NormalizeError> {
    let key = raw.trim().to_ascii_lowercase();
    let (scheme, host) = match key.split_once("://") {
        Some((scheme, host)) => (scheme, Some(host)),
        None => (key.as_str(), None),
    };
    let scheme_ok = !scheme.is_empty()
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    let host_ok = host.is_none_or(|h| !h.is_empty() && !h.contains('/'));
    if !scheme_ok || !host_ok {
        return Err(NormalizeError::mismatch(
            PARAM,
            "`scheme`, `all`, or `scheme://host` key",
            format!("{raw:?}"),
        ));
    }
    Ok(key)
}

fn parse_proxy_url(raw: &str) -> Result<Url, NormalizeError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(NormalizeError::incomplete(PARAM, "scheme→proxy entry", "proxy URL"));
    }
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };
    let url = Url::parse(&with_scheme)
        .map_err(|e| NormalizeError::mismatch(PARAM, "proxy URL", format!("{raw:?} ({e})")))?;
    if !PROXY_SCHEMES.contains(&url.scheme()) {
        return Err(NormalizeError::mismatch(
            PARAM,
            "http, https, socks4, socks5 or socks5h proxy",
            url.scheme().to_string(),
        ));
    }
    if url.host_str().is_none() {
        return Err(NormalizeError::incomplete(PARAM, "proxy URL", "host"));
    }
    Ok(url)
}
