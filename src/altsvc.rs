//! Alternative-service cache.
//!
//! Remembers, per origin `(host, port)`, whether a protocol-upgrade
//! alternative was advertised. Three states are kept apart: never seen,
//! seen with no alternative, and seen with a concrete alternative.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use tracing::{debug, instrument};

use crate::error::NormalizeError;

const PARAM: &str = "altsvc";

/// A `(host, port)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Authority {
    pub host: String,
    pub port: u16,
}

impl Authority {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Lookup result for an origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AltSvcEntry<'a> {
    /// Nothing recorded for the origin.
    Absent,
    /// Recorded, with no alternative to use.
    NoAlternative,
    Alternative(&'a Authority),
}

/// Origin → optional alternative mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AltSvcCache {
    entries: HashMap<Authority, Option<Authority>>,
}

impl AltSvcCache {
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

    #[must_use]
    pub fn lookup(&self, origin: &Authority) -> AltSvcEntry<'_> {
        match self.entries.get(origin) {
            None => AltSvcEntry::Absent,
            Some(None) => AltSvcEntry::NoAlternative,
            Some(Some(target)) => AltSvcEntry::Alternative(target),
        }
    }

    pub fn record(&mut self, origin: Authority, target: Option<Authority>) {
        self.entries.insert(origin, target);
    }

    /// Drops the origin back to the never-seen state.
    pub fn forget(&mut self, origin: &Authority) -> bool {
        self.entries.remove(origin).is_some()
    }

    /// Updates the entry for `origin` from an `Alt-Svc` response header.
    ///
    /// `clear` records "no alternative". The first `h3` or `h3-NN`
    /// alternative is recorded as the target; an alternative without a host
    /// keeps the origin host. Headers advertising nothing usable are ignored.
    #[instrument(level = "debug", skip(self, origin), fields(origin = %origin))]
    pub fn observe(&mut self, origin: &Authority, header: &str) {
        let header = header.trim();
        if header.eq_ignore_ascii_case("clear") {
            debug!("alt-svc cleared");
            self.record(origin.clone(), None);
            return;
        }
        let target = header
            .split(',')
            .filter_map(|alternative| parse_alternative(alternative, &origin.host))
            .next();
        if let Some(target) = target {
            debug!(target = %target, "alt-svc alternative recorded");
            self.record(origin.clone(), Some(target));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Authority, Option<&Authority>)> {
        self.entries.iter().map(|(k, v)| (k, v.as_ref()))
    }

    /// Back to the plain `(host, port) → Option<(host, port)>` form.
    #[must_use]
    pub fn into_map(self) -> HashMap<(String, u16), Option<(String, u16)>> {
        self.entries
            .into_iter()
            .map(|(origin, target)| {
                (
                    (origin.host, origin.port),
                    target.map(|t| (t.host, t.port)),
                )
            })
            .collect()
    }
}

/// Parses one `protocol="[host]:port"; params` alternative.
fn parse_alternative(alternative: &str, origin_host: &str) -> Option<Authority> {
    let head = alternative.split(';').next()?.trim();
    let (protocol, authority) = head.split_once('=')?;
    let protocol = protocol.trim();
    let is_h3 = protocol == "h3"
        || protocol
            .strip_prefix("h3-")
            .is_some_and(|draft| !draft.is_empty() && draft.bytes().all(|b| b.is_ascii_digit()));
    if !is_h3 {
        return None;
    }
    let authority = authority.trim().trim_matches('"');
    let (host, port) = authority.rsplit_once(':')?;
    let port: u16 = port.parse().ok().filter(|p| *p != 0)?;
    let host = if host.is_empty() { origin_host } else { host };
    Some(Authority::new(host, port))
}

/// Normalizes a `(host, port) → Option<(host, port)>` mapping into an
/// [`AltSvcCache`]. Hosts are kept verbatim.
///
/// # Errors
///
/// - [`NormalizeError::ShapeIncomplete`] for an empty host
/// - [`NormalizeError::TypeMismatch`] for port 0
#[instrument(level = "debug", skip(input))]
pub fn normalize_altsvc(
    input: HashMap<(String, u16), Option<(String, u16)>>,
) -> Result<AltSvcCache, NormalizeError> {
    let mut cache = AltSvcCache::new();
    for ((host, port), target) in input {
        let origin = authority(host, port)?;
        let target = target.map(|(host, port)| authority(host, port)).transpose()?;
        cache.record(origin, target);
    }
    debug!(entries = cache.len(), "normalized alt-svc cache");
    Ok(cache)
}

fn authority(host: String, port: u16) -> Result<Authority, NormalizeError> {
    if host.is_empty() {
        return Err(NormalizeError::incomplete(PARAM, "(host, port) pair", "host"));
    }
    if port == 0 {
        return Err(NormalizeError::mismatch(PARAM, "port in 1..=65535", "0"));
    }
    Ok(Authority::new(host, port))
}
