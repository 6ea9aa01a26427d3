//! Header normalization into an ordered, case-insensitive collection.
//!
//! Callers may pass headers as a plain mapping, an ordered list of pairs (text
//! or raw bytes), a `reqwest::header::HeaderMap`, or an existing [`Headers`].
//! All of them converge into [`Headers`], which keeps the caller's casing and
//! insertion order for serialization while comparing names case-insensitively.

use std::collections::BTreeMap;
use std::fmt;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::error::NormalizeError;

const PARAM: &str = "headers";

/// Header names whose values are redacted in `Debug` output.
const SENSITIVE_HEADERS: [&str; 4] = ["authorization", "proxy-authorization", "cookie", "set-cookie"];

/// Accepted shapes for the `headers` request parameter.
#[derive(Debug, Clone)]
pub enum HeaderInput {
    /// Plain name→value mapping.
    Map(BTreeMap<String, String>),
    /// Ordered name/value pairs; repeated names are kept.
    Pairs(Vec<(String, String)>),
    /// Ordered name/value pairs given as raw bytes. Values are decoded as ISO-8859-1.
    RawPairs(Vec<(Vec<u8>, Vec<u8>)>),
    /// A case-insensitive collection from the `http` ecosystem.
    HeaderMap(HeaderMap),
    /// An already-normalized collection.
    Headers(Headers),
}

impl From<BTreeMap<String, String>> for HeaderInput {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self::Map(map)
    }
}

impl From<Vec<(String, String)>> for HeaderInput {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Self::Pairs(pairs)
    }
}

impl<const N: usize> From<[(&str, &str); N]> for HeaderInput {
    fn from(pairs: [(&str, &str); N]) -> Self {
        Self::Pairs(
            pairs
                .iter()
                .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
                .collect(),
        )
    }
}

impl From<HeaderMap> for HeaderInput {
    fn from(map: HeaderMap) -> Self {
        Self::HeaderMap(map)
    }
}

impl From<Headers> for HeaderInput {
    fn from(headers: Headers) -> Self {
        Self::Headers(headers)
    }
}

/// Ordered, case-insensitive header collection.
///
/// Lookups ignore ASCII case; iteration yields names with the casing they
/// were inserted with, in insertion order.
#[derive(Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, counting repeated names separately.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the first value stored under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns every value stored under `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Sets `name` to a single value.
    ///
    /// The first existing entry keeps its position but takes the new casing
    /// and value; any further entries under the same name are dropped.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(index) => {
                let mut seen = 0usize;
                self.entries.retain(|(existing, _)| {
                    if existing.eq_ignore_ascii_case(&name) {
                        seen += 1;
                        seen == 1
                    } else {
                        true
                    }
                });
                self.entries[index] = (name, value);
            }
            None => self.entries.push((name, value)),
        }
    }

    /// Adds an entry without touching existing values for the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Removes every entry stored under `name`, returning the first value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let mut removed = None;
        self.entries.retain(|(existing, value)| {
            if existing.eq_ignore_ascii_case(name) {
                if removed.is_none() {
                    removed = Some(value.clone());
                }
                false
            } else {
                true
            }
        });
        removed
    }

    /// Iterates over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Applies `overrides` on top of this collection.
    ///
    /// Each name present in `overrides` replaces all of this collection's
    /// values for that name, with the override's casing. Repeated names in
    /// `overrides` are all kept.
    pub fn merge(&mut self, overrides: &Headers) {
        let mut replaced: Vec<&str> = Vec::new();
        for (name, value) in overrides.iter() {
            if replaced.iter().any(|seen| seen.eq_ignore_ascii_case(name)) {
                self.append(name, value);
            } else {
                self.insert(name, value);
                replaced.push(name);
            }
        }
    }

    /// Like [`Headers::iter`], with credential-bearing values replaced by
    /// `[REDACTED]`.
    pub fn iter_redacted(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(name, value)| {
            let sensitive = SENSITIVE_HEADERS
                .iter()
                .any(|sensitive| name.eq_ignore_ascii_case(sensitive));
            (name.as_str(), if sensitive { "[REDACTED]" } else { value.as_str() })
        })
    }

    /// Checks that every entry is a valid header.
    ///
    /// # Errors
    ///
    /// Returns [`NormalizeError::TypeMismatch`] for the first invalid name or
    /// value.
    pub fn validate(&self) -> Result<(), NormalizeError> {
        for (name, value) in &self.entries {
            checked_header(name, value)?;
        }
        Ok(())
    }

    /// Converts into a `HeaderMap` for the transport layer.
    ///
    /// # Errors
    ///
    /// Returns [`NormalizeError::TypeMismatch`] if an entry added through
    /// [`Headers::insert`] or [`Headers::append`] is not a valid header.
    pub fn to_header_map(&self) -> Result<HeaderMap, NormalizeError> {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for (name, value) in &self.entries {
            let (name, value) = checked_header(name, value)?;
            map.append(name, value);
        }
        Ok(map)
    }
}

/// Equal when both hold the same names, compared case-insensitively, and
/// each name carries the same values in the same order. The relative order
/// of different names does not matter.
impl PartialEq for Headers {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .all(|(name, _)| self.get_all(name).eq(other.get_all(name)))
    }
}

impl Eq for Headers {}

// Credentials must not leak into logs.
impl fmt::Debug for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter_redacted()).finish()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.append(name, value);
        }
        headers
    }
}

/// Normalizes any accepted header shape into [`Headers`].
///
/// Mapping input uses replace semantics; pair lists and header maps keep
/// repeated names.
///
/// # Errors
///
/// Returns [`NormalizeError::TypeMismatch`] for names that are not HTTP
/// tokens and for values containing control characters or characters outside
/// ISO-8859-1.
#[instrument(level = "debug", skip(input))]
pub fn normalize_headers(input: HeaderInput) -> Result<Headers, NormalizeError> {
    let mut headers = Headers::new();
    match input {
        HeaderInput::Map(map) => {
            for (name, value) in map {
                checked_header(&name, &value)?;
                headers.insert(name, value);
            }
        }
        HeaderInput::Pairs(pairs) => {
            for (name, value) in pairs {
                checked_header(&name, &value)?;
                headers.append(name, value);
            }
        }
        HeaderInput::RawPairs(pairs) => {
            for (raw_name, raw_value) in pairs {
                let name = String::from_utf8(raw_name).map_err(|err| {
                    NormalizeError::mismatch(PARAM, "UTF-8 header name", format!("{:?}", err.as_bytes()))
                })?;
                let value = decode_latin1(&raw_value);
                checked_header(&name, &value)?;
                headers.append(name, value);
            }
        }
        HeaderInput::HeaderMap(map) => {
            for (name, value) in &map {
                headers.append(name.as_str(), decode_latin1(value.as_bytes()));
            }
        }
        HeaderInput::Headers(existing) => {
            for (name, value) in existing.iter() {
                checked_header(name, value)?;
            }
            headers = existing;
        }
    }
    debug!(count = headers.len(), "normalized headers");
    Ok(headers)
}

fn checked_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), NormalizeError> {
    let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
        NormalizeError::mismatch(PARAM, "header name made of token characters", format!("{name:?}"))
    })?;
    let bytes = encode_latin1(value).ok_or_else(|| {
        NormalizeError::mismatch(
            PARAM,
            "header value encodable as ISO-8859-1",
            format!("value for {name:?}"),
        )
    })?;
    let header_value = HeaderValue::from_bytes(&bytes).map_err(|_| {
        NormalizeError::mismatch(
            PARAM,
            "header value without control characters",
            format!("value for {name:?}"),
        )
    })?;
    Ok((header_name, header_value))
}

fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&byte| char::from(byte)).collect()
}

fn encode_latin1(value: &str) -> Option<Vec<u8>> {
    value.chars().map(|c| u8::try_from(u32::from(c)).ok()).collect()
}
