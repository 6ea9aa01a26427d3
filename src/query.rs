//! Query parameter normalization.
//!
//! Pair and mapping shapes become an ordered list of key/value pairs; raw
//! strings and bytes are kept verbatim. Duplicate keys are kept and order is
//! never changed.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::iter;

use serde::Serialize;
use tracing::{debug, instrument};
use url::Url;
use url::form_urlencoded;

use crate::error::NormalizeError;

const PARAM: &str = "params";

/// Accepted shapes for the `params` request parameter.
#[derive(Debug, Clone)]
pub enum QueryInput {
    /// Ordered key/value pairs.
    Pairs(Vec<(String, String)>),
    /// Plain mapping (iterated in key order).
    Map(BTreeMap<String, String>),
    /// Raw `application/x-www-form-urlencoded` bytes.
    Bytes(Vec<u8>),
    /// Raw query string, with or without a leading `?`.
    Raw(String),
}

impl From<Vec<(String, String)>> for QueryInput {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Self::Pairs(pairs)
    }
}

impl<const N: usize> From<[(&str, &str); N]> for QueryInput {
    fn from(pairs: [(&str, &str); N]) -> Self {
        Self::Pairs(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        )
    }
}

impl From<BTreeMap<String, String>> for QueryInput {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self::Map(map)
    }
}

impl From<&str> for QueryInput {
    fn from(raw: &str) -> Self {
        Self::Raw(raw.to_string())
    }
}

/// One piece of a query: an encoded-on-output pair or a verbatim raw string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuerySegment {
    Pair(String, String),
    /// Appended to the URL exactly as given.
    Raw(String),
}

/// Ordered query parameters.
///
/// Raw query strings are kept verbatim, so valueless keys and the caller's
/// own escaping survive into the URL. Lookups see the decoded pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct QueryParams {
    segments: Vec<QuerySegment>,
}

impl QueryParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of decoded pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.segments.push(QuerySegment::Pair(key.into(), value.into()));
    }

    #[must_use]
    pub fn segments(&self) -> &[QuerySegment] {
        &self.segments
    }

    /// Iterates over decoded `(key, value)` pairs in order. A valueless key
    /// in a raw segment yields an empty value.
    pub fn iter(&self) -> impl Iterator<Item = (Cow<'_, str>, Cow<'_, str>)> {
        self.segments.iter().flat_map(decoded_pairs)
    }

    /// Every decoded value stored under `key`, in order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = Cow<'a, str>> + 'a {
        self.iter().filter(move |(k, _)| k == key).map(|(_, v)| v)
    }

    /// Appends all of `other`'s segments after this collection's segments.
    pub fn extend(&mut self, other: &QueryParams) {
        self.segments.extend(other.segments.iter().cloned());
    }

    /// Encodes as `application/x-www-form-urlencoded`, raw segments verbatim.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut encoded = String::new();
        for segment in &self.segments {
            let piece = match segment {
                QuerySegment::Pair(k, v) => form_urlencoded::Serializer::new(String::new())
                    .append_pair(k, v)
                    .finish(),
                QuerySegment::Raw(raw) => raw.clone(),
            };
            if piece.is_empty() {
                continue;
            }
            if !encoded.is_empty() {
                encoded.push('&');
            }
            encoded.push_str(&piece);
        }
        encoded
    }

    /// Appends the segments to the URL's existing query.
    pub fn apply_to(&self, url: &mut Url) {
        for segment in &self.segments {
            match segment {
                QuerySegment::Pair(k, v) => {
                    url.query_pairs_mut().append_pair(k, v);
                }
                QuerySegment::Raw(raw) => {
                    let query = match url.query() {
                        Some(existing) if !existing.is_empty() => format!("{existing}&{raw}"),
                        _ => raw.clone(),
                    };
                    url.set_query(Some(&query));
                }
            }
        }
    }
}

/// Normalizes any accepted query shape into [`QueryParams`].
///
/// # Errors
///
/// Returns [`NormalizeError::TypeMismatch`] when a pair has an empty key, or
/// raw bytes are not UTF-8.
#[instrument(level = "debug", skip(input))]
pub fn normalize_query(input: QueryInput) -> Result<QueryParams, NormalizeError> {
    let segments = match input {
        QueryInput::Pairs(pairs) => checked_pairs(pairs)?,
        QueryInput::Map(map) => checked_pairs(map.into_iter().collect())?,
        QueryInput::Bytes(bytes) => {
            let raw = String::from_utf8(bytes).map_err(|err| {
                NormalizeError::mismatch(PARAM, "UTF-8 query bytes", format!("{:?}", err.as_bytes()))
            })?;
            raw_segment(&raw)
        }
        QueryInput::Raw(raw) => raw_segment(&raw),
    };
    let params = QueryParams { segments };
    debug!(count = params.len(), "normalized query parameters");
    Ok(params)
}

fn decoded_pairs(segment: &QuerySegment) -> Box<dyn Iterator<Item = (Cow<'_, str>, Cow<'_, str>)> + '_> {
    match segment {
        QuerySegment::Pair(k, v) => Box::new(iter::once((Cow::Borrowed(k.as_str()), Cow::Borrowed(v.as_str())))),
        QuerySegment::Raw(raw) => Box::new(form_urlencoded::parse(raw.as_bytes())),
    }
}

fn checked_pairs(pairs: Vec<(String, String)>) -> Result<Vec<QuerySegment>, NormalizeError> {
    if let Some((_, value)) = pairs.iter().find(|(key, _)| key.is_empty()) {
        return Err(NormalizeError::mismatch(
            PARAM,
            "non-empty query keys",
            format!("empty key with value {value:?}"),
        ));
    }
    Ok(pairs.into_iter().map(|(k, v)| QuerySegment::Pair(k, v)).collect())
}

fn raw_segment(raw: &str) -> Vec<QuerySegment> {
    let raw = raw.strip_prefix('?').unwrap_or(raw);
    if raw.is_empty() {
        Vec::new()
    } else {
        vec![QuerySegment::Raw(raw.to_string())]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn decoded(params: &QueryParams) -> Vec<(String, String)> {
        params.iter().map(|(k, v)| (k.into_owned(), v.into_owned())).collect()
    }

    #[test]
    fn test_pairs_keep_duplicates_and_order() {
        let params = normalize_query([("b", "2"), ("a", "1"), ("b", "3")].into()).unwrap();
        assert_eq!(
            decoded(&params),
            vec![
                ("b".to_string(), "2".to_string()),
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "3".to_string())
            ]
        );
        assert_eq!(params.get_all("b").collect::<Vec<_>>(), vec!["2", "3"]);
    }

    #[test]
    fn test_raw_string_and_bytes_decode_alike() {
        let from_raw = normalize_query("?q=rust+lang&page=2&q=more".into()).unwrap();
        let from_bytes =
            normalize_query(QueryInput::Bytes(b"q=rust%20lang&page=2&q=more".to_vec())).unwrap();
        assert_eq!(decoded(&from_raw), decoded(&from_bytes));
        assert_eq!(from_raw.get_all("q").collect::<Vec<_>>(), vec!["rust lang", "more"]);
        assert_eq!(from_raw.len(), 3);
    }

    #[test]
    fn test_raw_query_appended_verbatim() {
        let mut url = Url::parse("https://x.test/").unwrap();
        normalize_query("flag&a=%7E".into()).unwrap().apply_to(&mut url);
        assert_eq!(url.as_str(), "https://x.test/?flag&a=%7E");

        let mut url = Url::parse("https://x.test/?lang=en").unwrap();
        normalize_query("=x".into()).unwrap().apply_to(&mut url);
        assert_eq!(url.query(), Some("lang=en&=x"));
    }

    #[test]
    fn test_non_utf8_bytes_are_type_mismatch() {
        let err = normalize_query(QueryInput::Bytes(vec![0xFF, b'=', b'1'])).unwrap_err();
        assert!(matches!(err, NormalizeError::TypeMismatch { param: "params", .. }));
    }

    #[test]
    fn test_map_matches_equivalent_pairs() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), "1".to_string());
        map.insert("b".to_string(), "2".to_string());
        let from_map = normalize_query(map.into()).unwrap();
        let from_pairs = normalize_query([("a", "1"), ("b", "2")].into()).unwrap();
        assert_eq!(from_map, from_pairs);
    }

    #[test]
    fn test_empty_key_is_type_mismatch() {
        let err = normalize_query([("", "orphan")].into()).unwrap_err();
        assert!(matches!(err, NormalizeError::TypeMismatch { param: "params", .. }));
    }

    #[test]
    fn test_apply_to_appends_after_existing_query() {
        let mut url = Url::parse("https://example.com/search?lang=en").unwrap();
        let params = normalize_query([("q", "a b"), ("q", "c")].into()).unwrap();
        params.apply_to(&mut url);
        assert_eq!(url.as_str(), "https://example.com/search?lang=en&q=a+b&q=c");
    }

    #[test]
    fn test_encode() {
        let mut params = normalize_query([("name", "José"), ("x", "&")].into()).unwrap();
        params.extend(&normalize_query("flag".into()).unwrap());
        assert_eq!(params.encode(), "name=Jos%C3%A9&x=%26&flag");
    }
}
