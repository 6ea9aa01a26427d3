//! Body normalization.
//!
//! A payload is either a raw byte source (text, bytes, a shared buffer or a
//! readable stream) or a set of form fields. Exactly one representation is
//! produced per request.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, instrument};
use url::form_urlencoded;

use crate::error::NormalizeError;

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Accepted shapes for the `data` request parameter.
pub enum BodyInput {
    Text(String),
    Bytes(Vec<u8>),
    Buffer(Bytes),
    Reader(Box<dyn Read + Send>),
    /// Ordered form fields.
    FormPairs(Vec<(String, String)>),
    /// Form fields as a mapping.
    FormMap(BTreeMap<String, String>),
}

impl fmt::Debug for BodyInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(&text.len()).finish(),
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Buffer(bytes) => f.debug_tuple("Buffer").field(&bytes.len()).finish(),
            Self::Reader(_) => f.write_str("Reader(..)"),
            Self::FormPairs(pairs) => f.debug_tuple("FormPairs").field(&pairs.len()).finish(),
            Self::FormMap(map) => f.debug_tuple("FormMap").field(&map.len()).finish(),
        }
    }
}

impl From<String> for BodyInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for BodyInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Vec<u8>> for BodyInput {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Bytes> for BodyInput {
    fn from(bytes: Bytes) -> Self {
        Self::Buffer(bytes)
    }
}

impl From<BTreeMap<String, String>> for BodyInput {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self::FormMap(map)
    }
}

impl From<Vec<(String, String)>> for BodyInput {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Self::FormPairs(pairs)
    }
}

/// A readable stream handed through to the transport untouched.
pub struct BodyStream(Box<dyn Read + Send>);

impl BodyStream {
    pub fn new(reader: impl Read + Send + 'static) -> Self {
        Self(Box::new(reader))
    }

    /// Returns the underlying reader.
    #[must_use]
    pub fn into_inner(self) -> Box<dyn Read + Send> {
        self.0
    }
}

impl Read for BodyStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }
}

impl fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BodyStream(..)")
    }
}

/// A byte-producing content source.
#[derive(Debug)]
pub enum RawBody {
    Bytes(Bytes),
    Stream(BodyStream),
}

impl RawBody {
    /// Known length, or `None` for streams.
    #[must_use]
    pub fn len(&self) -> Option<u64> {
        match self {
            Self::Bytes(bytes) => u64::try_from(bytes.len()).ok(),
            Self::Stream(_) => None,
        }
    }

    /// Whether the source is known to be empty. Streams are never known empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Drains the source into memory.
    ///
    /// # Errors
    ///
    /// Propagates read errors from a stream source.
    pub fn into_bytes(self) -> std::io::Result<Bytes> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::Stream(mut stream) => {
                let mut buf = Vec::new();
                stream.read_to_end(&mut buf)?;
                Ok(Bytes::from(buf))
            }
        }
    }
}

/// Ordered form fields, encoded as `application/x-www-form-urlencoded`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FormFields {
    fields: Vec<(String, String)>,
}

impl FormFields {
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn encode(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.fields.iter())
            .finish()
    }
}

/// Canonical request payload.
#[derive(Debug)]
pub enum Body {
    Raw(RawBody),
    Form(FormFields),
}

impl Body {
    /// Content type implied by the representation, if any.
    #[must_use]
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            Self::Raw(_) => None,
            Self::Form(_) => Some(FORM_CONTENT_TYPE),
        }
    }

    /// Length in bytes when known up front.
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        match self {
            Self::Raw(raw) => raw.len(),
            Self::Form(form) => u64::try_from(form.encode().len()).ok(),
        }
    }

    /// Short label used in summaries and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Raw(RawBody::Bytes(_)) => "bytes",
            Self::Raw(RawBody::Stream(_)) => "stream",
            Self::Form(_) => "form",
        }
    }
}

/// Normalizes any accepted body shape into a [`Body`].
///
/// # Errors
///
/// Returns [`NormalizeError::TypeMismatch`] when a form field has an empty name.
#[instrument(level = "debug")]
pub fn normalize_body(input: BodyInput) -> Result<Body, NormalizeError> {
    let body = match input {
        BodyInput::Text(text) => Body::Raw(RawBody::Bytes(Bytes::from(text))),
        BodyInput::Bytes(bytes) => Body::Raw(RawBody::Bytes(Bytes::from(bytes))),
        BodyInput::Buffer(bytes) => Body::Raw(RawBody::Bytes(bytes)),
        BodyInput::Reader(reader) => Body::Raw(RawBody::Stream(BodyStream(reader))),
        BodyInput::FormPairs(fields) => Body::Form(checked_form(fields)?),
        BodyInput::FormMap(map) => Body::Form(checked_form(map.into_iter().collect())?),
    };
    debug!(kind = body.kind(), length = ?body.content_length(), "normalized body");
    Ok(body)
}

/// Serializes a JSON payload into a raw body.
///
/// # Errors
///
/// Returns [`NormalizeError::TypeMismatch`] if the value cannot be serialized
/// (for example a map with non-string keys built through a custom `Serialize`).
pub fn normalize_json(value: &serde_json::Value) -> Result<Body, NormalizeError> {
    let encoded = serde_json::to_vec(value)
        .map_err(|e| NormalizeError::mismatch("json", "JSON-serializable value", e.to_string()))?;
    Ok(Body::Raw(RawBody::Bytes(Bytes::from(encoded))))
}

fn checked_form(fields: Vec<(String, String)>) -> Result<FormFields, NormalizeError> {
    if let Some((_, value)) = fields.iter().find(|(name, _)| name.is_empty()) {
        return Err(NormalizeError::mismatch(
            "data",
            "form fields with non-empty names",
            format!("empty name with value {value:?}"),
        ));
    }
    Ok(FormFields { fields })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_text_and_bytes_become_raw_bytes() {
        for input in [
            BodyInput::from("hello"),
            BodyInput::from(b"hello".to_vec()),
            BodyInput::from(Bytes::from_static(b"hello")),
        ] {
            let body = normalize_body(input).unwrap();
            assert_eq!(body.kind(), "bytes");
            assert_eq!(body.content_length(), Some(5));
            assert_eq!(body.content_type(), None);
        }
    }

    #[test]
    fn test_reader_becomes_stream_with_unknown_length() {
        let body = normalize_body(BodyInput::Reader(Box::new(Cursor::new(b"abc".to_vec())))).unwrap();
        assert_eq!(body.kind(), "stream");
        assert_eq!(body.content_length(), None);
        let Body::Raw(raw) = body else {
            panic!("expected raw body");
        };
        assert!(!raw.is_empty());
        assert_eq!(raw.into_bytes().unwrap(), Bytes::from_static(b"abc"));
    }

    #[test]
    fn test_form_map_and_pairs_encode_identically() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), "1".to_string());
        map.insert("b".to_string(), "x y".to_string());
        let from_map = normalize_body(map.into()).unwrap();
        let from_pairs = normalize_body(BodyInput::FormPairs(vec![
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "x y".to_string()),
        ]))
        .unwrap();

        let (Body::Form(a), Body::Form(b)) = (from_map, from_pairs) else {
            panic!("expected form bodies");
        };
        assert_eq!(a, b);
        assert_eq!(a.encode(), "a=1&b=x+y");
    }

    #[test]
    fn test_form_content_type() {
        let body = normalize_body(BodyInput::FormPairs(vec![("k".into(), "v".into())])).unwrap();
        assert_eq!(body.content_type(), Some(FORM_CONTENT_TYPE));
        assert_eq!(body.content_length(), Some(3));
    }

    #[test]
    fn test_empty_form_name_is_type_mismatch() {
        let err = normalize_body(BodyInput::FormPairs(vec![(String::new(), "v".into())])).unwrap_err();
        assert!(matches!(err, NormalizeError::TypeMismatch { param: "data", .. }));
    }

    #[test]
    fn test_json_payload_is_compact_bytes() {
        let body = normalize_json(&serde_json::json!({"a": [1, 2]})).unwrap();
        let Body::Raw(raw) = body else {
            panic!("expected raw body");
        };
        assert_eq!(raw.into_bytes().unwrap(), Bytes::from_static(br#"{"a":[1,2]}"#));
    }
}
