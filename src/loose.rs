//! Decoding of untyped JSON values into the typed request inputs.
//!
//! Mapping shapes are JSON objects, decoded in document order; tuple shapes
//! are fixed-length arrays and scalars map to the scalar shapes. A JSON value of the wrong kind is a
//! [`NormalizeError::TypeMismatch`]; an array shorter than the shape it
//! starts is a [`NormalizeError::ShapeIncomplete`].
//!
//! ```
//! use reqnorm::RequestParams;
//!
//! let description = serde_json::json!({
//!     "method": "get",
//!     "url": "https://example.com/search",
//!     "params": {"q": "rust", "tag": ["a", "b"]},
//!     "timeout": [2, 30],
//!     "retries": true
//! });
//! let prepared = RequestParams::from_json(&description).unwrap().normalize().unwrap();
//! assert_eq!(prepared.head.url.query(), Some("q=rust&tag=a&tag=b"));
//! assert_eq!(prepared.retries.max_retries(), 3);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::auth::AuthInput;
use crate::body::BodyInput;
use crate::cookies::CookieInput;
use crate::error::NormalizeError;
use crate::headers::{HeaderInput, Headers};
use crate::multipart::{FileSource, FileSpec, MultipartInput};
use crate::query::QueryInput;
use crate::request::RequestParams;
use crate::retry::{DEFAULT_MAX_RETRIES, RetryInput, RetryPolicy};
use crate::timeout::{TimeoutConfig, TimeoutInput};
use crate::tls::{ClientCertInput, VerifyInput};

/// Keys accepted in a JSON request description.
const REQUEST_KEYS: [&str; 15] = [
    "method", "url", "headers", "cookies", "params", "data", "json", "files", "auth", "timeout",
    "verify", "cert", "proxies", "retries", "hooks",
];

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn mismatch(param: &'static str, expected: &'static str, value: &Value) -> NormalizeError {
    NormalizeError::mismatch(param, expected, kind(value))
}

fn string(param: &'static str, value: &Value) -> Result<String, NormalizeError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| mismatch(param, "string", value))
}

/// Strings as-is, numbers and booleans in their JSON spelling.
fn scalar_text(param: &'static str, value: &Value) -> Result<String, NormalizeError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(mismatch(param, "string, number or boolean", other)),
    }
}

fn number(param: &'static str, value: &Value) -> Result<f64, NormalizeError> {
    value.as_f64().ok_or_else(|| mismatch(param, "number of seconds", value))
}

/// Decodes `[a, b]` arrays, rejecting short and long arrays.
fn pair<'a>(
    param: &'static str,
    shape: &'static str,
    names: [&'static str; 2],
    value: &'a Value,
) -> Result<(&'a Value, &'a Value), NormalizeError> {
    match value.as_array().map(Vec::as_slice) {
        Some([a, b]) => Ok((a, b)),
        Some([]) => Err(NormalizeError::incomplete(param, shape, names[0])),
        Some([_]) => Err(NormalizeError::incomplete(param, shape, names[1])),
        Some(_) => Err(NormalizeError::mismatch(param, shape, "longer array")),
        None => Err(mismatch(param, shape, value)),
    }
}

fn string_pairs(param: &'static str, items: &[Value]) -> Result<Vec<(String, String)>, NormalizeError> {
    items
        .iter()
        .map(|item| {
            let (name, value) = pair(param, "(name, value) pair", ["name", "value"], item)?;
            Ok((string(param, name)?, scalar_text(param, value)?))
        })
        .collect()
}

fn string_map(param: &'static str, object: &Map<String, Value>) -> Result<BTreeMap<String, String>, NormalizeError> {
    object
        .iter()
        .map(|(key, value)| Ok((key.clone(), string(param, value)?)))
        .collect()
}

impl TryFrom<&Value> for HeaderInput {
    type Error = NormalizeError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(object) => {
                let mut headers = Headers::new();
                for (name, value) in object {
                    headers.insert(name.as_str(), string("headers", value)?);
                }
                Ok(Self::Headers(headers))
            }
            Value::Array(items) => Ok(Self::Pairs(string_pairs("headers", items)?)),
            other => Err(mismatch("headers", "object or array of [name, value] pairs", other)),
        }
    }
}

impl TryFrom<&Value> for CookieInput {
    type Error = NormalizeError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(object) => Ok(Self::Map(string_map("cookies", object)?)),
            other => Err(mismatch("cookies", "object of name → value", other)),
        }
    }
}

impl TryFrom<&Value> for QueryInput {
    type Error = NormalizeError;

    /// Object values may be arrays, which expand to repeated keys.
    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(raw) => Ok(Self::Raw(raw.clone())),
            Value::Array(items) => Ok(Self::Pairs(string_pairs("params", items)?)),
            Value::Object(object) => {
                let mut pairs = Vec::with_capacity(object.len());
                for (key, value) in object {
                    match value {
                        Value::Array(values) => {
                            for item in values {
                                pairs.push((key.clone(), scalar_text("params", item)?));
                            }
                        }
                        scalar => pairs.push((key.clone(), scalar_text("params", scalar)?)),
                    }
                }
                Ok(Self::Pairs(pairs))
            }
            other => Err(mismatch("params", "string, object or array of pairs", other)),
        }
    }
}

impl TryFrom<&Value> for BodyInput {
    type Error = NormalizeError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(text) => Ok(Self::Text(text.clone())),
            Value::Object(object) => Ok(Self::FormPairs(
                object
                    .iter()
                    .map(|(key, value)| Ok((key.clone(), scalar_text("data", value)?)))
                    .collect::<Result<_, NormalizeError>>()?,
            )),
            Value::Array(items) => Ok(Self::FormPairs(string_pairs("data", items)?)),
            other => Err(mismatch("data", "string, object or array of form pairs", other)),
        }
    }
}

impl TryFrom<&Value> for FileSpec {
    type Error = NormalizeError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        const PARAM: &str = "files";
        let items = match value {
            Value::String(content) => return Ok(Self::Content(FileSource::from(content.as_str()))),
            Value::Array(items) => items.as_slice(),
            other => return Err(mismatch(PARAM, "content string or file tuple", other)),
        };
        let content = |v: &Value| string(PARAM, v).map(FileSource::from);
        match items {
            [] => Err(NormalizeError::incomplete(PARAM, "file tuple", "file name")),
            [_] => Err(NormalizeError::incomplete(PARAM, "(file name, content) tuple", "content")),
            [name, body] => Ok(Self::Named(string(PARAM, name)?, content(body)?)),
            [name, body, content_type] => Ok(Self::Typed(
                string(PARAM, name)?,
                content(body)?,
                string(PARAM, content_type)?,
            )),
            [name, body, content_type, headers] => Ok(Self::Full(
                string(PARAM, name)?,
                content(body)?,
                string(PARAM, content_type)?,
                HeaderInput::try_from(headers)?,
            )),
            _ => Err(NormalizeError::mismatch(PARAM, "file tuple of at most 4 elements", "longer array")),
        }
    }
}

impl TryFrom<&Value> for MultipartInput {
    type Error = NormalizeError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(object) => Ok(Self::List(
                object
                    .iter()
                    .map(|(field, spec)| Ok((field.clone(), FileSpec::try_from(spec)?)))
                    .collect::<Result<_, NormalizeError>>()?,
            )),
            Value::Array(items) => Ok(Self::List(
                items
                    .iter()
                    .map(|item| {
                        let (field, spec) = pair("files", "(field, file spec) pair", ["field", "file spec"], item)?;
                        Ok((string("files", field)?, FileSpec::try_from(spec)?))
                    })
                    .collect::<Result<_, NormalizeError>>()?,
            )),
            other => Err(mismatch("files", "object or array of [field, spec] pairs", other)),
        }
    }
}

impl TryFrom<&Value> for AuthInput {
    type Error = NormalizeError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        let (username, password) = pair(
            "auth",
            "(username, password) pair",
            ["username", "password"],
            value,
        )?;
        Ok(Self::Basic(string("auth", username)?, string("auth", password)?))
    }
}

impl TryFrom<&Value> for TimeoutInput {
    type Error = NormalizeError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        const PARAM: &str = "timeout";
        match value {
            Value::Number(_) => Ok(Self::Total(number(PARAM, value)?)),
            Value::Array(items) => match items.as_slice() {
                [] => Err(NormalizeError::incomplete(PARAM, "(connect, total) tuple", "connect")),
                [_] => Err(NormalizeError::incomplete(PARAM, "(connect, total) tuple", "total")),
                [connect, total] => Ok(Self::ConnectTotal(number(PARAM, connect)?, number(PARAM, total)?)),
                [connect, read, total] => Ok(Self::ConnectReadTotal(
                    number(PARAM, connect)?,
                    number(PARAM, read)?,
                    number(PARAM, total)?,
                )),
                _ => Err(NormalizeError::mismatch(PARAM, "tuple of at most 3 numbers", "longer array")),
            },
            Value::Object(object) => {
                let bound = |key: &str| -> Result<Option<Duration>, NormalizeError> {
                    match object.get(key) {
                        None | Some(Value::Null) => Ok(None),
                        Some(v) => Duration::try_from_secs_f64(number(PARAM, v)?)
                            .map(Some)
                            .map_err(|e| NormalizeError::mismatch(PARAM, "non-negative number of seconds", e.to_string())),
                    }
                };
                Ok(Self::Structured(TimeoutConfig {
                    connect: bound("connect")?,
                    read: bound("read")?,
                    total: bound("total")?,
                }))
            }
            other => Err(mismatch(PARAM, "number, array or {connect, read, total} object", other)),
        }
    }
}

impl TryFrom<&Value> for VerifyInput {
    type Error = NormalizeError;

    /// Strings holding a PEM block are bundles; other strings are paths.
    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Bool(flag) => Ok(Self::Flag(*flag)),
            Value::String(s) if s.trim_start().starts_with("-----BEGIN") => Ok(Self::Pem(s.as_bytes().to_vec())),
            Value::String(path) => Ok(Self::Path(PathBuf::from(path))),
            other => Err(mismatch("verify", "boolean, CA bundle path or PEM string", other)),
        }
    }
}

impl TryFrom<&Value> for ClientCertInput {
    type Error = NormalizeError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        const PARAM: &str = "cert";
        match value {
            Value::String(pem) => Ok(Self::Pem(PathBuf::from(pem))),
            Value::Array(items) => match items.as_slice() {
                [] => Err(NormalizeError::incomplete(PARAM, "(cert, key) pair", "certificate")),
                [_] => Err(NormalizeError::incomplete(PARAM, "(cert, key) pair", "key")),
                [cert, key] => Ok(Self::Pair(
                    PathBuf::from(string(PARAM, cert)?),
                    PathBuf::from(string(PARAM, key)?),
                )),
                [cert, key, password] => Ok(Self::WithPassword(
                    PathBuf::from(string(PARAM, cert)?),
                    PathBuf::from(string(PARAM, key)?),
                    string(PARAM, password)?,
                )),
                _ => Err(NormalizeError::mismatch(PARAM, "tuple of at most 3 strings", "longer array")),
            },
            other => Err(mismatch(PARAM, "PEM path or [cert, key(, password)] array", other)),
        }
    }
}

impl TryFrom<&Value> for RetryInput {
    type Error = NormalizeError;

    /// Objects take `retries`, `base_delay_secs`, `max_delay_secs`,
    /// `backoff_multiplier`, `retry_statuses` and `respect_retry_after`;
    /// missing keys keep their defaults.
    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        const PARAM: &str = "retries";
        match value {
            Value::Bool(enabled) => Ok(Self::Enabled(*enabled)),
            Value::Number(_) => Ok(Self::Retries(retry_count(value)?)),
            Value::Object(object) => {
                let retries = object.get("retries").map(retry_count).transpose()?;
                let secs = |key: &str, fallback: Duration| -> Result<Duration, NormalizeError> {
                    match object.get(key) {
                        None => Ok(fallback),
                        Some(v) => Duration::try_from_secs_f64(number(PARAM, v)?)
                            .map_err(|e| NormalizeError::mismatch(PARAM, "non-negative number of seconds", e.to_string())),
                    }
                };
                let base_delay = secs("base_delay_secs", Duration::from_secs(1))?;
                let max_delay = secs("max_delay_secs", Duration::from_secs(32))?;
                #[allow(clippy::cast_possible_truncation)]
                let multiplier = match object.get("backoff_multiplier") {
                    None => 2.0,
                    Some(v) => number(PARAM, v)? as f32,
                };
                let mut policy = RetryPolicy::new(
                    retries.unwrap_or(DEFAULT_MAX_RETRIES),
                    base_delay,
                    max_delay,
                    multiplier,
                );
                if let Some(statuses) = object.get("retry_statuses") {
                    let items = statuses
                        .as_array()
                        .ok_or_else(|| mismatch(PARAM, "array of status codes", statuses))?;
                    let codes = items
                        .iter()
                        .map(|code| {
                            code.as_u64()
                                .and_then(|c| u16::try_from(c).ok())
                                .filter(|c| (100..=599).contains(c))
                                .ok_or_else(|| mismatch(PARAM, "HTTP status code", code))
                        })
                        .collect::<Result<Vec<u16>, _>>()?;
                    policy = policy.with_retry_statuses(codes);
                }
                if let Some(respect) = object.get("respect_retry_after") {
                    let respect = respect
                        .as_bool()
                        .ok_or_else(|| mismatch(PARAM, "boolean", respect))?;
                    policy = policy.with_respect_retry_after(respect);
                }
                Ok(Self::Policy(policy))
            }
            other => Err(mismatch(PARAM, "boolean, integer or policy object", other)),
        }
    }
}

fn retry_count(value: &Value) -> Result<u32, NormalizeError> {
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| NormalizeError::mismatch("retries", "non-negative integer", value.to_string()))
}

/// Decodes a scheme → proxy URL object.
///
/// # Errors
///
/// Returns [`NormalizeError::TypeMismatch`] for non-objects and non-string URLs.
pub fn proxies_from_json(value: &Value) -> Result<BTreeMap<String, String>, NormalizeError> {
    match value {
        Value::Object(object) => string_map("proxies", object),
        other => Err(mismatch("proxies", "object of scheme → proxy URL", other)),
    }
}

/// Decodes `[[host, port], target]` entries, where `target` is `null` or
/// `[host, port]`.
///
/// # Errors
///
/// Returns [`NormalizeError::TypeMismatch`] for wrong kinds and out-of-range
/// ports, [`NormalizeError::ShapeIncomplete`] for short arrays.
pub fn altsvc_from_json(value: &Value) -> Result<HashMap<(String, u16), Option<(String, u16)>>, NormalizeError> {
    const PARAM: &str = "altsvc";
    let authority = |v: &Value| -> Result<(String, u16), NormalizeError> {
        let (host, port) = pair(PARAM, "(host, port) pair", ["host", "port"], v)?;
        let port = port
            .as_u64()
            .and_then(|p| u16::try_from(p).ok())
            .ok_or_else(|| NormalizeError::mismatch(PARAM, "port number", port.to_string()))?;
        Ok((string(PARAM, host)?, port))
    };
    let items = value
        .as_array()
        .ok_or_else(|| mismatch(PARAM, "array of [origin, target] entries", value))?;
    items
        .iter()
        .map(|item| {
            let (origin, target) = pair(PARAM, "(origin, target) entry", ["origin", "target"], item)?;
            let target = match target {
                Value::Null => None,
                other => Some(authority(other)?),
            };
            Ok((authority(origin)?, target))
        })
        .collect()
}

impl RequestParams {
    /// Builds request parameters from a JSON request description.
    ///
    /// The object takes `method` (default `GET`), `url` and any of the
    /// request parameters by name. Hooks cannot be expressed in JSON.
    ///
    /// # Errors
    ///
    /// - [`NormalizeError::TypeMismatch`] for a non-object, unknown keys,
    ///   hooks, or a parameter of the wrong JSON kind
    /// - [`NormalizeError::ShapeIncomplete`] when `url` is missing or a
    ///   tuple-shaped parameter is short
    #[instrument(level = "debug", skip(value))]
    pub fn from_json(value: &Value) -> Result<Self, NormalizeError> {
        const PARAM: &str = "request";
        let object = value
            .as_object()
            .ok_or_else(|| mismatch(PARAM, "request description object", value))?;
        if let Some(unknown) = object.keys().find(|key| !REQUEST_KEYS.contains(&key.as_str())) {
            return Err(NormalizeError::mismatch(PARAM, "known request parameter", format!("{unknown:?}")));
        }
        if object.contains_key("hooks") {
            return Err(NormalizeError::mismatch(
                "hooks",
                "callables registered through the API",
                "JSON value",
            ));
        }

        let method = match object.get("method") {
            Some(method) => string("method", method)?,
            None => "GET".to_string(),
        };
        let url = object
            .get("url")
            .ok_or_else(|| NormalizeError::incomplete(PARAM, "request description", "url"))
            .and_then(|url| string("url", url))?;

        let mut params = RequestParams::new(method, url);
        for (key, value) in object {
            if value.is_null() {
                continue;
            }
            params = match key.as_str() {
                "headers" => params.headers(HeaderInput::try_from(value)?),
                "cookies" => params.cookies(CookieInput::try_from(value)?),
                "params" => params.params(QueryInput::try_from(value)?),
                "data" => params.data(BodyInput::try_from(value)?),
                "json" => params.json(value.clone()),
                "files" => params.files(MultipartInput::try_from(value)?),
                "auth" => params.auth(AuthInput::try_from(value)?),
                "timeout" => params.timeout(TimeoutInput::try_from(value)?),
                "verify" => params.verify(VerifyInput::try_from(value)?),
                "cert" => params.cert(ClientCertInput::try_from(value)?),
                "proxies" => params.proxies(proxies_from_json(value)?),
                "retries" => params.retries(RetryInput::try_from(value)?),
                _ => params,
            };
        }
        debug!(keys = object.len(), "decoded request description");
        Ok(params)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::altsvc::normalize_altsvc;
    use crate::body::Body;
    use crate::headers::normalize_headers;
    use crate::multipart::normalize_files;
    use crate::timeout::normalize_timeout;

    #[test]
    fn test_header_object_and_pairs_agree() {
        let from_object = normalize_headers(HeaderInput::try_from(&json!({"Accept": "*/*"})).unwrap()).unwrap();
        let from_pairs = normalize_headers(HeaderInput::try_from(&json!([["accept", "*/*"]])).unwrap()).unwrap();
        assert_eq!(from_object, from_pairs);
    }

    #[test]
    fn test_objects_keep_document_order() {
        let prepared = RequestParams::from_json(&json!({
            "url": "https://x.test/",
            "params": {"z": "1", "a": "2"},
            "headers": {"Z-H": "1", "A-H": "2"},
            "data": {"zeta": 1, "alpha": 2}
        }))
        .unwrap()
        .normalize()
        .unwrap();
        assert_eq!(prepared.head.url.query(), Some("z=1&a=2"));
        let names: Vec<&str> = prepared
            .head
            .headers
            .iter()
            .map(|(name, _)| name)
            .filter(|name| name.ends_with("-H"))
            .collect();
        assert_eq!(names, vec!["Z-H", "A-H"]);
        let Some(Body::Form(fields)) = prepared.body else {
            panic!("expected a form body");
        };
        assert_eq!(fields.encode(), "zeta=1&alpha=2");
    }

    #[test]
    fn test_wrong_kind_is_type_mismatch() {
        let err = HeaderInput::try_from(&json!(42)).unwrap_err();
        assert_eq!(
            err,
            NormalizeError::mismatch("headers", "object or array of [name, value] pairs", "number")
        );
        assert!(matches!(
            TimeoutInput::try_from(&json!("soon")).unwrap_err(),
            NormalizeError::TypeMismatch { param: "timeout", .. }
        ));
        assert!(matches!(
            RetryInput::try_from(&json!(-1)).unwrap_err(),
            NormalizeError::TypeMismatch { param: "retries", .. }
        ));
    }

    #[test]
    fn test_short_pair_is_shape_incomplete() {
        let err = HeaderInput::try_from(&json!([["X-Only-Name"]])).unwrap_err();
        assert_eq!(err, NormalizeError::incomplete("headers", "(name, value) pair", "value"));

        let err = AuthInput::try_from(&json!(["user"])).unwrap_err();
        assert!(matches!(err, NormalizeError::ShapeIncomplete { missing: "password", .. }));
    }

    #[test]
    fn test_timeout_shapes() {
        let five = normalize_timeout(TimeoutInput::try_from(&json!(5)).unwrap()).unwrap();
        let pair = normalize_timeout(TimeoutInput::try_from(&json!([5, 5])).unwrap()).unwrap();
        let triple = normalize_timeout(TimeoutInput::try_from(&json!([5, 5, 5])).unwrap()).unwrap();
        assert_eq!(five, pair);
        assert_eq!(pair, triple);

        let structured = TimeoutInput::try_from(&json!({"connect": 1.5})).unwrap();
        assert_eq!(
            structured,
            TimeoutInput::Structured(TimeoutConfig {
                connect: Some(Duration::from_millis(1500)),
                ..TimeoutConfig::default()
            })
        );
        assert!(matches!(
            TimeoutInput::try_from(&json!([1])).unwrap_err(),
            NormalizeError::ShapeIncomplete { missing: "total", .. }
        ));
    }

    #[test]
    fn test_file_specs() {
        let files = normalize_files(
            MultipartInput::try_from(&json!([
                ["a", "bare"],
                ["b", ["b.txt", "data"]],
                ["c", ["c.txt", "data", "text/plain", {"X-Foo": "bar"}]]
            ]))
            .unwrap(),
        )
        .unwrap();
        assert_eq!(files.get("a").unwrap().file_name, "a");
        assert_eq!(files.get("b").unwrap().content_type, "application/octet-stream");
        let c = files.get("c").unwrap();
        assert_eq!(c.content_type, "text/plain");
        assert_eq!(c.headers.get("x-foo"), Some("bar"));

        let err = MultipartInput::try_from(&json!({"a": ["a.txt"]})).unwrap_err();
        assert!(matches!(err, NormalizeError::ShapeIncomplete { missing: "content", .. }));
    }

    #[test]
    fn test_verify_and_cert() {
        assert!(matches!(VerifyInput::try_from(&json!(false)).unwrap(), VerifyInput::Flag(false)));
        assert!(matches!(
            VerifyInput::try_from(&json!("/etc/ca.pem")).unwrap(),
            VerifyInput::Path(_)
        ));
        assert!(matches!(
            VerifyInput::try_from(&json!("-----BEGIN CERTIFICATE-----\n")).unwrap(),
            VerifyInput::Pem(_)
        ));
        assert!(matches!(
            ClientCertInput::try_from(&json!(["c.pem"])).unwrap_err(),
            NormalizeError::ShapeIncomplete { missing: "key", .. }
        ));
    }

    #[test]
    fn test_retry_policy_object() {
        let RetryInput::Policy(policy) = RetryInput::try_from(&json!({
            "retries": 4,
            "retry_statuses": [502],
            "respect_retry_after": false
        }))
        .unwrap() else {
            panic!("expected a structured policy");
        };
        assert_eq!(policy.max_retries(), 4);
        assert!(policy.is_retryable_status(502));
        assert!(!policy.is_retryable_status(503));
        assert!(!policy.respects_retry_after());
    }

    #[test]
    fn test_altsvc_absent_vs_none() {
        let map = altsvc_from_json(&json!([
            [["a.example", 443], null],
            [["b.example", 443], ["alt.example", 8443]]
        ]))
        .unwrap();
        assert_eq!(map.get(&("a.example".to_string(), 443)), Some(&None));
        assert!(!map.contains_key(&("c.example".to_string(), 443)));
        assert_eq!(normalize_altsvc(map.clone()).unwrap().into_map(), map);
    }

    #[test]
    fn test_request_description() {
        let params = RequestParams::from_json(&json!({
            "method": "post",
            "url": "https://example.com/upload",
            "headers": {"X-Trace": "1"},
            "data": {"a": 1, "b": true},
            "auth": ["user", "pw"],
            "cookies": null
        }))
        .unwrap();
        let prepared = params.normalize().unwrap();
        assert_eq!(prepared.head.method.as_str(), "POST");
        assert_eq!(prepared.head.headers.get("x-trace"), Some("1"));
        assert_eq!(prepared.body.unwrap().kind(), "form");
    }

    #[test]
    fn test_request_description_errors() {
        assert!(matches!(
            RequestParams::from_json(&json!([])).unwrap_err(),
            NormalizeError::TypeMismatch { param: "request", .. }
        ));
        assert!(matches!(
            RequestParams::from_json(&json!({"method": "GET"})).unwrap_err(),
            NormalizeError::ShapeIncomplete { missing: "url", .. }
        ));
        assert!(matches!(
            RequestParams::from_json(&json!({"url": "https://x", "colour": "red"})).unwrap_err(),
            NormalizeError::TypeMismatch { param: "request", .. }
        ));
        assert!(matches!(
            RequestParams::from_json(&json!({"url": "https://x", "hooks": {}})).unwrap_err(),
            NormalizeError::TypeMismatch { param: "hooks", .. }
        ));
    }
}
