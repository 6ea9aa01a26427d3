//! Request-level normalization.
//!
//! [`RequestParams`] collects every loosely-typed request argument. Calling
//! [`RequestParams::normalize`] (or [`crate::Session::prepare`]) runs each
//! through its normalizer, checks the cross-parameter rules and produces a
//! [`PreparedRequest`] ready to hand to a transport.
//!
//! ```
//! use reqnorm::RequestParams;
//!
//! let prepared = RequestParams::new("post", "https://user:pw@api.example.com/items")
//!     .params([("page", "2")])
//!     .json(serde_json::json!({"name": "widget"}))
//!     .timeout(5.0)
//!     .normalize()
//!     .unwrap();
//!
//! assert_eq!(prepared.head.method.as_str(), "POST");
//! assert_eq!(prepared.head.url.as_str(), "https://api.example.com/items?page=2");
//! assert_eq!(prepared.head.headers.get("content-type"), Some("application/json"));
//! assert!(prepared.head.headers.get("authorization").unwrap().starts_with("Basic "));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::sync::Arc;

use percent_encoding::percent_decode_str;
use reqwest::Method;
use serde::Serialize;
use tracing::{debug, instrument};
use url::Url;

use crate::auth::{Auth, AuthInput, normalize_auth};
use crate::body::{Body, BodyInput, JSON_CONTENT_TYPE, RawBody, normalize_body, normalize_json};
use crate::cookies::{CookieInput, CookieStore, normalize_cookies};
use crate::error::NormalizeError;
use crate::headers::{HeaderInput, Headers, normalize_headers};
use crate::hooks::{Hook, HookEvent, HookFn, Hooks, normalize_hooks};
use crate::multipart::{
    MultipartFiles, MultipartInput, generate_boundary, multipart_content_type, normalize_files,
};
use crate::proxy::{ProxyMap, normalize_proxies};
use crate::query::{QueryInput, normalize_query};
use crate::retry::{RetryInput, RetryPolicy, normalize_retry};
use crate::timeout::{TimeoutInput, Timeouts, normalize_timeout};
use crate::tls::{ClientCert, ClientCertInput, TrustAnchor, VerifyInput, normalize_client_cert, normalize_verify};

pub const CONTENT_TYPE: &str = "Content-Type";
pub const COOKIE: &str = "Cookie";

/// Method, URL and headers of a request; the value `pre_request` hooks see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: Method,
    pub url: Url,
    pub headers: Headers,
}

/// Loosely-typed request arguments, gathered with builder calls.
#[must_use]
pub struct RequestParams {
    method: String,
    url: String,
    headers: Option<HeaderInput>,
    cookies: Option<CookieInput>,
    params: Option<QueryInput>,
    data: Option<BodyInput>,
    json: Option<serde_json::Value>,
    files: Option<MultipartInput>,
    auth: Option<AuthInput>,
    timeout: Option<TimeoutInput>,
    verify: Option<VerifyInput>,
    cert: Option<ClientCertInput>,
    proxies: Option<BTreeMap<String, String>>,
    retries: Option<RetryInput>,
    hooks: Vec<(String, Vec<HookFn<RequestHead>>)>,
}

impl fmt::Debug for RequestParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestParams")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers.is_some())
            .field("cookies", &self.cookies.is_some())
            .field("params", &self.params.is_some())
            .field("data", &self.data)
            .field("json", &self.json.is_some())
            .field("files", &self.files.is_some())
            .field("hooks", &self.hooks.len())
            .finish_non_exhaustive()
    }
}

impl RequestParams {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: None,
            cookies: None,
            params: None,
            data: None,
            json: None,
            files: None,
            auth: None,
            timeout: None,
            verify: None,
            cert: None,
            proxies: None,
            retries: None,
            hooks: Vec::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new("POST", url)
    }

    pub fn headers(mut self, headers: impl Into<HeaderInput>) -> Self {
        self.headers = Some(headers.into());
        self
    }

    pub fn cookies(mut self, cookies: impl Into<CookieInput>) -> Self {
        self.cookies = Some(cookies.into());
        self
    }

    pub fn params(mut self, params: impl Into<QueryInput>) -> Self {
        self.params = Some(params.into());
        self
    }

    pub fn data(mut self, data: impl Into<BodyInput>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.json = Some(value);
        self
    }

    pub fn files(mut self, files: impl Into<MultipartInput>) -> Self {
        self.files = Some(files.into());
        self
    }

    pub fn auth(mut self, auth: impl Into<AuthInput>) -> Self {
        self.auth = Some(auth.into());
        self
    }

    pub fn timeout(mut self, timeout: impl Into<TimeoutInput>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }

    pub fn verify(mut self, verify: impl Into<VerifyInput>) -> Self {
        self.verify = Some(verify.into());
        self
    }

    pub fn cert(mut self, cert: impl Into<ClientCertInput>) -> Self {
        self.cert = Some(cert.into());
        self
    }

    pub fn proxies<K: Into<String>, V: Into<String>>(
        mut self,
        proxies: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        self.proxies = Some(
            proxies
                .into_iter()
                .map(|(key, url)| (key.into(), url.into()))
                .collect(),
        );
        self
    }

    pub fn retries(mut self, retries: impl Into<RetryInput>) -> Self {
        self.retries = Some(retries.into());
        self
    }

    /// Registers a hook under an event name; unknown names fail at normalization.
    pub fn hook(mut self, event: impl Into<String>, hook: impl Hook<RequestHead> + 'static) -> Self {
        let event = event.into();
        let hook: HookFn<RequestHead> = Arc::new(hook);
        match self.hooks.iter_mut().find(|(name, _)| *name == event) {
            Some((_, hooks)) => hooks.push(hook),
            None => self.hooks.push((event, vec![hook])),
        }
        self
    }

    /// Normalizes with no session defaults.
    ///
    /// # Errors
    ///
    /// Returns the first [`NormalizeError`] raised by any parameter.
    pub fn normalize(self) -> Result<PreparedRequest, NormalizeError> {
        self.normalize_with(&RequestDefaults::default())
    }

    /// Normalizes every parameter and layers the request over `defaults`.
    ///
    /// # Errors
    ///
    /// - [`NormalizeError::ShapeConflict`] for `data` + `files`, `json` +
    ///   `files`, or `data` + `json`
    /// - [`NormalizeError::TypeMismatch`] for an invalid method or a URL that
    ///   is not absolute `http`/`https`
    /// - any error from the per-parameter normalizers
    #[instrument(level = "debug", skip_all, fields(method = %self.method, url = %self.url))]
    pub fn normalize_with(self, defaults: &RequestDefaults) -> Result<PreparedRequest, NormalizeError> {
        let RequestParams {
            method,
            url,
            headers,
            cookies,
            params,
            data,
            json,
            files,
            auth,
            timeout,
            verify,
            cert,
            proxies,
            retries,
            hooks,
        } = self;

        if data.is_some() && files.is_some() {
            return Err(NormalizeError::conflict("data", "files"));
        }
        if json.is_some() && files.is_some() {
            return Err(NormalizeError::conflict("json", "files"));
        }
        if data.is_some() && json.is_some() {
            return Err(NormalizeError::conflict("data", "json"));
        }

        let method = normalize_method(&method)?;
        let mut url = normalize_url(&url)?;
        if let Some(params) = params {
            normalize_query(params)?.apply_to(&mut url);
        }
        let userinfo = take_userinfo(&mut url)?;

        let mut merged_headers = defaults.headers.clone();
        if let Some(headers) = headers {
            merged_headers.merge(&normalize_headers(headers)?);
        }

        let (body, implied_type) = match (data, json) {
            (Some(data), _) => {
                let body = normalize_body(data)?;
                let implied = body.content_type();
                (Some(body), implied)
            }
            (None, Some(value)) => (Some(normalize_json(&value)?), Some(JSON_CONTENT_TYPE)),
            (None, None) => (None, None),
        };
        if let Some(content_type) = implied_type
            && !merged_headers.contains(CONTENT_TYPE)
        {
            merged_headers.insert(CONTENT_TYPE, content_type);
        }
        let files = files.map(normalize_files).transpose()?;

        let mut jar = defaults.cookies.clone();
        if let Some(cookies) = cookies {
            jar.merge(&normalize_cookies(cookies)?);
        }
        if !merged_headers.contains(COOKIE)
            && let Some(header) = jar.cookie_header(&url)
        {
            merged_headers.insert(COOKIE, header);
        }

        let auth = match auth {
            Some(input) => Some(normalize_auth(input)?),
            None => match (&defaults.auth, userinfo) {
                (Some(session_auth), _) => Some(session_auth.clone()),
                (None, Some((username, password))) => {
                    Some(normalize_auth(AuthInput::Basic(username, password))?)
                }
                (None, None) => None,
            },
        };
        if let Some(auth) = &auth {
            auth.apply(&mut merged_headers);
        }

        let timeout = timeout
            .map(normalize_timeout)
            .transpose()?
            .unwrap_or(defaults.timeout);
        let verify = match verify {
            Some(input) => normalize_verify(input)?,
            None => defaults.verify.clone(),
        };
        let cert = match cert {
            Some(input) => Some(normalize_client_cert(input)?),
            None => defaults.cert.clone(),
        };
        let mut proxy_map = defaults.proxies.clone();
        if let Some(proxies) = proxies {
            proxy_map.merge(&normalize_proxies(proxies)?);
        }
        let retries = match retries {
            Some(input) => normalize_retry(input)?,
            None => defaults.retries.clone(),
        };
        let mut all_hooks = defaults.hooks.clone();
        all_hooks.merge(&normalize_hooks(hooks)?);

        let head = all_hooks.dispatch(
            HookEvent::PreRequest,
            RequestHead {
                method,
                url,
                headers: merged_headers,
            },
        );
        check_target(&head.url)?;
        head.headers.validate()?;

        debug!(
            method = %head.method,
            url = %head.url,
            headers = head.headers.len(),
            body = body.as_ref().map_or("none", Body::kind),
            files = files.as_ref().map_or(0, MultipartFiles::len),
            "prepared request"
        );

        Ok(PreparedRequest {
            head,
            cookies: jar,
            body,
            files,
            auth,
            timeout,
            verify,
            cert,
            proxies: proxy_map,
            retries,
            hooks: all_hooks,
        })
    }
}

/// Values a request falls back to when it does not set them.
#[derive(Debug, Clone)]
pub struct RequestDefaults {
    pub headers: Headers,
    pub cookies: CookieStore,
    pub auth: Option<Auth>,
    pub timeout: Timeouts,
    pub verify: TrustAnchor,
    pub cert: Option<ClientCert>,
    pub proxies: ProxyMap,
    pub retries: RetryPolicy,
    pub hooks: Hooks<RequestHead>,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            headers: Headers::new(),
            cookies: CookieStore::new(),
            auth: None,
            timeout: Timeouts::default(),
            verify: TrustAnchor::SystemDefault,
            cert: None,
            proxies: ProxyMap::new(),
            retries: RetryPolicy::disabled(),
            hooks: Hooks::new(),
        }
    }
}

/// A fully normalized request.
#[derive(Debug)]
pub struct PreparedRequest {
    pub head: RequestHead,
    /// Cookie snapshot for this request (session cookies + request cookies).
    pub cookies: CookieStore,
    pub body: Option<Body>,
    pub files: Option<MultipartFiles>,
    pub auth: Option<Auth>,
    pub timeout: Timeouts,
    pub verify: TrustAnchor,
    pub cert: Option<ClientCert>,
    pub proxies: ProxyMap,
    pub retries: RetryPolicy,
    /// Hooks for the remaining lifecycle events.
    pub hooks: Hooks<RequestHead>,
}

impl PreparedRequest {
    /// Proxy selected for the request URL, if any.
    #[must_use]
    pub fn proxy(&self) -> Option<&Url> {
        self.proxies.select(&self.head.url)
    }

    /// Encodes the multipart files into the body and sets a
    /// `multipart/form-data` content type with a fresh boundary.
    ///
    /// Does nothing when the request has no files.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a streamed file fails to read.
    pub fn encode_files(&mut self) -> io::Result<()> {
        let Some(files) = self.files.take() else {
            return Ok(());
        };
        let boundary = generate_boundary();
        let encoded = files.encode(&boundary)?;
        self.head
            .headers
            .insert(CONTENT_TYPE, multipart_content_type(&boundary));
        self.body = Some(Body::Raw(RawBody::Bytes(encoded)));
        Ok(())
    }

    /// Serializable view with credentials and payloads left out.
    #[must_use]
    pub fn summary(&self) -> RequestSummary<'_> {
        RequestSummary {
            method: self.head.method.as_str(),
            url: self.head.url.as_str(),
            headers: self.head.headers.iter_redacted().collect(),
            cookies: &self.cookies,
            body: self.body.as_ref().map(|body| BodySummary {
                kind: body.kind(),
                length: body.content_length(),
            }),
            files: self.files.as_ref(),
            auth: self.auth.as_ref().map(Auth::scheme),
            timeout: TimeoutSummary {
                connect_secs: self.timeout.connect.as_secs_f64(),
                read_secs: self.timeout.read.as_secs_f64(),
                total_secs: self.timeout.total.as_secs_f64(),
            },
            verify: self.verify.to_string(),
            cert: self.cert.as_ref(),
            proxies: &self.proxies,
            proxy: self.proxy().map(Url::as_str),
            retries: &self.retries,
            hooks: self.hooks.counts(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RequestSummary<'a> {
    pub method: &'a str,
    pub url: &'a str,
    pub headers: Vec<(&'a str, &'a str)>,
    pub cookies: &'a CookieStore,
    pub body: Option<BodySummary>,
    pub files: Option<&'a MultipartFiles>,
    pub auth: Option<&'static str>,
    pub timeout: TimeoutSummary,
    pub verify: String,
    pub cert: Option<&'a ClientCert>,
    pub proxies: &'a ProxyMap,
    pub proxy: Option<&'a str>,
    pub retries: &'a RetryPolicy,
    pub hooks: BTreeMap<HookEvent, usize>,
}

#[derive(Debug, Serialize)]
pub struct BodySummary {
    pub kind: &'static str,
    pub length: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct TimeoutSummary {
    pub connect_secs: f64,
    pub read_secs: f64,
    pub total_secs: f64,
}

fn normalize_method(raw: &str) -> Result<Method, NormalizeError> {
    let upper = raw.trim().to_ascii_uppercase();
    if upper.is_empty() {
        return Err(NormalizeError::mismatch("method", "HTTP method token", "empty string"));
    }
    Method::from_bytes(upper.as_bytes())
        .map_err(|_| NormalizeError::mismatch("method", "HTTP method token", format!("{raw:?}")))
}

fn normalize_url(raw: &str) -> Result<Url, NormalizeError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| NormalizeError::mismatch("url", "absolute http(s) URL", format!("{raw:?} ({e})")))?;
    check_target(&url)?;
    Ok(url)
}

/// Rechecked after `pre_request` hooks, which may rewrite the URL.
fn check_target(url: &Url) -> Result<(), NormalizeError> {
    if !matches!(url.scheme(), "http" | "https") {
        return Err(NormalizeError::mismatch(
            "url",
            "absolute http(s) URL",
            format!("scheme {:?}", url.scheme()),
        ));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(NormalizeError::incomplete("url", "absolute URL", "host"));
    }
    Ok(())
}

/// Strips `user:password@` from the URL and returns the decoded pair.
fn take_userinfo(url: &mut Url) -> Result<Option<(String, String)>, NormalizeError> {
    if url.username().is_empty() && url.password().is_none() {
        return Ok(None);
    }
    let decode = |raw: &str| percent_decode_str(raw).decode_utf8_lossy().into_owned();
    let username = decode(url.username());
    let password = url.password().map(decode).unwrap_or_default();
    let cannot_strip = |()| NormalizeError::mismatch("url", "URL with a host", "userinfo on a host-less URL");
    url.set_username("").map_err(cannot_strip)?;
    url.set_password(None).map_err(cannot_strip)?;
    Ok(Some((username, password)))
}
