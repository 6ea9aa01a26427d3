//! Cookie normalization and the session cookie store.
//!
//! Cookies arrive either as a plain name→value mapping or as a cookie jar
//! ([`CookieStore`], which can itself be loaded from a Netscape cookie file).
//! Both converge into a [`CookieStore`] where each name is unique within its
//! (domain, path) scope. The store can render a `Cookie` header for a URL and
//! export into a `reqwest::cookie::Jar` for the transport layer.

use std::collections::BTreeMap;
use std::fmt;
use std::io::BufRead;
use std::sync::Arc;

use reqwest::cookie::Jar;
use serde::Serialize;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::NormalizeError;

const PARAM: &str = "cookies";

/// Prefix curl uses to mark HttpOnly cookies in Netscape files.
const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";

/// A single cookie with its scope.
///
/// The value is redacted in `Debug` output and skipped when serialized.
#[derive(Clone, Serialize)]
pub struct Cookie {
    /// Domain the cookie belongs to; empty means "any host".
    pub domain: String,
    /// Whether subdomains of `domain` match.
    pub include_subdomains: bool,
    /// URL path scope.
    pub path: String,
    /// Only sent over HTTPS.
    pub secure: bool,
    /// Unix timestamp for expiry; `None` for session cookies.
    pub expires: Option<u64>,
    /// Cookie name.
    pub name: String,
    #[serde(skip)]
    value: String,
}

impl Cookie {
    /// Creates an unscoped session cookie (any host, path `/`).
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            domain: String::new(),
            include_subdomains: false,
            path: "/".to_string(),
            secure: false,
            expires: None,
            name: name.into(),
            value: value.into(),
        }
    }

    /// Creates a cookie scoped to `domain` and `path`.
    ///
    /// A leading dot on `domain` enables subdomain matching.
    pub fn scoped(
        domain: impl Into<String>,
        path: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        let domain = domain.into();
        let include_subdomains = domain.starts_with('.');
        Self {
            domain: domain.trim_start_matches('.').to_string(),
            include_subdomains,
            path: path.into(),
            ..Self::new(name, value)
        }
    }

    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    #[must_use]
    pub fn with_expires(mut self, expires: Option<u64>) -> Self {
        self.expires = expires;
        self
    }

    /// Returns the cookie value.
    ///
    /// Cookie values are sensitive; avoid logging the return value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    fn same_scope(&self, other: &Cookie) -> bool {
        self.domain.eq_ignore_ascii_case(&other.domain)
            && self.path == other.path
            && self.name.eq_ignore_ascii_case(&other.name)
    }

    /// Whether this cookie should be sent to `url`.
    #[must_use]
    pub fn matches(&self, url: &Url) -> bool {
        if self.secure && url.scheme() != "https" {
            return false;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        let domain_ok = self.domain.is_empty()
            || host.eq_ignore_ascii_case(&self.domain)
            || (self.include_subdomains && host_is_subdomain(host, &self.domain));
        domain_ok && path_matches(url.path(), &self.path)
    }
}

impl fmt::Debug for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cookie")
            .field("domain", &self.domain)
            .field("include_subdomains", &self.include_subdomains)
            .field("path", &self.path)
            .field("secure", &self.secure)
            .field("expires", &self.expires)
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

fn host_is_subdomain(host: &str, domain: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let domain = domain.to_ascii_lowercase();
    host.len() > domain.len() + 1
        && host.ends_with(&domain)
        && host.as_bytes()[host.len() - domain.len() - 1] == b'.'
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    if cookie_path.is_empty() || cookie_path == "/" || request_path == cookie_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/') || request_path[cookie_path.len()..].starts_with('/'))
}

/// Accepted shapes for the `cookies` request parameter.
#[derive(Debug, Clone)]
pub enum CookieInput {
    /// Plain name→value mapping; every entry becomes an unscoped cookie.
    Map(BTreeMap<String, String>),
    /// A cookie jar.
    Jar(CookieStore),
}

impl From<BTreeMap<String, String>> for CookieInput {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self::Map(map)
    }
}

impl From<CookieStore> for CookieInput {
    fn from(store: CookieStore) -> Self {
        Self::Jar(store)
    }
}

/// Ordered cookie store; names are unique per (domain, path) scope.
///
/// Domain and name comparisons ignore ASCII case; the stored casing is kept.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct CookieStore {
    cookies: Vec<Cookie>,
}

impl CookieStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cookie> {
        self.cookies.iter()
    }

    /// Stores `cookie`, replacing any cookie with the same scope and name.
    ///
    /// A replaced cookie keeps its position and is returned.
    pub fn set(&mut self, cookie: Cookie) -> Option<Cookie> {
        match self.cookies.iter().position(|existing| existing.same_scope(&cookie)) {
            Some(index) => Some(std::mem::replace(&mut self.cookies[index], cookie)),
            None => {
                self.cookies.push(cookie);
                None
            }
        }
    }

    /// Returns the value of the first cookie named `name`, in any scope.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|cookie| cookie.name.eq_ignore_ascii_case(name))
            .map(Cookie::value)
    }

    /// Returns the cookie stored under an exact scope.
    #[must_use]
    pub fn get_scoped(&self, domain: &str, path: &str, name: &str) -> Option<&Cookie> {
        let scope = Cookie::scoped(domain, path, name, "");
        self.cookies.iter().find(|cookie| cookie.same_scope(&scope))
    }

    /// Removes the cookie stored under an exact scope.
    pub fn remove(&mut self, domain: &str, path: &str, name: &str) -> Option<Cookie> {
        let scope = Cookie::scoped(domain, path, name, "");
        let index = self.cookies.iter().position(|cookie| cookie.same_scope(&scope))?;
        Some(self.cookies.remove(index))
    }

    /// Copies every cookie of `overrides` into this store; `overrides` wins per scope.
    pub fn merge(&mut self, overrides: &CookieStore) {
        for cookie in &overrides.cookies {
            self.set(cookie.clone());
        }
    }

    /// Cookies that should be sent to `url`, in store order.
    pub fn matching<'a>(&'a self, url: &'a Url) -> impl Iterator<Item = &'a Cookie> + 'a {
        self.cookies.iter().filter(move |cookie| cookie.matches(url))
    }

    /// Renders the `Cookie` request header for `url`, if any cookie matches.
    #[must_use]
    pub fn cookie_header(&self, url: &Url) -> Option<String> {
        let pairs: Vec<String> = self
            .matching(url)
            .map(|cookie| format!("{}={}", cookie.name, cookie.value()))
            .collect();
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }

    /// Parses a Netscape-format cookie file into a store.
    ///
    /// Each non-comment, non-blank line must contain exactly 7 TAB-separated
    /// fields: `domain`, `tailmatch`, `path`, `secure`, `expires`, `name`,
    /// `value`. Lines prefixed with `#HttpOnly_` are cookies, not comments.
    ///
    /// # Errors
    ///
    /// Returns [`CookieError::Io`] on read failure, or
    /// [`CookieError::NoCookiesFound`] when a non-empty file yields zero valid
    /// cookies. Individual malformed lines are collected as warnings.
    #[instrument(level = "debug", skip(reader))]
    pub fn from_netscape(reader: impl BufRead) -> Result<NetscapeImport, CookieError> {
        let mut store = CookieStore::new();
        let mut warnings = Vec::new();
        let mut data_lines = 0;

        for (idx, line_result) in reader.lines().enumerate() {
            let line_number = idx + 1;
            let line = line_result?;
            let line = line.trim_end();

            let line = match line.strip_prefix(HTTP_ONLY_PREFIX) {
                Some(rest) => rest,
                None if line.is_empty() || line.starts_with('#') => continue,
                None => line,
            };

            data_lines += 1;

            match parse_cookie_line(line, line_number) {
                Ok(cookie) => {
                    debug!(
                        line = line_number,
                        domain = %cookie.domain,
                        name = %cookie.name,
                        "parsed cookie"
                    );
                    store.set(cookie);
                }
                Err(e) => {
                    warn!(line = line_number, reason = %e, "skipping malformed cookie line");
                    warnings.push((line_number, e.to_string()));
                }
            }
        }

        if store.is_empty() && data_lines > 0 {
            return Err(CookieError::NoCookiesFound {
                malformed_count: warnings.len(),
            });
        }

        Ok(NetscapeImport { store, warnings })
    }

    /// Exports the store into a `reqwest::cookie::Jar`.
    ///
    /// Unscoped cookies are bound to `origin` as host-only cookies.
    #[instrument(level = "debug", skip(self))]
    pub fn to_reqwest_jar(&self, origin: &Url) -> Arc<Jar> {
        let jar = Arc::new(Jar::default());

        for cookie in &self.cookies {
            let set_cookie = build_set_cookie_string(cookie);
            let url = if cookie.domain.is_empty() {
                Some(origin.clone())
            } else {
                build_origin_url(cookie).parse::<Url>().ok()
            };

            if let Some(url) = url {
                jar.add_cookie_str(&set_cookie, &url);
                debug!(domain = %cookie.domain, name = %cookie.name, "exported cookie into jar");
            } else {
                warn!(
                    domain = %cookie.domain,
                    name = %cookie.name,
                    "skipping cookie with unparseable domain"
                );
            }
        }

        jar
    }
}

/// Result of importing a Netscape cookie file.
#[derive(Debug)]
pub struct NetscapeImport {
    /// Successfully parsed cookies.
    pub store: CookieStore,
    /// Warnings for malformed lines (line number and reason).
    pub warnings: Vec<(usize, String)>,
}

/// Errors that can occur while parsing a cookie file.
#[derive(Debug, thiserror::Error)]
pub enum CookieError {
    /// A line in the cookie file has an invalid format.
    #[error("line {line_number}: {reason} (got: {content})")]
    InvalidLine {
        /// 1-based line number in the cookie file.
        line_number: usize,
        /// The offending line content with the value redacted.
        content: String,
        /// Description of what was wrong.
        reason: String,
    },

    /// I/O error reading the cookie file.
    #[error("failed to read cookie file: {0}")]
    Io(#[from] std::io::Error),

    /// No valid cookies found in a non-empty file.
    #[error("no valid cookies found in file ({malformed_count} lines failed to parse)")]
    NoCookiesFound {
        /// Number of malformed lines encountered.
        malformed_count: usize,
    },
}

fn parse_cookie_line(line: &str, line_number: usize) -> Result<Cookie, CookieError> {
    let invalid = |reason: String| CookieError::InvalidLine {
        line_number,
        content: redact_line_for_error(line),
        reason,
    };

    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != 7 {
        return Err(invalid(format!(
            "expected 7 TAB-separated fields, found {}",
            fields.len()
        )));
    }

    let tailmatch = parse_bool_field(fields[1])
        .ok_or_else(|| invalid(format!("tailmatch field must be TRUE or FALSE, got '{}'", fields[1])))?;
    let secure = parse_bool_field(fields[3])
        .ok_or_else(|| invalid(format!("secure field must be TRUE or FALSE, got '{}'", fields[3])))?;
    let expires = fields[4].parse::<u64>().map_err(|_| {
        invalid(format!(
            "expires field must be a non-negative integer, got '{}'",
            fields[4]
        ))
    })?;

    let domain = fields[0];
    let name = fields[5];
    if domain.is_empty() {
        return Err(invalid("domain field is empty".to_string()));
    }
    if name.is_empty() {
        return Err(invalid("cookie name field is empty".to_string()));
    }

    let mut cookie = Cookie::scoped(domain, fields[2], name, fields[6])
        .with_secure(secure)
        .with_expires((expires > 0).then_some(expires));
    cookie.include_subdomains = tailmatch;
    Ok(cookie)
}

fn parse_bool_field(value: &str) -> Option<bool> {
    match value {
        "TRUE" => Some(true),
        "FALSE" => Some(false),
        _ => None,
    }
}

fn redact_line_for_error(line: &str) -> String {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() >= 7 {
        let mut redacted = fields[..6].join("\t");
        redacted.push_str("\t[REDACTED]");
        redacted
    } else {
        line.to_string()
    }
}

fn build_set_cookie_string(cookie: &Cookie) -> String {
    let mut parts = vec![format!("{}={}", cookie.name, cookie.value())];

    if !cookie.domain.is_empty() && cookie.include_subdomains {
        parts.push(format!("Domain={}", cookie.domain));
    }
    parts.push(format!("Path={}", cookie.path));
    if cookie.secure {
        parts.push("Secure".to_string());
    }
    if let Some(expires) = cookie.expires {
        if let Some(expires_str) = unix_to_http_date(expires) {
            parts.push(format!("Expires={expires_str}"));
        } else {
            warn!(
                domain = %cookie.domain,
                name = %cookie.name,
                expires,
                "cookie expiry timestamp overflows SystemTime; treating as session cookie"
            );
        }
    }

    parts.join("; ")
}

/// Uses `https://` for secure cookies and `http://` otherwise.
fn build_origin_url(cookie: &Cookie) -> String {
    let scheme = if cookie.secure { "https" } else { "http" };
    format!("{scheme}://{}{}", cookie.domain, cookie.path)
}

fn unix_to_http_date(timestamp: u64) -> Option<String> {
    use std::time::{Duration, UNIX_EPOCH};

    let time = UNIX_EPOCH.checked_add(Duration::from_secs(timestamp))?;
    Some(httpdate::fmt_http_date(time))
}

/// Normalizes any accepted cookie shape into a [`CookieStore`].
///
/// # Errors
///
/// Returns [`NormalizeError::TypeMismatch`] for empty names or names and
/// values containing separators or control characters.
#[instrument(level = "debug", skip(input))]
pub fn normalize_cookies(input: CookieInput) -> Result<CookieStore, NormalizeError> {
    let store = match input {
        CookieInput::Map(map) => {
            let mut store = CookieStore::new();
            for (name, value) in map {
                check_cookie(&name, &value)?;
                store.set(Cookie::new(name, value));
            }
            store
        }
        CookieInput::Jar(store) => {
            for cookie in store.iter() {
                check_cookie(&cookie.name, cookie.value())?;
            }
            store
        }
    };
    debug!(count = store.len(), "normalized cookies");
    Ok(store)
}

fn check_cookie(name: &str, value: &str) -> Result<(), NormalizeError> {
    let bad_name = name.is_empty()
        || name
            .chars()
            .any(|c| c.is_control() || c.is_whitespace() || matches!(c, ';' | '=' | ',' | '"'));
    if bad_name {
        return Err(NormalizeError::mismatch(
            PARAM,
            "non-empty cookie name without separators",
            format!("{name:?}"),
        ));
    }
    if value.chars().any(|c| c.is_control() || c == ';') {
        return Err(NormalizeError::mismatch(
            PARAM,
            "cookie value without ';' or control characters",
            format!("value for {name:?}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use reqwest::cookie::CookieStore as _;
    use std::io::Cursor;

    fn cursor(s: &str) -> Cursor<&[u8]> {
        Cursor::new(s.as_bytes())
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_map_becomes_unscoped_cookies() {
        let mut map = BTreeMap::new();
        map.insert("session".to_string(), "abc".to_string());
        let store = normalize_cookies(map.into()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("SESSION"), Some("abc"));
        assert!(store.iter().all(|c| c.domain.is_empty() && c.path == "/"));
    }

    #[test]
    fn test_set_replaces_within_scope_only() {
        let mut store = CookieStore::new();
        store.set(Cookie::scoped("example.com", "/", "id", "1"));
        store.set(Cookie::scoped("other.com", "/", "id", "2"));
        let replaced = store.set(Cookie::scoped("EXAMPLE.com", "/", "ID", "3"));

        assert_eq!(replaced.unwrap().value(), "1");
        assert_eq!(store.len(), 2);
        assert_eq!(store.get_scoped("example.com", "/", "id").unwrap().value(), "3");
        assert_eq!(store.get_scoped("other.com", "/", "id").unwrap().value(), "2");
    }

    #[test]
    fn test_same_name_different_path_is_distinct() {
        let mut store = CookieStore::new();
        store.set(Cookie::scoped("example.com", "/", "id", "1"));
        store.set(Cookie::scoped("example.com", "/api", "id", "2"));
        assert_eq!(store.len(), 2);
        assert!(store.remove("example.com", "/api", "id").is_some());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_invalid_cookie_name_is_type_mismatch() {
        let mut map = BTreeMap::new();
        map.insert("bad name".to_string(), "v".to_string());
        let err = normalize_cookies(map.into()).unwrap_err();
        assert!(matches!(err, NormalizeError::TypeMismatch { param: "cookies", .. }));
    }

    #[test]
    fn test_cookie_header_respects_domain_path_and_secure() {
        let mut store = CookieStore::new();
        store.set(Cookie::new("any", "1"));
        store.set(Cookie::scoped(".example.com", "/", "sub", "2"));
        store.set(Cookie::scoped("example.com", "/api", "api", "3"));
        store.set(Cookie::scoped("example.com", "/", "tls", "4").with_secure(true));
        store.set(Cookie::scoped("other.com", "/", "other", "5"));

        let header = store.cookie_header(&url("http://www.example.com/api/v1")).unwrap();
        assert_eq!(header, "any=1; sub=2");

        let header = store.cookie_header(&url("https://example.com/api/v1")).unwrap();
        assert_eq!(header, "any=1; sub=2; api=3; tls=4");

        let header = store.cookie_header(&url("http://example.com/apiary")).unwrap();
        assert_eq!(header, "any=1; sub=2");
    }

    #[test]
    fn test_merge_overrides_win() {
        let mut base = CookieStore::new();
        base.set(Cookie::new("a", "base"));
        base.set(Cookie::new("b", "base"));
        let mut overrides = CookieStore::new();
        overrides.set(Cookie::new("A", "request"));
        base.merge(&overrides);
        assert_eq!(base.len(), 2);
        assert_eq!(base.get("a"), Some("request"));
        assert_eq!(base.get("b"), Some("base"));
    }

    #[test]
    fn test_debug_redacts_value() {
        let cookie = Cookie::new("session", "super-secret");
        let debug = format!("{cookie:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_from_netscape_valid_file() {
        let input = "\
# Netscape HTTP Cookie File
.example.com\tTRUE\t/\tFALSE\t0\tsession\tabc123
#HttpOnly_.other.com\tTRUE\t/path\tTRUE\t1700000000\ttoken\txyz789
";
        let import = CookieStore::from_netscape(cursor(input)).unwrap();
        assert_eq!(import.store.len(), 2);
        assert!(import.warnings.is_empty());

        let session = import.store.get_scoped("example.com", "/", "session").unwrap();
        assert!(session.include_subdomains);
        assert_eq!(session.expires, None);
        assert_eq!(session.value(), "abc123");

        let token = import.store.get_scoped("other.com", "/path", "token").unwrap();
        assert!(token.secure);
        assert_eq!(token.expires, Some(1_700_000_000));
    }

    #[test]
    fn test_from_netscape_collects_warnings() {
        let input = "\
.good.com\tTRUE\t/\tFALSE\t0\tname\tvalue
bad line without tabs
.also-good.com\tTRUE\t/\tFALSE\tsoon\tother\tval
";
        let import = CookieStore::from_netscape(cursor(input)).unwrap();
        assert_eq!(import.store.len(), 1);
        assert_eq!(import.warnings.len(), 2);
        assert_eq!(import.warnings[0].0, 2);
        assert!(import.warnings[1].1.contains("expires"));
    }

    #[test]
    fn test_from_netscape_all_malformed_returns_error() {
        let err = CookieStore::from_netscape(cursor("bad one\nbad two\n")).unwrap_err();
        assert!(matches!(err, CookieError::NoCookiesFound { malformed_count: 2 }));
    }

    #[test]
    fn test_from_netscape_error_redacts_value() {
        let err = parse_cookie_line(".x.com\tMAYBE\t/\tFALSE\t0\tname\tsecret", 1).unwrap_err();
        let msg = err.to_string();
        assert!(!msg.contains("secret"));
        assert!(msg.contains("[REDACTED]"));
    }

    #[test]
    fn test_to_reqwest_jar_scopes_cookies() {
        let mut store = CookieStore::new();
        store.set(Cookie::new("plain", "1"));
        store.set(Cookie::scoped(".example.com", "/", "scoped", "2"));

        let origin = url("http://api.test/");
        let jar = store.to_reqwest_jar(&origin);

        let for_origin = jar.cookies(&origin).unwrap();
        assert_eq!(for_origin.to_str().unwrap(), "plain=1");

        let for_example = jar.cookies(&url("http://www.example.com/")).unwrap();
        assert_eq!(for_example.to_str().unwrap(), "scoped=2");
    }
}
