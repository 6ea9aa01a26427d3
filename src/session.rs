//! Long-lived request context.
//!
//! A [`Session`] owns the cookie store, the alt-svc cache and the defaults
//! every request is layered over. Preparing a request borrows the session
//! immutably; only explicit setters and response bookkeeping mutate it.

use std::io::BufRead;

use tracing::{debug, info, instrument};
use url::Url;

use crate::altsvc::{AltSvcCache, AltSvcEntry, Authority};
use crate::auth::{AuthInput, normalize_auth};
use crate::cookies::{CookieError, CookieStore};
use crate::error::NormalizeError;
use crate::headers::Headers;
use crate::hooks::{Hook, HookEvent};
use crate::proxy::{ProxyMap, normalize_proxies};
use crate::request::{PreparedRequest, RequestDefaults, RequestHead, RequestParams};
use crate::retry::{RetryInput, RetryPolicy, normalize_retry};
use crate::timeout::{TimeoutInput, Timeouts, normalize_timeout};
use crate::tls::{ClientCertInput, TrustAnchor, VerifyInput, normalize_client_cert, normalize_verify};
use crate::user_agent::default_user_agent;

/// Cookie store, alt-svc cache and request defaults shared across requests.
#[derive(Debug, Clone)]
pub struct Session {
    defaults: RequestDefaults,
    altsvc: AltSvcCache,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Creates a session sending `User-Agent: reqnorm/<version>` and `Accept: */*`.
    #[must_use]
    pub fn new() -> Self {
        let mut headers = Headers::new();
        headers.insert("User-Agent", default_user_agent());
        headers.insert("Accept", "*/*");
        Self {
            defaults: RequestDefaults {
                headers,
                ..RequestDefaults::default()
            },
            altsvc: AltSvcCache::new(),
        }
    }

    /// Normalizes `params` and layers it over the session defaults.
    ///
    /// Request values win over session values. Headers merge
    /// case-insensitively with the request's casing kept. Cookies merge per
    /// scope and name into a per-request snapshot. Session hooks run before
    /// request hooks.
    ///
    /// # Errors
    ///
    /// Returns the first [`NormalizeError`] raised while normalizing `params`.
    pub fn prepare(&self, params: RequestParams) -> Result<PreparedRequest, NormalizeError> {
        params.normalize_with(&self.defaults)
    }

    #[must_use]
    pub fn defaults(&self) -> &RequestDefaults {
        &self.defaults
    }

    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.defaults.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.defaults.headers
    }

    #[must_use]
    pub fn cookies(&self) -> &CookieStore {
        &self.defaults.cookies
    }

    pub fn cookies_mut(&mut self) -> &mut CookieStore {
        &mut self.defaults.cookies
    }

    #[must_use]
    pub fn altsvc(&self) -> &AltSvcCache {
        &self.altsvc
    }

    pub fn altsvc_mut(&mut self) -> &mut AltSvcCache {
        &mut self.altsvc
    }

    /// # Errors
    ///
    /// See [`normalize_auth`].
    pub fn set_auth(&mut self, auth: impl Into<AuthInput>) -> Result<(), NormalizeError> {
        self.defaults.auth = Some(normalize_auth(auth.into())?);
        Ok(())
    }

    /// # Errors
    ///
    /// See [`normalize_timeout`].
    pub fn set_timeout(&mut self, timeout: impl Into<TimeoutInput>) -> Result<(), NormalizeError> {
        self.defaults.timeout = normalize_timeout(timeout.into())?;
        Ok(())
    }

    #[must_use]
    pub fn timeout(&self) -> Timeouts {
        self.defaults.timeout
    }

    /// # Errors
    ///
    /// See [`normalize_verify`].
    pub fn set_verify(&mut self, verify: impl Into<VerifyInput>) -> Result<(), NormalizeError> {
        self.defaults.verify = normalize_verify(verify.into())?;
        Ok(())
    }

    #[must_use]
    pub fn verify(&self) -> &TrustAnchor {
        &self.defaults.verify
    }

    /// # Errors
    ///
    /// See [`normalize_client_cert`].
    pub fn set_cert(&mut self, cert: impl Into<ClientCertInput>) -> Result<(), NormalizeError> {
        self.defaults.cert = Some(normalize_client_cert(cert.into())?);
        Ok(())
    }

    /// Adds proxies on top of the session's existing ones.
    ///
    /// # Errors
    ///
    /// See [`normalize_proxies`].
    pub fn set_proxies<K: Into<String>, V: Into<String>>(
        &mut self,
        proxies: impl IntoIterator<Item = (K, V)>,
    ) -> Result<(), NormalizeError> {
        let normalized = normalize_proxies(
            proxies
                .into_iter()
                .map(|(key, url)| (key.into(), url.into()))
                .collect(),
        )?;
        self.defaults.proxies.merge(&normalized);
        Ok(())
    }

    #[must_use]
    pub fn proxies(&self) -> &ProxyMap {
        &self.defaults.proxies
    }

    /// # Errors
    ///
    /// See [`normalize_retry`].
    pub fn set_retries(&mut self, retries: impl Into<RetryInput>) -> Result<(), NormalizeError> {
        self.defaults.retries = normalize_retry(retries.into())?;
        Ok(())
    }

    #[must_use]
    pub fn retries(&self) -> &RetryPolicy {
        &self.defaults.retries
    }

    /// Registers a hook that runs before any request-level hook for `event`.
    pub fn add_hook(&mut self, event: HookEvent, hook: impl Hook<RequestHead> + 'static) {
        self.defaults.hooks.register(event, hook);
    }

    /// Loads cookies from a Netscape cookie file into the session store.
    ///
    /// Returns the number of cookies loaded. Skipped lines are logged.
    ///
    /// # Errors
    ///
    /// Returns [`CookieError`] when the file cannot be read or holds no cookie.
    #[instrument(level = "debug", skip(self, reader))]
    pub fn load_cookies(&mut self, reader: impl BufRead) -> Result<usize, CookieError> {
        let import = CookieStore::from_netscape(reader)?;
        let loaded = import.store.len();
        self.defaults.cookies.merge(&import.store);
        info!(loaded, skipped = import.warnings.len(), "loaded session cookies");
        Ok(loaded)
    }

    /// Records an `Alt-Svc` response header received from `url`'s origin.
    pub fn record_alt_svc(&mut self, url: &Url, header: &str) {
        if let Some(origin) = authority_of(url) {
            self.altsvc.observe(&origin, header);
        } else {
            debug!(%url, "alt-svc ignored for URL without host or port");
        }
    }

    /// Alt-svc state for `url`'s origin.
    #[must_use]
    pub fn alt_svc_for(&self, url: &Url) -> Option<AltSvcEntry<'_>> {
        authority_of(url).map(|origin| self.altsvc.lookup(&origin))
    }
}

fn authority_of(url: &Url) -> Option<Authority> {
    Some(Authority::new(url.host_str()?, url.port_or_known_default()?))
}
