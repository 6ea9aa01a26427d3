//! Authentication strategies.
//!
//! A request carries at most one [`Auth`]. Callers give either a
//! (username, password) pair, which becomes [`BasicAuth`], or any type
//! implementing [`AuthStrategy`].

use std::fmt;
use std::sync::Arc;

use base64ct::{Base64, Encoding};
use tracing::{debug, instrument};

use crate::error::NormalizeError;
use crate::headers::Headers;

pub const AUTHORIZATION: &str = "Authorization";

/// A pluggable authentication mechanism applied to outgoing request headers.
pub trait AuthStrategy: fmt::Debug + Send + Sync {
    /// Short name for logs and summaries (e.g. `basic`).
    fn scheme(&self) -> &'static str;

    /// Adds credentials to the outgoing headers.
    fn apply(&self, headers: &mut Headers);
}

/// HTTP Basic authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    username: String,
    password: String,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// `Authorization` header value.
    #[must_use]
    pub fn header_value(&self) -> String {
        let credentials = format!("{}:{}", self.username, self.password);
        format!("Basic {}", Base64::encode_string(credentials.as_bytes()))
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl AuthStrategy for BasicAuth {
    fn scheme(&self) -> &'static str {
        "basic"
    }

    fn apply(&self, headers: &mut Headers) {
        headers.insert(AUTHORIZATION, self.header_value());
    }
}

/// Bearer token authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerAuth {
    token: String,
}

impl BearerAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerAuth")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl AuthStrategy for BearerAuth {
    fn scheme(&self) -> &'static str {
        "bearer"
    }

    fn apply(&self, headers: &mut Headers) {
        headers.insert(AUTHORIZATION, format!("Bearer {}", self.token));
    }
}

/// Accepted shapes for the `auth` request parameter.
#[derive(Clone)]
pub enum AuthInput {
    /// (username, password)
    Basic(String, String),
    Strategy(Arc<dyn AuthStrategy>),
}

impl fmt::Debug for AuthInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic(username, _) => f
                .debug_tuple("Basic")
                .field(username)
                .field(&"[REDACTED]")
                .finish(),
            Self::Strategy(strategy) => f.debug_tuple("Strategy").field(strategy).finish(),
        }
    }
}

impl From<(&str, &str)> for AuthInput {
    fn from((username, password): (&str, &str)) -> Self {
        Self::Basic(username.to_string(), password.to_string())
    }
}

impl From<Arc<dyn AuthStrategy>> for AuthInput {
    fn from(strategy: Arc<dyn AuthStrategy>) -> Self {
        Self::Strategy(strategy)
    }
}

/// The single authentication strategy active for a request.
#[derive(Debug, Clone)]
pub struct Auth(Arc<dyn AuthStrategy>);

impl Auth {
    pub fn new(strategy: impl AuthStrategy + 'static) -> Self {
        Self(Arc::new(strategy))
    }

    #[must_use]
    pub fn scheme(&self) -> &'static str {
        self.0.scheme()
    }

    pub fn apply(&self, headers: &mut Headers) {
        self.0.apply(headers);
    }
}

/// Normalizes an `auth` value into the request's [`Auth`].
///
/// # Errors
///
/// Returns [`NormalizeError::ShapeIncomplete`] when the username of a basic
/// pair is empty, and [`NormalizeError::TypeMismatch`] when it contains `:`.
#[instrument(level = "debug", skip(input))]
pub fn normalize_auth(input: AuthInput) -> Result<Auth, NormalizeError> {
    let auth = match input {
        AuthInput::Basic(username, password) => {
            if username.is_empty() {
                return Err(NormalizeError::incomplete(
                    "auth",
                    "(username, password) pair",
                    "username",
                ));
            }
            if username.contains(':') {
                return Err(NormalizeError::mismatch(
                    "auth",
                    "username without ':'",
                    format!("{username:?}"),
                ));
            }
            Auth::new(BasicAuth::new(username, password))
        }
        AuthInput::Strategy(strategy) => Auth(strategy),
    };
    debug!(scheme = auth.scheme(), "normalized auth");
    Ok(auth)
}
