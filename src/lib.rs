//! Request Parameter Normalizer
//!
//! HTTP client front-ends accept request parameters in several ergonomic
//! shapes: headers as a map or a list of pairs, timeouts as a number or a
//! tuple, retries as a boolean or a policy. This library converts every
//! accepted shape into one canonical form before a request reaches the
//! transport, and rejects anything outside the accepted shapes with a
//! [`NormalizeError`].
//!
//! # Architecture
//!
//! One module per request concept, each with an input enum, a canonical type
//! and a `normalize_*` function:
//! - [`headers`], [`cookies`], [`query`], [`body`], [`multipart`]
//! - [`tls`], [`timeout`], [`auth`], [`proxy`], [`retry`], [`hooks`]
//! - [`altsvc`] - alternative-service cache owned by a [`Session`]
//!
//! On top of those:
//! - [`request`] - [`RequestParams`] builder and [`PreparedRequest`]
//! - [`session`] - long-lived defaults, cookie store and alt-svc cache
//! - [`loose`] - decoding of untyped JSON into the input enums

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod altsvc;
pub mod auth;
pub mod body;
pub mod cookies;
pub mod error;
pub mod headers;
pub mod hooks;
pub mod loose;
pub mod multipart;
pub mod proxy;
pub mod query;
pub mod request;
pub mod retry;
pub mod session;
pub mod timeout;
pub mod tls;
mod user_agent;

// Re-export commonly used types
pub use altsvc::{AltSvcCache, AltSvcEntry, Authority, normalize_altsvc};
pub use auth::{Auth, AuthInput, AuthStrategy, BasicAuth, BearerAuth, normalize_auth};
pub use body::{Body, BodyInput, RawBody, normalize_body, normalize_json};
pub use cookies::{Cookie, CookieError, CookieInput, CookieStore, normalize_cookies};
pub use error::NormalizeError;
pub use headers::{HeaderInput, Headers, normalize_headers};
pub use hooks::{Hook, HookEvent, Hooks, normalize_hooks};
pub use multipart::{FileSource, FileSpec, MultipartFiles, MultipartInput, normalize_files};
pub use proxy::{ProxyMap, normalize_proxies};
pub use query::{QueryInput, QueryParams, QuerySegment, normalize_query};
pub use request::{PreparedRequest, RequestDefaults, RequestHead, RequestParams};
pub use retry::{DEFAULT_MAX_RETRIES, RetryDecision, RetryInput, RetryPolicy, normalize_retry};
pub use session::Session;
pub use timeout::{TimeoutConfig, TimeoutInput, Timeouts, normalize_timeout};
pub use tls::{
    ClientCert, ClientCertInput, TrustAnchor, VerifyInput, normalize_client_cert, normalize_verify,
};
