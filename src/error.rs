//! Error types for request parameter normalization.
//!
//! Every failure is a caller programming error: it is raised synchronously at
//! request-construction time and never reaches the transport layer.

use std::borrow::Cow;

use thiserror::Error;

/// Errors that can occur while normalizing request parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    /// The value's shape is not a member of the parameter's accepted union.
    #[error("{param}: expected {expected}, got {found}")]
    TypeMismatch {
        /// Parameter being normalized (e.g. `headers`, `timeout`).
        param: &'static str,
        /// Description of the accepted shape(s).
        expected: &'static str,
        /// What was actually supplied.
        found: String,
    },

    /// A tuple-shaped input is missing a required element.
    #[error("{param}: {shape} is missing required element `{missing}`")]
    ShapeIncomplete {
        /// Parameter being normalized.
        param: &'static str,
        /// The tuple shape that was recognised.
        shape: &'static str,
        /// The missing element.
        missing: &'static str,
    },

    /// Two mutually exclusive inputs were supplied for the same request.
    #[error("`{first}` and `{second}` cannot both be supplied")]
    ShapeConflict {
        /// First conflicting parameter, or the key within it.
        first: Cow<'static, str>,
        /// Second conflicting parameter, or the key within it.
        second: Cow<'static, str>,
    },
}

impl NormalizeError {
    /// Creates a `TypeMismatch` error.
    pub fn mismatch(param: &'static str, expected: &'static str, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            param,
            expected,
            found: found.into(),
        }
    }

    /// Creates a `ShapeIncomplete` error.
    #[must_use]
    pub fn incomplete(param: &'static str, shape: &'static str, missing: &'static str) -> Self {
        Self::ShapeIncomplete {
            param,
            shape,
            missing,
        }
    }

    /// Creates a `ShapeConflict` error.
    #[must_use]
    pub fn conflict(first: impl Into<Cow<'static, str>>, second: impl Into<Cow<'static, str>>) -> Self {
        Self::ShapeConflict {
            first: first.into(),
            second: second.into(),
        }
    }

    /// Returns the parameter the error was raised for.
    ///
    /// For conflicts this is the first of the two parameters.
    #[must_use]
    pub fn param(&self) -> &str {
        match self {
            Self::TypeMismatch { param, .. } | Self::ShapeIncomplete { param, .. } => *param,
            Self::ShapeConflict { first, .. } => first.as_ref(),
        }
    }
}
