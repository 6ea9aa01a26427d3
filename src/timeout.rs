//! Timeout normalization.
//!
//! | Input | connect | read | total |
//! |-------|---------|------|-------|
//! | `t` | default | default | `t` |
//! | `(c, t)` | `c` | default | `t` |
//! | `(c, r, t)` | `c` | `r` | `t` |
//! | [`TimeoutConfig`] | as set | as set | as set |
//!
//! An unset connect or read bound falls back to its default capped by the
//! total. An unset total falls back to connect + read, saturating. No bound
//! is ever zero.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, instrument};

use crate::error::NormalizeError;

const PARAM: &str = "timeout";

/// Default connect timeout (30 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default read timeout (5 minutes for large bodies).
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(300);

/// Structured timeout with independently optional bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeoutConfig {
    pub connect: Option<Duration>,
    pub read: Option<Duration>,
    pub total: Option<Duration>,
}

/// Accepted shapes for the `timeout` request parameter. Numbers are seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeoutInput {
    Total(f64),
    ConnectTotal(f64, f64),
    ConnectReadTotal(f64, f64, f64),
    Structured(TimeoutConfig),
}

impl From<f64> for TimeoutInput {
    fn from(total: f64) -> Self {
        Self::Total(total)
    }
}

impl From<u64> for TimeoutInput {
    #[allow(clippy::cast_precision_loss)]
    fn from(total: u64) -> Self {
        Self::Total(total as f64)
    }
}

impl From<(f64, f64)> for TimeoutInput {
    fn from((connect, total): (f64, f64)) -> Self {
        Self::ConnectTotal(connect, total)
    }
}

impl From<(f64, f64, f64)> for TimeoutInput {
    fn from((connect, read, total): (f64, f64, f64)) -> Self {
        Self::ConnectReadTotal(connect, read, total)
    }
}

impl From<TimeoutConfig> for TimeoutInput {
    fn from(config: TimeoutConfig) -> Self {
        Self::Structured(config)
    }
}

/// Canonical timeout bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Timeouts {
    pub connect: Duration,
    pub read: Duration,
    pub total: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        resolve(TimeoutConfig::default())
    }
}

/// Normalizes any accepted timeout shape into [`Timeouts`].
///
/// # Errors
///
/// Returns [`NormalizeError::TypeMismatch`] for values that are not finite,
/// positive numbers of seconds.
#[instrument(level = "debug")]
pub fn normalize_timeout(input: TimeoutInput) -> Result<Timeouts, NormalizeError> {
    let config = match input {
        TimeoutInput::Total(total) => TimeoutConfig {
            total: Some(seconds(total)?),
            ..TimeoutConfig::default()
        },
        TimeoutInput::ConnectTotal(connect, total) => TimeoutConfig {
            connect: Some(seconds(connect)?),
            read: None,
            total: Some(seconds(total)?),
        },
        TimeoutInput::ConnectReadTotal(connect, read, total) => TimeoutConfig {
            connect: Some(seconds(connect)?),
            read: Some(seconds(read)?),
            total: Some(seconds(total)?),
        },
        TimeoutInput::Structured(config) => {
            for bound in [config.connect, config.read, config.total].into_iter().flatten() {
                if bound.is_zero() {
                    return Err(NormalizeError::mismatch(PARAM, "positive duration", "zero"));
                }
            }
            config
        }
    };
    let timeouts = resolve(config);
    debug!(
        connect_ms = timeouts.connect.as_millis(),
        read_ms = timeouts.read.as_millis(),
        total_ms = timeouts.total.as_millis(),
        "normalized timeout"
    );
    Ok(timeouts)
}

fn resolve(config: TimeoutConfig) -> Timeouts {
    let cap = |default: Duration| config.total.map_or(default, |total| default.min(total));
    let connect = config.connect.unwrap_or_else(|| cap(DEFAULT_CONNECT_TIMEOUT));
    let read = config.read.unwrap_or_else(|| cap(DEFAULT_READ_TIMEOUT));
    let total = config.total.unwrap_or(connect.saturating_add(read));
    Timeouts {
        connect,
        read,
        total,
    }
}

fn seconds(value: f64) -> Result<Duration, NormalizeError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(NormalizeError::mismatch(
            PARAM,
            "finite, positive number of seconds",
            value.to_string(),
        ));
    }
    Duration::try_from_secs_f64(value)
        .map_err(|e| NormalizeError::mismatch(PARAM, "representable number of seconds", e.to_string()))
}
