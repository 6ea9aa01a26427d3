//! Lifecycle hooks.
//!
//! A hook receives a value and may return a replacement. Returning `None`
//! leaves the value unchanged. Hooks for one event run in registration order,
//! each seeing the output of the previous one.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument, trace};

use crate::error::NormalizeError;

/// A single-argument transformer attached to a lifecycle event.
pub trait Hook<T>: Send + Sync {
    /// Returns a replacement for `value`, or `None` to keep it.
    fn call(&self, value: &T) -> Option<T>;
}

impl<T, F> Hook<T> for F
where
    F: Fn(&T) -> Option<T> + Send + Sync,
{
    fn call(&self, value: &T) -> Option<T> {
        self(value)
    }
}

/// Request lifecycle events hooks can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HookEvent {
    /// After the request is normalized, before a connection is picked.
    PreRequest,
    /// Once a connection is picked, right before sending.
    PreSend,
    /// While the body is uploaded.
    OnUpload,
    /// On informational (1xx) responses.
    EarlyResponse,
    /// On the final response.
    Response,
}

impl HookEvent {
    pub const ALL: [HookEvent; 5] = [
        Self::PreRequest,
        Self::PreSend,
        Self::OnUpload,
        Self::EarlyResponse,
        Self::Response,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreRequest => "pre_request",
            Self::PreSend => "pre_send",
            Self::OnUpload => "on_upload",
            Self::EarlyResponse => "early_response",
            Self::Response => "response",
        }
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookEvent {
    type Err = NormalizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| {
                NormalizeError::mismatch(
                    "hooks",
                    "pre_request, pre_send, on_upload, early_response or response",
                    format!("{s:?}"),
                )
            })
    }
}

/// Shared handle to a hook.
pub type HookFn<T> = Arc<dyn Hook<T>>;

/// Hooks registered per event, in registration order.
pub struct Hooks<T> {
    registry: BTreeMap<HookEvent, Vec<HookFn<T>>>,
}

impl<T> Default for Hooks<T> {
    fn default() -> Self {
        Self {
            registry: BTreeMap::new(),
        }
    }
}

impl<T> Clone for Hooks<T> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
        }
    }
}

impl<T> fmt::Debug for Hooks<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.registry.iter().map(|(event, hooks)| (event, hooks.len())))
            .finish()
    }
}

impl<T> Hooks<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, event: HookEvent, hook: impl Hook<T> + 'static) {
        self.registry.entry(event).or_default().push(Arc::new(hook));
    }

    pub fn register_shared(&mut self, event: HookEvent, hook: HookFn<T>) {
        self.registry.entry(event).or_default().push(hook);
    }

    /// Number of hooks registered for `event`.
    #[must_use]
    pub fn count(&self, event: HookEvent) -> usize {
        self.registry.get(&event).map_or(0, Vec::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.values().all(Vec::is_empty)
    }

    /// Runs every hook for `event` over `value` and returns the final value.
    pub fn dispatch(&self, event: HookEvent, mut value: T) -> T {
        let Some(hooks) = self.registry.get(&event) else {
            return value;
        };
        for (index, hook) in hooks.iter().enumerate() {
            if let Some(replacement) = hook.call(&value) {
                trace!(%event, index, "hook replaced value");
                value = replacement;
            }
        }
        value
    }

    /// Appends `later`'s hooks after this set's, event by event.
    pub fn merge(&mut self, later: &Hooks<T>) {
        for (event, hooks) in &later.registry {
            self.registry
                .entry(*event)
                .or_default()
                .extend(hooks.iter().cloned());
        }
    }

    /// Per-event hook counts, for summaries.
    #[must_use]
    pub fn counts(&self) -> BTreeMap<HookEvent, usize> {
        self.registry
            .iter()
            .filter(|(_, hooks)| !hooks.is_empty())
            .map(|(event, hooks)| (*event, hooks.len()))
            .collect()
    }
}

/// Normalizes an event-name→hooks mapping into [`Hooks`].
///
/// # Errors
///
/// Returns [`NormalizeError::TypeMismatch`] for an unknown event name.
#[instrument(level = "debug", skip(input))]
pub fn normalize_hooks<T>(
    input: impl IntoIterator<Item = (String, Vec<HookFn<T>>)>,
) -> Result<Hooks<T>, NormalizeError> {
    let mut hooks = Hooks::new();
    for (name, callables) in input {
        let event: HookEvent = name.trim().to_ascii_lowercase().parse()?;
        for hook in callables {
            hooks.register_shared(event, hook);
        }
    }
    debug!(events = hooks.counts().len(), "normalized hooks");
    Ok(hooks)
}
