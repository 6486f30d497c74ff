//! `env:` indirection for tenant settings.
//!
//! A tenant value is either a literal or a reference of the form `env:NAME`.
//! References are looked up through an [`EnvSource`] at resolution time; nothing
//! is cached, so a changed variable is picked up by the next request.

use std::collections::HashMap;

use serde_json::Value;
use tracing::warn;

/// Marker prefix for environment references.
pub const ENV_MARKER: &str = "env:";

/// Read access to environment variables.
pub trait EnvSource: Send + Sync {
    fn var(&self, name: &str) -> Option<String>;
}

/// Reads the live process environment on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Fixed set of variables, used by tests and the admin CLI.
#[derive(Debug, Clone, Default)]
pub struct MapEnv {
    vars: HashMap<String, String>,
}

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.vars.insert(name.to_string(), value.to_string());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapEnv {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl EnvSource for MapEnv {
    fn var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

/// Resolves one raw tenant value.
///
/// Numbers are rendered as decimal strings. `env:NAME` is replaced by the
/// trimmed value of `NAME`; an unset or blank variable yields `None` and a
/// warning. Empty literals and `null` also yield `None`.
pub fn resolve_value(raw: &Value, env: &dyn EnvSource) -> Option<String> {
    match raw {
        Value::Null => None,
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::String(s) => match s.strip_prefix(ENV_MARKER) {
            Some(name) => {
                let name = name.trim();
                match env.var(name).map(|v| v.trim().to_string()) {
                    Some(value) if !value.is_empty() => Some(value),
                    _ => {
                        warn!(variable = name, "environment variable referenced by tenant config is not set");
                        None
                    }
                }
            }
            None if s.is_empty() => None,
            None => Some(s.clone()),
        },
        Value::Array(_) | Value::Object(_) => {
            warn!("tenant config value is not a scalar; ignoring it");
            None
        }
    }
}

/// Resolves a value and parses it as a positive identifier.
pub fn resolve_id(raw: &Value, env: &dyn EnvSource) -> Option<u64> {
    resolve_value(raw, env)
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|id| *id > 0)
}
