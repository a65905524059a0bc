//! Payload redaction.
//!
//! Keys are compared case-insensitively with `_` and `-` ignored, and a key
//! matches when it contains a deny-listed word (`userPassword`, `api_key` and
//! `X-Api-Key` all match their entries). Matching values are replaced by
//! [`REDACTED`] at every nesting depth, including objects inside arrays.

use serde_json::{Map, Value};

/// Marker written in place of a sensitive value.
pub const REDACTED: &str = "[REDACTED]";

#[derive(Debug, Clone)]
pub struct Redactor {
    denied: Vec<String>,
}

impl Redactor {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let denied = keys
            .into_iter()
            .map(|k| normalize(k.as_ref()))
            .filter(|k| !k.is_empty())
            .collect();
        Self { denied }
    }

    /// A copy of this redactor that also denies `keys`.
    pub fn extended<I, S>(&self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut denied = self.denied.clone();
        for key in keys {
            let key = normalize(key.as_ref());
            if !key.is_empty() && !denied.contains(&key) {
                denied.push(key);
            }
        }
        Self { denied }
    }

    pub fn is_sensitive(&self, key: &str) -> bool {
        let key = normalize(key);
        self.denied.iter().any(|d| key.contains(d.as_str()))
    }

    /// Return a redacted copy of `value`.
    pub fn redact(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(self.redact_map(map)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.redact(v)).collect()),
            other => other.clone(),
        }
    }

    fn redact_map(&self, map: &Map<String, Value>) -> Map<String, Value> {
        map.iter()
            .map(|(key, value)| {
                let value = if self.is_sensitive(key) {
                    Value::String(REDACTED.to_string())
                } else {
                    self.redact(value)
                };
                (key.clone(), value)
            })
            .collect()
    }
}

fn normalize(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}
