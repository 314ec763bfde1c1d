//! # Parameter Resolution
//!
//! Deployment steps declare their parameters as expressions that may pull
//! values produced by earlier steps. This module owns the per-run
//! [`ParameterStore`] that threads those values between steps, and the
//! resolver that evaluates a step's expression map against it.
//!
//! ## Expression Grammar
//!
//! - A non-array value is a literal and passes through unchanged.
//! - An array is a list of fragments joined without a separator. Each
//!   fragment is either a literal or a single-element array holding a dotted
//!   path into the store, for example `["context.resourceNameSuffix"]`.
//!
//! ```rust
//! use sb_engine::resolve::{ParameterStore, resolve_parameters};
//! use serde_json::json;
//!
//! let mut store = ParameterStore::default();
//! store.seed_context(json!({ "resourceNameSuffix": "abc12345" }).as_object().unwrap().clone());
//!
//! let expressions = json!({
//!     "resourceGroupName": ["rg-", ["context.resourceNameSuffix"]],
//!     "location": "eastus"
//! });
//! let resolved = resolve_parameters(expressions.as_object().unwrap(), &store);
//! assert_eq!(resolved["resourceGroupName"], "rg-abc12345");
//! assert_eq!(resolved["location"], "eastus");
//! ```
//!
//! Path lookups never fail: an absent path contributes empty text and logs a
//! warning.

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::warn;

/// Reserved store entry holding run-wide values.
pub const CONTEXT_ENTRY: &str = "context";

/// Per-run mapping from step-type identifier to that step's parameter record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterStore {
    entries: IndexMap<String, Map<String, Value>>,
}

impl ParameterStore {
    /// Drops every entry, including the `context` entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Replaces the reserved `context` entry.
    pub fn seed_context(&mut self, context: Map<String, Value>) {
        self.entries.insert(CONTEXT_ENTRY.to_string(), context);
    }

    /// Returns the record stored for `step_type`.
    pub fn entry(&self, step_type: &str) -> Option<&Map<String, Value>> {
        self.entries.get(step_type)
    }

    /// Merges `record` into the entry for `step_type`, overwriting colliding keys.
    pub fn merge(&mut self, step_type: &str, record: Map<String, Value>) {
        let entry = self.entries.entry(step_type.to_string()).or_default();
        for (key, value) in record {
            entry.insert(key, value);
        }
    }

    /// Sets a single key of the entry for `step_type`.
    pub fn set(&mut self, step_type: &str, key: impl Into<String>, value: Value) {
        self.entries
            .entry(step_type.to_string())
            .or_default()
            .insert(key.into(), value);
    }

    /// Looks up a dotted path such as `createAdxCluster.clusterName` or
    /// `createIotCentralApp.identity.principalId`. Bracket indices
    /// (`items[0].id`) are accepted as well.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let segments = split_path(path);
        let (entry_key, rest) = segments.split_first()?;
        let entry = self.entries.get(entry_key.as_str())?;
        let (first_field, rest) = rest.split_first()?;
        let value = entry.get(first_field.as_str())?;
        descend(value, rest)
    }

    /// Convenience wrapper returning a string value at `path`.
    pub fn lookup_str(&self, path: &str) -> Option<&str> {
        self.lookup(path).and_then(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Walks `segments` into `value`, descending objects by key and arrays by index.
pub fn descend<'a, S: AsRef<str>>(mut value: &'a Value, segments: &[S]) -> Option<&'a Value> {
    for segment in segments {
        let segment = segment.as_ref();
        value = match value {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(value)
}

/// Splits `a.b[0].c` into `["a", "b", "0", "c"]`.
pub fn split_path(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.trim().chars().peekable();

    while let Some(character) = chars.next() {
        match character {
            '.' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
                let mut inner = String::new();
                for next_character in chars.by_ref() {
                    if next_character == ']' {
                        break;
                    }
                    inner.push(next_character);
                }
                let inner = inner.trim().trim_matches(['"', '\'']);
                if !inner.is_empty() {
                    segments.push(inner.to_string());
                }
            }
            _ => current.push(character),
        }
    }

    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

/// Resolves a step's parameter-expression map into a flat record.
pub fn resolve_parameters(expressions: &Map<String, Value>, store: &ParameterStore) -> Map<String, Value> {
    expressions
        .iter()
        .map(|(name, expression)| (name.clone(), resolve_parameter(name, expression, store)))
        .collect()
}

/// Resolves a single parameter expression.
pub fn resolve_parameter(name: &str, expression: &Value, store: &ParameterStore) -> Value {
    let Value::Array(fragments) = expression else {
        return expression.clone();
    };

    let mut joined = String::new();
    for fragment in fragments {
        match fragment {
            Value::Array(reference) => joined.push_str(&resolve_reference(name, reference, store)),
            literal => joined.push_str(&value_text(literal)),
        }
    }
    Value::String(joined)
}

fn resolve_reference(name: &str, reference: &[Value], store: &ParameterStore) -> String {
    let Some(path) = reference.first().and_then(Value::as_str) else {
        warn!(parameter = name, "parameter reference is not a path string");
        return String::new();
    };

    match store.lookup(path) {
        Some(value) if !is_absent(value) => value_text(value),
        _ => {
            warn!(parameter = name, path, "parameter reference did not resolve; using empty value");
            String::new()
        }
    }
}

fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

/// Text form of a JSON value as it appears when joined or substituted.
///
/// Strings are used raw, `null` becomes empty text, scalars their literal
/// form, and containers their compact JSON.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
