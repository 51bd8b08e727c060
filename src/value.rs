//! Value codec: conversion between native model values and the wire format
//!
//! The engine exchanges a recursive tagged value representation. Encoding is
//! total: native shapes with no wire counterpart degrade to `Absent`, never to
//! an error. Map entries are serialized in a canonical order so that captured
//! states compare equal across runs regardless of native insertion order.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Kind tag for wire-level sentinel values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentinelKind {
    /// Ignore this value (or this map key) during state comparison.
    Ignore,
}

/// Wire representation of a value, mirroring the engine's schema.
///
/// Produced fresh per conversion call and owned exclusively by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireValue {
    /// Absent/unset value; also the fallback for unconvertible native shapes.
    Absent,
    /// UTF-8 string.
    Str(String),
    /// Signed integer; the engine's numeric domain has no fractional part.
    Int(i64),
    /// Boolean.
    Bool(bool),
    /// Ordered, index-addressed sequence.
    List(Vec<WireValue>),
    /// Key/value pairs in canonical order (see [`encode`]).
    Map(Vec<(WireValue, WireValue)>),
    /// Comparison sentinel; flows native to wire only.
    Sentinel(SentinelKind),
}

/// Native value produced by and handed to user model code.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelValue {
    /// Absent value.
    Null,
    /// UTF-8 string.
    Str(String),
    /// Signed integer.
    Int(i64),
    /// Floating-point number; truncated toward zero on encode.
    Float(f64),
    /// Boolean.
    Bool(bool),
    /// Ordered sequence.
    List(Vec<ModelValue>),
    /// Key/value mapping; entry order is irrelevant, encoding canonicalizes it.
    Map(Vec<(ModelValue, ModelValue)>),
    /// Well-known sentinel: ignore this field during state comparison.
    Ignore,
    /// Identity-distinct ignore marker, usable as a map key so that several
    /// ignored entries coexist in one mapping without collapsing.
    Ignored(Uuid),
}

impl ModelValue {
    /// Mint a fresh unique-ignore marker.
    pub fn ignored() -> Self {
        ModelValue::Ignored(Uuid::new_v4())
    }

    /// Returns the integer value if this is an `Int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ModelValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the string slice if this is a `Str`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ModelValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the boolean if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ModelValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for ModelValue {
    fn from(value: &str) -> Self {
        ModelValue::Str(value.to_string())
    }
}

impl From<String> for ModelValue {
    fn from(value: String) -> Self {
        ModelValue::Str(value)
    }
}

impl From<i64> for ModelValue {
    fn from(value: i64) -> Self {
        ModelValue::Int(value)
    }
}

impl From<i32> for ModelValue {
    fn from(value: i32) -> Self {
        ModelValue::Int(value as i64)
    }
}

impl From<f64> for ModelValue {
    fn from(value: f64) -> Self {
        ModelValue::Float(value)
    }
}

impl From<bool> for ModelValue {
    fn from(value: bool) -> Self {
        ModelValue::Bool(value)
    }
}

impl<T: Into<ModelValue>> From<Vec<T>> for ModelValue {
    fn from(value: Vec<T>) -> Self {
        ModelValue::List(value.into_iter().map(Into::into).collect())
    }
}

impl<V: Into<ModelValue>> From<BTreeMap<String, V>> for ModelValue {
    fn from(value: BTreeMap<String, V>) -> Self {
        ModelValue::Map(
            value
                .into_iter()
                .map(|(k, v)| (ModelValue::Str(k), v.into()))
                .collect(),
        )
    }
}

impl<V: Into<ModelValue>> From<HashMap<String, V>> for ModelValue {
    fn from(value: HashMap<String, V>) -> Self {
        ModelValue::Map(
            value
                .into_iter()
                .map(|(k, v)| (ModelValue::Str(k), v.into()))
                .collect(),
        )
    }
}

/// Convert a wire value to a native value.
///
/// Total: malformed or unrecognized wire input degrades to `Null` rather than
/// failing the call. Sentinels decode to `Null`; they only flow native→wire.
pub fn decode(value: &WireValue) -> ModelValue {
    match value {
        WireValue::Absent => ModelValue::Null,
        WireValue::Str(s) => ModelValue::Str(s.clone()),
        WireValue::Int(n) => ModelValue::Int(*n),
        WireValue::Bool(b) => ModelValue::Bool(*b),
        WireValue::List(items) => ModelValue::List(items.iter().map(decode).collect()),
        WireValue::Map(entries) => ModelValue::Map(
            entries
                .iter()
                .map(|(key, value)| (decode(key), decode(value)))
                .collect(),
        ),
        WireValue::Sentinel(_) => ModelValue::Null,
    }
}

/// Convert a native value to a wire value.
///
/// Sentinels are checked before anything else since a marker may otherwise
/// look like an ordinary value. Floats truncate toward zero. Map entries are
/// sorted by the lexicographic order of each entry's canonical textual
/// encoding (key and value both included), giving deterministic output
/// independent of native iteration order.
pub fn encode(value: &ModelValue) -> WireValue {
    match value {
        ModelValue::Ignore | ModelValue::Ignored(_) => WireValue::Sentinel(SentinelKind::Ignore),
        ModelValue::Null => WireValue::Absent,
        ModelValue::Str(s) => WireValue::Str(s.clone()),
        ModelValue::Int(n) => WireValue::Int(*n),
        ModelValue::Float(f) => WireValue::Int(f.trunc() as i64),
        ModelValue::Bool(b) => WireValue::Bool(*b),
        ModelValue::List(items) => WireValue::List(items.iter().map(encode).collect()),
        ModelValue::Map(entries) => {
            let mut encoded: Vec<(WireValue, WireValue)> = entries
                .iter()
                .map(|(key, value)| (encode(key), encode(value)))
                .collect();
            encoded.sort_by_cached_key(canonical_entry_text);
            WireValue::Map(encoded)
        }
    }
}

/// Canonical textual form of an encoded map entry, used as the sort key.
fn canonical_entry_text(entry: &(WireValue, WireValue)) -> String {
    serde_json::to_string(entry).unwrap_or_default()
}
