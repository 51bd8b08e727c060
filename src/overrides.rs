//! Pre-init variable overrides
//!
//! Models that declare the overrides hook receive a fuzz seed and a builder
//! for typed variable overrides before each init. Dict and list values are
//! plain [`ModelValue`] maps/sequences, so they pass through the value codec
//! unchanged.

use crate::value::{ModelValue, WireValue, encode};

/// Fuzzing context handed to the override provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FuzzOptions {
    /// Seed chosen by the engine for this run.
    pub seed: u64,
}

/// Builder for declaring typed variable overrides.
///
/// Insertion order is preserved; setting an existing key replaces its value.
#[derive(Debug, Default)]
pub struct OverridesBuilder {
    entries: Vec<(String, ModelValue)>,
}

impl OverridesBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable override from any convertible value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ModelValue>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.entries.iter_mut().find(|(name, _)| *name == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
        self
    }

    /// Set a string variable override.
    pub fn set_string(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.set(key, ModelValue::Str(value.into()))
    }

    /// Set an integer variable override.
    pub fn set_int(&mut self, key: impl Into<String>, value: i64) -> &mut Self {
        self.set(key, ModelValue::Int(value))
    }

    /// Set a boolean variable override.
    pub fn set_bool(&mut self, key: impl Into<String>, value: bool) -> &mut Self {
        self.set(key, ModelValue::Bool(value))
    }

    /// Set a list variable override.
    pub fn set_list(&mut self, key: impl Into<String>, value: Vec<ModelValue>) -> &mut Self {
        self.set(key, ModelValue::List(value))
    }

    /// Set a dict variable override from a map-shaped value.
    pub fn set_dict(&mut self, key: impl Into<String>, value: impl Into<ModelValue>) -> &mut Self {
        self.set(key, value)
    }

    /// Look up an override by name.
    pub fn get(&self, key: &str) -> Option<&ModelValue> {
        self.entries
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }

    /// Whether an override has been set for `key`.
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Remove an override; returns true when a value was present.
    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(name, _)| name != key);
        self.entries.len() != before
    }

    /// Discard all overrides.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of overrides set.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no overrides have been set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encode the collected overrides for the wire, consuming the builder.
    pub fn into_wire(self) -> Vec<(String, WireValue)> {
        self.entries
            .into_iter()
            .map(|(name, value)| (name, encode(&value)))
            .collect()
    }
}
