//! An ordered string-to-string property map.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// An ordered map of property names to values.
///
/// Iteration and serialization are always in key order, so generated files
/// are deterministic and diff-friendly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertySet {
    entries: BTreeMap<String, String>,
}

/// The value recorded for properties whose source produced nothing usable.
pub const UNKNOWN_VALUE: &str = "Unknown";

impl PropertySet {
    /// Create an empty property set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a property, replacing any previous value.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Insert a property, storing [`UNKNOWN_VALUE`] when the value is
    /// missing or blank. Collected metadata should never silently drop a
    /// key; a placeholder keeps the generated file shape stable.
    pub fn put_or_unknown(&mut self, key: impl Into<String>, value: Option<&str>) {
        let value = match value {
            Some(v) if !v.trim().is_empty() => v.to_string(),
            _ => UNKNOWN_VALUE.to_string(),
        };
        self.entries.insert(key.into(), value);
    }

    /// Look up a property value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Whether the set holds a value for `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove a property, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    /// Iterate over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The number of properties in the set.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, String)> for PropertySet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a PropertySet {
    type Item = (&'a String, &'a String);
    type IntoIter = std::collections::btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
