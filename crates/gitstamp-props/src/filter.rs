//! Property include/exclude filtering by name pattern.

use regex::{Regex, RegexBuilder};
use thiserror::Error;

use crate::set::PropertySet;

/// Errors that can occur while building a property filter.
#[derive(Debug, Error)]
pub enum FilterError {
    /// A supplied pattern was not a valid regular expression.
    #[error("invalid property filter pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Decides which property names are exposed.
///
/// A name passes when it matches at least one include-only pattern (or no
/// include-only patterns were configured) and matches no exclude pattern.
/// Patterns are full regular expressions matched case-insensitively, e.g.
/// `^git\.commit\..*` or `.*\.user\..*`.
#[derive(Debug, Clone, Default)]
pub struct PropertyFilter {
    include_only: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl PropertyFilter {
    /// Build a filter from include-only and exclude pattern lists.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::Pattern`] for the first pattern that fails
    /// to compile.
    pub fn new<S: AsRef<str>>(include_only: &[S], exclude: &[S]) -> Result<Self, FilterError> {
        Ok(Self {
            include_only: compile_patterns(include_only)?,
            exclude: compile_patterns(exclude)?,
        })
    }

    /// A filter that passes every property name.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Whether the property `name` passes the filter.
    pub fn is_included(&self, name: &str) -> bool {
        let included = self.include_only.is_empty()
            || self.include_only.iter().any(|pattern| pattern.is_match(name));
        included && !self.exclude.iter().any(|pattern| pattern.is_match(name))
    }

    /// The subset of `properties` whose names pass the filter.
    pub fn apply(&self, properties: &PropertySet) -> PropertySet {
        properties
            .iter()
            .filter(|(name, _)| self.is_included(name))
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect()
    }
}

fn compile_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Regex>, regex::Error> {
    patterns
        .iter()
        .map(|pattern| {
            RegexBuilder::new(pattern.as_ref())
                .case_insensitive(true)
                .build()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
