//! Ignore patterns for the watched tree.
//!
//! A pattern matches when it appears anywhere in the candidate path, so
//! `.git` excludes `./.git`, `./.git/objects` and `./sub/.gitignore` alike.

use std::path::Path;

/// Ordered set of substring patterns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreSet {
    patterns: Vec<String>,
}

impl IgnoreSet {
    /// Build a set from patterns. Empty patterns are dropped; they would
    /// match every path.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(Into::into)
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Check whether any pattern is a substring of `path`.
    pub fn is_ignored(&self, path: &Path) -> bool {
        let candidate = path.to_string_lossy();
        self.patterns.iter().any(|p| candidate.contains(p.as_str()))
    }

    /// The patterns in this set.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Check if the set has no patterns.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
