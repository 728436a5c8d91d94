//! Category filter: the configured target set and the per-record membership test.

use ahash::AHashSet;
use serde_json::{Map, Value};

/// Normalize a configured target: trim, lowercase, drop a leading "r/".
#[inline]
pub fn normalize_category(s: &str) -> String {
    let s = s.trim().to_lowercase();
    if let Some(rest) = s.strip_prefix("r/") { rest.to_string() } else { s }
}

/// Extract the lowercased category string of a record.
/// Missing or non-string values yield None (a non-match, never an error).
pub fn category_lower(obj: &Map<String, Value>, field: &str) -> Option<String> {
    obj.get(field)
        .and_then(|x| x.as_str())
        .map(|s| s.to_lowercase())
}

/// Set of normalized target categories.
#[derive(Clone, Debug, Default)]
pub struct TargetSet {
    field: String,
    targets: AHashSet<String>,
}

impl TargetSet {
    pub fn new<I, S>(field: impl Into<String>, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let targets = targets
            .into_iter()
            .map(|s| normalize_category(s.as_ref()))
            .filter(|s| !s.is_empty())
            .collect();
        Self { field: field.into(), targets }
    }

    pub fn field(&self) -> &str { &self.field }
    pub fn len(&self) -> usize { self.targets.len() }
    pub fn is_empty(&self) -> bool { self.targets.is_empty() }

    /// True iff the record's category, lowercased, is one of the targets.
    pub fn matches(&self, obj: &Map<String, Value>) -> bool {
        match category_lower(obj, &self.field) {
            Some(c) => self.targets.contains(&c),
            None => false,
        }
    }
}
