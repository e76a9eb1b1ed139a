//! Change classifiers
//!
//! A classifier decides whether a change that was already observed (the
//! before and after values differ) is significant enough for a rule to fire.

use semver::Version;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Decides whether a differing before/after pair counts as a change
pub trait ChangeComparator: Send + Sync + fmt::Debug {
    fn accepts(&self, before: Option<&Value>, after: Option<&Value>) -> bool;
}

/// Built-in classifiers selectable from a rule's `whenChangeClassifier`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeClassifier {
    /// Any difference
    Any,
    /// Major version component changed
    Major,
    /// Major or minor component changed
    Minor,
    /// Any of major, minor or patch changed
    Patch,
}

impl ChangeClassifier {
    pub const ALL: [ChangeClassifier; 4] = [Self::Any, Self::Major, Self::Minor, Self::Patch];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Major => "major",
            Self::Minor => "minor",
            Self::Patch => "patch",
        }
    }
}

impl fmt::Display for ChangeClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparator used when a rule names none
pub const DEFAULT_COMPARATOR: &str = "any";

/// Named comparators that rules select by `whenChangeClassifier`.
///
/// Starts with the built-in classifiers; callers may register their own
/// under new names or replace a built-in.
#[derive(Clone)]
pub struct Comparators {
    by_name: BTreeMap<String, Arc<dyn ChangeComparator>>,
}

impl Comparators {
    pub fn builtin() -> Self {
        let mut comparators = Self { by_name: BTreeMap::new() };
        for classifier in ChangeClassifier::ALL {
            comparators.register(classifier.as_str(), classifier);
        }
        comparators
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        comparator: impl ChangeComparator + 'static,
    ) -> &mut Self {
        self.by_name.insert(name.into(), Arc::new(comparator));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ChangeComparator>> {
        self.by_name.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    /// Comparator for a rule's classifier name, [`DEFAULT_COMPARATOR`] when unset
    pub fn resolve(&self, name: Option<&str>) -> Result<(String, Arc<dyn ChangeComparator>), String> {
        let name = name.map(str::trim).unwrap_or(DEFAULT_COMPARATOR);
        match self.get(name) {
            Some(comparator) => Ok((name.to_string(), comparator)),
            None => Err(format!(
                "unknown change classifier '{}' (expected one of {})",
                name,
                self.names().collect::<Vec<_>>().join(", ")
            )),
        }
    }
}

impl Default for Comparators {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for Comparators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.by_name.keys()).finish()
    }
}

impl ChangeComparator for ChangeClassifier {
    fn accepts(&self, before: Option<&Value>, after: Option<&Value>) -> bool {
        if before == after {
            return false;
        }
        if *self == Self::Any {
            return true;
        }

        // not both versions: plain inequality, which already holds
        let (Some(old), Some(new)) = (before.and_then(as_version), after.and_then(as_version)) else {
            return true;
        };

        match self {
            Self::Any => true,
            Self::Major => old.major != new.major,
            Self::Minor => (old.major, old.minor) != (new.major, new.minor),
            Self::Patch => (old.major, old.minor, old.patch) != (new.major, new.minor, new.patch),
        }
    }
}

fn as_version(value: &Value) -> Option<Version> {
    match value {
        Value::String(s) => parse_lenient(s),
        Value::Number(n) => parse_lenient(&n.to_string()),
        _ => None,
    }
}

/// Semver parse that tolerates a `v` prefix and missing minor/patch parts
pub fn parse_lenient(raw: &str) -> Option<Version> {
    let trimmed = raw.trim();
    let s = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);

    if let Ok(version) = Version::parse(s) {
        return Some(version);
    }

    let split = s.find(|c| c == '-' || c == '+').unwrap_or(s.len());
    let (core, suffix) = s.split_at(split);
    let parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty()
        || parts.len() > 3
        || parts.iter().any(|p| p.is_empty() || !p.chars().all(|c| c.is_ascii_digit()))
    {
        return None;
    }

    let mut padded: Vec<&str> = parts;
    padded.resize(3, "0");
    Version::parse(&format!("{}{}", padded.join("."), suffix)).ok()
}
