//! String predicates used by every condition

use serde::{Deserialize, Serialize};

/// How a subject is compared against a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    #[default]
    Equal,
    #[serde(alias = "in")]
    Contains,
    #[serde(alias = "swith")]
    StartsWith,
    #[serde(alias = "ewith")]
    EndsWith,
}

/// Evaluate `mode` on `(subject, pattern)` and flip the result when `negate` is set
///
/// Case-sensitive; callers lower-case where needed. An empty pattern never
/// satisfies `Contains`, `StartsWith` or `EndsWith`.
pub fn matches(subject: &str, pattern: &str, mode: MatchMode, negate: bool) -> bool {
    let hit = match mode {
        MatchMode::Equal => subject == pattern,
        MatchMode::Contains => !pattern.is_empty() && subject.contains(pattern),
        MatchMode::StartsWith => !pattern.is_empty() && subject.starts_with(pattern),
        MatchMode::EndsWith => !pattern.is_empty() && subject.ends_with(pattern),
    };
    hit != negate
}

/// A pattern together with its match mode and negation flag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    pub pattern: String,
    #[serde(default)]
    pub mode: MatchMode,
    #[serde(default)]
    pub negate: bool,
}

impl Pattern {
    pub fn new(pattern: impl Into<String>, mode: MatchMode) -> Self {
        Self {
            pattern: pattern.into(),
            mode,
            negate: false,
        }
    }

    pub fn equal(pattern: impl Into<String>) -> Self {
        Self::new(pattern, MatchMode::Equal)
    }

    /// Same pattern with the negation flag set
    pub fn negated(mut self) -> Self {
        self.negate = true;
        self
    }

    pub fn matches(&self, subject: &str) -> bool {
        matches(subject, &self.pattern, self.mode, self.negate)
    }

    /// Case-insensitive variant, lower-casing both sides
    pub fn matches_ignore_case(&self, subject: &str) -> bool {
        matches(
            &subject.to_lowercase(),
            &self.pattern.to_lowercase(),
            self.mode,
            self.negate,
        )
    }
}
