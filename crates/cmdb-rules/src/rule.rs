//! Rules and ordered rule sets

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Labels;
use crate::condition::Condition;
use crate::error::ConfigurationError;

fn default_true() -> bool {
    true
}

/// How a rule's conditions combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionMode {
    /// Every condition must match; no conditions means a hit
    #[default]
    All,
    /// At least one condition must match
    Any,
    /// Always hits
    Anyway,
}

/// A condition → outcome unit, generic over the outcome kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule<O> {
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "condition_typ")]
    pub condition_mode: ConditionMode,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default = "Vec::new", alias = "outcome")]
    pub outcomes: Vec<O>,
    /// Stop evaluating later rules once this one hits
    #[serde(default, alias = "last_match")]
    pub stop_on_match: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Ascending evaluation order
    #[serde(default, alias = "sort_field")]
    pub sort_key: i64,
}

impl<O> Rule<O> {
    pub fn new(name: impl Into<String>, condition_mode: ConditionMode) -> Self {
        Self {
            name: name.into(),
            condition_mode,
            conditions: Vec::new(),
            outcomes: Vec::new(),
            stop_on_match: false,
            enabled: true,
            sort_key: 0,
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_outcome(mut self, outcome: O) -> Self {
        self.outcomes.push(outcome);
        self
    }

    pub fn stop_on_match(mut self) -> Self {
        self.stop_on_match = true;
        self
    }

    pub fn with_sort_key(mut self, sort_key: i64) -> Self {
        self.sort_key = sort_key;
        self
    }

    /// Whether this rule applies to the host
    pub fn hits(&self, hostname: &str, labels: &Labels) -> bool {
        match self.condition_mode {
            ConditionMode::All => self.conditions.iter().all(|c| c.matches(hostname, labels)),
            ConditionMode::Any => self.conditions.iter().any(|c| c.matches(hostname, labels)),
            ConditionMode::Anyway => true,
        }
    }
}

/// Ordered snapshot of enabled rules
///
/// Built once per run and never mutated while evaluating. Rules that failed
/// to load are kept aside as [`ConfigurationError`]s.
#[derive(Debug, Clone)]
pub struct RuleSet<O> {
    rules: Vec<Rule<O>>,
    rejected: Vec<ConfigurationError>,
}

impl<O> Default for RuleSet<O> {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            rejected: Vec::new(),
        }
    }
}

impl<O> RuleSet<O> {
    /// Keep enabled rules and order them by sort key, preserving input order on ties
    pub fn new(rules: Vec<Rule<O>>) -> Self {
        let mut rules: Vec<Rule<O>> = rules.into_iter().filter(|r| r.enabled).collect();
        rules.sort_by_key(|r| r.sort_key);
        Self {
            rules,
            rejected: Vec::new(),
        }
    }

    pub fn rules(&self) -> &[Rule<O>] {
        &self.rules
    }

    /// Rules that could not be loaded
    pub fn rejected(&self) -> &[ConfigurationError] {
        &self.rejected
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule<O>> {
        self.rules.iter()
    }

    /// Rules hitting the host, in order, up to and including the first
    /// hitting rule with `stop_on_match`
    pub fn matching<'a>(&'a self, hostname: &str, labels: &Labels) -> Vec<&'a Rule<O>> {
        let mut hits = Vec::new();
        for rule in &self.rules {
            if !rule.hits(hostname, labels) {
                continue;
            }
            tracing::debug!(rule = %rule.name, hostname, "Rule hit");
            hits.push(rule);
            if rule.stop_on_match {
                tracing::debug!(rule = %rule.name, hostname, "Rule stops evaluation");
                break;
            }
        }
        hits
    }
}

impl<O: DeserializeOwned> RuleSet<O> {
    /// Build from raw rule documents, deserialising each one on its own
    ///
    /// A malformed rule is logged and recorded in [`Self::rejected`]; the
    /// remaining rules load normally.
    pub fn from_values(values: Vec<Value>) -> Self {
        let mut rules = Vec::with_capacity(values.len());
        let mut rejected = Vec::new();

        for (index, value) in values.into_iter().enumerate() {
            let name = value
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("<unnamed>")
                .to_string();
            match serde_json::from_value::<Rule<O>>(value) {
                Ok(rule) => rules.push(rule),
                Err(e) => {
                    let error = ConfigurationError {
                        rule: name,
                        index,
                        message: e.to_string(),
                    };
                    tracing::warn!(%error, "Skipping malformed rule");
                    rejected.push(error);
                }
            }
        }

        let mut set = Self::new(rules);
        set.rejected = rejected;
        set
    }
}

impl<'a, O> IntoIterator for &'a RuleSet<O> {
    type Item = &'a Rule<O>;
    type IntoIter = std::slice::Iter<'a, Rule<O>>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}
