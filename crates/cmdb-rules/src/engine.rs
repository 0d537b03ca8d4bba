//! Per-host evaluation of action rules

use crate::Labels;
use crate::outcome::{ActionOutcome, OutcomeAccumulator, ResolvedOutcomeSet};
use crate::rule::RuleSet;

/// Evaluates an ordered action rule set against hosts
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    rules: RuleSet<ActionOutcome>,
}

impl RuleEngine {
    pub fn new(rules: RuleSet<ActionOutcome>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleSet<ActionOutcome> {
        &self.rules
    }

    /// Fold the outcomes of every hitting rule into one result
    ///
    /// Rules are visited in sort order; evaluation ends after the first
    /// hitting rule marked `stop_on_match`. `labels` is whatever attribute
    /// set the caller resolved for the host, inventory included.
    pub fn evaluate(&self, hostname: &str, labels: &Labels) -> ResolvedOutcomeSet {
        let mut accumulator = OutcomeAccumulator::new();
        for rule in self.rules.matching(hostname, labels) {
            for outcome in &rule.outcomes {
                accumulator.apply(outcome, labels);
            }
        }
        accumulator.finish()
    }
}
