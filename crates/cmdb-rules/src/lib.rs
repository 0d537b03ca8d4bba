//! Rule matching and outcome resolution
//!
//! Rules pair a list of [`Condition`]s with a list of outcomes. A
//! [`RuleSet`] is an ordered, read-only snapshot of enabled rules; the
//! [`RuleEngine`] walks it for one host and folds the outcomes of every
//! hitting rule into a [`ResolvedOutcomeSet`].
//!
//! # Example
//!
//! ```
//! use cmdb_rules::{Labels, RuleEngine, RuleSet};
//! use serde_json::json;
//!
//! let rules = RuleSet::from_values(vec![json!({
//!     "name": "linux",
//!     "condition_mode": "all",
//!     "conditions": [{ "match_type": "tag", "tag": "os", "value": "linux" }],
//!     "outcomes": [{ "type": "move_folder", "param": "/Linux" }],
//! })]);
//! let engine = RuleEngine::new(rules);
//!
//! let labels: Labels = [("os".to_string(), "Linux".to_string())].into();
//! let outcome = engine.evaluate("web1", &labels);
//! assert_eq!(outcome.move_folder.as_deref(), Some("/linux"));
//! ```

pub mod condition;
pub mod engine;
pub mod error;
pub mod loader;
pub mod matcher;
pub mod outcome;
pub mod rule;

pub use condition::Condition;
pub use engine::RuleEngine;
pub use error::{ConfigurationError, Error, Result};
pub use loader::RuleFormat;
pub use matcher::{MatchMode, Pattern, matches};
pub use outcome::{ActionOutcome, OutcomeAccumulator, ResolvedOutcomeSet, normalize_folder};
pub use rule::{ConditionMode, Rule, RuleSet};

/// Host labels as seen by rules, ordered by key
pub type Labels = std::collections::BTreeMap<String, String>;
