//! Conditions over a host's identity and labels

use serde::{Deserialize, Serialize};

use crate::Labels;
use crate::matcher::{MatchMode, Pattern};

/// A single rule condition
///
/// Deserialises from the flat definition form, e.g.
///
/// ```toml
/// [[rule.conditions]]
/// match_type = "tag"
/// tag = "os"
/// value = "linux"
/// value_match = "in"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ConditionDefinition", into = "ConditionDefinition")]
pub enum Condition {
    /// Matches the lower-cased hostname
    Hostname(Pattern),
    /// Matches when one label satisfies both the key and the value pattern
    Label { tag: Pattern, value: Pattern },
}

impl Condition {
    pub fn hostname(pattern: Pattern) -> Self {
        Self::Hostname(pattern)
    }

    pub fn label(tag: Pattern, value: Pattern) -> Self {
        Self::Label { tag, value }
    }

    /// Evaluate against one host
    ///
    /// Hostnames and label values compare case-insensitively, label keys
    /// compare as stored.
    pub fn matches(&self, hostname: &str, labels: &Labels) -> bool {
        match self {
            Self::Hostname(pattern) => pattern.matches_ignore_case(hostname),
            Self::Label { tag, value } => labels
                .iter()
                .any(|(k, v)| tag.matches(k) && value.matches_ignore_case(v)),
        }
    }
}

/// Condition discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    #[serde(alias = "hostname")]
    Host,
    #[serde(alias = "label")]
    Tag,
}

/// Flat, serialisable form of a [`Condition`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConditionDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_type: Option<MatchType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default)]
    pub hostname_match: MatchMode,
    #[serde(default)]
    pub hostname_match_negate: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default)]
    pub tag_match: MatchMode,
    #[serde(default)]
    pub tag_match_negate: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub value_match: MatchMode,
    #[serde(default)]
    pub value_match_negate: bool,
}

impl TryFrom<ConditionDefinition> for Condition {
    type Error = String;

    fn try_from(def: ConditionDefinition) -> std::result::Result<Self, Self::Error> {
        let match_type = match def.match_type {
            Some(kind) => kind,
            None if def.hostname.is_some() => MatchType::Host,
            None if def.tag.is_some() => MatchType::Tag,
            None => return Err("condition needs a match_type, hostname or tag".to_string()),
        };

        match match_type {
            MatchType::Host => {
                let hostname = def
                    .hostname
                    .ok_or_else(|| "hostname condition is missing 'hostname'".to_string())?;
                Ok(Self::Hostname(Pattern {
                    pattern: hostname,
                    mode: def.hostname_match,
                    negate: def.hostname_match_negate,
                }))
            }
            MatchType::Tag => {
                let tag = def
                    .tag
                    .ok_or_else(|| "label condition is missing 'tag'".to_string())?;
                let value = def
                    .value
                    .ok_or_else(|| format!("label condition on '{tag}' is missing 'value'"))?;
                Ok(Self::Label {
                    tag: Pattern {
                        pattern: tag,
                        mode: def.tag_match,
                        negate: def.tag_match_negate,
                    },
                    value: Pattern {
                        pattern: value,
                        mode: def.value_match,
                        negate: def.value_match_negate,
                    },
                })
            }
        }
    }
}

impl From<Condition> for ConditionDefinition {
    fn from(condition: Condition) -> Self {
        match condition {
            Condition::Hostname(p) => Self {
                match_type: Some(MatchType::Host),
                hostname: Some(p.pattern),
                hostname_match: p.mode,
                hostname_match_negate: p.negate,
                ..Self::default()
            },
            Condition::Label { tag, value } => Self {
                match_type: Some(MatchType::Tag),
                tag: Some(tag.pattern),
                tag_match: tag.mode,
                tag_match_negate: tag.negate,
                value: Some(value.pattern),
                value_match: value.mode,
                value_match_negate: value.negate,
                ..Self::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_hostname_condition_ignores_case() {
        let cond = Condition::hostname(Pattern::equal("Web1"));
        assert!(cond.matches("WEB1", &Labels::new()));
        assert!(!cond.matches("web2", &Labels::new()));
    }

    #[test]
    fn test_label_condition_needs_key_and_value_on_same_label() {
        let cond = Condition::label(Pattern::equal("os"), Pattern::equal("linux"));
        assert!(cond.matches("h", &labels(&[("os", "Linux")])));
        assert!(!cond.matches("h", &labels(&[("os", "windows"), ("distro", "linux")])));
    }

    #[test]
    fn test_label_condition_or_across_labels() {
        let cond = Condition::label(
            Pattern::new("env", MatchMode::StartsWith),
            Pattern::new("prod", MatchMode::Contains),
        );
        let host_labels = labels(&[("env_a", "test"), ("env_b", "production")]);
        assert!(cond.matches("h", &host_labels));
    }

    #[test]
    fn test_label_keys_compare_case_sensitively() {
        let cond = Condition::label(Pattern::equal("OS"), Pattern::equal("linux"));
        assert!(!cond.matches("h", &labels(&[("os", "linux")])));
    }

    #[test]
    fn test_deserialize_flat_definition() {
        let cond: Condition = serde_json::from_value(json!({
            "match_type": "tag",
            "tag": "env",
            "value": "prod",
            "value_match": "in",
            "value_match_negate": true,
        }))
        .unwrap();

        assert_eq!(
            cond,
            Condition::label(
                Pattern::equal("env"),
                Pattern::new("prod", MatchMode::Contains).negated()
            )
        );
    }

    #[test]
    fn test_match_type_is_inferred() {
        let cond: Condition =
            serde_json::from_value(json!({ "hostname": "web", "hostname_match": "swith" })).unwrap();
        assert_eq!(
            cond,
            Condition::hostname(Pattern::new("web", MatchMode::StartsWith))
        );
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let err = serde_json::from_value::<Condition>(json!({ "match_type": "tag", "tag": "os" }))
            .unwrap_err();
        assert!(err.to_string().contains("missing 'value'"));

        assert!(serde_json::from_value::<Condition>(json!({ "value": "x" })).is_err());
    }

    #[test]
    fn test_serializes_back_to_flat_form() {
        let cond = Condition::hostname(Pattern::equal("web1"));
        let value = serde_json::to_value(&cond).unwrap();
        assert_eq!(value["match_type"], json!("host"));
        assert_eq!(value["hostname"], json!("web1"));
        let back: Condition = serde_json::from_value(value).unwrap();
        assert_eq!(back, cond);
    }
}
