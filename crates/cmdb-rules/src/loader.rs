//! Loading rule sets from TOML, JSON or YAML documents
//!
//! Accepted layouts are a top-level list of rules, or a table whose `rule`
//! (or `rules`) key holds the list:
//!
//! ```toml
//! [[rule]]
//! name = "linux hosts"
//! condition_mode = "all"
//! conditions = [{ match_type = "tag", tag = "os", value = "linux" }]
//! outcomes = [{ type = "move_folder", param = "/linux" }]
//! ```

use std::path::Path;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::rule::RuleSet;

/// Document format of a rule file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleFormat {
    Toml,
    Json,
    Yaml,
}

impl RuleFormat {
    /// Detect the format from the file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_lowercase();
        match extension.as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }

    /// Parse `content` into a generic document
    pub fn parse(self, content: &str) -> std::result::Result<Value, String> {
        match self {
            Self::Toml => {
                let doc: toml::Value = toml::from_str(content).map_err(|e| e.to_string())?;
                serde_json::to_value(doc).map_err(|e| e.to_string())
            }
            Self::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
            Self::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
        }
    }
}

/// Pull the rule list out of a parsed document
fn rule_values(document: Value) -> Result<Vec<Value>> {
    match document {
        Value::Array(rules) => Ok(rules),
        Value::Object(mut table) => match table.remove("rule").or_else(|| table.remove("rules")) {
            Some(Value::Array(rules)) => Ok(rules),
            Some(_) => Err(Error::InvalidDocument {
                message: "'rule' must be a list".to_string(),
            }),
            None => Ok(Vec::new()),
        },
        Value::Null => Ok(Vec::new()),
        _ => Err(Error::InvalidDocument {
            message: "expected a list of rules or a table with a 'rule' list".to_string(),
        }),
    }
}

impl<O: DeserializeOwned> RuleSet<O> {
    /// Parse a rule document in the given format
    pub fn parse(content: &str, format: RuleFormat) -> Result<Self> {
        let document = format
            .parse(content)
            .map_err(|message| Error::InvalidDocument { message })?;
        Ok(Self::from_values(rule_values(document)?))
    }

    /// Load a rule file, detecting its format from the extension
    ///
    /// Unreadable or unparsable files are errors. Individual malformed
    /// rules are not; see [`RuleSet::rejected`].
    pub fn load(path: &Path) -> Result<Self> {
        let format = RuleFormat::from_path(path).ok_or_else(|| Error::UnsupportedFormat {
            path: path.to_path_buf(),
        })?;
        let content = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let document = format.parse(&content).map_err(|message| Error::Parse {
            path: path.to_path_buf(),
            message,
        })?;

        let set = Self::from_values(rule_values(document)?);
        tracing::debug!(
            path = %path.display(),
            loaded = set.len(),
            rejected = set.rejected().len(),
            "Loaded rule file"
        );
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::ActionOutcome;
    use rstest::rstest;
    use std::path::PathBuf;

    #[rstest]
    #[case("rules.toml", Some(RuleFormat::Toml))]
    #[case("rules.JSON", Some(RuleFormat::Json))]
    #[case("rules.yml", Some(RuleFormat::Yaml))]
    #[case("rules.yaml", Some(RuleFormat::Yaml))]
    #[case("rules.ini", None)]
    #[case("rules", None)]
    fn test_format_from_path(#[case] path: &str, #[case] expected: Option<RuleFormat>) {
        assert_eq!(RuleFormat::from_path(&PathBuf::from(path)), expected);
    }

    #[test]
    fn test_parse_yaml_list() {
        let yaml = r#"
- name: web
  condition_mode: any
  conditions:
    - match_type: host
      hostname: web
      hostname_match: swith
  outcomes:
    - type: move_folder
      param: /web
"#;
        let set: RuleSet<ActionOutcome> = RuleSet::parse(yaml, RuleFormat::Yaml).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(
            set.rules()[0].outcomes,
            vec![ActionOutcome::MoveFolder("/web".into())]
        );
    }

    #[test]
    fn test_parse_json_table() {
        let json = r#"{ "rules": [ { "name": "all", "condition_mode": "anyway" } ] }"#;
        let set: RuleSet<ActionOutcome> = RuleSet::parse(json, RuleFormat::Json).unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_scalar_document_is_invalid() {
        let result = RuleSet::<ActionOutcome>::parse("42", RuleFormat::Json);
        assert!(matches!(result, Err(Error::InvalidDocument { .. })));
    }
}
