//! Action outcomes and their accumulation into a per-host result

use serde::{Deserialize, Serialize};

use crate::Labels;

/// Normalise a folder path segment
///
/// The result is lower-case, starts with exactly one `/` and never ends
/// with `/`. A path with no content (`""`, `"/"`) normalises to the empty
/// string, which contributes nothing when appended.
pub fn normalize_folder(path: &str) -> String {
    let lowered = path.to_lowercase();
    let body = lowered.trim_matches(|c: char| c == '/' || c.is_whitespace());
    if body.is_empty() {
        String::new()
    } else {
        format!("/{body}")
    }
}

/// Outcome attached to an action rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "OutcomeDefinition", into = "OutcomeDefinition")]
pub enum ActionOutcome {
    /// Append a fixed folder segment
    MoveFolder(String),
    /// Append the value of the named label
    ValueAsFolder(String),
    /// Append the key of the first label carrying this value
    TagAsFolder(String),
    /// Prepend the label key itself when the host carries it
    TagAsSourceFolder(String),
    /// Prepend a fixed folder segment
    SourceFolder(String),
    /// Do not export the host
    Ignore,
    /// Passed through to folder pool allocation
    FolderPool(String),
    /// Export the named host attribute
    Attribute(String),
    /// Set a custom attribute to a value
    CustomAttribute { name: String, value: String },
    /// Remove the named attribute from the target
    RemoveAttribute(String),
}

/// Flat, serialisable form of an [`ActionOutcome`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutcomeDefinition {
    #[serde(rename = "type", alias = "action")]
    pub kind: String,
    #[serde(default, alias = "action_param", skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl TryFrom<OutcomeDefinition> for ActionOutcome {
    type Error = String;

    fn try_from(def: OutcomeDefinition) -> std::result::Result<Self, Self::Error> {
        let kind = def.kind.as_str();
        let param = || {
            def.param
                .clone()
                .ok_or_else(|| format!("outcome '{kind}' requires 'param'"))
        };
        Ok(match kind {
            "move_folder" => Self::MoveFolder(param()?),
            "value_as_folder" => Self::ValueAsFolder(param()?),
            "tag_as_folder" => Self::TagAsFolder(param()?),
            "tag_as_source_folder" => Self::TagAsSourceFolder(param()?),
            "source_folder" => Self::SourceFolder(param()?),
            "ignore" => Self::Ignore,
            "folder_pool" => Self::FolderPool(def.param.clone().unwrap_or_default()),
            "attribute" => Self::Attribute(param()?),
            "remove_attribute" => Self::RemoveAttribute(param()?),
            "custom_attribute" => {
                let name = def
                    .name
                    .clone()
                    .or_else(|| def.param.clone())
                    .ok_or_else(|| "outcome 'custom_attribute' requires 'name'".to_string())?;
                Self::CustomAttribute {
                    name,
                    value: def.value.clone().unwrap_or_default(),
                }
            }
            other => return Err(format!("unknown outcome type '{other}'")),
        })
    }
}

impl From<ActionOutcome> for OutcomeDefinition {
    fn from(outcome: ActionOutcome) -> Self {
        let with_param = |kind: &str, param: String| Self {
            kind: kind.to_string(),
            param: Some(param),
            ..Self::default()
        };
        match outcome {
            ActionOutcome::MoveFolder(p) => with_param("move_folder", p),
            ActionOutcome::ValueAsFolder(p) => with_param("value_as_folder", p),
            ActionOutcome::TagAsFolder(p) => with_param("tag_as_folder", p),
            ActionOutcome::TagAsSourceFolder(p) => with_param("tag_as_source_folder", p),
            ActionOutcome::SourceFolder(p) => with_param("source_folder", p),
            ActionOutcome::Ignore => Self {
                kind: "ignore".to_string(),
                ..Self::default()
            },
            ActionOutcome::FolderPool(p) => with_param("folder_pool", p),
            ActionOutcome::Attribute(p) => with_param("attribute", p),
            ActionOutcome::RemoveAttribute(p) => with_param("remove_attribute", p),
            ActionOutcome::CustomAttribute { name, value } => Self {
                kind: "custom_attribute".to_string(),
                name: Some(name),
                value: Some(value),
                ..Self::default()
            },
        }
    }
}

/// Everything rule evaluation decided for one host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedOutcomeSet {
    /// Accumulated folder path; absent when no rule contributed a segment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub move_folder: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ignore: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_pool: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_attributes: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove_attributes: Vec<String>,
}

impl ResolvedOutcomeSet {
    /// True when no rule contributed anything
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Folds outcomes of hitting rules, one merge operation per outcome kind
///
/// Folder segments compose in evaluation order: appends go to the end,
/// source segments go to the front of everything accumulated so far.
/// `ignore` and `folder_pool` keep the first value written.
#[derive(Debug, Clone, Default)]
pub struct OutcomeAccumulator {
    folder: String,
    ignore: bool,
    folder_pool: Option<String>,
    attributes: Vec<String>,
    custom_attributes: Vec<(String, String)>,
    remove_attributes: Vec<String>,
}

impl OutcomeAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current folder path, possibly empty
    pub fn folder(&self) -> &str {
        &self.folder
    }

    pub fn append_folder(&mut self, segment: &str) {
        self.folder.push_str(&normalize_folder(segment));
    }

    pub fn prepend_folder(&mut self, segment: &str) {
        self.folder.insert_str(0, &normalize_folder(segment));
    }

    pub fn set_ignore(&mut self) {
        self.ignore = true;
    }

    /// Keeps the first pool id, later ones are dropped
    pub fn set_folder_pool(&mut self, pool: &str) {
        if self.folder_pool.is_none() {
            self.folder_pool = Some(pool.to_string());
        }
    }

    pub fn add_attribute(&mut self, name: &str) {
        push_unique(&mut self.attributes, name);
    }

    /// Keeps the first value per attribute name
    pub fn add_custom_attribute(&mut self, name: &str, value: &str) {
        if !self.custom_attributes.iter().any(|(n, _)| n == name) {
            self.custom_attributes
                .push((name.to_string(), value.to_string()));
        }
    }

    pub fn remove_attribute(&mut self, name: &str) {
        push_unique(&mut self.remove_attributes, name);
    }

    /// Merge one outcome, resolving label lookups against `labels`
    pub fn apply(&mut self, outcome: &ActionOutcome, labels: &Labels) {
        match outcome {
            ActionOutcome::MoveFolder(path) => self.append_folder(path),
            ActionOutcome::ValueAsFolder(tag) => {
                if let Some(value) = labels.get(tag) {
                    self.append_folder(value);
                }
            }
            ActionOutcome::TagAsFolder(wanted) => {
                if let Some((key, _)) = labels.iter().find(|(_, v)| *v == wanted) {
                    self.append_folder(key);
                }
            }
            ActionOutcome::TagAsSourceFolder(tag) => {
                if let Some((key, _)) = labels.get_key_value(tag) {
                    self.prepend_folder(key);
                }
            }
            ActionOutcome::SourceFolder(path) => self.prepend_folder(path),
            ActionOutcome::Ignore => self.set_ignore(),
            ActionOutcome::FolderPool(pool) => self.set_folder_pool(pool),
            ActionOutcome::Attribute(name) => self.add_attribute(name),
            ActionOutcome::CustomAttribute { name, value } => {
                self.add_custom_attribute(name, value)
            }
            ActionOutcome::RemoveAttribute(name) => self.remove_attribute(name),
        }
    }

    pub fn finish(self) -> ResolvedOutcomeSet {
        ResolvedOutcomeSet {
            move_folder: (!self.folder.is_empty()).then_some(self.folder),
            ignore: self.ignore,
            folder_pool: self.folder_pool,
            attributes: self.attributes,
            custom_attributes: self.custom_attributes,
            remove_attributes: self.remove_attributes,
        }
    }
}

fn push_unique(list: &mut Vec<String>, item: &str) {
    if !list.iter().any(|existing| existing == item) {
        list.push(item.to_string());
    }
}
