//! Outcomes of construct rules
//!
//! Construct rules share the condition machinery of action rules but emit
//! templated constructs for a target. Every string parameter except the tag
//! group's title and topic is rendered against the host's attributes.
//!
//! ```toml
//! [[rule]]
//! name = "linux groups"
//! condition_mode = "anyway"
//!
//! [[rule.outcomes]]
//! type = "group"
//! target = "host_groups"
//! name = "{{ os }}"
//! ```

use serde::{Deserialize, Serialize};

use crate::descriptor::ConstructKind;

/// Construct emitted for each host a construct rule hits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConstructOutcome {
    /// Named group, e.g. a host or contact group
    Group {
        target: String,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },

    /// One tag of a tag group; tags of all hosts aggregate into one payload
    TagGroup {
        target: String,
        group_id: String,
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        topic: Option<String>,
        tag_id: String,
        tag_title: String,
    },

    /// Monitoring rule placed in a folder
    Rule {
        target: String,
        #[serde(default = "root_folder")]
        folder: String,
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
        /// Renders to `key:value`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition_label: Option<String>,
        /// Renders to a comma separated host list
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition_host: Option<String>,
    },

    /// Complete JSON document carrying a string `id`
    Payload { target: String, template: String },
}

fn root_folder() -> String {
    "/".to_string()
}

impl ConstructOutcome {
    pub fn target(&self) -> &str {
        match self {
            Self::Group { target, .. }
            | Self::TagGroup { target, .. }
            | Self::Rule { target, .. }
            | Self::Payload { target, .. } => target.as_str(),
        }
    }

    /// Kind of target this outcome can be delivered to
    pub fn expected_kind(&self) -> ConstructKind {
        match self {
            Self::Group { .. } => ConstructKind::Named,
            Self::TagGroup { .. } | Self::Payload { .. } => ConstructKind::Keyed,
            Self::Rule { .. } => ConstructKind::ContentAddressed,
        }
    }
}
