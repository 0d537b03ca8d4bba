//! Desired state: every construct the current hosts and rules call for
//!
//! The builder walks hosts in the order given (the host store yields them
//! sorted by hostname), so identical inputs produce identical output.

use std::collections::BTreeMap;

use cmdb_hosts::Host;
use cmdb_rules::{RuleEngine, RuleSet, normalize_folder};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::attributes::{AttributeResolver, EXPORT_PURPOSE};
use crate::constructs::ConstructOutcome;
use crate::descriptor::{ConstructDescriptor, Target};
use crate::template::{TemplateRenderer, TemplateVars, sanitize_identifier};

/// Template variable holding the hostname
pub const HOSTNAME_VAR: &str = "HOSTNAME";

/// A construct that could not be built for a host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildProblem {
    pub hostname: String,
    pub target: String,
    pub message: String,
}

impl std::fmt::Display for BuildProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.hostname, self.target, self.message)
    }
}

/// Constructs per target, de-duplicated in first-seen order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesiredState {
    pub groups: BTreeMap<String, Vec<ConstructDescriptor>>,
    pub problems: Vec<BuildProblem>,
    /// Hosts excluded by the attribute resolver or an `ignore` outcome
    pub skipped: Vec<String>,
}

impl DesiredState {
    pub fn entries(&self, target: &str) -> &[ConstructDescriptor] {
        self.groups.get(target).map(Vec::as_slice).unwrap_or(&[])
    }

    fn push(&mut self, target: &str, descriptor: ConstructDescriptor) {
        let list = self.groups.entry(target.to_string()).or_default();
        if !list.contains(&descriptor) {
            list.push(descriptor);
        }
    }
}

#[derive(Debug)]
struct TagGroupEntry {
    title: String,
    topic: Option<String>,
    /// ident -> title, first title wins
    tags: BTreeMap<String, String>,
}

impl TagGroupEntry {
    fn into_descriptor(self, group_id: String) -> ConstructDescriptor {
        let mut tags: Vec<(String, String)> = self.tags.into_iter().collect();
        tags.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        let tags: Vec<Value> = tags
            .into_iter()
            .map(|(ident, title)| json!({ "ident": ident, "title": title }))
            .collect();

        let mut payload = json!({ "id": group_id.clone(), "title": self.title, "tags": tags });
        if let Some(topic) = self.topic {
            payload["topic"] = Value::String(topic);
        }
        ConstructDescriptor::keyed(group_id, payload)
    }
}

/// Folder path plus every ancestor, outermost first
fn folder_descriptors(path: &str) -> Vec<ConstructDescriptor> {
    let mut current = String::new();
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            current.push('/');
            current.push_str(segment);
            ConstructDescriptor::named(current.clone(), segment)
        })
        .collect()
}

/// Turns hosts into per-target construct lists
pub struct DesiredStateBuilder<'a> {
    targets: &'a [Target],
    folder_target: Option<&'a str>,
    actions: &'a RuleEngine,
    constructs: &'a RuleSet<ConstructOutcome>,
    resolver: &'a dyn AttributeResolver,
    renderer: &'a dyn TemplateRenderer,
}

impl<'a> DesiredStateBuilder<'a> {
    pub fn new(
        targets: &'a [Target],
        actions: &'a RuleEngine,
        constructs: &'a RuleSet<ConstructOutcome>,
        resolver: &'a dyn AttributeResolver,
        renderer: &'a dyn TemplateRenderer,
    ) -> Self {
        Self {
            targets,
            folder_target: None,
            actions,
            constructs,
            resolver,
            renderer,
        }
    }

    /// Emit folder constructs from action outcomes into this target
    pub fn with_folder_target(mut self, target: Option<&'a str>) -> Self {
        self.folder_target = target;
        self
    }

    /// Build the desired state of every configured target
    ///
    /// Hosts are mutable only so derived values can be memoised in their
    /// caches. Every configured target gets an entry, empty if nothing
    /// wants it.
    pub fn build(&self, hosts: &mut [Host]) -> DesiredState {
        let mut state = DesiredState::default();
        for target in self.targets {
            state.groups.insert(target.name.clone(), Vec::new());
        }
        let mut tag_groups: BTreeMap<(String, String), TagGroupEntry> = BTreeMap::new();

        for host in hosts.iter_mut() {
            let Some(attributes) = self.resolver.resolve(host, EXPORT_PURPOSE) else {
                state.skipped.push(host.hostname().to_string());
                continue;
            };
            let hostname = host.hostname().to_string();

            // Rules see labels, inventory and computed attributes alike
            let outcome = self.actions.evaluate(&hostname, &attributes.all);
            if outcome.ignore {
                tracing::debug!(hostname = %hostname, "Host ignored by action rules");
                state.skipped.push(hostname);
                continue;
            }

            if let Some(folder_target) = self.folder_target {
                let folder = host
                    .folder()
                    .map(normalize_folder)
                    .filter(|f| !f.is_empty())
                    .or(outcome.move_folder);
                if let Some(folder) = folder {
                    for descriptor in folder_descriptors(&folder) {
                        state.push(folder_target, descriptor);
                    }
                }
            }

            let hits = self.constructs.matching(&hostname, &attributes.all);
            let mut vars: TemplateVars = attributes.all;
            vars.insert(HOSTNAME_VAR.to_string(), hostname.clone());

            for rule in hits {
                for construct in &rule.outcomes {
                    if let Err(message) =
                        self.apply(host, construct, &vars, &mut state, &mut tag_groups)
                    {
                        tracing::warn!(
                            hostname = %hostname,
                            rule = %rule.name,
                            target_name = construct.target(),
                            %message,
                            "Construct skipped"
                        );
                        state.problems.push(BuildProblem {
                            hostname: hostname.clone(),
                            target: construct.target().to_string(),
                            message,
                        });
                    }
                }
            }
        }

        for ((target, group_id), entry) in tag_groups {
            state.push(&target, entry.into_descriptor(group_id));
        }

        tracing::debug!(
            targets = state.groups.len(),
            skipped = state.skipped.len(),
            problems = state.problems.len(),
            "Desired state built"
        );
        state
    }

    fn target(&self, construct: &ConstructOutcome) -> Result<&'a Target, String> {
        let name = construct.target();
        let target = self
            .targets
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| format!("unknown target '{name}'"))?;
        if target.kind != construct.expected_kind() {
            return Err(format!(
                "target '{name}' holds {:?} constructs, not {:?}",
                target.kind,
                construct.expected_kind()
            ));
        }
        Ok(target)
    }

    fn render(&self, template: &str, vars: &TemplateVars) -> Result<String, String> {
        self.renderer
            .render(template, vars)
            .map_err(|e| e.to_string())
    }

    fn apply(
        &self,
        host: &mut Host,
        construct: &ConstructOutcome,
        vars: &TemplateVars,
        state: &mut DesiredState,
        tag_groups: &mut BTreeMap<(String, String), TagGroupEntry>,
    ) -> Result<(), String> {
        let target = self.target(construct)?;

        match construct {
            ConstructOutcome::Group { name, title, .. } => {
                let name = sanitize_identifier(&self.render(name, vars)?);
                if name.is_empty() {
                    return Ok(());
                }
                let title = match title {
                    Some(title) => sanitize_identifier(&self.render(title, vars)?),
                    None => String::new(),
                };
                let title = if title.is_empty() { name.clone() } else { title };
                state.push(&target.name, ConstructDescriptor::named(name, title));
            }

            ConstructOutcome::TagGroup {
                group_id,
                title,
                topic,
                tag_id,
                tag_title,
                ..
            } => {
                let key = format!("tag_group:{group_id}");
                let tag = host.cache_mut().get_or_compute(
                    &key,
                    || -> Result<Option<(String, String)>, String> {
                        let ident = sanitize_identifier(&self.render(tag_id, vars)?);
                        if ident.is_empty() {
                            return Ok(None);
                        }
                        Ok(Some((ident, self.render(tag_title, vars)?)))
                    },
                )?;
                let Some((ident, tag_title)) = tag else {
                    return Ok(());
                };

                let entry = tag_groups
                    .entry((target.name.clone(), group_id.clone()))
                    .or_insert_with(|| TagGroupEntry {
                        title: title.clone(),
                        topic: topic.clone(),
                        tags: BTreeMap::new(),
                    });
                entry.tags.entry(ident).or_insert(tag_title);
            }

            ConstructOutcome::Rule {
                folder,
                value,
                comment,
                condition_label,
                condition_host,
                ..
            } => {
                let mut conditions = json!({ "host_tags": [], "service_labels": [] });

                if let Some(label) = condition_label {
                    let rendered = self.render(label, vars)?;
                    match rendered.split_once(':') {
                        Some((key, label_value))
                            if !key.trim().is_empty() && !label_value.trim().is_empty() =>
                        {
                            conditions["host_labels"] = json!([{
                                "key": key.trim(),
                                "operator": "is",
                                "value": label_value.trim(),
                            }]);
                        }
                        _ => {
                            tracing::debug!(%rendered, "Label condition incomplete, rule not emitted");
                            return Ok(());
                        }
                    }
                }

                if let Some(hosts) = condition_host {
                    let rendered = self.render(hosts, vars)?;
                    let names: Vec<&str> = rendered
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .collect();
                    if names.is_empty() {
                        tracing::debug!("Host condition empty, rule not emitted");
                        return Ok(());
                    }
                    conditions["host_name"] = json!({ "match_on": names, "operator": "one_of" });
                }

                let folder = normalize_folder(&self.render(folder, vars)?);
                let folder = if folder.is_empty() { "/".to_string() } else { folder };
                let comment = match comment {
                    Some(comment) => self.render(comment, vars)?,
                    None => String::new(),
                };
                let payload = json!({
                    "folder": folder,
                    "value_raw": self.render(value, vars)?,
                    "comment": comment,
                    "conditions": conditions,
                });
                state.push(&target.name, ConstructDescriptor::content_addressed(payload));
            }

            ConstructOutcome::Payload { template, .. } => {
                let rendered = self.render(template, vars)?;
                let document: Value = serde_json::from_str(&rendered)
                    .map_err(|e| format!("rendered payload is not valid JSON: {e}"))?;
                let id = document
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or("rendered payload has no string 'id'")?
                    .to_string();
                state.push(&target.name, ConstructDescriptor::keyed(id, document));
            }
        }
        Ok(())
    }
}
