//! Reconciliation of desired state against a live target
//!
//! Live entries are classified against the cached snapshot of the previous
//! run:
//!
//! - **synced**: same id and content as the cached entry
//! - **stale**: cached id, but the content drifted, usually because an
//!   operator edited it remotely
//! - **external**: never pushed by this account
//!
//! Only synced entries are deleted once no longer desired. Stale and
//! external entries are updated when desired state claims their id and are
//! otherwise left alone.
//!
//! Creates go out in one batch, then updates in one batch, then deletes one
//! call at a time.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::descriptor::{ConstructDescriptor, LiveEntry, Target};
use crate::gateway::{ApiGateway, BatchOutcome, GatewayError};

/// Relation of a live entry to the cached snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryClass {
    Synced,
    Stale,
    External,
}

/// Classify one live entry against the cached snapshot
pub fn classify(entry: &LiveEntry, cached: &BTreeMap<&str, &ConstructDescriptor>) -> EntryClass {
    match cached.get(entry.id()) {
        Some(previous) if **previous == entry.descriptor => EntryClass::Synced,
        Some(_) => EntryClass::Stale,
        None => EntryClass::External,
    }
}

/// Operations needed to move a target to its desired state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    /// Desired entries with duplicate ids removed, in order
    pub desired: Vec<ConstructDescriptor>,
    pub create: Vec<ConstructDescriptor>,
    /// Remote id plus the desired entry replacing it
    pub update: Vec<(String, ConstructDescriptor)>,
    /// Previously synced entries no longer desired
    pub delete: Vec<LiveEntry>,
    /// Desired ids already live with identical content
    pub unchanged: Vec<String>,
    /// External entries left untouched
    pub external: Vec<String>,
}

impl ReconcilePlan {
    /// True when no mutating call is needed
    pub fn is_noop(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }
}

fn index_by_id(entries: &[ConstructDescriptor]) -> BTreeMap<&str, &ConstructDescriptor> {
    let mut index = BTreeMap::new();
    for entry in entries {
        index.entry(entry.id()).or_insert(entry);
    }
    index
}

/// Diff desired state against live state
///
/// Pure: no gateway calls. When the desired list repeats an id, the first
/// entry wins.
pub fn plan(
    desired: &[ConstructDescriptor],
    cached: &[ConstructDescriptor],
    live: &[LiveEntry],
) -> ReconcilePlan {
    let cached_by_id = index_by_id(cached);
    let mut live_by_id: BTreeMap<&str, &LiveEntry> = BTreeMap::new();
    for entry in live {
        live_by_id.entry(entry.id()).or_insert(entry);
    }

    let mut plan = ReconcilePlan::default();
    let mut desired_ids = BTreeSet::new();

    for descriptor in desired {
        let id = descriptor.id();
        if !desired_ids.insert(id) {
            tracing::warn!(id, "Duplicate desired id, keeping the first entry");
            continue;
        }
        plan.desired.push(descriptor.clone());

        match live_by_id.get(id) {
            None => plan.create.push(descriptor.clone()),
            Some(entry) if entry.descriptor == *descriptor => plan.unchanged.push(id.to_string()),
            Some(entry) => plan
                .update
                .push((entry.remote_id.clone(), descriptor.clone())),
        }
    }

    for (id, entry) in &live_by_id {
        if desired_ids.contains(id) {
            continue;
        }
        match classify(entry, &cached_by_id) {
            EntryClass::Synced => plan.delete.push((*entry).clone()),
            EntryClass::Stale | EntryClass::External => plan.external.push(id.to_string()),
        }
    }

    plan
}

/// Outcome of a reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassStatus {
    /// Every planned call succeeded
    Synced,
    /// Some items failed; the snapshot reflects only what succeeded
    Partial,
    /// The pass stopped early and the snapshot was not advanced
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageLevel {
    Info,
    Warn,
    Error,
}

/// One line of the audit trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMessage {
    pub level: MessageLevel,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl Action {
    fn verb(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    fn past(self) -> &'static str {
        match self {
            Self::Create => "Created",
            Self::Update => "Updated",
            Self::Delete => "Deleted",
        }
    }
}

/// An item the target refused or could not process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub id: String,
    pub action: Action,
    pub error: String,
}

/// Report from one reconciliation pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub target: String,
    pub dry_run: bool,
    pub status: PassStatus,
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub deleted: Vec<String>,
    pub unchanged: Vec<String>,
    /// External entries left alone
    pub external: Vec<String>,
    pub failures: Vec<ItemFailure>,
    pub messages: Vec<ReportMessage>,
    /// Snapshot to persist; `None` after a dry run or an aborted pass
    #[serde(skip)]
    pub next_snapshot: Option<Vec<ConstructDescriptor>>,
}

impl ReconcileReport {
    pub fn new(target: &str, dry_run: bool) -> Self {
        Self {
            target: target.to_string(),
            dry_run,
            status: PassStatus::Synced,
            created: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
            unchanged: Vec::new(),
            external: Vec::new(),
            failures: Vec::new(),
            messages: Vec::new(),
            next_snapshot: None,
        }
    }

    /// Report of a pass that could not run at all
    pub fn aborted(target: &str, dry_run: bool, reason: impl Into<String>) -> Self {
        let mut report = Self::new(target, dry_run);
        report.abort(reason.into());
        report
    }

    /// True when the pass made or planned no change
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    pub fn push_message(&mut self, level: MessageLevel, text: impl Into<String>) {
        self.messages.push(ReportMessage {
            level,
            text: text.into(),
        });
    }

    fn abort(&mut self, reason: String) {
        tracing::error!(target_name = %self.target, %reason, "Reconciliation pass aborted");
        self.status = PassStatus::Aborted;
        self.next_snapshot = None;
        self.push_message(MessageLevel::Error, format!("Aborted {}: {reason}", self.target));
    }

    fn succeed(&mut self, action: Action, id: &str) {
        tracing::info!(target_name = %self.target, id, action = action.verb(), "Applied change");
        self.push_message(
            MessageLevel::Info,
            format!("{} '{id}' in {}", action.past(), self.target),
        );
        match action {
            Action::Create => self.created.push(id.to_string()),
            Action::Update => self.updated.push(id.to_string()),
            Action::Delete => self.deleted.push(id.to_string()),
        }
    }

    fn intend(&mut self, action: Action, id: &str) {
        self.push_message(
            MessageLevel::Info,
            format!("[dry-run] Would {} '{id}' in {}", action.verb(), self.target),
        );
        match action {
            Action::Create => self.created.push(id.to_string()),
            Action::Update => self.updated.push(id.to_string()),
            Action::Delete => self.deleted.push(id.to_string()),
        }
    }

    fn fail(&mut self, action: Action, id: &str, error: &GatewayError) {
        tracing::warn!(target_name = %self.target, id, action = action.verb(), %error, "Change failed");
        self.push_message(
            MessageLevel::Warn,
            format!("Failed to {} '{id}' in {}: {error}", action.verb(), self.target),
        );
        self.failures.push(ItemFailure {
            id: id.to_string(),
            action,
            error: error.to_string(),
        });
    }
}

/// Drives a target towards desired state through its gateway
pub struct ReconciliationEngine<'a> {
    gateway: &'a dyn ApiGateway,
    dry_run: bool,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(gateway: &'a dyn ApiGateway) -> Self {
        Self {
            gateway,
            dry_run: false,
        }
    }

    /// Classify and report without mutating calls or a new snapshot
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Fetch live state, then reconcile against it
    ///
    /// A failed fetch aborts the pass whatever its class.
    pub fn reconcile(
        &self,
        target: &Target,
        desired: &[ConstructDescriptor],
        cached: &[ConstructDescriptor],
    ) -> ReconcileReport {
        let records = match self.gateway.fetch(target) {
            Ok(records) => records,
            Err(e) => {
                return ReconcileReport::aborted(
                    &target.name,
                    self.dry_run,
                    format!("failed to fetch live state: {e}"),
                );
            }
        };
        let live: Vec<LiveEntry> = records
            .into_iter()
            .map(|record| LiveEntry::from_record(target.kind, record))
            .collect();
        tracing::debug!(target_name = %target, live = live.len(), "Fetched live state");

        self.reconcile_live(target, desired, cached, &live)
    }

    /// Reconcile against an already fetched live state
    pub fn reconcile_live(
        &self,
        target: &Target,
        desired: &[ConstructDescriptor],
        cached: &[ConstructDescriptor],
        live: &[LiveEntry],
    ) -> ReconcileReport {
        let plan = plan(desired, cached, live);
        let mut report = ReconcileReport::new(&target.name, self.dry_run);
        report.unchanged = plan.unchanged.clone();
        report.external = plan.external.clone();

        if self.dry_run {
            for descriptor in &plan.create {
                report.intend(Action::Create, descriptor.id());
            }
            for (_, descriptor) in &plan.update {
                report.intend(Action::Update, descriptor.id());
            }
            for entry in &plan.delete {
                report.intend(Action::Delete, entry.id());
            }
            return report;
        }

        let failed_creates = if plan.create.is_empty() {
            BTreeSet::new()
        } else {
            let payloads: Vec<Value> = plan
                .create
                .iter()
                .map(ConstructDescriptor::create_payload)
                .collect();
            let ids: Vec<&str> = plan.create.iter().map(ConstructDescriptor::id).collect();
            let result = self.gateway.create_batch(target, &payloads);
            match record_batch(&mut report, Action::Create, &ids, result) {
                Ok(failed) => failed,
                Err(e) => {
                    report.abort(e.to_string());
                    return report;
                }
            }
        };

        let failed_updates = if plan.update.is_empty() {
            BTreeSet::new()
        } else {
            let items: Vec<(String, Value)> = plan
                .update
                .iter()
                .map(|(remote_id, d)| (remote_id.clone(), d.update_payload()))
                .collect();
            let ids: Vec<&str> = plan.update.iter().map(|(_, d)| d.id()).collect();
            let result = self.gateway.update_batch(target, &items);
            match record_batch(&mut report, Action::Update, &ids, result) {
                Ok(failed) => failed,
                Err(e) => {
                    report.abort(e.to_string());
                    return report;
                }
            }
        };

        let mut failed_deletes = BTreeSet::new();
        for entry in &plan.delete {
            match self.gateway.delete(target, &entry.remote_id) {
                Ok(()) => report.succeed(Action::Delete, entry.id()),
                Err(e) if e.is_fatal() => {
                    report.fail(Action::Delete, entry.id(), &e);
                    report.abort(e.to_string());
                    return report;
                }
                Err(e) => {
                    report.fail(Action::Delete, entry.id(), &e);
                    failed_deletes.insert(entry.id().to_string());
                }
            }
        }

        // Only what the target accepted becomes the next snapshot
        let cached_by_id = index_by_id(cached);
        let mut next = Vec::with_capacity(plan.desired.len());
        for descriptor in &plan.desired {
            let id = descriptor.id();
            if failed_creates.contains(id) {
                continue;
            }
            if failed_updates.contains(id) {
                if let Some(previous) = cached_by_id.get(id) {
                    next.push((*previous).clone());
                }
                continue;
            }
            next.push(descriptor.clone());
        }
        for entry in &plan.delete {
            if failed_deletes.contains(entry.id()) {
                let previous = cached_by_id
                    .get(entry.id())
                    .map(|d| (*d).clone())
                    .unwrap_or_else(|| entry.descriptor.clone());
                next.push(previous);
            }
        }

        if !report.failures.is_empty() {
            report.status = PassStatus::Partial;
        }
        report.next_snapshot = Some(next);
        report
    }
}

/// Record per-item results of a batch call, returning the failed ids
///
/// A failed call counts as a failure of every item. Fatal failures are
/// returned as `Err` after the items were recorded.
fn record_batch(
    report: &mut ReconcileReport,
    action: Action,
    ids: &[&str],
    result: Result<BatchOutcome, GatewayError>,
) -> Result<BTreeSet<String>, GatewayError> {
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => BatchOutcome {
            failures: (0..ids.len()).map(|i| (i, e.clone())).collect(),
        },
    };

    let mut failed = BTreeSet::new();
    let mut fatal = None;
    for (index, id) in ids.iter().enumerate() {
        match outcome.failure_for(index) {
            Some(error) => {
                if error.is_fatal() && fatal.is_none() {
                    fatal = Some(error.clone());
                }
                report.fail(action, id, error);
                failed.insert(id.to_string());
            }
            None => report.succeed(action, id),
        }
    }

    match fatal {
        Some(error) => Err(error),
        None => Ok(failed),
    }
}
