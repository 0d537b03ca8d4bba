//! Sync runs: build desired state once, reconcile every target
//!
//! Each target pass is independent. It holds its own [`RunLock`], reads its
//! cached snapshot once and writes it once; a failed pass never stops the
//! passes after it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use cmdb_hosts::{Host, HostStore};
use cmdb_rules::{ActionOutcome, ConfigurationError, ResolvedOutcomeSet, RuleEngine, RuleSet};
use serde::Serialize;

use crate::attributes::{AttributeResolver, EXPORT_PURPOSE, StandardResolver};
use crate::builder::{BuildProblem, DesiredState, DesiredStateBuilder};
use crate::config::{ConfigResolver, SyncConfig};
use crate::constructs::ConstructOutcome;
use crate::descriptor::{ConstructDescriptor, Target};
use crate::gateway::ApiGateway;
use crate::reconcile::{MessageLevel, PassStatus, ReconcileReport, ReconciliationEngine};
use crate::run_lock::RunLock;
use crate::snapshot::{FileSnapshotStore, SnapshotStore};
use crate::template::{JinjaRenderer, TemplateRenderer};
use crate::{Error, Result};

/// Options for a sync run
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// If true, classify and report without mutating targets or snapshots.
    /// Messages are prefixed with "[dry-run] Would ..."
    pub dry_run: bool,

    /// Targets to reconcile, in configuration order; empty means all
    pub targets: Vec<String>,
}

/// Report from a sync run
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    /// Worst status of all passes
    pub status: PassStatus,
    pub dry_run: bool,
    pub passes: Vec<ReconcileReport>,
    /// Rules skipped while loading
    pub rejected_rules: Vec<ConfigurationError>,
    /// Constructs that could not be built
    pub problems: Vec<BuildProblem>,
    /// Hosts excluded from desired state
    pub skipped_hosts: Vec<String>,
}

impl SyncReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            status: PassStatus::Synced,
            dry_run,
            passes: Vec::new(),
            rejected_rules: Vec::new(),
            problems: Vec::new(),
            skipped_hosts: Vec::new(),
        }
    }

    /// Whether every pass completed without failures
    pub fn is_success(&self) -> bool {
        self.status == PassStatus::Synced
    }

    pub fn with_pass(mut self, pass: ReconcileReport) -> Self {
        self.status = self.status.max(pass.status);
        self.passes.push(pass);
        self
    }

    pub fn pass(&self, target: &str) -> Option<&ReconcileReport> {
        self.passes.iter().find(|p| p.target == target)
    }

    /// Merge another report into this one, keeping the worst status
    pub fn merge(mut self, other: SyncReport) -> Self {
        self.status = self.status.max(other.status);
        self.dry_run |= other.dry_run;
        self.passes.extend(other.passes);
        self.rejected_rules.extend(other.rejected_rules);
        self.problems.extend(other.problems);
        self.skipped_hosts.extend(other.skipped_hosts);
        self
    }
}

/// What rules and attributes make of one host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInspection {
    pub hostname: String,
    /// Full attribute set; `None` when the host is excluded
    pub attributes: Option<BTreeMap<String, String>>,
    /// Labels eligible for export
    pub exported_labels: Option<BTreeMap<String, String>>,
    pub outcomes: ResolvedOutcomeSet,
    /// Cache entries dropped before inspecting
    pub cleared_cache_entries: usize,
}

/// Drives sync runs for one account
pub struct SyncEngine {
    config: SyncConfig,
    actions: RuleEngine,
    constructs: RuleSet<ConstructOutcome>,
    resolver: Box<dyn AttributeResolver>,
    renderer: Box<dyn TemplateRenderer>,
    snapshots: Box<dyn SnapshotStore>,
}

impl SyncEngine {
    /// Engine with the standard collaborators and no rules
    ///
    /// Snapshots live below the configured state directory.
    pub fn new(config: SyncConfig) -> Self {
        let resolver = StandardResolver::new(config.attributes.clone());
        let snapshots = FileSnapshotStore::new(config.state_dir());
        Self {
            config,
            actions: RuleEngine::default(),
            constructs: RuleSet::default(),
            resolver: Box::new(resolver),
            renderer: Box::new(JinjaRenderer::new()),
            snapshots: Box::new(snapshots),
        }
    }

    /// Engine for a configuration file, with the rule files it names
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be resolved or a rule
    /// file cannot be read. Individual malformed rules are not errors; they
    /// show up in [`SyncReport::rejected_rules`].
    pub fn from_config_file(path: impl Into<PathBuf>) -> Result<Self> {
        let config = ConfigResolver::new(path).resolve()?;
        Self::from_config(config)
    }

    /// Engine for a resolved configuration, loading its rule files
    pub fn from_config(config: SyncConfig) -> Result<Self> {
        let actions = load_rules::<ActionOutcome>(config.rules.actions.as_deref())?;
        let constructs = load_rules::<ConstructOutcome>(config.rules.constructs.as_deref())?;
        Ok(Self::new(config)
            .with_action_rules(actions)
            .with_construct_rules(constructs))
    }

    pub fn with_action_rules(mut self, rules: RuleSet<ActionOutcome>) -> Self {
        self.actions = RuleEngine::new(rules);
        self
    }

    pub fn with_construct_rules(mut self, rules: RuleSet<ConstructOutcome>) -> Self {
        self.constructs = rules;
        self
    }

    pub fn with_resolver(mut self, resolver: Box<dyn AttributeResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_renderer(mut self, renderer: Box<dyn TemplateRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_snapshot_store(mut self, snapshots: Box<dyn SnapshotStore>) -> Self {
        self.snapshots = snapshots;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Desired state of every configured target
    pub fn build_desired(&self, hosts: &mut [Host]) -> DesiredState {
        DesiredStateBuilder::new(
            &self.config.targets,
            &self.actions,
            &self.constructs,
            self.resolver.as_ref(),
            self.renderer.as_ref(),
        )
        .with_folder_target(self.config.folder_target.as_deref())
        .build(hosts)
    }

    /// Run a full sync
    ///
    /// Hosts whose caches gained or lost entries are saved back to the
    /// store afterwards, dry run or not.
    ///
    /// # Errors
    ///
    /// Returns an error if a requested target is not configured or the host
    /// store fails. Failures inside a pass are reported, not returned.
    pub fn sync(
        &self,
        store: &mut dyn HostStore,
        gateway: &dyn ApiGateway,
        options: &SyncOptions,
    ) -> Result<SyncReport> {
        let targets = self.selected_targets(&options.targets)?;

        let mut hosts = store.all()?;
        let desired = self.build_desired(&mut hosts);

        let mut report = SyncReport::new(options.dry_run);
        report
            .rejected_rules
            .extend_from_slice(self.actions.rules().rejected());
        report
            .rejected_rules
            .extend_from_slice(self.constructs.rejected());
        report.problems = desired.problems.clone();
        report.skipped_hosts = desired.skipped.clone();

        let engine = ReconciliationEngine::new(gateway).dry_run(options.dry_run);
        let state_dir = self.config.state_dir();
        for target in targets {
            let pass = self.run_pass(
                &engine,
                &state_dir,
                target,
                desired.entries(&target.name),
                options.dry_run,
            );
            report = report.with_pass(pass);
        }

        let mut saved = 0;
        for host in hosts.iter_mut().filter(|h| h.cache().is_dirty()) {
            host.cache_mut().mark_clean();
            store.save(host)?;
            saved += 1;
        }

        tracing::info!(
            account = %self.config.account.id,
            passes = report.passes.len(),
            status = ?report.status,
            hosts_saved = saved,
            "Sync finished"
        );
        Ok(report)
    }

    fn selected_targets(&self, names: &[String]) -> Result<Vec<&Target>> {
        if let Some(unknown) = names.iter().find(|n| self.config.target(n).is_none()) {
            return Err(Error::UnknownTarget {
                name: unknown.clone(),
            });
        }
        Ok(self
            .config
            .targets
            .iter()
            .filter(|t| names.is_empty() || names.contains(&t.name))
            .collect())
    }

    fn run_pass(
        &self,
        engine: &ReconciliationEngine<'_>,
        state_dir: &Path,
        target: &Target,
        desired: &[ConstructDescriptor],
        dry_run: bool,
    ) -> ReconcileReport {
        let account = self.config.account.id.as_str();

        let _lock = match RunLock::acquire(state_dir, account, &target.name) {
            Ok(lock) => lock,
            Err(e) => return ReconcileReport::aborted(&target.name, dry_run, e.to_string()),
        };

        let cached = match self.snapshots.load(account, &target.name) {
            Ok(cached) => cached,
            Err(e) => {
                return ReconcileReport::aborted(
                    &target.name,
                    dry_run,
                    format!("failed to load snapshot: {e}"),
                );
            }
        };

        let mut pass = engine.reconcile(target, desired, &cached);
        if let Some(next) = pass.next_snapshot.as_deref()
            && let Err(e) = self.snapshots.save(account, &target.name, next)
        {
            tracing::error!(target_name = %target, error = %e, "Failed to write snapshot");
            pass.status = pass.status.max(PassStatus::Partial);
            pass.push_message(MessageLevel::Error, format!("Failed to write snapshot: {e}"));
        }
        pass
    }

    /// Attributes and outcomes of one host, recomputed from scratch
    pub fn inspect_host(&self, host: &mut Host) -> HostInspection {
        let cleared = host.cache_mut().remove_prefix("");
        let (attributes, exported_labels) = match self.resolver.resolve(host, EXPORT_PURPOSE) {
            Some(resolved) => (Some(resolved.all), Some(resolved.filtered)),
            None => (None, None),
        };
        // Excluded hosts are still evaluated, against everything they carry
        let outcomes = match &attributes {
            Some(all) => self.actions.evaluate(host.hostname(), all),
            None => self
                .actions
                .evaluate(host.hostname(), &host.merged_attributes()),
        };
        HostInspection {
            hostname: host.hostname().to_string(),
            attributes,
            exported_labels,
            outcomes,
            cleared_cache_entries: cleared,
        }
    }

    /// Unique exportable label pairs over all hosts, sorted
    pub fn export_labels(&self, store: &dyn HostStore) -> Result<Vec<(String, String)>> {
        let mut pairs = BTreeSet::new();
        for host in store.all()? {
            if let Some(resolved) = self.resolver.resolve(&host, EXPORT_PURPOSE) {
                pairs.extend(resolved.filtered);
            }
        }
        Ok(pairs.into_iter().collect())
    }
}

fn load_rules<O: serde::de::DeserializeOwned>(path: Option<&Path>) -> Result<RuleSet<O>> {
    match path {
        Some(path) => Ok(RuleSet::load(path)?),
        None => Ok(RuleSet::default()),
    }
}
