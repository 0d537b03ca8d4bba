//! Desired-state building and reconciliation for cmdb-sync
//!
//! A sync run turns hosts into per-target construct lists with the
//! [`DesiredStateBuilder`], then brings every target in line with the
//! [`ReconciliationEngine`]. The [`SyncEngine`] ties both together with
//! configuration, snapshots and run locks.

pub mod attributes;
pub mod builder;
pub mod config;
pub mod constructs;
pub mod descriptor;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod reconcile;
pub mod run_lock;
pub mod snapshot;
pub mod sync;
pub mod template;

pub use attributes::{AttributeResolver, EXPORT_PURPOSE, ResolvedAttributes, StandardResolver};
pub use builder::{BuildProblem, DesiredState, DesiredStateBuilder, HOSTNAME_VAR};
pub use config::{AccountConfig, AttributeConfig, ConfigResolver, RuleFiles, SyncConfig};
pub use constructs::ConstructOutcome;
pub use descriptor::{ConstructDescriptor, ConstructKind, LiveEntry, RemoteRecord, Target};
pub use error::{Error, Result};
pub use gateway::{ApiGateway, BatchOutcome, GatewayError};
pub use reconcile::{
    Action, ItemFailure, MessageLevel, PassStatus, ReconcilePlan, ReconcileReport,
    ReconciliationEngine, ReportMessage,
};
pub use run_lock::RunLock;
pub use snapshot::{CachedSnapshot, FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
pub use sync::{HostInspection, SyncEngine, SyncOptions, SyncReport};
pub use template::{JinjaRenderer, TemplateError, TemplateRenderer, TemplateVars};
