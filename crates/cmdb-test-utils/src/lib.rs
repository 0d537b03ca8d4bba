//! Shared test utilities for the cmdb-sync workspace.
//!
//! This crate provides fixtures used across crate test suites. It is a
//! dev-dependency only and never published.
//!
//! # Modules
//!
//! - [`gateway`]: [`MockGateway`], an in-memory target with call recording
//!   and injectable failures
//! - [`fixtures`]: hosts, stores and configurations

pub mod fixtures;
pub mod gateway;

pub use fixtures::{TestState, host, labels, store};
pub use gateway::{Call, MockGateway};
