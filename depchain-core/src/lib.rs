#![doc = "depchain-core: reconciliation engine for package dependency relationships."]

//! Keeps a package catalog ("the store") in line with the dependency graph
//! observed in a build system. Build-time dependencies come from build roots,
//! run-time dependencies from the requirements artifacts declare.
//!
//! # Usage
//! Build a [`reconcile::Reconciler`] from a [`relationship::DependencyKind`],
//! a [`contract::BuildSystem`] and a [`release::ReleaseResolver`], then run
//! `audit`, `handle` or `initialize` against a [`store::StoreClient`].

pub mod contract;
pub mod derive;
pub mod error;
pub mod event;
pub mod reconcile;
pub mod relationship;
pub mod release;
pub mod store;
#[cfg(any(test, feature = "test-export-mocks"))]
pub mod testing;

pub use error::{DepchainError, RemoteError, Stage};
pub use reconcile::{AuditReport, HandleOutcome, InitializeReport, ReconcileSettings, Reconciler};
pub use relationship::{DependencyKind, Edge, RelationshipType};
