//! Derives the relationships that *should* exist for a build.
//!
//! Two derivers share the [`RelationshipDeriver`] capability:
//! - [`BuildTimeDeriver`] reads the build root and emits `RPMBuildRequires`
//!   for explicitly pulled-in packages and `RPMBuildRoot` for the rest.
//! - [`RunTimeDeriver`] reads each artifact's declared requirements and emits
//!   `RPMRequires`.
//!
//! A build without artifacts contributes nothing. Any build-system failure
//! aborts the derivation for that build; partial edge sets are never returned.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::{debug, error, warn};

use crate::contract::{ArtifactRef, Build, BuildSystem};
use crate::error::{DepchainError, Result, Stage};
use crate::relationship::{DependencyKind, Edge, RelationshipType};

/// Computes the canonical edge set of one build.
#[async_trait]
pub trait RelationshipDeriver: Send + Sync {
    fn kind(&self) -> DependencyKind;

    /// Relationship types this deriver produces, in fetch order.
    fn relationship_types(&self) -> &'static [RelationshipType] {
        self.kind().relationship_types()
    }

    async fn derive(&self, build: &Build, release: &str) -> Result<BTreeSet<Edge>>;
}

/// Picks the deriver matching `kind`.
pub fn deriver_for(
    kind: DependencyKind,
    build_system: Arc<dyn BuildSystem>,
) -> Box<dyn RelationshipDeriver> {
    match kind {
        DependencyKind::BuildTime => Box::new(BuildTimeDeriver::new(build_system)),
        DependencyKind::RunTime => Box::new(RunTimeDeriver::new(build_system)),
    }
}

/// Resolves the artifacts of `build`, answering the package name edges start from.
async fn resolve_artifacts(
    build_system: &dyn BuildSystem,
    build: &Build,
) -> Result<(String, Vec<ArtifactRef>)> {
    let (resolved, artifacts) = build_system
        .artifacts_for_build(build)
        .await
        .map_err(|e| {
            error!(build = %build.name, build_id = %build.build_id, error = %e, "[DERIVE] Failed to resolve artifacts");
            DepchainError::remote(Stage::Derive, e)
        })?;

    let from = if resolved.name.trim().is_empty() {
        build.name.trim().to_string()
    } else {
        resolved.name.trim().to_string()
    };
    if artifacts.is_empty() {
        warn!(build = %from, build_id = %build.build_id, "[DERIVE] Build has no resolvable artifacts, skipping");
    }
    Ok((from, artifacts))
}

pub struct BuildTimeDeriver {
    build_system: Arc<dyn BuildSystem>,
}

impl BuildTimeDeriver {
    pub fn new(build_system: Arc<dyn BuildSystem>) -> Self {
        Self { build_system }
    }
}

#[async_trait]
impl RelationshipDeriver for BuildTimeDeriver {
    fn kind(&self) -> DependencyKind {
        DependencyKind::BuildTime
    }

    async fn derive(&self, build: &Build, release: &str) -> Result<BTreeSet<Edge>> {
        let (from, artifacts) = resolve_artifacts(self.build_system.as_ref(), build).await?;
        // All artifacts of a build come out of the same build root.
        let Some(artifact) = artifacts.first() else {
            return Ok(BTreeSet::new());
        };

        let entries = self
            .build_system
            .buildroot_for(artifact)
            .await
            .map_err(|e| {
                error!(build = %from, artifact = %artifact.nvra, error = %e, "[DERIVE] Failed to list build root");
                DepchainError::remote(Stage::Derive, e)
            })?;

        let explicit: BTreeSet<&str> = entries
            .iter()
            .filter(|entry| entry.is_explicit)
            .map(|entry| entry.name.trim())
            .collect();

        let edges: BTreeSet<Edge> = entries
            .iter()
            .map(|entry| entry.name.trim())
            .filter(|name| !name.is_empty() && *name != from)
            .map(|name| {
                let kind = if explicit.contains(name) {
                    RelationshipType::RPMBuildRequires
                } else {
                    RelationshipType::RPMBuildRoot
                };
                Edge::new(from.as_str(), kind, name, release)
            })
            .collect();

        debug!(build = %from, release, edges = edges.len(), "[DERIVE] Derived build-time edges");
        Ok(edges)
    }
}

pub struct RunTimeDeriver {
    build_system: Arc<dyn BuildSystem>,
}

impl RunTimeDeriver {
    pub fn new(build_system: Arc<dyn BuildSystem>) -> Self {
        Self { build_system }
    }
}

#[async_trait]
impl RelationshipDeriver for RunTimeDeriver {
    fn kind(&self) -> DependencyKind {
        DependencyKind::RunTime
    }

    async fn derive(&self, build: &Build, release: &str) -> Result<BTreeSet<Edge>> {
        let (from, artifacts) = resolve_artifacts(self.build_system.as_ref(), build).await?;
        if artifacts.is_empty() {
            return Ok(BTreeSet::new());
        }

        let package = from.as_str();
        let lookups = artifacts.iter().map(|artifact| async move {
            self.build_system
                .requirements_of(artifact)
                .await
                .map_err(|e| {
                    error!(build = %package, artifact = %artifact.nvra, error = %e, "[DERIVE] Failed to read requirements");
                    DepchainError::remote(Stage::Derive, e)
                })
        });
        let requirements = try_join_all(lookups).await?;

        // Anything provided by the build itself is not a dependency.
        let mut own: BTreeSet<&str> = artifacts.iter().map(|a| a.name.trim()).collect();
        own.insert(from.as_str());

        let edges: BTreeSet<Edge> = requirements
            .iter()
            .flatten()
            .map(|requirement| requirement.name.trim())
            .filter(|name| !name.is_empty() && !own.contains(name))
            .map(|name| Edge::new(from.as_str(), RelationshipType::RPMRequires, name, release))
            .collect();

        debug!(build = %from, release, edges = edges.len(), "[DERIVE] Derived run-time edges");
        Ok(edges)
    }
}
