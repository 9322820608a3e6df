//! # reconcile: keeps the store's relationships in line with the build system
//!
//! [`Reconciler`] drives three operations over a [`StoreClient`]:
//!
//! - [`Reconciler::audit`]: read-only. Compares stored relationships with the
//!   ones derived from every build in each interesting release's tags and reports both
//!   directions of the difference. Safe to run repeatedly.
//! - [`Reconciler::handle`]: applies a single build event. Components are
//!   created without reading first (an existing record is success) and every
//!   derived relationship is created.
//! - [`Reconciler::initialize`]: backfills a release, creating relationships
//!   in batches grouped by `(from, type)`.
//!
//! Sweeps fan out per-build derivations and batch creations over a worker pool
//! bounded by [`ReconcileSettings::concurrency`]. Pages of one relationship type
//! are always fetched in order. A sweep is a plain future: dropping it stops
//! work at the next await, and every operation is safe to re-run.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::contract::{BuildSystem, Transport};
use crate::derive::{deriver_for, RelationshipDeriver};
use crate::error::{DepchainError, Result, Stage};
use crate::event::{BuildEvent, EventRouter};
use crate::relationship::{DependencyKind, Edge, RelationshipType};
use crate::release::ReleaseResolver;
use crate::store::{RelationshipBatch, StoreClient};

/// Tuning knobs for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSettings {
    /// Upper bound on concurrent remote calls during sweeps.
    pub concurrency: usize,
    /// Skip relationships that already exist when applying an event.
    pub check_existing: bool,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        ReconcileSettings {
            concurrency: 4,
            check_existing: false,
        }
    }
}

/// Result of an audit: descriptors only the store has, and descriptors it lacks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    /// Stored edges the build system no longer supports.
    pub present: BTreeSet<String>,
    /// Edges the build system implies but the store is missing.
    pub absent: BTreeSet<String>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.present.is_empty() && self.absent.is_empty()
    }

    pub fn into_parts(self) -> (BTreeSet<String>, BTreeSet<String>) {
        (self.present, self.absent)
    }
}

/// What happened to an inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    /// The message was not a tagging into an interesting tag.
    Skipped,
    Applied {
        release: String,
        components: usize,
        relationships: usize,
    },
}

/// Summary of a backfill.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitializeReport {
    pub releases: Vec<String>,
    pub batches: usize,
    pub relationships: usize,
}

pub struct Reconciler {
    resolver: ReleaseResolver,
    build_system: Arc<dyn BuildSystem>,
    deriver: Box<dyn RelationshipDeriver>,
    settings: ReconcileSettings,
}

impl Reconciler {
    pub fn new(
        kind: DependencyKind,
        build_system: Arc<dyn BuildSystem>,
        resolver: ReleaseResolver,
    ) -> Self {
        let deriver = deriver_for(kind, Arc::clone(&build_system));
        Self {
            resolver,
            build_system,
            deriver,
            settings: ReconcileSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ReconcileSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn kind(&self) -> DependencyKind {
        self.deriver.kind()
    }

    pub fn resolver(&self) -> &ReleaseResolver {
        &self.resolver
    }

    pub fn router(&self) -> EventRouter {
        EventRouter::new(self.resolver.clone())
    }

    fn relationship_types(&self) -> &'static [RelationshipType] {
        self.deriver.relationship_types()
    }

    fn workers(&self) -> usize {
        self.settings.concurrency.max(1)
    }

    /// Derives the should-exist edge set of every build in any of `tags`.
    ///
    /// A build tagged into more than one of them is derived once.
    async fn derive_tags(&self, tags: &[String], release: &str) -> Result<BTreeSet<Edge>> {
        let mut builds = Vec::new();
        let mut seen = BTreeSet::new();
        for tag in tags {
            let tagged = self.build_system.builds_in_tag(tag).await.map_err(|e| {
                error!(tag = %tag, error = %e, "[DERIVE] Failed to list builds in tag");
                DepchainError::remote(Stage::Derive, e)
            })?;
            info!(tag = %tag, release, builds = tagged.len(), "[DERIVE] Listed builds in tag");
            builds.extend(tagged.into_iter().filter(|build| seen.insert(build.build_id.clone())));
        }
        info!(release, tags = ?tags, builds = builds.len(), "[DERIVE] Deriving relationships for release");

        stream::iter(builds.iter())
            .map(|build| self.deriver.derive(build, release))
            .buffer_unordered(self.workers())
            .try_fold(BTreeSet::new(), |mut acc, edges| async move {
                acc.extend(edges);
                Ok(acc)
            })
            .await
    }

    /// Everything the store holds for `release` across this kind's relationship types.
    async fn stored_edges<T: Transport>(
        &self,
        store: &StoreClient<T>,
        release: &str,
        from: Option<&str>,
    ) -> Result<BTreeSet<Edge>> {
        let mut stored = BTreeSet::new();
        for kind in self.relationship_types() {
            stored.extend(store.relationships(release, *kind, from).await?);
        }
        Ok(stored)
    }

    /// Read-only comparison of derived and stored relationships.
    pub async fn audit<T: Transport>(&self, store: &StoreClient<T>) -> Result<AuditReport> {
        let mut report = AuditReport::default();

        for (release, tags) in self.resolver.interesting_releases() {
            info!(release = %release, tags = ?tags, kind = ?self.kind(), "[AUDIT] Auditing release");
            store.get_release(&release).await?;

            let stored = self.stored_edges(store, &release, None).await?;
            let derived = self.derive_tags(&tags, &release).await?;

            let present: Vec<String> = stored.difference(&derived).map(Edge::descriptor).collect();
            let absent: Vec<String> = derived.difference(&stored).map(Edge::descriptor).collect();
            info!(
                release = %release,
                stored = stored.len(),
                derived = derived.len(),
                present = present.len(),
                absent = absent.len(),
                "[AUDIT] Release audited"
            );
            report.present.extend(present);
            report.absent.extend(absent);
        }

        Ok(report)
    }

    /// Routes a raw bus message and applies it when it qualifies.
    pub async fn handle_message<T: Transport>(
        &self,
        store: &StoreClient<T>,
        message: &Value,
    ) -> Result<HandleOutcome> {
        match BuildEvent::from_message(message) {
            Some(event) => self.handle(store, &event).await,
            None => {
                debug!("[HANDLE] Message is not a build tagging event");
                Ok(HandleOutcome::Skipped)
            }
        }
    }

    /// Creates the components and relationships implied by one build event.
    pub async fn handle<T: Transport>(
        &self,
        store: &StoreClient<T>,
        event: &BuildEvent,
    ) -> Result<HandleOutcome> {
        if !self.resolver.is_interesting(&event.tag) {
            debug!(tag = %event.tag, build = %event.name, "[HANDLE] Tag not interesting, skipping");
            return Ok(HandleOutcome::Skipped);
        }
        let release = self.resolver.release_for(&event.tag);
        info!(tag = %event.tag, release = %release, build = %event.name, build_id = %event.build_id, "[HANDLE] Applying build event");

        store.get_release(&release).await?;
        let derived = self.deriver.derive(&event.build(), &release).await?;

        let components: BTreeSet<&str> = derived
            .iter()
            .flat_map(|edge| [edge.from.as_str(), edge.to.as_str()])
            .collect();

        stream::iter(components.iter().copied())
            .map(|name| store.ensure_global_component(name))
            .buffer_unordered(self.workers())
            .try_collect::<Vec<()>>()
            .await?;
        stream::iter(components.iter().copied())
            .map(|name| store.ensure_release_component(name, &release))
            .buffer_unordered(self.workers())
            .try_collect::<Vec<()>>()
            .await?;

        let pending: Vec<&Edge> = if self.settings.check_existing && !derived.is_empty() {
            let from = derived.iter().next().map_or(event.name.as_str(), |edge| edge.from.as_str());
            let stored = self.stored_edges(store, &release, Some(from)).await?;
            derived.iter().filter(|edge| !stored.contains(*edge)).collect()
        } else {
            derived.iter().collect()
        };

        stream::iter(pending.iter().copied())
            .map(|edge| store.create_relationship(edge))
            .buffer_unordered(self.workers())
            .try_collect::<Vec<()>>()
            .await?;

        info!(
            release = %release,
            build = %event.name,
            components = components.len(),
            relationships = pending.len(),
            "[HANDLE] Build event applied"
        );
        Ok(HandleOutcome::Applied {
            release,
            components: components.len(),
            relationships: pending.len(),
        })
    }

    /// Backfills every interesting release with batched relationship creation.
    pub async fn initialize<T: Transport>(&self, store: &StoreClient<T>) -> Result<InitializeReport> {
        let mut report = InitializeReport::default();

        for (release, tags) in self.resolver.interesting_releases() {
            info!(release = %release, tags = ?tags, kind = ?self.kind(), "[INIT] Initializing release");
            store.get_release(&release).await?;

            let derived = self.derive_tags(&tags, &release).await?;
            let batches = group_batches(&derived);

            stream::iter(batches.iter())
                .map(|batch| store.create_relationships(batch))
                .buffer_unordered(self.workers())
                .try_collect::<Vec<()>>()
                .await?;

            info!(release = %release, batches = batches.len(), relationships = derived.len(), "[INIT] Release initialized");
            report.batches += batches.len();
            report.relationships += derived.len();
            report.releases.push(release);
        }

        Ok(report)
    }
}

/// Groups edges into one creation batch per `(from, type, release)`.
pub fn group_batches(edges: &BTreeSet<Edge>) -> Vec<RelationshipBatch> {
    let mut groups: BTreeMap<(&str, RelationshipType, &str), Vec<String>> = BTreeMap::new();
    for edge in edges {
        groups
            .entry((edge.from.as_str(), edge.kind, edge.release.as_str()))
            .or_default()
            .push(edge.to.clone());
    }
    groups
        .into_iter()
        .map(|((from, kind, release), to)| RelationshipBatch {
            from_component_name: from.to_string(),
            from_component_release: release.to_string(),
            to_component_name: to,
            kind,
        })
        .collect()
}
