//! # contract: collaborator interfaces for the reconciliation engine
//!
//! The engine talks to two remote systems and knows them only through the
//! traits in this module:
//!
//! - [`BuildSystem`]: read-only view of the build system (builds in a tag,
//!   artifacts of a build, build roots, declared requirements).
//! - [`Transport`]: the store's wire layer. Resources are addressed by their
//!   collection name (`global-components`, `release-components`,
//!   `release-component-relationships`, `releases/<release>`), parameters and
//!   bodies are JSON values. Typed access lives in [`crate::store`].
//!
//! ## Mocking & Testing
//! - Both traits are annotated for `mockall` so consumers can generate
//!   deterministic mocks (`MockBuildSystem`, `MockTransport`).
//! - For call-log assertions against a stateful store see
//!   `crate::testing::RecordingTransport`.
//!
//! ## Errors
//! - Every method answers with a [`RemoteError`]; implementors classify
//!   their failures so the engine knows what is worth retrying.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use mockall::automock;

use crate::error::RemoteError;

/// A build as known to the build system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Build {
    /// Opaque build identifier.
    pub build_id: String,
    /// Source package name; the `from` side of every derived edge.
    pub name: String,
}

/// One binary artifact produced by a build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Full name-version-release.arch identifier.
    pub nvra: String,
    /// Package name of the artifact (a build may produce several subpackages).
    pub name: String,
}

/// A package found in the build root an artifact was built in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildrootEntry {
    pub name: String,
    /// Explicitly pulled in for this build rather than inherited.
    #[serde(alias = "is_update")]
    pub is_explicit: bool,
}

/// A run-time requirement declared by an artifact.
///
/// Only `name` takes part in edge identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Requirement {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub flags: String,
}

/// Read-only access to the build system.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait BuildSystem: Send + Sync {
    /// The tag currently receiving development builds. It moves over time.
    async fn development_tag(&self) -> Result<String, RemoteError>;

    /// Every build currently tagged into `tag`.
    async fn builds_in_tag(&self, tag: &str) -> Result<Vec<Build>, RemoteError>;

    /// Resolves a build and lists its artifacts. An empty list is not an error.
    async fn artifacts_for_build(
        &self,
        build: &Build,
    ) -> Result<(Build, Vec<ArtifactRef>), RemoteError>;

    /// Contents of the build root `artifact` was produced in.
    async fn buildroot_for(&self, artifact: &ArtifactRef)
        -> Result<Vec<BuildrootEntry>, RemoteError>;

    /// Run-time requirements declared by `artifact`.
    async fn requirements_of(&self, artifact: &ArtifactRef)
        -> Result<Vec<Requirement>, RemoteError>;
}

/// HTTP verb of a store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    #[serde(rename = "GET")]
    Get,
    #[serde(rename = "POST")]
    Post,
}

/// Wire access to the store. Implemented by the HTTP client and by test doubles.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Reads `resource` with query `params` (a JSON object).
    async fn get(&self, resource: &str, params: &Value) -> Result<Value, RemoteError>;

    /// Creates a record in `resource`.
    async fn post(&self, resource: &str, body: &Value) -> Result<Value, RemoteError>;
}
