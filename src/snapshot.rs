//! A [`BuildSystem`] backed by a JSON export of the build system's state.
//!
//! ```json
//! {
//!   "development_tag": "f25",
//!   "builds": [
//!     {
//!       "build_id": "719123",
//!       "name": "guake",
//!       "tags": ["f24"],
//!       "artifacts": [
//!         {
//!           "nvra": "guake-0.8.5-1.fc24.noarch",
//!           "name": "guake",
//!           "buildroot": [{ "name": "python3-devel", "is_explicit": true }],
//!           "requires": [{ "name": "python3", "version": "3.5", "flags": ">=" }]
//!         }
//!       ]
//!     }
//!   ]
//! }
//! ```

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use depchain_core::contract::{ArtifactRef, Build, BuildSystem, BuildrootEntry, Requirement};
use depchain_core::RemoteError;
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotArtifact {
    pub nvra: String,
    pub name: String,
    #[serde(default)]
    pub buildroot: Vec<BuildrootEntry>,
    #[serde(default)]
    pub requires: Vec<Requirement>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotBuild {
    pub build_id: String,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub artifacts: Vec<SnapshotArtifact>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotBuildSystem {
    pub development_tag: String,
    #[serde(default)]
    pub builds: Vec<SnapshotBuild>,
}

impl SnapshotBuildSystem {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read build-system snapshot {}", path.display()))?;
        let snapshot = Self::from_json(&content)
            .with_context(|| format!("Failed to parse build-system snapshot {}", path.display()))?;
        info!(
            path = %path.display(),
            builds = snapshot.builds.len(),
            development_tag = %snapshot.development_tag,
            "Loaded build-system snapshot"
        );
        Ok(snapshot)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    fn find_artifact(&self, artifact: &ArtifactRef) -> Option<&SnapshotArtifact> {
        self.builds
            .iter()
            .flat_map(|build| build.artifacts.iter())
            .find(|candidate| candidate.nvra == artifact.nvra)
    }
}

#[async_trait]
impl BuildSystem for SnapshotBuildSystem {
    async fn development_tag(&self) -> Result<String, RemoteError> {
        Ok(self.development_tag.clone())
    }

    async fn builds_in_tag(&self, tag: &str) -> Result<Vec<Build>, RemoteError> {
        Ok(self
            .builds
            .iter()
            .filter(|build| build.tags.iter().any(|t| t == tag))
            .map(|build| Build {
                build_id: build.build_id.clone(),
                name: build.name.clone(),
            })
            .collect())
    }

    async fn artifacts_for_build(
        &self,
        build: &Build,
    ) -> Result<(Build, Vec<ArtifactRef>), RemoteError> {
        let Some(found) = self.builds.iter().find(|b| b.build_id == build.build_id) else {
            warn!(build_id = %build.build_id, name = %build.name, "Build missing from snapshot");
            return Ok((build.clone(), Vec::new()));
        };
        let resolved = Build {
            build_id: found.build_id.clone(),
            name: found.name.clone(),
        };
        let artifacts = found
            .artifacts
            .iter()
            .map(|a| ArtifactRef {
                nvra: a.nvra.clone(),
                name: a.name.clone(),
            })
            .collect();
        Ok((resolved, artifacts))
    }

    async fn buildroot_for(
        &self,
        artifact: &ArtifactRef,
    ) -> Result<Vec<BuildrootEntry>, RemoteError> {
        self.find_artifact(artifact)
            .map(|a| a.buildroot.clone())
            .ok_or_else(|| RemoteError::NotFound(format!("artifact {}", artifact.nvra)))
    }

    async fn requirements_of(
        &self,
        artifact: &ArtifactRef,
    ) -> Result<Vec<Requirement>, RemoteError> {
        self.find_artifact(artifact)
            .map(|a| a.requires.clone())
            .ok_or_else(|| RemoteError::NotFound(format!("artifact {}", artifact.nvra)))
    }
}
