//! Relationship taxonomy and the canonical edge descriptor.
//!
//! An [`Edge`] is the unit the engine reasons about: a typed, directed link
//! between two release components of the same release. Its `Display` form is
//! the descriptor reported by audits:
//!
//! ```text
//! guake/fedora-24 RPMRequires nethack/fedora-24
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The closed set of relationship types the engine tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RelationshipType {
    /// The from-package explicitly required the to-package to build.
    RPMBuildRequires,
    /// The to-package was in the from-package's build root without being asked for.
    RPMBuildRoot,
    /// The from-package's artifacts require the to-package at install time.
    RPMRequires,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::RPMBuildRequires => "RPMBuildRequires",
            RelationshipType::RPMBuildRoot => "RPMBuildRoot",
            RelationshipType::RPMRequires => "RPMRequires",
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RPMBuildRequires" => Ok(RelationshipType::RPMBuildRequires),
            "RPMBuildRoot" => Ok(RelationshipType::RPMBuildRoot),
            "RPMRequires" => Ok(RelationshipType::RPMRequires),
            other => Err(format!("unknown relationship type '{other}'")),
        }
    }
}

/// Which dependency graph a handler keeps in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    #[serde(alias = "build-time", alias = "build_time")]
    BuildTime,
    #[serde(alias = "run-time", alias = "run_time")]
    RunTime,
}

impl DependencyKind {
    /// Relationship types owned by this kind, in fetch order.
    pub fn relationship_types(&self) -> &'static [RelationshipType] {
        match self {
            DependencyKind::BuildTime => &[
                RelationshipType::RPMBuildRequires,
                RelationshipType::RPMBuildRoot,
            ],
            DependencyKind::RunTime => &[RelationshipType::RPMRequires],
        }
    }
}

/// A relationship between two release components of one release.
///
/// Ordering and equality follow the identity tuple `(from, to, type, release)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub kind: RelationshipType,
    pub release: String,
}

impl Edge {
    pub fn new(
        from: impl Into<String>,
        kind: RelationshipType,
        to: impl Into<String>,
        release: impl Into<String>,
    ) -> Self {
        Edge {
            from: from.into().trim().to_string(),
            to: to.into().trim().to_string(),
            kind,
            release: release.into().trim().to_string(),
        }
    }

    /// Renders the canonical descriptor.
    pub fn descriptor(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} {} {}/{}",
            self.from, self.release, self.kind, self.to, self.release
        )
    }
}
