//! Maps build-system tags to store releases and decides which tags are tracked.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::contract::BuildSystem;
use crate::error::{DepchainError, Result, Stage};

/// How a tag name turns into a release identifier.
///
/// The tag prefix is stripped, anything after the first `-` dropped and the
/// release prefix prepended: with the defaults `f24-updates` becomes `fedora-24`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagMapping {
    #[serde(default = "default_tag_prefix")]
    pub tag_prefix: String,
    #[serde(default = "default_release_prefix")]
    pub release_prefix: String,
}

fn default_tag_prefix() -> String {
    "f".to_string()
}

fn default_release_prefix() -> String {
    "fedora".to_string()
}

impl Default for TagMapping {
    fn default() -> Self {
        TagMapping {
            tag_prefix: default_tag_prefix(),
            release_prefix: default_release_prefix(),
        }
    }
}

impl TagMapping {
    pub fn release_for(&self, tag: &str) -> String {
        let tag = tag.trim();
        let stripped = tag.strip_prefix(self.tag_prefix.as_str()).unwrap_or(tag);
        let version = stripped.split('-').next().unwrap_or(stripped);
        format!("{}-{}", self.release_prefix, version)
    }
}

/// Decides tag interest and resolves tags to releases.
///
/// Built from explicit inputs: the statically tracked tags and the current
/// development tag. Nothing here is global or mutable.
#[derive(Debug, Clone)]
pub struct ReleaseResolver {
    tracked: BTreeSet<String>,
    development_tag: String,
    mapping: TagMapping,
}

impl ReleaseResolver {
    pub fn new<I, S>(tracked: I, development_tag: impl Into<String>, mapping: TagMapping) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ReleaseResolver {
            tracked: tracked.into_iter().map(Into::into).collect(),
            development_tag: development_tag.into(),
            mapping,
        }
    }

    /// Asks the build system for the development tag and combines it with `tracked`.
    pub async fn discover<B>(build_system: &B, tracked: &[String], mapping: TagMapping) -> Result<Self>
    where
        B: BuildSystem + ?Sized,
    {
        let development_tag = build_system
            .development_tag()
            .await
            .map_err(|e| DepchainError::remote(Stage::Resolve, e))?;
        info!(development_tag = %development_tag, tracked = ?tracked, "[RESOLVE] Discovered development tag");
        Ok(ReleaseResolver::new(tracked.iter().cloned(), development_tag, mapping))
    }

    pub fn is_interesting(&self, tag: &str) -> bool {
        let interesting = tag == self.development_tag || self.tracked.contains(tag);
        debug!(tag, interesting, "[RESOLVE] Checked tag interest");
        interesting
    }

    pub fn release_for(&self, tag: &str) -> String {
        self.mapping.release_for(tag)
    }

    pub fn development_tag(&self) -> &str {
        &self.development_tag
    }

    /// Every release with an interesting tag, paired with all of its tags.
    ///
    /// Tags that map to the same release (`f24` and `f24-updates`) are grouped
    /// so one sweep over the release sees builds from each of them.
    pub fn interesting_releases(&self) -> Vec<(String, Vec<String>)> {
        let mut tags: BTreeSet<&str> = self.tracked.iter().map(String::as_str).collect();
        tags.insert(self.development_tag.as_str());

        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for tag in tags.into_iter().filter(|tag| !tag.is_empty()) {
            groups.entry(self.release_for(tag)).or_default().push(tag.to_string());
        }
        groups.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_for_default_mapping() {
        let mapping = TagMapping::default();
        assert_eq!(mapping.release_for("f24"), "fedora-24");
        assert_eq!(mapping.release_for("f25-updates-candidate"), "fedora-25");
        assert_eq!(mapping.release_for("rawhide"), "fedora-rawhide");
    }

    #[test]
    fn test_release_for_custom_mapping() {
        let mapping = TagMapping {
            tag_prefix: "epel".into(),
            release_prefix: "epel".into(),
        };
        assert_eq!(mapping.release_for("epel7"), "epel-7");
    }

    #[test]
    fn test_interest_covers_tracked_and_development_tags() {
        let resolver = ReleaseResolver::new(["f23"], "f25", TagMapping::default());
        assert!(resolver.is_interesting("f23"));
        assert!(resolver.is_interesting("f25"));
        assert!(!resolver.is_interesting("f22"));
    }

    #[test]
    fn test_interesting_releases_groups_tags_by_release() {
        let resolver = ReleaseResolver::new(["f24", "f24-updates"], "f25", TagMapping::default());
        assert_eq!(
            resolver.interesting_releases(),
            vec![
                ("fedora-24".to_string(), vec!["f24".to_string(), "f24-updates".to_string()]),
                ("fedora-25".to_string(), vec!["f25".to_string()]),
            ]
        );
    }
}
