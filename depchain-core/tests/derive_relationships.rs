use std::collections::BTreeSet;
use std::sync::Arc;

use depchain_core::contract::{ArtifactRef, Build, BuildrootEntry, MockBuildSystem, Requirement};
use depchain_core::derive::{deriver_for, BuildTimeDeriver, RelationshipDeriver, RunTimeDeriver};
use depchain_core::relationship::{DependencyKind, RelationshipType};
use depchain_core::{RemoteError, Stage};

fn build() -> Build {
    Build {
        build_id: "719123".to_string(),
        name: "guake".to_string(),
    }
}

fn artifact(nvra: &str, name: &str) -> ArtifactRef {
    ArtifactRef {
        nvra: nvra.to_string(),
        name: name.to_string(),
    }
}

fn requires(names: &[&str]) -> Vec<Requirement> {
    names
        .iter()
        .map(|name| Requirement {
            name: name.to_string(),
            version: "1.0".to_string(),
            flags: ">=".to_string(),
        })
        .collect()
}

fn descriptors(edges: &BTreeSet<depchain_core::Edge>) -> Vec<String> {
    edges.iter().map(|edge| edge.descriptor()).collect()
}

#[tokio::test]
async fn test_no_artifacts_means_no_edges_for_either_kind() {
    for kind in [DependencyKind::BuildTime, DependencyKind::RunTime] {
        let mut koji = MockBuildSystem::new();
        koji.expect_artifacts_for_build()
            .returning(|build| Ok((build.clone(), vec![])));
        koji.expect_buildroot_for().never();
        koji.expect_requirements_of().never();

        let deriver = deriver_for(kind, Arc::new(koji));
        let edges = deriver.derive(&build(), "fedora-24").await.expect("derive");

        assert!(edges.is_empty(), "{kind:?} produced {edges:?}");
    }
}

#[tokio::test]
async fn test_explicit_member_is_not_double_counted_as_buildroot() {
    let mut koji = MockBuildSystem::new();
    koji.expect_artifacts_for_build()
        .returning(|build| Ok((build.clone(), vec![artifact("guake-0.8.5-1.fc24.noarch", "guake")])));
    koji.expect_buildroot_for().times(1).returning(|_| {
        Ok(vec![
            BuildrootEntry { name: "python3-devel".into(), is_explicit: true },
            BuildrootEntry { name: "python3-devel".into(), is_explicit: false },
            BuildrootEntry { name: "bash".into(), is_explicit: false },
            BuildrootEntry { name: "guake".into(), is_explicit: false },
        ])
    });

    let deriver = BuildTimeDeriver::new(Arc::new(koji));
    let edges = deriver.derive(&build(), "fedora-24").await.expect("derive");

    assert_eq!(
        descriptors(&edges),
        vec![
            "guake/fedora-24 RPMBuildRequires python3-devel/fedora-24",
            "guake/fedora-24 RPMBuildRoot bash/fedora-24",
        ]
    );
}

#[tokio::test]
async fn test_runtime_skips_self_references_and_dedupes() {
    let mut koji = MockBuildSystem::new();
    koji.expect_artifacts_for_build().returning(|build| {
        Ok((
            build.clone(),
            vec![
                artifact("guake-0.8.5-1.fc24.noarch", "guake"),
                artifact("guake-data-0.8.5-1.fc24.noarch", "guake-data"),
            ],
        ))
    });
    koji.expect_requirements_of().returning(|artifact| {
        if artifact.name == "guake" {
            Ok(requires(&["guake-data", "python3", "dbus"]))
        } else {
            Ok(requires(&["guake", "python3"]))
        }
    });

    let deriver = RunTimeDeriver::new(Arc::new(koji));
    assert_eq!(deriver.relationship_types(), &[RelationshipType::RPMRequires]);
    let edges = deriver.derive(&build(), "fedora-24").await.expect("derive");

    assert_eq!(
        descriptors(&edges),
        vec![
            "guake/fedora-24 RPMRequires dbus/fedora-24",
            "guake/fedora-24 RPMRequires python3/fedora-24",
        ]
    );
}

#[tokio::test]
async fn test_failure_aborts_the_whole_build() {
    let mut koji = MockBuildSystem::new();
    koji.expect_artifacts_for_build().returning(|build| {
        Ok((
            build.clone(),
            vec![
                artifact("guake-0.8.5-1.fc24.noarch", "guake"),
                artifact("guake-data-0.8.5-1.fc24.noarch", "guake-data"),
            ],
        ))
    });
    koji.expect_requirements_of().returning(|artifact| {
        if artifact.name == "guake" {
            Ok(requires(&["python3"]))
        } else {
            Err(RemoteError::Transient("connection reset".into()))
        }
    });

    let deriver = RunTimeDeriver::new(Arc::new(koji));
    let err = deriver.derive(&build(), "fedora-24").await.unwrap_err();

    assert_eq!(err.stage(), Stage::Derive);
    assert!(err.is_retryable());
}
