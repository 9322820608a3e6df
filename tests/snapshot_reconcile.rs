use std::collections::BTreeSet;
use std::sync::Arc;

use depchain::snapshot::SnapshotBuildSystem;
use depchain_core::contract::{Build, BuildSystem};
use depchain_core::reconcile::Reconciler;
use depchain_core::release::{ReleaseResolver, TagMapping};
use depchain_core::store::StoreClient;
use depchain_core::testing::RecordingTransport;
use depchain_core::DependencyKind;

const SNAPSHOT: &str = r#"{
  "development_tag": "f25",
  "builds": [
    {
      "build_id": "719123",
      "name": "guake",
      "tags": ["f24"],
      "artifacts": [
        {
          "nvra": "guake-0.8.5-1.fc24.noarch",
          "name": "guake",
          "buildroot": [
            { "name": "buildtimelib1", "is_update": true },
            { "name": "buildtimelib2", "is_update": false }
          ],
          "requires": [
            { "name": "nethack", "version": "", "flags": "" },
            { "name": "guake", "version": "", "flags": "" }
          ]
        }
      ]
    },
    {
      "build_id": "719200",
      "name": "empty-build",
      "tags": ["f24"],
      "artifacts": []
    }
  ]
}"#;

async fn resolver(snapshot: &SnapshotBuildSystem) -> ReleaseResolver {
    ReleaseResolver::discover(snapshot, &["f24".to_string()], TagMapping::default())
        .await
        .expect("discover")
}

#[tokio::test]
async fn test_snapshot_answers_build_system_queries() {
    let snapshot = SnapshotBuildSystem::from_json(SNAPSHOT).expect("snapshot");

    assert_eq!(snapshot.development_tag().await.unwrap(), "f25");
    assert_eq!(snapshot.builds_in_tag("f24").await.unwrap().len(), 2);
    assert!(snapshot.builds_in_tag("f25").await.unwrap().is_empty());

    let unknown = Build {
        build_id: "1".to_string(),
        name: "ghost".to_string(),
    };
    let (_, artifacts) = snapshot.artifacts_for_build(&unknown).await.unwrap();
    assert!(artifacts.is_empty());
}

#[tokio::test]
async fn test_buildtime_audit_against_snapshot() {
    let snapshot = SnapshotBuildSystem::from_json(SNAPSHOT).expect("snapshot");
    let resolver = resolver(&snapshot).await;
    let reconciler = Reconciler::new(DependencyKind::BuildTime, Arc::new(snapshot), resolver);
    let store = StoreClient::new(
        RecordingTransport::new()
            .with_release("fedora-24")
            .with_release("fedora-25"),
    );

    let report = reconciler.audit(&store).await.expect("audit");

    let expected: BTreeSet<String> = [
        "guake/fedora-24 RPMBuildRequires buildtimelib1/fedora-24",
        "guake/fedora-24 RPMBuildRoot buildtimelib2/fedora-24",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    assert_eq!(report.absent, expected);
    assert!(report.present.is_empty());
}

#[tokio::test]
async fn test_runtime_initialize_then_audit_is_clean() {
    let snapshot = SnapshotBuildSystem::from_json(SNAPSHOT).expect("snapshot");
    let resolver = resolver(&snapshot).await;
    let reconciler = Reconciler::new(DependencyKind::RunTime, Arc::new(snapshot), resolver);
    let store = StoreClient::new(
        RecordingTransport::new()
            .with_release("fedora-24")
            .with_release("fedora-25"),
    );

    reconciler.initialize(&store).await.expect("initialize");
    let report = reconciler.audit(&store).await.expect("audit");

    assert!(report.is_clean(), "unexpected diff: {report:?}");
    assert_eq!(
        store.transport().stored_descriptors(),
        ["guake/fedora-24 RPMRequires nethack/fedora-24".to_string()]
            .into_iter()
            .collect::<BTreeSet<_>>()
    );
}
