use std::time::Duration;

use serde_json::json;

use depchain_core::contract::{Method, MockTransport};
use depchain_core::relationship::{Edge, RelationshipType};
use depchain_core::store::{RetryPolicy, StoreClient, RELATIONSHIPS};
use depchain_core::testing::RecordingTransport;
use depchain_core::{DepchainError, RemoteError, Stage};

fn no_delay(attempts: u32) -> RetryPolicy {
    RetryPolicy {
        attempts,
        delay: Duration::ZERO,
    }
}

fn seeded(count: usize) -> RecordingTransport {
    (0..count).fold(
        RecordingTransport::new().with_page_size(2).with_release("fedora-24"),
        |transport, i| {
            transport.with_relationship(&Edge::new(
                "guake",
                RelationshipType::RPMRequires,
                format!("lib{i}"),
                "fedora-24",
            ))
        },
    )
}

#[tokio::test]
async fn test_relationships_follow_pagination_to_completion() {
    let store = StoreClient::new(seeded(5));

    let edges = store
        .relationships("fedora-24", RelationshipType::RPMRequires, None)
        .await
        .expect("fetch");

    assert_eq!(edges.len(), 5);
    let pages: Vec<u64> = store
        .transport()
        .calls_to(RELATIONSHIPS)
        .iter()
        .map(|(_, params)| params["page"].as_u64().unwrap_or_default())
        .collect();
    assert_eq!(pages, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_transient_page_failure_is_retried() {
    let store = StoreClient::new(seeded(3)).with_retry(no_delay(3));
    store
        .transport()
        .fail_next(RemoteError::Transient("502 Bad Gateway".into()));

    let edges = store
        .relationships("fedora-24", RelationshipType::RPMRequires, None)
        .await
        .expect("retry should recover");

    assert_eq!(edges.len(), 3);
    // page 1 twice (failure + retry), then page 2
    assert_eq!(store.transport().calls_to(RELATIONSHIPS).len(), 3);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let store = StoreClient::new(seeded(1)).with_retry(no_delay(2));
    store.transport().fail_next(RemoteError::Transient("timeout".into()));
    store.transport().fail_next(RemoteError::Transient("timeout".into()));

    let err = store
        .relationships("fedora-24", RelationshipType::RPMRequires, None)
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Stage::Fetch);
    assert!(err.is_retryable());
    assert_eq!(store.transport().calls_to(RELATIONSHIPS).len(), 2);
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let store = StoreClient::new(seeded(1)).with_retry(no_delay(5));
    store.transport().fail_next(RemoteError::Permanent("400 Bad Request".into()));

    let err = store
        .relationships("fedora-24", RelationshipType::RPMRequires, None)
        .await
        .unwrap_err();

    assert!(!err.is_retryable());
    assert_eq!(store.transport().calls_to(RELATIONSHIPS).len(), 1);
}

#[tokio::test]
async fn test_empty_page_stops_pagination_even_with_next_link() {
    let mut transport = MockTransport::new();
    transport
        .expect_get()
        .times(1)
        .returning(|_, _| Ok(json!({ "count": 0, "next": "page=2", "results": [] })));
    let store = StoreClient::new(transport);

    let edges = store
        .relationships("fedora-24", RelationshipType::RPMBuildRoot, None)
        .await
        .expect("fetch");

    assert!(edges.is_empty());
}

#[tokio::test]
async fn test_records_from_another_release_are_ignored() {
    let mut transport = MockTransport::new();
    transport.expect_get().times(1).returning(|_, _| {
        Ok(json!({
            "count": 2,
            "next": null,
            "results": [
                {
                    "from_component": { "name": "guake", "release": "fedora-25" },
                    "to_component": { "name": "nethack", "release": "fedora-25" },
                    "type": "RPMRequires",
                },
                {
                    "from_component": { "name": "guake", "release": "fedora-24" },
                    "to_component": { "name": "python3", "release": "fedora-24" },
                    "type": "RPMRequires",
                },
            ]
        }))
    });
    let store = StoreClient::new(transport);

    let edges = store
        .relationships("fedora-24", RelationshipType::RPMRequires, None)
        .await
        .expect("fetch");

    let descriptors: Vec<String> = edges.iter().map(Edge::descriptor).collect();
    assert_eq!(descriptors, vec!["guake/fedora-24 RPMRequires python3/fedora-24"]);
}

#[tokio::test]
async fn test_malformed_page_is_reported() {
    let mut transport = MockTransport::new();
    transport
        .expect_get()
        .returning(|_, _| Ok(json!({ "results": [{ "type": "RPMRequires" }] })));
    let store = StoreClient::new(transport);

    let err = store
        .relationships("fedora-24", RelationshipType::RPMRequires, None)
        .await
        .unwrap_err();

    assert!(matches!(err, DepchainError::Malformed { stage: Stage::Fetch, .. }));
}

#[tokio::test]
async fn test_from_filter_is_sent() {
    let store = StoreClient::new(seeded(2));

    store
        .relationships("fedora-24", RelationshipType::RPMRequires, Some("guake"))
        .await
        .expect("fetch");

    assert_eq!(
        store.transport().calls_to(RELATIONSHIPS)[0],
        (
            Method::Get,
            json!({
                "page": 1,
                "from_component_release": "fedora-24",
                "type": "RPMRequires",
                "from_component_name": "guake",
            })
        )
    );
}

#[tokio::test]
async fn test_component_conflict_counts_as_success() {
    let mut transport = MockTransport::new();
    transport
        .expect_post()
        .withf(|resource, body| resource == "global-components" && body["name"] == "guake")
        .times(1)
        .returning(|_, _| Err(RemoteError::Conflict("name must be unique".into())));
    let store = StoreClient::new(transport);

    store
        .ensure_global_component("guake")
        .await
        .expect("conflict is success");
}

#[tokio::test]
async fn test_missing_release_is_a_precondition_fault() {
    let store = StoreClient::new(RecordingTransport::new());

    let err = store.get_release("fedora-99").await.unwrap_err();

    assert!(matches!(err, DepchainError::MissingRelease { .. }));
    assert_eq!(err.stage(), Stage::Resolve);
}
