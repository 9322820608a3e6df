//! Typed access to the store's resource collections.
//!
//! [`StoreClient`] wraps a [`Transport`] and knows the store's resource names,
//! query parameters and payload shapes. List reads follow pagination until an
//! empty page or a page without a `next` link, and every page fetch is retried
//! on transient failures.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::contract::Transport;
use crate::error::{DepchainError, RemoteError, Result, Stage};
use crate::relationship::{Edge, RelationshipType};

pub const GLOBAL_COMPONENTS: &str = "global-components";
pub const RELEASE_COMPONENTS: &str = "release-components";
pub const RELATIONSHIPS: &str = "release-component-relationships";

/// Resource path of a single release record.
pub fn release_resource(release: &str) -> String {
    format!("releases/{release}")
}

/// Retry behavior for store reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first one.
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 3,
            delay: Duration::from_millis(1000),
        }
    }
}

/// One creation call carrying every target of a `(from, type, release)` group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationshipBatch {
    pub from_component_name: String,
    pub from_component_release: String,
    pub to_component_name: Vec<String>,
    #[serde(rename = "type")]
    pub kind: RelationshipType,
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    results: Vec<StoredRelationship>,
}

#[derive(Debug, Deserialize)]
struct ComponentRef {
    name: String,
    release: String,
}

#[derive(Debug, Deserialize)]
struct StoredRelationship {
    from_component: ComponentRef,
    to_component: ComponentRef,
    #[serde(rename = "type")]
    kind: String,
}

pub struct StoreClient<T> {
    transport: T,
    retry: RetryPolicy,
}

impl<T: Transport> StoreClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn get_with_retry(&self, resource: &str, params: &Value) -> std::result::Result<Value, RemoteError> {
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.transport.get(resource, params).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(resource, attempt, attempts, error = %e, "[STORE] Transient read failure, retrying");
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Fetches the release record. A missing release is a precondition fault.
    pub async fn get_release(&self, release: &str) -> Result<Value> {
        let resource = release_resource(release);
        match self.get_with_retry(&resource, &json!({})).await {
            Ok(record) => {
                debug!(release, "[STORE] Release exists");
                Ok(record)
            }
            Err(RemoteError::NotFound(_)) => {
                error!(release, "[STORE] Release missing from the store");
                Err(DepchainError::MissingRelease {
                    release: release.to_string(),
                })
            }
            Err(e) => {
                error!(release, error = %e, "[STORE] Failed to fetch release");
                Err(DepchainError::remote(Stage::Resolve, e))
            }
        }
    }

    /// Every stored relationship of `kind` in `release`, optionally narrowed to one `from` component.
    pub async fn relationships(
        &self,
        release: &str,
        kind: RelationshipType,
        from: Option<&str>,
    ) -> Result<BTreeSet<Edge>> {
        let mut edges = BTreeSet::new();
        let mut page = 1u32;
        loop {
            let mut params = json!({
                "page": page,
                "from_component_release": release,
                "type": kind.as_str(),
            });
            if let Some(name) = from {
                params["from_component_name"] = json!(name);
            }

            let raw = self.get_with_retry(RELATIONSHIPS, &params).await.map_err(|e| {
                error!(release, kind = %kind, page, error = %e, "[STORE] Failed to fetch relationship page");
                DepchainError::remote(Stage::Fetch, e)
            })?;
            let body: Page = serde_json::from_value(raw)
                .map_err(|e| DepchainError::malformed(Stage::Fetch, e.to_string()))?;

            if body.results.is_empty() {
                break;
            }
            for record in body.results {
                if record.kind != kind.as_str() {
                    warn!(expected = %kind, found = %record.kind, "[STORE] Ignoring relationship of unexpected type");
                    continue;
                }
                if record.from_component.release != release
                    || record.to_component.release != release
                {
                    warn!(
                        release,
                        from = %record.from_component.name,
                        from_release = %record.from_component.release,
                        to = %record.to_component.name,
                        to_release = %record.to_component.release,
                        "[STORE] Ignoring relationship outside the requested release"
                    );
                    continue;
                }
                edges.insert(Edge::new(
                    record.from_component.name,
                    kind,
                    record.to_component.name,
                    record.from_component.release,
                ));
            }
            if body.next.is_none() {
                break;
            }
            page += 1;
        }

        debug!(release, kind = %kind, pages = page, count = edges.len(), "[STORE] Fetched relationships");
        Ok(edges)
    }

    async fn create(&self, resource: &str, body: Value) -> std::result::Result<(), RemoteError> {
        match self.transport.post(resource, &body).await {
            Ok(_) => Ok(()),
            Err(RemoteError::Conflict(reason)) => {
                debug!(resource, reason = %reason, "[STORE] Record already exists");
                Ok(())
            }
            Err(e) => {
                error!(resource, body = %body, error = %e, "[STORE] Create failed");
                Err(e)
            }
        }
    }

    /// Creates a global component; an existing one counts as success.
    pub async fn ensure_global_component(&self, name: &str) -> Result<()> {
        self.create(GLOBAL_COMPONENTS, json!({ "name": name }))
            .await
            .map_err(|e| DepchainError::remote(Stage::Create, e))
    }

    /// Creates a release component; an existing one counts as success.
    pub async fn ensure_release_component(&self, name: &str, release: &str) -> Result<()> {
        let body = json!({
            "name": name,
            "release": release,
            "global_component": name,
        });
        self.create(RELEASE_COMPONENTS, body)
            .await
            .map_err(|e| DepchainError::remote(Stage::Create, e))
    }

    pub async fn create_relationship(&self, edge: &Edge) -> Result<()> {
        let body = json!({
            "from_component": { "name": edge.from, "release": edge.release },
            "to_component": { "name": edge.to, "release": edge.release },
            "type": edge.kind.as_str(),
        });
        self.create(RELATIONSHIPS, body)
            .await
            .map_err(|e| DepchainError::remote(Stage::Create, e))
    }

    pub async fn create_relationships(&self, batch: &RelationshipBatch) -> Result<()> {
        let body = serde_json::to_value(batch)
            .map_err(|e| DepchainError::malformed(Stage::Create, e.to_string()))?;
        self.create(RELATIONSHIPS, body)
            .await
            .map_err(|e| DepchainError::remote(Stage::Create, e))?;
        info!(
            from = %batch.from_component_name,
            release = %batch.from_component_release,
            kind = %batch.kind,
            targets = batch.to_component_name.len(),
            "[STORE] Created relationship batch"
        );
        Ok(())
    }
}
