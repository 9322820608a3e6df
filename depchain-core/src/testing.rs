//! In-memory store that records every call it receives.
//!
//! [`RecordingTransport`] behaves like a small PDC-style service: it knows
//! releases, components and relationships, answers paginated list queries and
//! reports duplicate creates as conflicts. Every call is logged per resource as
//! `(method, params-or-body)` so tests can assert exact call counts and
//! arguments.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::contract::{Method, Transport};
use crate::error::RemoteError;
use crate::relationship::Edge;
use crate::store::{release_resource, GLOBAL_COMPONENTS, RELATIONSHIPS, RELEASE_COMPONENTS};

/// Calls grouped by resource, in arrival order.
pub type CallLog = BTreeMap<String, Vec<(Method, Value)>>;

#[derive(Default)]
struct State {
    calls: CallLog,
    failures: VecDeque<RemoteError>,
    releases: BTreeSet<String>,
    global_components: BTreeSet<String>,
    release_components: BTreeSet<(String, String)>,
    relationships: BTreeSet<(String, String, String, String)>,
}

pub struct RecordingTransport {
    state: Mutex<State>,
    page_size: usize,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            page_size: 50,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_release(self, release: &str) -> Self {
        self.lock().releases.insert(release.to_string());
        self
    }

    /// Seeds a stored relationship without logging a call.
    pub fn with_relationship(self, edge: &Edge) -> Self {
        self.lock().relationships.insert((
            edge.from.clone(),
            edge.kind.as_str().to_string(),
            edge.to.clone(),
            edge.release.clone(),
        ));
        self
    }

    /// Makes the next call, whatever it is, fail with `error`.
    pub fn fail_next(&self, error: RemoteError) {
        self.lock().failures.push_back(error);
    }

    pub fn calls(&self) -> CallLog {
        self.lock().calls.clone()
    }

    pub fn calls_to(&self, resource: &str) -> Vec<(Method, Value)> {
        self.lock().calls.get(resource).cloned().unwrap_or_default()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn global_components(&self) -> BTreeSet<String> {
        self.lock().global_components.clone()
    }

    pub fn release_components(&self) -> BTreeSet<(String, String)> {
        self.lock().release_components.clone()
    }

    /// Stored relationships rendered as descriptors.
    pub fn stored_descriptors(&self) -> BTreeSet<String> {
        self.lock()
            .relationships
            .iter()
            .filter_map(|(from, kind, to, release)| {
                Some(Edge::new(from.as_str(), kind.parse().ok()?, to.as_str(), release.as_str()).descriptor())
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn list_relationships(&self, state: &State, params: &Value) -> Value {
        let field = |key: &str| params.get(key).and_then(Value::as_str);
        let page = params.get("page").and_then(Value::as_u64).unwrap_or(1).max(1) as usize;

        let matching: Vec<Value> = state
            .relationships
            .iter()
            .filter(|(from, kind, _, release)| {
                field("from_component_release").map_or(true, |r| r == release)
                    && field("type").map_or(true, |t| t == kind)
                    && field("from_component_name").map_or(true, |f| f == from)
            })
            .map(|(from, kind, to, release)| {
                json!({
                    "from_component": { "name": from, "release": release },
                    "to_component": { "name": to, "release": release },
                    "type": kind,
                })
            })
            .collect();

        let start = (page - 1) * self.page_size;
        let results: Vec<Value> = matching.iter().skip(start).take(self.page_size).cloned().collect();
        let next = (start + self.page_size < matching.len())
            .then(|| format!("{RELATIONSHIPS}/?page={}", page + 1));

        json!({ "count": matching.len(), "next": next, "results": results })
    }
}

fn required<'a>(body: &'a Value, key: &str) -> Result<&'a str, RemoteError> {
    body.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| RemoteError::Permanent(format!("missing field '{key}'")))
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn get(&self, resource: &str, params: &Value) -> Result<Value, RemoteError> {
        let mut state = self.lock();
        state
            .calls
            .entry(resource.to_string())
            .or_default()
            .push((Method::Get, params.clone()));
        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }

        if let Some(release) = resource.strip_prefix("releases/") {
            return if state.releases.contains(release) {
                Ok(json!({ "release_id": release, "active": true }))
            } else {
                Err(RemoteError::NotFound(release_resource(release)))
            };
        }
        match resource {
            RELATIONSHIPS => Ok(self.list_relationships(&state, params)),
            GLOBAL_COMPONENTS | RELEASE_COMPONENTS => {
                Ok(json!({ "count": 0, "next": null, "results": [] }))
            }
            other => Err(RemoteError::NotFound(other.to_string())),
        }
    }

    async fn post(&self, resource: &str, body: &Value) -> Result<Value, RemoteError> {
        let mut state = self.lock();
        state
            .calls
            .entry(resource.to_string())
            .or_default()
            .push((Method::Post, body.clone()));
        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }

        match resource {
            GLOBAL_COMPONENTS => {
                let name = required(body, "name")?;
                if !state.global_components.insert(name.to_string()) {
                    return Err(RemoteError::Conflict(format!("global component {name}")));
                }
            }
            RELEASE_COMPONENTS => {
                let name = required(body, "name")?;
                let release = required(body, "release")?;
                if !state.releases.contains(release) {
                    return Err(RemoteError::Permanent(format!("unknown release {release}")));
                }
                if !state
                    .release_components
                    .insert((name.to_string(), release.to_string()))
                {
                    return Err(RemoteError::Conflict(format!("release component {name}/{release}")));
                }
            }
            RELATIONSHIPS => {
                if let Some(targets) = body.get("to_component_name").and_then(Value::as_array) {
                    let from = required(body, "from_component_name")?.to_string();
                    let release = required(body, "from_component_release")?.to_string();
                    let kind = required(body, "type")?.to_string();
                    for to in targets.iter().filter_map(Value::as_str) {
                        state.relationships.insert((
                            from.clone(),
                            kind.clone(),
                            to.to_string(),
                            release.clone(),
                        ));
                    }
                } else {
                    let component = |side: &str, key: &str| {
                        body.get(side)
                            .and_then(|c| c.get(key))
                            .and_then(Value::as_str)
                            .map(str::to_string)
                            .ok_or_else(|| RemoteError::Permanent(format!("missing {side}.{key}")))
                    };
                    let key = (
                        component("from_component", "name")?,
                        required(body, "type")?.to_string(),
                        component("to_component", "name")?,
                        component("from_component", "release")?,
                    );
                    if !state.relationships.insert(key) {
                        return Err(RemoteError::Conflict("relationship".to_string()));
                    }
                }
            }
            other => return Err(RemoteError::NotFound(other.to_string())),
        }
        Ok(body.clone())
    }
}
