//! Classifies inbound bus messages into build events.
//!
//! Messages come either wrapped (`{"topic": ..., "msg": {...}}`) or as the bare
//! body. Only build-tagging messages from the primary build-system instance
//! that carry a tag, a build id and a package name become a [`BuildEvent`].

use serde_json::Value;
use tracing::debug;

use crate::contract::Build;
use crate::release::ReleaseResolver;

const TAG_TOPIC_SUFFIX: &str = "buildsys.tag";

/// A build was tagged into `tag`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildEvent {
    pub tag: String,
    pub build_id: String,
    pub name: String,
}

impl BuildEvent {
    pub fn from_message(message: &Value) -> Option<BuildEvent> {
        let (topic, body) = match message.get("msg") {
            Some(body) => (message.get("topic").and_then(Value::as_str), body),
            None => (message.get("topic").and_then(Value::as_str), message),
        };

        if let Some(topic) = topic {
            if !topic.ends_with(TAG_TOPIC_SUFFIX) {
                debug!(topic, "[EVENT] Not a tagging message");
                return None;
            }
        }
        if let Some(instance) = body.get("instance").and_then(Value::as_str) {
            if instance != "primary" {
                debug!(instance, "[EVENT] Ignoring secondary build-system instance");
                return None;
            }
        }

        let tag = body.get("tag").and_then(Value::as_str)?;
        let name = body.get("name").and_then(Value::as_str)?;
        let build_id = match body.get("build_id")? {
            Value::String(id) => id.clone(),
            Value::Number(id) => id.to_string(),
            _ => return None,
        };

        Some(BuildEvent {
            tag: tag.to_string(),
            build_id,
            name: name.to_string(),
        })
    }

    pub fn build(&self) -> Build {
        Build {
            build_id: self.build_id.clone(),
            name: self.name.clone(),
        }
    }
}

/// Decides whether a message is something the engine should act on.
#[derive(Debug, Clone)]
pub struct EventRouter {
    resolver: ReleaseResolver,
}

impl EventRouter {
    pub fn new(resolver: ReleaseResolver) -> Self {
        Self { resolver }
    }

    /// The build event behind `message`, when it is a tagging into an interesting tag.
    pub fn route(&self, message: &Value) -> Option<BuildEvent> {
        let event = BuildEvent::from_message(message)?;
        if !self.resolver.is_interesting(&event.tag) {
            debug!(tag = %event.tag, build = %event.name, "[EVENT] Tag is not tracked, skipping");
            return None;
        }
        Some(event)
    }

    pub fn can_handle(&self, message: &Value) -> bool {
        self.route(message).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release::TagMapping;
    use serde_json::json;

    fn router() -> EventRouter {
        EventRouter::new(ReleaseResolver::new(["f24"], "f25", TagMapping::default()))
    }

    #[test]
    fn test_routes_wrapped_tag_message() {
        let message = json!({
            "topic": "org.fedoraproject.prod.buildsys.tag",
            "msg": {
                "build_id": 719123,
                "name": "guake",
                "tag": "f24",
                "instance": "primary",
                "version": "0.8.5",
                "release": "1.fc24",
            }
        });
        let event = router().route(&message).expect("message should route");
        assert_eq!(event.tag, "f24");
        assert_eq!(event.build_id, "719123");
        assert_eq!(event.build().name, "guake");
    }

    #[test]
    fn test_skips_untracked_tags_and_other_topics() {
        let untracked = json!({ "tag": "f22", "name": "guake", "build_id": "1" });
        let untag = json!({
            "topic": "org.fedoraproject.prod.buildsys.untag",
            "msg": { "tag": "f24", "name": "guake", "build_id": "1" }
        });
        let secondary = json!({
            "tag": "f24", "name": "guake", "build_id": "1", "instance": "ppc"
        });

        let router = router();
        assert!(!router.can_handle(&untracked));
        assert!(!router.can_handle(&untag));
        assert!(!router.can_handle(&secondary));
        assert!(router.can_handle(&json!({ "tag": "f25", "name": "guake", "build_id": "1" })));
    }

    #[test]
    fn test_rejects_incomplete_messages() {
        assert!(BuildEvent::from_message(&json!({ "tag": "f24", "name": "guake" })).is_none());
        assert!(BuildEvent::from_message(&json!({ "tag": "f24", "build_id": [1] , "name": "x"})).is_none());
    }
}
