//! Topics the registry publishes on the event bus, and their payload.

use serde::Serialize;

use crate::state::Stage;

pub const PLUGIN_LOADED: &str = "plugin.loaded";
pub const PLUGIN_INITIALIZED: &str = "plugin.initialized";
pub const PLUGIN_STARTED: &str = "plugin.started";
pub const PLUGIN_STOPPED: &str = "plugin.stopped";
pub const PLUGIN_UNLOADED: &str = "plugin.unloaded";
pub const PLUGIN_FAILED: &str = "plugin.failed";

/// Every lifecycle topic, in lifecycle order.
pub const ALL: [&str; 6] = [
    PLUGIN_LOADED,
    PLUGIN_INITIALIZED,
    PLUGIN_STARTED,
    PLUGIN_STOPPED,
    PLUGIN_UNLOADED,
    PLUGIN_FAILED,
];

/// Payload of every lifecycle event.
///
/// `error` is only set on [`PLUGIN_FAILED`], where `stage` names the step
/// that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginEvent {
    pub name: String,
    pub stage: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_topics_are_distinct_and_namespaced() {
        let unique: HashSet<_> = ALL.iter().collect();
        assert_eq!(unique.len(), ALL.len());
        assert!(ALL.iter().all(|topic| topic.starts_with("plugin.")));
        assert_eq!(ALL.last(), Some(&PLUGIN_FAILED));
    }

    #[test]
    fn test_error_only_serialized_on_failure() {
        let started = PluginEvent {
            name: "echo".into(),
            stage: Stage::Start,
            error: None,
        };
        let json = serde_json::to_value(&started).unwrap();
        assert!(json.get("error").is_none());

        let failed = PluginEvent {
            error: Some("boom".into()),
            ..started
        };
        assert_eq!(serde_json::to_value(&failed).unwrap()["error"], "boom");
    }
}
